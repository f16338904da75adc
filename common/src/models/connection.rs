//! Connection credential models.
//!
//! Every request names its own target database; nothing here is persisted.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Connection fields as they arrive in a request payload.
///
/// Flattened into every operation request.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct ConnectionParams {
    /// Database host.
    pub host: Option<String>,
    /// Database port (default 5432).
    pub port: Option<u16>,
    /// Database name. Also accepted as `oydaBase` or `dbname`.
    #[serde(alias = "oydaBase", alias = "dbname")]
    pub database: Option<String>,
    /// Database user.
    pub user: Option<String>,
    /// Database password.
    pub password: Option<String>,
    /// Upper bound for the whole operation in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl ConnectionParams {
    /// Checks the mandatory fields and builds a [`ConnectionSpec`].
    ///
    /// # Errors
    /// `AppError::MissingParameter` naming the first absent or blank field.
    pub fn into_spec(self) -> AppResult<ConnectionSpec> {
        Ok(ConnectionSpec {
            host: required("host", self.host)?,
            port: self.port.unwrap_or(DEFAULT_PORT),
            database: required("database", self.database)?,
            user: required("user", self.user)?,
            password: required("password", self.password)?,
        })
    }
}

fn required(name: &str, value: Option<String>) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::MissingParameter(name.to_string()))
}

/// Validated credentials for exactly one session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionSpec {
    /// `host:port/database`, for messages and logs.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl std::fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
