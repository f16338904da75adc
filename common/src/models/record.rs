//! Result records and registry entries.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One result row: column name to scalar value, in result-set column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Row of the `dependencies` registry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DependencyEntry {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

impl DependencyEntry {
    /// Legacy `"name: version"` rendering.
    pub fn label(&self) -> String {
        format!("{}: {}", self.name, self.version)
    }
}

/// Row of the `devs` registry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DevKeyEntry {
    /// Developer username.
    pub username: String,
    /// Stable key in `[100000, 999999]`.
    pub dev_key: i32,
}
