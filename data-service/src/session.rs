//! 单次请求的数据库会话
//!
//! 会话持有一个用调用方凭据打开的 PostgreSQL 连接，只服务一个操作。
//! `close` 可重复调用；未调用 `close` 就被丢弃的会话（错误路径、超时、panic）
//! 在连接丢弃时同样释放套接字。

use std::time::{Duration, Instant};

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, PgConnection, Postgres};

use common::errors::{AppError, AppResult};
use common::models::ConnectionSpec;

use crate::query_builder::Statement;

const APPLICATION_NAME: &str = "oyda-data-service";

/// 指向调用方数据库的作用域连接
pub struct Session {
    conn: Option<PgConnection>,
    address: String,
    opened_at: Instant,
}

impl Session {
    /// 打开连接，耗时不超过 `connect_timeout`
    ///
    /// # Errors
    /// 认证失败、网络错误或数据库不存在时返回带驱动消息的
    /// `AppError::ConnectionError`。
    pub async fn open(spec: &ConnectionSpec, connect_timeout: Duration) -> AppResult<Self> {
        let address = spec.address();
        let options = connect_options(spec);

        let conn = tokio::time::timeout(connect_timeout, options.connect())
            .await
            .map_err(|_| {
                AppError::ConnectionError(format!(
                    "timed out after {}s connecting to {}",
                    connect_timeout.as_secs(),
                    address
                ))
            })?
            .map_err(|e| AppError::ConnectionError(e.to_string()))?;

        tracing::debug!(address = %address, "会话已打开");
        Ok(Self {
            conn: Some(conn),
            address,
            opened_at: Instant::now(),
        })
    }

    /// 目标的 `host:port/database`
    pub fn address(&self) -> &str {
        &self.address
    }

    fn connection(&mut self) -> AppResult<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::Internal("session already closed".into()))
    }

    /// 执行语句并返回全部行
    pub async fn fetch_all(&mut self, statement: &Statement) -> AppResult<Vec<PgRow>> {
        let conn = self.connection()?;
        bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&mut *conn)
            .await
            .map_err(AppError::from_statement)
    }

    /// 执行语句并返回至多一行
    pub async fn fetch_optional(&mut self, statement: &Statement) -> AppResult<Option<PgRow>> {
        let conn = self.connection()?;
        bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AppError::from_statement)
    }

    /// 执行语句并返回受影响的行数
    pub async fn execute(&mut self, statement: &Statement) -> AppResult<u64> {
        self.execute_raw(statement)
            .await
            .map_err(AppError::from_statement)
    }

    /// 同 [`Session::execute`]，但返回驱动原始错误，供需要判断 SQLSTATE 的调用方使用
    pub async fn execute_raw(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("session already closed".into()))?;
        let result = bind_all(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// 正常关闭连接，可重复调用
    pub async fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let elapsed_ms = self.opened_at.elapsed().as_millis() as u64;
        if let Err(e) = conn.close().await {
            tracing::debug!(address = %self.address, error = %e, "会话关闭时出错");
        }
        tracing::debug!(address = %self.address, elapsed_ms, "会话已关闭");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!(address = %self.address, "会话未正常关闭，连接已丢弃");
        }
    }
}

fn connect_options(spec: &ConnectionSpec) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&spec.host)
        .port(spec.port)
        .database(&spec.database)
        .username(&spec.user)
        .password(&spec.password)
        .application_name(APPLICATION_NAME)
}

fn bind_all<'q>(
    query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(query, bind_value)
}

/// 以最接近的 PostgreSQL 类型绑定 JSON 值
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => query.bind(i),
            (None, Some(f)) => query.bind(f),
            (None, None) => query.bind(n.to_string()),
        },
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value)),
    }
}
