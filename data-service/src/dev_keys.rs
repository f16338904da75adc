//! 开发者密钥注册表（`devs` 表）
//!
//! 每个用户名对应一个固定的六位密钥。两列上的唯一索引让并发的首次请求收敛：
//! 插入竞争失败的一方重新读取并返回胜出方的密钥。

use serde_json::Value;
use sqlx::Row;

use common::errors::{is_unique_violation, AppError, AppResult};
use common::models::DevKeyEntry;
use common::utils::DevKeyGenerator;

use crate::query_builder::Statement;
use crate::schema;
use crate::session::Session;

pub const TABLE: &str = "devs";

const DDL: &str =
    "CREATE TABLE IF NOT EXISTS devs (username VARCHAR(255) NOT NULL, dev_key INTEGER NOT NULL)";

/// 缺失时创建 `devs` 及其唯一索引，返回本次调用是否创建了该表
pub async fn ensure_table(session: &mut Session) -> AppResult<bool> {
    let created = schema::ensure_table(session, TABLE, DDL).await?;
    schema::ensure_unique_index(session, "devs_username_key", TABLE, "username").await?;
    schema::ensure_unique_index(session, "devs_dev_key_key", TABLE, "dev_key").await?;
    Ok(created)
}

/// 查询已分配给 `username` 的密钥
pub async fn find(session: &mut Session, username: &str) -> AppResult<Option<DevKeyEntry>> {
    let statement = Statement {
        sql: "SELECT username, dev_key FROM devs WHERE username = $1 LIMIT 1".to_string(),
        params: vec![Value::String(username.to_string())],
    };
    let Some(row) = session.fetch_optional(&statement).await? else {
        return Ok(None);
    };
    Ok(Some(DevKeyEntry {
        username: row.try_get("username").map_err(AppError::from_statement)?,
        dev_key: row.try_get("dev_key").map_err(AppError::from_statement)?,
    }))
}

async fn key_taken(session: &mut Session, key: i32) -> AppResult<bool> {
    let statement = Statement {
        sql: "SELECT EXISTS(SELECT 1 FROM devs WHERE dev_key = $1)".to_string(),
        params: vec![Value::from(key)],
    };
    let row = session
        .fetch_optional(&statement)
        .await?
        .ok_or_else(|| AppError::ExecutionError("EXISTS query returned no row".into()))?;
    row.try_get::<bool, _>(0).map_err(AppError::from_statement)
}

/// 返回 `username` 的密钥，首次使用时分配新密钥
///
/// # Errors
/// `max_attempts` 次抽取内未能占用空闲密钥时返回 `AppError::ExecutionError`。
pub async fn get_or_create(session: &mut Session, username: &str, max_attempts: u32) -> AppResult<i32> {
    for attempt in 1..=max_attempts.max(1) {
        if let Some(entry) = find(session, username).await? {
            return Ok(entry.dev_key);
        }

        let candidate = DevKeyGenerator::candidate();
        if key_taken(session, candidate).await? {
            tracing::debug!(attempt, "开发者密钥冲突，重新生成");
            continue;
        }

        let insert = Statement {
            sql: "INSERT INTO devs (username, dev_key) VALUES ($1, $2)".to_string(),
            params: vec![Value::String(username.to_string()), Value::from(candidate)],
        };
        match session.execute_raw(&insert).await {
            Ok(_) => {
                tracing::info!(username = %username, "已分配开发者密钥");
                return Ok(candidate);
            }
            // 用户名或密钥已被其他请求抢先占用，下一轮先重新读取再抽取
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(attempt, error = %e, "开发者密钥插入冲突");
            }
            Err(e) => return Err(AppError::from_statement(e)),
        }
    }

    Err(AppError::ExecutionError(format!(
        "could not assign a unique developer key after {} attempts",
        max_attempts
    )))
}
