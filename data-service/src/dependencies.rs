//! 包依赖注册表（`dependencies` 表）

use serde_json::Value;
use sqlx::FromRow;

use common::errors::{is_unique_violation, AppError, AppResult};
use common::models::DependencyEntry;

use crate::package_registry::PackageRegistry;
use crate::query_builder::Statement;
use crate::schema;
use crate::session::Session;

pub const TABLE: &str = "dependencies";

const DDL: &str = "CREATE TABLE IF NOT EXISTS dependencies (name VARCHAR(255) NOT NULL, version VARCHAR(255) NOT NULL)";

/// 缺失时创建 `dependencies` 及其名称索引
pub async fn ensure_table(session: &mut Session) -> AppResult<bool> {
    let created = schema::ensure_table(session, TABLE, DDL).await?;
    schema::ensure_unique_index(session, "dependencies_name_key", TABLE, "name").await?;
    Ok(created)
}

/// 全部已记录的依赖，按存储的插入顺序
pub async fn list(session: &mut Session) -> AppResult<Vec<DependencyEntry>> {
    let statement = Statement {
        sql: "SELECT name, version FROM dependencies".to_string(),
        params: vec![],
    };
    session
        .fetch_all(&statement)
        .await?
        .iter()
        .map(|row| DependencyEntry::from_row(row).map_err(AppError::from_statement))
        .collect()
}

pub async fn find(session: &mut Session, name: &str) -> AppResult<Option<DependencyEntry>> {
    let statement = Statement {
        sql: "SELECT name, version FROM dependencies WHERE name = $1 LIMIT 1".to_string(),
        params: vec![Value::String(name.to_string())],
    };
    session
        .fetch_optional(&statement)
        .await?
        .map(|row| DependencyEntry::from_row(&row).map_err(AppError::from_statement))
        .transpose()
}

/// 以最新发布版本记录 `name`
///
/// 已记录的包原样返回，不查询包仓库。布尔值表示本次调用是否插入了记录。
pub async fn add(
    session: &mut Session,
    registry: &dyn PackageRegistry,
    name: &str,
) -> AppResult<(DependencyEntry, bool)> {
    if let Some(existing) = find(session, name).await? {
        return Ok((existing, false));
    }

    let version = registry.resolve_latest_version(name).await?;
    let entry = DependencyEntry {
        name: name.to_string(),
        version,
    };

    let insert = Statement {
        sql: "INSERT INTO dependencies (name, version) VALUES ($1, $2)".to_string(),
        params: vec![
            Value::String(entry.name.clone()),
            Value::String(entry.version.clone()),
        ],
    };
    match session.execute_raw(&insert).await {
        Ok(_) => {
            tracing::info!(package = %entry.name, version = %entry.version, "依赖已添加");
            Ok((entry, true))
        }
        Err(e) if is_unique_violation(&e) => {
            let existing = find(session, name).await?.ok_or_else(|| {
                AppError::ExecutionError(format!("dependency {} vanished after conflict", name))
            })?;
            Ok((existing, false))
        }
        Err(e) => Err(AppError::from_statement(e)),
    }
}
