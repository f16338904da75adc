//! 表的存在性检查、创建与删除

use sqlx::Row;

use common::errors::{AppError, AppResult};
use common::models::ColumnDefinition;

use crate::query_builder::{self, ColumnTypes, Statement};
use crate::session::Session;

/// `table` 是否存在于 `public` 模式中
pub async fn table_exists(session: &mut Session, table: &str) -> AppResult<bool> {
    let statement = query_builder::table_exists(table)?;
    let row = session
        .fetch_optional(&statement)
        .await?
        .ok_or_else(|| AppError::ExecutionError("EXISTS query returned no row".into()))?;
    row.try_get::<bool, _>(0).map_err(AppError::from_statement)
}

/// `CREATE TABLE IF NOT EXISTS`，重复调用成功且不做改动
pub async fn create_table(session: &mut Session, table: &str, columns: &[ColumnDefinition]) -> AppResult<()> {
    let statement = query_builder::create_table(table, columns)?;
    session.execute(&statement).await?;
    tracing::info!(table = %table, columns = columns.len(), "表已创建");
    Ok(())
}

/// 读取 `table` 各列的类型，供字符串参数做显式转换
///
/// 表不存在时返回空映射，随后的语句自行报告 `SchemaError`。
pub async fn column_types(session: &mut Session, table: &str) -> AppResult<ColumnTypes> {
    let statement = query_builder::column_types(table)?;
    session
        .fetch_all(&statement)
        .await?
        .iter()
        .map(|row| {
            let column = row.try_get::<String, _>(0).map_err(AppError::from_statement)?;
            let data_type = row.try_get::<String, _>(1).map_err(AppError::from_statement)?;
            Ok((column, data_type))
        })
        .collect()
}

/// 删除 `table`；表不存在时返回 `SchemaError`
pub async fn drop_table(session: &mut Session, table: &str) -> AppResult<()> {
    let statement = query_builder::drop_table(table)?;
    session.execute(&statement).await?;
    tracing::info!(table = %table, "表已删除");
    Ok(())
}

/// 注册表不存在时用固定 DDL 创建，返回本次调用是否创建了该表
///
/// 并发初始化可能同时执行 DDL；失败后若表已存在则忽略该失败。
pub async fn ensure_table(session: &mut Session, table: &str, ddl: &str) -> AppResult<bool> {
    if table_exists(session, table).await? {
        return Ok(false);
    }
    let statement = Statement {
        sql: ddl.to_string(),
        params: vec![],
    };
    if let Err(e) = session.execute(&statement).await {
        if !table_exists(session, table).await? {
            return Err(e);
        }
        tracing::debug!(table = %table, error = %e, "注册表已由并发请求创建");
        return Ok(false);
    }
    tracing::info!(table = %table, "注册表已创建");
    Ok(true)
}

/// 尽力为注册表创建唯一索引
///
/// 旧表可能已有重复数据，此时无法建索引，注册表退回到先读后写的检查。
pub async fn ensure_unique_index(session: &mut Session, index: &str, table: &str, column: &str) -> AppResult<()> {
    let statement = Statement {
        sql: format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            index, table, column
        ),
        params: vec![],
    };
    if let Err(e) = session.execute_raw(&statement).await {
        tracing::warn!(table = %table, index = %index, error = %e, "无法创建唯一索引");
    }
    Ok(())
}
