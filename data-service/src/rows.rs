//! 行级读写

use serde_json::{Map, Value};

use common::errors::AppResult;
use common::models::Record;

use crate::mapper;
use crate::predicate::Predicate;
use crate::query_builder::{self, ColumnTypes};
use crate::schema;
use crate::session::Session;

/// 值中含字符串时读取列类型，否则不做额外查询
async fn types_for<'a>(
    session: &mut Session,
    table: &str,
    mut values: impl Iterator<Item = &'a Value>,
) -> AppResult<ColumnTypes> {
    if values.any(Value::is_string) {
        schema::column_types(session, table).await
    } else {
        Ok(ColumnTypes::new())
    }
}

fn filter_values(filter: Option<&Predicate>) -> impl Iterator<Item = &Value> {
    filter.into_iter().flat_map(|f| f.clauses.iter().map(|c| &c.value))
}

/// `SELECT *`，可带过滤条件
pub async fn select_rows(session: &mut Session, table: &str, filter: Option<&Predicate>) -> AppResult<Vec<Record>> {
    let types = types_for(session, table, filter_values(filter)).await?;
    let statement = query_builder::select_rows(table, filter, &types)?;
    let rows = session.fetch_all(&statement).await?;
    mapper::map_rows(&rows)
}

/// 查询指定列，可带过滤条件
pub async fn select_columns(
    session: &mut Session,
    table: &str,
    columns: &[String],
    filter: Option<&Predicate>,
) -> AppResult<Vec<Record>> {
    let types = types_for(session, table, filter_values(filter)).await?;
    let statement = query_builder::select_columns(table, columns, filter, &types)?;
    let rows = session.fetch_all(&statement).await?;
    mapper::map_rows(&rows)
}

pub async fn insert_row(session: &mut Session, table: &str, row: &Map<String, Value>) -> AppResult<u64> {
    let types = types_for(session, table, row.values()).await?;
    let statement = query_builder::insert_row(table, row, &types)?;
    let affected = session.execute(&statement).await?;
    tracing::info!(table = %table, affected, "行已插入");
    Ok(affected)
}

pub async fn update_row(
    session: &mut Session,
    table: &str,
    assignments: &Map<String, Value>,
    filter: &Predicate,
) -> AppResult<u64> {
    let values = assignments.values().chain(filter_values(Some(filter)));
    let types = types_for(session, table, values).await?;
    let statement = query_builder::update_row(table, assignments, filter, &types)?;
    let affected = session.execute(&statement).await?;
    tracing::info!(table = %table, affected, "行已更新");
    Ok(affected)
}

/// 删除匹配的行；构建器拒绝空条件
pub async fn delete_row(session: &mut Session, table: &str, filter: &Predicate) -> AppResult<u64> {
    let types = types_for(session, table, filter_values(Some(filter))).await?;
    let statement = query_builder::delete_row(table, filter, &types)?;
    let affected = session.execute(&statement).await?;
    tracing::info!(table = %table, affected, "行已删除");
    Ok(affected)
}
