//! SQL 语句构建
//!
//! 每种操作对应一个构建函数。标识符拼入 SQL 前会再次校验；值一律以 `$n`
//! 参数传递，只有 SQL `NULL` 以字面量形式出现。
//!
//! 字符串参数以 TEXT 类型绑定。目标列不是文本类型时（DATE、UUID、NUMERIC、
//! 枚举等），占位符带上该列的显式转换，例如 `$1::date`。

use std::collections::HashMap;

use serde_json::{Map, Value};

use common::errors::{AppError, AppResult};
use common::models::ColumnDefinition;
use common::utils::Sanitizer;

use crate::predicate::{CompareOp, Predicate};

/// SQL 文本及其绑定参数，按 `$1..$n` 排列
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }

    /// 追加参数并返回占位符，`cast` 存在时附带 `::type`
    fn push_param(params: &mut Vec<Value>, value: &Value, cast: Option<&str>) -> String {
        params.push(value.clone());
        match cast {
            Some(data_type) => format!("${}::{}", params.len(), data_type),
            None => format!("${}", params.len()),
        }
    }
}

/// 表的列名到 `format_type` 类型名的映射，例如 `numeric(10,2)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTypes(HashMap<String, String>);

impl ColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, data_type: impl Into<String>) {
        self.0.insert(column.into().to_ascii_lowercase(), data_type.into());
    }

    /// 字符串值写入或比较 `column` 时需要的显式转换
    ///
    /// 未加引号的标识符在 PostgreSQL 中折叠为小写，查找同样不区分大小写。
    fn cast_for(&self, column: &str, value: &Value) -> Option<&str> {
        if !value.is_string() {
            return None;
        }
        let data_type = self.0.get(&column.to_ascii_lowercase())?;
        (!is_textual(data_type)).then_some(data_type.as_str())
    }
}

impl FromIterator<(String, String)> for ColumnTypes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut types = Self::new();
        for (column, data_type) in iter {
            types.insert(column, data_type);
        }
        types
    }
}

/// TEXT 参数可直接赋值的类型
fn is_textual(data_type: &str) -> bool {
    if data_type.ends_with("[]") {
        return false;
    }
    matches!(data_type, "text" | "name" | "citext" | "\"char\"") || data_type.starts_with("character")
}

pub fn table_exists(table: &str) -> AppResult<Statement> {
    Ok(Statement::new(
        "SELECT EXISTS(SELECT FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)"
            .to_string(),
        vec![Value::String(table.to_string())],
    ))
}

/// 读取表的列类型；表不存在时结果为空
pub fn column_types(table: &str) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    Ok(Statement::new(
        "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) FROM pg_attribute a \
         WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped"
            .to_string(),
        vec![Value::String(table.to_string())],
    ))
}

pub fn create_table(table: &str, columns: &[ColumnDefinition]) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    if columns.is_empty() {
        return Err(AppError::InvalidColumnSpec(
            "at least one column is required".into(),
        ));
    }
    let defs = columns
        .iter()
        .map(|c| {
            Sanitizer::validate_identifier(&c.name)?;
            let data_type = Sanitizer::validate_column_type(&c.data_type)?;
            Ok(format!("{} {}", c.name, data_type))
        })
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Statement::new(
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, defs.join(", ")),
        vec![],
    ))
}

pub fn drop_table(table: &str) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    Ok(Statement::new(format!("DROP TABLE {}", table), vec![]))
}

pub fn select_rows(table: &str, filter: Option<&Predicate>, types: &ColumnTypes) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    let mut params = Vec::new();
    let mut sql = format!("SELECT * FROM {}", table);
    append_where(&mut sql, filter, types, &mut params)?;
    Ok(Statement::new(sql, params))
}

pub fn select_columns(
    table: &str,
    columns: &[String],
    filter: Option<&Predicate>,
    types: &ColumnTypes,
) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    let columns = Sanitizer::validate_column_list(columns)?;
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
    append_where(&mut sql, filter, types, &mut params)?;
    Ok(Statement::new(sql, params))
}

pub fn insert_row(table: &str, row: &Map<String, Value>, types: &ColumnTypes) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    if row.is_empty() {
        return Err(AppError::MissingParameter("row".into()));
    }
    let mut params = Vec::new();
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (column, value) in row {
        columns.push(Sanitizer::validate_identifier(column)?);
        values.push(value_sql(value, types.cast_for(column, value), &mut params)?);
    }
    Ok(Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            values.join(", ")
        ),
        params,
    ))
}

pub fn update_row(
    table: &str,
    assignments: &Map<String, Value>,
    filter: &Predicate,
    types: &ColumnTypes,
) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    if assignments.is_empty() {
        return Err(AppError::MissingParameter("row".into()));
    }
    require_filter(filter)?;

    let mut params = Vec::new();
    let sets = assignments
        .iter()
        .map(|(column, value)| {
            let column = Sanitizer::validate_identifier(column)?;
            let placeholder = value_sql(value, types.cast_for(column, value), &mut params)?;
            Ok(format!("{} = {}", column, placeholder))
        })
        .collect::<AppResult<Vec<_>>>()?;
    let mut sql = format!("UPDATE {} SET {}", table, sets.join(", "));
    append_where(&mut sql, Some(filter), types, &mut params)?;
    Ok(Statement::new(sql, params))
}

pub fn delete_row(table: &str, filter: &Predicate, types: &ColumnTypes) -> AppResult<Statement> {
    let table = Sanitizer::validate_identifier(table)?;
    require_filter(filter)?;
    let mut params = Vec::new();
    let mut sql = format!("DELETE FROM {}", table);
    append_where(&mut sql, Some(filter), types, &mut params)?;
    Ok(Statement::new(sql, params))
}

fn require_filter(filter: &Predicate) -> AppResult<()> {
    if filter.is_empty() {
        return Err(AppError::MissingParameter("condition".into()));
    }
    Ok(())
}

/// `value` 的占位符，或 `NULL` 字面量
fn value_sql(value: &Value, cast: Option<&str>, params: &mut Vec<Value>) -> AppResult<String> {
    if value.is_null() {
        return Sanitizer::render_literal(value);
    }
    Ok(Statement::push_param(params, value, cast))
}

fn append_where(
    sql: &mut String,
    filter: Option<&Predicate>,
    types: &ColumnTypes,
    params: &mut Vec<Value>,
) -> AppResult<()> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return Ok(());
    };
    let clauses = filter
        .clauses
        .iter()
        .map(|clause| {
            let field = Sanitizer::validate_identifier(&clause.field)?;
            Ok(match clause.op {
                CompareOp::IsNull | CompareOp::IsNotNull => format!("{} {}", field, clause.op.as_sql()),
                // LIKE 的右侧始终是文本模式
                CompareOp::Like => format!(
                    "{} {} {}",
                    field,
                    clause.op.as_sql(),
                    Statement::push_param(params, &clause.value, None)
                ),
                op => format!(
                    "{} {} {}",
                    field,
                    op.as_sql(),
                    Statement::push_param(params, &clause.value, types.cast_for(field, &clause.value))
                ),
            })
        })
        .collect::<AppResult<Vec<_>>>()?;
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
    Ok(())
}
