//! 网关操作及其结果
//!
//! 构造函数校验所有标识符和必填字段，已构造的 `Operation` 可以直接交给语句
//! 构建器。这些检查都发生在打开会话之前。

use serde_json::{Map, Value};

use common::errors::{AppError, AppResult};
use common::models::request::ConditionInput;
use common::models::{ColumnDefinition, DependencyEntry, Record};
use common::utils::Sanitizer;

use crate::predicate::Predicate;

/// 针对目标数据库的一个工作单元
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    TableExists {
        table: String,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnDefinition>,
    },
    DropTable {
        table: String,
    },
    SelectRows {
        table: String,
        filter: Option<Predicate>,
    },
    SelectColumns {
        table: String,
        columns: Vec<String>,
        filter: Option<Predicate>,
    },
    InsertRow {
        table: String,
        row: Map<String, Value>,
    },
    UpdateRow {
        table: String,
        assignments: Map<String, Value>,
        filter: Predicate,
    },
    DeleteRow {
        table: String,
        filter: Predicate,
    },
    GetDependencies,
    AddDependency {
        package: String,
    },
    GetOrCreateDevKey {
        username: String,
    },
}

/// 操作成功后的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Exists(bool),
    Rows(Vec<Record>),
    Written { rows_affected: u64 },
    Dependencies(Vec<DependencyEntry>),
    Dependency { entry: DependencyEntry, created: bool },
    DevKey(i32),
}

impl Operation {
    /// 日志中使用的简短名称
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::TableExists { .. } => "table_exists",
            Operation::CreateTable { .. } => "create_table",
            Operation::DropTable { .. } => "drop_table",
            Operation::SelectRows { .. } => "select_rows",
            Operation::SelectColumns { .. } => "select_columns",
            Operation::InsertRow { .. } => "insert_row",
            Operation::UpdateRow { .. } => "update_row",
            Operation::DeleteRow { .. } => "delete_row",
            Operation::GetDependencies => "get_dependencies",
            Operation::AddDependency { .. } => "add_dependency",
            Operation::GetOrCreateDevKey { .. } => "get_or_create_dev_key",
        }
    }

    pub fn table_exists(table: Option<String>) -> AppResult<Self> {
        Ok(Operation::TableExists {
            table: table_name(table)?,
        })
    }

    pub fn create_table(table: Option<String>, columns: Option<Map<String, Value>>) -> AppResult<Self> {
        let table = table_name(table)?;
        let columns = columns.ok_or_else(|| AppError::MissingParameter("columns".into()))?;
        Ok(Operation::CreateTable {
            table,
            columns: Sanitizer::validate_column_spec(&columns)?,
        })
    }

    pub fn drop_table(table: Option<String>) -> AppResult<Self> {
        Ok(Operation::DropTable {
            table: table_name(table)?,
        })
    }

    pub fn select_rows(table: Option<String>, conditions: Option<&ConditionInput>) -> AppResult<Self> {
        Ok(Operation::SelectRows {
            table: table_name(table)?,
            filter: optional_filter(conditions)?,
        })
    }

    pub fn select_columns(
        table: Option<String>,
        columns: Option<Vec<String>>,
        conditions: Option<&ConditionInput>,
    ) -> AppResult<Self> {
        let table = table_name(table)?;
        let columns = columns.ok_or_else(|| AppError::MissingParameter("columns".into()))?;
        Ok(Operation::SelectColumns {
            table,
            columns: Sanitizer::validate_column_list(&columns)?,
            filter: optional_filter(conditions)?,
        })
    }

    pub fn insert_row(table: Option<String>, row: Option<Map<String, Value>>) -> AppResult<Self> {
        Ok(Operation::InsertRow {
            table: table_name(table)?,
            row: row_values(row)?,
        })
    }

    pub fn update_row(
        table: Option<String>,
        row: Option<Map<String, Value>>,
        condition: Option<&ConditionInput>,
    ) -> AppResult<Self> {
        Ok(Operation::UpdateRow {
            table: table_name(table)?,
            assignments: row_values(row)?,
            filter: required_filter(condition)?,
        })
    }

    /// 拒绝无条件删除：条件缺失或为空时返回 `MissingParameter`
    pub fn delete_row(table: Option<String>, condition: Option<&ConditionInput>) -> AppResult<Self> {
        Ok(Operation::DeleteRow {
            table: table_name(table)?,
            filter: required_filter(condition)?,
        })
    }

    /// pub.dev 包名为小写标识符
    pub fn add_dependency(package: Option<String>) -> AppResult<Self> {
        let package = package
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::MissingParameter("package_name".into()))?;
        Sanitizer::validate_identifier(&package)?;
        Ok(Operation::AddDependency { package })
    }

    pub fn get_or_create_dev_key(username: Option<String>) -> AppResult<Self> {
        let username = username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::MissingParameter("username".into()))?;
        Ok(Operation::GetOrCreateDevKey { username })
    }
}

fn table_name(table: Option<String>) -> AppResult<String> {
    let table = table
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::MissingParameter("table_name".into()))?;
    Sanitizer::validate_identifier(&table)?;
    Ok(table)
}

fn row_values(row: Option<Map<String, Value>>) -> AppResult<Map<String, Value>> {
    let row = row
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::MissingParameter("row".into()))?;
    for column in row.keys() {
        Sanitizer::validate_identifier(column)?;
    }
    Ok(row)
}

fn optional_filter(conditions: Option<&ConditionInput>) -> AppResult<Option<Predicate>> {
    match conditions {
        None => Ok(None),
        Some(input) => {
            let predicate = Predicate::from_input(input)?;
            Ok((!predicate.is_empty()).then_some(predicate))
        }
    }
}

fn required_filter(condition: Option<&ConditionInput>) -> AppResult<Predicate> {
    optional_filter(condition)?.ok_or_else(|| AppError::MissingParameter("condition".into()))
}
