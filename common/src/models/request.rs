//! Operation request payloads.
//!
//! Every payload flattens [`ConnectionParams`] so credentials sit at the top
//! level of the JSON body next to the operation fields. Operation fields are
//! optional at the serde level; absence is reported as `MissingParameter`
//! by the service, never as a decoding failure.

use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::connection::ConnectionParams;

/// Filter condition as accepted on the wire.
///
/// * a string such as `"id = 1 AND name = 'x'"`
/// * an object of equalities, `{"id": 1, "name": "x"}`
/// * a list of clauses, `[{"field": "age", "op": ">=", "value": 18}]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConditionInput {
    Text(String),
    Fields(Map<String, Value>),
    Clauses(Vec<ConditionClause>),
}

/// A single `field op value` clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionClause {
    pub field: String,
    #[serde(default = "default_operator", alias = "operator")]
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> String {
    "=".to_string()
}

/// Connection-only request (`set_oydabase`, `get_dependencies`).
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Request naming a single table (`table_exists`, `drop_table`, `select_table`).
#[derive(Debug, Deserialize, ToSchema)]
pub struct TableRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Target table. Also accepted as `table`.
    #[serde(alias = "table")]
    pub table_name: Option<String>,
}

/// Request body for `create_table`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTableRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Target table. Also accepted as `table`.
    #[serde(alias = "table")]
    pub table_name: Option<String>,
    /// Column name to SQL type, in declaration order.
    #[schema(value_type = Option<Object>)]
    pub columns: Option<Map<String, Value>>,
}

/// Request body for `select_rows`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectRowsRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub table_name: Option<String>,
    /// Optional filter. Also accepted as `condition`.
    #[serde(alias = "condition")]
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<ConditionInput>,
}

/// Request body for `select_columns`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectColumnsRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub table_name: Option<String>,
    /// Columns to return, in order.
    pub columns: Option<Vec<String>>,
    /// Optional filter. Also accepted as `condition`.
    #[serde(alias = "condition")]
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<ConditionInput>,
}

/// Request body for `insert_row`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InsertRowRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub table_name: Option<String>,
    /// Column name to value.
    #[schema(value_type = Option<Object>)]
    pub row: Option<Map<String, Value>>,
}

/// Request body for `update_row`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRowRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub table_name: Option<String>,
    /// Column name to new value.
    #[schema(value_type = Option<Object>)]
    pub row: Option<Map<String, Value>>,
    /// Rows to update. Also accepted as `conditions`.
    #[serde(alias = "conditions")]
    #[schema(value_type = Option<Object>)]
    pub condition: Option<ConditionInput>,
}

/// Request body for `delete_row`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRowRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub table_name: Option<String>,
    /// Rows to delete. Required. Also accepted as `conditions`.
    #[serde(alias = "conditions")]
    #[schema(value_type = Option<Object>)]
    pub condition: Option<ConditionInput>,
}

/// Request body for `add_dependency`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddDependencyRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// pub.dev package name.
    #[validate(length(min = 1, max = 214, message = "package_name must be 1-214 characters"))]
    pub package_name: Option<String>,
}

/// Request body for `dev_key`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DevKeyRequest {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    /// Developer username.
    #[validate(length(min = 1, max = 255, message = "username must be 1-255 characters"))]
    pub username: Option<String>,
}
