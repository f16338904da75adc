//! Shared data models.

pub mod connection;
pub mod record;
pub mod request;
pub mod table;

// Re-export commonly used types
pub use connection::{ConnectionParams, ConnectionSpec, DEFAULT_PORT};
pub use record::{DependencyEntry, DevKeyEntry, Record};
pub use request::{
    AddDependencyRequest, ConditionClause, ConditionInput, ConnectRequest, CreateTableRequest,
    DeleteRowRequest, DevKeyRequest, InsertRowRequest, SelectColumnsRequest, SelectRowsRequest,
    TableRequest, UpdateRowRequest,
};
pub use table::ColumnDefinition;
