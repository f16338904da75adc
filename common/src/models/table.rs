//! Table schema models.

use serde::Serialize;
use utoipa::ToSchema;

/// A validated column for `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ColumnDefinition {
    /// Column name (a plain identifier).
    pub name: String,
    /// Normalised column type, e.g. `VARCHAR(255) NOT NULL`.
    pub data_type: String,
}
