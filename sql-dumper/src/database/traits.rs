//! Source connection trait
//!
//! This trait defines what the dump engine needs from a live database
//! connection. Every implementation wraps exactly one `sqlx` connection, so
//! session state (init commands, snapshot transaction) lasts for the run.

use async_trait::async_trait;
use thiserror::Error;

/// A row of a catalog query, every column read as text
pub type TextRow = Vec<Option<String>>;

/// Callback receiving one decoded data row at a time
pub type RowVisitor<'a> = dyn FnMut(Vec<SqlValue>) -> crate::Result<()> + Send + 'a;

/// How a selected column is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Decoded as text (the SELECT casts or hex-encodes it server-side)
    Text,
    /// Decoded as raw bytes
    Binary,
    /// Decoded as text that the SELECT already rendered as an SQL literal
    Literal,
}

/// A decoded column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    /// Complete SQL literal, written as is
    Literal(String),
}

/// Live connection to the database being dumped
///
/// Implementations provide database-specific connection handling; all SQL
/// text comes from the type adapter.
#[async_trait]
pub trait SourceConnection: Send {
    /// Name of the driver, used in error messages
    fn driver_name(&self) -> &'static str;

    /// Execute a statement that returns no rows
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Run a catalog query and read every column as text
    async fn query_text(&mut self, sql: &str) -> Result<Vec<TextRow>, DatabaseError>;

    /// Server version string
    async fn server_version(&mut self) -> Result<String, DatabaseError>;

    /// Stream the rows of a data query into `visitor`
    ///
    /// Rows are decoded one at a time according to `kinds` and never
    /// collected, so memory stays bounded for large tables. Returns the
    /// number of rows visited. An error from `visitor` stops the stream and
    /// is returned unchanged.
    ///
    /// # Arguments
    ///
    /// * `sql` - SELECT statement built by the type adapter
    /// * `kinds` - Decoding for each selected column, in order
    /// * `visitor` - Receives each decoded row
    async fn stream_rows(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        visitor: &mut RowVisitor<'_>,
    ) -> crate::Result<u64>;
}

/// Database error type
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Generic database error
    #[error("Database error: {0}")]
    Query(String),

    /// A query returned fewer columns than expected
    #[error("Unexpected result shape: {0}")]
    Shape(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::Query(error.to_string())
    }
}

/// First non-null column of the first row, if any
pub fn first_text(rows: &[TextRow]) -> Option<String> {
    rows.first()
        .and_then(|row| row.iter().flatten().next().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_skips_nulls() {
        let rows = vec![vec![None, Some("8.0.36".to_string())]];
        assert_eq!(first_text(&rows).as_deref(), Some("8.0.36"));
        assert_eq!(first_text(&[]), None);
    }

    #[test]
    fn test_sqlx_error_converts_to_query_error() {
        let error: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, DatabaseError::Query(_)));
    }
}
