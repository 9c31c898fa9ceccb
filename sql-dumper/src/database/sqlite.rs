//! SQLite source connection

use crate::database::traits::{
    first_text, DatabaseError, RowVisitor, SourceConnection, SqlValue, TextRow, ValueKind,
};
use crate::dsn::ConnectionSpec;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Executor, Row, TypeInfo, ValueRef};

/// SQLite source connection
pub struct SqliteSource {
    connection: SqliteConnection,
}

impl SqliteSource {
    /// Wrap an open SQLite connection
    pub fn new(connection: SqliteConnection) -> Self {
        Self { connection }
    }

    /// Open the database file named by the DSN's `dbname`, read-only
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(&spec.database)
            .read_only(true);
        let connection = SqliteConnection::connect_with(&options).await?;
        Ok(Self::new(connection))
    }

    /// Read a column as text
    ///
    /// SQLite is dynamically typed, so the value is decoded by its storage
    /// class. Text that is not valid UTF-8 and blobs are converted lossily.
    fn text_column(row: &SqliteRow, index: usize) -> Result<Option<String>, DatabaseError> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(None);
        }
        let storage = raw.type_info().name().to_string();

        let text = match storage.as_str() {
            "INTEGER" => row.try_get_unchecked::<i64, _>(index)?.to_string(),
            "REAL" => row.try_get_unchecked::<f64, _>(index)?.to_string(),
            _ => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        Ok(Some(text))
    }

    fn decode_row(row: &SqliteRow, kinds: &[ValueKind]) -> Result<Vec<SqlValue>, DatabaseError> {
        if row.len() < kinds.len() {
            return Err(DatabaseError::Shape(format!(
                "expected {} columns, got {}",
                kinds.len(),
                row.len()
            )));
        }

        kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| match kind {
                ValueKind::Text => Ok(Self::text_column(row, index)?
                    .map(SqlValue::Text)
                    .unwrap_or(SqlValue::Null)),
                ValueKind::Literal => Ok(Self::text_column(row, index)?
                    .map(SqlValue::Literal)
                    .unwrap_or(SqlValue::Null)),
                ValueKind::Binary => Ok(row
                    .try_get::<Option<Vec<u8>>, _>(index)?
                    .map(SqlValue::Bytes)
                    .unwrap_or(SqlValue::Null)),
            })
            .collect()
    }
}

#[async_trait]
impl SourceConnection for SqliteSource {
    fn driver_name(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        (&mut self.connection).execute(sql).await?;
        Ok(())
    }

    async fn query_text(&mut self, sql: &str) -> Result<Vec<TextRow>, DatabaseError> {
        let rows = (&mut self.connection).fetch_all(sql).await?;
        rows.iter()
            .map(|row| (0..row.len()).map(|index| Self::text_column(row, index)).collect())
            .collect()
    }

    async fn server_version(&mut self) -> Result<String, DatabaseError> {
        let rows = self.query_text("SELECT sqlite_version()").await?;
        first_text(&rows).ok_or_else(|| DatabaseError::Shape("empty sqlite_version()".to_string()))
    }

    async fn stream_rows(
        &mut self,
        sql: &str,
        kinds: &[ValueKind],
        visitor: &mut RowVisitor<'_>,
    ) -> crate::Result<u64> {
        let mut rows = (&mut self.connection).fetch(sql);
        let mut count = 0;
        while let Some(row) = rows.try_next().await.map_err(DatabaseError::from)? {
            visitor(Self::decode_row(&row, kinds)?)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_source() -> SqliteSource {
        let connection = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        SqliteSource::new(connection)
    }

    #[tokio::test]
    async fn test_query_text_reads_mixed_types_as_text() {
        let mut source = memory_source().await;
        let rows = source
            .query_text("SELECT 'a', 42, 1.5, NULL")
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![
                Some("a".to_string()),
                Some("42".to_string()),
                Some("1.5".to_string()),
                None
            ]]
        );
    }

    #[tokio::test]
    async fn test_values_are_read_by_storage_class() {
        let mut source = memory_source().await;
        source
            .execute("CREATE TABLE t (note TEXT, anything)")
            .await
            .unwrap();
        source
            .execute("INSERT INTO t VALUES (X'6869', X'00FF'), ('7', 0.30000000000000004)")
            .await
            .unwrap();

        let rows = source.query_text("SELECT note, anything FROM t").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_deref(), Some("hi"));
        assert_eq!(rows[1][0].as_deref(), Some("7"));
        assert_eq!(rows[1][1].as_deref(), Some("0.30000000000000004"));
    }

    #[tokio::test]
    async fn test_server_version_is_reported() {
        let mut source = memory_source().await;
        let version = source.server_version().await.unwrap();
        assert!(version.starts_with('3'), "{version}");
    }

    #[tokio::test]
    async fn test_stream_rows_decodes_by_kind() {
        let mut source = memory_source().await;
        source
            .execute("CREATE TABLE t (id INTEGER, payload BLOB)")
            .await
            .unwrap();
        source
            .execute("INSERT INTO t VALUES (1, X'00FF'), (2, NULL)")
            .await
            .unwrap();

        let mut seen = Vec::new();
        let count = source
            .stream_rows(
                "SELECT CAST(id AS TEXT), payload FROM t ORDER BY id",
                &[ValueKind::Text, ValueKind::Binary],
                &mut |row| {
                    seen.push(row);
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            seen,
            vec![
                vec![SqlValue::Text("1".to_string()), SqlValue::Bytes(vec![0x00, 0xFF])],
                vec![SqlValue::Text("2".to_string()), SqlValue::Null],
            ]
        );
    }

    #[tokio::test]
    async fn test_visitor_error_stops_stream() {
        let mut source = memory_source().await;
        let mut calls = 0;
        let result = source
            .stream_rows(
                "SELECT 1 UNION ALL SELECT 2",
                &[ValueKind::Text],
                &mut |_| {
                    calls += 1;
                    Err(crate::Error::NotFound("stop".to_string()))
                },
            )
            .await;
        assert!(matches!(result, Err(crate::Error::NotFound(_))));
        assert_eq!(calls, 1);
    }
}
