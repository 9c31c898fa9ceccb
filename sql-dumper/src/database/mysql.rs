//! MySQL/MariaDB source connection
//!
//! Statements are sent unprepared, so the server answers in the text
//! protocol and every value arrives as its textual form. Values are read as
//! bytes and interpreted as UTF-8.

use crate::database::traits::{
    first_text, DatabaseError, RowVisitor, SourceConnection, SqlValue, TextRow, ValueKind,
};
use crate::dsn::{ConnectionSpec, Endpoint};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection, Executor, Row};

const DEFAULT_PORT: u16 = 3306;

/// MySQL source connection
pub struct MysqlSource {
    connection: MySqlConnection,
}

impl MysqlSource {
    /// Wrap an open MySQL connection
    pub fn new(connection: MySqlConnection) -> Self {
        Self { connection }
    }

    /// Connect over TCP or a Unix socket as described by the DSN
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self, DatabaseError> {
        let mut options = MySqlConnectOptions::new().database(&spec.database);

        options = match &spec.endpoint {
            Endpoint::Host(host) => options.host(host).port(spec.port.unwrap_or(DEFAULT_PORT)),
            Endpoint::Socket(path) => options.socket(path),
        };
        if let Some(username) = &spec.username {
            options = options.username(username);
        }
        if let Some(password) = &spec.password {
            options = options.password(password);
        }
        if let Some(charset) = &spec.charset {
            options = options.charset(charset);
        }

        let connection = MySqlConnection::connect_with(&options).await?;
        Ok(Self::new(connection))
    }

    /// Read a column as bytes and interpret them as UTF-8
    ///
    /// The text protocol sends every value as its textual form, whatever the
    /// column type, and some servers report catalog columns as binary
    /// strings. The type check is skipped for that reason.
    fn text_column(row: &MySqlRow, index: usize) -> Result<Option<String>, DatabaseError> {
        let bytes: Option<Vec<u8>> = row.try_get_unchecked(index)?;
        Ok(bytes.map(bytes_to_string))
    }

    fn decode_row(row: &MySqlRow, kinds: &[ValueKind]) -> Result<Vec<SqlValue>, DatabaseError> {
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
            .map(|(index, kind)| {
                let bytes: Option<Vec<u8>> = row.try_get_unchecked(index)?;
                Ok(match (bytes, kind) {
                    (None, _) => SqlValue::Null,
                    (Some(bytes), ValueKind::Text) => SqlValue::Text(bytes_to_string(bytes)),
                    (Some(bytes), ValueKind::Binary) => SqlValue::Bytes(bytes),
                    (Some(bytes), ValueKind::Literal) => SqlValue::Literal(bytes_to_string(bytes)),
                })
            })
            .collect()
    }
}

fn bytes_to_string(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|error| String::from_utf8_lossy(error.as_bytes()).into_owned())
}

#[async_trait]
impl SourceConnection for MysqlSource {
    fn driver_name(&self) -> &'static str {
        "mysql"
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
        let rows = self.query_text("SELECT VERSION()").await?;
        first_text(&rows).ok_or_else(|| DatabaseError::Shape("empty VERSION()".to_string()))
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

    #[test]
    fn test_bytes_to_string_is_lossy_on_invalid_utf8() {
        assert_eq!(bytes_to_string(b"plain".to_vec()), "plain");
        assert_eq!(bytes_to_string(vec![b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    // Requires a running MySQL server; set TEST_MYSQL_DSN to run.
    #[tokio::test]
    #[ignore]
    async fn test_connect_and_read_version() {
        let dsn = std::env::var("TEST_MYSQL_DSN").unwrap();
        let spec = ConnectionSpec::parse(&dsn).unwrap();
        let mut source = MysqlSource::connect(&spec).await.unwrap();
        assert!(!source.server_version().await.unwrap().is_empty());
    }
}
