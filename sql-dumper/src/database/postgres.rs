//! PostgreSQL source connection
//!
//! Statements go through the simple query protocol. Catalog queries cast
//! their columns to `text`; data queries cast every non-bytea column.

use crate::database::traits::{
    first_text, DatabaseError, RowVisitor, SourceConnection, SqlValue, TextRow, ValueKind,
};
use crate::dsn::{ConnectionSpec, Endpoint};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Executor, Row};

const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL source connection
pub struct PostgresSource {
    connection: PgConnection,
}

impl PostgresSource {
    /// Wrap an open PostgreSQL connection
    pub fn new(connection: PgConnection) -> Self {
        Self { connection }
    }

    /// Connect over TCP or a Unix socket directory as described by the DSN
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self, DatabaseError> {
        let mut options = PgConnectOptions::new().database(&spec.database);

        options = match &spec.endpoint {
            Endpoint::Host(host) => options.host(host).port(spec.port.unwrap_or(DEFAULT_PORT)),
            Endpoint::Socket(path) => {
                let options = options.socket(path);
                match spec.port {
                    Some(port) => options.port(port),
                    None => options,
                }
            }
        };
        if let Some(username) = &spec.username {
            options = options.username(username);
        }
        if let Some(password) = &spec.password {
            options = options.password(password);
        }

        let connection = PgConnection::connect_with(&options).await?;
        Ok(Self::new(connection))
    }

    fn text_column(row: &PgRow, index: usize) -> Result<Option<String>, DatabaseError> {
        Ok(row.try_get::<Option<String>, _>(index)?)
    }

    fn decode_row(row: &PgRow, kinds: &[ValueKind]) -> Result<Vec<SqlValue>, DatabaseError> {
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
impl SourceConnection for PostgresSource {
    fn driver_name(&self) -> &'static str {
        "pgsql"
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
        let rows = self.query_text("SHOW server_version").await?;
        first_text(&rows).ok_or_else(|| DatabaseError::Shape("empty server_version".to_string()))
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

    // Requires a running PostgreSQL server; set TEST_PGSQL_DSN to run.
    #[tokio::test]
    #[ignore]
    async fn test_connect_and_read_version() {
        let dsn = std::env::var("TEST_PGSQL_DSN").unwrap();
        let spec = ConnectionSpec::parse(&dsn).unwrap();
        let mut source = PostgresSource::connect(&spec).await.unwrap();
        assert!(!source.server_version().await.unwrap().is_empty());
    }
}
