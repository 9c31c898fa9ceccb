//! Database access layer
//!
//! This module selects the driver for a DSN, opens a single connection and
//! prepares the session (init commands, server version) before anything is
//! dumped.

pub mod traits;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the main trait
pub use traits::{DatabaseError, SourceConnection};

use crate::{Error, Result};
use std::fmt;

/// Database flavors this build can dump
///
/// A variant only exists when its Cargo feature is enabled, so a token for a
/// disabled driver is reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    #[cfg(feature = "mysql")]
    MySql,
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl Driver {
    /// Resolve a (lower-cased) DSN driver token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for tokens this build does not support.
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            #[cfg(feature = "mysql")]
            "mysql" => Ok(Driver::MySql),
            #[cfg(feature = "postgres")]
            "pgsql" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(Driver::Sqlite),
            other => Err(Error::Config(format!("unsupported driver: {}", other))),
        }
    }

    /// Canonical driver name
    pub fn name(&self) -> &'static str {
        match *self {
            #[cfg(feature = "mysql")]
            Driver::MySql => "mysql",
            #[cfg(feature = "postgres")]
            Driver::Postgres => "pgsql",
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An open source connection with its session prepared
pub struct Session<C> {
    /// The connection every dump statement runs on
    pub connection: C,

    /// Server version reported after the init commands ran
    pub server_version: String,
}

/// Run the init commands on a fresh connection and record the server version
///
/// Commands run in order; the first failure aborts the session.
///
/// # Errors
///
/// Returns [`Error::Connection`] naming the driver when an init command or
/// the version query fails.
pub async fn open_session<C: SourceConnection>(
    mut connection: C,
    init_commands: &[String],
) -> Result<Session<C>> {
    let driver = connection.driver_name();

    for command in init_commands {
        tracing::debug!(driver, command = %command, "Running init command");
        connection
            .execute(command)
            .await
            .map_err(|error| connection_error(driver, error))?;
    }

    let server_version = connection
        .server_version()
        .await
        .map_err(|error| connection_error(driver, error))?;
    tracing::info!(driver, server_version = %server_version, "Connected to source database");

    Ok(Session {
        connection,
        server_version,
    })
}

/// Wrap a low-level failure that happened while connecting
pub fn connection_error(driver: &str, error: DatabaseError) -> Error {
    Error::Connection {
        driver: driver.to_string(),
        message: error.to_string(),
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::sqlite::SqliteSource;
    use super::*;
    use sqlx::{Connection, SqliteConnection};

    async fn memory_source() -> SqliteSource {
        SqliteSource::new(SqliteConnection::connect("sqlite::memory:").await.unwrap())
    }

    #[test]
    fn test_driver_tokens() {
        assert_eq!(Driver::from_token("sqlite").unwrap(), Driver::Sqlite);
        #[cfg(feature = "postgres")]
        for token in ["pgsql", "postgres", "postgresql"] {
            assert_eq!(Driver::from_token(token).unwrap(), Driver::Postgres);
        }
        #[cfg(feature = "mysql")]
        assert_eq!(Driver::from_token("mysql").unwrap().name(), "mysql");
    }

    #[test]
    fn test_unsupported_driver_is_config_error() {
        match Driver::from_token("oracle") {
            Err(Error::Config(message)) => assert_eq!(message, "unsupported driver: oracle"),
            other => panic!("unexpected result: {:?}", other.map(|d| d.name())),
        }
    }

    #[tokio::test]
    async fn test_open_session_runs_init_commands_in_order() {
        let commands = vec![
            "CREATE TEMP TABLE init_log (step TEXT)".to_string(),
            "INSERT INTO init_log VALUES ('first')".to_string(),
        ];
        let mut session = open_session(memory_source().await, &commands).await.unwrap();
        assert!(session.server_version.starts_with('3'));

        let rows = session
            .connection
            .query_text("SELECT step FROM init_log")
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Some("first".to_string())]]);
    }

    #[tokio::test]
    async fn test_failing_init_command_names_driver() {
        let commands = vec!["THIS IS NOT SQL".to_string()];
        let error = open_session(memory_source().await, &commands)
            .await
            .err()
            .unwrap();
        match error {
            Error::Connection { driver, message } => {
                assert_eq!(driver, "sqlite");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
