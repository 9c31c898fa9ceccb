//! # sql-dumper
//!
//! A one-shot export engine that writes a replayable SQL dump (DDL + data) of
//! a MySQL, PostgreSQL or SQLite database, optionally gzip or bzip2
//! compressed.
//!
//! ## Features
//!
//! - `mysqldump`-compatible option vocabulary, validated strictly
//! - Consistent snapshot reads (`single-transaction`)
//! - Extended (batched) or one-row-per-statement INSERTs
//! - Tables, views, triggers, stored routines and events
//! - Row streaming: tables are never loaded into memory
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sql_dumper::Dumper;
//!
//! #[tokio::main]
//! async fn main() -> sql_dumper::Result<()> {
//!     let dumper = Dumper::new(
//!         "sqlite:host=localhost;dbname=app.db",
//!         None,
//!         None,
//!         &serde_json::json!({"extended-insert": false}),
//!     )?;
//!
//!     // Writes the dump to stdout
//!     dumper.dump(None).await?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod adapter;
pub mod database;
pub mod dsn;
pub mod dump;
pub mod schema;
pub mod settings;
pub mod sink;

// Public exports
pub use adapter::TypeAdapter;
pub use database::{DatabaseError, Driver, SourceConnection};
pub use dsn::ConnectionSpec;
pub use dump::{DumpStage, Dumper};
pub use schema::{ColumnTypeInfo, DumpSummary, SchemaCatalog};
pub use settings::DumpSettings;
pub use sink::{CompressionMethod, DumpSink};

// Error type
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error ({driver}): {message}")]
    Connection { driver: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, Error>;
