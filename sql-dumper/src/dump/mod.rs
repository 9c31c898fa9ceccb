//! Export orchestrator
//!
//! A dump runs through fixed stages: connect, open the sink, write the banner
//! and session prologue, discover the schema, export tables (then foreign
//! keys), views, triggers, routines and events, write the epilogue and footer,
//! close the sink. The first error aborts the run; nothing is retried.

pub mod discovery;
pub mod insert;

use crate::adapter::{self, terminate, ObjectKind, ShowCreate, TypeAdapter};
use crate::database::traits::{SourceConnection, ValueKind};
use crate::database::{connection_error, open_session, DatabaseError, Driver};
use crate::dsn::ConnectionSpec;
use crate::schema::{ColumnTypeInfo, DumpSummary, RoutineKind, SchemaCatalog};
use crate::settings::DumpSettings;
use crate::sink::{CompressionMethod, DumpSink};
use crate::Result;
use discovery::{check_includes, discover};
use insert::InsertBatcher;
use serde_json::Value;
use std::io::Write;
use std::path::Path;

#[cfg(feature = "mysql")]
use crate::database::mysql::MysqlSource;
#[cfg(feature = "postgres")]
use crate::database::postgres::PostgresSource;
#[cfg(feature = "sqlite")]
use crate::database::sqlite::SqliteSource;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStage {
    Idle,
    Connected,
    SinkOpen,
    HeaderWritten,
    SchemaDiscovered,
    Exporting(ExportPhase),
    Finalized,
    Closed,
}

/// Object group being exported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Tables,
    Views,
    Triggers,
    Routines,
    Events,
}

/// One-shot dump of a database
///
/// # Example
///
/// ```rust,no_run
/// use sql_dumper::Dumper;
/// use std::path::Path;
///
/// # async fn example() -> sql_dumper::Result<()> {
/// let dumper = Dumper::new(
///     "mysql:host=localhost;dbname=shop",
///     Some("backup".to_string()),
///     Some("secret".to_string()),
///     &serde_json::json!({"compress": "gzip", "add-drop-table": true}),
/// )?;
/// let summary = dumper.dump(Some(Path::new("shop.sql.gz"))).await?;
/// println!("{} rows", summary.rows);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Dumper {
    spec: ConnectionSpec,
    settings: DumpSettings,
}

impl Dumper {
    /// Parse the DSN and settings; nothing is connected yet
    ///
    /// # Arguments
    ///
    /// * `dsn` - Connection string, e.g. `pgsql:host=db;dbname=app`
    /// * `username` / `password` - Credentials, overriding those in the DSN
    /// * `overrides` - Option map overlaid on the default settings
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a malformed DSN or invalid settings.
    pub fn new(
        dsn: &str,
        username: Option<String>,
        password: Option<String>,
        overrides: &Value,
    ) -> Result<Self> {
        let spec = ConnectionSpec::parse(dsn)?.with_credentials(username, password);
        let settings = DumpSettings::from_overrides(overrides)?;
        Ok(Self::with_settings(spec, settings))
    }

    /// Build a dumper from already validated parts
    pub fn with_settings(spec: ConnectionSpec, settings: DumpSettings) -> Self {
        if settings.lock_tables && settings.single_transaction {
            tracing::debug!("lock-tables is ignored while single-transaction is on");
        }
        Self { spec, settings }
    }

    pub fn settings(&self) -> &DumpSettings {
        &self.settings
    }

    pub fn connection_spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    /// Dump to a file, or to stdout when `output` is `None`
    pub async fn dump(&self, output: Option<&Path>) -> Result<DumpSummary> {
        self.run(Destination::Path(output)).await
    }

    /// Dump into an arbitrary writer
    pub async fn dump_to_writer(&self, writer: Box<dyn Write + Send>) -> Result<DumpSummary> {
        self.run(Destination::Writer(writer)).await
    }

    async fn run(&self, destination: Destination<'_>) -> Result<DumpSummary> {
        let driver = Driver::from_token(&self.spec.driver)?;
        let adapter = adapter::for_driver(driver);
        tracing::info!(connection = %self.spec, "Starting dump");

        match driver {
            #[cfg(feature = "mysql")]
            Driver::MySql => {
                let source = MysqlSource::connect(&self.spec)
                    .await
                    .map_err(|error| connection_error(driver.name(), error))?;
                self.export(source, &*adapter, destination).await
            }
            #[cfg(feature = "postgres")]
            Driver::Postgres => {
                let source = PostgresSource::connect(&self.spec)
                    .await
                    .map_err(|error| connection_error(driver.name(), error))?;
                self.export(source, &*adapter, destination).await
            }
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => {
                let source = SqliteSource::connect(&self.spec)
                    .await
                    .map_err(|error| connection_error(driver.name(), error))?;
                self.export(source, &*adapter, destination).await
            }
        }
    }

    async fn export<C: SourceConnection>(
        &self,
        source: C,
        adapter: &dyn TypeAdapter,
        destination: Destination<'_>,
    ) -> Result<DumpSummary> {
        let mut stage = DumpStage::Idle;

        let init_commands: Vec<String> = self
            .settings
            .session_init
            .iter()
            .filter_map(|command| adapter.init_command(command))
            .collect();
        let mut session = open_session(source, &init_commands).await?;
        advance(&mut stage, DumpStage::Connected);

        let sink = destination.open(self.settings.compress)?;
        advance(&mut stage, DumpStage::SinkOpen);

        let export = Export {
            spec: &self.spec,
            settings: &self.settings,
            adapter,
            source: &mut session.connection,
            sink,
            stage,
            summary: DumpSummary {
                server_version: session.server_version.clone(),
                ..DumpSummary::default()
            },
        };
        export.run().await
    }
}

enum Destination<'p> {
    Path(Option<&'p Path>),
    Writer(Box<dyn Write + Send>),
}

impl Destination<'_> {
    fn open(self, method: CompressionMethod) -> Result<DumpSink> {
        match self {
            Destination::Path(path) => DumpSink::open(method, path),
            Destination::Writer(writer) => Ok(DumpSink::from_writer(method, writer)),
        }
    }
}

fn advance(stage: &mut DumpStage, next: DumpStage) {
    tracing::debug!(from = ?stage, to = ?next, "Dump stage");
    *stage = next;
}

/// State of a run between opening the sink and closing it
struct Export<'a, C: SourceConnection> {
    spec: &'a ConnectionSpec,
    settings: &'a DumpSettings,
    adapter: &'a dyn TypeAdapter,
    source: &'a mut C,
    sink: DumpSink,
    stage: DumpStage,
    summary: DumpSummary,
}

impl<C: SourceConnection> Export<'_, C> {
    async fn run(mut self) -> Result<DumpSummary> {
        self.write_banner()?;
        let prologue = self.adapter.backup_parameters(self.settings);
        self.write(&prologue)?;
        self.advance(DumpStage::HeaderWritten);

        if self.settings.single_transaction {
            for statement in self.adapter.start_snapshot() {
                self.source.execute(&statement).await?;
            }
        }

        if self.settings.databases {
            self.write_database_header()?;
        }

        let database = self.spec.database.as_str();
        let catalog = discover(&mut *self.source, self.adapter, database, self.settings).await?;
        check_includes(&catalog, self.settings)?;
        self.advance(DumpStage::SchemaDiscovered);

        self.advance(DumpStage::Exporting(ExportPhase::Tables));
        for table in &catalog.tables {
            self.export_table(&table.name).await?;
        }
        self.summary.tables = catalog.tables.len();
        if !self.settings.no_create_info {
            self.export_foreign_keys(&catalog).await?;

            self.advance(DumpStage::Exporting(ExportPhase::Views));
            for view in &catalog.views {
                self.comment(&format!("View structure for view {}", self.quote(&view.name)))?;
                if self.settings.add_drop_table {
                    let drop = self.adapter.drop_view(&view.name);
                    self.write(&drop)?;
                }
                if let Some(ddl) = self.fetch_ddl(ObjectKind::View, &view.name).await? {
                    let create = self.adapter.create_view(&ddl, self.settings);
                    self.write(&create)?;
                    self.write("\n")?;
                }
            }
            self.summary.views = catalog.views.len();
        }

        self.advance(DumpStage::Exporting(ExportPhase::Triggers));
        for trigger in &catalog.triggers {
            self.comment(&format!(
                "Trigger {} on table {}",
                self.quote(&trigger.name),
                self.quote(&trigger.table)
            ))?;
            if self.settings.add_drop_trigger {
                let drop = self.adapter.drop_trigger(trigger);
                self.write(&drop)?;
            }
            let show = self.adapter.show_create_trigger(&self.spec.database, trigger);
            if let Some(ddl) = self.read_ddl(show, ObjectKind::Trigger, &trigger.name).await? {
                let create = self.adapter.create_trigger(&ddl, self.settings);
                self.write(&create)?;
                self.write("\n")?;
            }
        }
        self.summary.triggers = catalog.triggers.len();

        self.advance(DumpStage::Exporting(ExportPhase::Routines));
        for routine in &catalog.routines {
            let kind = match routine.kind {
                RoutineKind::Procedure => ObjectKind::Procedure,
                RoutineKind::Function => ObjectKind::Function,
            };
            self.comment(&format!(
                "Dumping routine {} {}",
                routine.kind.keyword().to_lowercase(),
                self.quote(&routine.name)
            ))?;
            let drop = self.adapter.drop_routine(routine);
            self.write(&drop)?;
            if let Some(ddl) = self.fetch_ddl(kind, &routine.name).await? {
                let create = self.adapter.create_routine(&ddl, self.settings);
                self.write(&create)?;
                self.write("\n")?;
            }
        }
        self.summary.routines = catalog.routines.len();

        self.advance(DumpStage::Exporting(ExportPhase::Events));
        for event in &catalog.events {
            self.comment(&format!("Dumping event {}", self.quote(&event.name)))?;
            if let Some(ddl) = self.fetch_ddl(ObjectKind::Event, &event.name).await? {
                let create = self.adapter.create_event(&ddl, self.settings);
                self.write(&create)?;
                self.write("\n")?;
            }
        }
        self.summary.events = catalog.events.len();

        let epilogue = self.adapter.restore_parameters(self.settings);
        self.write(&epilogue)?;
        if self.settings.single_transaction {
            if let Some(statement) = self.adapter.commit_snapshot() {
                self.source.execute(&statement).await?;
            }
        }
        self.advance(DumpStage::Finalized);

        self.write_footer()?;
        self.sink.close()?;
        tracing::debug!(from = ?self.stage, to = ?DumpStage::Closed, "Dump stage");

        tracing::info!(
            tables = self.summary.tables,
            views = self.summary.views,
            triggers = self.summary.triggers,
            routines = self.summary.routines,
            events = self.summary.events,
            rows = self.summary.rows,
            "Dump completed"
        );
        Ok(self.summary)
    }

    async fn export_table(&mut self, table: &str) -> Result<()> {
        tracing::debug!(table, "Exporting table");
        let sequences = if self.settings.no_create_info && self.settings.no_data {
            Vec::new()
        } else {
            self.table_sequences(table).await?
        };

        if !self.settings.no_create_info {
            self.comment(&format!("Table structure for table {}", self.quote(table)))?;
            if self.settings.add_drop_table {
                let drop = self.adapter.drop_table(table);
                self.write(&drop)?;
            }
            for create in sequences.iter().filter_map(|steps| steps.create.as_deref()) {
                self.write(&terminate(create))?;
            }
            if let Some(ddl) = self.fetch_ddl(ObjectKind::Table, table).await? {
                let create = self.adapter.create_table(&ddl, self.settings);
                self.write(&create)?;
            }
            for owned_by in sequences.iter().filter_map(|steps| steps.owned_by.as_deref()) {
                self.write(&terminate(owned_by))?;
            }
            self.write("\n")?;
        }

        if !self.settings.no_data {
            self.export_rows(table).await?;
            let setvals: Vec<&str> = sequences
                .iter()
                .filter_map(|steps| steps.setval.as_deref())
                .collect();
            for setval in &setvals {
                self.write(&terminate(setval))?;
            }
            if !setvals.is_empty() {
                self.write("\n")?;
            }
        }

        if !self.settings.no_create_info {
            self.export_indexes(table).await?;
        }
        Ok(())
    }

    /// Sequences feeding the table's columns
    async fn table_sequences(&mut self, table: &str) -> Result<Vec<SequenceSteps>> {
        let Some(sql) = self.adapter.show_sequences(&self.spec.database, table) else {
            return Ok(Vec::new());
        };
        let rows = self.source.query_text(&sql).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                SequenceSteps {
                    create: cells.next().flatten(),
                    owned_by: cells.next().flatten(),
                    setval: cells.next().flatten(),
                }
            })
            .collect())
    }

    /// Secondary indexes, created once the rows are in
    async fn export_indexes(&mut self, table: &str) -> Result<()> {
        let Some(sql) = self.adapter.show_indexes(&self.spec.database, table) else {
            return Ok(());
        };
        let indexes: Vec<String> = self
            .source
            .query_text(&sql)
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect();
        if indexes.is_empty() {
            return Ok(());
        }

        tracing::debug!(table, indexes = indexes.len(), "Writing indexes");
        for index in &indexes {
            self.write(&terminate(index))?;
        }
        self.write("\n")
    }

    /// Foreign keys between exported tables, added after all of them exist
    async fn export_foreign_keys(&mut self, catalog: &SchemaCatalog) -> Result<()> {
        let Some(sql) = self.adapter.show_foreign_keys(&self.spec.database) else {
            return Ok(());
        };
        let mut statements = Vec::new();
        for row in self.source.query_text(&sql).await? {
            let mut cells = row.into_iter();
            let (Some(table), Some(references), Some(statement)) =
                (cells.next().flatten(), cells.next().flatten(), cells.next().flatten())
            else {
                continue;
            };
            if !catalog.has_table(&table) {
                continue;
            }
            if !catalog.has_table(&references) {
                tracing::warn!(
                    table = %table,
                    references = %references,
                    "Skipping foreign key to a table outside the dump"
                );
                continue;
            }
            statements.push(statement);
        }
        if statements.is_empty() {
            return Ok(());
        }

        self.comment("Foreign keys")?;
        for statement in &statements {
            self.write(&terminate(statement))?;
        }
        self.write("\n")
    }

    async fn export_rows(&mut self, table: &str) -> Result<()> {
        let database = self.spec.database.as_str();
        let rows = self
            .source
            .query_text(&self.adapter.show_columns(database, table))
            .await?;
        let columns = rows
            .iter()
            .map(|row| self.adapter.parse_column(row))
            .collect::<std::result::Result<Vec<ColumnTypeInfo>, DatabaseError>>()?;

        // Generated columns are computed on replay; naming the rest is mandatory then
        let has_generated = columns.iter().any(|column| column.is_generated);
        let selected: Vec<ColumnTypeInfo> = columns
            .into_iter()
            .filter(|column| !column.is_generated)
            .collect();
        if selected.is_empty() {
            return Ok(());
        }

        let (expressions, kinds): (Vec<String>, Vec<ValueKind>) = selected
            .iter()
            .map(|column| self.adapter.select_column(column, self.settings))
            .unzip();
        let mut sql = format!(
            "SELECT {} FROM {}",
            expressions.join(", "),
            self.quote(table)
        );
        if !self.settings.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.settings.where_clause);
        }

        self.comment(&format!("Dumping data for table {}", self.quote(table)))?;

        let read_lock = if self.settings.effective_lock_tables() {
            self.adapter.lock_table_for_read(table)
        } else {
            None
        };
        if let Some(statement) = &read_lock {
            self.source.execute(statement).await?;
        }

        let brackets: Vec<_> = [
            self.settings.add_locks.then(|| self.adapter.add_locks(table)),
            self.settings.disable_keys.then(|| self.adapter.disable_keys(table)),
            self.settings.no_autocommit.then(|| self.adapter.no_autocommit()),
        ]
        .into_iter()
        .flatten()
        .flatten()
        .collect();
        for bracket in &brackets {
            self.write(&bracket.open)?;
        }

        let column_list = self.settings.complete_insert || has_generated;
        let mut batcher =
            InsertBatcher::new(self.adapter, self.settings, table, &selected, column_list);
        let sink = &mut self.sink;
        self.source
            .stream_rows(&sql, &kinds, &mut |row| batcher.push(&mut *sink, &row))
            .await?;
        let written = batcher.finish(&mut self.sink)?;

        for bracket in brackets.iter().rev() {
            self.write(&bracket.close)?;
        }

        if read_lock.is_some() {
            if let Some(statement) = self.adapter.unlock_tables() {
                self.source.execute(&statement).await?;
            }
        }

        self.write("\n")?;
        self.summary.rows += written;
        tracing::debug!(table, rows = written, "Table rows written");
        Ok(())
    }

    /// DDL for one object, or `None` when the flavor has no such object
    async fn fetch_ddl(&mut self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let show = self.adapter.show_create(&self.spec.database, kind, name);
        self.read_ddl(show, kind, name).await
    }

    async fn read_ddl(
        &mut self,
        show: Option<ShowCreate>,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Option<String>> {
        let Some(show) = show else {
            return Ok(None);
        };
        let rows = self.source.query_text(&show.sql).await?;
        let ddl = rows
            .first()
            .and_then(|row| row.get(show.ddl_column).cloned().flatten())
            .ok_or_else(|| {
                DatabaseError::Shape(format!(
                    "no definition returned for {} {}",
                    kind.label(),
                    name
                ))
            })?;
        Ok(Some(ddl))
    }

    fn write_banner(&mut self) -> Result<()> {
        if self.settings.skip_comments {
            return Ok(());
        }
        let mut banner = format!(
            "-- sql-dumper {}\n--\n-- Host: {}\tDatabase: {}\n\
             -- ------------------------------------------------------\n\
             -- Server version \t{}\n-- Driver: {}\n",
            env!("CARGO_PKG_VERSION"),
            self.spec.host(),
            self.spec.database,
            self.summary.server_version,
            self.adapter.name()
        );
        if !self.settings.skip_dump_date {
            banner.push_str(&format!("-- Date: {}\n", timestamp()));
        }
        banner.push('\n');
        self.write(&banner)
    }

    fn write_database_header(&mut self) -> Result<()> {
        let database = self.spec.database.as_str();
        self.comment(&format!("Current Database: {}", self.quote(database)))?;
        if self.settings.add_drop_database {
            if let Some(drop) = self.adapter.drop_database(database) {
                self.write(&drop)?;
            }
        }
        if let Some(header) = self.adapter.database_header(database, self.settings) {
            self.write(&header)?;
        }
        Ok(())
    }

    fn write_footer(&mut self) -> Result<()> {
        if self.settings.skip_comments {
            return Ok(());
        }
        if self.settings.skip_dump_date {
            self.write("-- Dump completed\n")
        } else {
            self.write(&format!("-- Dump completed on: {}\n", timestamp()))
        }
    }

    /// Section comment, omitted with `skip-comments`
    fn comment(&mut self, text: &str) -> Result<()> {
        if self.settings.skip_comments {
            return Ok(());
        }
        self.write(&format!("--\n-- {}\n--\n\n", text))
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.sink.write_str(text)
    }

    fn quote(&self, name: &str) -> String {
        self.adapter.quote_identifier(name)
    }

    fn advance(&mut self, next: DumpStage) {
        advance(&mut self.stage, next);
    }
}

/// Statements that recreate one sequence and restore its position
struct SequenceSteps {
    create: Option<String>,
    owned_by: Option<String>,
    setval: Option<String>,
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc2822()
}
