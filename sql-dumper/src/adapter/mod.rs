//! Type adapters
//!
//! A type adapter knows how one database flavor spells things: identifier
//! quoting, catalog queries, DDL wrappers, session prologue/epilogue and value
//! literals. The orchestrator holds exactly one adapter for the whole run and
//! never branches on the driver itself.
//!
//! Default method bodies follow standard SQL; each flavor overrides what it
//! does differently.

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::database::traits::{SqlValue, TextRow, ValueKind};
use crate::database::{DatabaseError, Driver};
use crate::schema::{ColumnTypeInfo, RoutineInfo, TriggerInfo};
use crate::settings::{DumpSettings, InitCommand};

/// Kind of object a `SHOW CREATE`-style query is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    View,
    Trigger,
    Procedure,
    Function,
    Event,
}

impl ObjectKind {
    /// Lower-case label used in log fields
    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Procedure => "procedure",
            ObjectKind::Function => "function",
            ObjectKind::Event => "event",
        }
    }
}

/// A query returning an object's DDL, and the result column holding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowCreate {
    pub sql: String,
    pub ddl_column: usize,
}

/// Statements written before and after a block of rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bracket {
    pub open: String,
    pub close: String,
}

impl Bracket {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

/// Flavor-specific rendering of DDL and DML
pub trait TypeAdapter: Send + Sync {
    /// Driver name shown in logs and the dump banner
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column, ...)
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a string literal
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Render a session init command, or `None` when the flavor has no
    /// equivalent
    fn init_command(&self, command: &InitCommand) -> Option<String> {
        match command {
            InitCommand::Raw(sql) => Some(sql.clone()),
            InitCommand::CharacterSet(_) | InitCommand::UtcTimeZone => None,
        }
    }

    // ===== Catalog queries =====
    //
    // Every column is read as text. Queries return rows in catalog order.

    /// Base tables, one name per row
    fn show_tables(&self, database: &str) -> String;

    /// Views, one name per row
    fn show_views(&self, database: &str) -> String;

    /// Triggers as `(name, table)` rows
    fn show_triggers(&self, database: &str) -> String;

    /// Routines as `(name, ROUTINE_TYPE)` rows; `None` when unsupported
    fn show_routines(&self, _database: &str) -> Option<String> {
        None
    }

    /// Scheduled events, one name per row; `None` when unsupported
    fn show_events(&self, _database: &str) -> Option<String> {
        None
    }

    /// Column metadata for one table, in ordinal order
    fn show_columns(&self, database: &str, table: &str) -> String;

    /// Turn a row of [`show_columns`](Self::show_columns) into type info
    fn parse_column(&self, row: &TextRow) -> Result<ColumnTypeInfo, DatabaseError>;

    /// DDL query for one object; `None` when the flavor has no such object
    fn show_create(&self, database: &str, kind: ObjectKind, name: &str) -> Option<ShowCreate>;

    /// DDL query for one trigger
    ///
    /// The default looks the trigger up by name, which is enough where
    /// trigger names are unique per schema.
    fn show_create_trigger(&self, database: &str, trigger: &TriggerInfo) -> Option<ShowCreate> {
        self.show_create(database, ObjectKind::Trigger, &trigger.name)
    }

    /// Secondary indexes of a table, one `CREATE INDEX` statement per row;
    /// `None` when the table DDL already carries them
    fn show_indexes(&self, _database: &str, _table: &str) -> Option<String> {
        None
    }

    /// Sequences feeding a table's columns as `(create, owned_by, setval)`
    /// rows. Any cell may be NULL when the step does not apply.
    fn show_sequences(&self, _database: &str, _table: &str) -> Option<String> {
        None
    }

    /// Foreign keys added after every table exists, as
    /// `(table, referenced_table, statement)` rows
    fn show_foreign_keys(&self, _database: &str) -> Option<String> {
        None
    }

    // ===== Session statements executed on the source =====

    /// Statements that open a consistent-read snapshot
    fn start_snapshot(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statement that ends the snapshot
    fn commit_snapshot(&self) -> Option<String> {
        None
    }

    /// Take a read lock on a table while its rows are read
    fn lock_table_for_read(&self, _table: &str) -> Option<String> {
        None
    }

    /// Release read locks
    fn unlock_tables(&self) -> Option<String> {
        None
    }

    // ===== Written session prologue and epilogue =====

    /// Statements written right after the banner
    fn backup_parameters(&self, _settings: &DumpSettings) -> String {
        String::new()
    }

    /// Statements written right before the footer
    fn restore_parameters(&self, _settings: &DumpSettings) -> String {
        String::new()
    }

    /// Create and select the database
    fn database_header(&self, _database: &str, _settings: &DumpSettings) -> Option<String> {
        None
    }

    /// Drop the database before recreating it
    fn drop_database(&self, _database: &str) -> Option<String> {
        None
    }

    // ===== Object DDL =====

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};\n", self.quote_identifier(table))
    }

    fn create_table(&self, ddl: &str, _settings: &DumpSettings) -> String {
        terminate(ddl)
    }

    fn drop_view(&self, view: &str) -> String {
        format!("DROP VIEW IF EXISTS {};\n", self.quote_identifier(view))
    }

    fn create_view(&self, ddl: &str, _settings: &DumpSettings) -> String {
        terminate(ddl)
    }

    fn drop_trigger(&self, trigger: &TriggerInfo) -> String {
        format!("DROP TRIGGER IF EXISTS {};\n", self.quote_identifier(&trigger.name))
    }

    fn create_trigger(&self, ddl: &str, _settings: &DumpSettings) -> String {
        terminate(ddl)
    }

    fn drop_routine(&self, routine: &RoutineInfo) -> String {
        format!(
            "DROP {} IF EXISTS {};\n",
            routine.kind.keyword(),
            self.quote_identifier(&routine.name)
        )
    }

    fn create_routine(&self, ddl: &str, _settings: &DumpSettings) -> String {
        terminate(ddl)
    }

    fn create_event(&self, ddl: &str, _settings: &DumpSettings) -> String {
        terminate(ddl)
    }

    // ===== Row data =====

    /// Write-lock statements around a table's rows (`add-locks`)
    fn add_locks(&self, _table: &str) -> Option<Bracket> {
        None
    }

    /// Disable/enable index maintenance around a table's rows
    fn disable_keys(&self, _table: &str) -> Option<Bracket> {
        None
    }

    /// Explicit transaction around a table's rows (`no-autocommit`)
    fn no_autocommit(&self) -> Option<Bracket> {
        None
    }

    /// SELECT expression for a column and how its value is decoded
    fn select_column(
        &self,
        column: &ColumnTypeInfo,
        settings: &DumpSettings,
    ) -> (String, ValueKind);

    /// SQL literal for a binary value given as hex digits
    fn hex_literal(&self, hex: &str) -> String;

    /// SQL literal for a raw binary value
    fn binary_literal(&self, bytes: &[u8], _settings: &DumpSettings) -> String {
        self.hex_literal(&hex::encode(bytes))
    }

    /// SQL literal for one decoded value
    fn render_value(
        &self,
        column: &ColumnTypeInfo,
        value: &SqlValue,
        settings: &DumpSettings,
    ) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Literal(literal) => literal.clone(),
            SqlValue::Bytes(bytes) => self.binary_literal(bytes, settings),
            // Binary column selected as server-side hex
            SqlValue::Text(hex) if column.is_binary => self.hex_literal(hex),
            SqlValue::Text(text) if column.is_numeric && looks_numeric(text) => text.clone(),
            SqlValue::Text(text) => self.quote_string(text),
        }
    }

    /// Start of an INSERT statement, up to and including `VALUES `
    ///
    /// `columns` are the inserted columns; they are named in the statement
    /// when `column_list` is set.
    fn start_insert(
        &self,
        table: &str,
        columns: &[ColumnTypeInfo],
        column_list: bool,
        settings: &DumpSettings,
    ) -> String {
        let verb = if settings.insert_ignore {
            self.insert_ignore_verb()
        } else {
            "INSERT INTO"
        };
        let mut statement = format!("{} {}", verb, self.quote_identifier(table));
        if column_list {
            let quoted: Vec<String> = columns
                .iter()
                .map(|column| self.quote_identifier(&column.name))
                .collect();
            statement.push_str(&format!(" ({})", quoted.join(", ")));
        }
        if let Some(clause) = self.insert_override(columns) {
            statement.push(' ');
            statement.push_str(clause);
        }
        statement.push_str(" VALUES ");
        statement
    }

    /// Clause placed before `VALUES` so explicit values reach identity columns
    fn insert_override(&self, _columns: &[ColumnTypeInfo]) -> Option<&'static str> {
        None
    }

    /// INSERT verb used with `insert-ignore`
    fn insert_ignore_verb(&self) -> &'static str {
        "INSERT INTO"
    }

    /// Statement terminator after the last row of an INSERT
    fn end_insert(&self, _settings: &DumpSettings) -> &'static str {
        ";"
    }
}

/// Pick the adapter for a driver
pub fn for_driver(driver: Driver) -> Box<dyn TypeAdapter> {
    match driver {
        #[cfg(feature = "mysql")]
        Driver::MySql => Box::new(mysql::MysqlAdapter),
        #[cfg(feature = "postgres")]
        Driver::Postgres => Box::new(postgres::PostgresAdapter),
        #[cfg(feature = "sqlite")]
        Driver::Sqlite => Box::new(sqlite::SqliteAdapter),
    }
}

/// Trim DDL as returned by the catalog and end it with `;` and a newline
pub fn terminate(ddl: &str) -> String {
    let ddl = ddl.trim_end();
    let ddl = ddl.strip_suffix(';').unwrap_or(ddl).trim_end();
    format!("{};\n", ddl)
}

/// Whether a value can be written as a bare numeric literal
pub fn looks_numeric(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    let (mantissa, exponent) = match digits.find(['e', 'E']) {
        Some(index) => (&digits[..index], Some(&digits[index + 1..])),
        None => (digits, None),
    };

    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    if !seen_digit {
        return false;
    }

    match exponent {
        None => true,
        Some(exponent) => {
            let exponent = exponent.strip_prefix(['-', '+']).unwrap_or(exponent);
            !exponent.is_empty() && exponent.chars().all(|c| c.is_ascii_digit())
        }
    }
}

/// Text of a catalog column that must be present
pub fn required_column(
    row: &TextRow,
    index: usize,
    what: &str,
) -> Result<String, DatabaseError> {
    row.get(index)
        .cloned()
        .flatten()
        .ok_or_else(|| DatabaseError::Shape(format!("missing {} in catalog row", what)))
}

/// Lower-cased type name without length, precision or modifiers
///
/// `"int(11) unsigned"` becomes `"int"`, `"character varying(32)"` becomes
/// `"character varying"`.
pub fn base_type(sql_type: &str) -> String {
    let end = sql_type.find('(').unwrap_or(sql_type.len());
    let base = sql_type[..end].trim().to_lowercase();
    base.strip_suffix(" unsigned")
        .or_else(|| base.strip_suffix(" signed"))
        .unwrap_or(base.as_str())
        .trim_end()
        .to_string()
}
