//! Dump settings
//!
//! The option vocabulary is fixed. User options arrive as a JSON map and are
//! overlaid onto the defaults; any key outside the vocabulary is rejected.

use crate::sink::CompressionMethod;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options controlling what gets dumped and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DumpSettings {
    /// Only dump these tables (empty means all)
    pub include_tables: Vec<String>,

    /// Never dump these tables or views
    pub exclude_tables: Vec<String>,

    /// Output compression
    pub compress: CompressionMethod,

    /// Statements run on the source connection right after connecting
    #[serde(rename = "init_commands")]
    pub init_commands: Vec<String>,

    /// Skip row data
    pub no_data: bool,

    /// Strip `AUTO_INCREMENT=n` from table DDL
    pub reset_auto_increment: bool,

    /// Emit a `DROP DATABASE` before the database header
    pub add_drop_database: bool,

    /// Emit `DROP TABLE` / `DROP VIEW` before each create
    pub add_drop_table: bool,

    /// Emit `DROP TRIGGER` before each trigger
    pub add_drop_trigger: bool,

    /// Surround each table's rows with write-lock statements
    pub add_locks: bool,

    /// Name every column in INSERT statements
    pub complete_insert: bool,

    /// Emit a database-level create/use header
    pub databases: bool,

    /// Client character set for the session and the dump
    pub default_character_set: String,

    /// Surround each table's rows with disable/enable keys statements
    pub disable_keys: bool,

    /// Batch several rows into one INSERT statement
    pub extended_insert: bool,

    /// Dump scheduled events (MySQL)
    pub events: bool,

    /// Encode binary columns as hex literals
    pub hex_blob: bool,

    /// Use the flavor's "ignore duplicates" INSERT form
    pub insert_ignore: bool,

    /// Upper bound in bytes for one extended INSERT statement
    #[serde(rename = "net_buffer_length")]
    pub net_buffer_length: usize,

    /// Wrap each table's rows in an explicit transaction
    pub no_autocommit: bool,

    /// Skip table DDL
    pub no_create_info: bool,

    /// Read-lock each table on the source while its rows are read
    pub lock_tables: bool,

    /// Dump stored procedures and functions
    pub routines: bool,

    /// Read everything inside one consistent-snapshot transaction
    pub single_transaction: bool,

    /// Skip triggers
    pub skip_triggers: bool,

    /// Do not force the session time zone to UTC
    pub skip_tz_utc: bool,

    /// Omit comments (banner, footer, per-object headers)
    pub skip_comments: bool,

    /// Omit the dump date from the banner and footer
    pub skip_dump_date: bool,

    /// Strip `DEFINER=` clauses from views, triggers, routines and events
    pub skip_definer: bool,

    /// Row filter appended to every data SELECT
    #[serde(rename = "where")]
    pub where_clause: String,

    /// Views to dump; always a copy of `include-tables`
    #[serde(skip)]
    pub include_views: Vec<String>,

    /// Session init list derived from `init_commands` and the charset / tz options
    #[serde(skip)]
    pub session_init: Vec<InitCommand>,
}

/// A statement to run on the source connection before dumping
///
/// Character set and time zone commands are kept symbolic; each flavor
/// renders them in its own syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitCommand {
    Raw(String),
    CharacterSet(String),
    UtcTimeZone,
}

impl Default for DumpSettings {
    fn default() -> Self {
        let mut settings = Self {
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            compress: CompressionMethod::None,
            init_commands: Vec::new(),
            no_data: false,
            reset_auto_increment: false,
            add_drop_database: false,
            add_drop_table: false,
            add_drop_trigger: true,
            add_locks: true,
            complete_insert: false,
            databases: false,
            default_character_set: "utf8mb4".to_string(),
            disable_keys: true,
            extended_insert: true,
            events: false,
            hex_blob: true,
            insert_ignore: false,
            net_buffer_length: 1_000_000,
            no_autocommit: true,
            no_create_info: false,
            lock_tables: true,
            routines: false,
            single_transaction: true,
            skip_triggers: false,
            skip_tz_utc: false,
            skip_comments: false,
            skip_dump_date: false,
            skip_definer: false,
            where_clause: String::new(),
            include_views: Vec::new(),
            session_init: Vec::new(),
        };
        settings.derive_implicit();
        settings
    }
}

impl DumpSettings {
    /// Build settings from a user option map overlaid on the defaults
    pub fn from_overrides(overrides: &Value) -> Result<Self> {
        Self::default().with_overrides(overrides)
    }

    /// Overlay an option map onto these settings
    ///
    /// Nested maps merge key by key, everything else overwrites. The result
    /// is validated against the fixed vocabulary, so a single unknown key
    /// fails the whole merge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `overrides` is not a map, contains an
    /// unknown key, or a value of the wrong type.
    pub fn with_overrides(&self, overrides: &Value) -> Result<Self> {
        let overrides = match overrides {
            Value::Null => return Ok(self.clone()),
            Value::Object(map) => map,
            other => {
                return Err(Error::Config(format!(
                    "dump settings must be a map, got {}",
                    json_type_name(other)
                )));
            }
        };

        let mut merged = serde_json::to_value(self)
            .map_err(|error| Error::Config(format!("cannot serialize dump settings: {}", error)))?;

        if let Value::Object(base) = &merged {
            let unknown: Vec<&str> = overrides
                .keys()
                .filter(|key| !base.contains_key(key.as_str()))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(Error::Config(format!(
                    "unexpected dump setting(s): {}",
                    unknown.join(", ")
                )));
            }
        }

        overlay(&mut merged, &Value::Object(overrides.clone()));

        for key in ["include-tables", "exclude-tables"] {
            if !is_string_list(merged.get(key)) {
                return Err(Error::Config(format!("{} must be a list of table names", key)));
            }
        }

        let mut settings: DumpSettings = serde_json::from_value(merged)
            .map_err(|error| Error::Config(format!("invalid dump settings: {}", error)))?;
        settings.derive_implicit();
        Ok(settings)
    }

    /// Recompute the settings that follow from the user-facing ones
    fn derive_implicit(&mut self) {
        // Views named like requested tables are dumped as well.
        self.include_views = self.include_tables.clone();

        self.session_init = self
            .init_commands
            .iter()
            .cloned()
            .map(InitCommand::Raw)
            .collect();
        self.session_init
            .push(InitCommand::CharacterSet(self.default_character_set.clone()));
        if !self.skip_tz_utc {
            self.session_init.push(InitCommand::UtcTimeZone);
        }
    }

    /// Whether source-side read locks are taken for each table
    ///
    /// A snapshot transaction already gives a consistent read, and a MySQL
    /// `LOCK TABLES` would implicitly commit it.
    pub fn effective_lock_tables(&self) -> bool {
        self.lock_tables && !self.single_transaction
    }
}

/// Recursively overlay `overrides` onto `base`
///
/// Maps merge key by key; any other value in `overrides` replaces the one in
/// `base`.
pub fn overlay(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, value) => *base = value.clone(),
    }
}

fn is_string_list(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Array(items)) if items.iter().all(Value::is_string))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// Parse `key=value` into a single-entry option map
///
/// The value is read as JSON when it parses (`true`, `42`, `["a","b"]`) and
/// as a plain string otherwise.
pub fn parse_assignment(assignment: &str) -> Result<Map<String, Value>> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("expected key=value, got '{}'", assignment)))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let mut map = Map::new();
    map.insert(key.trim().to_string(), value);
    Ok(map)
}
