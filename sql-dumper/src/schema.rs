//! Schema types for catalog discovery
//!
//! These types describe the database objects discovered at runtime. Every
//! collection keeps the order in which the catalog query returned it.

use serde::{Deserialize, Serialize};

/// Objects discovered in the source database, in catalog order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCatalog {
    /// Base tables selected for export
    pub tables: Vec<TableInfo>,

    /// Views selected for export
    pub views: Vec<ViewInfo>,

    /// Triggers selected for export
    pub triggers: Vec<TriggerInfo>,

    /// Stored procedures and functions
    pub routines: Vec<RoutineInfo>,

    /// Scheduled events
    pub events: Vec<EventInfo>,
}

impl SchemaCatalog {
    /// Whether a table with this name was selected for export
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table.name == name)
    }
}

/// A base table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Table name
    pub name: String,
}

/// A view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    /// View name
    pub name: String,
}

/// A trigger and the table it fires on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    /// Trigger name
    pub name: String,

    /// Owning table
    pub table: String,
}

/// Kind of stored routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    /// Map a catalog `ROUTINE_TYPE` value
    pub fn from_catalog(value: &str) -> Self {
        if value.eq_ignore_ascii_case("function") {
            RoutineKind::Function
        } else {
            RoutineKind::Procedure
        }
    }

    /// SQL keyword for this kind
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        }
    }
}

/// A stored procedure or function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineInfo {
    /// Routine name
    pub name: String,

    /// Procedure or function
    pub kind: RoutineKind,
}

/// A scheduled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    /// Event name
    pub name: String,
}

/// Type information for a single column, used to pick the value encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnTypeInfo {
    /// Column name
    pub name: String,

    /// SQL data type as reported by the catalog (e.g. "int(11) unsigned")
    pub sql_type: String,

    /// Lower-cased base type without length or modifiers (e.g. "int")
    pub base_type: String,

    /// Values can be written unquoted
    pub is_numeric: bool,

    /// Values are raw bytes
    pub is_binary: bool,

    /// Computed by the server; never selected or inserted
    pub is_generated: bool,

    /// Identity column that only accepts explicit values with an override
    pub is_identity: bool,
}

/// Summary of a finished dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpSummary {
    /// Server version reported after connecting
    pub server_version: String,

    /// Number of tables exported
    pub tables: usize,

    /// Number of views exported
    pub views: usize,

    /// Number of triggers exported
    pub triggers: usize,

    /// Number of routines exported
    pub routines: usize,

    /// Number of events exported
    pub events: usize,

    /// Total rows written as INSERT values
    pub rows: u64,
}
