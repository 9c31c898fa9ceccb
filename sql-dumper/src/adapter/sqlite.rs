//! SQLite flavor
//!
//! The output mirrors the `.dump` command of the sqlite3 shell: the whole
//! script runs in one transaction with foreign keys off.
//!
//! SQLite types values, not columns: a column declared `TEXT` may hold a
//! blob and an untyped column may hold anything. Row literals are therefore
//! built in the SELECT from each value's storage class.

use super::{base_type, required_column, ObjectKind, ShowCreate, TypeAdapter};
use crate::database::traits::{TextRow, ValueKind};
use crate::database::DatabaseError;
use crate::schema::ColumnTypeInfo;
use crate::settings::DumpSettings;

/// SQLite type adapter
pub struct SqliteAdapter;

/// Whether a declared type has INTEGER, REAL or NUMERIC affinity
fn numeric_affinity(declared: &str) -> bool {
    if declared.contains("int") {
        return true;
    }
    if declared.contains("char") || declared.contains("clob") || declared.contains("text") {
        return false;
    }
    if declared.contains("blob") || declared.is_empty() {
        return false;
    }
    true
}

impl TypeAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn show_tables(&self, _database: &str) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            .to_string()
    }

    fn show_views(&self, _database: &str) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'view'".to_string()
    }

    fn show_triggers(&self, _database: &str) -> String {
        "SELECT name, tbl_name FROM sqlite_master WHERE type = 'trigger'".to_string()
    }

    fn show_columns(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT name, type, hidden FROM pragma_table_xinfo({}) ORDER BY cid",
            self.quote_string(table)
        )
    }

    fn parse_column(&self, row: &TextRow) -> Result<ColumnTypeInfo, DatabaseError> {
        let name = required_column(row, 0, "column name")?;
        let sql_type = row.get(1).cloned().flatten().unwrap_or_default();
        let base = base_type(&sql_type);
        // 2 and 3 mark virtual and stored generated columns
        let hidden = row.get(2).cloned().flatten().unwrap_or_default();

        Ok(ColumnTypeInfo {
            is_numeric: numeric_affinity(&base),
            is_binary: base.contains("blob"),
            is_generated: hidden == "2" || hidden == "3",
            is_identity: false,
            name,
            sql_type,
            base_type: base,
        })
    }

    fn show_create(&self, _database: &str, kind: ObjectKind, name: &str) -> Option<ShowCreate> {
        let object_type = match kind {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Procedure | ObjectKind::Function | ObjectKind::Event => return None,
        };
        Some(ShowCreate {
            sql: format!(
                "SELECT sql FROM sqlite_master WHERE type = '{}' AND name = {}",
                object_type,
                self.quote_string(name)
            ),
            ddl_column: 0,
        })
    }

    fn show_indexes(&self, _database: &str, table: &str) -> Option<String> {
        // Automatic indexes behind UNIQUE and PRIMARY KEY have no SQL
        Some(format!(
            "SELECT sql FROM sqlite_master \
             WHERE type = 'index' AND tbl_name = {} AND sql IS NOT NULL",
            self.quote_string(table)
        ))
    }

    fn start_snapshot(&self) -> Vec<String> {
        vec!["BEGIN".to_string()]
    }

    fn commit_snapshot(&self) -> Option<String> {
        Some("COMMIT".to_string())
    }

    fn backup_parameters(&self, _settings: &DumpSettings) -> String {
        "PRAGMA foreign_keys=OFF;\nBEGIN TRANSACTION;\n\n".to_string()
    }

    fn restore_parameters(&self, _settings: &DumpSettings) -> String {
        "COMMIT;\nPRAGMA foreign_keys=ON;\n\n".to_string()
    }

    fn select_column(
        &self,
        column: &ColumnTypeInfo,
        _settings: &DumpSettings,
    ) -> (String, ValueKind) {
        let name = self.quote_identifier(&column.name);
        // quote() keeps only 15 significant digits of a REAL, so reals are
        // printed with 17 and infinities spelled as overflowing literals
        let literal = format!(
            "CASE typeof({0}) \
             WHEN 'real' THEN CASE \
             WHEN {0} > 1.7976931348623157e308 THEN '9e999' \
             WHEN {0} < -1.7976931348623157e308 THEN '-9e999' \
             ELSE printf('%!.17g', {0}) END \
             ELSE quote({0}) END",
            name
        );
        (literal, ValueKind::Literal)
    }

    fn hex_literal(&self, hex: &str) -> String {
        format!("X'{}'", hex)
    }

    fn insert_ignore_verb(&self) -> &'static str {
        "INSERT OR IGNORE INTO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::traits::SqlValue;
    use crate::settings::InitCommand;

    fn parse(name: &str, declared: &str, hidden: &str) -> ColumnTypeInfo {
        SqliteAdapter
            .parse_column(&vec![
                Some(name.to_string()),
                Some(declared.to_string()),
                Some(hidden.to_string()),
            ])
            .unwrap()
    }

    #[test]
    fn test_type_affinity() {
        assert!(parse("id", "INTEGER", "0").is_numeric);
        assert!(parse("price", "DECIMAL(10,2)", "0").is_numeric);
        assert!(parse("ratio", "REAL", "0").is_numeric);
        assert!(!parse("name", "VARCHAR(20)", "0").is_numeric);
        assert!(!parse("anything", "", "0").is_numeric);

        let blob = parse("payload", "BLOB", "0");
        assert!(blob.is_binary && !blob.is_numeric);
        assert!(parse("total", "INTEGER", "3").is_generated);
    }

    #[test]
    fn test_charset_and_timezone_render_nothing() {
        let adapter = SqliteAdapter;
        assert_eq!(
            adapter.init_command(&InitCommand::CharacterSet("utf8mb4".to_string())),
            None
        );
        assert_eq!(adapter.init_command(&InitCommand::UtcTimeZone), None);
        assert_eq!(
            adapter.init_command(&InitCommand::Raw("PRAGMA cache_size = 100".to_string())),
            Some("PRAGMA cache_size = 100".to_string())
        );
    }

    #[test]
    fn test_render_values() {
        let adapter = SqliteAdapter;
        let settings = DumpSettings::default();
        let text = parse("name", "TEXT", "0");
        let blob = parse("payload", "BLOB", "0");
        let number = parse("id", "INTEGER", "0");

        let render = |column: &ColumnTypeInfo, value: SqlValue| {
            adapter.render_value(column, &value, &settings)
        };

        assert_eq!(render(&text, SqlValue::Text("O'Brien".into())), "'O''Brien'");
        assert_eq!(render(&number, SqlValue::Text("7".into())), "7");
        assert_eq!(render(&number, SqlValue::Text("seven".into())), "'seven'");
        assert_eq!(render(&blob, SqlValue::Text("00FF".into())), "X'00FF'");
        assert_eq!(render(&blob, SqlValue::Bytes(vec![1, 2])), "X'0102'");
        assert_eq!(render(&text, SqlValue::Literal("X'00'".into())), "X'00'");
    }

    #[test]
    fn test_values_are_selected_as_literals() {
        let adapter = SqliteAdapter;
        let (expression, kind) =
            adapter.select_column(&parse("note", "TEXT", "0"), &DumpSettings::default());
        assert_eq!(kind, ValueKind::Literal);
        assert!(expression.starts_with("CASE typeof(\"note\")"));
        assert!(expression.contains("printf('%!.17g', \"note\")"));
        assert!(expression.ends_with("ELSE quote(\"note\") END"));
    }

    #[test]
    fn test_index_query_skips_automatic_indexes() {
        let sql = SqliteAdapter.show_indexes("main", "users").unwrap();
        assert!(sql.contains("type = 'index' AND tbl_name = 'users'"));
        assert!(sql.ends_with("sql IS NOT NULL"));
    }

    #[test]
    fn test_no_routines_or_events() {
        let adapter = SqliteAdapter;
        assert!(adapter.show_routines("main").is_none());
        assert!(adapter.show_events("main").is_none());
        assert!(adapter.show_create("main", ObjectKind::Procedure, "p").is_none());
        assert!(adapter.database_header("main", &DumpSettings::default()).is_none());
    }

    #[test]
    fn test_insert_or_ignore() {
        let adapter = SqliteAdapter;
        let settings = DumpSettings {
            insert_ignore: true,
            ..DumpSettings::default()
        };
        assert_eq!(
            adapter.start_insert("t", &[], false, &settings),
            "INSERT OR IGNORE INTO \"t\" VALUES "
        );
    }
}
