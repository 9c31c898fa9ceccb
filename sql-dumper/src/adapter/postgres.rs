//! PostgreSQL flavor
//!
//! PostgreSQL has no `SHOW CREATE TABLE`, so table DDL is rebuilt from
//! `pg_catalog`: columns with their types, defaults, identity and NOT NULL,
//! followed by primary key, unique, check and exclusion constraints. What the
//! table statement cannot carry is written separately: sequences behind
//! `serial` columns before the table, secondary indexes after its rows, and
//! foreign keys once every table exists. Objects are read from the
//! connection's current schema.

use super::{base_type, required_column, Bracket, ObjectKind, ShowCreate, TypeAdapter};
use crate::database::traits::{TextRow, ValueKind};
use crate::database::DatabaseError;
use crate::schema::{ColumnTypeInfo, TriggerInfo};
use crate::settings::{DumpSettings, InitCommand};

const NUMERIC_TYPES: &[&str] = &["int2", "int4", "int8", "float4", "float8", "numeric", "oid"];

/// PostgreSQL type adapter
pub struct PostgresAdapter;

impl PostgresAdapter {
    /// `'"name"'::regclass`, resolved through the search path
    fn regclass(&self, name: &str) -> String {
        format!("{}::regclass", self.quote_string(&self.quote_identifier(name)))
    }
}

/// Map a MySQL-style character set name to a PostgreSQL encoding
fn encoding(charset: &str) -> String {
    match charset.to_lowercase().as_str() {
        "utf8" | "utf8mb3" | "utf8mb4" => "UTF8".to_string(),
        other => other.to_uppercase(),
    }
}

impl TypeAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn init_command(&self, command: &InitCommand) -> Option<String> {
        Some(match command {
            InitCommand::Raw(sql) => sql.clone(),
            InitCommand::CharacterSet(charset) => {
                format!("SET client_encoding TO '{}'", encoding(charset))
            }
            InitCommand::UtcTimeZone => "SET TIME ZONE 'UTC'".to_string(),
        })
    }

    fn show_tables(&self, _database: &str) -> String {
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }

    fn show_views(&self, _database: &str) -> String {
        "SELECT table_name::text FROM information_schema.views \
         WHERE table_schema = current_schema() ORDER BY table_name"
            .to_string()
    }

    fn show_triggers(&self, _database: &str) -> String {
        "SELECT t.tgname::text, c.relname::text FROM pg_trigger t \
         JOIN pg_class c ON c.oid = t.tgrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE NOT t.tgisinternal AND n.nspname = current_schema() \
         ORDER BY c.relname, t.tgname"
            .to_string()
    }

    fn show_routines(&self, _database: &str) -> Option<String> {
        Some(
            "SELECT DISTINCT p.proname::text, \
             CASE p.prokind WHEN 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END \
             FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname = current_schema() AND p.prokind IN ('f', 'p') \
             AND NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e') \
             ORDER BY 2 DESC, 1"
                .to_string(),
        )
    }

    fn show_columns(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod), t.typname::text, \
             (a.attgenerated = 's')::text, (a.attidentity = 'a')::text \
             FROM pg_attribute a JOIN pg_type t ON t.oid = a.atttypid \
             WHERE a.attrelid = {} AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            self.regclass(table)
        )
    }

    fn parse_column(&self, row: &TextRow) -> Result<ColumnTypeInfo, DatabaseError> {
        let name = required_column(row, 0, "column name")?;
        let sql_type = required_column(row, 1, "column type")?;
        let base = match row.get(2).cloned().flatten() {
            Some(type_name) => type_name.to_lowercase(),
            None => base_type(&sql_type),
        };
        let flag = |index: usize| row.get(index).cloned().flatten().as_deref() == Some("true");

        Ok(ColumnTypeInfo {
            is_numeric: NUMERIC_TYPES.contains(&base.as_str()),
            is_binary: base == "bytea",
            is_generated: flag(3),
            is_identity: flag(4),
            name,
            sql_type,
            base_type: base,
        })
    }

    fn show_create(&self, _database: &str, kind: ObjectKind, name: &str) -> Option<ShowCreate> {
        let sql = match kind {
            ObjectKind::Table => format!(
                r#"SELECT 'CREATE TABLE ' || quote_ident(c.relname) || E' (\n    '
    || array_to_string(
    ARRAY(
        SELECT quote_ident(a.attname) || ' ' || format_type(a.atttypid, a.atttypmod)
            || CASE
                WHEN a.attgenerated = 's'
                    THEN ' GENERATED ALWAYS AS (' || pg_get_expr(d.adbin, d.adrelid) || ') STORED'
                WHEN d.adbin IS NOT NULL THEN ' DEFAULT ' || pg_get_expr(d.adbin, d.adrelid)
                WHEN a.attidentity = 'a' THEN ' GENERATED ALWAYS AS IDENTITY'
                WHEN a.attidentity = 'd' THEN ' GENERATED BY DEFAULT AS IDENTITY'
                ELSE ''
            END
            || CASE WHEN a.attnotnull THEN ' NOT NULL' ELSE '' END
        FROM pg_attribute a
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
    ) || ARRAY(
        SELECT 'CONSTRAINT ' || quote_ident(k.conname) || ' ' || pg_get_constraintdef(k.oid, true)
        FROM pg_constraint k
        WHERE k.conrelid = c.oid AND k.contype IN ('p', 'u', 'c', 'x')
        ORDER BY CASE k.contype WHEN 'p' THEN 0 WHEN 'u' THEN 1 ELSE 2 END, k.conname
    ),
    E',\n    ') || E'\n)'
FROM pg_class c WHERE c.oid = {}"#,
                self.regclass(name)
            ),
            ObjectKind::View => format!(
                "SELECT 'CREATE OR REPLACE VIEW ' || quote_ident(c.relname) || E' AS\\n' \
                 || pg_get_viewdef(c.oid, true) FROM pg_class c WHERE c.oid = {}",
                self.regclass(name)
            ),
            // Trigger names are unique per table only, see `show_create_trigger`
            ObjectKind::Trigger => return None,
            ObjectKind::Procedure | ObjectKind::Function => format!(
                "SELECT string_agg(pg_get_functiondef(p.oid), E';\\n' ORDER BY p.oid) \
                 FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace \
                 WHERE p.proname = {} AND n.nspname = current_schema() AND p.prokind = '{}'",
                self.quote_string(name),
                if kind == ObjectKind::Procedure { "p" } else { "f" }
            ),
            ObjectKind::Event => return None,
        };
        Some(ShowCreate { sql, ddl_column: 0 })
    }

    fn show_create_trigger(&self, _database: &str, trigger: &TriggerInfo) -> Option<ShowCreate> {
        Some(ShowCreate {
            sql: format!(
                "SELECT pg_get_triggerdef(t.oid, true) FROM pg_trigger t \
                 WHERE t.tgname = {} AND t.tgrelid = {} AND NOT t.tgisinternal",
                self.quote_string(&trigger.name),
                self.regclass(&trigger.table)
            ),
            ddl_column: 0,
        })
    }

    fn show_indexes(&self, _database: &str, table: &str) -> Option<String> {
        // Indexes backing a primary key, unique or exclusion constraint come
        // with the table DDL
        Some(format!(
            "SELECT pg_get_indexdef(i.indexrelid) FROM pg_index i \
             WHERE i.indrelid = {} AND NOT EXISTS (\
             SELECT 1 FROM pg_constraint k WHERE k.conindid = i.indexrelid \
             AND k.conrelid = i.indrelid AND k.contype IN ('p', 'u', 'x')) \
             ORDER BY i.indexrelid",
            self.regclass(table)
        ))
    }

    fn show_sequences(&self, _database: &str, table: &str) -> Option<String> {
        // Identity sequences are created by the column itself; only their
        // position is restored
        Some(format!(
            r#"SELECT
    CASE WHEN a.attidentity = ''
        THEN 'CREATE SEQUENCE IF NOT EXISTS ' || quote_ident(s.sequencename)
        || ' AS ' || s.data_type::text
        || ' INCREMENT BY ' || s.increment_by
        || ' MINVALUE ' || s.min_value || ' MAXVALUE ' || s.max_value
        || ' START WITH ' || s.start_value || ' CACHE ' || s.cache_size
        || CASE WHEN s.cycle THEN ' CYCLE' ELSE ' NO CYCLE' END
    END,
    CASE WHEN a.attidentity = '' THEN 'ALTER SEQUENCE ' || quote_ident(s.sequencename)
        || ' OWNED BY ' || quote_ident(c.relname) || '.' || quote_ident(a.attname)
    END,
    CASE WHEN s.last_value IS NOT NULL THEN 'SELECT pg_catalog.setval(pg_get_serial_sequence('
        || quote_literal(quote_ident(c.relname)) || ', ' || quote_literal(a.attname) || '), '
        || s.last_value || ', true)'
    END
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_sequences s
    ON (quote_ident(s.schemaname) || '.' || quote_ident(s.sequencename))::regclass
        = pg_get_serial_sequence(quote_ident(c.relname), a.attname)::regclass
WHERE a.attrelid = {} AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum"#,
            self.regclass(table)
        ))
    }

    fn show_foreign_keys(&self, _database: &str) -> Option<String> {
        Some(
            "SELECT c.relname::text, r.relname::text, \
             'ALTER TABLE ' || quote_ident(c.relname) || ' ADD CONSTRAINT ' \
             || quote_ident(k.conname) || ' ' || pg_get_constraintdef(k.oid, true) \
             FROM pg_constraint k \
             JOIN pg_class c ON c.oid = k.conrelid \
             JOIN pg_class r ON r.oid = k.confrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE k.contype = 'f' AND n.nspname = current_schema() \
             ORDER BY c.relname, k.conname"
                .to_string(),
        )
    }

    fn start_snapshot(&self) -> Vec<String> {
        vec!["BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY".to_string()]
    }

    fn commit_snapshot(&self) -> Option<String> {
        Some("COMMIT".to_string())
    }

    fn backup_parameters(&self, settings: &DumpSettings) -> String {
        format!(
            "SET statement_timeout = 0;\n\
             SET client_encoding = '{}';\n\
             SET standard_conforming_strings = on;\n\
             SET check_function_bodies = false;\n\
             SET client_min_messages = warning;\n\n",
            encoding(&settings.default_character_set)
        )
    }

    fn database_header(&self, database: &str, settings: &DumpSettings) -> Option<String> {
        let database = self.quote_identifier(database);
        Some(format!(
            "CREATE DATABASE {} WITH ENCODING = '{}';\n\n\\connect {}\n\n",
            database,
            encoding(&settings.default_character_set),
            database
        ))
    }

    fn drop_database(&self, database: &str) -> Option<String> {
        Some(format!(
            "DROP DATABASE IF EXISTS {};\n",
            self.quote_identifier(database)
        ))
    }

    fn drop_trigger(&self, trigger: &TriggerInfo) -> String {
        format!(
            "DROP TRIGGER IF EXISTS {} ON {};\n",
            self.quote_identifier(&trigger.name),
            self.quote_identifier(&trigger.table)
        )
    }

    fn no_autocommit(&self) -> Option<Bracket> {
        Some(Bracket::new("BEGIN;\n", "COMMIT;\n"))
    }

    fn select_column(
        &self,
        column: &ColumnTypeInfo,
        settings: &DumpSettings,
    ) -> (String, ValueKind) {
        let name = self.quote_identifier(&column.name);
        match (column.is_binary, settings.hex_blob) {
            (true, true) => (format!("encode({}, 'hex')", name), ValueKind::Text),
            (true, false) => (name, ValueKind::Binary),
            (false, _) => (format!("{}::text", name), ValueKind::Text),
        }
    }

    fn hex_literal(&self, hex: &str) -> String {
        format!("'\\x{}'::bytea", hex)
    }

    fn insert_override(&self, columns: &[ColumnTypeInfo]) -> Option<&'static str> {
        columns
            .iter()
            .any(|column| column.is_identity)
            .then_some("OVERRIDING SYSTEM VALUE")
    }

    fn end_insert(&self, settings: &DumpSettings) -> &'static str {
        if settings.insert_ignore {
            " ON CONFLICT DO NOTHING;"
        } else {
            ";"
        }
    }
}
