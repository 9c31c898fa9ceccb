//! MySQL/MariaDB flavor
//!
//! Output follows the layout of `mysqldump`: versioned `/*!NNNNN ... */`
//! comments for session variables, `DELIMITER ;;` around stored programs and
//! backtick-quoted identifiers.

use super::{base_type, required_column, terminate, Bracket, ObjectKind, ShowCreate, TypeAdapter};
use crate::database::traits::{TextRow, ValueKind};
use crate::database::DatabaseError;
use crate::schema::ColumnTypeInfo;
use crate::settings::{DumpSettings, InitCommand};

const NUMERIC_TYPES: &[&str] = &[
    "bit", "tinyint", "smallint", "mediumint", "int", "integer", "bigint", "decimal", "numeric",
    "float", "double", "real",
];

const BINARY_TYPES: &[&str] = &[
    "binary",
    "varbinary",
    "tinyblob",
    "blob",
    "mediumblob",
    "longblob",
    "geometry",
    "point",
    "linestring",
    "polygon",
    "multipoint",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
];

/// MySQL type adapter
pub struct MysqlAdapter;

impl TypeAdapter for MysqlAdapter {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_string(&self, value: &str) -> String {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('\'');
        for c in value.chars() {
            match c {
                '\0' => quoted.push_str("\\0"),
                '\n' => quoted.push_str("\\n"),
                '\r' => quoted.push_str("\\r"),
                '\\' => quoted.push_str("\\\\"),
                '\'' => quoted.push_str("\\'"),
                '"' => quoted.push_str("\\\""),
                '\x1a' => quoted.push_str("\\Z"),
                c => quoted.push(c),
            }
        }
        quoted.push('\'');
        quoted
    }

    fn init_command(&self, command: &InitCommand) -> Option<String> {
        Some(match command {
            InitCommand::Raw(sql) => sql.clone(),
            InitCommand::CharacterSet(charset) => format!("SET NAMES {}", charset),
            InitCommand::UtcTimeZone => "SET TIME_ZONE='+00:00'".to_string(),
        })
    }

    fn show_tables(&self, database: &str) -> String {
        format!(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
            self.quote_string(database)
        )
    }

    fn show_views(&self, database: &str) -> String {
        format!(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'VIEW' ORDER BY TABLE_NAME",
            self.quote_string(database)
        )
    }

    fn show_triggers(&self, database: &str) -> String {
        format!(
            "SELECT CAST(TRIGGER_NAME AS CHAR(255)), CAST(EVENT_OBJECT_TABLE AS CHAR(255)) \
             FROM INFORMATION_SCHEMA.TRIGGERS WHERE TRIGGER_SCHEMA = {} \
             ORDER BY EVENT_OBJECT_TABLE, ACTION_ORDER, TRIGGER_NAME",
            self.quote_string(database)
        )
    }

    fn show_routines(&self, database: &str) -> Option<String> {
        Some(format!(
            "SELECT CAST(ROUTINE_NAME AS CHAR(255)), CAST(ROUTINE_TYPE AS CHAR(16)) \
             FROM INFORMATION_SCHEMA.ROUTINES WHERE ROUTINE_SCHEMA = {} \
             ORDER BY ROUTINE_TYPE DESC, ROUTINE_NAME",
            self.quote_string(database)
        ))
    }

    fn show_events(&self, database: &str) -> Option<String> {
        Some(format!(
            "SELECT CAST(EVENT_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.EVENTS \
             WHERE EVENT_SCHEMA = {} ORDER BY EVENT_NAME",
            self.quote_string(database)
        ))
    }

    fn show_columns(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT CAST(COLUMN_NAME AS CHAR(255)), CAST(COLUMN_TYPE AS CHAR(255)), \
             CAST(DATA_TYPE AS CHAR(64)), CAST(EXTRA AS CHAR(255)) \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn parse_column(&self, row: &TextRow) -> Result<ColumnTypeInfo, DatabaseError> {
        let name = required_column(row, 0, "column name")?;
        let sql_type = required_column(row, 1, "column type")?;
        let base = match row.get(2).cloned().flatten() {
            Some(data_type) => data_type.to_lowercase(),
            None => base_type(&sql_type),
        };
        let extra = row.get(3).cloned().flatten().unwrap_or_default().to_uppercase();

        Ok(ColumnTypeInfo {
            is_numeric: NUMERIC_TYPES.contains(&base.as_str()),
            is_binary: BINARY_TYPES.contains(&base.as_str()),
            // DEFAULT_GENERATED only marks an expression default
            is_generated: extra.contains("VIRTUAL GENERATED")
                || extra.contains("STORED GENERATED"),
            is_identity: false,
            name,
            sql_type,
            base_type: base,
        })
    }

    fn show_create(&self, database: &str, kind: ObjectKind, name: &str) -> Option<ShowCreate> {
        let (keyword, ddl_column) = match kind {
            ObjectKind::Table => ("TABLE", 1),
            ObjectKind::View => ("VIEW", 1),
            ObjectKind::Trigger => ("TRIGGER", 2),
            ObjectKind::Procedure => ("PROCEDURE", 2),
            ObjectKind::Function => ("FUNCTION", 2),
            ObjectKind::Event => ("EVENT", 3),
        };
        Some(ShowCreate {
            sql: format!(
                "SHOW CREATE {} {}.{}",
                keyword,
                self.quote_identifier(database),
                self.quote_identifier(name)
            ),
            ddl_column,
        })
    }

    fn start_snapshot(&self) -> Vec<String> {
        vec![
            "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ".to_string(),
            "START TRANSACTION /*!40100 WITH CONSISTENT SNAPSHOT */".to_string(),
        ]
    }

    fn commit_snapshot(&self) -> Option<String> {
        Some("COMMIT".to_string())
    }

    fn lock_table_for_read(&self, table: &str) -> Option<String> {
        Some(format!("LOCK TABLES {} READ LOCAL", self.quote_identifier(table)))
    }

    fn unlock_tables(&self) -> Option<String> {
        Some("UNLOCK TABLES".to_string())
    }

    fn backup_parameters(&self, settings: &DumpSettings) -> String {
        let mut sql = String::new();
        sql.push_str("/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;\n");
        sql.push_str("/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;\n");
        sql.push_str("/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;\n");
        sql.push_str(&format!(
            "/*!40101 SET NAMES {} */;\n",
            settings.default_character_set
        ));
        if !settings.skip_tz_utc {
            sql.push_str("/*!40103 SET @OLD_TIME_ZONE=@@TIME_ZONE */;\n");
            sql.push_str("/*!40103 SET TIME_ZONE='+00:00' */;\n");
        }
        sql.push_str("/*!40014 SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0 */;\n");
        sql.push_str(
            "/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;\n",
        );
        sql.push_str(
            "/*!40101 SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='NO_AUTO_VALUE_ON_ZERO' */;\n",
        );
        sql.push_str("/*!40111 SET @OLD_SQL_NOTES=@@SQL_NOTES, SQL_NOTES=0 */;\n\n");
        sql
    }

    fn restore_parameters(&self, settings: &DumpSettings) -> String {
        let mut sql = String::new();
        if !settings.skip_tz_utc {
            sql.push_str("/*!40103 SET TIME_ZONE=@OLD_TIME_ZONE */;\n");
        }
        sql.push_str("/*!40101 SET SQL_MODE=@OLD_SQL_MODE */;\n");
        sql.push_str("/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;\n");
        sql.push_str("/*!40014 SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS */;\n");
        sql.push_str("/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;\n");
        sql.push_str("/*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;\n");
        sql.push_str("/*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;\n");
        sql.push_str("/*!40111 SET SQL_NOTES=@OLD_SQL_NOTES */;\n\n");
        sql
    }

    fn database_header(&self, database: &str, settings: &DumpSettings) -> Option<String> {
        let database = self.quote_identifier(database);
        Some(format!(
            "CREATE DATABASE /*!32312 IF NOT EXISTS*/ {} \
             /*!40100 DEFAULT CHARACTER SET {} */;\n\nUSE {};\n\n",
            database, settings.default_character_set, database
        ))
    }

    fn drop_database(&self, database: &str) -> Option<String> {
        Some(format!(
            "/*!40000 DROP DATABASE IF EXISTS {}*/;\n",
            self.quote_identifier(database)
        ))
    }

    fn create_table(&self, ddl: &str, settings: &DumpSettings) -> String {
        let ddl = if settings.reset_auto_increment {
            strip_auto_increment(ddl)
        } else {
            ddl.to_string()
        };
        format!(
            "/*!40101 SET @saved_cs_client     = @@character_set_client */;\n\
             /*!40101 SET character_set_client = {} */;\n\
             {}\
             /*!40101 SET character_set_client = @saved_cs_client */;\n",
            settings.default_character_set,
            terminate(&ddl)
        )
    }

    fn create_view(&self, ddl: &str, settings: &DumpSettings) -> String {
        terminate(&definer_policy(ddl, settings))
    }

    fn create_trigger(&self, ddl: &str, settings: &DumpSettings) -> String {
        delimited(&definer_policy(ddl, settings))
    }

    fn create_routine(&self, ddl: &str, settings: &DumpSettings) -> String {
        delimited(&definer_policy(ddl, settings))
    }

    fn create_event(&self, ddl: &str, settings: &DumpSettings) -> String {
        delimited(&definer_policy(ddl, settings))
    }

    fn add_locks(&self, table: &str) -> Option<Bracket> {
        Some(Bracket::new(
            format!("LOCK TABLES {} WRITE;\n", self.quote_identifier(table)),
            "UNLOCK TABLES;\n",
        ))
    }

    fn disable_keys(&self, table: &str) -> Option<Bracket> {
        let table = self.quote_identifier(table);
        Some(Bracket::new(
            format!("/*!40000 ALTER TABLE {} DISABLE KEYS */;\n", table),
            format!("/*!40000 ALTER TABLE {} ENABLE KEYS */;\n", table),
        ))
    }

    fn no_autocommit(&self) -> Option<Bracket> {
        Some(Bracket::new("SET autocommit=0;\n", "COMMIT;\n"))
    }

    fn select_column(
        &self,
        column: &ColumnTypeInfo,
        settings: &DumpSettings,
    ) -> (String, ValueKind) {
        let name = self.quote_identifier(&column.name);
        if column.is_binary {
            if settings.hex_blob {
                (format!("HEX({})", name), ValueKind::Text)
            } else {
                (name, ValueKind::Binary)
            }
        } else if column.base_type == "bit" {
            // BIT values travel as raw bytes in the text protocol
            (format!("CAST({} AS UNSIGNED)", name), ValueKind::Text)
        } else {
            (name, ValueKind::Text)
        }
    }

    fn hex_literal(&self, hex: &str) -> String {
        if hex.is_empty() {
            "''".to_string()
        } else {
            format!("0x{}", hex)
        }
    }

    fn binary_literal(&self, bytes: &[u8], settings: &DumpSettings) -> String {
        if !settings.hex_blob {
            if let Ok(text) = std::str::from_utf8(bytes) {
                return self.quote_string(text);
            }
        }
        self.hex_literal(&hex::encode_upper(bytes))
    }

    fn insert_ignore_verb(&self) -> &'static str {
        "INSERT IGNORE INTO"
    }
}

/// Wrap a stored program so its body can contain `;`
fn delimited(ddl: &str) -> String {
    let ddl = ddl.trim_end();
    let ddl = ddl.strip_suffix(';').unwrap_or(ddl);
    format!("DELIMITER ;;\n{};;\nDELIMITER ;\n", ddl)
}

fn definer_policy(ddl: &str, settings: &DumpSettings) -> String {
    if settings.skip_definer {
        strip_definer(ddl)
    } else {
        ddl.to_string()
    }
}

/// Remove table-level `AUTO_INCREMENT=n` options
fn strip_auto_increment(ddl: &str) -> String {
    const MARKER: &str = " AUTO_INCREMENT=";

    let mut stripped = String::with_capacity(ddl.len());
    let mut rest = ddl;
    while let Some(index) = rest.find(MARKER) {
        stripped.push_str(&rest[..index]);
        let after = &rest[index + MARKER.len()..];
        rest = after.trim_start_matches(|c: char| c.is_ascii_digit());
    }
    stripped.push_str(rest);
    stripped
}

/// Remove `DEFINER=user@host` clauses
fn strip_definer(ddl: &str) -> String {
    const MARKER: &str = "DEFINER=";

    let mut stripped = String::with_capacity(ddl.len());
    let mut rest = ddl;
    while let Some(index) = rest.find(MARKER) {
        stripped.push_str(&rest[..index]);
        let after = &rest[index + MARKER.len()..];
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        rest = &after[end..];
        // Drop the separator that followed the clause
        rest = rest.strip_prefix(' ').unwrap_or(rest);
    }
    stripped.push_str(rest);
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::traits::SqlValue;
    use crate::schema::{RoutineInfo, RoutineKind};

    fn column(base: &str, numeric: bool, binary: bool) -> ColumnTypeInfo {
        ColumnTypeInfo {
            name: "c".to_string(),
            sql_type: base.to_string(),
            base_type: base.to_string(),
            is_numeric: numeric,
            is_binary: binary,
            is_generated: false,
            is_identity: false,
        }
    }

    #[test]
    fn test_quote_string_escapes_like_mysqldump() {
        let adapter = MysqlAdapter;
        assert_eq!(
            adapter.quote_string("it's \"a\"\n\\\0\x1a"),
            "'it\\'s \\\"a\\\"\\n\\\\\\0\\Z'"
        );
        assert_eq!(adapter.quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_init_commands() {
        let adapter = MysqlAdapter;
        assert_eq!(
            adapter.init_command(&InitCommand::CharacterSet("utf8mb4".to_string())),
            Some("SET NAMES utf8mb4".to_string())
        );
        assert_eq!(
            adapter.init_command(&InitCommand::UtcTimeZone),
            Some("SET TIME_ZONE='+00:00'".to_string())
        );
    }

    #[test]
    fn test_parse_column() {
        let adapter = MysqlAdapter;
        let row = vec![
            Some("total".to_string()),
            Some("int(11) unsigned".to_string()),
            Some("int".to_string()),
            Some("".to_string()),
        ];
        let info = adapter.parse_column(&row).unwrap();
        assert_eq!(info.base_type, "int");
        assert!(info.is_numeric && !info.is_binary && !info.is_generated);

        let row = vec![
            Some("full_name".to_string()),
            Some("varchar(64)".to_string()),
            Some("varchar".to_string()),
            Some("VIRTUAL GENERATED".to_string()),
        ];
        assert!(adapter.parse_column(&row).unwrap().is_generated);

        let row = vec![
            Some("created".to_string()),
            Some("datetime".to_string()),
            Some("datetime".to_string()),
            Some("DEFAULT_GENERATED".to_string()),
        ];
        assert!(!adapter.parse_column(&row).unwrap().is_generated);
    }

    #[test]
    fn test_render_values() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings::default();
        let int = column("int", true, false);
        let text = column("varchar", false, false);
        let blob = column("blob", false, true);

        assert_eq!(adapter.render_value(&int, &SqlValue::Null, &settings), "NULL");
        assert_eq!(adapter.render_value(&int, &SqlValue::Text("42".into()), &settings), "42");
        assert_eq!(adapter.render_value(&text, &SqlValue::Text("42".into()), &settings), "'42'");
        assert_eq!(
            adapter.render_value(&blob, &SqlValue::Text("00FF".into()), &settings),
            "0x00FF"
        );
        assert_eq!(adapter.render_value(&blob, &SqlValue::Text(String::new()), &settings), "''");
    }

    #[test]
    fn test_binary_without_hex_blob() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings {
            hex_blob: false,
            ..DumpSettings::default()
        };
        let blob = column("blob", false, true);
        assert_eq!(
            adapter.select_column(&blob, &settings),
            ("`c`".to_string(), ValueKind::Binary)
        );
        assert_eq!(
            adapter.render_value(&blob, &SqlValue::Bytes(b"it's".to_vec()), &settings),
            "'it\\'s'"
        );
        assert_eq!(
            adapter.render_value(&blob, &SqlValue::Bytes(vec![0xC3, 0x28]), &settings),
            "0xC328"
        );
    }

    #[test]
    fn test_select_column() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings::default();
        assert_eq!(
            adapter.select_column(&column("blob", false, true), &settings),
            ("HEX(`c`)".to_string(), ValueKind::Text)
        );
        assert_eq!(
            adapter.select_column(&column("bit", true, false), &settings).0,
            "CAST(`c` AS UNSIGNED)"
        );
    }

    #[test]
    fn test_strip_auto_increment_keeps_column_attribute() {
        let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL AUTO_INCREMENT\n) \
                   ENGINE=InnoDB AUTO_INCREMENT=42 DEFAULT CHARSET=utf8mb4";
        assert_eq!(
            strip_auto_increment(ddl),
            "CREATE TABLE `t` (\n  `id` int NOT NULL AUTO_INCREMENT\n) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        );
    }

    #[test]
    fn test_create_table_with_reset_auto_increment() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings {
            reset_auto_increment: true,
            ..DumpSettings::default()
        };
        let out = adapter.create_table("CREATE TABLE `t` (`id` int) AUTO_INCREMENT=7", &settings);
        assert!(out.contains("CREATE TABLE `t` (`id` int);\n"));
        assert!(out.starts_with("/*!40101 SET @saved_cs_client"));
    }

    #[test]
    fn test_strip_definer() {
        let ddl = "CREATE DEFINER=`root`@`localhost` TRIGGER `tr` \
                   BEFORE INSERT ON `t` FOR EACH ROW SET NEW.a = 1";
        assert_eq!(
            strip_definer(ddl),
            "CREATE TRIGGER `tr` BEFORE INSERT ON `t` FOR EACH ROW SET NEW.a = 1"
        );
        let view = "CREATE ALGORITHM=UNDEFINED DEFINER=`u`@`%` \
                    SQL SECURITY DEFINER VIEW `v` AS select 1";
        assert_eq!(
            strip_definer(view),
            "CREATE ALGORITHM=UNDEFINED SQL SECURITY DEFINER VIEW `v` AS select 1"
        );
    }

    #[test]
    fn test_stored_programs_use_delimiter() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings::default();
        let out = adapter.create_routine("CREATE PROCEDURE `p`() BEGIN SELECT 1; END", &settings);
        assert_eq!(
            out,
            "DELIMITER ;;\nCREATE PROCEDURE `p`() BEGIN SELECT 1; END;;\nDELIMITER ;\n"
        );
        let routine = RoutineInfo {
            name: "p".to_string(),
            kind: RoutineKind::Procedure,
        };
        assert_eq!(adapter.drop_routine(&routine), "DROP PROCEDURE IF EXISTS `p`;\n");
    }

    #[test]
    fn test_show_create_columns() {
        let adapter = MysqlAdapter;
        let show = adapter.show_create("shop", ObjectKind::Trigger, "tr").unwrap();
        assert_eq!(show.sql, "SHOW CREATE TRIGGER `shop`.`tr`");
        assert_eq!(show.ddl_column, 2);
        assert_eq!(adapter.show_create("shop", ObjectKind::Event, "e").unwrap().ddl_column, 3);
    }

    #[test]
    fn test_insert_forms() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings {
            insert_ignore: true,
            ..DumpSettings::default()
        };
        let columns = [
            ColumnTypeInfo {
                name: "id".to_string(),
                ..column("int", true, false)
            },
            ColumnTypeInfo {
                name: "name".to_string(),
                ..column("varchar", false, false)
            },
        ];
        assert_eq!(
            adapter.start_insert("t", &columns, true, &settings),
            "INSERT IGNORE INTO `t` (`id`, `name`) VALUES "
        );
        assert_eq!(adapter.end_insert(&settings), ";");
    }

    #[test]
    fn test_prologue_respects_skip_tz_utc() {
        let adapter = MysqlAdapter;
        let settings = DumpSettings::default();
        assert!(adapter.backup_parameters(&settings).contains("SET TIME_ZONE='+00:00'"));
        assert!(adapter.restore_parameters(&settings).contains("@OLD_TIME_ZONE"));

        let settings =
            DumpSettings::from_overrides(&serde_json::json!({"skip-tz-utc": true})).unwrap();
        assert!(!adapter.backup_parameters(&settings).contains("TIME_ZONE"));
        assert!(!adapter.restore_parameters(&settings).contains("TIME_ZONE"));
    }
}
