//! INSERT statement batching
//!
//! With `extended-insert` rows are appended to the open statement as
//! `,(...)` until it grows past `net_buffer_length` bytes; the next row then
//! starts a new statement. Without it every row gets its own statement.

use crate::adapter::TypeAdapter;
use crate::database::traits::SqlValue;
use crate::schema::ColumnTypeInfo;
use crate::settings::DumpSettings;
use crate::Result;
use std::io::Write;

/// Writes the rows of one table as INSERT statements
pub struct InsertBatcher<'a> {
    adapter: &'a dyn TypeAdapter,
    settings: &'a DumpSettings,
    columns: &'a [ColumnTypeInfo],
    prefix: String,
    statement_open: bool,
    statement_len: usize,
    rows: u64,
}

impl<'a> InsertBatcher<'a> {
    /// # Arguments
    ///
    /// * `table` - Table the rows belong to
    /// * `columns` - Selected columns, in SELECT order
    /// * `column_list` - Whether INSERTs name their columns
    pub fn new(
        adapter: &'a dyn TypeAdapter,
        settings: &'a DumpSettings,
        table: &str,
        columns: &'a [ColumnTypeInfo],
        column_list: bool,
    ) -> Self {
        let prefix = adapter.start_insert(table, columns, column_list, settings);
        Self {
            adapter,
            settings,
            columns,
            prefix,
            statement_open: false,
            statement_len: 0,
            rows: 0,
        }
    }

    /// Append one row
    pub fn push<W: Write + ?Sized>(&mut self, out: &mut W, row: &[SqlValue]) -> Result<()> {
        let values: Vec<String> = self
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| self.adapter.render_value(column, value, self.settings))
            .collect();
        let tuple = format!("({})", values.join(","));

        if self.statement_open {
            let chunk = format!(",{}", tuple);
            out.write_all(chunk.as_bytes())?;
            self.statement_len += chunk.len();
        } else {
            out.write_all(self.prefix.as_bytes())?;
            out.write_all(tuple.as_bytes())?;
            self.statement_open = true;
            self.statement_len = self.prefix.len() + tuple.len();
        }
        self.rows += 1;

        if !self.settings.extended_insert || self.statement_len > self.settings.net_buffer_length {
            self.close_statement(out)?;
        }
        Ok(())
    }

    /// Terminate the open statement, if any, and return the row count
    pub fn finish<W: Write + ?Sized>(mut self, out: &mut W) -> Result<u64> {
        if self.statement_open {
            self.close_statement(out)?;
        }
        Ok(self.rows)
    }

    fn close_statement<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<()> {
        out.write_all(self.adapter.end_insert(self.settings).as_bytes())?;
        out.write_all(b"\n")?;
        self.statement_open = false;
        self.statement_len = 0;
        Ok(())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapter::sqlite::SqliteAdapter;

    fn columns() -> Vec<ColumnTypeInfo> {
        vec![
            ColumnTypeInfo {
                name: "id".to_string(),
                sql_type: "INTEGER".to_string(),
                base_type: "integer".to_string(),
                is_numeric: true,
                is_binary: false,
                is_generated: false,
                is_identity: false,
            },
            ColumnTypeInfo {
                name: "name".to_string(),
                sql_type: "TEXT".to_string(),
                base_type: "text".to_string(),
                is_numeric: false,
                is_binary: false,
                is_generated: false,
                is_identity: false,
            },
        ]
    }

    fn rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::Text("1".into()), SqlValue::Text("x".into())],
            vec![SqlValue::Text("2".into()), SqlValue::Text("y".into())],
        ]
    }

    fn render(settings: &DumpSettings, column_list: bool) -> (String, u64) {
        let columns = columns();
        let mut out = Vec::new();
        let mut batcher = InsertBatcher::new(&SqliteAdapter, settings, "t", &columns, column_list);
        for row in rows() {
            batcher.push(&mut out, &row).unwrap();
        }
        let count = batcher.finish(&mut out).unwrap();
        (String::from_utf8(out).unwrap(), count)
    }

    #[test]
    fn test_extended_insert_batches_rows() {
        let (out, count) = render(&DumpSettings::default(), false);
        assert_eq!(out, "INSERT INTO \"t\" VALUES (1,'x'),(2,'y');\n");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_one_statement_per_row() {
        let settings = DumpSettings {
            extended_insert: false,
            ..DumpSettings::default()
        };
        let (out, _) = render(&settings, false);
        assert_eq!(
            out,
            "INSERT INTO \"t\" VALUES (1,'x');\nINSERT INTO \"t\" VALUES (2,'y');\n"
        );
    }

    #[test]
    fn test_net_buffer_length_splits_statements() {
        let settings = DumpSettings {
            net_buffer_length: 10,
            ..DumpSettings::default()
        };
        let (out, count) = render(&settings, false);
        assert_eq!(out.matches("INSERT INTO").count(), 2);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_complete_insert_names_columns() {
        let (out, _) = render(&DumpSettings::default(), true);
        assert!(out.starts_with("INSERT INTO \"t\" (\"id\", \"name\") VALUES (1,'x')"));
    }

    #[test]
    fn test_no_rows_writes_nothing() {
        let settings = DumpSettings::default();
        let columns = columns();
        let mut out = Vec::new();
        let batcher = InsertBatcher::new(&SqliteAdapter, &settings, "t", &columns, false);
        assert_eq!(batcher.finish(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
