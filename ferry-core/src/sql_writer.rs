use crate::separated_by;
use std::fmt::Write;

/// Writes the statements the execution layer issues on its own.
///
/// Everything else comes already compiled from the query builder. Drivers override
/// single methods when their dialect differs (placeholders are `$1`, `$2`, ... by default).
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// Placeholder of the parameter at `index`, starting from 1.
    fn write_placeholder(&self, out: &mut String, index: usize) {
        let _ = write!(out, "${}", index);
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK");
    }

    fn write_limit_offset(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        if let Some(limit) = limit {
            let _ = write!(out, " LIMIT {}", limit);
        }
        if let Some(offset) = offset {
            let _ = write!(out, " OFFSET {}", offset);
        }
    }

    /// `WHERE a = $n AND b = $n+1`, placeholders numbered after `first_placeholder - 1` bound values.
    fn write_where_equal(&self, out: &mut String, columns: &[&str], first_placeholder: usize) {
        if columns.is_empty() {
            return;
        }
        out.push_str(" WHERE ");
        let mut index = first_placeholder;
        separated_by(
            out,
            columns,
            |out, column| {
                self.write_identifier_quoted(out, column);
                out.push_str(" = ");
                self.write_placeholder(out, index);
                index += 1;
            },
            " AND ",
        );
    }

    fn write_select(&self, out: &mut String, table: &str, columns: &[&str], filter: &[&str]) {
        out.push_str("SELECT ");
        if columns.is_empty() {
            out.push('*');
        } else {
            separated_by(
                out,
                columns,
                |out, column| self.write_identifier_quoted(out, column),
                ", ",
            );
        }
        out.push_str(" FROM ");
        self.write_identifier_quoted(out, table);
        self.write_where_equal(out, filter, 1);
    }

    /// Multi-row insert with `rows` groups of `columns.len()` placeholders.
    fn write_insert(
        &self,
        out: &mut String,
        table: &str,
        columns: &[&str],
        rows: usize,
        returning: Option<&str>,
    ) {
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(out, table);
        out.push_str(" (");
        separated_by(
            out,
            columns,
            |out, column| self.write_identifier_quoted(out, column),
            ", ",
        );
        out.push_str(") VALUES ");
        let mut index = 1;
        separated_by(
            out,
            0..rows,
            |out, _| {
                out.push('(');
                separated_by(
                    out,
                    columns,
                    |out, _| {
                        self.write_placeholder(out, index);
                        index += 1;
                    },
                    ", ",
                );
                out.push(')');
            },
            ", ",
        );
        if let Some(column) = returning {
            out.push_str(" RETURNING ");
            self.write_identifier_quoted(out, column);
        }
    }

    /// Update of `columns` for the row whose `key` matches the last placeholder.
    fn write_update(&self, out: &mut String, table: &str, columns: &[&str], key: &str) {
        out.push_str("UPDATE ");
        self.write_identifier_quoted(out, table);
        out.push_str(" SET ");
        let mut index = 1;
        separated_by(
            out,
            columns,
            |out, column| {
                self.write_identifier_quoted(out, column);
                out.push_str(" = ");
                self.write_placeholder(out, index);
                index += 1;
            },
            ", ",
        );
        self.write_where_equal(out, &[key], columns.len() + 1);
    }

    fn write_delete(&self, out: &mut String, table: &str, filter: &[&str]) {
        out.push_str("DELETE FROM ");
        self.write_identifier_quoted(out, table);
        self.write_where_equal(out, filter, 1);
    }
}

/// Writer with the default dialect.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter;

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
