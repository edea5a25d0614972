use connectors::sql::base::adapter::SqlAdapter;
use model::{
    core::{
        utils::{escape_sql_string, quote_ident, quote_sql_literal},
        value::Value,
    },
    records::row::RowData,
};

/// Connection settings a dump relies on. Written once at the top of the
/// dump and replayed before every import batch.
pub const SESSION_PRELUDE: [&str; 2] = ["SET NAMES utf8mb4", "SET foreign_key_checks = 0"];

/// Renders a value for an `INSERT`, preferring the engine's escaping for text.
pub fn sql_literal(adapter: &dyn SqlAdapter, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => {
            let escaped = adapter
                .escape_string(s)
                .unwrap_or_else(|| escape_sql_string(s));
            format!("'{escaped}'")
        }
        other => quote_sql_literal(other),
    }
}

/// `DROP TABLE IF EXISTS` followed by the table's `CREATE` statement.
pub fn structure_statements(table: &str, create_statement: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS {};\n{};\n",
        quote_ident(table),
        create_statement.trim_end().trim_end_matches(';')
    )
}

fn column_list(row: &RowData) -> String {
    row.columns().map(quote_ident).collect::<Vec<_>>().join(", ")
}

fn value_tuple(adapter: &dyn SqlAdapter, row: &RowData) -> String {
    let values: Vec<String> = row
        .field_values
        .iter()
        .map(|f| sql_literal(adapter, &f.value))
        .collect();
    format!("({})", values.join(", "))
}

pub fn insert_row(adapter: &dyn SqlAdapter, table: &str, row: &RowData) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {};\n",
        quote_ident(table),
        column_list(row),
        value_tuple(adapter, row)
    )
}

/// One multi-row `INSERT`. Column names come from the first row.
pub fn bulk_insert(adapter: &dyn SqlAdapter, table: &str, rows: &[RowData]) -> Option<String> {
    let first = rows.first()?;
    let tuples: Vec<String> = rows.iter().map(|r| value_tuple(adapter, r)).collect();
    Some(format!(
        "INSERT INTO {} ({}) VALUES\n{};\n",
        quote_ident(table),
        column_list(first),
        tuples.join(",\n")
    ))
}

/// Checks that a bulk `INSERT` is well formed and carries `expected_rows`
/// value groups: balanced parentheses and quotes, a `VALUES` keyword outside
/// literals and a single terminating `;`.
pub fn validate_bulk_insert(sql: &str, expected_rows: usize) -> bool {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut groups = 0usize;
    let mut quote: Option<u8> = None;
    let mut saw_values = false;
    let mut terminated = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' && q != b'`' {
                i += 2;
                continue;
            }
            if b == q {
                // doubled quote is an escaped quote
                if bytes.get(i + 1) == Some(&q) {
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }
        if terminated && !b.is_ascii_whitespace() {
            return false;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => {
                if depth == 0 {
                    groups += 1;
                }
                depth += 1;
            }
            b')' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            b';' if depth == 0 => terminated = true,
            b'V' | b'v' if depth == 0 && !saw_values => {
                if sql
                    .get(i..i + 6)
                    .is_some_and(|w| w.eq_ignore_ascii_case("VALUES"))
                {
                    saw_values = true;
                    i += 6;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    quote.is_none() && depth == 0 && terminated && saw_values && groups == expected_rows + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sql::memory::adapter::MemoryAdapter;
    use model::core::value::FieldValue;

    fn row(id: i64, name: &str) -> RowData {
        RowData::new(
            "t",
            vec![
                FieldValue::new("id", Value::Int(id)),
                FieldValue::new("name", Value::String(name.into())),
                FieldValue::new("note", Value::Null),
            ],
        )
    }

    #[test]
    fn renders_single_row_insert() {
        let adapter = MemoryAdapter::new();
        let sql = insert_row(&adapter, "wp_posts", &row(1, "it's"));
        assert_eq!(
            sql,
            "INSERT INTO `wp_posts` (`id`, `name`, `note`) VALUES ('1', 'it\\'s', NULL);\n"
        );
    }

    #[test]
    fn structure_drops_before_create() {
        let sql = structure_statements("t", "CREATE TABLE `t` (id INT);");
        assert_eq!(sql, "DROP TABLE IF EXISTS `t`;\nCREATE TABLE `t` (id INT);\n");
    }

    #[test]
    fn bulk_insert_validates() {
        let adapter = MemoryAdapter::new();
        let rows = vec![row(1, "a(b"), row(2, "c';d"), row(3, "e\\")];
        let sql = bulk_insert(&adapter, "t", &rows).unwrap();
        assert!(validate_bulk_insert(&sql, 3));
        assert!(!validate_bulk_insert(&sql, 2));
    }

    #[test]
    fn rejects_malformed_bulk_insert() {
        assert!(!validate_bulk_insert("INSERT INTO `t` (`a`) VALUES ('1'", 1));
        assert!(!validate_bulk_insert("INSERT INTO `t` (`a`) VALUES ('1);", 1));
        assert!(!validate_bulk_insert("INSERT INTO `t` (`a`) ('1');", 1));
        assert!(!validate_bulk_insert("INSERT INTO `t` (`a`) VALUES ('1'); x", 1));
        assert!(validate_bulk_insert("INSERT INTO `t` (`a`) VALUES ('1'),('2');\n", 2));
    }

    #[test]
    fn empty_bulk_is_none() {
        let adapter = MemoryAdapter::new();
        assert!(bulk_insert(&adapter, "t", &[]).is_none());
    }
}
