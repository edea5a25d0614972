use crate::core::value::Value;
use std::fmt::Write;

/// Escapes a string the way MySQL's `mysql_real_escape_string` does for a
/// connection without `NO_BACKSLASH_ESCAPES`. Used when the engine offers no
/// escape facility of its own.
pub fn escape_sql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 * bytes.len());
    for b in bytes {
        // writing into a String cannot fail
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Renders a value as a SQL literal: `NULL` stays unquoted, everything else
/// is single-quoted with quotes, backslashes, NUL, CR and LF neutralized.
/// Binary payloads that are not valid UTF-8 become hex literals.
pub fn quote_sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => format!("'{}'", escape_sql_string(s)),
            Err(_) => format!("X'{}'", encode_hex(b)),
        },
        other => format!(
            "'{}'",
            escape_sql_string(&other.as_string().unwrap_or_default())
        ),
    }
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
