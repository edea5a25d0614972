use crate::{dump::statement::sql_literal, error::ProcessingError};
use connectors::sql::base::{adapter::SqlAdapter, requests::FetchRowsRequest};
use model::core::{utils::quote_ident, value::Value};
use std::{fmt::Write, sync::Arc};
use tracing::{debug, info};

/// A URL-bearing table, named without the site's table prefix.
#[derive(Debug, Clone, Copy)]
pub struct UrlColumns {
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

pub const URL_COLUMNS: &[UrlColumns] = &[
    UrlColumns {
        table: "options",
        key: "option_id",
        columns: &["option_value"],
    },
    UrlColumns {
        table: "posts",
        key: "ID",
        columns: &["post_content", "guid", "post_excerpt"],
    },
    UrlColumns {
        table: "postmeta",
        key: "meta_id",
        columns: &["meta_value"],
    },
    UrlColumns {
        table: "comments",
        key: "comment_ID",
        columns: &["comment_content", "comment_author_url"],
    },
    UrlColumns {
        table: "usermeta",
        key: "umeta_id",
        columns: &["meta_value"],
    },
    UrlColumns {
        table: "termmeta",
        key: "meta_id",
        columns: &["meta_value"],
    },
];

/// Replaces `from` with `to`, recomputing the byte length of every PHP
/// serialized string (`s:N:"...";`) so the payload still unserializes.
pub fn replace_serialized(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() || !text.contains(from) {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut plain_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some((start, end)) = serialized_string_at(text, i) {
            out.push_str(&text[plain_start..i].replace(from, to));
            let inner = replace_serialized(&text[start..end], from, to);
            // writing into a String cannot fail
            let _ = write!(out, "s:{}:\"{}\";", inner.len(), inner);
            i = end + 2;
            plain_start = i;
            continue;
        }
        i += 1;
    }
    out.push_str(&text[plain_start..].replace(from, to));
    out
}

/// Content bounds of a serialized string starting at `i`, if one does.
fn serialized_string_at(text: &str, i: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(i) != Some(&b's') || bytes.get(i + 1) != Some(&b':') {
        return None;
    }
    let digits = i + 2;
    let mut j = digits;
    while bytes.get(j).is_some_and(u8::is_ascii_digit) {
        j += 1;
    }
    if j == digits || bytes.get(j) != Some(&b':') || bytes.get(j + 1) != Some(&b'"') {
        return None;
    }
    let len: usize = text[digits..j].parse().ok()?;
    let start = j + 2;
    let end = start.checked_add(len)?;
    if bytes.get(end) != Some(&b'"') || bytes.get(end + 1) != Some(&b';') {
        return None;
    }
    text.is_char_boundary(end).then_some((start, end))
}

/// Rewrites a value for both the plain and the JSON-escaped (`\/`) spelling.
pub fn rewrite_value(text: &str, from: &str, to: &str) -> String {
    let plain = replace_serialized(text, from, to);
    let escaped_from = from.replace('/', "\\/");
    if escaped_from == from {
        return plain;
    }
    replace_serialized(&plain, &escaped_from, &to.replace('/', "\\/"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub tables: usize,
    pub rows_scanned: u64,
    pub rows_updated: u64,
}

/// Moves stored site URLs from the source site to the target site.
pub struct UrlRewriter {
    adapter: Arc<dyn SqlAdapter>,
    table_prefix: String,
    page_size: u64,
}

impl UrlRewriter {
    pub fn new(adapter: Arc<dyn SqlAdapter>, table_prefix: &str, page_size: u64) -> Self {
        UrlRewriter {
            adapter,
            table_prefix: table_prefix.to_string(),
            page_size: page_size.max(1),
        }
    }

    pub async fn rewrite(&self, from: &str, to: &str) -> Result<RewriteSummary, ProcessingError> {
        let from = from.trim_end_matches('/');
        let to = to.trim_end_matches('/');
        let mut summary = RewriteSummary::default();
        if from.is_empty() || from == to {
            info!("Source and target URLs match, nothing to rewrite");
            return Ok(summary);
        }

        let existing = self.adapter.list_tables().await?;
        for target in URL_COLUMNS {
            let table = format!("{}{}", self.table_prefix, target.table);
            if !existing.contains(&table) {
                debug!(table = %table, "Table absent, skipping URL rewrite");
                continue;
            }
            summary.tables += 1;
            self.rewrite_table(&table, target, from, to, &mut summary).await?;
        }

        info!(
            from,
            to,
            tables = summary.tables,
            rows = summary.rows_updated,
            "URL rewrite complete"
        );
        Ok(summary)
    }

    async fn rewrite_table(
        &self,
        table: &str,
        target: &UrlColumns,
        from: &str,
        to: &str,
        summary: &mut RewriteSummary,
    ) -> Result<(), ProcessingError> {
        let adapter = self.adapter.as_ref();
        let mut offset = 0;
        loop {
            let rows = adapter
                .fetch_rows(FetchRowsRequest::new(table, self.page_size, offset))
                .await?;
            let fetched = rows.len() as u64;

            for row in &rows {
                summary.rows_scanned += 1;
                let mut sets = Vec::new();
                for column in target.columns {
                    let Some(field) = row.get(column) else {
                        continue;
                    };
                    let Some(text) = field.value.as_text() else {
                        continue;
                    };
                    let rewritten = rewrite_value(text, from, to);
                    if rewritten != text {
                        sets.push(format!(
                            "{} = {}",
                            quote_ident(&field.name),
                            sql_literal(adapter, &Value::String(rewritten))
                        ));
                    }
                }
                if sets.is_empty() {
                    continue;
                }
                let key = row.get_value(target.key);
                if key.is_null() {
                    continue;
                }
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = {}",
                    quote_ident(table),
                    sets.join(", "),
                    quote_ident(target.key),
                    sql_literal(adapter, &key)
                );
                adapter.exec(&sql).await?;
                summary.rows_updated += 1;
            }

            offset += fetched;
            if fetched < self.page_size {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sql::memory::adapter::{MemoryAdapter, MemoryTable};
    use model::{core::value::FieldValue, records::row::RowData};

    #[test]
    fn fixes_serialized_lengths() {
        let from = "http://old.test";
        let to = "https://new.example.com";
        let input = r#"a:2:{s:3:"url";s:20:"http://old.test/blog";s:4:"name";s:4:"Site";}"#;
        let output = replace_serialized(input, from, to);
        assert_eq!(
            output,
            r#"a:2:{s:3:"url";s:28:"https://new.example.com/blog";s:4:"name";s:4:"Site";}"#
        );
    }

    #[test]
    fn fixes_nested_serialized_payloads() {
        let inner = r#"s:15:"http://old.test";"#;
        let outer = format!(r#"s:{}:"{}";"#, inner.len(), inner);
        let output = replace_serialized(&outer, "http://old.test", "http://new.test.org");
        let inner_new = r#"s:19:"http://new.test.org";"#;
        assert_eq!(output, format!(r#"s:{}:"{}";"#, inner_new.len(), inner_new));
    }

    #[test]
    fn plain_text_and_json_escaped_urls() {
        let text = r#"<a href="http://old.test/x">{"u":"http:\/\/old.test\/y"}</a>"#;
        let output = rewrite_value(text, "http://old.test", "https://new.test");
        assert_eq!(
            output,
            r#"<a href="https://new.test/x">{"u":"https:\/\/new.test\/y"}</a>"#
        );
    }

    #[test]
    fn broken_length_prefix_is_left_as_plain_text() {
        let input = r#"s:99:"http://old.test";"#;
        let output = replace_serialized(input, "http://old.test", "http://n.test");
        assert_eq!(output, r#"s:99:"http://n.test";"#);
    }

    fn option(id: i64, value: &str) -> RowData {
        RowData::new(
            "wp_options",
            vec![
                FieldValue::new("option_id", Value::Int(id)),
                FieldValue::new("option_value", Value::String(value.into())),
            ],
        )
    }

    #[tokio::test]
    async fn updates_changed_rows_by_key() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_table(MemoryTable::new(
                "wp_options",
                "CREATE TABLE `wp_options` (option_id INT, option_value TEXT)",
                vec![
                    option(1, "http://old.test"),
                    option(2, "unrelated"),
                    option(3, "http://old.test/wp-content"),
                ],
            ))
            .await;

        let rewriter = UrlRewriter::new(Arc::new(adapter.clone()), "wp_", 2);
        let summary = rewriter
            .rewrite("http://old.test/", "https://new.test")
            .await
            .unwrap();

        assert_eq!(summary.tables, 1);
        assert_eq!(summary.rows_scanned, 3);
        assert_eq!(summary.rows_updated, 2);
        assert_eq!(
            adapter.executed().await,
            vec![
                "UPDATE `wp_options` SET `option_value` = 'https://new.test' WHERE `option_id` = '1'",
                "UPDATE `wp_options` SET `option_value` = 'https://new.test/wp-content' WHERE `option_id` = '3'",
            ]
        );
    }

    #[tokio::test]
    async fn equal_urls_are_a_no_op() {
        let adapter = MemoryAdapter::new();
        let rewriter = UrlRewriter::new(Arc::new(adapter.clone()), "wp_", 100);
        let summary = rewriter.rewrite("http://a.test", "http://a.test/").await.unwrap();
        assert_eq!(summary, RewriteSummary::default());
        assert!(adapter.executed().await.is_empty());
    }
}
