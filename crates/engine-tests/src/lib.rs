#![allow(dead_code)]

use connectors::sql::memory::adapter::{MemoryAdapter, MemoryTable};
use engine_config::settings::Settings;
use engine_core::state::sled_store::SledSessionStore;
use engine_runtime::context::RuntimeContext;
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use std::{path::Path, sync::Arc};

pub mod utils;

pub const SOURCE_URL: &str = "https://source.example";
pub const TARGET_URL: &str = "https://target.example";

/// Settings with every directory under `root` and the site content in
/// `root/<site>`.
fn test_settings(root: &Path, site: &str, url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.paths.state_dir = root.join("state");
    settings.paths.work_dir = root.join("work");
    settings.paths.output_dir = root.join("exports");
    settings.paths.backup_dir = root.join("backups");
    settings.site.content_dir = root.join(site);
    settings.site.url = url.to_string();
    settings.site.cms_version = "6.4.2".to_string();
    settings.site.runtime_version = "8.2.10".to_string();
    settings
}

/// Opens a sled session store under `paths.state_dir`. Only one context per
/// state dir may be alive at a time.
fn open_context(settings: Settings, adapter: MemoryAdapter) -> RuntimeContext {
    let store = SledSessionStore::open(&settings.paths.state_dir).expect("open session store");
    RuntimeContext::new(settings, Arc::new(store), Arc::new(adapter))
}

fn write_site(settings: &Settings, files: &[(&str, &[u8])]) {
    for (rel, body) in files {
        let path = settings.site.content_dir.join(rel);
        std::fs::create_dir_all(path.parent().expect("file has a parent")).expect("create dirs");
        std::fs::write(path, body).expect("write site file");
    }
}

/// Creates the three content directories without any files.
fn empty_site(settings: &Settings) {
    for kind in ["uploads", "plugins", "themes"] {
        std::fs::create_dir_all(settings.site.content_dir.join(kind)).expect("create dirs");
    }
}

fn post_rows(table: &str, n: usize) -> Vec<RowData> {
    (1..=n as i64)
        .map(|id| {
            RowData::new(
                table,
                vec![
                    FieldValue::new("ID", Value::Int(id)),
                    FieldValue::new(
                        "post_content",
                        Value::String(format!("See {SOURCE_URL}/?p={id} for 'post' #{id}")),
                    ),
                    FieldValue::new("post_excerpt", Value::Null),
                ],
            )
        })
        .collect()
}

/// A memory database with one table per `(name, rows)` pair.
async fn seeded_database(tables: &[(&str, usize)]) -> MemoryAdapter {
    let adapter = MemoryAdapter::new();
    for (name, rows) in tables {
        adapter
            .insert_table(MemoryTable::new(
                name,
                &format!(
                    "CREATE TABLE `{name}` (ID BIGINT PRIMARY KEY, post_content LONGTEXT, post_excerpt TEXT)"
                ),
                post_rows(name, *rows),
            ))
            .await;
    }
    adapter
}

/// Deterministic bytes that do not compress.
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}
