use crate::context::RuntimeContext;
use connectors::sql::memory::adapter::{MemoryAdapter, MemoryTable};
use engine_config::settings::Settings;
use engine_core::state::sled_store::SledSessionStore;
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use std::{path::Path, sync::Arc};

pub(crate) const SOURCE_URL: &str = "https://old.example";

/// Settings rooted under `root`, with a site whose content lives in
/// `root/<site>`.
pub(crate) fn settings(root: &Path, site: &str, url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.paths.state_dir = root.join("state");
    settings.paths.work_dir = root.join("work");
    settings.paths.output_dir = root.join("exports");
    settings.paths.backup_dir = root.join("backups");
    settings.site.content_dir = root.join(site);
    settings.site.url = url.to_string();
    settings.site.cms_version = "6.5".to_string();
    settings.site.runtime_version = "8.3".to_string();
    settings
}

pub(crate) fn context(settings: Settings, adapter: MemoryAdapter) -> RuntimeContext {
    let store = SledSessionStore::open(&settings.paths.state_dir).unwrap();
    RuntimeContext::new(settings, Arc::new(store), Arc::new(adapter))
}

/// Writes a few files into every content category.
pub(crate) fn populate_site(settings: &Settings) {
    let content = &settings.site.content_dir;
    for (rel, body) in [
        ("uploads/2024/01/photo.jpg", "jpeg"),
        ("uploads/debug.log", "noise"),
        ("plugins/forms/forms.php", "<?php"),
        ("themes/plain/style.css", "body {}"),
    ] {
        let path = content.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
}

/// A source database with an options table that mentions the site URL.
pub(crate) async fn source_database() -> MemoryAdapter {
    let adapter = MemoryAdapter::new();
    let options = vec![
        RowData::new(
            "wp_options",
            vec![
                FieldValue::new("option_id", Value::Int(1)),
                FieldValue::new("option_name", Value::String("siteurl".into())),
                FieldValue::new("option_value", Value::String(SOURCE_URL.into())),
            ],
        ),
        RowData::new(
            "wp_options",
            vec![
                FieldValue::new("option_id", Value::Int(2)),
                FieldValue::new("option_name", Value::String("blogname".into())),
                FieldValue::new("option_value", Value::String("It's a blog".into())),
            ],
        ),
    ];
    adapter
        .insert_table(MemoryTable::new(
            "wp_options",
            "CREATE TABLE `wp_options` (option_id INT PRIMARY KEY, option_name TEXT, option_value TEXT)",
            options,
        ))
        .await;
    adapter
}
