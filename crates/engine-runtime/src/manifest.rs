use chrono::Utc;
use engine_config::settings::SiteSettings;
use engine_core::state::models::{DumpCursor, ExportCursors};
use model::{
    manifest::{
        ContentSummary, FORMAT_VERSION, GENERATOR_NAME, Generator, Manifest, Requirements,
        SourceSite,
    },
    options::ExportOptions,
};

/// Keeps the first two dotted components: `6.4.2` becomes `6.4`.
fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// Describes a finished export from its cursors. The target must run at
/// least the source's major.minor CMS and runtime versions.
pub fn build_manifest(
    run_id: &str,
    site: &SiteSettings,
    db_version: &str,
    cursors: &ExportCursors,
) -> Manifest {
    let (files, bytes) = cursors
        .files
        .as_ref()
        .map_or((0, 0), |_| (cursors.archive.files_added as u64, cursors.archive.bytes_added));
    let contents = ContentSummary {
        files,
        bytes,
        tables: cursors.dump.total_tables() as u64,
        rows: cursors.dump.rows_written,
        includes_database: cursors.options.include_database && cursors.dump.is_complete(),
        categories: cursors.options.categories(),
    };
    assemble(run_id, site, db_version, cursors.options.clone(), contents)
}

/// Manifest of a database-only archive such as the pre-import backup.
pub fn database_manifest(
    run_id: &str,
    site: &SiteSettings,
    db_version: &str,
    dump: &DumpCursor,
) -> Manifest {
    let options = ExportOptions {
        include_uploads: false,
        include_plugins: false,
        include_themes: false,
        include_database: true,
        split_size: 0,
        ..ExportOptions::default()
    };
    let contents = ContentSummary {
        tables: dump.total_tables() as u64,
        rows: dump.rows_written,
        includes_database: dump.is_complete(),
        ..ContentSummary::default()
    };
    assemble(run_id, site, db_version, options, contents)
}

fn assemble(
    run_id: &str,
    site: &SiteSettings,
    db_version: &str,
    options: ExportOptions,
    contents: ContentSummary,
) -> Manifest {
    Manifest {
        generator: Generator {
            name: GENERATOR_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            format_version: FORMAT_VERSION,
        },
        created_at: Utc::now(),
        run_id: run_id.to_string(),
        source: SourceSite {
            url: site.url.clone(),
            cms_version: site.cms_version.clone(),
            runtime_version: site.runtime_version.clone(),
            db_version: db_version.to_string(),
            table_prefix: site.table_prefix.clone(),
        },
        options,
        contents,
        requirements: Requirements {
            min_cms_version: major_minor(&site.cms_version),
            min_runtime_version: major_minor(&site.runtime_version),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::strategy::DumpStrategy;
    use std::path::PathBuf;

    fn cursors() -> ExportCursors {
        ExportCursors {
            options: ExportOptions::default(),
            strategy: DumpStrategy::uniform(5000),
            work_dir: PathBuf::from("work"),
            archive_path: PathBuf::from("out/run.zip"),
            dump_path: PathBuf::from("work/database.sql"),
            files: None,
            archive: Default::default(),
            dump: Default::default(),
            manifest: None,
            database_folded: false,
            artifacts: Vec::new(),
            manifest_path: None,
        }
    }

    #[test]
    fn requirements_use_major_minor() {
        let site = SiteSettings {
            url: "https://old.test".into(),
            cms_version: "6.4.2".into(),
            runtime_version: "8.2".into(),
            ..SiteSettings::default()
        };
        let manifest = build_manifest("run-1", &site, "8.0.36", &cursors());
        assert_eq!(manifest.requirements.min_cms_version, "6.4");
        assert_eq!(manifest.requirements.min_runtime_version, "8.2");
        assert_eq!(manifest.generator.name, GENERATOR_NAME);
        assert_eq!(manifest.source.table_prefix, "wp_");
        // dump never ran
        assert!(!manifest.contents.includes_database);

        let parsed = Manifest::parse(manifest.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
