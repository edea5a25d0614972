use crate::{error::ConfigError, settings::env::EnvVars};
use model::{
    content::ContentKind,
    strategy::{FileBatchTiers, TablePlanConfig},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

pub mod env;

pub const DEFAULT_CONFIG_FILE: &str = "relocate.toml";

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

/// Where archives are written between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlePolicy {
    /// Keep one writer open across ticks of the same process.
    KeepOpen,
    /// Reopen the archive in append mode on every tick.
    #[default]
    ReopenPerBatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub state_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relocate");
        PathSettings {
            state_dir: root.join("state"),
            work_dir: root.join("work"),
            output_dir: root.join("exports"),
            backup_dir: root.join("backups"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub url: String,
    pub content_dir: PathBuf,
    pub uploads_dir: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
    pub themes_dir: Option<PathBuf>,
    pub cms_version: String,
    pub runtime_version: String,
    pub table_prefix: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        SiteSettings {
            url: String::new(),
            content_dir: PathBuf::from("wp-content"),
            uploads_dir: None,
            plugins_dir: None,
            themes_dir: None,
            cms_version: String::new(),
            runtime_version: String::new(),
            table_prefix: "wp_".to_string(),
        }
    }
}

impl SiteSettings {
    /// Directory holding one content category on this site.
    pub fn dir_for(&self, kind: ContentKind) -> PathBuf {
        let custom = match kind {
            ContentKind::Uploads => &self.uploads_dir,
            ContentKind::Plugins => &self.plugins_dir,
            ContentKind::Themes => &self.themes_dir,
        };
        custom
            .clone()
            .unwrap_or_else(|| self.content_dir.join(kind.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub memory_limit_mb: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            url: "memory://".to_string(),
            memory_limit_mb: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub handle_policy: HandlePolicy,
    pub small_file_threshold_kb: u64,
    pub split_io_chunk_kb: u64,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        ArchiveSettings {
            handle_policy: HandlePolicy::default(),
            small_file_threshold_kb: 500,
            split_io_chunk_kb: 1024,
        }
    }
}

impl ArchiveSettings {
    pub fn small_file_threshold(&self) -> u64 {
        self.small_file_threshold_kb * KB
    }

    pub fn split_io_chunk(&self) -> usize {
        (self.split_io_chunk_kb * KB) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingSettings {
    pub small_mean_kb: u64,
    pub large_mean_mb: u64,
    pub huge_mean_mb: u64,
    pub small_batch: usize,
    pub medium_batch_min: usize,
    pub medium_batch_max: usize,
    pub large_batch_min: usize,
    pub large_batch_max: usize,
    pub small_table_rows: u64,
    pub group_max_tables: usize,
    pub group_max_rows: u64,
    pub memory_fraction: f64,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        let tiers = FileBatchTiers::default();
        let plan = TablePlanConfig::default();
        BatchingSettings {
            small_mean_kb: tiers.small_mean_bytes / KB,
            large_mean_mb: tiers.large_mean_bytes / MB,
            huge_mean_mb: tiers.huge_mean_bytes / MB,
            small_batch: tiers.small_batch,
            medium_batch_min: tiers.medium_batch.0,
            medium_batch_max: tiers.medium_batch.1,
            large_batch_min: tiers.large_batch.0,
            large_batch_max: tiers.large_batch.1,
            small_table_rows: plan.small_table_rows,
            group_max_tables: plan.group_max_tables,
            group_max_rows: plan.group_max_rows,
            memory_fraction: 0.25,
        }
    }
}

impl BatchingSettings {
    pub fn file_tiers(&self) -> FileBatchTiers {
        FileBatchTiers {
            small_mean_bytes: self.small_mean_kb * KB,
            large_mean_bytes: self.large_mean_mb * MB,
            huge_mean_bytes: self.huge_mean_mb * MB,
            small_batch: self.small_batch,
            medium_batch: (self.medium_batch_min, self.medium_batch_max),
            large_batch: (self.large_batch_min, self.large_batch_max),
        }
    }

    pub fn table_plan(&self) -> TablePlanConfig {
        TablePlanConfig {
            small_table_rows: self.small_table_rows,
            group_max_tables: self.group_max_tables,
            group_max_rows: self.group_max_rows,
            ..TablePlanConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub statements_per_step: usize,
    pub files_per_step: usize,
    pub lock_ttl_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            statements_per_step: 500,
            files_per_step: 100,
            lock_ttl_secs: 300,
        }
    }
}

impl ImportSettings {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub site: SiteSettings,
    pub database: DatabaseSettings,
    pub archive: ArchiveSettings,
    pub batching: BatchingSettings,
    pub import: ImportSettings,
}

impl Settings {
    /// Reads `path` (or `relocate.toml` in the working directory when present),
    /// then applies `RELOCATE_*` overrides from `env`.
    pub fn load(path: Option<&Path>, env: &EnvVars) -> Result<Settings, ConfigError> {
        let mut settings = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file, using defaults");
                Settings::default()
            }
        };
        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&contents)?;
        info!(path = %path.display(), "Loaded config file");
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Settings, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env(&mut self, env: &EnvVars) -> Result<(), ConfigError> {
        let path = |name: &str| env.prefixed(name).map(PathBuf::from);

        if let Some(dir) = path("STATE_DIR") {
            self.paths.state_dir = dir;
        }
        if let Some(dir) = path("WORK_DIR") {
            self.paths.work_dir = dir;
        }
        if let Some(dir) = path("OUTPUT_DIR") {
            self.paths.output_dir = dir;
        }
        if let Some(dir) = path("BACKUP_DIR") {
            self.paths.backup_dir = dir;
        }
        if let Some(dir) = path("CONTENT_DIR") {
            self.site.content_dir = dir;
        }
        if let Some(url) = env.prefixed("SITE_URL") {
            self.site.url = url.to_string();
        }
        if let Some(prefix) = env.prefixed("TABLE_PREFIX") {
            self.site.table_prefix = prefix.to_string();
        }
        if let Some(url) = env.prefixed("DATABASE_URL") {
            self.database.url = url.to_string();
        }
        if let Some(limit) = env.prefixed("MEMORY_LIMIT_MB") {
            self.database.memory_limit_mb = parse_value("RELOCATE_MEMORY_LIMIT_MB", limit)?;
        }
        if let Some(policy) = env.prefixed("HANDLE_POLICY") {
            self.archive.handle_policy = match policy {
                "keep_open" => HandlePolicy::KeepOpen,
                "reopen_per_batch" => HandlePolicy::ReopenPerBatch,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "RELOCATE_HANDLE_POLICY".into(),
                        value: other.into(),
                    });
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.batching;
        if !(b.memory_fraction > 0.0 && b.memory_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "batching.memory_fraction must be in (0, 1], got {}",
                b.memory_fraction
            )));
        }
        if b.small_mean_kb * KB >= b.large_mean_mb * MB || b.large_mean_mb > b.huge_mean_mb {
            return Err(ConfigError::Invalid(
                "batching size tiers must increase: small_mean_kb < large_mean_mb <= huge_mean_mb"
                    .into(),
            ));
        }
        if b.medium_batch_min > b.medium_batch_max || b.large_batch_min > b.large_batch_max {
            return Err(ConfigError::Invalid(
                "batching min batch sizes must not exceed max".into(),
            ));
        }
        if self.import.statements_per_step == 0 || self.import.files_per_step == 0 {
            return Err(ConfigError::Invalid(
                "import.statements_per_step and import.files_per_step must be positive".into(),
            ));
        }
        if self.archive.split_io_chunk_kb == 0 {
            return Err(ConfigError::Invalid(
                "archive.split_io_chunk_kb must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.database.memory_limit_mb * MB
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
[site]
url = "https://old.example.com"
content_dir = "/srv/site/wp-content"

[archive]
handle_policy = "keep_open"
"#,
        )
        .unwrap();

        assert_eq!(settings.site.url, "https://old.example.com");
        assert_eq!(settings.site.table_prefix, "wp_");
        assert_eq!(settings.archive.handle_policy, HandlePolicy::KeepOpen);
        assert_eq!(settings.archive.small_file_threshold(), 500 * 1024);
        assert_eq!(
            settings.site.dir_for(ContentKind::Plugins),
            PathBuf::from("/srv/site/wp-content/plugins")
        );
        assert_eq!(settings.batching.file_tiers(), FileBatchTiers::default());
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relocate.toml");
        fs::write(&path, "[database]\nurl = \"mysql://file/db\"\n").unwrap();

        let env = EnvVars::from_pairs([
            ("RELOCATE_DATABASE_URL", "memory://"),
            ("RELOCATE_MEMORY_LIMIT_MB", "512"),
            ("RELOCATE_HANDLE_POLICY", "keep_open"),
        ]);
        let settings = Settings::load(Some(&path), &env).unwrap();
        assert_eq!(settings.database.url, "memory://");
        assert_eq!(settings.memory_limit_bytes(), 512 * 1024 * 1024);
        assert_eq!(settings.archive.handle_policy, HandlePolicy::KeepOpen);
    }

    #[test]
    fn rejects_bad_values() {
        let env = EnvVars::from_pairs([("RELOCATE_MEMORY_LIMIT_MB", "lots")]);
        let mut settings = Settings::default();
        assert!(matches!(
            settings.apply_env(&env),
            Err(ConfigError::InvalidValue { .. })
        ));

        settings.batching.memory_fraction = 0.0;
        assert!(settings.validate().is_err());

        let missing = Settings::load(Some(Path::new("/nonexistent/relocate.toml")), &EnvVars::default());
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }
}
