use crate::{content::ContentKind, error::ManifestError, options::ExportOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const GENERATOR_NAME: &str = "relocate";
pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DATABASE_FILE: &str = "database.sql";
pub const PLACEHOLDER_FILE: &str = ".relocate-empty";

/// Dotted paths that must be present for an archive to be importable.
const REQUIRED_FIELDS: &[&str] = &[
    "generator.name",
    "generator.version",
    "generator.format_version",
    "created_at",
    "run_id",
    "source.url",
    "source.cms_version",
    "source.runtime_version",
    "source.db_version",
    "source.table_prefix",
    "options",
    "contents.files",
    "contents.bytes",
    "contents.tables",
    "contents.rows",
    "contents.includes_database",
    "contents.categories",
    "requirements.min_cms_version",
    "requirements.min_runtime_version",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    pub version: String,
    pub format_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSite {
    pub url: String,
    pub cms_version: String,
    pub runtime_version: String,
    pub db_version: String,
    pub table_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub files: u64,
    pub bytes: u64,
    pub tables: u64,
    pub rows: u64,
    pub includes_database: bool,
    pub categories: Vec<ContentKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub min_cms_version: String,
    pub min_runtime_version: String,
}

/// Describes one export: who produced it, where it came from, what it
/// contains, and what a target site needs to accept it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generator: Generator,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    pub source: SourceSite,
    pub options: ExportOptions,
    pub contents: ContentSummary,
    pub requirements: Requirements,
}

/// Versions of the site an archive is about to be imported into.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSite {
    pub cms_version: String,
    pub runtime_version: String,
}

impl Manifest {
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a manifest, reporting the first missing required field by name
    /// instead of a generic deserialization failure.
    pub fn parse(bytes: &[u8]) -> Result<Manifest, ManifestError> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)?;
        for field in REQUIRED_FIELDS {
            let pointer = format!("/{}", field.replace('.', "/"));
            match raw.pointer(&pointer) {
                None | Some(serde_json::Value::Null) => {
                    return Err(ManifestError::MissingField(field.to_string()));
                }
                Some(_) => {}
            }
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// Checks generator identity, format version and the target's versions.
    pub fn validate(&self, target: &TargetSite) -> Result<(), ManifestError> {
        if self.generator.name != GENERATOR_NAME {
            return Err(ManifestError::GeneratorMismatch {
                expected: GENERATOR_NAME.to_string(),
                found: self.generator.name.clone(),
            });
        }
        if self.generator.format_version > FORMAT_VERSION {
            return Err(ManifestError::UnsupportedFormat {
                found: self.generator.format_version,
                supported: FORMAT_VERSION,
            });
        }
        check_min_version(
            "CMS version",
            &self.requirements.min_cms_version,
            &target.cms_version,
        )?;
        check_min_version(
            "runtime version",
            &self.requirements.min_runtime_version,
            &target.runtime_version,
        )?;
        Ok(())
    }
}

fn check_min_version(what: &str, required: &str, found: &str) -> Result<(), ManifestError> {
    if required.is_empty() || found.is_empty() {
        return Ok(());
    }
    if compare_versions(found, required) == Ordering::Less {
        return Err(ManifestError::Incompatible {
            what: what.to_string(),
            required: required.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

/// Compares dotted versions numerically component by component; missing
/// components count as zero and non-numeric suffixes are ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split(['.', '-', '+'])
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (left, right) = (parse(a), parse(b));
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            generator: Generator {
                name: GENERATOR_NAME.to_string(),
                version: "0.1.0".to_string(),
                format_version: FORMAT_VERSION,
            },
            created_at: Utc::now(),
            run_id: "20261019-101500-abcd1234".to_string(),
            source: SourceSite {
                url: "https://old.example.com".to_string(),
                cms_version: "6.4.2".to_string(),
                runtime_version: "8.2.10".to_string(),
                db_version: "8.0.36".to_string(),
                table_prefix: "wp_".to_string(),
            },
            options: ExportOptions::default(),
            contents: ContentSummary {
                files: 12,
                bytes: 4096,
                tables: 3,
                rows: 52_010,
                includes_database: true,
                categories: vec![ContentKind::Uploads],
            },
            requirements: Requirements {
                min_cms_version: "6.0".to_string(),
                min_runtime_version: "7.4".to_string(),
            },
        }
    }

    fn target() -> TargetSite {
        TargetSite {
            cms_version: "6.5".to_string(),
            runtime_version: "8.3".to_string(),
        }
    }

    #[test]
    fn round_trips_every_field() {
        let manifest = sample();
        let json = manifest.to_json().unwrap();
        let parsed = Manifest::parse(json.as_bytes()).unwrap();
        assert_eq!(parsed, manifest);
        parsed.validate(&target()).unwrap();
    }

    #[test]
    fn reports_missing_field_by_name() {
        let mut raw = serde_json::to_value(sample()).unwrap();
        raw["source"]
            .as_object_mut()
            .unwrap()
            .remove("db_version");
        let err = Manifest::parse(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField(ref f) if f == "source.db_version"));
    }

    #[test]
    fn rejects_foreign_generator() {
        let mut manifest = sample();
        manifest.generator.name = "other-tool".to_string();
        let err = manifest.validate(&target()).unwrap_err();
        assert!(matches!(err, ManifestError::GeneratorMismatch { .. }));
    }

    #[test]
    fn rejects_newer_format() {
        let mut manifest = sample();
        manifest.generator.format_version = FORMAT_VERSION + 1;
        assert!(matches!(
            manifest.validate(&target()),
            Err(ManifestError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_old_target() {
        let manifest = sample();
        let old = TargetSite {
            cms_version: "5.9.3".to_string(),
            runtime_version: "8.3".to_string(),
        };
        assert!(matches!(
            manifest.validate(&old),
            Err(ManifestError::Incompatible { .. })
        ));
    }

    #[test]
    fn compares_versions_numerically() {
        assert_eq!(compare_versions("6.10", "6.9"), Ordering::Greater);
        assert_eq!(compare_versions("8.0", "8"), Ordering::Equal);
        assert_eq!(compare_versions("7.4.33-fpm", "8.0"), Ordering::Less);
    }
}
