use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHECKSUM_ALGORITHM: &str = "blake3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartEntry {
    pub number: u32,
    pub filename: String,
    pub size: u64,
    pub checksum: String,
}

/// Sidecar integrity descriptor written next to a split archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartsManifest {
    pub original_file: String,
    pub original_size: u64,
    pub part_size: u64,
    pub parts_count: usize,
    pub checksum_algorithm: String,
    pub created_at: DateTime<Utc>,
    pub parts: Vec<PartEntry>,
}

impl PartsManifest {
    /// Part sizes add up to the original and the count matches the list.
    pub fn is_consistent(&self) -> bool {
        self.parts_count == self.parts.len()
            && self.parts.iter().map(|p| p.size).sum::<u64>() == self.original_size
    }
}

/// `<base>.part<N>.<ext>`, or `<base>.part<N>` when the original had no extension.
pub fn part_file_name(base: &str, number: u32, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{base}.part{number}.{ext}"),
        None => format!("{base}.part{number}"),
    }
}

pub fn parts_manifest_name(base: &str) -> String {
    format!("{base}.parts.json")
}

/// Extracts `N` from a `….part<N>…` file name.
pub fn parse_part_number(file_name: &str) -> Option<u32> {
    let idx = file_name.rfind(".part")?;
    let digits: String = file_name[idx + 5..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Base name of a part file, i.e. everything before `.part<N>`.
pub fn part_base_name(file_name: &str) -> Option<&str> {
    let idx = file_name.rfind(".part")?;
    parse_part_number(file_name)?;
    Some(&file_name[..idx])
}
