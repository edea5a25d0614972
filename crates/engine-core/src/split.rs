use crate::error::SplitError;
use chrono::Utc;
use model::parts::{
    CHECKSUM_ALGORITHM, PartEntry, PartsManifest, parse_part_number, part_base_name,
    part_file_name, parts_manifest_name,
};
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const DEFAULT_IO_CHUNK: usize = 1024 * 1024;

/// Splits, recombines and verifies oversized archives.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveSplitter {
    io_chunk: usize,
}

impl Default for ArchiveSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_IO_CHUNK)
    }
}

impl ArchiveSplitter {
    pub fn new(io_chunk: usize) -> Self {
        ArchiveSplitter {
            io_chunk: io_chunk.max(1),
        }
    }

    /// Streams `source` into `<base>.part<N>.<ext>` files of at most
    /// `max_part_size` bytes and writes `<base>.parts.json` next to them.
    /// A source that already fits is returned as the only "part".
    pub fn split(&self, source: &Path, max_part_size: u64) -> Result<Vec<PathBuf>, SplitError> {
        if max_part_size == 0 {
            return Err(SplitError::ZeroPartSize);
        }
        if !source.is_file() {
            return Err(SplitError::SourceMissing(source.to_path_buf()));
        }
        let original_size = source.metadata()?.len();
        if original_size <= max_part_size {
            return Ok(vec![source.to_path_buf()]);
        }

        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let (base, ext) = split_name(source);
        let mut input = File::open(source)?;
        let mut buf = vec![0u8; self.io_chunk];
        let mut parts = Vec::new();
        let mut entries = Vec::new();
        let mut remaining = original_size;

        while remaining > 0 {
            let number = entries.len() as u32 + 1;
            let filename = part_file_name(&base, number, ext.as_deref());
            let path = dir.join(&filename);
            let mut out = BufWriter::new(File::create(&path)?);
            let mut hasher = blake3::Hasher::new();
            let target = remaining.min(max_part_size);
            let mut written = 0u64;

            while written < target {
                let want = (target - written).min(buf.len() as u64) as usize;
                let n = input.read(&mut buf[..want])?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
                hasher.update(&buf[..n]);
                written += n as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;

            if written < target {
                return Err(SplitError::SizeMismatch {
                    expected: original_size,
                    actual: original_size - remaining + written,
                });
            }
            remaining -= written;
            entries.push(PartEntry {
                number,
                filename,
                size: written,
                checksum: hasher.finalize().to_hex().to_string(),
            });
            parts.push(path);
        }

        let manifest = PartsManifest {
            original_file: file_name(source),
            original_size,
            part_size: max_part_size,
            parts_count: entries.len(),
            checksum_algorithm: CHECKSUM_ALGORITHM.to_string(),
            created_at: Utc::now(),
            parts: entries,
        };
        std::fs::write(
            dir.join(parts_manifest_name(&base)),
            serde_json::to_vec_pretty(&manifest)?,
        )?;

        info!(
            source = %source.display(),
            parts = parts.len(),
            original_size,
            "Archive split"
        );
        Ok(parts)
    }

    /// Concatenates parts in numeric part order into `target`.
    pub fn combine(&self, parts: &[PathBuf], target: &Path) -> Result<u64, SplitError> {
        let ordered = sort_parts(parts)?;
        let mut expected = 0u64;
        for part in &ordered {
            if !part.is_file() {
                return Err(SplitError::SourceMissing(part.clone()));
            }
            expected += part.metadata()?.len();
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::with_capacity(self.io_chunk, File::create(target)?);
        let mut actual = 0u64;
        for part in &ordered {
            let mut input = File::open(part)?;
            actual += std::io::copy(&mut input, &mut out)?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;

        if actual != expected {
            return Err(SplitError::SizeMismatch { expected, actual });
        }
        info!(target = %target.display(), parts = ordered.len(), bytes = actual, "Parts combined");
        Ok(actual)
    }

    /// Checks parts against their parts manifest, or, without one, that each
    /// part exists and is non-empty. Never fails; problems are logged.
    pub fn verify(&self, parts: &[PathBuf]) -> bool {
        if parts.is_empty() {
            warn!("No parts to verify");
            return false;
        }

        match read_parts_manifest(parts) {
            Some(manifest) => self.verify_against(parts, &manifest),
            None => {
                warn!("Parts manifest not found, checking parts exist and are non-empty");
                parts.iter().all(|p| match p.metadata() {
                    Ok(meta) => meta.is_file() && meta.len() > 0,
                    Err(_) => {
                        warn!(part = %p.display(), "Part missing");
                        false
                    }
                })
            }
        }
    }

    fn verify_against(&self, parts: &[PathBuf], manifest: &PartsManifest) -> bool {
        if !manifest.is_consistent() {
            warn!("Parts manifest is inconsistent");
            return false;
        }
        if parts.len() != manifest.parts_count {
            warn!(
                expected = manifest.parts_count,
                found = parts.len(),
                "Part count mismatch"
            );
            return false;
        }

        for entry in &manifest.parts {
            let Some(path) = parts.iter().find(|p| file_name(p) == entry.filename) else {
                warn!(part = %entry.filename, "Part missing");
                return false;
            };
            let size = match path.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => {
                    warn!(part = %entry.filename, "Part missing");
                    return false;
                }
            };
            if size != entry.size {
                warn!(part = %entry.filename, expected = entry.size, found = size, "Part size mismatch");
                return false;
            }
            match self.checksum(path) {
                Ok(sum) if sum == entry.checksum => {}
                Ok(_) => {
                    warn!(part = %entry.filename, "Part checksum mismatch");
                    return false;
                }
                Err(e) => {
                    warn!(part = %entry.filename, error = %e, "Failed to read part");
                    return false;
                }
            }
        }
        true
    }

    fn checksum(&self, path: &Path) -> std::io::Result<String> {
        let mut input = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; self.io_chunk];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Loads `<base>.parts.json` from the directory of the first part.
pub fn read_parts_manifest(parts: &[PathBuf]) -> Option<PartsManifest> {
    let first = parts.first()?;
    let name = file_name(first);
    let base = part_base_name(&name)?;
    let dir = first.parent().unwrap_or_else(|| Path::new("."));
    let bytes = std::fs::read(dir.join(parts_manifest_name(base))).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(error = %e, "Unreadable parts manifest");
            None
        }
    }
}

/// Orders parts by their numeric `partN` token (`part2` before `part10`).
pub fn sort_parts(parts: &[PathBuf]) -> Result<Vec<PathBuf>, SplitError> {
    if parts.is_empty() {
        return Err(SplitError::NoParts);
    }
    let mut numbered = parts
        .iter()
        .map(|p| {
            let name = file_name(p);
            parse_part_number(&name)
                .map(|n| (n, p.clone()))
                .ok_or(SplitError::NotAPart(name))
        })
        .collect::<Result<Vec<_>, _>>()?;
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `site.zip` -> (`site`, Some(`zip`)).
fn split_name(path: &Path) -> (String, Option<String>) {
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (base, ext)
}
