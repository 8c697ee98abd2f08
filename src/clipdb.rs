//! Packaged clip database.
//!
//! A database is a pair of files sharing a base name: `<base>.bin` holds the
//! concatenated clip files and `<base>.yaml` maps clip names to byte ranges
//! of the blob.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clipq::player::ByteSource;
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const INDEX_VERSION: u32 = 1;
pub const CLIP_EXTENSION: &str = "ogg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipIndex {
    pub version: u32,
    /// Blob file name, relative to the index file.
    pub blob: String,
    pub clips: BTreeMap<String, ClipEntry>,
}

/// `<base><suffix>`, keeping any dots already in `base`.
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Packs every clip file of `dir`, in file name order, into a database at
/// `base`. Returns the written index.
pub fn pack(dir: &Path, base: &Path) -> Result<ClipIndex> {
    let mut files = fs::read_dir(dir)
        .with_context(|| format!("Cannot read clip directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(CLIP_EXTENSION))
        })
        .collect::<Vec<_>>();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        bail!("No .{CLIP_EXTENSION} files in {}", dir.display());
    }

    let blob_path = with_suffix(base, ".bin");
    let index_path = with_suffix(base, ".yaml");

    let mut blob = Vec::new();
    let mut clips = BTreeMap::new();
    for path in &files {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Clip file without a name: {}", path.display()))?;
        let data = fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;

        let entry = ClipEntry {
            offset: blob.len() as u64,
            length: data.len() as u64,
        };
        debug!("Packing {name}: {} bytes at {}", entry.length, entry.offset);
        if clips.insert(name.clone(), entry).is_some() {
            bail!("Duplicate clip name {name}");
        }
        blob.extend_from_slice(&data);
    }

    let index = ClipIndex {
        version: INDEX_VERSION,
        blob: blob_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Invalid output base {}", base.display()))?,
        clips,
    };

    fs::write(&blob_path, &blob).with_context(|| format!("Cannot write {}", blob_path.display()))?;
    fs::write(&index_path, serde_yaml_ng::to_string(&index)?)
        .with_context(|| format!("Cannot write {}", index_path.display()))?;

    info!(
        "Packed {} clips ({} bytes) into {}",
        index.clips.len(),
        blob.len(),
        blob_path.display()
    );
    Ok(index)
}

/// A loaded database. The blob is held in memory and shared by every source
/// handed out.
#[derive(Debug, Clone)]
pub struct ClipDb {
    index: ClipIndex,
    blob: Arc<[u8]>,
}

impl ClipDb {
    pub fn open(index_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(index_path)
            .with_context(|| format!("Cannot read clip index {}", index_path.display()))?;
        let index: ClipIndex = serde_yaml_ng::from_str(&text)
            .with_context(|| format!("Invalid clip index {}", index_path.display()))?;

        if index.version != INDEX_VERSION {
            bail!(
                "Unsupported clip index version {} (expected {INDEX_VERSION})",
                index.version
            );
        }

        let blob_path = index_path
            .parent()
            .map_or_else(|| PathBuf::from(&index.blob), |dir| dir.join(&index.blob));
        let blob: Arc<[u8]> = fs::read(&blob_path)
            .with_context(|| format!("Cannot read clip blob {}", blob_path.display()))?
            .into();

        for (name, entry) in &index.clips {
            let end = entry.offset.checked_add(entry.length);
            if end.is_none_or(|end| end > blob.len() as u64) {
                bail!(
                    "Clip {name} ({} bytes at {}) lies outside the {} byte blob",
                    entry.length,
                    entry.offset,
                    blob.len()
                );
            }
        }

        info!("Loaded {} clips from {}", index.clips.len(), index_path.display());
        Ok(Self { index, blob })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.clips.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.clips.is_empty()
    }

    /// A byte source over the clip's region of the blob.
    pub fn source(&self, name: &str) -> Result<ByteSource> {
        let entry = self
            .index
            .clips
            .get(name)
            .ok_or_else(|| anyhow!("No clip named {name} in the database"))?;

        let start = entry.offset as usize;
        Ok(Box::new(Cursor::new(BlobSlice {
            blob: self.blob.clone(),
            start,
            end: start + entry.length as usize,
        })))
    }
}

struct BlobSlice {
    blob: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for BlobSlice {
    fn as_ref(&self) -> &[u8] {
        &self.blob[self.start..self.end]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn read_all(mut source: ByteSource) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        source.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn pack_and_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let clips = dir.path().join("clips");
        fs::create_dir(&clips)?;
        fs::write(clips.join("b.ogg"), b"second")?;
        fs::write(clips.join("a.ogg"), b"first")?;
        fs::write(clips.join("notes.txt"), b"ignored")?;

        let base = dir.path().join("sounds.v1");
        let index = pack(&clips, &base)?;

        assert_eq!(index.blob, "sounds.v1.bin");
        assert_eq!(index.clips["a"], ClipEntry { offset: 0, length: 5 });
        assert_eq!(index.clips["b"], ClipEntry { offset: 5, length: 6 });
        assert_eq!(fs::read(dir.path().join("sounds.v1.bin"))?, b"firstsecond");

        let db = ClipDb::open(&dir.path().join("sounds.v1.yaml"))?;
        assert_eq!(db.len(), 2);
        assert_eq!(db.names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(read_all(db.source("b")?)?, b"second");
        assert_eq!(read_all(db.source("a")?)?, b"first");
        assert!(db.source("c").is_err());
        Ok(())
    }

    #[test]
    fn rejects_entries_outside_blob() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("db.bin"), b"0123")?;
        let index = ClipIndex {
            version: INDEX_VERSION,
            blob: "db.bin".to_string(),
            clips: BTreeMap::from([("x".to_string(), ClipEntry { offset: 2, length: 3 })]),
        };
        fs::write(dir.path().join("db.yaml"), serde_yaml_ng::to_string(&index)?)?;

        let err = ClipDb::open(&dir.path().join("db.yaml")).unwrap_err();
        assert!(err.to_string().contains("outside"));
        Ok(())
    }

    #[test]
    fn empty_directory_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(pack(dir.path(), &dir.path().join("db")).is_err());
        Ok(())
    }
}
