//! File-backed snapshot persistence
//!
//! Two artifacts: the index vectors as a bincode snapshot and the entry
//! table as JSON Lines (one entry per line, vectors omitted unless retained).

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::semantic_cache::{CacheEntry, CacheSnapshot, CacheSnapshotStore, IndexSnapshot};
use crate::domain::DomainError;

/// Persists the cache to an index snapshot file and an entry table file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    index_path: PathBuf,
    store_path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(index_path: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            store_path: store_path.into(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    fn stage_index(&self, index: &IndexSnapshot) -> Result<PathBuf, DomainError> {
        stage_write(&self.index_path, |writer| {
            bincode::serialize_into(writer, index).map_err(|e| {
                DomainError::persistence(format!("Failed to encode index snapshot: {}", e))
            })
        })
    }

    fn stage_entries(&self, entries: &[CacheEntry]) -> Result<PathBuf, DomainError> {
        stage_write(&self.store_path, |writer| {
            for entry in entries {
                serde_json::to_writer(&mut *writer, entry).map_err(|e| {
                    DomainError::persistence(format!(
                        "Failed to encode entry {}: {}",
                        entry.entry_id(),
                        e
                    ))
                })?;
                writer.write_all(b"\n").map_err(|e| io_error(&self.store_path, e))?;
            }

            Ok(())
        })
    }

    fn read_index(&self) -> Result<IndexSnapshot, DomainError> {
        let file = File::open(&self.index_path).map_err(|e| io_error(&self.index_path, e))?;

        bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            DomainError::persistence(format!(
                "Failed to decode index snapshot {}: {}",
                self.index_path.display(),
                e
            ))
        })
    }

    fn read_entries(&self) -> Result<Vec<CacheEntry>, DomainError> {
        let file = File::open(&self.store_path).map_err(|e| io_error(&self.store_path, e))?;
        let mut entries = Vec::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| io_error(&self.store_path, e))?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: CacheEntry = serde_json::from_str(&line).map_err(|e| {
                DomainError::persistence(format!(
                    "Failed to decode entry on line {} of {}: {}",
                    line_no + 1,
                    self.store_path.display(),
                    e
                ))
            })?;

            entries.push(entry);
        }

        Ok(entries)
    }
}

impl CacheSnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError> {
        snapshot.ensure_aligned()?;

        // Both artifacts are staged before either replaces its target, so a
        // failed encode or write leaves the previous pair intact.
        let index_tmp = self.stage_index(&snapshot.index)?;
        let entries_tmp = match self.stage_entries(&snapshot.entries) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&index_tmp);
                return Err(e);
            }
        };

        fs::rename(&index_tmp, &self.index_path).map_err(|e| {
            let _ = fs::remove_file(&entries_tmp);
            io_error(&self.index_path, e)
        })?;
        fs::rename(&entries_tmp, &self.store_path).map_err(|e| io_error(&self.store_path, e))?;

        debug!(
            entries = snapshot.entries.len(),
            index = %self.index_path.display(),
            store = %self.store_path.display(),
            "Saved semantic cache snapshot"
        );

        Ok(())
    }

    fn load(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        let index_exists = self.index_path.exists();
        let store_exists = self.store_path.exists();

        match (index_exists, store_exists) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(DomainError::persistence(format!(
                    "entry table {} is missing while index snapshot exists",
                    self.store_path.display()
                )));
            }
            (false, true) => {
                return Err(DomainError::persistence(format!(
                    "index snapshot {} is missing while entry table exists",
                    self.index_path.display()
                )));
            }
            (true, true) => {}
        }

        let snapshot = CacheSnapshot::new(self.read_entries()?, self.read_index()?);
        snapshot.ensure_aligned()?;

        Ok(Some(snapshot))
    }
}

/// Write into a temporary sibling of `path` and return its location
fn stage_write<F>(path: &Path, write: F) -> Result<PathBuf, DomainError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), DomainError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp_path = temp_path_for(path);
    let file = File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
    let mut writer = BufWriter::new(file);

    let result = write(&mut writer).and_then(|_| {
        writer.flush().map_err(|e| io_error(&tmp_path, e))
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    Ok(tmp_path)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, e: std::io::Error) -> DomainError {
    DomainError::persistence(format!("I/O error on {}: {}", path.display(), e))
}
