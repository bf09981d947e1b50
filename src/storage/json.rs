use crate::config::OutputConfig;
use crate::output::write_json;
use crate::storage::{ManifestTracker, SourceStores, Storage, StorageError, StorageResult, Store};
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A store file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFile {
    pub source_id: String,
    pub year: i32,
    pub path: PathBuf,
}

/// Year-partitioned JSON files
///
/// Layout: `<raw>/<source_id>/<year>/<source_id>.json` plus one manifest file.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    raw_dir: PathBuf,
    manifest_path: PathBuf,
}

impl JsonStorage {
    pub fn new(output: &OutputConfig) -> Self {
        Self::with_paths(output.raw_dir(), output.manifest_path())
    }

    pub fn with_paths(raw_dir: PathBuf, manifest_path: PathBuf) -> Self {
        Self {
            raw_dir,
            manifest_path,
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn store_path(&self, source_id: &str, year: i32) -> PathBuf {
        self.raw_dir
            .join(source_id)
            .join(year.to_string())
            .join(format!("{}.json", source_id))
    }

    /// Store files under the raw directory, sorted by source then year
    ///
    /// # Arguments
    ///
    /// * `source_id` - Only this source, when given
    /// * `year` - Only this year, when given
    pub fn list_store_files(&self, source_id: Option<&str>, year: Option<i32>) -> StorageResult<Vec<StoreFile>> {
        let mut files = Vec::new();

        let source_dirs = match source_id {
            Some(id) => vec![id.to_string()],
            None => list_dir_names(&self.raw_dir)?,
        };

        for id in source_dirs {
            for y in self.years_on_disk(&id)? {
                if year.is_some_and(|wanted| wanted != y) {
                    continue;
                }
                let path = self.store_path(&id, y);
                if path.is_file() {
                    files.push(StoreFile {
                        source_id: id.clone(),
                        year: y,
                        path,
                    });
                }
            }
        }

        files.sort_by(|a, b| a.source_id.cmp(&b.source_id).then(a.year.cmp(&b.year)));
        Ok(files)
    }

    fn years_on_disk(&self, source_id: &str) -> StorageResult<Vec<i32>> {
        let mut years: Vec<i32> = list_dir_names(&self.raw_dir.join(source_id))?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        years.sort_unstable();
        Ok(years)
    }
}

impl Storage for JsonStorage {
    fn load_source_stores(&self, source_id: &str, source_name: &str) -> StorageResult<SourceStores> {
        let mut stores = Vec::new();

        for year in self.years_on_disk(source_id)? {
            let path = self.store_path(source_id, year);
            let Some(store) = read_json::<Store>(&path)? else {
                continue;
            };

            if store.source_id() != source_id || store.year() != year {
                return Err(StorageError::Corrupt {
                    path,
                    reason: format!(
                        "metadata says {}/{}, expected {}/{}",
                        store.source_id(),
                        store.year(),
                        source_id,
                        year
                    ),
                });
            }
            stores.push(store);
        }

        tracing::debug!(
            "[{}] Loaded {} store(s) from {}",
            source_id,
            stores.len(),
            self.raw_dir.display()
        );
        Ok(SourceStores::from_stores(source_id, source_name, stores))
    }

    fn save_store(&self, store: &Store) -> StorageResult<()> {
        let path = self.store_path(store.source_id(), store.year());
        write_json(&path, store)?;
        tracing::info!(
            "[{}] Wrote {} items to {}",
            store.source_id(),
            store.len(),
            path.display()
        );
        Ok(())
    }

    fn load_manifest(&self) -> StorageResult<ManifestTracker> {
        Ok(read_json(&self.manifest_path)?.unwrap_or_default())
    }

    fn save_manifest(&self, manifest: &ManifestTracker) -> StorageResult<()> {
        write_json(&self.manifest_path, manifest)
    }
}

/// `Ok(None)` when the file does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Names of the subdirectories of `dir`; empty if `dir` does not exist
fn list_dir_names(dir: &Path) -> StorageResult<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StorageError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StorageError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
