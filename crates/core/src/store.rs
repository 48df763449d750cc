use crate::error::StoreError;
use crate::models::DocumentRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// How a store file is rewritten after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Truncate the file and write the whole mapping in place.
    #[default]
    Overwrite,
    /// Write the whole mapping to a sibling temp file, then rename it over
    /// the target so readers never see a half-written file.
    AtomicRename,
}

/// Key-value mapping persisted as a single JSON object file.
///
/// The in-memory map is the source of truth for the process. It is loaded
/// once by [`JsonFileStore::open`] and written out in full on every `put` or
/// `remove`. There is no locking: two processes (or two handles) mutating the
/// same file race, and the last full rewrite wins, silently discarding the
/// other writer's change. `AtomicRename` prevents torn files, not lost updates.
#[derive(Debug)]
pub struct JsonFileStore<V> {
    path: PathBuf,
    durability: Durability,
    entries: BTreeMap<String, V>,
}

pub type DocumentStore = JsonFileStore<DocumentRecord>;
pub type ResponseStore = JsonFileStore<String>;

impl<V> JsonFileStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Loads the mapping at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, durability: Durability) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = load_mapping(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "store loaded");

        Ok(Self {
            path,
            durability,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces `id`, then rewrites the file.
    /// A failed write restores the previous entry before returning the error.
    pub fn put(&mut self, id: impl Into<String>, value: V) -> Result<Option<V>, StoreError> {
        let id = id.into();
        let previous = self.entries.insert(id.clone(), value);

        if let Err(error) = self.save() {
            match previous {
                Some(previous) => {
                    self.entries.insert(id, previous);
                }
                None => {
                    self.entries.remove(&id);
                }
            }
            return Err(error);
        }

        Ok(previous)
    }

    /// Removes `id` and rewrites the file. Absent ids leave the file untouched;
    /// a failed write puts the entry back.
    pub fn remove(&mut self, id: &str) -> Result<Option<V>, StoreError> {
        let Some(removed) = self.entries.remove(id) else {
            return Ok(None);
        };

        if let Err(error) = self.save() {
            self.entries.insert(id.to_string(), removed);
            return Err(error);
        }

        Ok(Some(removed))
    }

    /// Replaces the in-memory mapping with the file's current contents.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.entries = load_mapping(&self.path)?;
        Ok(())
    }

    /// Writes the whole mapping according to the configured durability.
    pub fn save(&self) -> Result<(), StoreError> {
        match self.durability {
            Durability::Overwrite => write_mapping(&self.path, &self.entries),
            Durability::AtomicRename => {
                let temp = temp_path(&self.path);
                write_mapping(&temp, &self.entries)?;
                fs::rename(&temp, &self.path).map_err(|source| {
                    let _ = fs::remove_file(&temp);
                    StoreError::Io {
                        path: self.path.clone(),
                        source,
                    }
                })
            }
        }
    }
}

fn load_mapping<V: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, V>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

fn write_mapping<V: Serialize>(path: &Path, entries: &BTreeMap<String, V>) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries).map_err(|source| {
        StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.flush().map_err(io_error)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "store.json".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()))
}
