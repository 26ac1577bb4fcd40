//! Session storage: string key/value pairs scoped to the browsing session,
//! optionally persisted to a JSON file so they outlive a process restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
pub struct SessionStorage {
    items: BTreeMap<String, String>,
    file: Option<PathBuf>,
}

impl SessionStorage {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open storage backed by `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let items = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).map_err(|source| SessionError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        Ok(Self {
            items,
            file: Some(path),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), SessionError> {
        self.items.insert(key.into(), value.into());
        self.persist()
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<String>, SessionError> {
        let removed = self.items.remove(key);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&self) -> Result<(), SessionError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let json = serde_json::to_string(&self.items).map_err(|source| SessionError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| SessionError::Io {
            path: path.clone(),
            source,
        })
    }
}
