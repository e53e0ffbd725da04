//! Session stores available to the CLI.
//!
//! Sessions live either behind the scaling API or as `<name>.json` files in
//! a local directory.

use anyhow::Result;
use staging::{Session, SessionStore, SessionSummary};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{KstageConfig, StoreKind};

/// Errors from the local session directory
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("session '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid session name '{0}'")]
    InvalidName(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid session file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Open the store selected in the config
pub fn open(config: &KstageConfig) -> Box<dyn SessionStore> {
    match config.store.kind {
        StoreKind::Remote => Box::new(scaleapi::HttpSessionStore::new(
            &config.api(),
            config.store.folder.clone(),
        )),
        StoreKind::Local => {
            let store = DirSessionStore::new(config.store_dir());
            log::debug!("using local sessions in {}", store.dir().display());
            Box::new(store)
        }
    }
}

// ============================================================================
// Local directory store
// ============================================================================

/// Sessions kept as pretty-printed JSON files in one directory
#[derive(Debug, Clone)]
pub struct DirSessionStore {
    dir: PathBuf,
}

impl DirSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    fn read(&self, name: &str) -> Result<Session, StoreError> {
        let path = self.path_of(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    fn write(&self, session: &Session) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path_of(&session.name)?;
        let content = serde_json::to_string_pretty(session).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(|e| StoreError::io(&path, e))?;
        log::debug!("wrote session to {}", path.display());
        Ok(())
    }
}

impl SessionStore for DirSessionStore {
    fn list(&self) -> Result<Vec<SessionSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e).into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.read(name) {
                Ok(session) => summaries.push(session.summary()),
                Err(e) => log::warn!("skipping {}: {e}", path.display()),
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    fn get(&self, name: &str) -> Result<Session> {
        Ok(self.read(name)?)
    }

    fn create(&self, session: &Session) -> Result<()> {
        if self.path_of(&session.name)?.exists() {
            return Err(StoreError::AlreadyExists(session.name.clone()).into());
        }
        Ok(self.write(session)?)
    }

    fn update(&self, name: &str, session: &Session) -> Result<()> {
        if !self.path_of(name)?.exists() {
            return Err(StoreError::NotFound(name.to_string()).into());
        }
        if session.name != name {
            // Written under its own name, then the old file goes
            self.write(session)?;
            return self.delete(name);
        }
        Ok(self.write(session)?)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()).into())
            }
            Err(e) => Err(StoreError::io(&path, e).into()),
        }
    }

    fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        if self.path_of(new_name)?.exists() {
            return Err(StoreError::AlreadyExists(new_name.to_string()).into());
        }
        let mut session = self.read(name)?;
        session.name = new_name.to_string();
        self.write(&session)?;
        self.delete(name)
    }
}
