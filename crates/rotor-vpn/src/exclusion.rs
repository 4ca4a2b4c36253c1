//! Exclusion Stores
//!
//! Append-only sets of identifiers that must never be handed out twice:
//! provider ids that were already selected, and exit IPs that were
//! already observed.
//!
//! # Persistence
//!
//! The file-backed store is a newline-delimited log, one identifier per
//! line. Entries are only ever appended. Every `contains` re-reads the
//! file so that entries appended by another process are observed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Which set an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExclusionSet {
    /// Provider identifiers already selected
    Providers,
    /// Exit IP addresses already used
    Ips,
}

impl fmt::Display for ExclusionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionSet::Providers => write!(f, "providers"),
            ExclusionSet::Ips => write!(f, "ips"),
        }
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{set} store I/O error at {path}: {source}")]
    Io {
        set: ExclusionSet,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid identifier {0:?} (must be a non-empty single line)")]
    InvalidId(String),
}

/// Persisted, monotonically growing identifier set
#[async_trait]
pub trait ExclusionStore: Send + Sync {
    /// Which set this store holds
    fn set(&self) -> ExclusionSet;

    /// Check whether `id` was ever added
    async fn contains(&self, id: &str) -> Result<bool, StoreError>;

    /// Append `id` unless it is already present
    async fn add(&self, id: &str) -> Result<(), StoreError>;

    /// Every identifier currently in the set, read in one pass
    async fn load(&self) -> Result<HashSet<String>, StoreError>;
}

/// Whether `id` can be stored: non-empty and a single line once trimmed
pub fn is_valid_id(id: &str) -> bool {
    let trimmed = id.trim();
    !trimmed.is_empty() && !trimmed.contains(['\n', '\r'])
}

fn validate_id(id: &str) -> Result<&str, StoreError> {
    if !is_valid_id(id) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(id.trim())
}

fn lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Newline-delimited file store
#[derive(Debug)]
pub struct FileExclusionStore {
    set: ExclusionSet,
    path: PathBuf,
    /// Serializes appends from this process
    write_lock: Mutex<()>,
}

impl FileExclusionStore {
    /// Open the store at `path`, creating an empty file (and parent
    /// directories) if it does not exist yet. Idempotent.
    pub async fn open<P: AsRef<Path>>(set: ExclusionSet, path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io {
            set,
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        debug!("Opened {} store at {}", set, path.display());

        Ok(Self {
            set,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// All entries currently in the file, in append order
    pub async fn entries(&self) -> Result<Vec<String>, StoreError> {
        let content = self.read().await?;
        Ok(lines(&content).map(str::to_string).collect())
    }

    async fn read(&self) -> Result<String, StoreError> {
        fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            set: self.set,
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ExclusionStore for FileExclusionStore {
    fn set(&self) -> ExclusionSet {
        self.set
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let id = validate_id(id)?;
        let content = self.read().await?;
        Ok(lines(&content).any(|line| line == id))
    }

    async fn add(&self, id: &str) -> Result<(), StoreError> {
        let id = validate_id(id)?;
        let _guard = self.write_lock.lock().await;

        let content = self.read().await?;
        if lines(&content).any(|line| line == id) {
            debug!("{} already in {}", id, self.set);
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        // One write per entry keeps concurrent appends line-atomic
        file.write_all(format!("{}\n", id).as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;

        debug!("Excluded {} from {}", id, self.set);
        Ok(())
    }

    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        let content = self.read().await?;
        Ok(lines(&content).map(str::to_string).collect())
    }
}

/// In-memory store for tests and throwaway runs
#[derive(Debug)]
pub struct MemoryExclusionStore {
    set: ExclusionSet,
    entries: RwLock<Vec<String>>,
}

impl MemoryExclusionStore {
    /// Create an empty store
    pub fn new(set: ExclusionSet) -> Self {
        Self {
            set,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Create a store pre-populated with `ids`
    pub fn with_entries<I, S>(set: ExclusionSet, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            set,
            entries: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Entries in append order
    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ExclusionStore for MemoryExclusionStore {
    fn set(&self) -> ExclusionSet {
        self.set
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let id = validate_id(id)?;
        Ok(self.entries.read().await.iter().any(|e| e == id))
    }

    async fn add(&self, id: &str) -> Result<(), StoreError> {
        let id = validate_id(id)?;
        let mut entries = self.entries.write().await;
        if !entries.iter().any(|e| e == id) {
            entries.push(id.to_string());
        }
        Ok(())
    }

    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.entries.read().await.iter().cloned().collect())
    }
}
