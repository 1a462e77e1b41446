use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Deserializer};

use crate::{
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::BackingStore,
};

/// Configuration for the spool backing store
///
/// File-backed spool in RON config:
/// ```ron
/// spool: File(path: "./mails"),
/// ```
///
/// Memory-backed spool for testing, optionally bounded:
/// ```ron
/// spool: Memory(capacity: Some(1000)),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum SpoolConfig {
    File {
        #[serde(deserialize_with = "validated_path")]
        path: PathBuf,
    },
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File {
            path: FileBackingStore::default().path().to_path_buf(),
        }
    }
}

fn validated_path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
    let path = PathBuf::deserialize(deserializer)?;
    FileBackingStore::validate_path(&path).map_err(serde::de::Error::custom)?;
    Ok(path)
}

impl SpoolConfig {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Initialise the configured store and hand it out as a shared trait object
    ///
    /// # Errors
    /// If a file spool's path is rejected, or its directory cannot be created, is not a
    /// directory, or cannot be cleaned of leftovers
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        let store: Arc<dyn BackingStore> = match self {
            Self::File { path } => {
                let store = FileBackingStore::builder().path(path).build()?;
                store.init()?;
                Arc::new(store)
            }
            Self::Memory { capacity } => Arc::new(
                capacity.map_or_else(MemoryBackingStore::new, MemoryBackingStore::with_capacity),
            ),
        };

        Ok(store)
    }
}
