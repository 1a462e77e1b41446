use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use mailhook_common::internal;
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    SerializationError, SpoolError, ValidationError, message::Message, r#trait::BackingStore,
    types::SpooledMessageId,
};

const TEMP_PREFIX: &str = ".tmp_";
const DELETED_SUFFIX: &str = ".deleted";
const RECORD_SUFFIX: &str = ".bin";

/// Upper bound on messages that can complete within a single second.
const MAX_SEQUENCE: u32 = 100_000;

const SENSITIVE_PREFIXES: [&str; 9] = [
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
];

/// File-based backing store implementation
///
/// Every message becomes two files in the spool directory, both named after its
/// [`SpooledMessageId`]:
/// - `{id}.txt`: the raw body. Write-once, never read back by the gateway.
/// - `{id}.bin`: the bincode-encoded [`Message`], which is the queue entry itself.
///
/// # Atomicity
/// - The `.txt` file is created with `create_new`, which is what reserves an
///   identifier; a concurrent writer that loses the race moves on to the next sequence.
/// - The record is written to `.tmp_{id}.bin` and renamed into place, so readers never
///   see a partial record.
/// - Deletion renames the record to `{id}.bin.deleted` before removing it. Leftovers
///   from a crash are swept by [`init`](Self::init).
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mails"),
        }
    }
}

impl FileBackingStore {
    /// Validate a spool path
    ///
    /// Relative paths are allowed (the default spool is `./mails`), but `..` components
    /// and system directories are not.
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentDirectory(path.display().to_string()));
        }

        if let Some(prefix) = SENSITIVE_PREFIXES
            .into_iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix,
                path: path.display().to_string(),
            });
        }

        Ok(())
    }

    /// Create a new `FileBackingStore` builder
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize the file-backed spool
    ///
    /// Creates the spool directory if it doesn't exist, checks that it is a directory,
    /// and removes temporary and half-deleted files left behind by a crash.
    ///
    /// # Errors
    /// - If the spool path cannot be created or read
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising Spool at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        self.cleanup_orphans()?;

        Ok(())
    }

    fn cleanup_orphans(&self) -> crate::Result<usize> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(DELETED_SUFFIX) || filename.starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from spool"
            );
        }

        Ok(cleaned)
    }

    fn record_path(&self, id: &SpooledMessageId) -> PathBuf {
        self.path.join(id.record_filename())
    }

    /// Claim the first free identifier at or after `id` by exclusively creating its
    /// body file, then fill that file with `body`.
    async fn reserve(&self, id: SpooledMessageId, body: &[u8]) -> crate::Result<SpooledMessageId> {
        let mut candidate = id;

        for _ in 0..MAX_SEQUENCE {
            if fs::try_exists(self.record_path(&candidate)).await? {
                candidate = candidate.next();
                continue;
            }

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.path.join(candidate.body_filename()))
                .await
            {
                Ok(mut file) => {
                    file.write_all(body).await?;
                    file.flush().await?;
                    return Ok(candidate);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = candidate.next();
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(SpoolError::Internal(format!(
            "No free identifier left in second {}",
            candidate.stamp()
        )))
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn write(&self, message: &Message) -> crate::Result<SpooledMessageId> {
        let record = bincode::serde::encode_to_vec(message, bincode::config::standard())
            .map_err(SerializationError::from)?;

        fs::create_dir_all(&self.path).await?;

        let id = self
            .reserve(SpooledMessageId::now(), &message.body)
            .await?;

        let temp_path = self
            .path
            .join(format!("{TEMP_PREFIX}{}", id.record_filename()));
        fs::write(&temp_path, &record).await?;
        fs::rename(&temp_path, self.record_path(&id)).await?;

        internal!(
            level = DEBUG,
            "Spooled message {id} to {}",
            self.path.display()
        );

        Ok(id)
    }

    /// A spool directory that does not exist yet simply holds no records.
    #[tracing::instrument(level = "debug", skip_all)]
    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut message_ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.ends_with(RECORD_SUFFIX)
                && !filename.starts_with(TEMP_PREFIX)
                && let Some(id) = SpooledMessageId::from_filename(&filename)
            {
                message_ids.push(id);
            }
        }

        message_ids.sort();

        internal!(
            level = DEBUG,
            "Found {} messages in spool",
            message_ids.len()
        );

        Ok(message_ids)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %id))]
    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Message> {
        let content = match fs::read(self.record_path(id)).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        };

        let (message, _) = bincode::serde::decode_from_slice(&content, bincode::config::standard())
            .map_err(SerializationError::from)?;

        Ok(message)
    }

    /// Only the record is removed; the `.txt` copy of the body stays behind.
    #[tracing::instrument(level = "debug", skip_all, fields(id = %id))]
    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()> {
        let record_path = self.record_path(id);
        let deleted_path = self
            .path
            .join(format!("{}{DELETED_SUFFIX}", id.record_filename()));

        match fs::rename(&record_path, &deleted_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        }

        fs::remove_file(&deleted_path).await?;

        internal!(level = DEBUG, "Deleted message {id} from spool");

        Ok(())
    }
}

/// Builder for `FileBackingStore`
#[derive(Debug)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
}

impl Default for FileBackingStoreBuilder {
    fn default() -> Self {
        Self {
            path: FileBackingStore::default().path,
        }
    }
}

impl FileBackingStoreBuilder {
    /// Set the spool directory path
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the final `FileBackingStore`
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> Result<FileBackingStore, ValidationError> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore { path: self.path })
    }
}
