pub mod backends;
pub mod config;
pub mod error;
pub mod message;
pub mod r#trait;
pub mod types;

pub use backends::{FileBackingStore, FileBackingStoreBuilder, MemoryBackingStore, TestBackingStore};
pub use config::SpoolConfig;
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use message::{Message, extract_subject};
pub use r#trait::BackingStore;
pub use types::SpooledMessageId;
