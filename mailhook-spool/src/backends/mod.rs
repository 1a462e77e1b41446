//! Backend storage implementations for the spool
//!
//! - `file`: one record file per message in a directory, for production use
//! - `memory`: in-memory storage for testing
//! - `test`: memory storage with synchronisation helpers for tests

pub mod file;
pub mod memory;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
pub use test::TestBackingStore;
