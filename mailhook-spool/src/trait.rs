use async_trait::async_trait;

use crate::{message::Message, types::SpooledMessageId};

/// Storage for messages that have been accepted but not yet delivered.
///
/// A record exists from the moment `write` returns until `delete` succeeds; there is no
/// other delivery state.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Persist a message under a fresh identifier. Existing records are never overwritten.
    async fn write(&self, message: &Message) -> crate::Result<SpooledMessageId>;

    /// Identifiers of every stored record, oldest first.
    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>>;

    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Message>;

    /// Remove a record. Unknown identifiers yield [`SpoolError::NotFound`](crate::SpoolError::NotFound).
    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()>;
}
