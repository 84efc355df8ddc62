//! Persistence trait for the broadcast job record.

use async_trait::async_trait;

use crate::{Result, types::BroadcastJob};

/// Persistence backend for the single broadcast job record.
///
/// Every mutation in the send loop is a read-modify-write cycle through this
/// trait, never an in-memory-only update.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load(&self) -> Result<Option<BroadcastJob>>;
    async fn save(&self, job: &BroadcastJob) -> Result<()>;
    /// Remove the record entirely. Returns whether one existed.
    async fn delete(&self) -> Result<bool>;
}
