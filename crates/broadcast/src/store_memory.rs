//! In-memory job store for tests and embedding.

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{Result, store::JobStore, types::BroadcastJob};

#[derive(Default)]
pub struct MemoryStore {
    job: RwLock<Option<BroadcastJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(job: BroadcastJob) -> Self {
        Self {
            job: RwLock::new(Some(job)),
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn load(&self) -> Result<Option<BroadcastJob>> {
        Ok(self.job.read().await.clone())
    }

    async fn save(&self, job: &BroadcastJob) -> Result<()> {
        *self.job.write().await = Some(job.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<bool> {
        Ok(self.job.write().await.take().is_some())
    }
}
