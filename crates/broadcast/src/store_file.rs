//! JSON file-backed job store with atomic writes.

use std::path::PathBuf;

use {async_trait::async_trait, tokio::fs};

use crate::{
    error::{Context, Result},
    store::JobStore,
    types::BroadcastJob,
};

/// The job record as a single JSON document at a fixed path.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Atomic write: write to a temp path, rename over the target, so a
    /// crash mid-checkpoint never leaves a half-written record.
    async fn atomic_write(&self, json: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await.context("write temp job record")?;
        fs::rename(&tmp, &self.path).await.context("replace job record")?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn load(&self) -> Result<Option<BroadcastJob>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let job: BroadcastJob = serde_json::from_str(&data)
            .with_context(|| format!("parse broadcast job record {}", self.path.display()))?;
        Ok(Some(job))
    }

    async fn save(&self, job: &BroadcastJob) -> Result<()> {
        let json = serde_json::to_string_pretty(job)?;
        self.atomic_write(&json).await
    }

    async fn delete(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::MediaInfo, tempfile::TempDir};

    fn make_job(pending: &[&str]) -> BroadcastJob {
        BroadcastJob::new(
            pending.iter().map(|s| (*s).to_string()).collect(),
            Some("hello".into()),
            MediaInfo::default(),
        )
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("broadcast_job.json"));

        store.save(&make_job(&["A", "B"])).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.pending_recipients, vec!["A", "B"]);
        assert!(loaded.is_active);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("broadcast_job.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broadcast_job.json");
        let store = FileStore::new(&path);

        store.save(&make_job(&["A"])).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_record() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("broadcast_job.json"));

        store.save(&make_job(&["A", "B", "C"])).await.unwrap();
        let mut job = store.load().await.unwrap().unwrap();
        job.pending_recipients.remove(0);
        store.save(&job).await.unwrap();

        let reloaded = store.load().await.unwrap().unwrap();
        assert_eq!(reloaded.pending_recipients, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("broadcast_job.json"));

        assert!(!store.delete().await.unwrap());
        store.save(&make_job(&["A"])).await.unwrap();
        assert!(store.delete().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broadcast_job.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(store.load().await.is_err());
    }
}
