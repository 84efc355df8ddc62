//! The broadcast send loop: resumable, rate-limited, fail-fast.

use std::{
    ops::RangeInclusive,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    rand::Rng,
    tracing::{debug, error, info, warn},
};

use {
    crate::{
        audit::AuditLog,
        error::{Error, Result},
        store::JobStore,
        types::BroadcastJob,
    },
    wabridge_common::MediaPayload,
};

/// Delivery seam: the controller implements this over the live network
/// connection, tests over mocks. The runner never sees the network type.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver_text(&self, to: &str, text: &str) -> anyhow::Result<()>;
    async fn deliver_media(&self, to: &str, media: &MediaPayload) -> anyhow::Result<()>;
}

/// How a run ended (short of the fatal send-failure error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing to do: no record, inactive record, or empty pending list.
    NoJob,
    /// A run is already in flight; this start/resume was ignored.
    AlreadyRunning,
    Completed {
        sent: usize,
    },
}

/// Drives the persisted broadcast job. One logical instance per bridge; the
/// running flag rejects overlapping runs, since two iterations over the same
/// record would corrupt the pending list via concurrent checkpoints.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    audit: AuditLog,
    delay_secs: RangeInclusive<u64>,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, audit: AuditLog, delay_secs: RangeInclusive<u64>) -> Self {
        Self {
            store,
            audit,
            delay_secs,
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Persist a fresh job record, replacing any previous one. The inline
    /// `broadcast` command goes through here before `run`.
    pub async fn install(&self, job: &BroadcastJob) -> Result<()> {
        self.store.save(job).await
    }

    /// Run the persisted job until its pending list drains or a send fails.
    ///
    /// Start and resume are the same operation: the record decides what is
    /// left to do. On send failure the record already holds the unsent
    /// remainder and `Error::SendFailed` is returned; fatal by contract.
    /// Between "send succeeded" and "checkpoint persisted" there is a window
    /// where a crash re-sends that recipient on resume (at-least-once).
    pub async fn run(&self, delivery: &dyn Delivery) -> Result<RunOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("broadcast job already running, ignoring start/resume");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let Some(job) = self.store.load().await? else {
            debug!("no broadcast job on record");
            return Ok(RunOutcome::NoJob);
        };
        if !job.is_active {
            debug!("broadcast job inactive, nothing to resume");
            return Ok(RunOutcome::NoJob);
        }
        if job.pending_recipients.is_empty() {
            let mut job = job;
            job.is_active = false;
            self.store.save(&job).await?;
            debug!("broadcast job had no pending recipients, marked inactive");
            return Ok(RunOutcome::NoJob);
        }

        info!(
            pending = job.pending_recipients.len(),
            has_media = job.media_info.has_media,
            "broadcast job starting"
        );

        let mut sent = 0usize;
        loop {
            // The record is the source of truth and may be edited externally
            // between sends; re-read it for every iteration.
            let Some(job) = self.store.load().await? else {
                info!(sent, "job record removed mid-run, stopping");
                return Ok(RunOutcome::Completed { sent });
            };
            if !job.is_active {
                info!(sent, "job deactivated mid-run, stopping");
                return Ok(RunOutcome::Completed { sent });
            }
            let Some(recipient) = job.pending_recipients.first().cloned() else {
                let mut job = job;
                job.is_active = false;
                self.store.save(&job).await?;
                break;
            };

            let result = match job.payload() {
                Some(media) => delivery.deliver_media(&recipient, &media).await,
                None => {
                    delivery
                        .deliver_text(&recipient, job.message.as_deref().unwrap_or_default())
                        .await
                },
            };

            if let Err(reason) = result {
                self.audit.record_failed(&recipient, &reason.to_string()).await;
                error!(%recipient, error = %reason, "broadcast send failed, aborting job");
                return Err(Error::SendFailed { recipient, reason });
            }

            // Checkpoint: merge against the latest persisted state, remove
            // exactly one occurrence of the recipient, write back before the
            // next send begins.
            let mut latest = self.store.load().await?.unwrap_or(job);
            if let Some(pos) = latest.pending_recipients.iter().position(|r| r == &recipient) {
                latest.pending_recipients.remove(pos);
            }
            if latest.pending_recipients.is_empty() {
                latest.is_active = false;
            }
            self.store.save(&latest).await?;
            self.audit.record_sent(&recipient).await;
            sent += 1;
            debug!(%recipient, remaining = latest.pending_recipients.len(), "sent");

            if latest.pending_recipients.is_empty() {
                break;
            }

            // Randomized inter-send delay; suspends only this task.
            let delay = rand::rng().random_range(self.delay_secs.clone());
            debug!(secs = delay, "waiting before next recipient");
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        info!(sent, "broadcast job complete");
        Ok(RunOutcome::Completed { sent })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        std::sync::Mutex,
        tempfile::TempDir,
        tokio::time::{Duration as TokioDuration, sleep},
    };

    use {
        super::*,
        crate::{store_file::FileStore, store_memory::MemoryStore, types::MediaInfo},
    };

    struct MockDelivery {
        sent: Mutex<Vec<String>>,
        fail_on: Option<String>,
        per_send_delay: TokioDuration,
    }

    impl MockDelivery {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_on: None,
                per_send_delay: TokioDuration::ZERO,
            }
        }

        fn failing_on(recipient: &str) -> Self {
            Self {
                fail_on: Some(recipient.into()),
                ..Self::new()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Delivery for MockDelivery {
        async fn deliver_text(&self, to: &str, _text: &str) -> anyhow::Result<()> {
            if self.per_send_delay > TokioDuration::ZERO {
                sleep(self.per_send_delay).await;
            }
            if self.fail_on.as_deref() == Some(to) {
                anyhow::bail!("stream errored");
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(())
        }

        async fn deliver_media(&self, to: &str, _media: &MediaPayload) -> anyhow::Result<()> {
            self.deliver_text(to, "").await
        }
    }

    fn manager(store: Arc<dyn JobStore>) -> (JobManager, TempDir) {
        let audit_dir = TempDir::new().unwrap();
        let audit = AuditLog::new(audit_dir.path().join("broadcast.log"));
        (JobManager::new(store, audit, 0..=0), audit_dir)
    }

    fn job(pending: &[&str]) -> BroadcastJob {
        BroadcastJob::new(
            pending.iter().map(|s| (*s).to_string()).collect(),
            Some("hi".into()),
            MediaInfo::default(),
        )
    }

    #[tokio::test]
    async fn test_completes_and_deactivates() {
        let store = Arc::new(MemoryStore::with_job(job(&["A", "B", "C"])));
        let (mgr, _audit_dir) = manager(store.clone());
        let delivery = MockDelivery::new();

        let outcome = mgr.run(&delivery).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed { sent: 3 });
        assert_eq!(delivery.sent(), vec!["A", "B", "C"]);
        let record = store.load().await.unwrap().unwrap();
        assert!(!record.is_active);
        assert!(record.pending_recipients.is_empty());
    }

    #[tokio::test]
    async fn test_failure_persists_exact_remainder() {
        let store = Arc::new(MemoryStore::with_job(job(&["A", "B", "C"])));
        let (mgr, _audit_dir) = manager(store.clone());
        let delivery = MockDelivery::failing_on("B");

        let err = mgr.run(&delivery).await.unwrap_err();

        assert!(matches!(err, Error::SendFailed { ref recipient, .. } if recipient == "B"));
        assert_eq!(delivery.sent(), vec!["A"]);
        let record = store.load().await.unwrap().unwrap();
        assert!(record.is_active);
        assert_eq!(record.pending_recipients, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_resume_sends_exactly_the_remainder() {
        let store = Arc::new(MemoryStore::with_job(job(&["A", "B", "C"])));
        let (mgr, _audit_dir) = manager(store.clone());

        let _ = mgr.run(&MockDelivery::failing_on("B")).await.unwrap_err();

        let delivery = MockDelivery::new();
        let outcome = mgr.run(&delivery).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { sent: 2 });
        assert_eq!(delivery.sent(), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_resume_of_finished_job_is_noop() {
        let mut finished = job(&[]);
        finished.is_active = false;
        let store = Arc::new(MemoryStore::with_job(finished.clone()));
        let (mgr, _audit_dir) = manager(store.clone());
        let delivery = MockDelivery::new();

        let outcome = mgr.run(&delivery).await.unwrap();

        assert_eq!(outcome, RunOutcome::NoJob);
        assert!(delivery.sent().is_empty());
        assert_eq!(store.load().await.unwrap(), Some(finished));
    }

    #[tokio::test]
    async fn test_no_record_is_noop() {
        let (mgr, _audit_dir) = manager(Arc::new(MemoryStore::new()));
        assert_eq!(
            mgr.run(&MockDelivery::new()).await.unwrap(),
            RunOutcome::NoJob
        );
    }

    #[tokio::test]
    async fn test_active_with_drained_list_is_normalized() {
        let store = Arc::new(MemoryStore::with_job(job(&[])));
        let (mgr, _audit_dir) = manager(store.clone());

        let outcome = mgr.run(&MockDelivery::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::NoJob);
        assert!(!store.load().await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected_while_in_flight() {
        let store = Arc::new(MemoryStore::with_job(job(&["A", "B"])));
        let (mgr, _audit_dir) = manager(store);
        let mgr = Arc::new(mgr);
        let slow = Arc::new(MockDelivery {
            per_send_delay: TokioDuration::from_millis(200),
            ..MockDelivery::new()
        });

        let first = tokio::spawn({
            let (mgr, slow) = (mgr.clone(), slow.clone());
            async move { mgr.run(&*slow).await }
        });
        sleep(TokioDuration::from_millis(50)).await;

        let second = mgr.run(&MockDelivery::new()).await.unwrap();
        assert_eq!(second, RunOutcome::AlreadyRunning);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first, RunOutcome::Completed { sent: 2 });
    }

    #[tokio::test]
    async fn test_duplicate_recipient_removed_one_at_a_time() {
        let store = Arc::new(MemoryStore::with_job(job(&["A", "A"])));
        let (mgr, _audit_dir) = manager(store.clone());
        let delivery = MockDelivery::new();

        let outcome = mgr.run(&delivery).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed { sent: 2 });
        assert_eq!(delivery.sent(), vec!["A", "A"]);
    }

    #[tokio::test]
    async fn test_end_to_end_on_disk_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broadcast_job.json");
        std::fs::write(
            &path,
            r#"{"isActive":true,"pendingRecipients":["A","B","C"],"message":"hi","mediaInfo":{"has_media":false}}"#,
        )
        .unwrap();

        let store = Arc::new(FileStore::new(&path));
        let mgr = JobManager::new(
            store.clone(),
            AuditLog::new(tmp.path().join("broadcast.log")),
            0..=0,
        );

        // Send to A succeeds, B fails: the process would exit here.
        let err = mgr.run(&MockDelivery::failing_on("B")).await.unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["isActive"], true);
        assert_eq!(
            on_disk["pendingRecipients"],
            serde_json::json!(["B", "C"])
        );

        // Fresh manager after restart: resume sends only B then C.
        let resumed = JobManager::new(
            store,
            AuditLog::new(tmp.path().join("broadcast.log")),
            0..=0,
        );
        let delivery = MockDelivery::new();
        assert_eq!(
            resumed.run(&delivery).await.unwrap(),
            RunOutcome::Completed { sent: 2 }
        );
        assert_eq!(delivery.sent(), vec!["B", "C"]);

        let audit = std::fs::read_to_string(tmp.path().join("broadcast.log")).unwrap();
        let lines: Vec<_> = audit.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("[SENT] to: A"));
        assert!(lines[1].contains("[FAILED] to: B"));
        assert!(lines[2].contains("[SENT] to: B"));
        assert!(lines[3].contains("[SENT] to: C"));
    }
}
