//! Append-only audit log: one line per broadcast send attempt. Never rotated
//! or truncated by this system.

use std::path::PathBuf;

use {
    chrono::Utc,
    tokio::{fs, io::AsyncWriteExt},
    tracing::warn,
};

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn record_sent(&self, recipient: &str) {
        self.append(&format!("[SENT] to: {recipient}")).await;
    }

    pub async fn record_failed(&self, recipient: &str, error: &str) {
        self.append(&format!("[FAILED] to: {recipient} - {error}"))
            .await;
    }

    /// Audit failures must not abort a broadcast; they are logged and the
    /// run continues.
    async fn append(&self, entry: &str) {
        let line = format!("{} {entry}\n", Utc::now().to_rfc3339());
        let result = async {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).await?;
            }
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?
                .write_all(line.as_bytes())
                .await
        }
        .await;

        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append audit line");
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[tokio::test]
    async fn test_appends_one_line_per_attempt() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path().join("broadcast.log"));

        log.record_sent("628111@s.whatsapp.net").await;
        log.record_failed("628222@s.whatsapp.net", "connection closed")
            .await;

        let contents = std::fs::read_to_string(tmp.path().join("broadcast.log")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[SENT] to: 628111@s.whatsapp.net"));
        assert!(lines[1].contains("[FAILED] to: 628222@s.whatsapp.net - connection closed"));
    }

    #[tokio::test]
    async fn test_never_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broadcast.log");

        AuditLog::new(&path).record_sent("A").await;
        AuditLog::new(&path).record_sent("B").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
