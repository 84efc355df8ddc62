//! Config schema types for the bridge binary.

use std::{ops::RangeInclusive, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WabridgeConfig {
    pub gateway: GatewaySection,
    pub worker: WorkerSection,
    pub storage: StorageSection,
    pub bridge: BridgeSection,
    pub broadcast: BroadcastSection,
}

/// Connection to the network gateway sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// WebSocket URL of the gateway process.
    pub url: String,
    /// Connection attempts before giving up at startup.
    pub connect_attempts: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8799".into(),
            connect_attempts: 10,
        }
    }
}

/// The external worker process holding decision logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub program: String,
    pub args: Vec<String>,
    /// One-line startup banner the worker prints once; filtered from the
    /// diagnostic log stream.
    pub startup_banner: Option<String>,
    /// Restart the worker when it exits while the connection is open.
    pub restart_on_exit: bool,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["send.py".into()],
            startup_banner: Some("Waiting for messages...".into()),
            restart_on_exit: false,
        }
    }
}

/// On-disk layout. The media cache, the broadcast job record, and the audit
/// log all live under `data_dir`; cache clearing is extension-gated so the
/// record and the log survive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageSection {
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn job_path(&self) -> PathBuf {
        self.data_dir.join("broadcast_job.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join("broadcast.log")
    }
}

/// Event filtering and resume behavior of the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Only events whose text starts with this prefix reach the worker.
    pub command_prefix: String,
    /// Settle delay after connection-open before attempting a job resume.
    pub resume_settle_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            command_prefix: "!".into(),
            resume_settle_secs: 5,
        }
    }
}

/// Broadcast pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSection {
    pub delay_min_secs: u64,
    pub delay_max_secs: u64,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            delay_min_secs: 6,
            delay_max_secs: 14,
        }
    }
}

impl BroadcastSection {
    /// Inter-send delay window in seconds. An inverted window collapses to
    /// the minimum.
    pub fn delay_range(&self) -> RangeInclusive<u64> {
        let max = self.delay_max_secs.max(self.delay_min_secs);
        self.delay_min_secs..=max
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = WabridgeConfig::default();
        assert_eq!(cfg.bridge.command_prefix, "!");
        assert_eq!(cfg.broadcast.delay_range(), 6..=14);
        assert!(!cfg.worker.restart_on_exit);
        assert_eq!(cfg.storage.job_path(), PathBuf::from("data/broadcast_job.json"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: WabridgeConfig = toml::from_str(
            r#"
            [worker]
            program = "node"
            args = ["worker.js"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.worker.program, "node");
        assert_eq!(cfg.gateway.connect_attempts, 10);
        assert_eq!(cfg.bridge.resume_settle_secs, 5);
    }

    #[test]
    fn test_inverted_delay_window_collapses() {
        let b = BroadcastSection {
            delay_min_secs: 9,
            delay_max_secs: 2,
        };
        assert_eq!(b.delay_range(), 9..=9);
    }
}
