use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::ErrorInfo;
use crate::launcher::LauncherState;

/// Snapshot of an active transfer. Recreated on every progress tick and
/// discarded when the download terminates.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub rate_bytes_per_sec: f64,
}

impl DownloadProgress {
    pub fn starting(bytes_total: u64) -> Self {
        DownloadProgress {
            bytes_transferred: 0,
            bytes_total,
            rate_bytes_per_sec: 0.0,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.bytes_total as f64) * 100.0
        }
    }
}

/// Observer-facing event stream for long-running launcher work.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum LauncherEvent {
    StateChanged(LauncherState),
    Progress(DownloadProgress),
    Error(ErrorInfo),
}

/// Emission side of the event channel. Sending is best-effort: a consumer
/// that stopped draining must not break launcher work.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LauncherEvent>,
}

impl EventSender {
    pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<LauncherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, rx)
    }

    pub fn emit(&self, event: LauncherEvent) {
        // Mirror failures to the backend log so problems are visible even
        // when no observer is attached.
        if let LauncherEvent::Error(info) = &event {
            log::error!("launcher error [{}]: {}", info.kind, info.message);
        }
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_tracks_transferred_bytes() {
        let mut progress = DownloadProgress::starting(1000);
        assert_eq!(progress.percent(), 0.0);

        progress.bytes_transferred = 250;
        assert_eq!(progress.percent(), 25.0);

        progress.bytes_transferred = 1000;
        assert_eq!(progress.percent(), 100.0);
    }

    #[test]
    fn percent_of_unknown_total_is_zero() {
        let progress = DownloadProgress {
            bytes_transferred: 512,
            bytes_total: 0,
            rate_bytes_per_sec: 0.0,
        };
        assert_eq!(progress.percent(), 0.0);
    }
}
