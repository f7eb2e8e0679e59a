use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::directory::AgentDirectory;

/// Periodic health sweep over the agent directory.
///
/// Every interval it decays the health of agents that missed heartbeats and
/// takes agents silent for more than two intervals offline.
pub struct HealthMonitor {
    directory: Arc<AgentDirectory>,
    interval: Duration,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn new(directory: Arc<AgentDirectory>, cancel: CancellationToken) -> Self {
        let interval = directory.config().heartbeat_interval();
        Self {
            directory,
            interval,
            cancel,
        }
    }

    /// Override the sweep interval taken from the directory config.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop. Blocks until cancelled.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Health monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    info!("Health monitor shutting down");
                    break;
                }
            }

            let report = self.directory.sweep(Utc::now(), self.interval).await;
            debug!(
                decayed = report.decayed.len(),
                went_offline = report.went_offline.len(),
                "Health sweep complete"
            );
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::config::DirectoryConfig;

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_cancel() {
        let directory = Arc::new(AgentDirectory::new(DirectoryConfig::default()));
        let cancel = CancellationToken::new();
        let handle = HealthMonitor::new(directory, cancel.clone())
            .with_interval(Duration::from_secs(1))
            .spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor exits promptly")
            .expect("monitor task does not panic");
    }

    #[test]
    fn test_interval_from_config() {
        let directory = Arc::new(AgentDirectory::new(DirectoryConfig {
            heartbeat_interval_secs: 12,
            ..Default::default()
        }));
        let monitor = HealthMonitor::new(directory, CancellationToken::new());
        assert_eq!(monitor.interval, Duration::from_secs(12));
    }
}
