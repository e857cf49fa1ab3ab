//! Hardware pressure probe.
//!
//! Polls process RSS against total system memory at a configured
//! interval and broadcasts a pressure event when the configured
//! threshold is crossed. The cache hierarchy subscribes and runs its
//! eviction pass in response.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, warn};

use crate::domain::models::config::PressureConfig;

/// One pressure measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PressureStatus {
    pub rss_bytes: u64,
    pub total_bytes: u64,
    pub rss_pct: f64,
    pub over_threshold: bool,
}

/// Events broadcast by the probe.
#[derive(Debug, Clone, Copy)]
pub enum PressureEvent {
    Status(PressureStatus),
    /// Threshold crossed; the payload is the byte target to free.
    EvictRequested { target_bytes: u64 },
}

/// Background memory probe.
pub struct HardwareMonitor {
    config: PressureConfig,
    latest: Arc<RwLock<Option<PressureStatus>>>,
    tx: broadcast::Sender<PressureEvent>,
}

impl HardwareMonitor {
    pub fn new(config: PressureConfig) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { config, latest: Arc::new(RwLock::new(None)), tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PressureEvent> {
        self.tx.subscribe()
    }

    pub async fn latest(&self) -> Option<PressureStatus> {
        *self.latest.read().await
    }

    /// Take one measurement and publish it.
    pub async fn sample(&self) -> PressureStatus {
        let status = measure(self.config.high_pct);
        *self.latest.write().await = Some(status);

        let _ = self.tx.send(PressureEvent::Status(status));
        if status.over_threshold {
            warn!(
                rss_pct = status.rss_pct,
                threshold = self.config.high_pct,
                "memory pressure over threshold, requesting eviction"
            );
            let _ = self.tx.send(PressureEvent::EvictRequested {
                target_bytes: self.config.evict_target_bytes,
            });
        }
        status
    }

    /// Run the poll loop until the returned handle is aborted.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let poll = Duration::from_secs(self.config.poll_interval_s.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(poll);
            loop {
                ticker.tick().await;
                let status = self.sample().await;
                debug!(rss_bytes = status.rss_bytes, rss_pct = status.rss_pct, "pressure sample");
            }
        })
    }
}

fn measure(high_pct: f64) -> PressureStatus {
    let refresh = RefreshKind::new().with_memory(MemoryRefreshKind::everything());
    let mut system = System::new_with_specifics(refresh);
    let pid = Pid::from_u32(std::process::id());
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_memory(),
    );

    let total_bytes = system.total_memory().max(1);
    let rss_bytes = system.process(pid).map_or(0, sysinfo::Process::memory);
    let rss_pct = rss_bytes as f64 / total_bytes as f64 * 100.0;

    PressureStatus {
        rss_bytes,
        total_bytes,
        rss_pct,
        over_threshold: rss_pct >= high_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_reports_positive_rss() {
        let monitor = HardwareMonitor::new(PressureConfig::default());
        let status = monitor.sample().await;
        assert!(status.total_bytes > 0);
        assert!(status.rss_pct >= 0.0);
        assert_eq!(monitor.latest().await.unwrap().rss_bytes, status.rss_bytes);
    }

    #[tokio::test]
    async fn low_threshold_triggers_evict_event() {
        let config = PressureConfig { high_pct: 0.000_001, ..PressureConfig::default() };
        let monitor = HardwareMonitor::new(config);
        let mut rx = monitor.subscribe();
        let status = monitor.sample().await;
        assert!(status.over_threshold);

        // First event is the status, second the eviction request.
        assert!(matches!(rx.recv().await.unwrap(), PressureEvent::Status(_)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PressureEvent::EvictRequested { .. }
        ));
    }
}
