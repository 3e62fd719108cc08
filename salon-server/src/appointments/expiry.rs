//! 待确认预约过期调度器
//!
//! Periodically sweeps active appointments and lapses Pending ones whose
//! approval deadline has passed. A lapsed appointment stops blocking its
//! slots and its chat thread closes for new messages.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::AppointmentsManager;

/// Pending appointment expiry sweeper
///
/// Registered as a periodic background task in `start_background_tasks()`.
/// The reducer already treats an overdue Pending appointment as lapsed when
/// reading, so the sweep only has to make that durable and broadcast it.
pub struct PendingExpirySweeper {
    manager: Arc<AppointmentsManager>,
    shutdown: CancellationToken,
    interval: Duration,
}

impl PendingExpirySweeper {
    pub fn new(
        manager: Arc<AppointmentsManager>,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            shutdown,
            interval,
        }
    }

    /// 主循环：启动扫描 + 周期触发
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Pending expiry sweeper started"
        );

        // 启动时立即扫描一次，补上停机期间错过的过期
        self.sweep();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep();
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Pending expiry sweeper received shutdown signal");
                    return;
                }
            }
        }
    }

    fn sweep(&self) {
        if let Err(e) = self.manager.expire_overdue_appointments() {
            tracing::error!(error = %e, "Expiry sweep failed");
        }
    }
}
