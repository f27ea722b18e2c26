//! Time source for poll scheduling.
//!
//! The scheduler never calls `tokio::time` directly; it goes through a
//! [`Clock`] so that alternative time sources can be injected. The default
//! [`TokioClock`] follows tokio's clock, which tests pause and advance.

use std::time::Duration;

use async_trait::async_trait;
use genjob_core::types::Timestamp;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic now, used for delays and elapsed budgets.
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    /// Wall-clock now, used only for log records.
    fn utc_now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
