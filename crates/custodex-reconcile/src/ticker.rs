//! Jittered periodic scheduling.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fixed period plus up to `jitter` of random delay per tick, so that
/// replicas started together drift apart.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
    jitter: Duration,
}

impl Ticker {
    #[must_use]
    pub fn new(period: Duration, jitter: Duration) -> Self {
        Self { period, jitter }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Delay before the next tick.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return self.period;
        }
        let extra = rand::thread_rng().gen_range(0..=max);
        self.period + Duration::from_millis(extra)
    }

    /// Sleep until the next tick. Returns `false` once shutdown was
    /// signalled (or the sender dropped), without waiting out the delay.
    pub async fn wait(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(self.next_delay()) => !*shutdown.borrow(),
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }
}

/// Run `job` once per tick until `shutdown` flips to `true`.
///
/// A tick that is still running when shutdown arrives is allowed to
/// finish; the loop exits before starting another.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    ticker: Ticker,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(task = name, period_ms = ticker.period.as_millis(), "loop started");
        while ticker.wait(&mut shutdown).await {
            job().await;
        }
        tracing::info!(task = name, "loop stopped");
    })
}
