//! Wait-until loops with a progress ticker.
//!
//! [`poll_until`] runs a check at a fixed interval until it yields a value.
//! While it waits, a background task reports progress every tick; the task is
//! stopped and joined on every exit path, so no tick is emitted after the
//! call returns.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default progress tick period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

const MIN_TICK: Duration = Duration::from_millis(1);

/// Interval, tick period and optional limit for one wait phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Pause between attempts.
    pub interval: Duration,
    /// Progress tick period.
    pub tick: Duration,
    /// Give up after this long; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Checks every `interval` with the default tick and no limit.
    #[must_use]
    pub const fn every(interval: Duration) -> Self {
        Self {
            interval,
            tick: DEFAULT_TICK,
            timeout: None,
        }
    }

    /// Sets the overall limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the progress tick period.
    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

/// Raised when a wait phase exceeds its limit.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("timed out after {}s waiting for {action}", waited.as_secs())]
pub struct PollTimeout {
    /// Phase that timed out.
    pub action: String,
    /// Time spent waiting.
    pub waited: Duration,
}

/// Sink for progress ticks.
pub trait Progress: Clone + Send + Sync + 'static {
    /// Called once per tick while a wait is in progress.
    fn tick(&self);

    /// Called once when a wait finishes, successfully or not.
    fn finish(&self) {}
}

/// Prints a dot per tick to standard output and ends the line when done.
#[derive(Clone, Debug, Default)]
pub struct StdoutProgress {
    ticked: Arc<AtomicBool>,
}

impl StdoutProgress {
    /// Creates a progress printer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for StdoutProgress {
    fn tick(&self) {
        self.ticked.store(true, Ordering::Relaxed);
        let mut stdout = io::stdout();
        write!(stdout, ".").ok();
        stdout.flush().ok();
    }

    fn finish(&self) {
        if self.ticked.swap(false, Ordering::Relaxed) {
            writeln!(io::stdout()).ok();
        }
    }
}

/// Runs `check` until it returns `Some`, sleeping `policy.interval` between
/// attempts and ticking `progress` meanwhile.
///
/// # Errors
///
/// Returns the check's error unchanged, or a [`PollTimeout`] converted into
/// `E` once `policy.timeout` has elapsed.
pub async fn poll_until<T, E, P, F, Fut>(
    policy: &PollPolicy,
    action: &str,
    progress: &P,
    check: F,
) -> Result<T, E>
where
    P: Progress,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: From<PollTimeout>,
{
    let ticker = Ticker::start(progress.clone(), policy.tick);
    let outcome = check_loop(policy, action, check).await;
    ticker.stop().await;
    progress.finish();
    outcome
}

async fn check_loop<T, E, F, Fut>(policy: &PollPolicy, action: &str, mut check: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: From<PollTimeout>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        debug!(action, attempt, "polling");
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if let Some(limit) = policy.timeout {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(PollTimeout {
                    action: action.to_owned(),
                    waited,
                }
                .into());
            }
        }
        sleep(policy.interval).await;
    }
}

struct Ticker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn start<P: Progress>(progress: P, tick: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick.max(MIN_TICK));
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => progress.tick(),
                }
            }
        });
        Self { stop, handle }
    }

    async fn stop(self) {
        self.stop.send(()).ok();
        self.handle.await.ok();
    }
}
