//! Bounded, cancellable poll-until.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::PollError;

/// How often to check and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits until the condition holds or the wait is cancelled.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self::new(interval, Some(timeout))
    }

    pub(crate) fn deadline(&self, started: Instant) -> Option<Instant> {
        self.timeout.map(|t| started + t)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::bounded(Duration::from_secs(1), Duration::from_secs(120))
    }
}

/// Why a pause between checks ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    TimedOut,
    Cancelled,
}

/// Sleep until the next check is due. Stops at the deadline or when
/// `shutdown` flips to `true`.
pub(crate) async fn pause(
    interval: Duration,
    deadline: Option<Instant>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), Halt> {
    if *shutdown.borrow() {
        return Err(Halt::Cancelled);
    }
    let sleep_for = match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Err(Halt::TimedOut);
            }
            interval.min(deadline - now)
        }
        None => interval,
    };

    tokio::select! {
        _ = tokio::time::sleep(sleep_for) => Ok(()),
        changed = shutdown.changed() => match changed {
            Ok(()) if *shutdown.borrow() => Err(Halt::Cancelled),
            Ok(()) => Ok(()),
            // Sender gone: nobody can cancel any more, just wait.
            Err(_) => {
                tokio::time::sleep(sleep_for).await;
                Ok(())
            }
        },
    }
}

/// Run `check` until it yields a value.
///
/// The check runs at least once, even with a zero timeout. Errors from the
/// check end the wait immediately.
pub async fn poll_until<T, E, F, Fut>(
    what: &str,
    policy: PollPolicy,
    mut shutdown: watch::Receiver<bool>,
    mut check: F,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = policy.deadline(started);
    let mut attempts = 0u32;

    loop {
        if *shutdown.borrow() {
            return Err(PollError::Cancelled {
                what: what.to_string(),
            });
        }
        attempts += 1;
        if let Some(value) = check().await.map_err(PollError::Check)? {
            debug!(%what, attempts, "condition met");
            return Ok(value);
        }
        debug!(%what, attempts, "condition not met yet");

        match pause(policy.interval, deadline, &mut shutdown).await {
            Ok(()) => {}
            Err(Halt::TimedOut) => {
                return Err(PollError::TimedOut {
                    what: what.to_string(),
                    waited: started.elapsed(),
                });
            }
            Err(Halt::Cancelled) => {
                return Err(PollError::Cancelled {
                    what: what.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("probe broke")]
    struct ProbeError;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_condition_holds() {
        let (_tx, rx) = watch::channel(false);
        let calls = counter();
        let seen = calls.clone();
        let value = poll_until(
            "third attempt",
            PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(10)),
            rx,
            move || {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, ProbeError>((n == 3).then_some(n)) }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_condition_never_holds() {
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();
        let err = poll_until(
            "never",
            PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(5)),
            rx,
            || async { Ok::<Option<()>, ProbeError>(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { .. }));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_checks_once() {
        let (_tx, rx) = watch::channel(false);
        let value = poll_until(
            "immediate",
            PollPolicy::bounded(Duration::from_secs(1), Duration::ZERO),
            rx,
            || async { Ok::<_, ProbeError>(Some("ready")) },
        )
        .await
        .unwrap();
        assert_eq!(value, "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_stops_the_wait() {
        let (_tx, rx) = watch::channel(false);
        let err = poll_until(
            "broken",
            PollPolicy::new(Duration::from_secs(1), None),
            rx,
            || async { Err::<Option<()>, _>(ProbeError) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::Check(ProbeError)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_an_unbounded_wait() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = tx.send(true);
        });
        let err = poll_until(
            "forever",
            PollPolicy::new(Duration::from_secs(1), None),
            rx,
            || async { Ok::<Option<()>, ProbeError>(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_does_not_spin() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let calls = counter();
        let seen = calls.clone();
        let err = poll_until(
            "orphaned",
            PollPolicy::bounded(Duration::from_secs(1), Duration::from_secs(3)),
            rx,
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Option<()>, ProbeError>(None) }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { .. }));
        assert!(calls.load(Ordering::SeqCst) <= 4);
    }
}
