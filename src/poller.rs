//! The Cluster State Poller.
//!
//! Repeatedly observes some cluster state until a predicate holds or the
//! deadline passes. Transient query failures are absorbed until the same
//! deadline; permanent ones end the wait immediately.

use std::{cmp, fmt::Debug, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::internal_events::{PollRejected, PollSatisfied, PollTimedOut, PollTransientError};

/// Why a single observation failed.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(ProbeSnafu)))]
pub enum ProbeError {
    /// The resource isn't visible yet, or the API is momentarily unreachable.
    #[snafu(display("transient query error: {}", source))]
    Transient { source: crate::Error },

    /// The query can never succeed, e.g. a malformed selector.
    #[snafu(display("permanent query error: {}", source))]
    Permanent { source: crate::Error },
}

impl ProbeError {
    pub fn transient(source: impl Into<crate::Error>) -> Self {
        Self::Transient {
            source: source.into(),
        }
    }

    pub fn permanent(source: impl Into<crate::Error>) -> Self {
        Self::Permanent {
            source: source.into(),
        }
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Why a wait ended without the predicate holding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "condition not met after {} ({} attempts), last observed: {}",
        humantime::format_duration(*waited),
        attempts,
        last_observed.as_deref().unwrap_or("nothing")
    ))]
    Timeout {
        waited: Duration,
        attempts: usize,
        last_observed: Option<String>,
    },

    #[snafu(display("query failed permanently: {}", source))]
    Permanent { source: crate::Error },
}

/// How the delay between two observations evolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Always wait the poll interval.
    #[default]
    Fixed,
    /// Multiply the delay by `factor` after every observation, up to `max`.
    Exponential {
        factor: u32,
        #[serde(with = "duration_serde")]
        max: Duration,
    },
}

impl Backoff {
    /// The delays to wait after each observation, starting from `interval`.
    pub fn delays(self, interval: Duration) -> Delays {
        Delays {
            backoff: self,
            next: interval,
        }
    }
}

/// An endless sequence of poll delays.
#[derive(Debug, Clone)]
pub struct Delays {
    backoff: Backoff,
    next: Duration,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        if let Backoff::Exponential { factor, max } = self.backoff {
            self.next = cmp::min(self.next.saturating_mul(factor), max);
        }
        Some(current)
    }
}

/// The bounds of a single wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// The maximum wait, measured from the call, grace delay included.
    pub timeout: Duration,
    /// The delay between observations.
    pub interval: Duration,
    /// Grace delay before the first observation.
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            initial_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    pub const fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Roughly 30 years, the same horizon tokio uses for unbounded sleeps.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `from + wait`, clamped to [`FAR_FUTURE`] when that overflows `Instant`.
fn instant_after(from: Instant, wait: Duration) -> Instant {
    from.checked_add(wait).unwrap_or_else(|| from + FAR_FUTURE)
}

/// Observe state with `query` until `predicate` holds.
///
/// Returns the first observed state satisfying the predicate. Never waits
/// longer than `policy.timeout` plus one poll interval: a query still in
/// flight at the deadline is abandoned.
pub async fn await_condition<S, Q, Fut, P>(
    what: &str,
    policy: &PollPolicy,
    mut query: Q,
    mut predicate: P,
) -> Result<S, Error>
where
    S: Debug,
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<S, ProbeError>>,
    P: FnMut(&S) -> bool,
{
    let started = Instant::now();
    let deadline = instant_after(started, policy.timeout);
    let mut delays = policy.backoff.delays(policy.interval);
    let mut attempts = 0;
    let mut last_observed = None;

    sleep_until(cmp::min(instant_after(started, policy.initial_delay), deadline)).await;

    loop {
        attempts += 1;
        match timeout_at(deadline, query()).await {
            Ok(Ok(state)) => {
                if predicate(&state) {
                    emit!(PollSatisfied {
                        what,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                    return Ok(state);
                }
                trace!(message = "Condition not met yet.", what, ?state, attempts);
                last_observed = Some(format!("{:?}", state));
            }
            Ok(Err(ProbeError::Transient { source })) => {
                emit!(PollTransientError {
                    what,
                    error: &source,
                    attempts,
                });
                last_observed = Some(format!("error: {}", source));
            }
            Ok(Err(ProbeError::Permanent { source })) => {
                emit!(PollRejected {
                    what,
                    error: &source,
                });
                return Err(Error::Permanent { source });
            }
            Err(_) => {
                debug!(message = "Query still pending at the deadline.", what, attempts);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let waited = now - started;
            emit!(PollTimedOut {
                what,
                waited,
                attempts,
            });
            return Err(Error::Timeout {
                waited,
                attempts,
                last_observed,
            });
        }

        let delay = delays.next().unwrap_or(policy.interval);
        sleep_until(cmp::min(instant_after(now, delay), deadline)).await;
    }
}

/// Serde adapter reading and writing durations in `humantime` notation.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);
    const INTERVAL: Duration = Duration::from_secs(5);

    fn policy() -> PollPolicy {
        PollPolicy::new(TIMEOUT, INTERVAL)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_state_satisfying_predicate() {
        let calls = counter();
        let started = Instant::now();
        let state = await_condition(
            "counter",
            &policy(),
            || {
                let calls = Arc::clone(&calls);
                async move { Ok::<_, ProbeError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |n| *n == 3,
        )
        .await
        .unwrap();

        assert_eq!(state, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_initial_delay_before_first_probe() {
        let started = Instant::now();
        let policy = policy().with_initial_delay(Duration::from_secs(2));
        await_condition("ready", &policy, || async { Ok::<_, ProbeError>(()) }, |_| true)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_silently() {
        let calls = counter();
        let state = await_condition(
            "pod",
            &policy(),
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 4 {
                        Err(ProbeError::transient("pods \"runner\" not found"))
                    } else {
                        Ok("Running")
                    }
                }
            },
            |phase| *phase == "Running",
        )
        .await
        .unwrap();

        assert_eq!(state, "Running");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_fails_immediately() {
        let calls = counter();
        let started = Instant::now();
        let error = await_condition(
            "pod",
            &policy(),
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ProbeError::permanent("unable to parse requirement"))
                }
            },
            |_| true,
        )
        .await
        .unwrap_err();

        assert!(matches!(error, Error::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn never_true_times_out_within_one_interval_of_deadline() {
        let started = Instant::now();
        let error = await_condition(
            "phase",
            &policy(),
            || async { Ok::<_, ProbeError>("Pending") },
            |phase| *phase == "Running",
        )
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed <= TIMEOUT + INTERVAL);
        match error {
            Error::Timeout {
                attempts,
                last_observed,
                ..
            } => {
                assert_eq!(attempts, 13);
                assert_eq!(last_observed.as_deref(), Some("\"Pending\""));
            }
            error => panic!("unexpected error: {:?}", error),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_query_is_abandoned_at_the_deadline() {
        let started = Instant::now();
        let error = await_condition(
            "hang",
            &policy(),
            || future::pending::<Result<(), ProbeError>>(),
            |_| true,
        )
        .await
        .unwrap_err();

        assert!(matches!(error, Error::Timeout { attempts: 1, .. }));
        assert_eq!(started.elapsed(), TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_transient_error() {
        let error = await_condition(
            "result",
            &PollPolicy::new(Duration::from_secs(10), Duration::from_secs(3)),
            || async { Err::<(), _>(ProbeError::transient("connection refused")) },
            |_| true,
        )
        .await
        .unwrap_err();

        match error {
            Error::Timeout { last_observed, .. } => assert_eq!(
                last_observed.as_deref(),
                Some("error: connection refused")
            ),
            error => panic!("unexpected error: {:?}", error),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_waits_normally() {
        let calls = counter();
        let policy = PollPolicy::new(Duration::MAX, INTERVAL).with_backoff(Backoff::Exponential {
                factor: 2,
                max: Duration::MAX,
            });
        let started = Instant::now();
        let state = await_condition(
            "counter",
            &policy,
            || {
                let calls = Arc::clone(&calls);
                async move { Ok::<_, ProbeError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |n| *n == 2,
        )
        .await
        .unwrap();

        assert_eq!(state, 2);
        assert_eq!(started.elapsed(), INTERVAL);
    }

    #[test]
    fn instant_after_clamps_overflow() {
        let now = Instant::now();
        assert_eq!(instant_after(now, INTERVAL), now + INTERVAL);
        assert_eq!(instant_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn fixed_delays_never_change() {
        let delays: Vec<_> = Backoff::Fixed.delays(INTERVAL).take(3).collect();
        assert_eq!(delays, vec![INTERVAL; 3]);
    }

    #[test]
    fn exponential_delays_are_capped() {
        let backoff = Backoff::Exponential {
            factor: 2,
            max: Duration::from_secs(7),
        };
        let delays: Vec<_> = backoff.delays(Duration::from_secs(1)).take(5).collect();
        assert_eq!(
            delays,
            vec![1, 2, 4, 7, 7]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_stretches_the_wait() {
        let calls = counter();
        let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(1)).with_backoff(
            Backoff::Exponential {
                factor: 2,
                max: Duration::from_secs(60),
            },
        );
        let _ = await_condition(
            "backoff",
            &policy,
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProbeError>(())
                }
            },
            |_| false,
        )
        .await;
        // Probes at 0, 1, 3, 7, 15 and the clamped 30.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }
}
