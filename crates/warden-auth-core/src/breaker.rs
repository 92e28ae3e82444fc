//! Circuit breaker for flaky dependencies
//!
//! Closed → Open after `max_failures` consecutive failures. Open rejects
//! calls until `timeout` has passed, then HalfOpen admits up to
//! `max_half_open_requests` probes: enough successes close the circuit,
//! any failure reopens it.
//!
//! A probe whose future is dropped before completing counts as a failed
//! probe, so cancellation cannot wedge the circuit in HalfOpen.
//!
//! State changes are reported to a [`BreakerObserver`] on the calling task
//! once the internal lock has been released.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::SharedMetrics;
use crate::AuthError;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives state transitions
pub trait BreakerObserver: Send + Sync {
    fn on_state_change(&self, name: &str, from: BreakerState, to: BreakerState);
}

/// Logs transitions and counts them through the metrics port
pub struct MetricsObserver {
    metrics: SharedMetrics,
}

impl MetricsObserver {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl BreakerObserver for MetricsObserver {
    fn on_state_change(&self, name: &str, from: BreakerState, to: BreakerState) {
        match to {
            BreakerState::Open => tracing::warn!(breaker = name, %from, %to, "Circuit opened"),
            _ => tracing::info!(breaker = name, %from, %to, "Circuit state changed"),
        }
        self.metrics.record_breaker_transition(name, from, to);
    }
}

/// Breaker settings
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub name: String,
    pub max_failures: u32,
    /// How long the circuit stays open before probing
    pub timeout: Duration,
    pub max_half_open_requests: u32,
}

impl BreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_failures: 5,
            timeout: Duration::from_secs(30),
            max_half_open_requests: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
}

type Transition = Option<(BreakerState, BreakerState)>;

impl Inner {
    fn transition(&mut self, to: BreakerState) -> Transition {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        match to {
            BreakerState::Closed => {
                self.failures = 0;
                self.opened_at = None;
            }
            BreakerState::Open => self.opened_at = Some(Instant::now()),
            BreakerState::HalfOpen => {}
        }
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        Some((from, to))
    }
}

/// Circuit breaker
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    observer: Option<Arc<dyn BreakerObserver>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                half_open_successes: 0,
                half_open_in_flight: 0,
                opened_at: None,
            }),
            observer: None,
        }
    }

    /// Attach a transition observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Consecutive failures counted while closed
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Run `f` under the breaker. Rejected calls never run `f` and
    /// surface as [`AuthError::Cache`].
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let Some(probe) = self.try_acquire() else {
            return Err(AuthError::Cache(format!(
                "circuit breaker '{}' is open",
                self.config.name
            )));
        };

        let mut permit = Permit {
            breaker: self,
            probe,
            settled: false,
        };
        let result = f().await;
        permit.settled = true;
        self.record(result.is_ok());
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Some(true)` admits a half-open probe, `Some(false)` a normal call
    fn try_acquire(&self) -> Option<bool> {
        let (admitted, transition) = {
            let mut inner = self.lock();
            match inner.state {
                BreakerState::Closed => (Some(false), None),
                BreakerState::Open => {
                    let elapsed = inner.opened_at.map_or(true, |t| t.elapsed() >= self.config.timeout);
                    if elapsed {
                        let transition = inner.transition(BreakerState::HalfOpen);
                        inner.half_open_in_flight = 1;
                        (Some(true), transition)
                    } else {
                        (None, None)
                    }
                }
                BreakerState::HalfOpen => {
                    if inner.half_open_in_flight >= self.config.max_half_open_requests {
                        (None, None)
                    } else {
                        inner.half_open_in_flight += 1;
                        (Some(true), None)
                    }
                }
            }
        };
        self.notify(transition);
        admitted
    }

    /// A probe was dropped before it finished. Its slot is never released
    /// by `record`, so the circuit reopens and the timeout admits a new one.
    fn abandon_probe(&self) {
        let transition = {
            let mut inner = self.lock();
            match inner.state {
                BreakerState::HalfOpen => inner.transition(BreakerState::Open),
                _ => None,
            }
        };
        if transition.is_some() {
            tracing::warn!(breaker = %self.config.name, "Half-open probe cancelled");
        }
        self.notify(transition);
    }

    fn record(&self, success: bool) {
        let transition = {
            let mut inner = self.lock();
            match (inner.state, success) {
                (BreakerState::Closed, true) => {
                    inner.failures = 0;
                    None
                }
                (BreakerState::Closed, false) => {
                    inner.failures += 1;
                    if inner.failures >= self.config.max_failures {
                        inner.transition(BreakerState::Open)
                    } else {
                        None
                    }
                }
                (BreakerState::HalfOpen, true) => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.max_half_open_requests {
                        inner.transition(BreakerState::Closed)
                    } else {
                        None
                    }
                }
                (BreakerState::HalfOpen, false) => inner.transition(BreakerState::Open),
                (BreakerState::Open, _) => None,
            }
        };
        self.notify(transition);
    }

    fn notify(&self, transition: Transition) {
        if let (Some((from, to)), Some(observer)) = (transition, &self.observer) {
            observer.on_state_change(&self.config.name, from, to);
        }
    }
}

/// Held across the guarded future; settles a cancelled probe on drop
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.abandon_probe();
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(BreakerState, BreakerState)>>);

    impl BreakerObserver for Recorder {
        fn on_state_change(&self, _: &str, from: BreakerState, to: BreakerState) {
            self.0.lock().unwrap().push((from, to));
        }
    }

    fn breaker(recorder: Arc<Recorder>) -> CircuitBreaker {
        let mut config = BreakerConfig::new("test");
        config.max_failures = 3;
        config.timeout = Duration::from_secs(30);
        CircuitBreaker::new(config).with_observer(recorder)
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), AuthError> {
        cb.call(|| async { Err::<(), _>(AuthError::Cache("down".into())) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), AuthError> {
        cb.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_max_failures() {
        let recorder = Arc::new(Recorder::default());
        let cb = breaker(recorder.clone());

        for _ in 0..3 {
            assert!(fail(&cb).await.is_err());
        }
        assert_eq!(cb.state(), BreakerState::Open);

        let mut ran = false;
        let result = cb
            .call(|| async {
                ran = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AuthError::Cache(_))));
        assert!(!ran);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[(BreakerState::Closed, BreakerState::Open)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(Arc::new(Recorder::default()));
        fail(&cb).await.ok();
        fail(&cb).await.ok();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.failures(), 0);
        fail(&cb).await.ok();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes() {
        let recorder = Arc::new(Recorder::default());
        let cb = breaker(recorder.clone());
        for _ in 0..3 {
            fail(&cb).await.ok();
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_reopens_then_readmits() {
        let recorder = Arc::new(Recorder::default());
        let cb = breaker(recorder.clone());
        for _ in 0..3 {
            fail(&cb).await.ok();
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        // Probe hangs and the caller gives up on it
        let hung = cb.call(|| std::future::pending::<Result<(), AuthError>>());
        assert!(tokio::time::timeout(Duration::from_millis(50), hung).await.is_err());
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(matches!(succeed(&cb).await, Err(AuthError::Cache(_))));

        tokio::time::advance(Duration::from_secs(31)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_closed_call_changes_nothing() {
        let cb = breaker(Arc::new(Recorder::default()));
        let hung = cb.call(|| std::future::pending::<Result<(), AuthError>>());
        assert!(tokio::time::timeout(Duration::from_millis(50), hung).await.is_err());
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(Arc::new(Recorder::default()));
        for _ in 0..3 {
            fail(&cb).await.ok();
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&cb).await.ok();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(matches!(succeed(&cb).await, Err(AuthError::Cache(_))));
    }
}
