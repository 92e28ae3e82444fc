//! Metrics port for the auth core.
//!
//! Components take an `Arc<dyn AuthMetrics>` at construction instead of
//! writing to a global recorder directly. [`PrometheusMetrics`] forwards to
//! the `metrics` facade; [`NoopMetrics`] discards everything.
//!
//! # Metrics
//!
//! - `iam_auth_operations_total` - Counter of orchestrator operations by operation, status
//! - `cache_hits_total` / `cache_misses_total` - Ephemeral cache lookups by cache
//! - `iam_gate_decisions_total` - Authorization gate decisions by method, decision
//! - `circuit_breaker_transitions_total` - Breaker state changes by name, from, to

use std::sync::Arc;

use metrics::counter;

use crate::breaker::BreakerState;

/// Metric name for orchestrator operations.
pub const AUTH_OPERATIONS_TOTAL: &str = "iam_auth_operations_total";

/// Metric name for cache hits.
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";

/// Metric name for cache misses.
pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";

/// Metric name for gate decisions.
pub const GATE_DECISIONS_TOTAL: &str = "iam_gate_decisions_total";

/// Metric name for breaker transitions.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "circuit_breaker_transitions_total";

/// Orchestrator operation names for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Logout,
    RefreshToken,
    ForgotPassword,
    VerifyResetOtp,
    ResetPassword,
    UpdatePassword,
    Enable2fa,
    Verify2fa,
    Disable2fa,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::RefreshToken => "refresh_token",
            Self::ForgotPassword => "forgot_password",
            Self::VerifyResetOtp => "verify_reset_otp",
            Self::ResetPassword => "reset_password",
            Self::UpdatePassword => "update_password",
            Self::Enable2fa => "enable_2fa",
            Self::Verify2fa => "verify_2fa",
            Self::Disable2fa => "disable_2fa",
        }
    }
}

/// Operation result for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Authorization gate decision for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Public method, no credentials checked
    Public,
    Allowed,
    /// Missing or invalid credentials
    Unauthenticated,
    Denied,
}

impl GateDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Allowed => "allowed",
            Self::Unauthenticated => "unauthenticated",
            Self::Denied => "denied",
        }
    }
}

/// Recorder injected into auth components
pub trait AuthMetrics: Send + Sync {
    fn record_operation(&self, operation: Operation, outcome: Outcome);
    fn record_cache_lookup(&self, cache: &'static str, hit: bool);
    fn record_gate_decision(&self, method: &str, decision: GateDecision);
    fn record_breaker_transition(&self, name: &str, from: BreakerState, to: BreakerState);
}

/// Shared metrics handle
pub type SharedMetrics = Arc<dyn AuthMetrics>;

/// Forwards to the process-wide `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl AuthMetrics for PrometheusMetrics {
    fn record_operation(&self, operation: Operation, outcome: Outcome) {
        counter!(
            AUTH_OPERATIONS_TOTAL,
            "operation" => operation.as_str(),
            "status" => outcome.as_str()
        )
        .increment(1);
    }

    fn record_cache_lookup(&self, cache: &'static str, hit: bool) {
        let name = if hit { CACHE_HITS_TOTAL } else { CACHE_MISSES_TOTAL };
        counter!(name, "cache" => cache).increment(1);
    }

    fn record_gate_decision(&self, method: &str, decision: GateDecision) {
        counter!(
            GATE_DECISIONS_TOTAL,
            "method" => method.to_string(),
            "decision" => decision.as_str()
        )
        .increment(1);
    }

    fn record_breaker_transition(&self, name: &str, from: BreakerState, to: BreakerState) {
        counter!(
            BREAKER_TRANSITIONS_TOTAL,
            "name" => name.to_string(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }
}

/// Discards every measurement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl AuthMetrics for NoopMetrics {
    fn record_operation(&self, _: Operation, _: Outcome) {}
    fn record_cache_lookup(&self, _: &'static str, _: bool) {}
    fn record_gate_decision(&self, _: &str, _: GateDecision) {}
    fn record_breaker_transition(&self, _: &str, _: BreakerState, _: BreakerState) {}
}
