//! Request throttling using the governor crate.
//!
//! One process-wide token bucket caps total throughput. Credential
//! endpoints get their own, tighter buckets on top so a flood of login or
//! reset attempts is cut off long before the global limit is reached.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use pin_project_lite::pin_project;
use tower::{Layer, Service};

use crate::error::ApiError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Methods limited to 5 requests per second
const STRICT_METHODS: &[&str] = &[
    "/iam.v1.AuthService/Login",
    "/iam.v1.AuthService/ForgotPassword",
    "/iam.v1.AuthService/VerifyResetOTP",
    "/iam.v1.AuthService/ResetPassword",
    "/iam.v1.AuthService/UpdatePassword",
    "/iam.v1.AuthService/Enable2FA",
    "/iam.v1.AuthService/Verify2FA",
    "/iam.v1.AuthService/Disable2FA",
];

/// Methods limited to 20 requests per second
const TOKEN_METHODS: &[&str] = &["/iam.v1.AuthService/RefreshToken", "/iam.v1.AuthService/Logout"];

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// `rps` sustained with a burst of twice that
fn quota(rps: u32) -> Quota {
    Quota::per_second(non_zero(rps)).allow_burst(non_zero(rps.saturating_mul(2)))
}

/// Global plus per-method request throttle.
pub struct MethodThrottle {
    global: DirectLimiter,
    methods: HashMap<String, DirectLimiter>,
}

impl MethodThrottle {
    /// Throttle with only the global bucket.
    #[must_use]
    pub fn new(global_rps: u32, global_burst: u32) -> Self {
        let global = Quota::per_second(non_zero(global_rps)).allow_burst(non_zero(global_burst));
        Self {
            global: RateLimiter::direct(global),
            methods: HashMap::new(),
        }
    }

    /// Throttle with the global bucket and the credential-endpoint quotas.
    #[must_use]
    pub fn with_iam_defaults(global_rps: u32, global_burst: u32) -> Self {
        let throttle = Self::new(global_rps, global_burst);
        let throttle = STRICT_METHODS
            .iter()
            .fold(throttle, |t, m| t.with_method_quota(*m, quota(5)));
        TOKEN_METHODS
            .iter()
            .fold(throttle, |t, m| t.with_method_quota(*m, quota(20)))
    }

    /// Set a custom quota for a method.
    #[must_use]
    pub fn with_method_quota(mut self, method: impl Into<String>, quota: Quota) -> Self {
        self.methods.insert(method.into(), RateLimiter::direct(quota));
        self
    }

    /// True if `method` has its own bucket
    pub fn is_limited(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Check if a call to `method` is allowed.
    ///
    /// The per-method bucket is consulted first so a rejected credential
    /// call never spends global capacity.
    pub fn check(&self, method: &str) -> Result<(), ApiError> {
        if let Some(limiter) = self.methods.get(method) {
            limiter.check().map_err(|not_until| {
                tracing::warn!(method, "Method rate limit exceeded");
                retry_after(not_until.wait_time_from(DefaultClock::default().now()))
            })?;
        }

        self.global.check().map_err(|not_until| {
            tracing::warn!(method, "Global rate limit exceeded");
            retry_after(not_until.wait_time_from(DefaultClock::default().now()))
        })
    }
}

// Round up so clients never retry into the same empty bucket
fn retry_after(wait: Duration) -> ApiError {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    ApiError::rate_limited(secs.max(1))
}

/// Tower layer that throttles requests by path.
#[derive(Clone)]
pub struct ThrottleLayer {
    throttle: Arc<MethodThrottle>,
}

impl ThrottleLayer {
    #[must_use]
    pub fn new(throttle: MethodThrottle) -> Self {
        Self {
            throttle: Arc::new(throttle),
        }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            throttle: Arc::clone(&self.throttle),
        }
    }
}

/// The throttling service.
#[derive(Clone)]
pub struct ThrottleService<S> {
    inner: S,
    throttle: Arc<MethodThrottle>,
}

impl<S> Service<Request<Body>> for ThrottleService<S>
where
    S: Service<Request<Body>, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = ThrottleFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = match self.throttle.check(req.uri().path()) {
            Ok(()) => ThrottleState::Inner {
                future: self.inner.call(req),
            },
            Err(e) => ThrottleState::Rejected {
                response: e.into_response(),
            },
        };
        ThrottleFuture { state }
    }
}

pin_project! {
    /// Future for the throttling service.
    pub struct ThrottleFuture<F> {
        #[pin]
        state: ThrottleState<F>,
    }
}

pin_project! {
    #[project = ThrottleStateProj]
    #[project_replace = ThrottleStateReplace]
    enum ThrottleState<F> {
        Inner {
            #[pin]
            future: F,
        },
        Rejected {
            response: Response,
        },
        Done,
    }
}

impl<F, E> Future for ThrottleFuture<F>
where
    F: Future<Output = Result<Response, E>>,
{
    type Output = Result<Response, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.project().state;

        match state.as_mut().project() {
            ThrottleStateProj::Inner { future } => return future.poll(cx),
            ThrottleStateProj::Done => panic!("polled after completion"),
            ThrottleStateProj::Rejected { .. } => {}
        }

        match state.project_replace(ThrottleState::Done) {
            ThrottleStateReplace::Rejected { response } => Poll::Ready(Ok(response)),
            _ => unreachable!("only a rejected state reaches here"),
        }
    }
}
