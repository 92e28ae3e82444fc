//! Tower middleware layer for the authorization gate.
//!
//! [`GateLayer`] runs [`AuthorizationGate::check`] on every request, using
//! the request path as the method name and the `Authorization` header as the
//! credential. Granted principals are attached to the request extensions;
//! rejected requests never reach the inner service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use warden_auth_core::{Access, AuthError, AuthorizationGate};

use crate::error::ApiError;
use crate::extractors::PrincipalExt;

/// Tower layer that puts the authorization gate in front of a service.
#[derive(Clone)]
pub struct GateLayer {
    gate: Arc<AuthorizationGate>,
}

impl GateLayer {
    #[must_use]
    pub fn new(gate: AuthorizationGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

/// The gate service.
#[derive(Clone)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<AuthorizationGate>,
}

impl<S> Service<Request<Body>> for GateService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = GateFuture<S>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let method = req.uri().path().to_owned();
        let authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // The clone is not ready; keep the one that was polled
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        GateFuture {
            state: State::Checking {
                check: Box::pin(async move { gate.check(&method, authorization.as_deref()).await }),
                inner,
                req,
            },
        }
    }
}

pin_project! {
    /// Future for the gate service.
    pub struct GateFuture<S>
    where
        S: Service<Request<Body>>,
    {
        #[pin]
        state: State<S>,
    }
}

pin_project! {
    #[project = StateProj]
    #[project_replace = StateReplace]
    enum State<S>
    where
        S: Service<Request<Body>>,
    {
        Checking {
            check: BoxFuture<'static, Result<Access, AuthError>>,
            inner: S,
            req: Request<Body>,
        },
        Calling {
            #[pin]
            future: S::Future,
        },
        Done,
    }
}

impl<S> Future for GateFuture<S>
where
    S: Service<Request<Body>, Response = Response>,
{
    type Output = Result<Response, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.project().state;

        loop {
            let outcome = match state.as_mut().project() {
                StateProj::Checking { check, .. } => ready!(check.as_mut().poll(cx)),
                StateProj::Calling { future } => return future.poll(cx),
                StateProj::Done => panic!("polled after completion"),
            };

            let StateReplace::Checking { mut inner, mut req, .. } = state.as_mut().project_replace(State::Done)
            else {
                unreachable!("outcome is only produced while checking");
            };

            match outcome {
                Ok(access) => {
                    if let Access::Granted(principal) = access {
                        req.extensions_mut().insert(PrincipalExt(principal));
                    }
                    let future = inner.call(req);
                    state.set(State::Calling { future });
                }
                Err(e) => return Poll::Ready(Ok(ApiError::from(e).into_response())),
            }
        }
    }
}
