//! Warden Auth API
//!
//! Authentication microservice. Every API endpoint is a JSON `POST` on the
//! fully-qualified RPC method name.
//!
//! ## Auth Endpoints
//!
//! - `POST /iam.v1.AuthService/Login` - Username/password (+ TOTP) login
//! - `POST /iam.v1.AuthService/Logout` - Revoke a refresh token's session
//! - `POST /iam.v1.AuthService/RefreshToken` - Rotate a refresh token
//! - `POST /iam.v1.AuthService/ForgotPassword` - Email a reset OTP
//! - `POST /iam.v1.AuthService/VerifyResetOTP` - Trade an OTP for a reset token
//! - `POST /iam.v1.AuthService/ResetPassword` - Set a password with a reset token
//! - `POST /iam.v1.AuthService/UpdatePassword` - Change the caller's password
//! - `POST /iam.v1.AuthService/Enable2FA` - Start TOTP enrollment
//! - `POST /iam.v1.AuthService/Verify2FA` - Confirm TOTP enrollment
//! - `POST /iam.v1.AuthService/Disable2FA` - Remove TOTP
//! - `POST /iam.v1.AuthService/GetCurrentUser` - Caller's profile
//!
//! ## Session Endpoints
//!
//! - `POST /iam.v1.SessionService/GetCurrentSession`
//! - `POST /iam.v1.SessionService/RevokeSession`
//! - `POST /iam.v1.SessionService/ListActiveSessions`
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use warden_auth_core::observability::{
    AUTH_OPERATIONS_TOTAL, BREAKER_TRANSITIONS_TOTAL, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL,
    GATE_DECISIONS_TOTAL,
};
use warden_auth_core::{
    AuthCache, AuthService, BreakerConfig, CacheBackend, CircuitBreaker, EmailSender, GuardedCache,
    LogMailer, MemoryCache, MetricsObserver, NoopMetrics, PrometheusMetrics, RedisCache,
    SharedMetrics, SmtpMailer,
};
use warden_axum::{GateLayer, MethodThrottle, ThrottleLayer};
use warden_db::{create_pool_with_options, PoolOptions, Repositories};

use crate::config::Config;
use crate::handlers::{health, ready};
use crate::state::{AppState, AuthServiceImpl};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;
    tracing::info!("Starting Warden Auth API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        redis = config.redis_url.is_some(),
        smtp = config.smtp.is_some(),
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };
    let metrics: SharedMetrics = if config.metrics_enabled {
        Arc::new(PrometheusMetrics)
    } else {
        Arc::new(NoopMetrics)
    };

    // Create database pool
    let pool_options = PoolOptions {
        max_connections: config.database_max_connections,
        ..PoolOptions::default()
    };
    let pool = create_pool_with_options(&config.database_url, &pool_options).await?;
    tracing::info!("Database pool created");

    let cache = build_cache(&config, Arc::clone(&metrics)).await?;
    let mailer = build_mailer(&config)?;

    // Create auth service
    let repos = Repositories::new(pool.clone());
    let auth = AuthService::new(
        config.auth.clone(),
        Arc::new(repos.users),
        Arc::new(repos.sessions),
        Arc::new(repos.audit),
        cache,
    )?
    .with_mailer(mailer)
    .with_metrics(metrics);

    let cleanup_interval = config.session_cleanup_interval;
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));

    // Create application state
    let state = AppState::new(auth, pool, config);
    tokio::spawn(run_session_cleanup(Arc::clone(&state.auth), cleanup_interval));

    // Build HTTP router
    let app = build_router(state, metrics_handle);

    if let Err(e) = run_http_server(app, http_addr).await {
        tracing::error!(error = ?e, "HTTP server error");
        return Err(e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("auth_api=debug,warden_auth_core=info"),
    };
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()?;
    Ok(())
}

/// Redis behind a circuit breaker, or the in-memory cache
async fn build_cache(config: &Config, metrics: SharedMetrics) -> anyhow::Result<AuthCache> {
    let backend: Arc<dyn CacheBackend> = match &config.redis_url {
        Some(url) => {
            let breaker = CircuitBreaker::new(BreakerConfig::new("redis"))
                .with_observer(Arc::new(MetricsObserver::new(Arc::clone(&metrics))));
            let redis = RedisCache::connect(url).await?;
            tracing::info!("Redis cache connected");
            Arc::new(GuardedCache::new(redis, Arc::new(breaker)))
        }
        None => {
            tracing::warn!("REDIS_URL not set; lockouts and the blacklist are per process");
            Arc::new(MemoryCache::new(config.auth.cache.max_capacity))
        }
    };

    Ok(AuthCache::new(backend, config.auth.cache.key_prefix.clone(), metrics))
}

fn build_mailer(config: &Config) -> anyhow::Result<Arc<dyn EmailSender>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp)?)),
        None => {
            tracing::warn!("SMTP_HOST not set; OTP emails are logged instead of sent");
            Ok(Arc::new(LogMailer))
        }
    }
}

async fn run_session_cleanup(auth: Arc<AuthServiceImpl>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match auth.cleanup_expired_sessions().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Expired sessions cleaned up"),
            Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
        }
    }
}

fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();
    let throttle = MethodThrottle::with_iam_defaults(state.config.rate_limit_rps, state.config.rate_limit_burst);

    // RPC routes; the gate runs after the throttle
    let api = Router::new()
        .route("/iam.v1.AuthService/Login", post(handlers::login))
        .route("/iam.v1.AuthService/Logout", post(handlers::logout))
        .route("/iam.v1.AuthService/RefreshToken", post(handlers::refresh_token))
        .route("/iam.v1.AuthService/ForgotPassword", post(handlers::forgot_password))
        .route("/iam.v1.AuthService/VerifyResetOTP", post(handlers::verify_reset_otp))
        .route("/iam.v1.AuthService/ResetPassword", post(handlers::reset_password))
        .route("/iam.v1.AuthService/UpdatePassword", post(handlers::update_password))
        .route("/iam.v1.AuthService/Enable2FA", post(handlers::enable_2fa))
        .route("/iam.v1.AuthService/Verify2FA", post(handlers::verify_2fa))
        .route("/iam.v1.AuthService/Disable2FA", post(handlers::disable_2fa))
        .route("/iam.v1.AuthService/GetCurrentUser", post(handlers::get_current_user))
        .route("/iam.v1.SessionService/GetCurrentSession", post(handlers::get_current_session))
        .route("/iam.v1.SessionService/RevokeSession", post(handlers::revoke_session))
        .route("/iam.v1.SessionService/ListActiveSessions", post(handlers::list_active_sessions))
        .layer(GateLayer::new(state.gate()))
        .layer(ThrottleLayer::new(throttle));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .merge(api)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> =
        app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(AUTH_OPERATIONS_TOTAL, "Auth operations by operation and status");
    metrics::describe_counter!(CACHE_HITS_TOTAL, "Cache hits by cache");
    metrics::describe_counter!(CACHE_MISSES_TOTAL, "Cache misses by cache");
    metrics::describe_counter!(GATE_DECISIONS_TOTAL, "Authorization gate decisions by method");
    metrics::describe_counter!(BREAKER_TRANSITIONS_TOTAL, "Circuit breaker state transitions");

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
