pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod rate_limit;
pub mod router;
pub mod secrets;

use crate::config::{ProxyConfig, StoreKind};
use crate::error::{ProxyError, Result};
use crate::metrics::MetricsService;
use crate::proxy::transport::HttpTransport;
use crate::proxy::{proxy_handler, ProxyState};
use crate::rate_limit::{MemoryStore, RateLimiter, RedisStore, SharedStore};
use crate::router::RouteTable;
use axum::Router as AxumRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Environment variable selecting JSON log output
pub const LOG_FORMAT_ENV: &str = "TINYRP_LOG_FORMAT";

/// Build the proxy application. Every path and method goes to the dispatcher.
pub fn build_app(state: ProxyState) -> AxumRouter {
    AxumRouter::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Build the shared store named by the configuration.
///
/// A Redis store that cannot be reached at startup is an error; the proxy
/// does not start without its limiter.
async fn build_store(config: &ProxyConfig) -> Result<Arc<dyn SharedStore>> {
    match config.store.kind {
        StoreKind::Redis => {
            let store = RedisStore::connect(&config.store).await?;
            Ok(Arc::new(store) as Arc<dyn SharedStore>)
        }
        StoreKind::Memory => {
            warn!("Using in-process rate limit store; quotas are not shared between instances");
            let store = Arc::new(MemoryStore::new());
            spawn_purge_task(store.clone(), config.rate_limit.to_rate_limit_config().window());
            Ok(store as Arc<dyn SharedStore>)
        }
    }
}

/// Drop expired buckets from an in-process store once per window
fn spawn_purge_task(store: Arc<MemoryStore>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            store.purge_expired();
        }
    });
}

/// Start the reverse proxy and serve until a shutdown signal arrives
pub async fn run_proxy(config: ProxyConfig) -> Result<()> {
    config.validate()?;

    info!("Starting tinyrp");

    let store = build_store(&config).await?;
    let limiter = RateLimiter::new(store, config.rate_limit.to_rate_limit_config())
        .with_timeout(config.store.timeout());
    limiter.ping().await?;
    info!(
        capacity = config.rate_limit.capacity,
        window_secs = config.rate_limit.window_secs,
        "Rate limiter ready"
    );

    let routes = RouteTable::new(&config.resources)?;
    for route in routes.routes() {
        info!(endpoint = %route.endpoint, backend = %route.authority(), "Registered route");
    }

    let transport = HttpTransport::new(config.backend_timeout())?;
    let state = ProxyState::new(routes, limiter, Arc::new(transport));
    let app = build_app(state);

    if let Some(port) = config.metrics_port {
        spawn_metrics_listener(&config.domain_name, port).await?;
    }

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Proxy listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ProxyError::Internal(format!("Server error: {}", e)))?;

    info!("Proxy stopped");

    Ok(())
}

async fn spawn_metrics_listener(host: &str, port: i64) -> Result<()> {
    let service = MetricsService::new()?;
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Metrics listening on {}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, service.router()).await {
            error!(error = %e, "Metrics listener failed");
        }
    });

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter. Set `TINYRP_LOG_FORMAT=json` for
/// structured output.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tinyrp=debug,tower_http=info".into());

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
