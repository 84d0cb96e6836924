//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: `POST /generate`, `GET /health`, static fallback
//! - Wire up middleware (request ID, tracing, request log, body limit,
//!   compression, CORS)
//! - Own the per-process state: upstream client, rate limiter, sessions
//! - Run background purges and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::conversation::ConversationStore;
use crate::http::handlers::{generate_handler, health_handler};
use crate::http::request::{log_request, request_id};
use crate::lifecycle::Shutdown;
use crate::security::RateLimiter;
use crate::upstream::client::ClientBuildError;
use crate::upstream::{Upstream, UpstreamClient};

/// Identity of the process serving requests.
#[derive(Debug, Clone, Copy)]
pub struct WorkerInfo {
    /// Pool slot, `None` in single-process mode.
    pub id: Option<usize>,
    pub pid: u32,
}

impl WorkerInfo {
    pub fn current(id: Option<usize>) -> Self {
        Self {
            id,
            pid: std::process::id(),
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn Upstream>,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<Arc<RateLimiter>>,
    pub trusted_proxy_hops: usize,
    /// `None` when conversation mode is disabled.
    pub conversations: Option<Arc<ConversationStore>>,
    pub worker: WorkerInfo,
}

/// HTTP server for one gateway process.
pub struct GatewayServer {
    router: Router,
    state: AppState,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    /// Create a server talking to the configured upstream provider.
    pub fn new(config: GatewayConfig, worker: WorkerInfo) -> Result<Self, ClientBuildError> {
        let client = UpstreamClient::new(&config.upstream)?;
        tracing::info!(endpoint = %client.endpoint(), "Upstream client ready");
        Ok(Self::with_upstream(config, worker, Arc::new(client)))
    }

    /// Create a server with an explicit upstream implementation.
    pub fn with_upstream(
        config: GatewayConfig,
        worker: WorkerInfo,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));
        let conversations = config
            .conversation
            .enabled
            .then(|| Arc::new(ConversationStore::new(&config.conversation)));

        let state = AppState {
            upstream,
            limiter,
            trusted_proxy_hops: config.rate_limit.trusted_proxy_hops,
            conversations,
            worker,
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config: Arc::new(config),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let worker = state.worker;
        let max_body = config.listener.max_body_bytes;

        let mut router = Router::new()
            .route("/generate", post(generate_handler))
            .route("/health", get(health_handler))
            .fallback_service(ServeDir::new(&config.listener.static_dir))
            .with_state(state)
            .layer(middleware::from_fn_with_state(max_body, log_request))
            .layer(DefaultBodyLimit::max(max_body));

        if config.listener.compression {
            router = router.layer(CompressionLayer::new());
        }
        if config.listener.cors_allow_all {
            router = router.layer(CorsLayer::permissive());
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(
                    move |request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id(request),
                            worker = ?worker.id,
                            pid = worker.pid,
                        )
                    },
                ))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            worker = ?self.state.worker.id,
            pid = self.state.worker.pid,
            "Server running"
        );

        self.spawn_purges(&shutdown);

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let signal = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.wait().await })
            .await?;

        tracing::info!(pid = self.state.worker.pid, "Server stopped");
        Ok(())
    }

    fn spawn_purges(&self, shutdown: &Shutdown) {
        if let Some(limiter) = self.state.limiter.clone() {
            let every = Duration::from_secs(self.config.rate_limit.purge_interval_secs);
            spawn_periodic(every, shutdown.clone(), move || {
                let purged = limiter.purge_expired();
                if purged > 0 {
                    tracing::debug!(
                        purged,
                        tracked = limiter.tracked(),
                        "Purged idle rate-limit windows"
                    );
                }
            });
        }
        if let Some(store) = self.state.conversations.clone() {
            let every = Duration::from_secs(self.config.conversation.idle_ttl_secs.clamp(1, 300));
            spawn_periodic(every, shutdown.clone(), move || {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged idle sessions");
                }
            });
        }
    }
}

fn spawn_periodic<F>(every: Duration, shutdown: Shutdown, mut task: F)
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => task(),
                _ = shutdown.wait() => break,
            }
        }
    });
}
