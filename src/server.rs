use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::KeyStore;
use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::SummarizerError;
use crate::evaluation::{EvaluatorSettings, QualityEvaluator};
use crate::handlers::{healthz, metrics, summarize, AppState};
use crate::health::HealthAggregator;
use crate::middleware::{logging_middleware, request_id_middleware};
use crate::pipeline::{Orchestrator, PipelineTimeouts};
use crate::provider::{GeminiProvider, GenerationProvider};
use crate::rate_limiter::RateLimiter;
use crate::store::{CounterStore, MemoryStore, RedisStore};

/// Builds the router around an already wired state.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/summarize", post(summarize))
        .route("/v1/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(middleware::from_fn(logging_middleware)),
        )
}

/// Wires the pipeline and health checks from configuration.
///
/// Nothing here touches the network: Redis and the embedding backend are
/// connected on first use.
pub fn build_state(config: &Config) -> Result<AppState, SummarizerError> {
    let store: Arc<dyn CounterStore> = if config.uses_redis() {
        let store = RedisStore::new(&config.redis_url, config.store_timeout())
            .map_err(|e| SummarizerError::Configuration(e.to_string()))?;
        Arc::new(store)
    } else {
        tracing::warn!("REDIS_URL is empty, using the in-process store (single instance only)");
        Arc::new(MemoryStore::new())
    };

    let provider: Arc<dyn GenerationProvider> = Arc::new(
        GeminiProvider::new(
            &config.gemini_api_key,
            &config.gemini_model,
            &config.gemini_base_url,
            config.provider_timeout(),
        )
        .map_err(|e| SummarizerError::Configuration(e.to_string()))?,
    );

    let evaluator = config.enable_auto_evaluation.then(|| {
        Arc::new(QualityEvaluator::new(EvaluatorSettings {
            model: config.evaluation_model.clone(),
            embedding_url: config.evaluation_embedding_url.trim().to_string(),
            api_key: config.evaluation_api_key.clone(),
            timeout: config.evaluation_timeout(),
        }))
    });

    let cache = ResultCache::new(store.clone(), config.cache_ttl_seconds);
    let mut orchestrator = Orchestrator::new(
        KeyStore::new(config.api_key_list()),
        cache,
        provider.clone(),
    )
    .with_retry_policy(config.retry_policy())
    .with_timeouts(PipelineTimeouts {
        request: config.request_timeout(),
        provider: config.provider_timeout(),
        fallback_headroom: config.fallback_headroom(),
    })
    .with_fallback(config.enable_fallback);

    if config.enable_rate_limit {
        orchestrator = orchestrator.with_rate_limiter(RateLimiter::new(
            store.clone(),
            config.rate_limit_per_window,
            config.rate_limit_window_secs,
            config.rate_limit_store_policy,
        ));
    }
    if let Some(evaluator) = &evaluator {
        orchestrator = orchestrator.with_evaluator(evaluator.clone());
    }

    let health = HealthAggregator::new(provider, store, evaluator, config.health_check_timeout());

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        health: Arc::new(health),
    })
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(config: &Config) -> Result<Self, SummarizerError> {
        let state = build_state(config)?;
        Ok(Self {
            app: create_app(state),
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Summarizer listening on {}", self.bind_addr);
        tracing::info!("Health check available at /v1/healthz");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
