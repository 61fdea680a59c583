//! The gateway's shared application state, constructed once at startup and
//! threaded into every handler via axum's `State<AppState>` extractor (§9's
//! replacement for a `ServerAPI::instance` singleton).

use std::sync::Arc;

use crate::{
    config::GatewayConfig,
    download::DownloadManager,
    engine::{manager::NodeManager, test_engine::TestEngineLoader, EngineLoader},
    metrics::{MetricsAggregator, SystemMetricsCollector},
    middleware::{
        api_key::{ApiKeyHandler, ApiKeyPolicy},
        cors::{CorsHandler, CorsPolicy},
        rate_limit::RateLimiter,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub cors: Arc<CorsHandler>,
    pub api_key: Arc<ApiKeyHandler>,
    pub rate_limiter: Arc<RateLimiter>,
    pub node_manager: Arc<NodeManager>,
    pub metrics: Arc<MetricsAggregator>,
    pub system_metrics: Arc<SystemMetricsCollector>,
    pub downloads: Arc<DownloadManager>,
}

impl AppState {
    /// Builds state with the bundled deterministic test engine as the
    /// collaborator (§6) — the only implementation this gateway ships; a
    /// real backend plugs in by constructing a `NodeManager` with its own
    /// `EngineLoader` instead.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_loader(config, Arc::new(TestEngineLoader::new()))
    }

    pub fn with_loader(config: GatewayConfig, loader: Arc<dyn EngineLoader>) -> Self {
        let config = Arc::new(config);
        let node_manager = Arc::new(NodeManager::new(loader, config.engines.idle_timeout()));

        Self {
            cors: Arc::new(CorsHandler::new(CorsPolicy::from(&config.cors))),
            api_key: Arc::new(ApiKeyHandler::new(ApiKeyPolicy::from(&config.api_key))),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            node_manager,
            metrics: Arc::new(MetricsAggregator::new()),
            system_metrics: Arc::new(SystemMetricsCollector::new()),
            downloads: Arc::new(DownloadManager::new()),
            config,
        }
    }

    /// Registers (and, for `load_at_startup` entries, eagerly loads) every
    /// preload entry from config. Called once during boot.
    pub async fn preload_engines(&self) -> anyhow::Result<()> {
        for entry in &self.config.engines.preload {
            let params = entry.load_params.clone().unwrap_or(serde_json::Value::Null);
            if entry.load_at_startup {
                let ok = self
                    .node_manager
                    .add(entry.id.clone(), entry.path.clone(), params, entry.gpu_id)
                    .await?;
                if !ok {
                    tracing::warn!(engine_id = %entry.id, "preloaded engine failed to load at startup");
                }
            } else {
                self.node_manager
                    .register(entry.id.clone(), entry.path.clone(), params, entry.gpu_id)?;
            }
        }
        Ok(())
    }
}
