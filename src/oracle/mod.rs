//! Oracle module - token investigation pipeline.
//!
//! Evidence sources, visual capture, reasoning, deterministic scoring and the
//! known-entity registry, wired together by [`TokenInvestigator`].

pub mod types;
pub mod error;
pub mod anomaly;
pub mod cache;
pub mod circuit_breaker;
pub mod data_sources;
pub mod investigator;
pub mod metrics;
pub mod rate_limit;
pub mod reasoning;
pub mod registry;
pub mod scorer;
pub mod sqlite_registry;
pub mod storage;
pub mod visual;

// Re-export main public types and the investigator
pub use investigator::{TokenInvestigator, DEFAULT_CLIENT_KEY};
pub use error::InvestigationError;
pub use types::{
    InvestigationResult, InvestigatorConfig, KnownEntityRecord, MarketSnapshot, OnChainFacts,
    ReasoningVerdict, ScoreThresholds, VisualEvidence,
};

// Re-export collaborator seams for custom wiring and tests
pub use data_sources::{EvidenceProvider, HttpEvidenceProvider};
pub use metrics::MetricsSnapshot;
pub use reasoning::{HttpReasoningEngine, ReasoningAdapter, ReasoningEngine, ReasoningRequest};
pub use registry::KnownEntityRegistry;
pub use storage::{KnownEntityStorage, MemoryEntityStorage};
pub use sqlite_registry::SqliteEntityStorage;
pub use visual::{CaptureProvider, CaptureStrategy, CapturedImage, VisualEvidenceCapturer};

use anyhow::Result;
use nonempty::NonEmpty;
use rate_limit::OutboundThrottle;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use visual::ScreenshotRetention;

/// Investigator builder with sensible defaults.
///
/// Collaborators not supplied explicitly are built from configuration: the
/// Solana/HTTP evidence provider, the HTTP capture chain, the chat-completion
/// reasoning engine and the SQLite registry.
pub struct InvestigatorBuilder {
    config: InvestigatorConfig,
    evidence: Option<Arc<dyn EvidenceProvider>>,
    reasoning_engine: Option<Arc<dyn ReasoningEngine>>,
    capture_strategies: Option<Vec<CaptureStrategy>>,
    registry: Option<KnownEntityRegistry>,
}

impl InvestigatorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::from_config(InvestigatorConfig::default())
    }

    pub fn from_config(config: InvestigatorConfig) -> Self {
        Self {
            config,
            evidence: None,
            reasoning_engine: None,
            capture_strategies: None,
            registry: None,
        }
    }

    /// Set the Solana RPC endpoint.
    pub fn with_rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.rpc_endpoint = endpoint.into();
        self
    }

    /// Set score thresholds.
    pub fn with_thresholds(mut self, thresholds: ScoreThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Set per-client admission limits.
    pub fn with_rate_limit(
        mut self,
        window_seconds: u64,
        max_requests: usize,
        retry_after_seconds: u64,
    ) -> Self {
        self.config.rate_limit_window_seconds = window_seconds;
        self.config.rate_limit_max_requests = max_requests;
        self.config.rate_limit_retry_after_seconds = retry_after_seconds;
        self
    }

    /// Set cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Set max cache entries.
    pub fn with_max_cache_entries(mut self, max_entries: u64) -> Self {
        self.config.max_cache_entries = max_entries;
        self
    }

    /// Set the outbound request quota shared by evidence sources.
    pub fn with_outbound_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.config.outbound_requests_per_second = requests_per_second;
        self
    }

    /// Set the per-source deadline.
    pub fn with_source_timeout(mut self, seconds: u64) -> Self {
        self.config.source_timeout_seconds = seconds;
        self
    }

    /// Set capture provider circuit breaker configuration.
    pub fn with_circuit_breaker(mut self, failure_threshold: u32, cooldown_seconds: u64) -> Self {
        self.config.capture_failure_threshold = failure_threshold;
        self.config.capture_cooldown_seconds = cooldown_seconds;
        self
    }

    /// Set the reasoning engine API key.
    pub fn with_reasoning_api_key(mut self, api_key: Option<String>) -> Self {
        self.config.reasoning.api_key = api_key;
        self
    }

    /// Set the registry database URL; `None` keeps the registry in memory.
    pub fn with_registry_database(mut self, url: Option<String>) -> Self {
        self.config.registry_database_url = url;
        self
    }

    /// Retain captured screenshots under `dir`.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>, max_age_hours: u64) -> Self {
        self.config.screenshot_dir = Some(dir.into());
        self.config.screenshot_max_age_hours = max_age_hours;
        self
    }

    pub fn with_evidence_provider(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.evidence = Some(provider);
        self
    }

    pub fn with_reasoning_engine(mut self, engine: Arc<dyn ReasoningEngine>) -> Self {
        self.reasoning_engine = Some(engine);
        self
    }

    /// Replace the configured capture chain. An empty list disables capture.
    pub fn with_capture_strategies(mut self, strategies: Vec<CaptureStrategy>) -> Self {
        self.capture_strategies = Some(strategies);
        self
    }

    pub fn with_registry(mut self, registry: KnownEntityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the investigator configuration.
    pub fn build_config(self) -> InvestigatorConfig {
        self.config
    }

    /// Build the investigator, constructing any collaborator not supplied.
    pub async fn build(self) -> Result<TokenInvestigator> {
        let config = self.config;
        let throttle = Arc::new(OutboundThrottle::new(config.outbound_requests_per_second));

        let evidence: Arc<dyn EvidenceProvider> = match self.evidence {
            Some(provider) => provider,
            None => Arc::new(HttpEvidenceProvider::from_config(
                config.clone(),
                throttle.clone(),
            )?),
        };

        let reasoning_engine: Arc<dyn ReasoningEngine> = match self.reasoning_engine {
            Some(engine) => engine,
            None => Arc::new(HttpReasoningEngine::new(config.reasoning.clone())?),
        };
        let reasoning = ReasoningAdapter::new(
            reasoning_engine,
            Duration::from_secs(config.reasoning.timeout_seconds),
        );

        let failure_threshold = config.capture_failure_threshold;
        let cooldown = Duration::from_secs(config.capture_cooldown_seconds);
        let capturer = match self.capture_strategies {
            Some(strategies) => NonEmpty::from_vec(strategies)
                .map(|chain| VisualEvidenceCapturer::new(chain, failure_threshold, cooldown)),
            None => VisualEvidenceCapturer::from_configs(
                &config.capture_providers,
                Client::builder().build()?,
                throttle.clone(),
                failure_threshold,
                cooldown,
            ),
        };
        let capturer = match (capturer, &config.screenshot_dir) {
            (Some(capturer), Some(dir)) => Some(capturer.with_retention(ScreenshotRetention::new(
                dir.clone(),
                Duration::from_secs(config.screenshot_max_age_hours * 3600),
            ))),
            (capturer, _) => capturer,
        };

        let registry = match self.registry {
            Some(registry) => registry,
            None => KnownEntityRegistry::open(config.registry_database_url.as_deref()).await,
        };

        Ok(TokenInvestigator::new(
            config, evidence, capturer, reasoning, registry,
        ))
    }
}

impl Default for InvestigatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_investigator_builder() {
        let config = InvestigatorBuilder::new()
            .with_cache_ttl(600)
            .with_rate_limit(30, 10, 45)
            .with_outbound_rate_limit(50)
            .with_registry_database(None)
            .build_config();

        assert_eq!(config.cache_ttl_seconds, 600);
        assert_eq!(config.rate_limit_window_seconds, 30);
        assert_eq!(config.rate_limit_max_requests, 10);
        assert_eq!(config.rate_limit_retry_after_seconds, 45);
        assert_eq!(config.outbound_requests_per_second, 50);
        assert!(config.registry_database_url.is_none());
    }

    #[test]
    fn test_investigator_builder_collaborator_settings() {
        let thresholds = ScoreThresholds {
            min_liquidity_usd: 10_000.0,
            ..ScoreThresholds::default()
        };
        let config = InvestigatorBuilder::new()
            .with_rpc_endpoint("http://127.0.0.1:8899")
            .with_thresholds(thresholds)
            .with_max_cache_entries(64)
            .with_circuit_breaker(5, 30)
            .with_reasoning_api_key(Some("sk-test".to_string()))
            .with_screenshot_dir("/tmp/screens", 6)
            .build_config();

        assert_eq!(config.rpc_endpoint, "http://127.0.0.1:8899");
        assert_eq!(config.thresholds.min_liquidity_usd, 10_000.0);
        assert_eq!(config.max_cache_entries, 64);
        assert_eq!(config.capture_failure_threshold, 5);
        assert_eq!(config.capture_cooldown_seconds, 30);
        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.screenshot_dir, Some(PathBuf::from("/tmp/screens")));
        assert_eq!(config.screenshot_max_age_hours, 6);
    }

    #[test]
    fn test_investigator_builder_defaults() {
        let config = InvestigatorBuilder::new().build_config();

        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.rate_limit_window_seconds, 60);
        assert_eq!(config.rate_limit_max_requests, 5);
        assert_eq!(config.rate_limit_retry_after_seconds, 60);
        assert_eq!(config.capture_providers.len(), 2);
        assert_eq!(config.thresholds.min_liquidity_usd, 5_000.0);
    }

    #[tokio::test]
    async fn test_build_with_defaults_in_memory_registry() {
        let investigator = InvestigatorBuilder::new()
            .with_registry_database(None)
            .build()
            .await
            .unwrap();
        assert!(investigator.registry().is_enabled());
    }
}
