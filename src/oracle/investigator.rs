//! Token investigator: the end-to-end investigation pipeline.
//!
//! Admission, cache short-circuit, the known-offender fast path, the
//! parallel evidence fan-out, deterministic scoring, reasoning, score
//! combination and registry write-back. Every collaborator runs under a
//! deadline and degrades to an absent value instead of failing the
//! investigation.

use crate::oracle::cache::ResultCache;
use crate::oracle::data_sources::{is_capturable_website, EvidenceProvider};
use crate::oracle::error::InvestigationError;
use crate::oracle::metrics::{
    InvestigationMetrics, MetricsSnapshot, CACHE_HITS, DEGRADED_SOURCES, FAST_PATH_HITS,
    INVESTIGATIONS, RATE_LIMITED, REASONING_FAILURES, REGISTRY_FLAGS,
};
use crate::oracle::rate_limit::ClientRateLimiter;
use crate::oracle::reasoning::{ReasoningAdapter, VerifiedEvidence};
use crate::oracle::registry::KnownEntityRegistry;
use crate::oracle::scorer::{
    apply_visual_override, assign_verdict, combine, DeterministicScorer, VISUAL_REUSE_CAP,
};
use crate::oracle::types::{
    CreatorStatus, InvestigationResult, InvestigatorConfig, KnownEntityRecord, SocialLinks,
    VisualStatus,
};
use crate::oracle::visual::VisualEvidenceCapturer;
use crate::types::{Pubkey, TokenAddress, Verdict, VisualReuse};
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Client key used when the caller does not identify itself.
pub const DEFAULT_CLIENT_KEY: &str = "default";

const WRITE_BACK_GRACE: Duration = Duration::from_secs(5);

/// Shared handle to the investigation pipeline. Cloning is cheap and all
/// clones share the limiter, cache, registry and metrics.
#[derive(Clone)]
pub struct TokenInvestigator {
    inner: Arc<Inner>,
}

struct Inner {
    config: InvestigatorConfig,
    limiter: ClientRateLimiter,
    cache: ResultCache,
    registry: KnownEntityRegistry,
    evidence: Arc<dyn EvidenceProvider>,
    capturer: Option<VisualEvidenceCapturer>,
    reasoning: ReasoningAdapter,
    scorer: DeterministicScorer,
    metrics: InvestigationMetrics,
    write_backs: Mutex<Vec<JoinHandle<()>>>,
}

impl TokenInvestigator {
    /// Assemble an investigator from its collaborators.
    pub fn new(
        config: InvestigatorConfig,
        evidence: Arc<dyn EvidenceProvider>,
        capturer: Option<VisualEvidenceCapturer>,
        reasoning: ReasoningAdapter,
        registry: KnownEntityRegistry,
    ) -> Self {
        let limiter = ClientRateLimiter::new(
            Duration::from_secs(config.rate_limit_window_seconds),
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_retry_after_seconds),
        );
        let cache = ResultCache::new(
            config.max_cache_entries,
            Duration::from_secs(config.cache_ttl_seconds),
        );
        let scorer = DeterministicScorer::new(config.thresholds.clone());

        info!(
            "Token investigator ready (registry {}, capture {}, cache ttl {}s)",
            if registry.is_enabled() { "enabled" } else { "disabled" },
            if capturer.is_some() { "enabled" } else { "disabled" },
            config.cache_ttl_seconds
        );

        Self {
            inner: Arc::new(Inner {
                config,
                limiter,
                cache,
                registry,
                evidence,
                capturer,
                reasoning,
                scorer,
                metrics: InvestigationMetrics::new(),
                write_backs: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn registry(&self) -> &KnownEntityRegistry {
        &self.inner.registry
    }

    /// Investigate an address on behalf of the default client.
    pub async fn investigate(
        &self,
        raw_address: &str,
    ) -> Result<InvestigationResult, InvestigationError> {
        self.investigate_as(DEFAULT_CLIENT_KEY, raw_address).await
    }

    /// Investigate an address on behalf of `client_key`.
    ///
    /// Malformed input is rejected before admission and never reaches a
    /// collaborator. The pipeline runs in its own task, so a caller that goes
    /// away does not cancel cache population or registry write-back.
    #[instrument(skip(self))]
    pub async fn investigate_as(
        &self,
        client_key: &str,
        raw_address: &str,
    ) -> Result<InvestigationResult, InvestigationError> {
        let address = TokenAddress::parse(raw_address)
            .ok_or_else(|| InvestigationError::InvalidAddress(raw_address.to_string()))?;

        if let Err(e) = self.inner.limiter.admit(client_key) {
            self.inner.metrics.increment_counter(RATE_LIMITED).await;
            return Err(e);
        }
        self.inner.metrics.increment_counter(INVESTIGATIONS).await;

        if let Some(hit) = self.inner.cache.get(&address).await {
            self.inner.metrics.increment_counter(CACHE_HITS).await;
            debug!("Serving {} from cache", address);
            return Ok(hit);
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let key = address.clone();
            inner.cache.get_or_compute(key, inner.run_pipeline(address)).await
        });

        task.await.map_err(|e| {
            warn!("Investigation task failed: {}", e);
            InvestigationError::Internal(e.to_string())
        })
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot().await
    }

    /// Wait for pending registry write-backs, then log final metrics.
    pub async fn shutdown(&self) {
        info!("Token investigator shutting down");
        let pending: Vec<JoinHandle<()>> = match self.inner.write_backs.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in pending {
            if timeout(WRITE_BACK_GRACE, handle).await.is_err() {
                warn!("Registry write-back still pending at shutdown");
            }
        }
        self.inner.metrics.log_summary().await;
    }
}

impl Inner {
    fn source_deadline(&self) -> Duration {
        Duration::from_secs(self.config.source_timeout_seconds)
    }

    /// Await one collaborator under the source deadline, converting any
    /// failure into `None`.
    async fn guarded<T, F>(&self, source: &str, address: &TokenAddress, fetch: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let deadline = self.source_deadline();
        match timeout(deadline, fetch).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} source failed for {}: {:#}", source, address, e);
                self.metrics.increment_counter(DEGRADED_SOURCES).await;
                None
            }
            Err(_) => {
                warn!("{} source timed out after {:?} for {}", source, deadline, address);
                self.metrics.increment_counter(DEGRADED_SOURCES).await;
                None
            }
        }
    }

    async fn resolve_creator(&self, address: &TokenAddress) -> Option<Pubkey> {
        let deadline = Duration::from_millis(self.config.creator_resolution_timeout_ms);
        match timeout(deadline, self.evidence.resolve_creator(address)).await {
            Ok(Ok(creator)) => creator,
            Ok(Err(e)) => {
                warn!("Creator resolution failed for {}: {:#}", address, e);
                None
            }
            Err(_) => {
                warn!("Creator resolution timed out for {}", address);
                None
            }
        }
    }

    #[instrument(skip_all, fields(address = %address))]
    async fn run_pipeline(&self, address: TokenAddress) -> InvestigationResult {
        let started = Instant::now();

        let resolved_creator = self.resolve_creator(&address).await;
        if let Some(identity) = resolved_creator.as_deref() {
            if let Some(record) = self.registry.lookup(identity).await {
                self.metrics.increment_counter(FAST_PATH_HITS).await;
                let result = known_offender_result(address, record, started.elapsed());
                info!("Fast path: {} tied to known offender {}", result.address, identity);
                return result;
            }
        }

        let history_fetch = async {
            match resolved_creator.as_deref() {
                Some(creator) => {
                    self.guarded(
                        "creator-history",
                        &address,
                        self.evidence.fetch_creator_history(creator),
                    )
                    .await
                }
                None => None,
            }
        };

        let social_and_visual = async {
            let socials = self
                .guarded("social", &address, self.evidence.fetch_social_links(&address))
                .await;
            let website = socials.as_ref().and_then(|s| s.website.clone());
            let visual = match (&self.capturer, website) {
                (Some(capturer), Some(site)) => {
                    capturer.capture(&site, is_capturable_website(&site)).await
                }
                _ => None,
            };
            (socials, visual)
        };

        let (on_chain, market, audit, creator_history, (socials, visual)) = tokio::join!(
            self.guarded("on-chain", &address, self.evidence.fetch_on_chain(&address)),
            self.guarded("market", &address, self.evidence.fetch_market(&address)),
            self.guarded("audit", &address, self.evidence.fetch_audit(&address)),
            history_fetch,
            social_and_visual,
        );
        let market = market.flatten();
        let audit = audit.flatten();

        let creator = resolved_creator.or_else(|| {
            on_chain
                .as_ref()
                .and_then(|f| f.creator_identity().map(str::to_string))
        });
        let creator_status = on_chain
            .as_ref()
            .map(|f| f.creator_status())
            .unwrap_or_else(CreatorStatus::unknown);
        let pool_age_hours = market.as_ref().and_then(|m| m.pool_age_hours);

        let breakdown = self.scorer.breakdown(
            on_chain.as_ref(),
            market.as_ref(),
            &creator_status,
            audit.as_ref(),
            pool_age_hours,
        );

        let socials_available = socials.is_some();
        let socials = socials.unwrap_or_default();
        let evidence = VerifiedEvidence {
            address: &address,
            on_chain: on_chain.as_ref(),
            market: market.as_ref(),
            audit: audit.as_ref(),
            creator_history: creator_history.as_ref(),
            socials: &socials,
            deterministic: &breakdown,
        };
        let reasoning = self.reasoning.assess(&evidence, visual.as_ref()).await;
        if reasoning.is_none() {
            self.metrics.increment_counter(REASONING_FAILURES).await;
        }

        let reasoning_score = reasoning.as_ref().map(|r| r.trust_score);
        let combined = combine(breakdown.score, reasoning_score);
        let (trust_score, override_applied) =
            apply_visual_override(combined, visual.is_some(), reasoning.as_ref());
        let verdict = assign_verdict(trust_score, reasoning.is_some());

        let mut rationale: Vec<String> = breakdown
            .penalties
            .iter()
            .map(|p| p.reason.clone())
            .collect();
        if let Some(m) = &market {
            rationale.extend(m.anomalies.iter().cloned());
        }
        match &reasoning {
            Some(r) => {
                if r.trust_score > breakdown.score {
                    rationale.push(format!(
                        "Reasoning score {} capped at deterministic ceiling {}",
                        r.trust_score, breakdown.score
                    ));
                }
                rationale.extend(r.evidence.iter().cloned());
            }
            None => rationale.push(
                "Reasoning engine unavailable; score reflects verified facts only".to_string(),
            ),
        }
        if override_applied {
            rationale.push(format!(
                "Website reuses a known template; score capped at {VISUAL_REUSE_CAP}"
            ));
        }

        let summary = reasoning
            .as_ref()
            .map(|r| r.summary.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "Deterministic assessment: {} with {} risk factors",
                    verdict,
                    breakdown.penalties.len()
                )
            });

        let visual_status = match &visual {
            Some(v) => VisualStatus {
                captured: true,
                provider: Some(v.provider.clone()),
                reuse: Some(
                    reasoning
                        .as_ref()
                        .and_then(|r| r.visual_reuse)
                        .unwrap_or(VisualReuse::Unknown),
                ),
                analysis: reasoning.as_ref().and_then(|r| r.visual_analysis.clone()),
                override_applied,
                retained_path: v.retained_path.clone(),
            },
            None => VisualStatus::default(),
        };

        if verdict == Verdict::Danger {
            if let Some(identity) = creator.clone() {
                self.spawn_write_back(identity, address.clone(), summary.clone());
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_pipeline_time(elapsed).await;
        info!(
            "Investigated {}: {} ({}), deterministic {}, reasoning {:?}",
            address, verdict, trust_score, breakdown.score, reasoning_score
        );

        InvestigationResult {
            address,
            trust_score,
            verdict,
            deterministic_score: breakdown.score,
            reasoning_score,
            reasoning_available: reasoning.is_some(),
            summary,
            rationale,
            known_offender: false,
            known_entity: None,
            on_chain_available: on_chain.is_some(),
            on_chain: on_chain.as_ref().map(|f| f.summary()),
            market_available: market.is_some(),
            market,
            socials_available,
            socials,
            audit_available: audit.is_some(),
            audit,
            creator_history_available: creator_history.is_some(),
            creator_history,
            visual: visual_status,
            investigated_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Flag the creator without holding up the response.
    fn spawn_write_back(&self, identity: Pubkey, address: TokenAddress, reason: String) {
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            match registry
                .flag_if_absent(&identity, address.as_str(), Verdict::Danger, &reason)
                .await
            {
                Ok(true) => metrics.increment_counter(REGISTRY_FLAGS).await,
                Ok(false) => debug!("Registry disabled, {} not flagged", identity),
                Err(e) => warn!("Registry write-back failed for {}: {:#}", identity, e),
            }
        });

        if let Ok(mut handles) = self.write_backs.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }
}

fn known_offender_result(
    address: TokenAddress,
    record: KnownEntityRecord,
    elapsed: Duration,
) -> InvestigationResult {
    let rationale = vec![
        format!(
            "Creator {} was flagged {} on {} via token {}: {}",
            record.identity,
            record.verdict,
            record.flagged_at.format("%Y-%m-%d"),
            record.first_token,
            record.reason
        ),
        format!("Creator detected {} times", record.detection_count),
    ];

    InvestigationResult {
        address,
        trust_score: 0,
        verdict: Verdict::Danger,
        deterministic_score: 0,
        reasoning_score: None,
        reasoning_available: false,
        summary: format!("Creator {} is a known offender", record.identity),
        rationale,
        known_offender: true,
        known_entity: Some(record),
        on_chain_available: false,
        on_chain: None,
        market_available: false,
        market: None,
        socials_available: false,
        socials: SocialLinks::default(),
        audit_available: false,
        audit: None,
        creator_history_available: false,
        creator_history: None,
        visual: VisualStatus::default(),
        investigated_at: Utc::now(),
        duration_ms: elapsed.as_millis() as u64,
    }
}
