//! Evidence, verdict and configuration types for the investigation pipeline.

use crate::types::{Pubkey, TokenAddress, Verdict, VisualReuse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Creator share of supply below which the creator is considered to have dumped.
pub const DUMPED_SHARE_PCT: f64 = 1.0;
/// Creator share of supply above which the creator is considered a whale.
pub const WHALE_SHARE_PCT: f64 = 20.0;

/// One of the largest token accounts for a mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderShare {
    /// Token account address
    pub address: Pubkey,
    /// Wallet owning the token account, when it could be resolved
    pub owner: Option<Pubkey>,
    /// Balance in UI units
    pub amount: f64,
    /// Share of total supply (0-100)
    pub percentage: f64,
}

/// Verified on-chain facts about a token mint. Fetched once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainFacts {
    pub mint: Pubkey,
    pub decimals: u8,
    pub raw_supply: u64,
    /// Supply in UI units
    pub supply: f64,
    /// `None` means the mint authority was renounced
    pub mint_authority: Option<Pubkey>,
    /// `None` means the freeze authority was renounced
    pub freeze_authority: Option<Pubkey>,
    /// Largest holders, biggest first
    pub top_holders: Vec<HolderShare>,
}

impl OnChainFacts {
    /// Creator identity: the mint authority, else the freeze authority.
    pub fn creator_identity(&self) -> Option<&str> {
        self.mint_authority
            .as_deref()
            .or(self.freeze_authority.as_deref())
    }

    /// Combined share of the ten largest holders (0-100).
    pub fn top10_concentration(&self) -> f64 {
        self.top_holders.iter().take(10).map(|h| h.percentage).sum()
    }

    /// Share of supply held by the creator across the top holder list.
    ///
    /// Only computable when a creator identity is known.
    pub fn creator_percentage(&self) -> Option<f64> {
        let creator = self.creator_identity()?;
        Some(
            self.top_holders
                .iter()
                .filter(|h| h.address == creator || h.owner.as_deref() == Some(creator))
                .map(|h| h.percentage)
                .sum(),
        )
    }

    pub fn is_dumped(&self) -> bool {
        self.creator_percentage()
            .map(|pct| pct < DUMPED_SHARE_PCT)
            .unwrap_or(false)
    }

    pub fn is_whale(&self) -> bool {
        self.creator_percentage()
            .map(|pct| pct > WHALE_SHARE_PCT)
            .unwrap_or(false)
    }

    pub fn creator_status(&self) -> CreatorStatus {
        CreatorStatus {
            identity: self.creator_identity().map(str::to_string),
            percentage: self.creator_percentage(),
            is_dumped: self.is_dumped(),
            is_whale: self.is_whale(),
        }
    }

    pub fn summary(&self) -> OnChainSummary {
        OnChainSummary {
            supply: self.supply,
            decimals: self.decimals,
            mint_authority_enabled: self.mint_authority.is_some(),
            freeze_authority_enabled: self.freeze_authority.is_some(),
            top10_concentration: self.top10_concentration(),
            holder_count_sampled: self.top_holders.len(),
            creator: self.creator_status(),
        }
    }
}

/// Creator position derived from on-chain facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorStatus {
    /// `None` when both authorities are renounced
    pub identity: Option<Pubkey>,
    pub percentage: Option<f64>,
    pub is_dumped: bool,
    pub is_whale: bool,
}

impl CreatorStatus {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Published on-chain fact summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainSummary {
    pub supply: f64,
    pub decimals: u8,
    pub mint_authority_enabled: bool,
    pub freeze_authority_enabled: bool,
    pub top10_concentration: f64,
    pub holder_count_sampled: usize,
    pub creator: CreatorStatus,
}

/// Bot-activity tier derived from trading patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotActivity {
    #[default]
    Low,
    Medium,
    High,
}

/// Market metrics for the most liquid trading pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub pair_address: Option<Pubkey>,
    pub dex_id: Option<String>,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub buy_sell_ratio: f64,
    /// 24h volume divided by liquidity; zero when liquidity is zero
    pub wash_trade_ratio: f64,
    pub pool_age_hours: Option<f64>,
    pub bot_activity: BotActivity,
    pub anomalies: Vec<String>,
}

/// Resolved social and website links for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub discord: Option<String>,
    pub other: Vec<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.website.is_none()
            && self.twitter.is_none()
            && self.telegram.is_none()
            && self.discord.is_none()
            && self.other.is_empty()
    }
}

/// A single finding from a contract audit service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRisk {
    pub name: String,
    pub level: String,
    pub description: String,
}

/// Contract audit report summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Normalized risk score (0 = clean, 100 = worst)
    pub risk_score: u32,
    pub risks: Vec<AuditRisk>,
    pub rugged: bool,
}

/// Previous launches by the same creator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorHistory {
    pub creator: Pubkey,
    pub tokens_created: u32,
    /// Launches whose market cap collapsed under the dead-token floor
    pub dead_tokens: u32,
    pub recent_tokens: Vec<Pubkey>,
}

/// A captured snapshot of a project website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualEvidence {
    /// Base64-encoded image bytes
    pub image_base64: String,
    pub media_type: String,
    pub source_url: String,
    pub provider: String,
    pub retained_path: Option<PathBuf>,
}

/// Structured judgment returned by the reasoning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningVerdict {
    pub trust_score: u8,
    pub verdict: Verdict,
    pub summary: String,
    pub evidence: Vec<String>,
    pub visual_analysis: Option<String>,
    pub visual_reuse: Option<VisualReuse>,
    /// Reuse is attributed to a well-known meme, exempt from the reuse cap
    #[serde(default)]
    pub meme_culture: bool,
}

/// A creator identity previously flagged as dangerous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEntityRecord {
    pub identity: Pubkey,
    pub first_token: Pubkey,
    pub verdict: Verdict,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
    pub detection_count: u64,
}

/// Visual evidence status in the published result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualStatus {
    pub captured: bool,
    pub provider: Option<String>,
    /// Only set when captured
    pub reuse: Option<VisualReuse>,
    pub analysis: Option<String>,
    pub override_applied: bool,
    pub retained_path: Option<PathBuf>,
}

/// The published outcome of one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub address: TokenAddress,
    pub trust_score: u8,
    pub verdict: Verdict,
    pub deterministic_score: u8,
    pub reasoning_score: Option<u8>,
    pub reasoning_available: bool,
    pub summary: String,
    pub rationale: Vec<String>,
    /// Whether the known-entity fast path fired
    pub known_offender: bool,
    pub known_entity: Option<KnownEntityRecord>,
    pub on_chain_available: bool,
    pub on_chain: Option<OnChainSummary>,
    pub market_available: bool,
    pub market: Option<MarketSnapshot>,
    pub socials_available: bool,
    pub socials: SocialLinks,
    pub audit_available: bool,
    pub audit: Option<AuditReport>,
    pub creator_history_available: bool,
    pub creator_history: Option<CreatorHistory>,
    pub visual: VisualStatus,
    pub investigated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Fixed thresholds used by the deterministic score engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub min_liquidity_usd: f64,
    /// Minimum healthy liquidity / market cap ratio
    pub min_liquidity_to_cap_ratio: f64,
    pub high_concentration_pct: f64,
    pub moderate_concentration_pct: f64,
    pub young_pool_hours: f64,
    pub audit_moderate_risk: u32,
    pub audit_high_risk: u32,
    /// Market cap under which a creator's previous launch counts as dead
    pub dead_token_market_cap_usd: f64,
}

/// One visual capture strategy in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureProviderConfig {
    pub name: String,
    /// URL template; `{url}` is replaced with the percent-encoded target
    pub url_template: String,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
}

/// Reasoning engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

/// Investigator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigatorConfig {
    /// Solana RPC endpoint
    pub rpc_endpoint: String,
    /// Market pairs endpoint; `{address}` is replaced with the token address
    pub market_api_url: String,
    /// Audit report endpoint; `{address}` is replaced with the token address
    pub audit_api_url: String,
    /// Creator launches endpoint; `{creator}` is replaced with the creator identity
    pub creator_history_api_url: String,
    pub reasoning: ReasoningConfig,
    /// Ordered capture chain, primary first
    pub capture_providers: Vec<CaptureProviderConfig>,
    /// Deadline for each evidence source
    pub source_timeout_seconds: u64,
    /// Deadline for the creator resolution that gates the fast path
    pub creator_resolution_timeout_ms: u64,
    pub rpc_timeout_seconds: u64,
    pub rpc_retry_attempts: usize,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: usize,
    pub rate_limit_retry_after_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_cache_entries: u64,
    /// Process-wide quota for calls to evidence sources
    pub outbound_requests_per_second: u32,
    /// SQLite URL for the known-entity registry; `None` keeps it in memory
    pub registry_database_url: Option<String>,
    /// Screenshot retention directory; `None` disables retention
    pub screenshot_dir: Option<PathBuf>,
    pub screenshot_max_age_hours: u64,
    pub capture_failure_threshold: u32,
    pub capture_cooldown_seconds: u64,
    pub thresholds: ScoreThresholds,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            min_liquidity_usd: 5_000.0,
            min_liquidity_to_cap_ratio: 0.01,
            high_concentration_pct: 50.0,
            moderate_concentration_pct: 30.0,
            young_pool_hours: 1.0,
            audit_moderate_risk: 40,
            audit_high_risk: 70,
            dead_token_market_cap_usd: 5_000.0,
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tokens: 900,
            timeout_seconds: 45,
        }
    }
}

impl Default for InvestigatorConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            market_api_url: "https://api.dexscreener.com/latest/dex/tokens/{address}".to_string(),
            audit_api_url: "https://api.rugcheck.xyz/v1/tokens/{address}/report/summary"
                .to_string(),
            creator_history_api_url:
                "https://frontend-api.pump.fun/coins/user-created-coins/{creator}?offset=0&limit=50"
                    .to_string(),
            reasoning: ReasoningConfig::default(),
            capture_providers: vec![
                CaptureProviderConfig {
                    name: "microlink".to_string(),
                    url_template:
                        "https://api.microlink.io/?url={url}&screenshot=true&meta=false&embed=screenshot.url"
                            .to_string(),
                    timeout_seconds: 15,
                    api_key: None,
                },
                CaptureProviderConfig {
                    name: "thum.io".to_string(),
                    url_template: "https://image.thum.io/get/width/1280/crop/800/{url}".to_string(),
                    timeout_seconds: 8,
                    api_key: None,
                },
            ],
            source_timeout_seconds: 10,
            creator_resolution_timeout_ms: 3_000,
            rpc_timeout_seconds: 8,
            rpc_retry_attempts: 2,
            rate_limit_window_seconds: 60,
            rate_limit_max_requests: 5,
            rate_limit_retry_after_seconds: 60,
            cache_ttl_seconds: 300,
            max_cache_entries: 1000,
            outbound_requests_per_second: 20,
            registry_database_url: Some("sqlite:./known_entities.db?mode=rwc".to_string()),
            screenshot_dir: None,
            screenshot_max_age_hours: 24,
            capture_failure_threshold: 3,
            capture_cooldown_seconds: 120,
            thresholds: ScoreThresholds::default(),
        }
    }
}
