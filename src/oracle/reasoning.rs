//! Reasoning adapter: packages verified evidence for the external reasoning
//! engine and parses its reply.
//!
//! The engine is an opaque capability. Everything it returns goes through
//! [`parse_verdict`], which tolerates prose and code fences around the JSON
//! object but rejects replies missing the score or verdict.

use crate::oracle::scorer::ScoreBreakdown;
use crate::oracle::types::{
    AuditReport, CreatorHistory, MarketSnapshot, OnChainFacts, ReasoningConfig, ReasoningVerdict,
    SocialLinks, VisualEvidence,
};
use crate::types::{TokenAddress, Verdict, VisualReuse};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

const VISUAL_REUSE_MARKER: &str = "VISUAL_REUSE:";
const MEME_LABEL: &str = "MEME";

const SYSTEM_PROMPT: &str = "You are a token risk analyst. You receive verified facts about a \
token and return a single JSON object. Base every claim on the facts provided; never guess \
missing values. Respond with JSON only, using the keys: trust_score (integer 0-100), verdict \
(SAFE, CAUTION or DANGER), summary (string), evidence (array of strings), visual_analysis \
(string or null), visual_reuse (YES, MEME, NO, UNKNOWN or null), meme_culture (boolean).";

const VISUAL_INSTRUCTIONS: &str = "A screenshot of the project website is attached. In \
visual_analysis, enumerate what you actually observe: layout, artwork, branding, text and any \
signs of a recycled template or stolen assets. Then state your judgment as visual_reuse: YES if \
the site reuses a known scam template or someone else's assets, NO if it does not, UNKNOWN if \
you cannot tell. If the reused assets are a well-known meme character, answer visual_reuse: MEME \
and set meme_culture to true; otherwise set meme_culture to false. Also end visual_analysis with \
the line VISUAL_REUSE: YES, MEME, NO or UNKNOWN.";

const NO_VISUAL_INSTRUCTIONS: &str = "No screenshot is available for this token. Do not \
describe, infer or speculate about the website's appearance, artwork or branding. Set \
visual_analysis and visual_reuse to null and meme_culture to false.";

/// Image attached to a reasoning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub media_type: String,
    pub base64: String,
}

impl ImageAttachment {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub system: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
}

/// Opaque reasoning capability: takes a request, returns raw reply text.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String>;
}

/// Verified evidence handed to the reasoning engine. Absent sources are
/// reported as unavailable, never filled in.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedEvidence<'a> {
    pub address: &'a TokenAddress,
    pub on_chain: Option<&'a OnChainFacts>,
    pub market: Option<&'a MarketSnapshot>,
    pub audit: Option<&'a AuditReport>,
    pub creator_history: Option<&'a CreatorHistory>,
    pub socials: &'a SocialLinks,
    pub deterministic: &'a ScoreBreakdown,
}

impl VerifiedEvidence<'_> {
    fn to_json(&self) -> Value {
        let on_chain = match self.on_chain {
            Some(facts) => {
                let creator = facts.creator_status();
                json!({
                    "supply": facts.supply,
                    "decimals": facts.decimals,
                    "mint_authority_enabled": facts.mint_authority.is_some(),
                    "freeze_authority_enabled": facts.freeze_authority.is_some(),
                    "top10_concentration_pct": facts.top10_concentration(),
                    "creator": creator.identity,
                    "creator_percentage": creator.percentage,
                    "creator_dumped": creator.is_dumped,
                    "creator_whale": creator.is_whale,
                })
            }
            None => json!("unavailable"),
        };

        let market = match self.market {
            Some(m) => json!({
                "liquidity_usd": m.liquidity_usd,
                "volume_24h_usd": m.volume_24h_usd,
                "market_cap_usd": m.market_cap_usd,
                "buy_sell_ratio": m.buy_sell_ratio,
                "wash_trade_ratio": m.wash_trade_ratio,
                "pool_age_hours": m.pool_age_hours,
                "bot_activity": m.bot_activity,
                "anomalies": m.anomalies,
            }),
            None => json!("unavailable"),
        };

        let audit = match self.audit {
            Some(a) => json!({
                "risk_score": a.risk_score,
                "rugged": a.rugged,
                "risks": a
                    .risks
                    .iter()
                    .map(|r| format!("{} ({})", r.name, r.level))
                    .collect::<Vec<_>>(),
            }),
            None => json!("unavailable"),
        };

        let history = match self.creator_history {
            Some(h) => json!({
                "tokens_created": h.tokens_created,
                "dead_tokens": h.dead_tokens,
            }),
            None => json!("unavailable"),
        };

        json!({
            "address": self.address.as_str(),
            "on_chain": on_chain,
            "market": market,
            "audit": audit,
            "creator_history": history,
            "social_links": self.socials,
            "deterministic_score": self.deterministic.score,
            "deterministic_penalties": self
                .deterministic
                .penalties
                .iter()
                .map(|p| p.reason.as_str())
                .collect::<Vec<_>>(),
        })
    }
}

pub struct ReasoningAdapter {
    engine: Arc<dyn ReasoningEngine>,
    deadline: Duration,
}

impl ReasoningAdapter {
    pub fn new(engine: Arc<dyn ReasoningEngine>, deadline: Duration) -> Self {
        Self { engine, deadline }
    }

    /// Build the request for the given evidence. The visual branch is chosen
    /// solely by the presence of captured evidence.
    pub fn build_request(
        evidence: &VerifiedEvidence<'_>,
        visual: Option<&VisualEvidence>,
    ) -> ReasoningRequest {
        let facts = serde_json::to_string_pretty(&evidence.to_json()).unwrap_or_default();
        let instructions = if visual.is_some() {
            VISUAL_INSTRUCTIONS
        } else {
            NO_VISUAL_INSTRUCTIONS
        };

        ReasoningRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: format!(
                "Assess this token. The deterministic score is an upper bound computed from the \
                 facts below.\n\nVerified facts:\n{facts}\n\n{instructions}"
            ),
            image: visual.map(|v| ImageAttachment {
                media_type: v.media_type.clone(),
                base64: v.image_base64.clone(),
            }),
        }
    }

    /// Ask the engine for a verdict. Any transport failure, timeout or
    /// malformed reply yields `None`.
    #[instrument(skip_all, fields(address = %evidence.address))]
    pub async fn assess(
        &self,
        evidence: &VerifiedEvidence<'_>,
        visual: Option<&VisualEvidence>,
    ) -> Option<ReasoningVerdict> {
        let request = Self::build_request(evidence, visual);

        let raw = match timeout(self.deadline, self.engine.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Reasoning engine failed: {:#}", e);
                return None;
            }
            Err(_) => {
                warn!("Reasoning engine timed out after {:?}", self.deadline);
                return None;
            }
        };

        match parse_verdict(&raw, visual.is_some()) {
            Some(verdict) => {
                info!(
                    "Reasoning verdict {} ({}), visual reuse {:?}",
                    verdict.verdict, verdict.trust_score, verdict.visual_reuse
                );
                Some(verdict)
            }
            None => {
                warn!("Rejected malformed reasoning reply ({} chars)", raw.len());
                None
            }
        }
    }
}

/// Find the first JSON object in the reply that carries a `trust_score`,
/// skipping code fences and any prose (braces included) around it.
fn extract_json_object(raw: &str) -> Option<Value> {
    raw.match_indices('{').find_map(|(idx, _)| {
        serde_json::Deserializer::from_str(&raw[idx..])
            .into_iter::<Value>()
            .next()
            .and_then(|parsed| parsed.ok())
            .filter(|value| value.get("trust_score").is_some())
    })
}

/// Reuse judgment plus whether it was attributed to meme culture.
fn reuse_from_label(label: &str) -> Option<(VisualReuse, bool)> {
    if label.trim().eq_ignore_ascii_case(MEME_LABEL) {
        Some((VisualReuse::Yes, true))
    } else {
        VisualReuse::from_label(label).map(|reuse| (reuse, false))
    }
}

fn reuse_from_marker(text: &str) -> Option<(VisualReuse, bool)> {
    let upper = text.to_ascii_uppercase();
    let idx = upper.rfind(VISUAL_REUSE_MARKER)?;
    let rest = upper[idx + VISUAL_REUSE_MARKER.len()..].trim_start();
    let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    reuse_from_label(&word)
}

fn reuse_from_value(value: &Value) -> Option<(VisualReuse, bool)> {
    match value {
        Value::String(s) => reuse_from_label(s),
        Value::Bool(true) => Some((VisualReuse::Yes, false)),
        Value::Bool(false) => Some((VisualReuse::No, false)),
        _ => None,
    }
}

/// Parse a reasoning reply into a verdict.
///
/// Requires a numeric `trust_score` in `0..=100` and a valid `verdict`.
/// Visual fields are only kept when visual evidence was sent.
pub fn parse_verdict(raw: &str, visual_present: bool) -> Option<ReasoningVerdict> {
    let value = extract_json_object(raw)?;

    let score = value.get("trust_score")?.as_f64()?;
    if !(0.0..=100.0).contains(&score) {
        debug!("Reasoning score {} out of range", score);
        return None;
    }
    let verdict = Verdict::from_label(value.get("verdict")?.as_str()?)?;

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let evidence = value
        .get("evidence")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (visual_analysis, visual_reuse, meme_culture) = if visual_present {
        let analysis = value
            .get("visual_analysis")
            .and_then(Value::as_str)
            .map(str::to_string);
        let judgment = value
            .get("visual_reuse")
            .and_then(reuse_from_value)
            .or_else(|| analysis.as_deref().and_then(reuse_from_marker));
        let reuse = judgment.map(|(reuse, _)| reuse);
        let meme = judgment.is_some_and(|(_, meme)| meme)
            || value.get("meme_culture").and_then(Value::as_bool) == Some(true);
        (analysis, reuse, meme && reuse == Some(VisualReuse::Yes))
    } else {
        (None, None, false)
    };

    Some(ReasoningVerdict {
        trust_score: score.round() as u8,
        verdict,
        summary,
        evidence,
        visual_analysis,
        visual_reuse,
        meme_culture,
    })
}

/// Reasoning engine reached over an OpenAI-compatible chat completions API.
pub struct HttpReasoningEngine {
    client: Client,
    config: ReasoningConfig,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpReasoningEngine {
    pub fn new(config: ReasoningConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    fn payload(&self, request: &ReasoningRequest) -> Value {
        let user_content = match &request.image {
            Some(image) => json!([
                { "type": "text", "text": request.prompt },
                { "type": "image_url", "image_url": { "url": image.data_uri() } },
            ]),
            None => json!(request.prompt),
        };

        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": user_content },
            ],
        })
    }
}

#[async_trait]
impl ReasoningEngine for HttpReasoningEngine {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No reasoning API key configured"))?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&self.payload(request))
            .send()
            .await
            .context("Reasoning request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Reasoning endpoint returned {}", response.status()));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .context("Malformed chat completion")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Chat completion had no content"))
    }
}
