//! Deterministic trust scoring and score combination.
//!
//! The deterministic score is a rule-based ceiling computed from verified
//! facts only. The reasoning engine's opinion is combined with it under a
//! "can only lower" rule: the published score is never above either input.

use crate::oracle::types::{
    AuditReport, CreatorStatus, MarketSnapshot, OnChainFacts, ReasoningVerdict, ScoreThresholds,
};
use crate::types::{Verdict, VisualReuse};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Highest score a token can reach on facts alone.
pub const DETERMINISTIC_CEILING: u8 = 88;
/// Cap applied when captured imagery shows non-meme template reuse.
pub const VISUAL_REUSE_CAP: u8 = 50;

const AUTHORITY_PENALTY: i32 = 40;
const HIGH_CONCENTRATION_PENALTY: i32 = 15;
const MODERATE_CONCENTRATION_PENALTY: i32 = 10;
const DUMPED_CREATOR_PENALTY: i32 = 15;
const WHALE_CREATOR_PENALTY: i32 = 10;
const LIQUIDITY_PENALTY: i32 = 20;
const YOUNG_POOL_PENALTY: i32 = 10;
const AUDIT_HIGH_PENALTY: i32 = 20;
const AUDIT_MODERATE_PENALTY: i32 = 10;

/// A single deduction applied by the deterministic engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub points: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub score: u8,
    pub penalties: Vec<Penalty>,
}

pub struct DeterministicScorer {
    thresholds: ScoreThresholds,
}

impl DeterministicScorer {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self { thresholds }
    }

    /// Rule-based trust ceiling in `0..=88`.
    pub fn score(
        &self,
        facts: Option<&OnChainFacts>,
        market: Option<&MarketSnapshot>,
        creator: &CreatorStatus,
        audit: Option<&AuditReport>,
        pool_age_hours: Option<f64>,
    ) -> u8 {
        self.breakdown(facts, market, creator, audit, pool_age_hours).score
    }

    #[instrument(skip_all)]
    pub fn breakdown(
        &self,
        facts: Option<&OnChainFacts>,
        market: Option<&MarketSnapshot>,
        creator: &CreatorStatus,
        audit: Option<&AuditReport>,
        pool_age_hours: Option<f64>,
    ) -> ScoreBreakdown {
        let t = &self.thresholds;
        let mut penalties = Vec::new();
        let mut deduct = |points: i32, reason: String| {
            penalties.push(Penalty {
                points: points as u8,
                reason,
            });
        };

        match facts {
            Some(facts) => {
                if facts.mint_authority.is_some() {
                    deduct(AUTHORITY_PENALTY, "Mint authority is enabled".to_string());
                }
                if facts.freeze_authority.is_some() {
                    deduct(AUTHORITY_PENALTY, "Freeze authority is enabled".to_string());
                }

                let top10 = facts.top10_concentration();
                if top10 > t.high_concentration_pct {
                    deduct(
                        HIGH_CONCENTRATION_PENALTY,
                        format!("Top 10 holders own {top10:.1}% of supply"),
                    );
                } else if top10 > t.moderate_concentration_pct {
                    deduct(
                        MODERATE_CONCENTRATION_PENALTY,
                        format!("Top 10 holders own {top10:.1}% of supply"),
                    );
                }
            }
            None => deduct(
                AUTHORITY_PENALTY,
                "On-chain facts could not be verified".to_string(),
            ),
        }

        if creator.is_dumped {
            deduct(DUMPED_CREATOR_PENALTY, "Creator has dumped their allocation".to_string());
        } else if creator.is_whale {
            let pct = creator.percentage.unwrap_or_default();
            deduct(WHALE_CREATOR_PENALTY, format!("Creator holds {pct:.1}% of supply"));
        }

        let liquidity = market.map(|m| m.liquidity_usd).unwrap_or(0.0);
        let market_cap = market.map(|m| m.market_cap_usd).unwrap_or(0.0);
        if liquidity < t.min_liquidity_usd {
            deduct(LIQUIDITY_PENALTY, format!("Liquidity ${liquidity:.0} is below the floor"));
        } else if market_cap > 0.0 && liquidity / market_cap < t.min_liquidity_to_cap_ratio {
            deduct(
                LIQUIDITY_PENALTY,
                format!(
                    "Liquidity is only {:.2}% of market cap",
                    liquidity / market_cap * 100.0
                ),
            );
        }

        if let Some(age) = pool_age_hours {
            if age < t.young_pool_hours {
                deduct(YOUNG_POOL_PENALTY, format!("Pool is {age:.1}h old"));
            }
        }

        if let Some(audit) = audit {
            if audit.rugged || audit.risk_score >= t.audit_high_risk {
                deduct(
                    AUDIT_HIGH_PENALTY,
                    format!("Audit risk score {} is high", audit.risk_score),
                );
            } else if audit.risk_score >= t.audit_moderate_risk {
                deduct(
                    AUDIT_MODERATE_PENALTY,
                    format!("Audit risk score {} is elevated", audit.risk_score),
                );
            }
        }

        let total: i32 = penalties.iter().map(|p| p.points as i32).sum();
        let score = (100 - total).clamp(0, DETERMINISTIC_CEILING as i32) as u8;

        debug!("Deterministic score {} ({} penalties)", score, penalties.len());
        ScoreBreakdown { score, penalties }
    }
}

/// `min(deterministic, reasoning)`, or the deterministic score alone when the
/// reasoning engine produced nothing usable.
pub fn combine(deterministic: u8, reasoning: Option<u8>) -> u8 {
    deterministic.min(reasoning.unwrap_or(deterministic))
}

/// Whether the engine judged the reuse to be meme culture. Only the
/// structured `meme_culture` flag counts; free text is never consulted.
pub fn is_meme_culture_reuse(verdict: &ReasoningVerdict) -> bool {
    verdict.visual_reuse == Some(VisualReuse::Yes) && verdict.meme_culture
}

/// Cap the published score at 50 when visual evidence exists and shows
/// template reuse not attributable to meme culture.
///
/// Returns the (possibly capped) score and whether the override fired.
pub fn apply_visual_override(
    published: u8,
    visual_present: bool,
    reasoning: Option<&ReasoningVerdict>,
) -> (u8, bool) {
    let fires = visual_present
        && reasoning
            .map(|r| r.visual_reuse == Some(VisualReuse::Yes) && !is_meme_culture_reuse(r))
            .unwrap_or(false);

    if fires {
        (published.min(VISUAL_REUSE_CAP), true)
    } else {
        (published, false)
    }
}

/// Final verdict bucket. Without a reasoning verdict the result is never
/// better than Caution.
pub fn assign_verdict(published: u8, reasoning_available: bool) -> Verdict {
    let verdict = Verdict::from_score(published);
    if !reasoning_available && verdict == Verdict::Safe {
        Verdict::Caution
    } else {
        verdict
    }
}
