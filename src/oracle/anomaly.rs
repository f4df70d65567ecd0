//! Anomaly detection for market behaviour.
//!
//! Derives the wash-trade ratio, the bot-activity tier and human-readable
//! anomaly strings from raw pair metrics. All derivations treat zero
//! liquidity as zero risk so empty pools never produce division artifacts.

use crate::oracle::types::{BotActivity, MarketSnapshot, ScoreThresholds};
use std::fmt;
use tracing::{debug, instrument};

const HIGH_WASH_RATIO: f64 = 10.0;
const MEDIUM_WASH_RATIO: f64 = 5.0;
const BOT_TXN_FLOOR: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum MarketAnomaly {
    /// Volume far exceeds what the pool could organically support
    WashTrading { ratio: f64 },
    /// Buys massively outnumber sells (or vice versa)
    OrderImbalance { buy_sell_ratio: f64 },
    /// Pool created less than the young-pool threshold ago
    FreshPool { age_hours: f64 },
    /// Liquidity below the configured floor
    ThinLiquidity { liquidity_usd: f64 },
}

impl fmt::Display for MarketAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketAnomaly::WashTrading { ratio } => {
                write!(f, "Wash trading suspected: 24h volume is {ratio:.1}x liquidity")
            }
            MarketAnomaly::OrderImbalance { buy_sell_ratio } => {
                write!(f, "Extreme order imbalance: buy/sell ratio {buy_sell_ratio:.2}")
            }
            MarketAnomaly::FreshPool { age_hours } => {
                write!(f, "Pool is only {:.0} minutes old", age_hours * 60.0)
            }
            MarketAnomaly::ThinLiquidity { liquidity_usd } => {
                write!(f, "Liquidity of ${liquidity_usd:.0} is below the safety floor")
            }
        }
    }
}

pub struct AnomalyDetector {
    thresholds: ScoreThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self { thresholds }
    }

    /// Fill in the derived fields of a snapshot from its raw metrics.
    #[instrument(skip(self, snapshot))]
    pub fn annotate(&self, snapshot: &mut MarketSnapshot) {
        snapshot.buy_sell_ratio = buy_sell_ratio(snapshot.buys_24h, snapshot.sells_24h);
        snapshot.wash_trade_ratio =
            wash_trade_ratio(snapshot.volume_24h_usd, snapshot.liquidity_usd);
        snapshot.bot_activity = self.classify_bot_activity(snapshot);
        snapshot.anomalies = self
            .identify_all_anomalies(snapshot)
            .iter()
            .map(ToString::to_string)
            .collect();

        debug!(
            "Market annotated: wash={:.2} bots={:?} anomalies={}",
            snapshot.wash_trade_ratio,
            snapshot.bot_activity,
            snapshot.anomalies.len()
        );
    }

    pub fn classify_bot_activity(&self, snapshot: &MarketSnapshot) -> BotActivity {
        if snapshot.liquidity_usd <= 0.0 {
            return BotActivity::Low;
        }

        let wash = snapshot.wash_trade_ratio;
        let ratio = snapshot.buy_sell_ratio;
        let txns = snapshot.buys_24h + snapshot.sells_24h;
        let lopsided = |limit: f64| ratio > limit || ratio < 1.0 / limit;

        if wash > HIGH_WASH_RATIO || (txns >= BOT_TXN_FLOOR && lopsided(4.0)) {
            BotActivity::High
        } else if wash > MEDIUM_WASH_RATIO || lopsided(2.0) {
            BotActivity::Medium
        } else {
            BotActivity::Low
        }
    }

    pub fn identify_all_anomalies(&self, snapshot: &MarketSnapshot) -> Vec<MarketAnomaly> {
        let mut anomalies = Vec::new();

        if snapshot.liquidity_usd > 0.0 && snapshot.wash_trade_ratio > MEDIUM_WASH_RATIO {
            anomalies.push(MarketAnomaly::WashTrading {
                ratio: snapshot.wash_trade_ratio,
            });
        }

        let ratio = snapshot.buy_sell_ratio;
        if snapshot.liquidity_usd > 0.0 && (ratio > 4.0 || ratio < 0.25) {
            anomalies.push(MarketAnomaly::OrderImbalance { buy_sell_ratio: ratio });
        }

        if let Some(age_hours) = snapshot.pool_age_hours {
            if age_hours < self.thresholds.young_pool_hours {
                anomalies.push(MarketAnomaly::FreshPool { age_hours });
            }
        }

        if snapshot.liquidity_usd < self.thresholds.min_liquidity_usd {
            anomalies.push(MarketAnomaly::ThinLiquidity {
                liquidity_usd: snapshot.liquidity_usd,
            });
        }

        anomalies
    }
}

pub fn wash_trade_ratio(volume_usd: f64, liquidity_usd: f64) -> f64 {
    if liquidity_usd > 0.0 {
        volume_usd / liquidity_usd
    } else {
        0.0
    }
}

/// Buys per sell; a market with buys and no sells reports the buy count.
pub fn buy_sell_ratio(buys: u64, sells: u64) -> f64 {
    match (buys, sells) {
        (0, 0) => 1.0,
        (b, 0) => b as f64,
        (b, s) => b as f64 / s as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(liquidity: f64, volume: f64, buys: u64, sells: u64) -> MarketSnapshot {
        MarketSnapshot {
            liquidity_usd: liquidity,
            volume_24h_usd: volume,
            market_cap_usd: liquidity * 20.0,
            buys_24h: buys,
            sells_24h: sells,
            pool_age_hours: Some(48.0),
            ..MarketSnapshot::default()
        }
    }

    #[test]
    fn test_zero_liquidity_is_zero_risk() {
        let detector = AnomalyDetector::new(ScoreThresholds::default());
        let mut snap = snapshot(0.0, 1_000_000.0, 900, 10);
        detector.annotate(&mut snap);

        assert_eq!(snap.wash_trade_ratio, 0.0);
        assert_eq!(snap.bot_activity, BotActivity::Low);
        assert!(!snap.anomalies.iter().any(|a| a.contains("Wash")));
        assert!(!snap.anomalies.iter().any(|a| a.contains("imbalance")));
    }

    #[test]
    fn test_wash_trading_is_high_bot_activity() {
        let detector = AnomalyDetector::new(ScoreThresholds::default());
        let mut snap = snapshot(10_000.0, 150_000.0, 100, 100);
        detector.annotate(&mut snap);

        assert!((snap.wash_trade_ratio - 15.0).abs() < 1e-9);
        assert_eq!(snap.bot_activity, BotActivity::High);
        assert!(snap.anomalies.iter().any(|a| a.starts_with("Wash trading")));
    }

    #[test]
    fn test_lopsided_orders_medium() {
        let detector = AnomalyDetector::new(ScoreThresholds::default());
        let mut snap = snapshot(50_000.0, 60_000.0, 90, 30);
        detector.annotate(&mut snap);
        assert_eq!(snap.bot_activity, BotActivity::Medium);
    }

    #[test]
    fn test_healthy_market_has_no_anomalies() {
        let detector = AnomalyDetector::new(ScoreThresholds::default());
        let mut snap = snapshot(50_000.0, 80_000.0, 120, 100);
        detector.annotate(&mut snap);

        assert_eq!(snap.bot_activity, BotActivity::Low);
        assert!(snap.anomalies.is_empty());
    }

    #[test]
    fn test_fresh_pool_and_thin_liquidity() {
        let detector = AnomalyDetector::new(ScoreThresholds::default());
        let mut snap = snapshot(1_000.0, 500.0, 5, 5);
        snap.pool_age_hours = Some(0.5);
        let anomalies = {
            detector.annotate(&mut snap);
            detector.identify_all_anomalies(&snap)
        };

        assert!(anomalies.contains(&MarketAnomaly::FreshPool { age_hours: 0.5 }));
        assert!(anomalies.contains(&MarketAnomaly::ThinLiquidity { liquidity_usd: 1_000.0 }));
        assert_eq!(snap.anomalies[0], "Pool is only 30 minutes old");
    }

    #[test]
    fn test_buy_sell_ratio_edges() {
        assert_eq!(buy_sell_ratio(0, 0), 1.0);
        assert_eq!(buy_sell_ratio(7, 0), 7.0);
        assert_eq!(buy_sell_ratio(3, 6), 0.5);
    }
}
