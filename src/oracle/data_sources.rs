//! Evidence sources for on-chain facts, market metrics, social links,
//! contract audits and creator history.
//!
//! Implementations return `anyhow::Result`; the investigator converts every
//! error into a neutral value at its boundary, so nothing here needs to be
//! defensive about partial outages beyond its own sub-fetches.

use crate::oracle::anomaly::AnomalyDetector;
use crate::oracle::rate_limit::OutboundThrottle;
use crate::oracle::types::{
    AuditReport, AuditRisk, CreatorHistory, HolderShare, InvestigatorConfig, MarketSnapshot,
    OnChainFacts, SocialLinks,
};
use crate::types::{Pubkey, TokenAddress};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey as SolPubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

/// SPL mint account length (the base layout shared by Token-2022).
const MINT_LEN: usize = 82;

/// Lifetime of a memoized pairs list or mint account, shared by the sources
/// of one investigation.
const SOURCE_MEMO_TTL: Duration = Duration::from_secs(15);
const SOURCE_MEMO_CAPACITY: u64 = 1_024;

/// Hosts that are social platforms or messaging links, never project websites.
const SOCIAL_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "t.me",
    "telegram.me",
    "telegram.org",
    "discord.gg",
    "discord.com",
    "instagram.com",
    "facebook.com",
    "tiktok.com",
    "youtube.com",
    "youtu.be",
    "reddit.com",
    "medium.com",
    "linktr.ee",
    "github.com",
    "pump.fun",
    "dexscreener.com",
    "birdeye.so",
];

/// Source of evidence about a token. One method per evidence category.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Cheap resolution of the creator identity (mint authority, else freeze
    /// authority). Gates the known-entity fast path.
    async fn resolve_creator(&self, address: &TokenAddress) -> Result<Option<Pubkey>>;

    async fn fetch_on_chain(&self, address: &TokenAddress) -> Result<OnChainFacts>;

    /// `None` when the token has no trading pair.
    async fn fetch_market(&self, address: &TokenAddress) -> Result<Option<MarketSnapshot>>;

    async fn fetch_social_links(&self, address: &TokenAddress) -> Result<SocialLinks>;

    /// `None` when the audit service has no report for the token.
    async fn fetch_audit(&self, address: &TokenAddress) -> Result<Option<AuditReport>>;

    async fn fetch_creator_history(&self, creator: &str) -> Result<CreatorHistory>;
}

/// Parsed base layout of an SPL mint account.
#[derive(Debug, Clone, PartialEq)]
pub struct MintLayout {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub freeze_authority: Option<Pubkey>,
}

impl MintLayout {
    /// Parse mint authority (0..36), supply (36..44), decimals (44) and
    /// freeze authority (46..82).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MINT_LEN {
            return Err(anyhow!("Invalid mint account data length {}", data.len()));
        }

        let supply = u64::from_le_bytes(data[36..44].try_into().context("Invalid supply data")?);

        Ok(Self {
            mint_authority: read_coption_pubkey(data, 0)?,
            supply,
            decimals: data[44],
            freeze_authority: read_coption_pubkey(data, 46)?,
        })
    }

    pub fn creator_identity(&self) -> Option<Pubkey> {
        self.mint_authority
            .clone()
            .or_else(|| self.freeze_authority.clone())
    }
}

fn read_coption_pubkey(data: &[u8], offset: usize) -> Result<Option<Pubkey>> {
    let tag = u32::from_le_bytes(data[offset..offset + 4].try_into()?);
    match tag {
        0 => Ok(None),
        1 => {
            let bytes: [u8; 32] = data[offset + 4..offset + 36].try_into()?;
            Ok(Some(SolPubkey::new_from_array(bytes).to_string()))
        }
        other => Err(anyhow!("Invalid COption tag {} at offset {}", other, offset)),
    }
}

/// Owner wallet of an SPL token account (bytes 32..64).
fn token_account_owner(data: &[u8]) -> Option<Pubkey> {
    let bytes: [u8; 32] = data.get(32..64)?.try_into().ok()?;
    Some(SolPubkey::new_from_array(bytes).to_string())
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

fn host_matches(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Whether a link points at a genuine project website worth capturing.
pub fn is_capturable_website(url: &str) -> bool {
    host_of(url)
        .map(|host| !host_matches(&host, SOCIAL_HOSTS))
        .unwrap_or(false)
}

/// Place a link into the right slot of `links`.
pub fn classify_link(links: &mut SocialLinks, url: &str, kind_hint: Option<&str>) {
    let host = host_of(url).unwrap_or_default();
    let kind = kind_hint.unwrap_or_default().to_ascii_lowercase();

    let slot = if kind == "twitter" || host_matches(&host, &["twitter.com", "x.com"]) {
        &mut links.twitter
    } else if kind == "telegram" || host_matches(&host, &["t.me", "telegram.me", "telegram.org"]) {
        &mut links.telegram
    } else if kind == "discord" || host_matches(&host, &["discord.gg", "discord.com"]) {
        &mut links.discord
    } else if is_capturable_website(url) {
        &mut links.website
    } else {
        if !links.other.iter().any(|o| o == url) {
            links.other.push(url.to_string());
        }
        return;
    };

    if slot.is_none() {
        *slot = Some(url.to_string());
    } else if slot.as_deref() != Some(url) && !links.other.iter().any(|o| o == url) {
        links.other.push(url.to_string());
    }
}

// --- Wire formats ---

#[derive(Debug, Deserialize)]
struct DexPairsResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    pair_address: Option<String>,
    dex_id: Option<String>,
    price_usd: Option<String>,
    liquidity: Option<DexLiquidity>,
    volume: Option<DexVolume>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
    txns: Option<DexTxns>,
    pair_created_at: Option<i64>,
    info: Option<DexInfo>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexVolume {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexTxns {
    h24: Option<DexTxnCount>,
}

#[derive(Debug, Deserialize)]
struct DexTxnCount {
    #[serde(default)]
    buys: u64,
    #[serde(default)]
    sells: u64,
}

#[derive(Debug, Deserialize)]
struct DexInfo {
    #[serde(default)]
    websites: Vec<DexWebsite>,
    #[serde(default)]
    socials: Vec<DexSocial>,
}

#[derive(Debug, Deserialize)]
struct DexWebsite {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DexSocial {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct AuditSummaryResponse {
    score_normalised: Option<f64>,
    #[serde(default)]
    risks: Vec<AuditRiskResponse>,
    #[serde(default)]
    rugged: bool,
}

#[derive(Debug, Deserialize)]
struct AuditRiskResponse {
    name: String,
    #[serde(default)]
    level: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreatorCoinsResponse {
    List(Vec<CreatorCoin>),
    Wrapped { coins: Vec<CreatorCoin> },
}

#[derive(Debug, Deserialize)]
struct CreatorCoin {
    mint: String,
    usd_market_cap: Option<f64>,
}

/// Evidence provider backed by Solana RPC and public HTTP APIs.
pub struct HttpEvidenceProvider {
    rpc: Arc<RpcClient>,
    http_client: Client,
    config: InvestigatorConfig,
    throttle: Arc<OutboundThrottle>,
    anomaly_detector: AnomalyDetector,
    /// Market and social links both read the pairs endpoint
    pairs_memo: Cache<String, Arc<Vec<DexPair>>>,
    /// Creator resolution and on-chain facts both read the mint account
    mint_memo: Cache<String, MintLayout>,
}

fn source_memo<V: Clone + Send + Sync + 'static>() -> Cache<String, V> {
    Cache::builder()
        .max_capacity(SOURCE_MEMO_CAPACITY)
        .time_to_live(SOURCE_MEMO_TTL)
        .build()
}

impl HttpEvidenceProvider {
    pub fn new(
        rpc: Arc<RpcClient>,
        http_client: Client,
        config: InvestigatorConfig,
        throttle: Arc<OutboundThrottle>,
    ) -> Self {
        let anomaly_detector = AnomalyDetector::new(config.thresholds.clone());
        Self {
            rpc,
            http_client,
            config,
            throttle,
            anomaly_detector,
            pairs_memo: source_memo(),
            mint_memo: source_memo(),
        }
    }

    /// Build the RPC and HTTP clients from configuration.
    pub fn from_config(
        config: InvestigatorConfig,
        throttle: Arc<OutboundThrottle>,
    ) -> Result<Self> {
        let rpc = Arc::new(RpcClient::new_with_timeout(
            config.rpc_endpoint.clone(),
            Duration::from_secs(config.rpc_timeout_seconds),
        ));
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.source_timeout_seconds))
            .user_agent(concat!("token-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(rpc, http_client, config, throttle))
    }

    fn mint_pubkey(address: &TokenAddress) -> Result<SolPubkey> {
        SolPubkey::from_str(address.as_str())
            .with_context(|| format!("{} is not a valid Solana address", address))
    }

    /// Mint account read, memoized so concurrent and back-to-back callers
    /// share one RPC round trip.
    #[instrument(skip(self), fields(mint = %mint))]
    async fn fetch_mint_layout(&self, mint: &SolPubkey) -> Result<MintLayout> {
        self.mint_memo
            .try_get_with(mint.to_string(), async {
                let retry_strategy = ExponentialBackoff::from_millis(100)
                    .max_delay(Duration::from_secs(2))
                    .take(self.config.rpc_retry_attempts);

                self.throttle.acquire().await;
                let account = Retry::spawn(retry_strategy, || self.rpc.get_account(mint))
                    .await
                    .context("Failed to fetch mint account")?;

                MintLayout::parse(&account.data)
            })
            .await
            .map_err(|e| anyhow!("{:#}", e))
    }

    #[instrument(skip(self, layout), fields(mint = %mint))]
    async fn fetch_top_holders(
        &self,
        mint: &SolPubkey,
        layout: &MintLayout,
    ) -> Result<Vec<HolderShare>> {
        self.throttle.acquire().await;
        let largest = self
            .rpc
            .get_token_largest_accounts(mint)
            .await
            .context("Failed to fetch token largest accounts")?;

        let scale = 10f64.powi(layout.decimals as i32);
        let mut holders: Vec<HolderShare> = largest
            .into_iter()
            .map(|account| {
                let raw = account.amount.amount.parse::<u64>().unwrap_or(0);
                let percentage = if layout.supply > 0 {
                    raw as f64 / layout.supply as f64 * 100.0
                } else {
                    0.0
                };
                HolderShare {
                    address: account.address,
                    owner: None,
                    amount: raw as f64 / scale,
                    percentage,
                }
            })
            .collect();

        // Resolve owning wallets so creator-held accounts can be attributed
        let keys: Vec<SolPubkey> = holders
            .iter()
            .filter_map(|h| SolPubkey::from_str(&h.address).ok())
            .collect();
        if keys.len() == holders.len() && !keys.is_empty() {
            self.throttle.acquire().await;
            match self.rpc.get_multiple_accounts(&keys).await {
                Ok(accounts) => {
                    for (holder, account) in holders.iter_mut().zip(accounts) {
                        holder.owner = account.and_then(|a| token_account_owner(&a.data));
                    }
                }
                Err(e) => warn!("Failed to resolve holder owners: {}", e),
            }
        }

        holders.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        debug!("Fetched {} holders", holders.len());
        Ok(holders)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.throttle.acquire().await;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            return Err(anyhow!("Request to {} returned {}", url, response.status()));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Malformed payload from {url}"))
    }

    /// Pairs for a token, memoized so the market and social sources share
    /// one request and one outbound permit.
    async fn fetch_pairs(&self, address: &TokenAddress) -> Result<Arc<Vec<DexPair>>> {
        self.pairs_memo
            .try_get_with(address.to_string(), async {
                let url = self.config.market_api_url.replace("{address}", address.as_str());
                let response: DexPairsResponse = self.get_json(&url).await?;
                Ok::<_, anyhow::Error>(Arc::new(response.pairs.unwrap_or_default()))
            })
            .await
            .map_err(|e| anyhow!("{:#}", e))
    }

    fn snapshot_from_pair(&self, pair: &DexPair) -> MarketSnapshot {
        let counts = pair.txns.as_ref().and_then(|t| t.h24.as_ref());
        let pool_age_hours = pair.pair_created_at.map(|created_ms| {
            let now_ms = chrono::Utc::now().timestamp_millis();
            (now_ms - created_ms).max(0) as f64 / 3_600_000.0
        });

        let mut snapshot = MarketSnapshot {
            pair_address: pair.pair_address.clone(),
            dex_id: pair.dex_id.clone(),
            price_usd: pair
                .price_usd
                .as_deref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
            volume_24h_usd: pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0),
            market_cap_usd: pair.market_cap.or(pair.fdv).unwrap_or(0.0),
            buys_24h: counts.map(|c| c.buys).unwrap_or(0),
            sells_24h: counts.map(|c| c.sells).unwrap_or(0),
            pool_age_hours,
            ..MarketSnapshot::default()
        };
        self.anomaly_detector.annotate(&mut snapshot);
        snapshot
    }
}

#[async_trait]
impl EvidenceProvider for HttpEvidenceProvider {
    #[instrument(skip(self), fields(mint = %address))]
    async fn resolve_creator(&self, address: &TokenAddress) -> Result<Option<Pubkey>> {
        let mint = Self::mint_pubkey(address)?;
        let layout = self.fetch_mint_layout(&mint).await?;
        Ok(layout.creator_identity())
    }

    #[instrument(skip(self), fields(mint = %address))]
    async fn fetch_on_chain(&self, address: &TokenAddress) -> Result<OnChainFacts> {
        let mint = Self::mint_pubkey(address)?;
        let layout = self.fetch_mint_layout(&mint).await?;

        let top_holders = self
            .fetch_top_holders(&mint, &layout)
            .await
            .unwrap_or_else(|e| {
                warn!("Holder distribution unavailable for {}: {:#}", address, e);
                Vec::new()
            });

        Ok(OnChainFacts {
            mint: address.to_string(),
            decimals: layout.decimals,
            raw_supply: layout.supply,
            supply: layout.supply as f64 / 10f64.powi(layout.decimals as i32),
            mint_authority: layout.mint_authority,
            freeze_authority: layout.freeze_authority,
            top_holders,
        })
    }

    #[instrument(skip(self), fields(mint = %address))]
    async fn fetch_market(&self, address: &TokenAddress) -> Result<Option<MarketSnapshot>> {
        let pairs = self.fetch_pairs(address).await?;
        let best = pairs.iter().max_by(|a, b| {
            let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            la.total_cmp(&lb)
        });

        Ok(best.map(|pair| self.snapshot_from_pair(pair)))
    }

    #[instrument(skip(self), fields(mint = %address))]
    async fn fetch_social_links(&self, address: &TokenAddress) -> Result<SocialLinks> {
        let pairs = self.fetch_pairs(address).await?;
        let mut links = SocialLinks::default();

        for info in pairs.iter().filter_map(|p| p.info.as_ref()) {
            for site in &info.websites {
                classify_link(&mut links, &site.url, None);
            }
            for social in &info.socials {
                classify_link(&mut links, &social.url, social.kind.as_deref());
            }
        }

        debug!("Resolved social links: website={:?}", links.website);
        Ok(links)
    }

    #[instrument(skip(self), fields(mint = %address))]
    async fn fetch_audit(&self, address: &TokenAddress) -> Result<Option<AuditReport>> {
        let url = self.config.audit_api_url.replace("{address}", address.as_str());
        let response: AuditSummaryResponse = self.get_json(&url).await?;

        let Some(normalised) = response.score_normalised else {
            return Ok(None);
        };

        Ok(Some(AuditReport {
            risk_score: normalised.clamp(0.0, 100.0).round() as u32,
            risks: response
                .risks
                .into_iter()
                .map(|r| AuditRisk {
                    name: r.name,
                    level: r.level,
                    description: r.description,
                })
                .collect(),
            rugged: response.rugged,
        }))
    }

    #[instrument(skip(self))]
    async fn fetch_creator_history(&self, creator: &str) -> Result<CreatorHistory> {
        let url = self.config.creator_history_api_url.replace("{creator}", creator);
        let coins = match self.get_json::<CreatorCoinsResponse>(&url).await? {
            CreatorCoinsResponse::List(coins) => coins,
            CreatorCoinsResponse::Wrapped { coins } => coins,
        };

        let floor = self.config.thresholds.dead_token_market_cap_usd;
        let dead_tokens = coins
            .iter()
            .filter(|c| c.usd_market_cap.unwrap_or(0.0) < floor)
            .count() as u32;

        Ok(CreatorHistory {
            creator: creator.to_string(),
            tokens_created: coins.len() as u32,
            dead_tokens,
            recent_tokens: coins.into_iter().take(10).map(|c| c.mint).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAIRS_BODY: &str = r#"{"pairs": [{
        "pairAddress": "Pair111",
        "liquidity": { "usd": 50000.0 },
        "marketCap": 2000000.0,
        "info": { "websites": [{ "url": "https://project.fun" }], "socials": [] }
    }]}"#;

    /// Serve `body` as JSON on a local port, counting requests.
    async fn serve_json(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn local_provider(market_api_url: String) -> HttpEvidenceProvider {
        let config = InvestigatorConfig {
            market_api_url,
            ..InvestigatorConfig::default()
        };
        HttpEvidenceProvider::from_config(config, Arc::new(OutboundThrottle::new(100))).unwrap()
    }

    #[tokio::test]
    async fn test_market_and_socials_share_one_pairs_request() {
        let (base, hits) = serve_json(PAIRS_BODY).await;
        let provider = local_provider(format!("{base}/tokens/{{address}}"));
        let address = TokenAddress::parse("So11111111111111111111111111111111111111112").unwrap();

        let (market, socials) = tokio::join!(
            provider.fetch_market(&address),
            provider.fetch_social_links(&address)
        );
        let market = market.unwrap().unwrap();
        assert_eq!(market.liquidity_usd, 50_000.0);
        assert_eq!(socials.unwrap().website.as_deref(), Some("https://project.fun"));

        // A later read inside the memo window is free as well
        provider.fetch_market(&address).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_pairs_fetch_is_not_memoized() {
        let provider = local_provider("http://127.0.0.1:9/tokens/{address}".to_string());
        let address = TokenAddress::parse("So11111111111111111111111111111111111111112").unwrap();

        assert!(provider.fetch_market(&address).await.is_err());
        assert!(provider.fetch_social_links(&address).await.is_err());
        assert_eq!(provider.pairs_memo.entry_count(), 0);
    }

    fn mint_data(
        mint_auth: Option<[u8; 32]>,
        supply: u64,
        decimals: u8,
        freeze: Option<[u8; 32]>,
    ) -> Vec<u8> {
        let mut data = vec![0u8; MINT_LEN];
        if let Some(key) = mint_auth {
            data[0..4].copy_from_slice(&1u32.to_le_bytes());
            data[4..36].copy_from_slice(&key);
        }
        data[36..44].copy_from_slice(&supply.to_le_bytes());
        data[44] = decimals;
        data[45] = 1;
        if let Some(key) = freeze {
            data[46..50].copy_from_slice(&1u32.to_le_bytes());
            data[50..82].copy_from_slice(&key);
        }
        data
    }

    #[test]
    fn test_parse_mint_with_authorities() {
        let data = mint_data(Some([7u8; 32]), 1_000_000_000, 6, Some([9u8; 32]));
        let layout = MintLayout::parse(&data).unwrap();

        assert_eq!(layout.supply, 1_000_000_000);
        assert_eq!(layout.decimals, 6);
        assert_eq!(
            layout.mint_authority,
            Some(SolPubkey::new_from_array([7u8; 32]).to_string())
        );
        assert_eq!(
            layout.freeze_authority,
            Some(SolPubkey::new_from_array([9u8; 32]).to_string())
        );
        assert_eq!(layout.creator_identity(), layout.mint_authority);
    }

    #[test]
    fn test_parse_renounced_mint() {
        let data = mint_data(None, 42, 9, None);
        let layout = MintLayout::parse(&data).unwrap();
        assert_eq!(layout.mint_authority, None);
        assert_eq!(layout.freeze_authority, None);
        assert_eq!(layout.creator_identity(), None);
    }

    #[test]
    fn test_creator_falls_back_to_freeze_authority() {
        let data = mint_data(None, 42, 9, Some([3u8; 32]));
        let layout = MintLayout::parse(&data).unwrap();
        assert_eq!(layout.creator_identity(), layout.freeze_authority);
    }

    #[test]
    fn test_parse_rejects_short_or_corrupt_data() {
        assert!(MintLayout::parse(&[0u8; 40]).is_err());

        let mut data = mint_data(None, 1, 0, None);
        data[0..4].copy_from_slice(&7u32.to_le_bytes());
        assert!(MintLayout::parse(&data).is_err());
    }

    #[test]
    fn test_token_account_owner() {
        let mut data = vec![0u8; 165];
        data[32..64].copy_from_slice(&[5u8; 32]);
        assert_eq!(
            token_account_owner(&data),
            Some(SolPubkey::new_from_array([5u8; 32]).to_string())
        );
        assert_eq!(token_account_owner(&[0u8; 10]), None);
    }

    #[test]
    fn test_capturable_websites() {
        assert!(is_capturable_website("https://coolproject.io"));
        assert!(is_capturable_website("http://www.coolproject.io/about"));
        assert!(!is_capturable_website("https://x.com/coolproject"));
        assert!(!is_capturable_website("https://twitter.com/coolproject"));
        assert!(!is_capturable_website("https://t.me/coolproject"));
        assert!(!is_capturable_website("https://discord.gg/abc"));
        assert!(!is_capturable_website("https://mobile.twitter.com/abc"));
        assert!(!is_capturable_website("ftp://coolproject.io"));
        assert!(!is_capturable_website("not a url"));
    }

    #[test]
    fn test_classify_links() {
        let mut links = SocialLinks::default();
        classify_link(&mut links, "https://t.me/project", None);
        classify_link(&mut links, "https://x.com/project", Some("twitter"));
        classify_link(&mut links, "https://project.fun", None);
        classify_link(&mut links, "https://project-mirror.fun", None);
        classify_link(&mut links, "https://linktr.ee/project", None);

        assert_eq!(links.telegram.as_deref(), Some("https://t.me/project"));
        assert_eq!(links.twitter.as_deref(), Some("https://x.com/project"));
        assert_eq!(links.website.as_deref(), Some("https://project.fun"));
        assert_eq!(
            links.other,
            vec!["https://project-mirror.fun".to_string(), "https://linktr.ee/project".to_string()]
        );
    }

    #[test]
    fn test_telegram_website_never_becomes_project_site() {
        let mut links = SocialLinks::default();
        classify_link(&mut links, "https://t.me/only_link", None);
        assert!(links.website.is_none());
    }

    #[test]
    fn test_dex_payload_parses() {
        let payload = r#"{
            "pairs": [{
                "pairAddress": "Pair111",
                "dexId": "raydium",
                "priceUsd": "0.0012",
                "liquidity": { "usd": 50000.0 },
                "volume": { "h24": 120000.0 },
                "marketCap": 2000000.0,
                "txns": { "h24": { "buys": 300, "sells": 250 } },
                "pairCreatedAt": 1700000000000,
                "info": {
                    "websites": [{ "label": "Website", "url": "https://project.fun" }],
                    "socials": [{ "type": "twitter", "url": "https://x.com/project" }]
                }
            }]
        }"#;
        let parsed: DexPairsResponse = serde_json::from_str(payload).unwrap();
        let pairs = parsed.pairs.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].liquidity.as_ref().unwrap().usd, Some(50000.0));
        assert_eq!(pairs[0].info.as_ref().unwrap().socials[0].kind.as_deref(), Some("twitter"));
    }

    #[test]
    fn test_creator_coins_payload_shapes() {
        let list: CreatorCoinsResponse =
            serde_json::from_str(r#"[{"mint":"A","usd_market_cap":10.0}]"#).unwrap();
        assert!(matches!(list, CreatorCoinsResponse::List(ref c) if c.len() == 1));

        let wrapped: CreatorCoinsResponse =
            serde_json::from_str(r#"{"coins":[{"mint":"A"},{"mint":"B"}]}"#).unwrap();
        assert!(matches!(wrapped, CreatorCoinsResponse::Wrapped { ref coins } if coins.len() == 2));
    }
}
