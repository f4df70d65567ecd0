//! Visual evidence capture for project websites.
//!
//! Providers are tried in order, each under its own deadline. The first image
//! wins; a chain where every provider fails yields no evidence rather than an
//! error. Captured images may optionally be retained on disk with age-based
//! cleanup.

use crate::oracle::circuit_breaker::CircuitBreaker;
use crate::oracle::rate_limit::OutboundThrottle;
use crate::oracle::types::{CaptureProviderConfig, VisualEvidence};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use nonempty::NonEmpty;
use reqwest::{header::CONTENT_TYPE, Client};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

const RETENTION_NAME_ATTEMPTS: usize = 5;
/// Upper bound on cleanup plus write of one retained screenshot.
pub const DEFAULT_RETENTION_DEADLINE: Duration = Duration::from_secs(2);

/// Raw image returned by a capture provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn capture(&self, url: &str) -> Result<CapturedImage>;
}

/// Screenshot service reached through a URL template containing `{url}`.
pub struct HttpCaptureProvider {
    name: String,
    url_template: String,
    api_key: Option<String>,
    client: Client,
    throttle: Option<Arc<OutboundThrottle>>,
}

impl HttpCaptureProvider {
    pub fn new(config: &CaptureProviderConfig, client: Client) -> Self {
        Self {
            name: config.name.clone(),
            url_template: config.url_template.clone(),
            api_key: config.api_key.clone(),
            client,
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<OutboundThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    fn request_url(&self, target: &str) -> String {
        self.url_template.replace("{url}", &encode_component(target))
    }
}

#[async_trait]
impl CaptureProvider for HttpCaptureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&self, url: &str) -> Result<CapturedImage> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let mut request = self.client.get(self.request_url(url));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} returned {}", self.name, response.status()));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !media_type.starts_with("image/") {
            return Err(anyhow!(
                "{} returned non-image content type '{}'",
                self.name,
                media_type
            ));
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(anyhow!("{} returned an empty image", self.name));
        }

        Ok(CapturedImage { bytes, media_type })
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// A provider paired with its deadline.
#[derive(Clone)]
pub struct CaptureStrategy {
    pub provider: Arc<dyn CaptureProvider>,
    pub deadline: Duration,
}

impl CaptureStrategy {
    pub fn new(provider: Arc<dyn CaptureProvider>, deadline: Duration) -> Self {
        Self { provider, deadline }
    }
}

/// On-disk retention of captured screenshots.
#[derive(Debug, Clone)]
pub struct ScreenshotRetention {
    dir: PathBuf,
    max_age: Duration,
    save_deadline: Duration,
}

impl ScreenshotRetention {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
            save_deadline: DEFAULT_RETENTION_DEADLINE,
        }
    }

    pub fn with_save_deadline(mut self, deadline: Duration) -> Self {
        self.save_deadline = deadline;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete retained files older than the maximum age.
    pub async fn cleanup(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age > self.max_age {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Removed {} expired screenshots", removed);
        }
        Ok(removed)
    }

    /// Write an image under a fresh, collision-free name.
    pub async fn save(&self, image: &CapturedImage) -> Result<PathBuf> {
        if let Err(e) = self.cleanup().await {
            warn!("Screenshot cleanup failed: {:#}", e);
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let ext = extension_for(&image.media_type);
        for _ in 0..RETENTION_NAME_ATTEMPTS {
            let name = format!(
                "{}-{:016x}.{}",
                chrono::Utc::now().timestamp_millis(),
                rand::random::<u64>(),
                ext
            );
            let path = self.dir.join(name);

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&image.bytes).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow!("Could not allocate a unique screenshot name"))
    }
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

pub struct VisualEvidenceCapturer {
    chain: NonEmpty<CaptureStrategy>,
    health: Mutex<CircuitBreaker>,
    retention: Option<ScreenshotRetention>,
}

impl VisualEvidenceCapturer {
    pub fn new(
        chain: NonEmpty<CaptureStrategy>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            chain,
            health: Mutex::new(CircuitBreaker::new(failure_threshold, cooldown)),
            retention: None,
        }
    }

    /// Build the HTTP provider chain from configuration. Returns `None` when
    /// no providers are configured.
    pub fn from_configs(
        configs: &[CaptureProviderConfig],
        client: Client,
        throttle: Arc<OutboundThrottle>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Option<Self> {
        let strategies: Vec<CaptureStrategy> = configs
            .iter()
            .map(|config| {
                let provider = HttpCaptureProvider::new(config, client.clone())
                    .with_throttle(throttle.clone());
                let deadline = Duration::from_secs(config.timeout_seconds);
                CaptureStrategy::new(Arc::new(provider), deadline)
            })
            .collect();

        NonEmpty::from_vec(strategies).map(|chain| Self::new(chain, failure_threshold, cooldown))
    }

    pub fn with_retention(mut self, retention: ScreenshotRetention) -> Self {
        self.retention = Some(retention);
        self
    }

    fn is_available(&self, provider: &str) -> bool {
        self.health
            .lock()
            .map(|mut breaker| breaker.is_available(provider))
            .unwrap_or(true)
    }

    fn record(&self, provider: &str, success: bool) {
        if let Ok(mut breaker) = self.health.lock() {
            if success {
                breaker.record_success(provider);
            } else {
                breaker.record_failure(provider);
            }
        }
    }

    /// Retention is best effort and bounded; a slow disk never holds up the
    /// captured evidence.
    async fn retain(
        &self,
        retention: &ScreenshotRetention,
        image: &CapturedImage,
    ) -> Option<PathBuf> {
        match timeout(retention.save_deadline, retention.save(image)).await {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                warn!("Failed to retain screenshot: {:#}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Retaining screenshot in {} timed out after {:?}",
                    retention.dir().display(),
                    retention.save_deadline
                );
                None
            }
        }
    }

    /// Capture a screenshot of `url`. Only project websites are captured;
    /// social profiles and messaging links yield `None` without any request.
    #[instrument(skip(self))]
    pub async fn capture(&self, url: &str, is_project_website: bool) -> Option<VisualEvidence> {
        if !is_project_website {
            debug!("Skipping capture of non-website link {}", url);
            return None;
        }

        for strategy in self.chain.iter() {
            let name = strategy.provider.name();
            if !self.is_available(name) {
                debug!("Capture provider {} is cooling down, skipping", name);
                continue;
            }

            let image = match timeout(strategy.deadline, strategy.provider.capture(url)).await {
                Ok(Ok(image)) => image,
                Ok(Err(e)) => {
                    warn!("Capture provider {} failed for {}: {:#}", name, url, e);
                    self.record(name, false);
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Capture provider {} timed out after {:?} for {}",
                        name, strategy.deadline, url
                    );
                    self.record(name, false);
                    continue;
                }
            };
            self.record(name, true);

            let retained_path = match &self.retention {
                Some(retention) => self.retain(retention, &image).await,
                None => None,
            };

            info!("Captured {} via {} ({} bytes)", url, name, image.bytes.len());
            return Some(VisualEvidence {
                image_base64: STANDARD.encode(&image.bytes),
                media_type: image.media_type,
                source_url: url.to_string(),
                provider: name.to_string(),
                retained_path,
            });
        }

        warn!("All capture providers failed for {}", url);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    struct ScriptedProvider {
        name: String,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CaptureProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn capture(&self, _url: &str) -> Result<CapturedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed => Ok(CapturedImage {
                    bytes: vec![0x89, b'P', b'N', b'G'],
                    media_type: "image/png".to_string(),
                }),
                Behaviour::Fail => Err(anyhow!("service unavailable")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(anyhow!("unreachable"))
                }
            }
        }
    }

    fn capturer(providers: Vec<Arc<ScriptedProvider>>) -> VisualEvidenceCapturer {
        let strategies: Vec<CaptureStrategy> = providers
            .into_iter()
            .map(|p| CaptureStrategy::new(p as Arc<dyn CaptureProvider>, Duration::from_millis(50)))
            .collect();
        VisualEvidenceCapturer::new(
            NonEmpty::from_vec(strategies).unwrap(),
            2,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_fallback_after_primary_timeout() {
        let primary = ScriptedProvider::new("primary", Behaviour::Hang);
        let fallback = ScriptedProvider::new("fallback", Behaviour::Succeed);
        let capturer = capturer(vec![primary.clone(), fallback.clone()]);

        let evidence = capturer.capture("https://project.example", true).await.unwrap();
        assert_eq!(evidence.provider, "fallback");
        assert_eq!(evidence.media_type, "image/png");
        assert_eq!(evidence.image_base64, STANDARD.encode([0x89, b'P', b'N', b'G']));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failing_yields_none() {
        let primary = ScriptedProvider::new("primary", Behaviour::Fail);
        let fallback = ScriptedProvider::new("fallback", Behaviour::Hang);
        let capturer = capturer(vec![primary, fallback]);

        assert!(capturer.capture("https://project.example", true).await.is_none());
    }

    #[tokio::test]
    async fn test_non_website_is_not_captured() {
        let primary = ScriptedProvider::new("primary", Behaviour::Succeed);
        let capturer = capturer(vec![primary.clone()]);

        assert!(capturer.capture("https://x.com/project", false).await.is_none());
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped_during_cooldown() {
        let primary = ScriptedProvider::new("primary", Behaviour::Fail);
        let fallback = ScriptedProvider::new("fallback", Behaviour::Succeed);
        let capturer = capturer(vec![primary.clone(), fallback.clone()]);

        for _ in 0..4 {
            assert!(capturer.capture("https://project.example", true).await.is_some());
        }
        // Threshold is 2, so the primary sits out the remaining captures
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 4);
    }

    #[tokio::test]
    async fn test_retention_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let primary = ScriptedProvider::new("primary", Behaviour::Succeed);
        let capturer = capturer(vec![primary])
            .with_retention(ScreenshotRetention::new(dir.path(), Duration::from_secs(3600)));

        let a = capturer.capture("https://project.example", true).await.unwrap();
        let b = capturer.capture("https://project.example", true).await.unwrap();
        let path_a = a.retained_path.unwrap();
        let path_b = b.retained_path.unwrap();

        assert_ne!(path_a, path_b);
        assert!(path_a.exists() && path_b.exists());
        assert_eq!(path_a.extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn test_slow_retention_does_not_hold_up_capture() {
        let dir = tempfile::tempdir().unwrap();
        let primary = ScriptedProvider::new("primary", Behaviour::Succeed);
        let retention =
            ScreenshotRetention::new(dir.path().join("screens"), Duration::from_secs(3600))
                .with_save_deadline(Duration::ZERO);
        let capturer = capturer(vec![primary]).with_retention(retention);

        let evidence = capturer.capture("https://project.example", true).await.unwrap();
        assert_eq!(evidence.provider, "primary");
        assert!(evidence.retained_path.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.png"), b"old").unwrap();

        let retention = ScreenshotRetention::new(dir.path(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(retention.cleanup().await.unwrap(), 1);
        assert!(!dir.path().join("old.png").exists());
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_dir_is_noop() {
        let retention = ScreenshotRetention::new("/nonexistent/screens", Duration::ZERO);
        assert_eq!(retention.cleanup().await.unwrap(), 0);
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(
            encode_component("https://a.io/x?y=1"),
            "https%3A%2F%2Fa.io%2Fx%3Fy%3D1"
        );
        assert_eq!(extension_for("image/jpeg"), "jpg");
    }
}
