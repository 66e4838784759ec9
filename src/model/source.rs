use anyhow::{bail, Context, Result};
use image::DynamicImage;
use log::debug;
use std::time::Duration;

pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Turns an image URL into decoded pixels.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<DynamicImage>;
}

/// Fetches over http(s) and decodes in memory.
pub struct UrlImageSource {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl UrlImageSource {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10).min(timeout)))
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent, max_bytes }
    }
}

impl Default for UrlImageSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), DEFAULT_MAX_IMAGE_BYTES)
    }
}

impl ImageSource for UrlImageSource {
    fn fetch(&self, url: &str) -> Result<DynamicImage> {
        check_url(url)?;

        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("fetching {url}"))?;
        let mut body = response.into_body();
        let bytes = body
            .with_config()
            .limit(self.max_bytes)
            .read_to_vec()
            .with_context(|| format!("reading image body from {url}"))?;
        debug!("fetched {} bytes from {}", bytes.len(), url);

        image::load_from_memory(&bytes).with_context(|| format!("decoding image from {url}"))
    }
}

fn check_url(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = if let Some(rest) = lower.strip_prefix("https://") {
        rest
    } else if let Some(rest) = lower.strip_prefix("http://") {
        rest
    } else {
        bail!("unsupported image url (expected http or https): {url}");
    };
    if rest.is_empty() || rest.starts_with('/') {
        bail!("image url has no host: {url}");
    }
    Ok(())
}
