//! Keyword suggestions for captured images.
//!
//! The capture core only hands images over; it never retries or inspects
//! failures of this service. A client always answers with a list: real
//! keywords, nothing, or a fixed pair of human-readable fallback labels.

pub mod parse;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use crate::capture::EncodedImage;
use crate::config::KeywordConfig;

pub use parse::parse_terms;

pub const INVALID_KEY: [&str; 2] = ["Invalid API Key", "Check Config"];
pub const NO_VISION: [&str; 2] = ["Model does not support images", "Use a vision model"];
pub const ANALYSIS_FAILED: [&str; 2] = ["Analysis Failed", "Retry Later"];
pub const TOO_MANY_REQUESTS: &str = "Too many requests";

/// Formats the completions endpoint decodes as-is.
const SUPPORTED_MIME: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
const JPEG_QUALITY: u8 = 92;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

static VISION_REJECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)image|vision|content|unsupported").unwrap());

#[async_trait]
pub trait KeywordService: Send + Sync {
    /// Suggests short design keywords for `image`.
    async fn suggest(&self, image: &EncodedImage) -> Vec<String>;
}

fn pair(labels: [&str; 2]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

/// Fallback labels for a non-success, non-429 response.
pub fn failure_terms(status: StatusCode, body: &str) -> Vec<String> {
    if status == StatusCode::BAD_REQUEST && VISION_REJECTION.is_match(body) {
        pair(NO_VISION)
    } else if status == StatusCode::UNAUTHORIZED {
        pair(INVALID_KEY)
    } else {
        pair(ANALYSIS_FAILED)
    }
}

/// Re-encodes formats the endpoint cannot read as JPEG. The original
/// image is kept when it cannot be decoded.
pub fn prepare_image_url(image: &EncodedImage) -> String {
    let mime = image.mime_type();
    if SUPPORTED_MIME.contains(&mime) {
        return image.as_data_url().to_string();
    }

    let transcoded = image.decode().ok().and_then(|decoded| {
        let mut jpeg = Vec::new();
        decoded
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))
            .ok()?;
        Some(EncodedImage::from_bytes("image/jpeg", &jpeg))
    });
    match transcoded {
        Some(jpeg) => {
            log::info!("[KEYWORDS] Image format {:?} converted to JPEG", mime);
            jpeg.into_data_url()
        }
        None => {
            log::warn!("[KEYWORDS] Could not convert {:?}; sending as-is", mime);
            image.as_data_url().to_string()
        }
    }
}

/// OpenAI-compatible `chat/completions` request with one image.
pub fn request_body(config: &KeywordConfig, image_url: &str) -> serde_json::Value {
    serde_json::json!({
        "model": config.model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": config.prompt },
                { "type": "image_url", "image_url": { "url": image_url } },
            ],
        }],
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "top_p": config.top_p,
        "stream": false,
        "chat_template_kwargs": { "thinking": config.thinking },
    })
}

/// Message field of a 429 body, if any.
fn rate_limit_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Rate limited, retry later".to_string())
}

/// Reply text of a successful completion.
fn completion_text(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

/// Linear back-off: `base × attempt`.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: KeywordConfig,
    retry_delay: Duration,
}

impl ChatCompletionsClient {
    pub fn new(config: KeywordConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            retry_delay: RETRY_BASE_DELAY,
        }
    }

    /// Base of the linear back-off between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[async_trait]
impl KeywordService for ChatCompletionsClient {
    async fn suggest(&self, image: &EncodedImage) -> Vec<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            log::warn!("[KEYWORDS] No API key configured — returning fallback labels");
            return pair(INVALID_KEY);
        };

        let image_url = prepare_image_url(image);
        let body = request_body(&self.config, &image_url);
        let max_retries = self.config.max_retries;
        let mut last_error: Option<String> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let wait = backoff(self.retry_delay, attempt);
                log::info!(
                    "[KEYWORDS] Retrying in {}ms ({}/{})",
                    wait.as_millis(),
                    attempt,
                    max_retries
                );
                tokio::time::sleep(wait).await;
            }

            let start = Instant::now();
            log::info!("[KEYWORDS] Requesting terms from {}", self.config.model);
            let response = match self
                .http
                .post(&self.config.api_url)
                .bearer_auth(api_key)
                .header("accept", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    log::error!("[KEYWORDS] HTTP request failed: {}", e);
                    last_error = Some("Network error, retry later".to_string());
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            log::info!(
                "[KEYWORDS] API returned {} in {}ms",
                status,
                start.elapsed().as_millis()
            );

            if status == StatusCode::TOO_MANY_REQUESTS {
                let message = rate_limit_message(&text);
                log::warn!("[KEYWORDS] Rate limited: {}", message);
                last_error = Some(message);
                continue;
            }
            if !status.is_success() {
                log::error!("[KEYWORDS] API error {}: {}", status, text);
                return failure_terms(status, &text);
            }

            let Some(reply) = completion_text(&text) else {
                log::warn!("[KEYWORDS] Response carried no message content");
                return Vec::new();
            };
            let terms = parse_terms(&reply, self.config.max_terms);
            log::info!("[KEYWORDS] Terms: {:?}", terms);
            return terms;
        }

        log::warn!("[KEYWORDS] Retries exhausted; last error: {:?}", last_error);
        vec![
            TOO_MANY_REQUESTS.to_string(),
            last_error.unwrap_or_else(|| ANALYSIS_FAILED[1].to_string()),
        ]
    }
}
