//! Runtime configuration.
//!
//! Resolution order, lowest to highest:
//! built-in defaults, the user settings file, then environment variables
//! (a `.env` file in the working directory is loaded into the environment
//! first, without overriding variables that are already set).
//!
//! The settings file lives in the platform config directory:
//!   macOS:   ~/Library/Application Support/designlog/config.json
//!   Linux:   ~/.config/designlog/config.json
//!   Windows: %APPDATA%/designlog/config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CaptureError;

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(6000);
pub const DEFAULT_FALLBACK_BACKGROUND: &str = "#f3f4f6";
/// 1×1 transparent GIF.
pub const TRANSPARENT_PIXEL: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

pub const DEFAULT_API_URL: &str = "https://integrate.api.nvidia.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "qwen/qwen3.5-397b-a17b";
pub const DEFAULT_PROMPT: &str = "Based on the concrete use case and interface context of this \
screenshot, extract the 5-10 most important design keywords from a professional UI and visual \
design perspective. Cover layout structure, component shapes, typography, color, material, \
hierarchy and interaction patterns. Avoid abstract judgements; the keywords must be directly \
usable to recreate or search for similar designs. Output a JSON list ([\"keyword1\", ...]) and \
nothing else.";

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Longest wait for the first decodable display frame.
    pub frame_timeout: Duration,
    /// Page background when neither body nor root paints one.
    pub fallback_background: String,
    /// Replaces cross-origin image sources in page copies.
    pub placeholder_image: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            fallback_background: DEFAULT_FALLBACK_BACKGROUND.to_string(),
            placeholder_image: TRANSPARENT_PIXEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub max_terms: usize,
    pub thinking: bool,
    /// Extra attempts after a 429 or a network error.
    pub max_retries: u32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 16384,
            max_terms: 10,
            thinking: false,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub keywords: KeywordConfig,
}

/// The user-editable settings file. Every field is optional; blank
/// strings count as unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_terms: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_background: Option<String>,
}

/// Platform path of the settings file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("designlog")
        .join("config.json")
}

impl UserConfig {
    /// Reads the settings file. A missing file is an empty config.
    pub fn load_from(path: &Path) -> Result<Self, CaptureError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[CONFIG] No settings file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CaptureError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| CaptureError::Config(format!("Malformed {}: {}", path.display(), e)))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| CaptureError::Config(format!("Failed to create config dir: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| CaptureError::Config(format!("Failed to write {}: {}", path.display(), e)))?;
        log::info!("[CONFIG] Saved settings to {}", path.display());
        Ok(())
    }

    /// Writes to the platform settings path.
    pub fn save(&self) -> Result<(), CaptureError> {
        self.save_to(&config_path())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a numeric env override, ignoring (and logging) bad values.
fn parse_env<T: std::str::FromStr>(name: &str, value: Option<String>) -> Option<T> {
    let value = non_blank(value)?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[CONFIG] Ignoring {}={:?}: not a number", name, value);
            None
        }
    }
}

impl Config {
    /// Defaults + settings file + environment.
    pub fn load() -> Result<Self, CaptureError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("[CONFIG] Loaded {}", path.display());
        }
        let path = config_path();
        let user = UserConfig::load_from(&path)?;
        let config = Self::resolve(user, |name| std::env::var(name).ok());
        log::info!(
            "[CONFIG] Keyword model {} at {} (api key {})",
            config.keywords.model,
            config.keywords.api_url,
            if config.keywords.api_key.is_some() { "set" } else { "missing" }
        );
        Ok(config)
    }

    /// Applies `user` and then `env` on top of the defaults.
    pub fn resolve(user: UserConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let keywords = &mut config.keywords;
        let capture = &mut config.capture;

        if let Some(v) = non_blank(user.api_url) {
            keywords.api_url = v;
        }
        if let Some(v) = non_blank(user.api_key) {
            keywords.api_key = Some(v);
        }
        if let Some(v) = non_blank(user.model) {
            keywords.model = v;
        }
        if let Some(v) = non_blank(user.prompt) {
            keywords.prompt = v;
        }
        if let Some(v) = user.temperature {
            keywords.temperature = v;
        }
        if let Some(v) = user.top_p {
            keywords.top_p = v;
        }
        if let Some(v) = user.max_tokens {
            keywords.max_tokens = v;
        }
        if let Some(v) = user.max_terms {
            keywords.max_terms = v;
        }
        if let Some(v) = user.thinking {
            keywords.thinking = v;
        }
        if let Some(ms) = user.frame_timeout_ms {
            capture.frame_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = non_blank(user.fallback_background) {
            capture.fallback_background = v;
        }

        if let Some(v) = non_blank(env("DESIGNLOG_API_KEY")) {
            keywords.api_key = Some(v);
        }
        if let Some(v) = non_blank(env("DESIGNLOG_API_URL")) {
            keywords.api_url = v;
        }
        if let Some(v) = non_blank(env("DESIGNLOG_MODEL")) {
            keywords.model = v;
        }
        if let Some(v) = non_blank(env("DESIGNLOG_PROMPT")) {
            keywords.prompt = v;
        }
        if let Some(v) = parse_env("DESIGNLOG_MAX_TERMS", env("DESIGNLOG_MAX_TERMS")) {
            keywords.max_terms = v;
        }
        if let Some(ms) = parse_env("DESIGNLOG_FRAME_TIMEOUT_MS", env("DESIGNLOG_FRAME_TIMEOUT_MS"))
        {
            capture.frame_timeout = Duration::from_millis(ms);
        }

        config
    }
}
