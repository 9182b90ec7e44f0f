//! DesignLog capture: region-accurate screen and page capture.
//!
//! This crate wires together:
//! - Color normalization for page rasterization (color/)
//! - Selection overlay state machine and views (overlay/)
//! - Capture pipelines and the orchestrator (capture/)
//! - Keyword suggestions for captured images (keywords/)

pub mod capture;
pub mod color;
pub mod config;
pub mod error;
pub mod keywords;
pub mod overlay;

pub use capture::{
    CaptureOrchestrator, CaptureStrategy, EncodedImage, PageSnapshot, WindowMetrics,
};
pub use config::{CaptureConfig, Config, KeywordConfig, UserConfig};
pub use error::CaptureError;
pub use keywords::{ChatCompletionsClient, KeywordService};
pub use overlay::{overlay_channel, OverlayEvent, OverlayInput, OverlayView, SelectionRect};

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Installs `env_logger` with an `info` default (`RUST_LOG` overrides).
/// Safe to call more than once.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    });
}
