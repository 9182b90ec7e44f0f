//! Capture error taxonomy.
//!
//! Every failure a capture flow can hit is local and recoverable. The
//! orchestrator turns all of them into "no image" for the caller; the
//! variants exist so hosts and tests can tell the paths apart in logs.

use std::time::Duration;

use crate::capture::region::CropError;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The user declined screen-share consent or the platform refused.
    #[error("Display capture was denied: {0}")]
    PlatformDenied(String),

    #[error("No usable frame arrived within {}ms", .0.as_millis())]
    FrameTimeout(Duration),

    #[error("Display stream ended before delivering a frame: {0}")]
    StreamEnded(String),

    /// The document rasterizer threw while rendering the page copy.
    #[error("Page serialization failed: {0}")]
    Serialization(String),

    #[error("Selection {width}x{height} is below the minimum size")]
    SelectionTooSmall { width: f64, height: f64 },

    #[error("Selection maps outside the captured frame")]
    DegenerateSelection,

    #[error("Capture cancelled")]
    Cancelled,

    #[error("A capture is already in progress")]
    AlreadyActive,

    #[error("Invalid window metrics: {0}")]
    InvalidMetrics(String),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    /// True for the failures that end a capture without telling the user
    /// anything beyond the missing image.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            CaptureError::PlatformDenied(_)
                | CaptureError::FrameTimeout(_)
                | CaptureError::StreamEnded(_)
                | CaptureError::Serialization(_)
                | CaptureError::SelectionTooSmall { .. }
                | CaptureError::DegenerateSelection
                | CaptureError::Cancelled
                | CaptureError::AlreadyActive
        )
    }

    /// Sub-threshold and out-of-bounds selections are cancellations, not errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            CaptureError::Cancelled
                | CaptureError::SelectionTooSmall { .. }
                | CaptureError::DegenerateSelection
                | CaptureError::PlatformDenied(_)
        )
    }
}
