//! Viewport-to-bitmap coordinate mapping for display captures.
//!
//! The overlay reports selection points in viewport CSS pixels. A display
//! frame is in physical pixels of the whole screen. Between the two sit
//! OS scaling (captured pixels per screen CSS pixel), in-page zoom, and
//! the browser chrome that offsets the viewport from the window origin.
//!
//! Everything here is pure so it can be tested with fixed metrics.

use serde::{Deserialize, Serialize};

use super::region::PixelRegion;
use crate::error::CaptureError;
use crate::overlay::SelectionRect;

/// Window and screen geometry as the host platform reports it.
///
/// `screen_*`, `outer_*` and `screen_x/y` are screen CSS pixels;
/// `inner_*` are viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub screen_width: f64,
    pub screen_height: f64,
    pub device_pixel_ratio: f64,
    pub outer_width: f64,
    pub outer_height: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub screen_x: f64,
    pub screen_y: f64,
}

impl WindowMetrics {
    /// A borderless window covering the whole screen, as a native
    /// full-screen overlay sees it.
    pub fn fullscreen(screen_width: f64, screen_height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            screen_width,
            screen_height,
            device_pixel_ratio,
            outer_width: screen_width,
            outer_height: screen_height,
            inner_width: screen_width,
            inner_height: screen_height,
            screen_x: 0.0,
            screen_y: 0.0,
        }
    }
}

/// Source of live window metrics. Read once per capture session.
pub trait MetricsProvider: Send + Sync {
    fn window_metrics(&self) -> WindowMetrics;
}

impl MetricsProvider for WindowMetrics {
    fn window_metrics(&self) -> WindowMetrics {
        *self
    }
}

/// `Math.round` semantics: halves round towards positive infinity.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Scale and offset factors for one captured frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub capture_scale_x: f64,
    pub capture_scale_y: f64,
    pub zoom_factor: f64,
    pub viewport_left: f64,
    pub viewport_top: f64,
}

impl CoordinateTransform {
    /// Derives the transform for a `bitmap_width`×`bitmap_height` frame.
    pub fn compute(
        bitmap_width: u32,
        bitmap_height: u32,
        metrics: &WindowMetrics,
    ) -> Result<Self, CaptureError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(metrics.screen_width) || !positive(metrics.screen_height) {
            return Err(CaptureError::InvalidMetrics(format!(
                "screen size {}x{}",
                metrics.screen_width, metrics.screen_height
            )));
        }
        if !positive(metrics.device_pixel_ratio) {
            return Err(CaptureError::InvalidMetrics(format!(
                "device pixel ratio {}",
                metrics.device_pixel_ratio
            )));
        }
        if bitmap_width == 0 || bitmap_height == 0 {
            return Err(CaptureError::InvalidMetrics(format!(
                "empty frame {}x{}",
                bitmap_width, bitmap_height
            )));
        }

        let capture_scale_x = f64::from(bitmap_width) / metrics.screen_width;
        let capture_scale_y = f64::from(bitmap_height) / metrics.screen_height;
        // 1.0 at 100% page zoom; devicePixelRatio already includes zoom.
        let zoom_factor = metrics.device_pixel_ratio / capture_scale_x;

        let chrome_width =
            round_half_up((metrics.outer_width - metrics.inner_width * zoom_factor) / 2.0);
        let chrome_height = metrics.outer_height - metrics.inner_height * zoom_factor;

        Ok(Self {
            bitmap_width,
            bitmap_height,
            capture_scale_x,
            capture_scale_y,
            zoom_factor,
            viewport_left: metrics.screen_x + chrome_width,
            viewport_top: metrics.screen_y + chrome_height,
        })
    }

    fn map_axis(&self, origin: f64, v: f64, scale: f64, limit: u32) -> u32 {
        let mapped = round_half_up((origin + v * self.zoom_factor) * scale);
        mapped.clamp(0.0, f64::from(limit)) as u32
    }

    /// Maps a viewport point to bitmap pixel coordinates, clamped to
    /// `[0, bitmap dimension]` on each axis.
    pub fn map_point(&self, x: f64, y: f64) -> (u32, u32) {
        (
            self.map_axis(self.viewport_left, x, self.capture_scale_x, self.bitmap_width),
            self.map_axis(self.viewport_top, y, self.capture_scale_y, self.bitmap_height),
        )
    }

    /// Maps a selection to a crop region of the frame. `None` when the
    /// clamped region is empty.
    pub fn map_rect(&self, rect: &SelectionRect) -> Option<PixelRegion> {
        let (left, top) = self.map_point(rect.left, rect.top);
        let (right, bottom) = self.map_point(rect.right(), rect.bottom());
        let width = right.saturating_sub(left);
        let height = bottom.saturating_sub(top);
        if width == 0 || height == 0 {
            return None;
        }
        Some(PixelRegion {
            x: left,
            y: top,
            width,
            height,
        })
    }
}
