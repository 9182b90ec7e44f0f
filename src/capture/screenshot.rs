//! Native display source using the `xcap` crate.
//!
//! This is the infrastructure layer; it talks to the OS. There is no
//! consent prompt on native targets: requesting the stream picks the
//! primary monitor, and each frame is one `capture_image` call.

use async_trait::async_trait;
use image::RgbaImage;
use xcap::Monitor;

use super::display::{DisplaySource, DisplayStream};
use super::transform::WindowMetrics;
use crate::error::CaptureError;

/// Finds the primary monitor, falling back to the first one listed.
fn primary_monitor() -> Result<Monitor, CaptureError> {
    let monitors = Monitor::all()
        .map_err(|e| CaptureError::PlatformDenied(format!("Failed to enumerate monitors: {}", e)))?;

    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or_else(|| CaptureError::PlatformDenied("No monitor found".into()))
}

/// Full-screen metrics for an overlay covering the primary monitor.
///
/// Whether the platform reports the monitor size in logical or physical
/// pixels, the transform's zoom factor absorbs the difference.
pub fn primary_monitor_metrics() -> Result<WindowMetrics, CaptureError> {
    let monitor = primary_monitor()?;
    let width = monitor
        .width()
        .map_err(|e| CaptureError::InvalidMetrics(e.to_string()))?;
    let height = monitor
        .height()
        .map_err(|e| CaptureError::InvalidMetrics(e.to_string()))?;
    let scale = monitor.scale_factor().unwrap_or(1.0);
    Ok(WindowMetrics::fullscreen(
        f64::from(width),
        f64::from(height),
        f64::from(scale),
    ))
}

/// `DisplaySource` for the primary monitor.
#[derive(Debug, Default)]
pub struct PrimaryMonitor;

impl PrimaryMonitor {
    pub fn new() -> Self {
        Self
    }
}

/// Holds the monitor id only; platform monitor handles are not `Send`
/// everywhere, so each frame looks the monitor up on the blocking pool.
struct MonitorStream {
    monitor_id: Option<u32>,
}

fn capture_monitor(id: u32) -> Result<RgbaImage, CaptureError> {
    let monitors = Monitor::all()
        .map_err(|e| CaptureError::StreamEnded(format!("Failed to enumerate monitors: {}", e)))?;
    let monitor = monitors
        .into_iter()
        .find(|m| m.id().is_ok_and(|m_id| m_id == id))
        .ok_or_else(|| CaptureError::StreamEnded(format!("Monitor {} disappeared", id)))?;
    monitor
        .capture_image()
        .map_err(|e| CaptureError::StreamEnded(format!("Screen capture failed: {}", e)))
}

fn blocking_failed(e: tokio::task::JoinError) -> CaptureError {
    CaptureError::StreamEnded(format!("Capture task failed: {}", e))
}

#[async_trait]
impl DisplaySource for PrimaryMonitor {
    async fn request_stream(&mut self) -> Result<Box<dyn DisplayStream>, CaptureError> {
        let id = tokio::task::spawn_blocking(|| {
            primary_monitor()?
                .id()
                .map_err(|e| CaptureError::PlatformDenied(e.to_string()))
        })
        .await
        .map_err(blocking_failed)??;
        log::info!("[CAPTURE] Streaming primary monitor {}", id);
        Ok(Box::new(MonitorStream {
            monitor_id: Some(id),
        }))
    }
}

#[async_trait]
impl DisplayStream for MonitorStream {
    async fn next_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        let id = self
            .monitor_id
            .ok_or_else(|| CaptureError::StreamEnded("monitor stream stopped".into()))?;
        tokio::task::spawn_blocking(move || capture_monitor(id))
            .await
            .map_err(blocking_failed)?
    }

    fn stop(&mut self) {
        self.monitor_id = None;
    }
}
