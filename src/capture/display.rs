//! Display pipeline: live stream lifecycle.
//!
//! A `DisplaySource` asks the platform for a screen-sharing stream (this
//! is where the consent prompt lives). The stream must produce one frame
//! within the configured timeout, after which it is stopped immediately so
//! the platform's "sharing your screen" indicator disappears before the
//! user starts dragging.

use async_trait::async_trait;
use image::RgbaImage;
use std::time::{Duration, Instant};

use crate::error::CaptureError;

/// Platform entry point for screen-sharing streams.
#[async_trait]
pub trait DisplaySource: Send {
    /// Requests a live stream of the whole display. Denial of consent is
    /// reported as `CaptureError::PlatformDenied`.
    async fn request_stream(&mut self) -> Result<Box<dyn DisplayStream>, CaptureError>;
}

/// A live stream handed out by a `DisplaySource`.
#[async_trait]
pub trait DisplayStream: Send {
    /// Waits for the next decodable frame.
    async fn next_frame(&mut self) -> Result<RgbaImage, CaptureError>;

    /// Stops every track of the stream. Called exactly once.
    fn stop(&mut self);
}

/// Owns a stream and stops it when dropped, so no exit path leaves it open.
struct StreamGuard {
    stream: Option<Box<dyn DisplayStream>>,
}

impl StreamGuard {
    fn new(stream: Box<dyn DisplayStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("[CAPTURE] Display stream released");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Requests a stream, grabs exactly one frame and releases the stream.
///
/// The stream is stopped before this returns on every path, including
/// timeout and cancellation of the returned future.
pub async fn grab_single_frame(
    source: &mut dyn DisplaySource,
    frame_timeout: Duration,
) -> Result<RgbaImage, CaptureError> {
    let start = Instant::now();

    let stream = source.request_stream().await.map_err(|e| {
        log::warn!("[CAPTURE] Display stream unavailable: {}", e);
        e
    })?;
    let mut guard = StreamGuard::new(stream);

    let frame = match guard.stream.as_mut() {
        Some(stream) => tokio::time::timeout(frame_timeout, stream.next_frame()).await,
        None => return Err(CaptureError::StreamEnded("stream already released".into())),
    };
    guard.release();

    let frame = match frame {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            log::warn!("[CAPTURE] Frame acquisition failed: {}", e);
            return Err(e);
        }
        Err(_) => {
            log::warn!(
                "[CAPTURE] No frame within {}ms — aborting",
                frame_timeout.as_millis()
            );
            return Err(CaptureError::FrameTimeout(frame_timeout));
        }
    };

    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureError::StreamEnded("empty frame".into()));
    }

    log::info!(
        "[CAPTURE] Frame {}x{} grabbed in {}ms",
        frame.width(),
        frame.height(),
        start.elapsed().as_millis()
    );
    Ok(frame)
}
