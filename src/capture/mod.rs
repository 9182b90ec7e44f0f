//! Screen capture domain: public API.
//!
//! `CaptureOrchestrator` runs one capture flow at a time:
//! acquire a frame (display stream or page raster), show the overlay,
//! wait for a selection, crop, encode, hand the image to the caller.
//! External code should only use what is exported here.

pub mod display;
pub mod document;
pub mod region;
pub mod screenshot;
pub mod transform;

pub use display::{grab_single_frame, DisplaySource, DisplayStream};
pub use document::{
    prepare_for_raster, rasterize_page, ElementNode, PageSnapshot, PreparedDocument,
    RasterError, RasterOptions, Rasterizer,
};
pub use region::{crop_to_encoded, CropError, EncodedImage, PixelRegion};
pub use screenshot::{primary_monitor_metrics, PrimaryMonitor};
pub use transform::{CoordinateTransform, MetricsProvider, WindowMetrics};

use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::overlay::{
    OverlayEvents, OverlayView, SelectionController, SelectionRect, Transition,
};

/// Receives the encoded image of every committed capture.
pub type CaptureCallback = Box<dyn Fn(EncodedImage) + Send + Sync>;

/// Where the frame comes from.
pub enum CaptureStrategy<'a> {
    /// Live display stream; selections go through a `CoordinateTransform`.
    Display {
        source: &'a mut dyn DisplaySource,
        metrics: &'a dyn MetricsProvider,
    },
    /// Page raster at 1:1 scale; selections are page coordinates.
    Document {
        page: PageSnapshot,
        rasterizer: &'a dyn Rasterizer,
    },
}

impl CaptureStrategy<'_> {
    fn name(&self) -> &'static str {
        match self {
            CaptureStrategy::Display { .. } => "display",
            CaptureStrategy::Document { .. } => "document",
        }
    }
}

/// Holds the process-wide "capture in progress" flag for as long as it
/// lives. Dropping it clears the flag, whatever the exit path.
struct SessionGuard<'a> {
    active: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    fn acquire(active: &'a AtomicBool) -> Result<Self, CaptureError> {
        if active.swap(true, Ordering::SeqCst) {
            log::warn!("[CAPTURE] Capture already in progress — request ignored");
            return Err(CaptureError::AlreadyActive);
        }
        Ok(Self { active })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        log::debug!("[CAPTURE] Session released");
    }
}

/// How a viewport selection reaches the frame's pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropMapping {
    Display(CoordinateTransform),
    Document { scroll_x: f64, scroll_y: f64 },
}

/// The frame of one capture flow, owned until it is cropped.
pub struct RasterFrame {
    pixels: RgbaImage,
    mapping: CropMapping,
}

impl RasterFrame {
    pub fn new(pixels: RgbaImage, mapping: CropMapping) -> Self {
        Self { pixels, mapping }
    }

    /// Frame pixels covered by `rect`, or `None` for a degenerate crop.
    pub fn region_for(&self, rect: &SelectionRect) -> Option<PixelRegion> {
        let (width, height) = self.pixels.dimensions();
        match self.mapping {
            CropMapping::Display(transform) => transform.map_rect(rect),
            CropMapping::Document { scroll_x, scroll_y } => {
                document::document_region(rect, scroll_x, scroll_y, width, height)
            }
        }
    }

    /// Crops once and encodes as PNG. Consumes the frame.
    pub fn crop(self, rect: &SelectionRect) -> Result<EncodedImage, CaptureError> {
        let region = self.region_for(rect).ok_or(CaptureError::DegenerateSelection)?;
        Ok(crop_to_encoded(&self.pixels, region)?)
    }
}

/// Overlay plumbing, used by one session at a time.
struct OverlayIo {
    view: Box<dyn OverlayView>,
    events: OverlayEvents,
    controller: SelectionController,
}

/// Keeps the overlay on screen; hiding it on drop covers every exit path,
/// including the caller dropping the capture future.
struct ShownOverlay<'a> {
    io: &'a mut OverlayIo,
}

impl<'a> ShownOverlay<'a> {
    fn show(io: &'a mut OverlayIo) -> Result<Self, CaptureError> {
        let mut stale = 0usize;
        while io.events.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("[OVERLAY] Discarded {} events queued before the frame was ready", stale);
        }
        io.controller.arm()?;
        io.view.show();
        Ok(Self { io })
    }

    async fn select(&mut self) -> Result<SelectionRect, CaptureError> {
        loop {
            let Some(event) = self.io.events.recv().await else {
                log::info!("[OVERLAY] Input closed — cancelling");
                return Err(CaptureError::Cancelled);
            };
            match self.io.controller.handle(&event) {
                Transition::Ignored => {}
                // Clears the previous rectangle until the pointer moves.
                Transition::Started(p) => {
                    self.io.view.render_selection(&SelectionRect::from_points(p, p))
                }
                Transition::Updated(rect) => self.io.view.render_selection(&rect),
                Transition::Committed(rect) => return Ok(rect),
                Transition::Cancelled(reason) => return Err(reason.into()),
            }
        }
    }
}

impl Drop for ShownOverlay<'_> {
    fn drop(&mut self) {
        self.io.controller.reset();
        self.io.view.hide();
    }
}

pub struct CaptureOrchestrator {
    config: CaptureConfig,
    active: AtomicBool,
    overlay: Mutex<OverlayIo>,
    on_capture: Option<CaptureCallback>,
}

impl CaptureOrchestrator {
    pub fn new(config: CaptureConfig, view: Box<dyn OverlayView>, events: OverlayEvents) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            overlay: Mutex::new(OverlayIo {
                view,
                events,
                controller: SelectionController::new(),
            }),
            on_capture: None,
        }
    }

    /// Registers the import collaborator. It is not called for aborted or
    /// cancelled flows.
    pub fn on_capture(mut self, callback: impl Fn(EncodedImage) + Send + Sync + 'static) -> Self {
        self.on_capture = Some(Box::new(callback));
        self
    }

    /// True while a capture flow holds the session.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Runs one full capture flow.
    ///
    /// A second call while one is running is rejected with
    /// `AlreadyActive` and leaves the running flow untouched. Errors for
    /// which `CaptureError::is_silent` holds mean "no image" and nothing
    /// more. The session is released before the callback runs, so the
    /// callback may start the next capture.
    pub async fn start_capture(
        &self,
        strategy: CaptureStrategy<'_>,
    ) -> Result<EncodedImage, CaptureError> {
        let start = Instant::now();
        let kind = strategy.name();

        let guard = SessionGuard::acquire(&self.active)?;
        let mut overlay = self
            .overlay
            .try_lock()
            .map_err(|_| CaptureError::AlreadyActive)?;
        log::info!("[CAPTURE] Starting {} capture", kind);
        let result = self.run(strategy, &mut overlay).await;
        // Lock before flag: once `is_active` reads false a new start succeeds.
        drop(overlay);
        drop(guard);

        match &result {
            Ok(image) => {
                log::info!(
                    "[CAPTURE] {} capture committed in {}ms",
                    kind,
                    start.elapsed().as_millis()
                );
                if let Some(callback) = &self.on_capture {
                    callback(image.clone());
                }
            }
            Err(e) if e.is_cancellation() => log::info!("[CAPTURE] {} capture cancelled: {}", kind, e),
            Err(e) => log::warn!("[CAPTURE] {} capture aborted: {}", kind, e),
        }
        result
    }

    async fn run(
        &self,
        strategy: CaptureStrategy<'_>,
        overlay: &mut OverlayIo,
    ) -> Result<EncodedImage, CaptureError> {
        let frame = self.acquire_frame(strategy).await?;

        let rect = {
            let mut shown = ShownOverlay::show(overlay)?;
            shown.select().await?
        };
        log::info!(
            "[OVERLAY] Selection {}x{} at {},{}",
            rect.width,
            rect.height,
            rect.left,
            rect.top
        );

        frame.crop(&rect)
    }

    async fn acquire_frame(&self, strategy: CaptureStrategy<'_>) -> Result<RasterFrame, CaptureError> {
        let frame = match strategy {
            CaptureStrategy::Display { source, metrics } => {
                let pixels = grab_single_frame(source, self.config.frame_timeout).await?;
                let (width, height) = pixels.dimensions();
                let transform =
                    CoordinateTransform::compute(width, height, &metrics.window_metrics())?;
                log::debug!("[CAPTURE] Transform {:?}", transform);
                RasterFrame::new(pixels, CropMapping::Display(transform))
            }
            CaptureStrategy::Document { page, rasterizer } => {
                let pixels = rasterize_page(&page, rasterizer, &self.config).await?;
                RasterFrame::new(
                    pixels,
                    CropMapping::Document {
                        scroll_x: page.scroll_x,
                        scroll_y: page.scroll_y,
                    },
                )
            }
        };
        Ok(frame)
    }
}
