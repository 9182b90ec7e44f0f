//! End-to-end capture flows against fake platform pieces.
//!
//! Run with: cargo test --test capture_flow

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use designlog_capture::capture::{
    DisplaySource, DisplayStream, ElementNode, PreparedDocument, RasterError, RasterOptions,
    Rasterizer,
};
use designlog_capture::overlay::{Key, OverlayEvent, SelectionRect};
use designlog_capture::{
    overlay_channel, CaptureConfig, CaptureError, CaptureOrchestrator, CaptureStrategy,
    EncodedImage, OverlayInput, OverlayView, PageSnapshot, WindowMetrics,
};

const MARK: Rgba<u8> = Rgba([220, 40, 90, 255]);

// ---- display fakes ----

struct FakeSource {
    frame: RgbaImage,
    deny: bool,
    stops: Arc<AtomicUsize>,
}

struct FakeStream {
    frame: RgbaImage,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl DisplaySource for FakeSource {
    async fn request_stream(&mut self) -> Result<Box<dyn DisplayStream>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PlatformDenied("NotAllowedError".into()));
        }
        Ok(Box::new(FakeStream {
            frame: self.frame.clone(),
            stops: self.stops.clone(),
        }))
    }
}

#[async_trait]
impl DisplayStream for FakeStream {
    async fn next_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        Ok(self.frame.clone())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn source_with_mark(width: u32, height: u32, at: (u32, u32)) -> (FakeSource, Arc<AtomicUsize>) {
    let mut frame = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    frame.put_pixel(at.0, at.1, MARK);
    let stops = Arc::new(AtomicUsize::new(0));
    (
        FakeSource {
            frame,
            deny: false,
            stops: stops.clone(),
        },
        stops,
    )
}

// ---- document fakes ----

#[derive(Default)]
struct RecordingRasterizer {
    seen: Mutex<Option<PreparedDocument>>,
    fail: bool,
}

#[async_trait]
impl Rasterizer for RecordingRasterizer {
    async fn rasterize(
        &self,
        document: &PreparedDocument,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RasterError> {
        if self.fail {
            return Err(RasterError::Tainted("cross-origin frame".into()));
        }
        *self.seen.lock().unwrap() = Some(document.clone());
        assert_eq!(options.scale, 1.0);
        let mut canvas = RgbaImage::from_pixel(
            options.window_width,
            options.window_height,
            Rgba([255, 255, 255, 255]),
        );
        canvas.put_pixel(60, 260, MARK);
        Ok(canvas)
    }
}

fn page() -> PageSnapshot {
    PageSnapshot {
        elements: vec![ElementNode::new("div").with_attr("style", "background: oklch(1 0 0)")],
        scroll_y: 250.0,
        document_width: 300,
        document_height: 600,
        ..Default::default()
    }
}

// ---- overlay fake ----

/// Replays one queued script per `show()` and counts show/hide calls.
struct ScriptedView {
    input: OverlayInput,
    scripts: VecDeque<Vec<OverlayEvent>>,
    shows: Arc<AtomicUsize>,
    hides: Arc<AtomicUsize>,
    stops_at_show: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
}

impl OverlayView for ScriptedView {
    fn show(&mut self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
        if let Some((stops, seen)) = &self.stops_at_show {
            seen.store(stops.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        for event in self.scripts.pop_front().unwrap_or_default() {
            self.input.send(event);
        }
    }

    fn render_selection(&mut self, _rect: &SelectionRect) {}

    fn hide(&mut self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }
}

fn drag(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<OverlayEvent> {
    vec![
        OverlayEvent::PointerDown { x: x0, y: y0 },
        OverlayEvent::PointerMove { x: x1, y: y1 },
        OverlayEvent::PointerUp,
    ]
}

struct Harness {
    orchestrator: CaptureOrchestrator,
    input: OverlayInput,
    shows: Arc<AtomicUsize>,
    hides: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<EncodedImage>>>,
}

fn harness(scripts: Vec<Vec<OverlayEvent>>) -> Harness {
    harness_with(scripts, None)
}

fn harness_with(
    scripts: Vec<Vec<OverlayEvent>>,
    stops_at_show: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
) -> Harness {
    let (input, events) = overlay_channel();
    let shows = Arc::new(AtomicUsize::new(0));
    let hides = Arc::new(AtomicUsize::new(0));
    let captured = Arc::new(Mutex::new(Vec::new()));
    let view = ScriptedView {
        input: input.clone(),
        scripts: scripts.into(),
        shows: shows.clone(),
        hides: hides.clone(),
        stops_at_show,
    };
    let sink = captured.clone();
    let config = CaptureConfig {
        frame_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let orchestrator = CaptureOrchestrator::new(config, Box::new(view), events)
        .on_capture(move |image| sink.lock().unwrap().push(image));
    Harness {
        orchestrator,
        input,
        shows,
        hides,
        captured,
    }
}

// ---- tests ----

#[tokio::test]
async fn display_capture_maps_selection_through_scale() {
    // 2x display: 100x50 CSS px captured as 200x100.
    let (mut source, stops) = source_with_mark(200, 100, (40, 20));
    let seen_stops = Arc::new(AtomicUsize::new(usize::MAX));
    let h = harness_with(
        vec![drag(20.0, 10.0, 40.0, 30.0)],
        Some((stops.clone(), seen_stops.clone())),
    );
    let metrics = WindowMetrics::fullscreen(100.0, 50.0, 2.0);

    let image = h
        .orchestrator
        .start_capture(CaptureStrategy::Display {
            source: &mut source,
            metrics: &metrics,
        })
        .await
        .unwrap();

    let pixels = image.decode().unwrap().to_rgba8();
    assert_eq!(pixels.dimensions(), (40, 40));
    assert_eq!(*pixels.get_pixel(0, 0), MARK);
    assert!(image.as_data_url().starts_with("data:image/png;base64,"));

    // The stream was released before the overlay appeared.
    assert_eq!(seen_stops.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.captured.lock().unwrap().len(), 1);
    assert_eq!(h.hides.load(Ordering::SeqCst), 1);
    assert!(!h.orchestrator.is_active());
}

#[tokio::test]
async fn document_capture_normalizes_colors_and_crops_with_scroll() {
    let h = harness(vec![drag(50.0, 5.0, 80.0, 25.0)]);
    let rasterizer = RecordingRasterizer::default();

    let image = h
        .orchestrator
        .start_capture(CaptureStrategy::Document {
            page: page(),
            rasterizer: &rasterizer,
        })
        .await
        .unwrap();

    let prepared = rasterizer.seen.lock().unwrap().take().unwrap();
    assert_eq!(
        prepared.elements[0].attr("style"),
        Some("background: rgb(255,255,255)")
    );

    let pixels = image.decode().unwrap().to_rgba8();
    assert_eq!(pixels.dimensions(), (30, 20));
    // Page (60, 260) is viewport (60, 10) at scroll 250.
    assert_eq!(*pixels.get_pixel(10, 5), MARK);
    assert_eq!(h.captured.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn small_selection_never_commits() {
    let (mut source, stops) = source_with_mark(100, 100, (0, 0));
    let h = harness(vec![drag(10.0, 10.0, 15.0, 80.0)]);
    let metrics = WindowMetrics::fullscreen(100.0, 100.0, 1.0);

    let result = h
        .orchestrator
        .start_capture(CaptureStrategy::Display {
            source: &mut source,
            metrics: &metrics,
        })
        .await;

    assert!(matches!(result, Err(CaptureError::SelectionTooSmall { .. })));
    assert!(h.captured.lock().unwrap().is_empty());
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.hides.load(Ordering::SeqCst), 1);
    assert!(!h.orchestrator.is_active());
}

#[tokio::test]
async fn second_start_while_dragging_is_rejected() {
    let h = harness(vec![vec![
        OverlayEvent::PointerDown { x: 10.0, y: 10.0 },
        OverlayEvent::PointerMove { x: 60.0, y: 60.0 },
    ]]);
    let rasterizer = RecordingRasterizer::default();

    let first = h.orchestrator.start_capture(CaptureStrategy::Document {
        page: page(),
        rasterizer: &rasterizer,
    });
    let second = async {
        while h.shows.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(h.orchestrator.is_active());

        let rejected = h
            .orchestrator
            .start_capture(CaptureStrategy::Document {
                page: page(),
                rasterizer: &rasterizer,
            })
            .await;
        assert!(matches!(rejected, Err(CaptureError::AlreadyActive)));
        assert!(h.orchestrator.is_active());
        assert_eq!(h.shows.load(Ordering::SeqCst), 1);

        h.input.pointer_up();
    };

    let (result, ()) = tokio::join!(first, second);
    let pixels = result.unwrap().decode().unwrap().to_rgba8();
    assert_eq!(pixels.dimensions(), (50, 50));
    assert_eq!(h.captured.lock().unwrap().len(), 1);
    assert!(!h.orchestrator.is_active());
}

#[tokio::test]
async fn escape_releases_session_for_next_capture() {
    let h = harness(vec![
        vec![
            OverlayEvent::PointerDown { x: 0.0, y: 0.0 },
            OverlayEvent::PointerMove { x: 90.0, y: 90.0 },
            OverlayEvent::KeyDown { key: Key::Escape },
        ],
        drag(0.0, 0.0, 20.0, 20.0),
    ]);
    let rasterizer = RecordingRasterizer::default();

    let cancelled = h
        .orchestrator
        .start_capture(CaptureStrategy::Document {
            page: page(),
            rasterizer: &rasterizer,
        })
        .await;
    assert!(matches!(cancelled, Err(CaptureError::Cancelled)));
    assert!(!h.orchestrator.is_active());
    assert!(h.captured.lock().unwrap().is_empty());

    let committed = h
        .orchestrator
        .start_capture(CaptureStrategy::Document {
            page: page(),
            rasterizer: &rasterizer,
        })
        .await;
    assert!(committed.is_ok());
    assert_eq!(h.captured.lock().unwrap().len(), 1);
    assert_eq!(h.hides.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn denied_stream_is_a_silent_no_op() {
    let (mut source, stops) = source_with_mark(100, 100, (0, 0));
    source.deny = true;
    let h = harness(vec![drag(0.0, 0.0, 50.0, 50.0)]);
    let metrics = WindowMetrics::fullscreen(100.0, 100.0, 1.0);

    let err = h
        .orchestrator
        .start_capture(CaptureStrategy::Display {
            source: &mut source,
            metrics: &metrics,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::PlatformDenied(_)));
    assert!(err.is_silent());
    assert_eq!(stops.load(Ordering::SeqCst), 0);
    assert_eq!(h.shows.load(Ordering::SeqCst), 0);
    assert!(!h.orchestrator.is_active());
}

#[tokio::test]
async fn rasterizer_failure_is_a_silent_no_op() {
    let h = harness(vec![drag(0.0, 0.0, 50.0, 50.0)]);
    let rasterizer = RecordingRasterizer {
        fail: true,
        ..Default::default()
    };

    let err = h
        .orchestrator
        .start_capture(CaptureStrategy::Document {
            page: page(),
            rasterizer: &rasterizer,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::Serialization(_)));
    assert!(err.is_silent());
    assert_eq!(h.shows.load(Ordering::SeqCst), 0);
    assert!(h.captured.lock().unwrap().is_empty());
    assert!(!h.orchestrator.is_active());
}
