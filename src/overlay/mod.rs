//! Selection overlay: the crosshair drag that picks a capture region.
//!
//! The controller is a small state machine:
//! Idle → Armed (overlay shown) → Dragging → Committed | Cancelled → Idle.
//! It knows nothing about frames or pixels; it turns pointer and key
//! events into a normalized `SelectionRect` or a cancellation.
//!
//! Hosts forward input through an `OverlayInput` handle and draw whatever
//! the controller reports through an `OverlayView`.

pub mod mask;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Selections narrower or shorter than this (CSS px) are dropped.
pub const MIN_SELECTION_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A normalized selection: `width` and `height` are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionRect {
    /// Normalizes two drag points into a rectangle.
    pub fn from_points(start: Point, current: Point) -> Self {
        Self {
            left: start.x.min(current.x),
            top: start.y.min(current.y),
            width: (current.x - start.x).abs(),
            height: (current.y - start.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// True when both sides reach `MIN_SELECTION_PX`.
    pub fn is_large_enough(&self) -> bool {
        self.width >= MIN_SELECTION_PX && self.height >= MIN_SELECTION_PX
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Escape,
    Other(String),
}

impl Key {
    /// Maps a DOM-style key name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Escape" | "Esc" => Key::Escape,
            other => Key::Other(other.to_string()),
        }
    }
}

/// Input the overlay reacts to, in viewport CSS pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OverlayEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp,
    /// The pointer left the overlay surface; handled like a release.
    PointerLeave,
    KeyDown { key: Key },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayState {
    Idle,
    Armed,
    Dragging { start: Point, current: Point },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CancelReason {
    EscapeKey,
    TooSmall { width: f64, height: f64 },
}

impl From<CancelReason> for CaptureError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::EscapeKey => CaptureError::Cancelled,
            CancelReason::TooSmall { width, height } => {
                CaptureError::SelectionTooSmall { width, height }
            }
        }
    }
}

/// What a single event did to the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Ignored,
    Started(Point),
    Updated(SelectionRect),
    Committed(SelectionRect),
    Cancelled(CancelReason),
}

#[derive(Debug)]
pub struct SelectionController {
    state: OverlayState,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    pub fn new() -> Self {
        Self {
            state: OverlayState::Idle,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == OverlayState::Idle
    }

    /// Shows the overlay. Rejected unless idle; the running selection is
    /// left untouched.
    pub fn arm(&mut self) -> Result<(), CaptureError> {
        if !self.is_idle() {
            log::warn!("[OVERLAY] Start requested while {:?} — ignored", self.state);
            return Err(CaptureError::AlreadyActive);
        }
        self.state = OverlayState::Armed;
        Ok(())
    }

    /// Tears the overlay down without a result.
    pub fn reset(&mut self) {
        self.state = OverlayState::Idle;
    }

    pub fn current_rect(&self) -> Option<SelectionRect> {
        match self.state {
            OverlayState::Dragging { start, current } => {
                Some(SelectionRect::from_points(start, current))
            }
            _ => None,
        }
    }

    pub fn handle(&mut self, event: &OverlayEvent) -> Transition {
        match (self.state, event) {
            (OverlayState::Idle, _) => Transition::Ignored,

            (_, OverlayEvent::KeyDown { key: Key::Escape }) => {
                self.state = OverlayState::Idle;
                Transition::Cancelled(CancelReason::EscapeKey)
            }
            (_, OverlayEvent::KeyDown { .. }) => Transition::Ignored,

            // A fresh press restarts the drag from the new point.
            (_, OverlayEvent::PointerDown { x, y }) => {
                let p = Point::new(*x, *y);
                self.state = OverlayState::Dragging {
                    start: p,
                    current: p,
                };
                Transition::Started(p)
            }

            (OverlayState::Dragging { start, .. }, OverlayEvent::PointerMove { x, y }) => {
                let current = Point::new(*x, *y);
                self.state = OverlayState::Dragging { start, current };
                Transition::Updated(SelectionRect::from_points(start, current))
            }

            (
                OverlayState::Dragging { start, current },
                OverlayEvent::PointerUp | OverlayEvent::PointerLeave,
            ) => {
                self.state = OverlayState::Idle;
                let rect = SelectionRect::from_points(start, current);
                if rect.is_large_enough() {
                    Transition::Committed(rect)
                } else {
                    Transition::Cancelled(CancelReason::TooSmall {
                        width: rect.width,
                        height: rect.height,
                    })
                }
            }

            (OverlayState::Armed, _) => Transition::Ignored,
        }
    }
}

/// Host-side rendering of the overlay.
pub trait OverlayView: Send {
    /// Overlay becomes visible; input is live from here on.
    fn show(&mut self);
    /// The selection changed; everything outside `rect` should be dimmed.
    fn render_selection(&mut self, rect: &SelectionRect);
    /// Overlay is removed, on every exit path.
    fn hide(&mut self);
}

/// A view that draws nothing, for headless hosts.
#[derive(Debug, Default)]
pub struct HeadlessOverlay;

impl OverlayView for HeadlessOverlay {
    fn show(&mut self) {}
    fn render_selection(&mut self, _rect: &SelectionRect) {}
    fn hide(&mut self) {}
}

/// Sending half of the overlay event channel, held by the host.
#[derive(Debug, Clone)]
pub struct OverlayInput {
    tx: mpsc::UnboundedSender<OverlayEvent>,
}

impl OverlayInput {
    /// Forwards an event; returns false once the orchestrator is gone.
    pub fn send(&self, event: OverlayEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn pointer_down(&self, x: f64, y: f64) -> bool {
        self.send(OverlayEvent::PointerDown { x, y })
    }

    pub fn pointer_move(&self, x: f64, y: f64) -> bool {
        self.send(OverlayEvent::PointerMove { x, y })
    }

    pub fn pointer_up(&self) -> bool {
        self.send(OverlayEvent::PointerUp)
    }

    pub fn escape(&self) -> bool {
        self.send(OverlayEvent::KeyDown { key: Key::Escape })
    }

    /// Presses at `start`, drags to `end`, releases.
    pub fn drag(&self, start: Point, end: Point) -> bool {
        self.pointer_down(start.x, start.y) && self.pointer_move(end.x, end.y) && self.pointer_up()
    }
}

/// Receiving half, owned by the orchestrator.
pub type OverlayEvents = mpsc::UnboundedReceiver<OverlayEvent>;

pub fn overlay_channel() -> (OverlayInput, OverlayEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OverlayInput { tx }, rx)
}
