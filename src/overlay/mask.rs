//! Raster overlay: a translucent mask a native host can blit over the
//! screen. Before a drag the whole surface is dimmed; during a drag only
//! the outside of the selection is, and the selection gets a thin border.

use image::{Rgba, RgbaImage};

use super::{OverlayView, SelectionRect};

/// `rgba(0,0,0,0.4)` before any selection.
const IDLE_DIM: Rgba<u8> = Rgba([0, 0, 0, 102]);
/// `rgba(0,0,0,0.45)` outside the selection.
const OUTSIDE_DIM: Rgba<u8> = Rgba([0, 0, 0, 115]);
/// `#fb7185`
const BORDER: Rgba<u8> = Rgba([0xfb, 0x71, 0x85, 0xff]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);
const BORDER_PX: u32 = 2;

#[derive(Debug)]
pub struct MaskOverlay {
    mask: RgbaImage,
    visible: bool,
}

impl MaskOverlay {
    /// A mask for a `width`×`height` viewport (CSS px, one pixel each).
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: RgbaImage::new(width, height),
            visible: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mask(&self) -> &RgbaImage {
        &self.mask
    }

    fn fill(&mut self, color: Rgba<u8>) {
        for px in self.mask.pixels_mut() {
            *px = color;
        }
    }
}

impl OverlayView for MaskOverlay {
    fn show(&mut self) {
        self.visible = true;
        self.fill(IDLE_DIM);
    }

    fn render_selection(&mut self, rect: &SelectionRect) {
        let (w, h) = self.mask.dimensions();
        let to_px = |v: f64, limit: u32| v.round().clamp(0.0, f64::from(limit)) as u32;
        let (x0, y0) = (to_px(rect.left, w), to_px(rect.top, h));
        let (x1, y1) = (to_px(rect.right(), w), to_px(rect.bottom(), h));

        for (x, y, px) in self.mask.enumerate_pixels_mut() {
            let inside = x >= x0 && x < x1 && y >= y0 && y < y1;
            *px = if !inside {
                OUTSIDE_DIM
            } else if x < x0 + BORDER_PX
                || x + BORDER_PX >= x1
                || y < y0 + BORDER_PX
                || y + BORDER_PX >= y1
            {
                BORDER
            } else {
                CLEAR
            };
        }
    }

    fn hide(&mut self) {
        self.visible = false;
        self.fill(CLEAR);
    }
}
