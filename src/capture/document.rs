//! DOM pipeline: prepares a page snapshot for rasterization.
//!
//! The host serializes the visible document into a `PageSnapshot`. Before
//! it reaches a `Rasterizer` the copy is made safe to draw:
//! cross-origin images become an inert placeholder, every piece of style
//! text goes through the color normalizer, collected stylesheets are
//! inlined ahead of the page's own `<style>` blocks, and the root and body
//! get an explicit background.

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use url::Url;

use super::region::PixelRegion;
use crate::color;
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::overlay::SelectionRect;

/// One element of the serialized page, reduced to what the sanitizing
/// pass touches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    fn is_stylesheet_link(&self) -> bool {
        self.is("link")
            && self.attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|t| t.eq_ignore_ascii_case("stylesheet"))
            })
    }
}

/// What the host collected from the live page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    /// Page origin, e.g. `https://example.com`. Unknown when `None`.
    pub origin: Option<String>,
    pub elements: Vec<ElementNode>,
    /// Text of the page's `<style>` blocks, in document order.
    pub style_blocks: Vec<String>,
    /// Rule text of every readable stylesheet, linked ones included.
    pub stylesheets: Vec<String>,
    /// Computed background color of `<body>`.
    pub body_background: Option<String>,
    /// Computed background color of `<html>`.
    pub root_background: Option<String>,
    pub scroll_x: f64,
    pub scroll_y: f64,
    /// Full scrollable size in CSS px.
    pub document_width: u32,
    pub document_height: u32,
}

/// A sanitized copy, ready for a rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub elements: Vec<ElementNode>,
    /// Inlined stylesheets come first.
    pub style_blocks: Vec<String>,
    pub background: String,
}

impl PreparedDocument {
    /// All style text that will reach the rasterizer.
    pub fn style_texts(&self) -> impl Iterator<Item = &str> {
        self.style_blocks.iter().map(String::as_str).chain(
            self.elements
                .iter()
                .filter_map(|e| e.attr("style")),
        )
    }
}

/// Rendering parameters. `scale` is always 1 so one bitmap pixel is one
/// CSS pixel and selections need no coordinate transform.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub scale: f64,
    pub background: String,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Canvas is tainted by {0}")]
    Tainted(String),

    #[error("Rasterizer produced an empty canvas")]
    EmptyCanvas,
}

impl From<RasterError> for CaptureError {
    fn from(e: RasterError) -> Self {
        CaptureError::Serialization(e.to_string())
    }
}

/// Draws a prepared document into a bitmap.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(
        &self,
        document: &PreparedDocument,
        options: &RasterOptions,
    ) -> Result<RgbaImage, RasterError>;
}

fn is_transparent(value: &str) -> bool {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    compact.is_empty()
        || compact.eq_ignore_ascii_case("transparent")
        || compact.eq_ignore_ascii_case("rgba(0,0,0,0)")
}

/// Body background if it paints anything, else the root's, else the
/// configured fallback. The result is color-normalized.
pub fn resolve_background(page: &PageSnapshot, fallback: &str) -> String {
    let chosen = [page.body_background.as_deref(), page.root_background.as_deref()]
        .into_iter()
        .flatten()
        .find(|v| !is_transparent(v))
        .unwrap_or(fallback);
    color::normalize(chosen.trim())
}

/// True when `src` is an absolute http(s) URL from another origin. With
/// no page origin every absolute http(s) source counts.
fn is_cross_origin(src: &str, page_origin: Option<&url::Origin>) -> bool {
    let Ok(url) = Url::parse(src.trim()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match page_origin {
        Some(origin) => url.origin() != *origin,
        None => true,
    }
}

/// Replaces any `background-color` declaration in inline style text.
fn force_background(style: Option<&str>, background: &str) -> String {
    let forced = format!("background-color: {}", background);
    let mut declarations: Vec<&str> = style
        .unwrap_or("")
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| {
            d.split_once(':')
                .map(|(prop, _)| !prop.trim().eq_ignore_ascii_case("background-color"))
                .unwrap_or(true)
        })
        .collect();
    declarations.push(&forced);
    declarations.join("; ")
}

/// Builds the sanitized copy of `page`. The snapshot is left untouched.
pub fn prepare_for_raster(page: &PageSnapshot, config: &CaptureConfig) -> PreparedDocument {
    let page_origin = page
        .origin
        .as_deref()
        .and_then(|o| Url::parse(o).ok())
        .map(|u| u.origin());
    let background = resolve_background(page, &config.fallback_background);

    let mut replaced_images = 0usize;
    let mut elements: Vec<ElementNode> = Vec::with_capacity(page.elements.len() + 2);
    for element in &page.elements {
        if element.is_stylesheet_link() {
            continue;
        }
        let mut element = element.clone();

        if element.is("img")
            && element
                .attr("src")
                .is_some_and(|src| is_cross_origin(src, page_origin.as_ref()))
        {
            element
                .attributes
                .insert("src".into(), config.placeholder_image.clone());
            element.attributes.remove("srcset");
            replaced_images += 1;
        }

        if let Some(style) = element.attributes.get_mut("style") {
            if color::needs_normalization(style) {
                *style = color::normalize(style);
            }
        }

        if element.is("html") || element.is("body") {
            let style = force_background(element.attr("style"), &background);
            element.attributes.insert("style".into(), style);
        }
        elements.push(element);
    }

    for tag in ["html", "body"] {
        if !elements.iter().any(|e| e.is(tag)) {
            elements.push(
                ElementNode::new(tag).with_attr("style", force_background(None, &background)),
            );
        }
    }

    let mut style_blocks = Vec::with_capacity(page.style_blocks.len() + 1);
    style_blocks.push(color::normalize(&page.stylesheets.concat()));
    style_blocks.extend(page.style_blocks.iter().map(|s| color::normalize(s)));

    log::debug!(
        "[DOM] Prepared {} elements, {} style blocks, {} cross-origin images replaced, background {}",
        elements.len(),
        style_blocks.len(),
        replaced_images,
        background
    );

    PreparedDocument {
        elements,
        style_blocks,
        background,
    }
}

/// Prepares and rasterizes `page` at 1:1 scale.
pub async fn rasterize_page(
    page: &PageSnapshot,
    rasterizer: &dyn Rasterizer,
    config: &CaptureConfig,
) -> Result<RgbaImage, CaptureError> {
    let start = Instant::now();
    let document = prepare_for_raster(page, config);
    let options = RasterOptions {
        scale: 1.0,
        background: document.background.clone(),
        scroll_x: page.scroll_x,
        scroll_y: page.scroll_y,
        window_width: page.document_width,
        window_height: page.document_height,
    };

    let canvas = rasterizer.rasterize(&document, &options).await.map_err(|e| {
        log::error!("[DOM] Page rasterization failed: {}", e);
        CaptureError::from(e)
    })?;
    if canvas.width() == 0 || canvas.height() == 0 {
        log::error!("[DOM] Page rasterization failed: {}", RasterError::EmptyCanvas);
        return Err(RasterError::EmptyCanvas.into());
    }

    log::info!(
        "[DOM] Rasterized page {}x{} in {}ms",
        canvas.width(),
        canvas.height(),
        start.elapsed().as_millis()
    );
    Ok(canvas)
}

/// Maps a viewport selection onto the full-document raster by adding the
/// scroll offset. `None` when nothing of it lies on the canvas.
pub fn document_region(
    rect: &SelectionRect,
    scroll_x: f64,
    scroll_y: f64,
    canvas_width: u32,
    canvas_height: u32,
) -> Option<PixelRegion> {
    let x = (rect.left + scroll_x).round();
    let y = (rect.top + scroll_y).round();
    let width = rect.width.round();
    let height = rect.height.round();
    if x < 0.0 || y < 0.0 || width <= 0.0 || height <= 0.0 {
        return None;
    }
    PixelRegion {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    }
    .clamp_to(canvas_width, canvas_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CaptureConfig {
        CaptureConfig::default()
    }

    fn img(src: &str) -> ElementNode {
        ElementNode::new("img").with_attr("src", src)
    }

    #[test]
    fn white_oklch_element_becomes_rgb() {
        let page = PageSnapshot {
            elements: vec![ElementNode::new("div").with_attr("style", "background: oklch(1 0 0)")],
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &config());
        assert_eq!(doc.elements[0].attr("style"), Some("background: rgb(255,255,255)"));
    }

    #[test]
    fn style_text_is_normalized_everywhere() {
        let page = PageSnapshot {
            elements: vec![ElementNode::new("p").with_attr("style", "color: oklab(0 0 0)")],
            style_blocks: vec![".a { color: oklch(1 0 0 / 0.5) }".into()],
            stylesheets: vec![".b { border-color: color-mix(in oklab, red 40%, blue) }".into()],
            body_background: Some("oklch(0 0 0)".into()),
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &config());
        for text in doc.style_texts() {
            assert!(!text.contains("okl"), "left unconverted: {}", text);
            assert!(!text.contains("color-mix"), "left unconverted: {}", text);
        }
        assert_eq!(doc.background, "rgb(0,0,0)");
    }

    #[test]
    fn stylesheets_are_inlined_first_and_links_dropped() {
        let page = PageSnapshot {
            elements: vec![
                ElementNode::new("link")
                    .with_attr("rel", "Stylesheet")
                    .with_attr("href", "/app.css"),
                ElementNode::new("link").with_attr("rel", "icon"),
            ],
            style_blocks: vec!["p { margin: 0 }".into()],
            stylesheets: vec!["a { color: red }".into(), "b { color: blue }".into()],
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &config());
        assert_eq!(doc.style_blocks[0], "a { color: red }b { color: blue }");
        assert_eq!(doc.style_blocks[1], "p { margin: 0 }");
        assert!(!doc.elements.iter().any(|e| e.is_stylesheet_link()));
        assert!(doc.elements.iter().any(|e| e.attr("rel") == Some("icon")));
    }

    #[test]
    fn cross_origin_images_get_placeholder() {
        let cfg = config();
        let page = PageSnapshot {
            origin: Some("https://journal.example".into()),
            elements: vec![
                img("https://cdn.other.example/a.png").with_attr("srcset", "a2.png 2x"),
                img("https://journal.example/b.png"),
                img("/relative/c.png"),
                img("data:image/png;base64,AAAA"),
            ],
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &cfg);
        assert_eq!(doc.elements[0].attr("src"), Some(cfg.placeholder_image.as_str()));
        assert_eq!(doc.elements[0].attr("srcset"), None);
        assert_eq!(doc.elements[1].attr("src"), Some("https://journal.example/b.png"));
        assert_eq!(doc.elements[2].attr("src"), Some("/relative/c.png"));
        assert_eq!(doc.elements[3].attr("src"), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn unknown_origin_replaces_every_remote_image() {
        let cfg = config();
        let page = PageSnapshot {
            elements: vec![img("http://journal.example/b.png")],
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &cfg);
        assert_eq!(doc.elements[0].attr("src"), Some(cfg.placeholder_image.as_str()));
    }

    #[test]
    fn background_prefers_body_then_root_then_fallback() {
        let mut page = PageSnapshot {
            body_background: Some("rgb(1, 2, 3)".into()),
            root_background: Some("rgb(9, 9, 9)".into()),
            ..Default::default()
        };
        assert_eq!(resolve_background(&page, "#f3f4f6"), "rgb(1, 2, 3)");

        page.body_background = Some("rgba(0, 0, 0, 0)".into());
        assert_eq!(resolve_background(&page, "#f3f4f6"), "rgb(9, 9, 9)");

        page.root_background = Some("transparent".into());
        assert_eq!(resolve_background(&page, "#f3f4f6"), "#f3f4f6");
    }

    #[test]
    fn root_and_body_get_forced_background() {
        let page = PageSnapshot {
            elements: vec![ElementNode::new("body")
                .with_attr("style", "margin: 0; background-color: oklch(1 0 0)")],
            root_background: Some("rgb(10, 20, 30)".into()),
            ..Default::default()
        };
        let doc = prepare_for_raster(&page, &config());
        let body = doc.elements.iter().find(|e| e.is("body")).unwrap();
        assert_eq!(
            body.attr("style"),
            Some("margin: 0; background-color: rgb(10, 20, 30)")
        );
        let html = doc.elements.iter().find(|e| e.is("html")).unwrap();
        assert_eq!(html.attr("style"), Some("background-color: rgb(10, 20, 30)"));
    }

    #[test]
    fn document_region_adds_scroll() {
        let rect = SelectionRect {
            left: 10.0,
            top: 20.0,
            width: 30.0,
            height: 40.0,
        };
        assert_eq!(
            document_region(&rect, 5.0, 100.0, 1000, 1000),
            Some(PixelRegion {
                x: 15,
                y: 120,
                width: 30,
                height: 40
            })
        );
        assert_eq!(document_region(&rect, 0.0, 2000.0, 1000, 1000), None);
    }
}
