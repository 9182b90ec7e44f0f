//! Color function normalizer.
//!
//! Page rasterizers only understand `rgb()/rgba()/hsl()/hsla()`, hex and
//! named colors. Modern stylesheets use `oklch()`, `oklab()` and
//! `color-mix()`, which make the rasterizer throw or paint gray. This
//! module rewrites those invocations into plain `rgb()`/`rgba()` text and
//! leaves every other byte of the input untouched.
//!
//! `color-mix()` is not blended: it is replaced by its first color
//! argument (a `var()` reference is kept as-is) or by neutral gray when no
//! usable first argument exists.

mod oklab;
mod parse;

pub use oklab::{oklab_to_rgba, oklch_to_rgba, Rgba};

use parse::{find_function, parse_hue, parse_scalar, split_components, split_top_level, top_level_tokens};
use regex::Regex;
use std::sync::LazyLock;

/// Replacement used when a perceptual color cannot be parsed.
pub const NEUTRAL_GRAY: &str = "rgb(128,128,128)";

/// Chroma and a/b percentages are relative to 0.4.
const CHROMA_PERCENT_REF: f64 = 0.4;

const PERCEPTUAL_FUNCTIONS: [&str; 2] = ["oklch", "oklab"];
const MIX_FUNCTION: [&str; 1] = ["color-mix"];

static UNSUPPORTED_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(oklch|oklab|color-mix)\(").unwrap());

static PLAIN_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(#[0-9a-f]{3,8}|[a-z]+|(rgba?|hsla?|hwb|var|oklch|oklab|color-mix)\(.*\))$").unwrap()
});

static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)%$").unwrap());

/// Cheap pre-check: does `css` contain anything `normalize` would touch?
pub fn needs_normalization(css: &str) -> bool {
    UNSUPPORTED_HINT.is_match(css)
}

/// Rewrites every `oklch()`, `oklab()` and `color-mix()` in `css` into
/// rasterizer-safe syntax.
///
/// Idempotent: the output contains no recognised invocation, so a second
/// pass returns it unchanged.
pub fn normalize(css: &str) -> String {
    if !needs_normalization(css) {
        return css.to_string();
    }
    // A bare-word first color can join the text after it into a new mix.
    let mut mixed = replace_all(css, &MIX_FUNCTION, |_, args| replace_mix(args));
    while find_function(&mixed, &MIX_FUNCTION, 0).is_some() {
        let next = replace_all(&mixed, &MIX_FUNCTION, |_, args| replace_mix(args));
        if next == mixed {
            break;
        }
        mixed = next;
    }
    let out = replace_all(&mixed, &PERCEPTUAL_FUNCTIONS, |idx, args| match idx {
        0 => convert_oklch(args),
        _ => convert_oklab(args),
    });
    log::debug!("[COLOR] Normalized {} bytes -> {} bytes", css.len(), out.len());
    out
}

/// Single left-to-right pass replacing each balanced invocation of `names`.
fn replace_all(text: &str, names: &[&str], mut replace: impl FnMut(usize, &str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some((span, idx)) = find_function(text, names, cursor) {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&replace(idx, span.args(text)));
        cursor = span.end();
    }
    out.push_str(&text[cursor..]);
    out
}

/// Converts the argument list of an `oklch()` call.
pub fn convert_oklch(args: &str) -> String {
    parse_oklch(args)
        .map(|c| c.to_css())
        .unwrap_or_else(|| NEUTRAL_GRAY.to_string())
}

/// Converts the argument list of an `oklab()` call.
pub fn convert_oklab(args: &str) -> String {
    parse_oklab(args)
        .map(|c| c.to_css())
        .unwrap_or_else(|| NEUTRAL_GRAY.to_string())
}

fn parse_alpha(alpha: Option<&str>) -> Option<f64> {
    match alpha {
        None => Some(1.0),
        Some(token) => parse_scalar(token, 1.0),
    }
}

fn parse_oklch(args: &str) -> Option<Rgba> {
    let raw = split_components(args)?;
    let [l, c, h] = raw.channels;
    let l = parse_scalar(l, 1.0)?;
    let c = parse_scalar(c, CHROMA_PERCENT_REF)?.max(0.0);
    let h = parse_hue(h)?;
    let alpha = parse_alpha(raw.alpha)?;
    Some(oklch_to_rgba(l, c, h, alpha))
}

fn parse_oklab(args: &str) -> Option<Rgba> {
    let raw = split_components(args)?;
    let [l, a, b] = raw.channels;
    let l = parse_scalar(l, 1.0)?;
    let a = parse_scalar(a, CHROMA_PERCENT_REF)?;
    let b = parse_scalar(b, CHROMA_PERCENT_REF)?;
    let alpha = parse_alpha(raw.alpha)?;
    Some(oklab_to_rgba(l, a, b, alpha))
}

/// Replacement text for a `color-mix()` argument list: its first color.
fn replace_mix(args: &str) -> String {
    let parts = split_top_level(args, b',');
    let first_color = match parts.first() {
        Some(head) if is_interpolation_clause(head) => parts.get(1).copied(),
        Some(head) => Some(*head),
        None => None,
    };

    let candidate = first_color.map(strip_percentages).unwrap_or_default();
    if candidate.is_empty() || !PLAIN_COLOR.is_match(&candidate) {
        log::debug!("[COLOR] color-mix({}) has no usable first color", args.trim());
        return NEUTRAL_GRAY.to_string();
    }
    // A nested mix collapses the same way.
    replace_all(&candidate, &MIX_FUNCTION, |_, inner| replace_mix(inner))
}

fn is_interpolation_clause(part: &str) -> bool {
    let trimmed = part.trim_start();
    trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("in "))
}

/// Drops `40%`-style weights from a mix argument.
fn strip_percentages(part: &str) -> String {
    top_level_tokens(part)
        .into_iter()
        .filter(|t| !PERCENTAGE.is_match(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes an optional style value, returning `None` when empty.
pub fn normalize_value(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(normalize)
}
