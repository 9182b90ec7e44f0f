//! OKLab / OKLCh to sRGB conversion.
//!
//! Pure math: opponent space -> non-linear LMS (cubed) -> XYZ (D65) ->
//! linear sRGB -> gamma-encoded sRGB, then clamp and quantise to 8 bits.

/// OKLab to LMS' (before cubing).
#[rustfmt::skip]
const LAB_TO_LMS: [f64; 9] = [
    1.0, 0.3963377773761749, 0.2158037573099136,
    1.0, -0.1055613458156586, -0.0638541728258133,
    1.0, -0.0894841775298119, -1.2914855480194092,
];

/// Linear LMS to XYZ (D65).
#[rustfmt::skip]
const LMS_TO_XYZ: [f64; 9] = [
    1.2268798758459243, -0.5578149944602171, 0.2813910456659647,
    -0.0405757452148008, 1.112286803280317, -0.0717110580655164,
    -0.0763729366746601, -0.4214933324022432, 1.5869240198367816,
];

/// XYZ (D65) to linear-light sRGB.
#[rustfmt::skip]
const XYZ_TO_LINEAR_SRGB: [f64; 9] = [
    3.2409699419045226, -1.537383177570094, -0.4986107602930034,
    -0.9692436362808796, 1.8759675015077202, 0.04155505740717559,
    0.05563007969699366, -0.20397695888897652, 1.0569715142428786,
];

/// Linear segment threshold of the sRGB transfer function.
const SRGB_LINEAR_LIMIT: f64 = 0.0031308;

fn mul(m: &[f64; 9], v: [f64; 3]) -> [f64; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// An 8-bit sRGB color with straight alpha in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f64,
}

impl Rgba {
    /// CSS serialisation; the alpha term is omitted when fully opaque.
    pub fn to_css(&self) -> String {
        if self.alpha >= 1.0 {
            format!("rgb({},{},{})", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{})", self.r, self.g, self.b, self.alpha)
        }
    }
}

/// Polar to rectangular. A NaN hue (`none`) is achromatic.
pub fn oklch_to_oklab(l: f64, c: f64, h: f64) -> [f64; 3] {
    if h.is_nan() {
        return [l, 0.0, 0.0];
    }
    let rad = h.to_radians();
    [l, c * rad.cos(), c * rad.sin()]
}

pub fn oklab_to_linear_srgb(lab: [f64; 3]) -> [f64; 3] {
    let lms = mul(&LAB_TO_LMS, lab).map(|v| v * v * v);
    let xyz = mul(&LMS_TO_XYZ, lms);
    mul(&XYZ_TO_LINEAR_SRGB, xyz)
}

/// sRGB transfer function, mirrored for negative inputs.
pub fn gamma_encode(c: f64) -> f64 {
    if c.abs() > SRGB_LINEAR_LIMIT {
        c.signum() * (1.055 * c.abs().powf(1.0 / 2.4) - 0.055)
    } else {
        12.92 * c
    }
}

fn quantize(c: f64) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn oklab_to_rgba(l: f64, a: f64, b: f64, alpha: f64) -> Rgba {
    let [r, g, bl] = oklab_to_linear_srgb([l, a, b]).map(gamma_encode);
    Rgba {
        r: quantize(r),
        g: quantize(g),
        b: quantize(bl),
        alpha: alpha.clamp(0.0, 1.0),
    }
}

pub fn oklch_to_rgba(l: f64, c: f64, h: f64, alpha: f64) -> Rgba {
    let [l, a, b] = oklch_to_oklab(l, c, h);
    oklab_to_rgba(l, a, b, alpha)
}
