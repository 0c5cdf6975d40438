//! Conversions between sRGB, CIE 1931 xy chromaticity and color temperature
//!
//! Every function in this module is pure. Out-of-range numeric input is
//! clamped instead of rejected; the only fallible operation is hex parsing,
//! which returns `None` on malformed input.

use palette::{LinSrgb, Srgb};
use serde_derive::{Deserialize, Serialize};

mod gamut;
pub use gamut::{closest_point_on_gamut, Gamut, HUE_GAMUT};

mod utils;
pub use utils::{hex_to_rgb, kelvin_to_hex, kelvin_to_mired, mired_to_kelvin, rgb_to_hex};

/// 8-bit sRGB color
pub type RgbColor = Srgb<u8>;

/// Chromaticity coordinates in the CIE 1931 xy plane
///
/// Serialized as a `[x, y]` array, which is how the bridge exchanges them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Xy) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Xy {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Xy> for [f64; 2] {
    fn from(xy: Xy) -> Self {
        [xy.x, xy.y]
    }
}

/// Linear RGB to XYZ, Wide RGB D65
const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.664_511, 0.154_324, 0.162_028],
    [0.283_881, 0.668_433, 0.047_685],
    [0.000_088, 0.072_310, 0.986_039],
];

/// XYZ to linear RGB, Wide RGB D65
const XYZ_TO_RGB: [[f64; 3]; 3] = [
    [1.656_492, -0.354_851, -0.255_038],
    [-0.707_196, 1.655_397, 0.036_152],
    [0.051_713, -0.121_364, 1.011_530],
];

/// Chromaticity returned for pure black, which has no defined xy
pub const BLACK_FALLBACK: Xy = Xy::new(0.5, 0.5);

fn mul(m: &[[f64; 3]; 3], (a, b, c): (f64, f64, f64)) -> (f64, f64, f64) {
    (
        m[0][0] * a + m[0][1] * b + m[0][2] * c,
        m[1][0] * a + m[1][1] * b + m[1][2] * c,
        m[2][0] * a + m[2][1] * b + m[2][2] * c,
    )
}

fn to_channel(c: f64) -> u8 {
    (c * 255.0).round().max(0.0).min(255.0) as u8
}

/// Convert an sRGB color to its chromaticity
///
/// Brightness is discarded. Black maps to [BLACK_FALLBACK].
pub fn rgb_to_xy(color: RgbColor) -> Xy {
    let linear: LinSrgb<f64> = color.into_format::<f64>().into_linear();
    let (big_x, big_y, big_z) = mul(&RGB_TO_XYZ, linear.into_components());

    let sum = big_x + big_y + big_z;
    if sum == 0.0 {
        return BLACK_FALLBACK;
    }

    Xy::new(big_x / sum, big_y / sum)
}

/// Convert a chromaticity and a relative brightness in `[0, 1]` to sRGB
///
/// Channels that fall outside of the sRGB range are clamped independently.
///
/// # Panics
///
/// In debug builds, if `xy.y` is zero. Callers clamp `xy` to a [Gamut] first,
/// whose vertices all have a positive `y`.
pub fn xy_to_rgb(xy: Xy, brightness: f64) -> RgbColor {
    debug_assert!(xy.y != 0.0, "xy_to_rgb called with y = 0");

    let big_y = brightness;
    let big_x = big_y / xy.y * xy.x;
    let big_z = big_y / xy.y * (1.0 - xy.x - xy.y);

    let (r, g, b) = mul(&XYZ_TO_RGB, (big_x, big_y, big_z));
    let encoded: Srgb<f64> = Srgb::from_linear(LinSrgb::new(r, g, b));

    RgbColor::new(
        to_channel(encoded.red),
        to_channel(encoded.green),
        to_channel(encoded.blue),
    )
}
