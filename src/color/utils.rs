//! Color utilities

use hex::FromHex;

use super::RgbColor;

/// Return the approximate color of a black body at a given temperature
///
/// # Parameters
///
/// * `t`: temperature in Kelvin
fn kelvin_to_rgbf64(t: f64) -> (f64, f64, f64) {
    // http://www.tannerhelland.com/4435/convert-temperature-rgb-algorithm-code/
    //
    // Check bounds on temperature
    let t = t.max(1000.0).min(40000.0);

    // Scale
    let t = t / 100.0;

    let (r, g, b) = if t <= 66.0 {
        let b = if t <= 20.0 {
            0.0
        } else {
            138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
        };

        (255.0, 99.470_802_586_1 * (t - 2.0).ln() - 161.119_568_166_1, b)
    } else {
        (
            329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2),
            288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2),
            255.0,
        )
    };

    (r, g, b)
}

fn clamp_channel(c: f64) -> u8 {
    c.round().max(0.0).min(255.0) as u8
}

/// Hex color of a black body at `kelvin`, for display swatches
pub fn kelvin_to_hex(kelvin: u32) -> String {
    let (r, g, b) = kelvin_to_rgbf64(f64::from(kelvin));
    rgb_to_hex(RgbColor::new(
        clamp_channel(r),
        clamp_channel(g),
        clamp_channel(b),
    ))
}

/// # Panics
///
/// If `kelvin` is zero.
pub fn kelvin_to_mired(kelvin: u32) -> u32 {
    assert!(kelvin != 0, "kelvin_to_mired called with 0 K");
    (1_000_000.0 / f64::from(kelvin)).round() as u32
}

/// # Panics
///
/// If `mired` is zero.
pub fn mired_to_kelvin(mired: u32) -> u32 {
    assert!(mired != 0, "mired_to_kelvin called with 0 mired");
    (1_000_000.0 / f64::from(mired)).round() as u32
}

/// Parse `rrggbb` or `#rrggbb`, case-insensitively
pub fn hex_to_rgb(s: &str) -> Option<RgbColor> {
    let digits = s.strip_prefix('#').unwrap_or(s);
    let [r, g, b] = <[u8; 3]>::from_hex(digits).ok()?;
    Some(RgbColor::new(r, g, b))
}

/// Format as lowercase `#rrggbb`
pub fn rgb_to_hex(color: RgbColor) -> String {
    format!("#{}", hex::encode([color.red, color.green, color.blue]))
}
