//! Value ranges accepted by the bridge

/// Lowest brightness a group can be set to while on
pub const BRI_MIN: i32 = 1;
/// Full brightness
pub const BRI_MAX: i32 = 254;
/// Coolest color temperature, in mired (6500 K)
pub const CT_MIN: i32 = 153;
/// Warmest color temperature, in mired (2000 K)
pub const CT_MAX: i32 = 500;
pub const KELVIN_MIN: i32 = 2000;
pub const KELVIN_MAX: i32 = 6500;

pub fn clamp_brightness(bri: i32) -> i32 {
    bri.max(BRI_MIN).min(BRI_MAX)
}

pub fn clamp_mired(ct: i32) -> i32 {
    ct.max(CT_MIN).min(CT_MAX)
}

pub fn clamp_kelvin(kelvin: i32) -> i32 {
    kelvin.max(KELVIN_MIN).min(KELVIN_MAX)
}
