//! Serde extensions

use serde::Deserialize;

use crate::models::ColorMode;

/// Deserialize a color mode, treating modes other than `ct` and `xy` (such as `hs`) as unset
pub fn deserialize_color_mode<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ColorMode>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.and_then(|mode| mode.parse().ok()))
}
