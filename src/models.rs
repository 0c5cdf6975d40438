use serde_derive::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::color::Xy;

mod config;
pub use config::*;

mod limits;
pub use limits::*;

/// Identifier of a group (room) on the bridge
pub type GroupId = u32;

/// Which of `ct` or `xy` is authoritative for a group's color
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColorMode {
    Ct,
    Xy,
}

/// What a group is doing, or what a caller wants to change about it
///
/// Every field is optional: `None` means "not requested" in a delta and "not
/// reported" in a device state, never "zero" or "off".
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    /// Brightness, `1..=254` on the device
    #[serde(rename = "bri", skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i32>,
    #[serde(
        rename = "colormode",
        deserialize_with = "crate::serde::deserialize_color_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub color_mode: Option<ColorMode>,
    /// Color temperature, in mired on the device and in Kelvin once normalized for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<Xy>,
    /// sRGB hex color, derived from `xy` for display or requested by a client
    #[serde(rename = "color", skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

impl LightAction {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether any field the device accepts in a write is set
    ///
    /// `colormode` is read-only on the device and `color` only exists for display.
    pub fn has_device_values(&self) -> bool {
        self.on.is_some() || self.brightness.is_some() || self.ct.is_some() || self.xy.is_some()
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupStatus {
    pub all_on: bool,
    pub any_on: bool,
}

/// A group of lights as reported by the bridge
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupState {
    pub id: GroupId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub lights: Vec<String>,
    pub state: GroupStatus,
    pub action: LightAction,
}

impl GroupState {
    pub const ROOM: &'static str = "Room";

    pub fn room(id: GroupId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            kind: Self::ROOM.to_owned(),
            ..Default::default()
        }
    }

    pub fn is_room(&self) -> bool {
        self.kind == Self::ROOM
    }
}
