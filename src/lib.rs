//! `huectl` controls the rooms of a Hue-compatible lighting bridge from a web page.
//!
//! # Structure
//!
//! Requests from the web page carry partial changes (brightness, a hex color, a
//! color temperature in Kelvin). The [reconciler] turns them into complete group
//! actions in the device's own units, using the conversions of the [color]
//! module, and sends them through a [bridge::Bridge]. The resulting state is read
//! back, converted for display and broadcast to every connected page.
//!
//! # License
//!
//! This source code is released under the [MIT-License](https://opensource.org/licenses/MIT)

#[macro_use]
extern crate tracing;

pub mod bridge;
pub mod color;
pub mod global;
pub mod models;
pub mod reconciler;
pub mod serde;
pub mod web;
