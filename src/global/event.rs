use serde_derive::Serialize;

use crate::models::{GroupId, LightAction};

/// Notification sent to every connected WebSocket client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    RoomUpdated { room_id: GroupId, action: LightAction },
}

impl Event {
    pub fn room_updated(room_id: GroupId, action: LightAction) -> Self {
        Self::RoomUpdated { room_id, action }
    }
}
