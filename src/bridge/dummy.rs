use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Bridge, BridgeError, DiscoveredBridge, RegisteredUser};
use crate::{
    color::Xy,
    models::{clamp_brightness, clamp_mired, ColorMode, GroupId, GroupState, LightAction},
};

/// In-memory bridge
///
/// Applies actions the way a bridge does: writing `ct` or `xy` switches the color
/// mode, and the power state of a group follows `on`. Every transmitted action is
/// recorded.
#[derive(Default)]
pub struct DummyBridge {
    groups: Mutex<BTreeMap<GroupId, GroupState>>,
    sent: Mutex<Vec<(GroupId, LightAction)>>,
    unreachable: AtomicBool,
}

impl DummyBridge {
    pub fn new(groups: impl IntoIterator<Item = GroupState>) -> Self {
        Self {
            groups: Mutex::new(groups.into_iter().map(|group| (group.id, group)).collect()),
            ..Default::default()
        }
    }

    /// A bridge with a few rooms in various states
    pub fn with_demo_rooms() -> Self {
        let mut living_room = GroupState::room(1, "Living room");
        living_room.lights = vec!["1".to_owned(), "2".to_owned(), "3".to_owned()];
        living_room.state.all_on = true;
        living_room.state.any_on = true;
        living_room.action = LightAction {
            on: Some(true),
            brightness: Some(200),
            color_mode: Some(ColorMode::Ct),
            ct: Some(366),
            xy: Some(Xy::new(0.4573, 0.41)),
            hex: None,
        };

        let mut bedroom = GroupState::room(2, "Bedroom");
        bedroom.lights = vec!["4".to_owned(), "5".to_owned()];
        bedroom.action = LightAction {
            on: Some(false),
            brightness: Some(120),
            color_mode: Some(ColorMode::Xy),
            ct: Some(250),
            xy: Some(Xy::new(0.5, 0.35)),
            hex: None,
        };

        let mut kitchen = GroupState::room(3, "Kitchen");
        kitchen.lights = vec!["6".to_owned()];
        kitchen.action = LightAction {
            on: Some(false),
            ..Default::default()
        };

        let mut entertainment = GroupState::room(4, "TV area");
        entertainment.kind = "Entertainment".to_owned();
        entertainment.lights = vec!["1".to_owned(), "2".to_owned()];

        Self::new(vec![living_room, bedroom, kitchen, entertainment])
    }

    /// Make every following request fail as if the bridge went offline
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Actions transmitted so far, oldest first
    pub fn sent_actions(&self) -> Vec<(GroupId, LightAction)> {
        lock(&self.sent).clone()
    }

    pub fn discovered(&self) -> DiscoveredBridge {
        DiscoveredBridge {
            id: "dummy".to_owned(),
            address: "127.0.0.1".to_owned(),
            port: None,
        }
    }

    pub fn register(&self) -> RegisteredUser {
        RegisteredUser {
            username: "dummy-user".to_owned(),
        }
    }

    fn check_reachable(&self) -> Result<(), BridgeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(BridgeError::DeviceUnreachable(
                "dummy bridge is offline".to_owned(),
            ))
        } else {
            Ok(())
        }
    }

    fn not_found(id: GroupId) -> BridgeError {
        BridgeError::NotFound(format!("/groups/{}", id))
    }
}

/// Lock, ignoring poisoning
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply(group: &mut GroupState, action: &LightAction) {
    let current = &mut group.action;

    if let Some(on) = action.on {
        current.on = Some(on);
        group.state.any_on = on;
        group.state.all_on = on;
    }

    if let Some(bri) = action.brightness {
        current.brightness = Some(clamp_brightness(bri));
    }

    if let Some(ct) = action.ct {
        current.ct = Some(clamp_mired(ct));
        current.color_mode = Some(ColorMode::Ct);
    }

    // xy takes precedence over ct when both are written
    if let Some(xy) = action.xy {
        current.xy = Some(xy);
        current.color_mode = Some(ColorMode::Xy);
    }
}

#[async_trait]
impl Bridge for DummyBridge {
    async fn get_group(&self, id: GroupId) -> Result<GroupState, BridgeError> {
        self.check_reachable()?;

        lock(&self.groups)
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn set_group_action(
        &self,
        id: GroupId,
        action: &LightAction,
    ) -> Result<(), BridgeError> {
        self.check_reachable()?;

        let mut groups = lock(&self.groups);
        let group = groups.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        apply(group, action);
        lock(&self.sent).push((id, action.clone()));

        trace!(id, action = ?action, "dummy bridge applied action");
        Ok(())
    }

    async fn get_all_groups(&self) -> Result<Vec<GroupState>, BridgeError> {
        self.check_reachable()?;
        Ok(lock(&self.groups).values().cloned().collect())
    }
}
