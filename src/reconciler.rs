//! Turning partial light changes into complete group updates
//!
//! A request goes through four steps: the current group state is fetched, the
//! outgoing action is computed from it and the requested delta, the action is
//! transmitted, and the resulting state is read back and normalized for display.
//! Nothing is cached between requests.
//!
//! Two concurrent requests on the same group may interleave these steps, so the
//! second one can compute its action from a state the first one is about to
//! change. The bridge has no conditional writes, so this race is accepted unless
//! [GroupLocks] are used to serialize updates per group.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_derive::Serialize;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::{
    bridge::{Bridge, BridgeError},
    color::{hex_to_rgb, kelvin_to_hex, mired_to_kelvin, rgb_to_hex, rgb_to_xy, xy_to_rgb, HUE_GAMUT},
    models::{
        clamp_brightness, clamp_kelvin, clamp_mired, ColorMode, GroupId, GroupState, LightAction,
        BRI_MAX,
    },
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("malformed color: {0:?}")]
    MalformedColor(String),
}

/// Result of a successful update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub success: bool,
    /// State of the group after the update, as shown to users
    #[serde(rename = "action")]
    pub normalized: LightAction,
}

/// Compute the action to transmit for `delta`, given the `prior` state of the group
///
/// Only the fields that need to change are set, so the bridge keeps its current
/// values for the others.
pub fn compute_delta(prior: &GroupState, delta: &LightAction) -> Result<LightAction, ReconcileError> {
    let mut outgoing = LightAction {
        on: delta.on,
        ..Default::default()
    };

    let powering_on = delta.on == Some(true);

    // Lights turned on from a fully off group get an explicit brightness
    if delta.brightness.is_some() || (powering_on && !prior.state.any_on) {
        let bri = delta
            .brightness
            .or(prior.action.brightness)
            .unwrap_or(BRI_MAX);
        outgoing.brightness = Some(clamp_brightness(bri));
    }

    if let Some(ct) = delta.ct {
        outgoing.ct = Some(clamp_mired(ct));
    }

    if let Some(hex) = &delta.hex {
        let rgb = hex_to_rgb(hex).ok_or_else(|| ReconcileError::MalformedColor(hex.clone()))?;
        outgoing.xy = Some(HUE_GAMUT.closest_point(rgb_to_xy(rgb)));
    } else if let Some(xy) = delta.xy {
        outgoing.xy = Some(HUE_GAMUT.closest_point(xy));
    }

    outgoing.color_mode = if let Some(mode) = delta.color_mode {
        Some(mode)
    } else if outgoing.xy.is_some() {
        Some(ColorMode::Xy)
    } else if outgoing.ct.is_some() {
        Some(ColorMode::Ct)
    } else if outgoing.brightness.is_some() || powering_on {
        // Re-send the current color, a bare brightness change may otherwise reset it
        let mode = prior.action.color_mode.unwrap_or(ColorMode::Ct);

        match mode {
            ColorMode::Ct => outgoing.ct = prior.action.ct.map(clamp_mired),
            ColorMode::Xy => outgoing.xy = prior.action.xy,
        }

        Some(mode)
    } else {
        None
    };

    Ok(outgoing)
}

/// Convert a device action for display
///
/// `ct` becomes Kelvin, and `hex` is derived from `xy` at the current
/// brightness, or from `ct` if there is no `xy`.
pub fn normalize_action(action: &LightAction) -> LightAction {
    let mut normalized = LightAction {
        on: action.on,
        brightness: action.brightness,
        color_mode: action.color_mode,
        xy: action.xy,
        ..Default::default()
    };

    if let Some(ct) = action.ct {
        let kelvin = mired_to_kelvin(clamp_mired(ct) as u32);
        normalized.ct = Some(clamp_kelvin(kelvin as i32));
    }

    if let Some(xy) = action.xy {
        let brightness = match action.brightness {
            Some(bri) if bri > 0 => f64::from(bri) / f64::from(BRI_MAX),
            _ => 1.0,
        };

        normalized.hex = Some(rgb_to_hex(xy_to_rgb(
            HUE_GAMUT.closest_point(xy),
            brightness,
        )));
    } else if let Some(kelvin) = normalized.ct {
        normalized.hex = Some(kelvin_to_hex(kelvin as u32));
    }

    normalized
}

type GroupLockMap = HashMap<GroupId, Arc<tokio::sync::Mutex<()>>>;

/// Per-group locks serializing concurrent updates of the same group
///
/// Only groups that are locked or waited on have an entry.
#[derive(Debug, Default, Clone)]
pub struct GroupLocks(Arc<Mutex<GroupLockMap>>);

/// Held while a group is being updated, see [GroupLocks::lock]
pub struct GroupGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<tokio::sync::Mutex<()>>,
    id: GroupId,
    locks: GroupLocks,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, GroupLockMap> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn lock(&self, id: GroupId) -> GroupGuard {
        let lock = self.map().entry(id).or_default().clone();
        let guard = lock.clone().lock_owned().await;

        GroupGuard {
            guard: Some(guard),
            lock,
            id,
            locks: self.clone(),
        }
    }

    /// Number of groups currently locked or waited on
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.guard.take();

        // Clones are only taken with the map locked, so nobody else can be
        // waiting on this lock when the map and this guard are its only owners
        let mut map = self.locks.map();
        if Arc::strong_count(&self.lock) <= 2 {
            map.remove(&self.id);
        }
    }
}

pub struct Reconciler<B> {
    bridge: B,
    locks: Option<GroupLocks>,
}

impl<B: Bridge> Reconciler<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            locks: None,
        }
    }

    pub fn with_group_locks(mut self, locks: GroupLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Apply `delta` to group `id` and return its new normalized state
    ///
    /// Bridge errors abort the update. Whatever the bridge committed before
    /// failing is not rolled back.
    #[instrument(skip(self, delta))]
    pub async fn reconcile_and_apply(
        &self,
        id: GroupId,
        delta: &LightAction,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(id).await),
            None => None,
        };

        let prior = self.bridge.get_group(id).await?;
        debug!(name = %prior.name, state = ?prior.state, action = ?prior.action, "current group state");

        let outgoing = compute_delta(&prior, delta)?;
        debug!(requested = ?delta, outgoing = ?outgoing, "computed group action");

        // The bridge derives the color mode from the values written, a mode
        // alone changes nothing
        if !outgoing.has_device_values() {
            debug!("nothing to change");
        } else {
            self.bridge.set_group_action(id, &outgoing).await?;
        }

        let confirmed = self.bridge.get_group(id).await?;
        let normalized = normalize_action(&confirmed.action);
        info!(name = %confirmed.name, state = ?confirmed.state, action = ?normalized, "group updated");

        Ok(ReconcileOutcome {
            success: true,
            normalized,
        })
    }

    /// List every room with its normalized action
    #[instrument(skip(self))]
    pub async fn list_rooms(&self) -> Result<Vec<GroupState>, ReconcileError> {
        Ok(self
            .bridge
            .get_all_groups()
            .await?
            .into_iter()
            .filter(GroupState::is_room)
            .map(|mut room| {
                room.action = normalize_action(&room.action);
                room
            })
            .collect())
    }

    /// Fetch a group without converting its action
    pub async fn group(&self, id: GroupId) -> Result<GroupState, ReconcileError> {
        Ok(self.bridge.get_group(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{bridge::DummyBridge, color::Xy};

    fn prior(any_on: bool, action: LightAction) -> GroupState {
        let mut group = GroupState::room(1, "Office");
        group.state.any_on = any_on;
        group.state.all_on = any_on;
        group.action = action;
        group
    }

    fn ct_prior() -> GroupState {
        prior(
            true,
            LightAction {
                on: Some(true),
                brightness: Some(200),
                color_mode: Some(ColorMode::Ct),
                ct: Some(300),
                xy: Some(Xy::new(0.45, 0.4)),
                hex: None,
            },
        )
    }

    #[test]
    fn test_brightness_change_reasserts_color() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                brightness: Some(100),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(
            outgoing,
            LightAction {
                brightness: Some(100),
                color_mode: Some(ColorMode::Ct),
                ct: Some(300),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_brightness_change_reasserts_xy() {
        let mut prior = ct_prior();
        prior.action.color_mode = Some(ColorMode::Xy);

        let outgoing = compute_delta(
            &prior,
            &LightAction {
                brightness: Some(50),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.color_mode, Some(ColorMode::Xy));
        assert_eq!(outgoing.xy, Some(Xy::new(0.45, 0.4)));
        assert_eq!(outgoing.ct, None);
    }

    #[test]
    fn test_power_on_defaults_to_full_brightness() {
        let outgoing = compute_delta(
            &prior(false, LightAction::default()),
            &LightAction {
                on: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.on, Some(true));
        assert_eq!(outgoing.brightness, Some(254));
        // Unknown prior mode is assumed to be ct, with no value to re-send
        assert_eq!(outgoing.color_mode, Some(ColorMode::Ct));
        assert_eq!(outgoing.ct, None);
    }

    #[test]
    fn test_power_on_restores_prior_brightness() {
        let mut prior = ct_prior();
        prior.state.any_on = false;

        let outgoing = compute_delta(
            &prior,
            &LightAction {
                on: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.brightness, Some(200));
        assert_eq!(outgoing.ct, Some(300));
    }

    #[test]
    fn test_power_on_while_on_keeps_brightness() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                on: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.brightness, None);
        assert_eq!(outgoing.color_mode, Some(ColorMode::Ct));
    }

    #[test]
    fn test_power_off_only() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                on: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(
            outgoing,
            LightAction {
                on: Some(false),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_clamps_brightness_and_ct() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                brightness: Some(1000),
                ct: Some(20),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.brightness, Some(254));
        assert_eq!(outgoing.ct, Some(153));
        assert_eq!(outgoing.color_mode, Some(ColorMode::Ct));

        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                brightness: Some(0),
                ct: Some(9000),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.brightness, Some(1));
        assert_eq!(outgoing.ct, Some(500));
    }

    #[test]
    fn test_hex_color_switches_to_xy() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                hex: Some("#00ff00".to_owned()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.color_mode, Some(ColorMode::Xy));
        assert_eq!(outgoing.ct, None);
        assert_eq!(outgoing.brightness, None);

        let xy = outgoing.xy.unwrap();
        assert!((xy.x - 0.409).abs() < 0.01, "{:?}", xy);
        assert!((xy.y - 0.518).abs() < 0.01, "{:?}", xy);
    }

    #[test]
    fn test_malformed_hex_is_rejected() {
        let error = compute_delta(
            &ct_prior(),
            &LightAction {
                hex: Some("#nope".to_owned()),
                ..Default::default()
            },
        )
        .unwrap_err();

        assert!(matches!(error, ReconcileError::MalformedColor(hex) if hex == "#nope"));
    }

    #[test]
    fn test_raw_xy_is_clamped_to_gamut() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                xy: Some(Xy::new(0.1, 0.8)),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(HUE_GAMUT.contains(outgoing.xy.unwrap()));
        assert_eq!(outgoing.color_mode, Some(ColorMode::Xy));
    }

    #[test]
    fn test_explicit_color_mode_wins() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                brightness: Some(10),
                color_mode: Some(ColorMode::Xy),
                ct: Some(400),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.color_mode, Some(ColorMode::Xy));
        assert_eq!(outgoing.ct, Some(400));
        // No re-assertion when the mode is explicit
        assert_eq!(outgoing.xy, None);
    }

    #[test]
    fn test_ct_with_brightness_is_not_overridden() {
        let outgoing = compute_delta(
            &ct_prior(),
            &LightAction {
                brightness: Some(80),
                ct: Some(450),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(outgoing.ct, Some(450));
        assert_eq!(outgoing.color_mode, Some(ColorMode::Ct));
    }

    #[test]
    fn test_empty_delta() {
        assert!(compute_delta(&ct_prior(), &LightAction::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_normalize_ct() {
        let normalized = normalize_action(&LightAction {
            on: Some(true),
            brightness: Some(254),
            color_mode: Some(ColorMode::Ct),
            ct: Some(500),
            ..Default::default()
        });

        assert_eq!(normalized.ct, Some(2000));
        assert_eq!(normalized.hex, Some(kelvin_to_hex(2000)));

        // 153 mired is 6536 K, past the displayed range
        let normalized = normalize_action(&LightAction {
            ct: Some(153),
            ..Default::default()
        });
        assert_eq!(normalized.ct, Some(6500));

        // Out of range device values are clamped before conversion
        let normalized = normalize_action(&LightAction {
            ct: Some(0),
            ..Default::default()
        });
        assert_eq!(normalized.ct, Some(6500));
    }

    #[test]
    fn test_normalize_xy_uses_brightness() {
        let xy = Xy::new(0.4, 0.4);

        let bright = normalize_action(&LightAction {
            brightness: Some(254),
            xy: Some(xy),
            ..Default::default()
        });
        let dim = normalize_action(&LightAction {
            brightness: Some(50),
            xy: Some(xy),
            ..Default::default()
        });
        let unknown = normalize_action(&LightAction {
            xy: Some(xy),
            ..Default::default()
        });

        assert_eq!(bright.xy, Some(xy));
        assert_eq!(bright.hex, unknown.hex);
        assert_ne!(bright.hex, dim.hex);

        let bright = hex_to_rgb(bright.hex.as_deref().unwrap()).unwrap();
        let dim = hex_to_rgb(dim.hex.as_deref().unwrap()).unwrap();
        assert!(dim.red < bright.red);
    }

    #[test]
    fn test_normalize_xy_on_axis() {
        // y = 0 is clamped to the gamut instead of dividing by zero
        let normalized = normalize_action(&LightAction {
            xy: Some(Xy::new(0.0, 0.0)),
            ..Default::default()
        });
        assert!(normalized.hex.is_some());
    }

    #[tokio::test]
    async fn test_reconcile_and_apply_hex() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let reconciler = Reconciler::new(bridge.clone());

        let outcome = reconciler
            .reconcile_and_apply(
                1,
                &LightAction {
                    hex: Some("#00ff00".to_owned()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sent = bridge.sent_actions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1);
        assert_eq!(sent[0].1.color_mode, Some(ColorMode::Xy));
        assert_eq!(sent[0].1.ct, None);

        assert!(outcome.success);
        assert_eq!(outcome.normalized.color_mode, Some(ColorMode::Xy));
        assert_eq!(outcome.normalized.brightness, Some(200));
        assert!(outcome.normalized.hex.is_some());
        // 366 mired
        assert_eq!(outcome.normalized.ct, Some(2732));
    }

    #[tokio::test]
    async fn test_reconcile_and_apply_brightness() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let reconciler = Reconciler::new(bridge.clone());

        let outcome = reconciler
            .reconcile_and_apply(
                1,
                &LightAction {
                    brightness: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (_, sent) = &bridge.sent_actions()[0];
        assert_eq!(sent.ct, Some(366));
        assert_eq!(sent.color_mode, Some(ColorMode::Ct));
        assert_eq!(outcome.normalized.brightness, Some(100));
        assert_eq!(outcome.normalized.color_mode, Some(ColorMode::Ct));
    }

    #[tokio::test]
    async fn test_reconcile_and_apply_errors() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let reconciler = Reconciler::new(bridge.clone());
        let delta = LightAction {
            on: Some(true),
            ..Default::default()
        };

        assert!(matches!(
            reconciler.reconcile_and_apply(99, &delta).await,
            Err(ReconcileError::Bridge(BridgeError::NotFound(_)))
        ));

        bridge.set_unreachable(true);
        assert!(matches!(
            reconciler.reconcile_and_apply(1, &delta).await,
            Err(ReconcileError::Bridge(BridgeError::DeviceUnreachable(_)))
        ));

        bridge.set_unreachable(false);
        assert!(matches!(
            reconciler
                .reconcile_and_apply(
                    1,
                    &LightAction {
                        hex: Some("bad".to_owned()),
                        ..Default::default()
                    }
                )
                .await,
            Err(ReconcileError::MalformedColor(_))
        ));

        // Nothing was transmitted by the failed requests
        assert!(bridge.sent_actions().is_empty());
    }

    #[tokio::test]
    async fn test_empty_delta_is_not_transmitted() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let outcome = Reconciler::new(bridge.clone())
            .reconcile_and_apply(2, &LightAction::default())
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(bridge.sent_actions().is_empty());
    }

    #[tokio::test]
    async fn test_color_mode_alone_is_not_transmitted() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let outcome = Reconciler::new(bridge.clone())
            .reconcile_and_apply(
                1,
                &LightAction {
                    color_mode: Some(ColorMode::Xy),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.normalized.color_mode, Some(ColorMode::Ct));
        assert!(bridge.sent_actions().is_empty());
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let reconciler = Reconciler::new(Arc::new(DummyBridge::with_demo_rooms()));
        let rooms = reconciler.list_rooms().await.unwrap();

        assert_eq!(
            rooms.iter().map(|room| room.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(rooms[0].action.ct, Some(2732));
        assert!(rooms[1].action.hex.is_some());
        assert_eq!(rooms[2].action.hex, None);
    }

    #[tokio::test]
    async fn test_group_locks_serialize() {
        let locks = GroupLocks::new();
        let guard = locks.lock(1).await;

        // Another group is not blocked
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(other.is_ok());

        // The same group is
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_group_locks_are_released() {
        let locks = GroupLocks::new();

        for id in 0..10_000 {
            drop(locks.lock(id).await);
        }
        assert!(locks.is_empty());

        let guard = locks.lock(7).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_group_lock_kept_while_waited_on() {
        let locks = GroupLocks::new();
        let guard = locks.lock(3).await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _guard = locks.lock(3).await;
            }
        });

        // Let the waiter queue up on the lock
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_with_locks() {
        let bridge = Arc::new(DummyBridge::with_demo_rooms());
        let reconciler =
            Arc::new(Reconciler::new(bridge.clone()).with_group_locks(GroupLocks::new()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    reconciler
                        .reconcile_and_apply(
                            1,
                            &LightAction {
                                brightness: Some(10 + i),
                                ..Default::default()
                            },
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(bridge.sent_actions().len(), 8);
    }
}
