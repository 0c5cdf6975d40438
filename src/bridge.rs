//! Access to the lighting bridge
//!
//! The [Bridge] trait is the contract the reconciler relies on. [HttpBridge] talks
//! to a real device over its REST API, [DummyBridge] keeps groups in memory.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{GroupId, GroupState, LightAction};

mod discovery;
pub use discovery::*;

mod dummy;
pub use dummy::DummyBridge;

mod http;
pub use http::HttpBridge;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("bridge rejected the request: {0}")]
    InvalidState(String),
    #[error("unauthorized user")]
    Unauthorized,
    #[error("link button not pressed")]
    LinkButtonNotPressed,
    #[error("bridge not configured")]
    NotConfigured,
    #[error("no bridge found")]
    NoBridgeFound,
    #[error("invalid response from bridge: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Protocol(error.to_string())
        } else if error.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            Self::NotFound(error.to_string())
        } else {
            Self::DeviceUnreachable(error.to_string())
        }
    }
}

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Fetch the current state of a group
    async fn get_group(&self, id: GroupId) -> Result<GroupState, BridgeError>;

    /// Apply an action to every light of a group. Unset fields are left untouched.
    async fn set_group_action(&self, id: GroupId, action: &LightAction)
        -> Result<(), BridgeError>;

    /// Fetch every group known to the bridge, ordered by id
    async fn get_all_groups(&self) -> Result<Vec<GroupState>, BridgeError>;
}

#[async_trait]
impl<B: Bridge + ?Sized> Bridge for Arc<B> {
    async fn get_group(&self, id: GroupId) -> Result<GroupState, BridgeError> {
        (**self).get_group(id).await
    }

    async fn set_group_action(
        &self,
        id: GroupId,
        action: &LightAction,
    ) -> Result<(), BridgeError> {
        (**self).set_group_action(id, action).await
    }

    async fn get_all_groups(&self) -> Result<Vec<GroupState>, BridgeError> {
        (**self).get_all_groups().await
    }
}
