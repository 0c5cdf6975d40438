use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};

use super::{Bridge, BridgeError};
use crate::{
    color::Xy,
    models::{GroupId, GroupState, LightAction},
};

/// Error entry in a bridge response
#[derive(Debug, Deserialize)]
pub(super) struct ApiError {
    #[serde(rename = "type")]
    kind: u32,
    #[serde(default)]
    address: String,
    #[serde(default)]
    description: String,
}

impl From<ApiError> for BridgeError {
    fn from(error: ApiError) -> Self {
        match error.kind {
            1 => Self::Unauthorized,
            3 => Self::NotFound(error.address),
            101 => Self::LinkButtonNotPressed,
            2 | 5 | 6 | 7 | 201 => Self::InvalidState(error.description),
            other => Self::Protocol(format!("error {}: {}", other, error.description)),
        }
    }
}

/// Entry of the result list returned by write requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ApiResult {
    Success(serde_json::Value),
    Error(ApiError),
}

/// Fail with the first error of a response, if it is a list of results
pub(super) fn check_results(value: &serde_json::Value) -> Result<(), BridgeError> {
    if let serde_json::Value::Array(entries) = value {
        for entry in entries {
            if let Ok(ApiResult::Error(error)) = serde_json::from_value(entry.clone()) {
                return Err(error.into());
            }
        }
    }

    Ok(())
}

pub(super) fn build_client(timeout: Duration) -> Result<reqwest::Client, BridgeError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Body of a group action request
///
/// The color mode is derived by the bridge from whichever of `ct` and `xy` is
/// set, it can't be written directly.
#[derive(Debug, Serialize)]
struct WireAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bri: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ct: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    xy: Option<Xy>,
}

impl From<&LightAction> for WireAction {
    fn from(action: &LightAction) -> Self {
        Self {
            on: action.on,
            bri: action.brightness,
            ct: action.ct,
            xy: action.xy,
        }
    }
}

/// Bridge reached over its REST API
pub struct HttpBridge {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBridge {
    pub fn new(address: &str, username: &str, timeout: Duration) -> Result<Self, BridgeError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: format!("http://{}/api/{}", address, username),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BridgeError> {
        let value: serde_json::Value = self
            .client
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        check_results(&value)?;
        serde_json::from_value(value).map_err(|error| BridgeError::Protocol(error.to_string()))
    }
}

#[async_trait]
impl Bridge for HttpBridge {
    #[instrument(skip(self))]
    async fn get_group(&self, id: GroupId) -> Result<GroupState, BridgeError> {
        let mut group: GroupState = self.get(&format!("groups/{}", id)).await?;
        group.id = id;
        Ok(group)
    }

    #[instrument(skip(self))]
    async fn set_group_action(
        &self,
        id: GroupId,
        action: &LightAction,
    ) -> Result<(), BridgeError> {
        let body = WireAction::from(action);
        trace!(body = ?body, "sending group action");

        let value: serde_json::Value = self
            .client
            .put(self.url(&format!("groups/{}/action", id)))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        check_results(&value)
    }

    #[instrument(skip(self))]
    async fn get_all_groups(&self) -> Result<Vec<GroupState>, BridgeError> {
        let groups: BTreeMap<String, GroupState> = self.get("groups").await?;

        let mut groups: Vec<_> = groups
            .into_iter()
            .filter_map(|(key, mut group)| match key.parse() {
                Ok(id) => {
                    group.id = id;
                    Some(group)
                }
                Err(_) => {
                    warn!(key = %key, "ignoring group with invalid id");
                    None
                }
            })
            .collect();

        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }
}
