//! Finding a bridge on the local network and registering a user on it

use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use super::{
    http::{build_client, check_results, ApiResult},
    BridgeError,
};

/// Discovery service listing the bridges seen on the caller's network
pub const DISCOVERY_ENDPOINT: &str = "https://discovery.meethue.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredBridge {
    pub id: String,
    #[serde(rename(deserialize = "internalipaddress", serialize = "ipaddress"))]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub username: String,
}

#[instrument]
pub async fn discover_bridges(timeout: Duration) -> Result<Vec<DiscoveredBridge>, BridgeError> {
    let bridges: Vec<DiscoveredBridge> = build_client(timeout)?
        .get(DISCOVERY_ENDPOINT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    info!(count = bridges.len(), "discovered bridges");
    Ok(bridges)
}

/// Extract the user created by a registration request
fn parse_registration(value: serde_json::Value) -> Result<RegisteredUser, BridgeError> {
    check_results(&value)?;

    let results: Vec<ApiResult> = serde_json::from_value(value)
        .map_err(|error| BridgeError::Protocol(error.to_string()))?;

    results
        .into_iter()
        .find_map(|result| match result {
            ApiResult::Success(success) => serde_json::from_value(success).ok(),
            ApiResult::Error(_) => None,
        })
        .ok_or_else(|| BridgeError::Protocol("no username in registration response".to_owned()))
}

/// Create a user on the bridge at `address`
///
/// The bridge only accepts this shortly after its link button was pressed.
#[instrument]
pub async fn register_user(
    address: &str,
    device_type: &str,
    timeout: Duration,
) -> Result<RegisteredUser, BridgeError> {
    let value: serde_json::Value = build_client(timeout)?
        .post(format!("http://{}/api", address))
        .json(&serde_json::json!({ "devicetype": device_type }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user = parse_registration(value)?;
    info!(address = %address, "registered new user");
    Ok(user)
}
