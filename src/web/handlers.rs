use std::convert::Infallible;

use serde_derive::{Deserialize, Serialize};

use super::{reply, WebError};
use crate::{
    global::{Event, Global},
    models::{GroupId, LightAction},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    is_configured: bool,
    bridge_ip: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Success {
    success: bool,
}

/// Body of a room update
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoomUpdate {
    state: LightAction,
}

fn parse_room_id(id: &str) -> Result<GroupId, WebError> {
    id.parse()
        .map_err(|_| WebError::InvalidRoomId(id.to_owned()))
}

pub async fn status(global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(Ok::<_, WebError>(
        global
            .read_config(|config| Status {
                is_configured: config.bridge.is_configured(),
                bridge_ip: config.bridge.ip.clone(),
                username: config.bridge.username.clone(),
            })
            .await,
    ))
}

pub async fn discover(global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(global.discover().await.map_err(WebError::from))
}

pub async fn register(global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(global.register().await.map_err(WebError::from))
}

pub async fn list_rooms(global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(
        async {
            let reconciler = global.reconciler().await?;
            Ok::<_, WebError>(reconciler.list_rooms().await?)
        }
        .await,
    )
}

pub async fn get_room(id: String, global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(
        async {
            let id = parse_room_id(&id)?;
            Ok::<_, WebError>(global.reconciler().await?.group(id).await?)
        }
        .await,
    )
}

#[instrument(skip(global, update))]
pub async fn update_room(
    id: String,
    global: Global,
    update: RoomUpdate,
) -> Result<warp::reply::Response, Infallible> {
    reply(
        async {
            let id = parse_room_id(&id)?;
            debug!(state = ?update.state, "updating room");

            let outcome = global
                .reconciler()
                .await?
                .reconcile_and_apply(id, &update.state)
                .await?;

            global
                .publish(Event::room_updated(id, outcome.normalized.clone()))
                .await;

            Ok::<_, WebError>(outcome)
        }
        .await,
    )
}

pub async fn clear_config(global: Global) -> Result<warp::reply::Response, Infallible> {
    reply(
        global
            .clear_bridge_config()
            .await
            .map(|_| Success { success: true })
            .map_err(WebError::from),
    )
}
