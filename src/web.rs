use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;

use futures::Future;
use serde::Serialize;
use thiserror::Error;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::{
    bridge::BridgeError,
    global::{Global, GlobalError},
    models::{ConfigError, WebConfig},
    reconciler::ReconcileError,
};

mod handlers;
mod ws;

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),
}

impl From<GlobalError> for WebError {
    fn from(error: GlobalError) -> Self {
        match error {
            GlobalError::Bridge(error) => Self::Bridge(error),
            GlobalError::Config(error) => Self::Config(error),
        }
    }
}

impl WebError {
    fn bridge_status(error: &BridgeError) -> StatusCode {
        match error {
            BridgeError::NotConfigured
            | BridgeError::InvalidState(_)
            | BridgeError::LinkButtonNotPressed => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) | BridgeError::NoBridgeFound => StatusCode::NOT_FOUND,
            BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            BridgeError::DeviceUnreachable(_) | BridgeError::Protocol(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Bridge(error) | Self::Reconcile(ReconcileError::Bridge(error)) => {
                Self::bridge_status(error)
            }
            Self::Reconcile(ReconcileError::MalformedColor(_)) | Self::InvalidRoomId(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn error_reply(message: String, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
    .into_response()
}

impl Reply for WebError {
    fn into_response(self) -> warp::reply::Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }

        error_reply(self.to_string(), status)
    }
}

/// Turn a handler result into a JSON response
fn reply<T: Serialize>(result: Result<T, WebError>) -> Result<warp::reply::Response, Infallible> {
    Ok(match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(error) => error.into_response(),
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (message, status) = if rejection.is_not_found() {
        ("not found".to_owned(), StatusCode::NOT_FOUND)
    } else if let Some(error) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (error.to_string(), StatusCode::BAD_REQUEST)
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("method not allowed".to_owned(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        warn!(rejection = ?rejection, "unhandled rejection");
        ("internal error".to_owned(), StatusCode::INTERNAL_SERVER_ERROR)
    };

    Ok(error_reply(message, status))
}

fn with_global(global: Global) -> impl Filter<Extract = (Global,), Error = Infallible> + Clone {
    warp::any().map(move || global.clone())
}

/// Every route of the web server, static files served from `document_root`
pub fn routes(
    global: Global,
    document_root: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let status = warp::path!("api" / "hue" / "status")
        .and(warp::get())
        .and(with_global(global.clone()))
        .and_then(handlers::status);

    let discover = warp::path!("api" / "hue" / "discover")
        .and(warp::get())
        .and(with_global(global.clone()))
        .and_then(handlers::discover);

    let register = warp::path!("api" / "hue" / "register")
        .and(warp::post())
        .and(with_global(global.clone()))
        .and_then(handlers::register);

    let rooms = warp::path!("api" / "hue" / "rooms")
        .and(warp::get())
        .and(with_global(global.clone()))
        .and_then(handlers::list_rooms);

    let room = warp::path!("api" / "hue" / "rooms" / String)
        .and(warp::get())
        .and(with_global(global.clone()))
        .and_then(handlers::get_room);

    let update_room = warp::path!("api" / "hue" / "rooms" / String)
        .and(warp::put())
        .and(with_global(global.clone()))
        .and(warp::body::json())
        .and_then(handlers::update_room);

    let clear_config = warp::path!("api" / "hue" / "clear-config")
        .and(warp::post())
        .and(with_global(global.clone()))
        .and_then(handlers::clear_config);

    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_global(global))
        .map(|upgrade: warp::ws::Ws, global: Global| {
            upgrade.on_upgrade(move |websocket| ws::client(websocket, global))
        });

    let files = warp::get().and(warp::fs::dir(document_root));

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    status
        .or(discover)
        .or(register)
        .or(rooms)
        .or(room)
        .or(update_room)
        .or(clear_config)
        .or(ws)
        .or(files)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log("huectl::web"))
}

pub async fn bind(
    global: Global,
    config: &WebConfig,
) -> Result<impl Future<Output = ()>, std::io::Error> {
    let document_root = PathBuf::from(&config.document_root);

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(address).await?;

    info!(address = %address, document_root = %document_root.display(), "web server listening");
    Ok(warp::serve(routes(global, document_root))
        .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener)))
}
