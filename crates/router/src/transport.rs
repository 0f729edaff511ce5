//! Websocket transport served by the router process.
//!
//! Handles the parts of a session that the configuration governs: origin
//! checks, serializer (subprotocol) negotiation, and the optional status
//! document. Frames on an established session are consumed and dropped; the
//! routing protocol itself lives in the components attached to the realm.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use tracing::{debug, trace};

use crate::RouterConfig;

const SUBPROTOCOL_PREFIX: &str = "wamp.2.";

struct TransportState {
    config: RouterConfig,
    sessions: AtomicUsize,
    started: Instant,
}

/// Builds the HTTP router serving the websocket transport.
pub fn router(config: RouterConfig) -> Router {
    let state = Arc::new(TransportState {
        config,
        sessions: AtomicUsize::new(0),
        started: Instant::now(),
    });

    Router::new().route("/", get(handle)).with_state(state)
}

/// Picks the first subprotocol offered by the client that maps to a configured serializer.
fn negotiate_subprotocol(headers: &HeaderMap, serializers: &[String]) -> Option<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|offered| {
            offered
                .strip_prefix(SUBPROTOCOL_PREFIX)
                .is_some_and(|serializer| serializers.iter().any(|s| s == serializer))
        })
        .map(ToString::to_string)
}

async fn handle(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(upgrade) = upgrade else {
        if state.config.enable_status() {
            return status(&state).into_response();
        }
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };

    if let Some(origin) = headers.get(header::ORIGIN).and_then(|o| o.to_str().ok()) {
        if !state.config.is_origin_allowed(origin) {
            debug!("rejecting session from origin {}", origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Some(protocol) = negotiate_subprotocol(&headers, state.config.serializers()) else {
        debug!("rejecting session without a supported subprotocol");
        return (StatusCode::BAD_REQUEST, "no supported subprotocol").into_response();
    };

    upgrade
        .protocols([protocol])
        .on_upgrade(move |socket| session(state, socket))
}

fn status(state: &TransportState) -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "title": state.config.title(),
        "realm": state.config.realm(),
        "serializers": state.config.serializers(),
        "sessions": state.sessions.load(Ordering::Relaxed),
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}

async fn session(state: Arc<TransportState>, mut socket: WebSocket) {
    let active = state.sessions.fetch_add(1, Ordering::Relaxed) + 1;
    debug!("session opened on realm {} ({} active)", state.config.realm(), active);

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(message) => trace!("dropping frame: {:?}", message),
            Err(e) => {
                debug!("session error: {}", e);
                break;
            }
        }
    }

    state.sessions.fetch_sub(1, Ordering::Relaxed);
    debug!("session closed on realm {}", state.config.realm());
}
