//! # HTTP Controller
//!
//! Builds the axum router that front-ends the gossiper for the browser UI.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description                                   |
//! |--------|------------|-----------------------------------------------|
//! | GET    | `/message` | Messages received so far                      |
//! | POST   | `/message` | Send a message (rumor, private, or broadcast) |
//! | GET    | `/node`    | Known peer addresses                          |
//! | POST   | `/node`    | Register one peer address (plain-text body)   |
//! | GET    | `/id`      | Node identifier (plain text)                  |
//! | POST   | `/id`      | Replace the node identifier                   |
//! | GET    | `/routing` | Routing-table snapshot                        |

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use murmur_protocol::config::DEFAULT_HOP_LIMIT;
use murmur_protocol::{GossipPacket, Gossiper};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` (the gossiper handle already
/// is one).
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running gossiper.
    pub gossiper: Gossiper,
    /// Log of user-visible messages received so far, oldest first.
    /// `None` until the first message arrives, so the UI sees `null`
    /// rather than an empty list — that is the wire contract it was
    /// written against.
    pub messages: Arc<Mutex<Option<Vec<UiMessage>>>>,
    /// When set, `POST /message` floods legacy simple messages instead of
    /// mongering rumors.
    pub broadcast_mode: bool,
}

impl AppState {
    /// Wires up the controller state and installs the gossiper callback
    /// that feeds the message log.
    pub fn new(gossiper: Gossiper, broadcast_mode: bool) -> Self {
        let messages: Arc<Mutex<Option<Vec<UiMessage>>>> = Arc::new(Mutex::new(None));

        let log = Arc::clone(&messages);
        gossiper.register_callback(move |origin, packet| {
            let Some(text) = user_text(&packet) else {
                return;
            };
            debug!(%origin, "controller logged a message");
            log.lock()
                .get_or_insert_with(Vec::new)
                .push(UiMessage { origin, text });
        });

        Self {
            gossiper,
            messages,
            broadcast_mode,
        }
    }
}

fn user_text(packet: &GossipPacket) -> Option<String> {
    if let Some(rumor) = &packet.rumor {
        Some(rumor.text.clone())
    } else if let Some(simple) = &packet.simple {
        Some(simple.contents.clone())
    } else if let Some(private) = &packet.private {
        Some(private.text.clone())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Wire Types
// ---------------------------------------------------------------------------

/// One received message as shown to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiMessage {
    /// Identifier of the message's origin node.
    #[serde(rename = "Origin")]
    pub origin: String,
    /// The message text.
    #[serde(rename = "Text")]
    pub text: String,
}

/// Body of `POST /message`. A non-empty destination turns the message into
/// a private point-to-point delivery.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    /// Text to send.
    pub contents: String,
    /// Recipient identifier; empty or absent means "gossip to everyone".
    #[serde(default)]
    pub destination: String,
}

/// One routing-table row as shown to the UI.
#[derive(Debug, Serialize)]
pub struct RouteInfo {
    /// Endpoint to forward through.
    #[serde(rename = "NextHop")]
    pub next_hop: String,
    /// Freshest rumor id observed for the origin.
    #[serde(rename = "LastID")]
    pub last_id: u32,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the controller [`Router`] with all routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/message", get(get_messages).post(post_message))
        .route("/node", get(get_nodes).post(post_node))
        .route("/id", get(get_identifier).post(set_identifier))
        .route("/routing", get(get_routing_table))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_messages(State(state): State<AppState>) -> Json<Option<Vec<UiMessage>>> {
    Json(state.messages.lock().clone())
}

async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<ClientMessage>,
) -> StatusCode {
    if !message.destination.is_empty() {
        let origin = state.gossiper.get_identifier();
        state
            .gossiper
            .add_private_message(
                &message.contents,
                &message.destination,
                &origin,
                DEFAULT_HOP_LIMIT,
            )
            .await;
    } else if state.broadcast_mode {
        state.gossiper.add_simple_message(&message.contents).await;
    } else {
        state.gossiper.add_message(&message.contents).await;
    }
    StatusCode::OK
}

async fn get_nodes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.gossiper.get_nodes())
}

async fn post_node(State(state): State<AppState>, body: String) -> StatusCode {
    match state.gossiper.add_addresses(&[body.trim()]) {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            warn!(%error, "rejected peer address");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn get_identifier(State(state): State<AppState>) -> String {
    state.gossiper.get_identifier()
}

async fn set_identifier(State(state): State<AppState>, body: String) -> StatusCode {
    state.gossiper.set_identifier(body.trim());
    StatusCode::OK
}

async fn get_routing_table(State(state): State<AppState>) -> Json<HashMap<String, RouteInfo>> {
    let table = state
        .gossiper
        .get_routing_table()
        .into_iter()
        .map(|(origin, entry)| {
            (
                origin,
                RouteInfo {
                    next_hop: entry.next_hop.to_string(),
                    last_id: entry.last_id,
                },
            )
        })
        .collect();
    Json(table)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
