//! # api
//!
//! why: expose the ring protocols to peers and operators over http
//! relations: served by main.rs, calls into node.rs
//! what: axum router for peer envelopes and operator triggers, ApiError

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ring_core::{EntryRequest, Envelope, NodeStatus, RingError, Route};
use ring_transport::Messenger;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::node::Node;

/// Request failures that reach the client; no state is changed by them
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ring(#[from] RingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self, "rejected request");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub content: String,
}

pub fn router<M: Messenger>(node: Arc<Node<M>>) -> Router {
    Router::new()
        // peer messaging
        .route(Route::Receive.path(), post(receive_message::<M>))
        .route(Route::Ack.path(), post(receive_ack::<M>))
        .route(Route::Token.path(), post(receive_token::<M>))
        .route(Route::Election.path(), post(receive_election::<M>))
        .route(Route::Coordinator.path(), post(receive_coordinator::<M>))
        // operator
        .route("/start", post(start_multicast::<M>))
        .route("/request_sc", post(request_critical_section::<M>))
        .route("/start_election", post(start_election::<M>))
        .route("/test", get(health))
        .route("/status", get(status::<M>))
        .route("/delivered", get(delivered::<M>))
        .with_state(node)
}

async fn inbound<M: Messenger>(
    node: Arc<Node<M>>,
    route: Route,
    envelope: Envelope,
) -> Result<Json<Value>, ApiError> {
    let outcome = node.handle(route, envelope).await?;
    Ok(Json(json!({ "status": outcome.status() })))
}

async fn receive_message<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    inbound(node, Route::Receive, envelope).await
}

async fn receive_ack<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    inbound(node, Route::Ack, envelope).await
}

async fn receive_token<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    inbound(node, Route::Token, envelope).await
}

async fn receive_election<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    inbound(node, Route::Election, envelope).await
}

async fn receive_coordinator<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Value>, ApiError> {
    inbound(node, Route::Coordinator, envelope).await
}

async fn start_multicast<M: Messenger>(
    State(node): State<Arc<Node<M>>>,
    Json(request): Json<StartRequest>,
) -> Json<Value> {
    let message = node.multicast(request.content).await;
    Json(json!({ "status": "multicast_started", "message": message }))
}

async fn request_critical_section<M: Messenger>(State(node): State<Arc<Node<M>>>) -> Json<Value> {
    let (entry, has_token) = node.request_critical_section().await;
    let status = match entry.outcome {
        EntryRequest::Entered => "critical_section_entered",
        EntryRequest::AlreadyInside => "already_in_critical_section",
        EntryRequest::Pending => "waiting_for_token",
    };
    Json(json!({ "status": status, "has_token": has_token }))
}

async fn start_election<M: Messenger>(State(node): State<Arc<Node<M>>>) -> Json<Value> {
    let started = node.start_election().await;
    Json(json!({ "status": "election_started", "started": started }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status<M: Messenger>(State(node): State<Arc<Node<M>>>) -> Json<NodeStatus> {
    Json(node.status().await)
}

async fn delivered<M: Messenger>(State(node): State<Arc<Node<M>>>) -> Json<Vec<Envelope>> {
    Json(node.delivered().await)
}
