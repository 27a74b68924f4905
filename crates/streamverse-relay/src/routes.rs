use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use streamverse_protocol::directory::validate_public_key;
use streamverse_protocol::messaging::{CreatePartyRequest, PartyNotification, PublishRequest};
use streamverse_protocol::{serde_b64, MessageBundle, PublishAck, RosterEntry, WatchParty};

use crate::auth::{require_token, Caller};
use crate::error::ApiError;
use crate::server_state::SharedState;

/// Mount point of the watch-party API.
pub const BASE_PATH: &str = "/api/tools/watchparty";

const KEY_LEN: usize = 32;

/// Build the relay router.
///
/// `/health` is always open; everything under [`BASE_PATH`] goes through
/// bearer-token auth when the state carries a token. Party endpoints
/// (create, join, listings) also need the caller header.
pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .route(&format!("{BASE_PATH}/create"), post(create_party))
        .route(&format!("{BASE_PATH}/join/{{id}}"), post(join_party))
        .route(&format!("{BASE_PATH}/user"), get(user_parties))
        .route(&format!("{BASE_PATH}/public"), get(public_parties))
        .route(&format!("{BASE_PATH}/notifications"), get(notifications))
        .route(&format!("{BASE_PATH}/{{id}}"), get(get_party))
        .route(
            &format!("{BASE_PATH}/{{id}}/users"),
            get(list_users).post(upsert_user),
        )
        .route(&format!("{BASE_PATH}/{{id}}/message"), post(publish_bundle))
        .route(&format!("{BASE_PATH}/{{id}}/messages"), get(list_bundles))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_party(
    State(state): State<SharedState>,
    Caller(host): Caller,
    Json(req): Json<CreatePartyRequest>,
) -> Result<(StatusCode, Json<WatchParty>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let scheduled = req.date_time.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !scheduled {
        return Err(ApiError::BadRequest("Date and time are required".into()));
    }
    if req.movie_ids.is_empty() {
        return Err(ApiError::BadRequest("Please select at least one movie".into()));
    }

    let party = state.directory.create_party(&host, req);
    tracing::info!(party = %party.id, host = %host, title = %party.title, "watch party created");
    Ok((StatusCode::CREATED, Json(party)))
}

async fn join_party(
    State(state): State<SharedState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<WatchParty>, ApiError> {
    Ok(Json(state.directory.join(&id, &user)?))
}

async fn user_parties(
    State(state): State<SharedState>,
    Caller(user): Caller,
) -> Json<Vec<WatchParty>> {
    Json(state.directory.parties_of(&user))
}

async fn public_parties(State(state): State<SharedState>) -> Json<Vec<WatchParty>> {
    Json(state.directory.public_parties())
}

async fn notifications(
    State(state): State<SharedState>,
    Caller(user): Caller,
) -> Json<Vec<PartyNotification>> {
    Json(state.directory.invitations(&user))
}

async fn get_party(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<WatchParty>, ApiError> {
    state
        .directory
        .party(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("watch party {id} not found")))
}

async fn list_users(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<Vec<RosterEntry>> {
    Json(state.directory.entries(&id))
}

async fn upsert_user(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(entry): Json<RosterEntry>,
) -> Result<StatusCode, ApiError> {
    if entry.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    let encoded = entry
        .public_key
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("publicKey is required".into()))?;
    let key = serde_b64::decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("publicKey: {e}")))?;
    validate_public_key(&key).map_err(|e| ApiError::BadRequest(format!("publicKey: {e}")))?;

    tracing::debug!(party = %id, user = %entry.user_id, "roster entry upserted");
    state.directory.upsert(&id, entry);
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_bundle(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishAck>), ApiError> {
    if let Some(bad) = req
        .messages
        .iter()
        .find(|e| e.recipient_public_key.len() != KEY_LEN)
    {
        return Err(ApiError::BadRequest(format!(
            "recipientPublicKey must be {KEY_LEN} bytes, got {}",
            bad.recipient_public_key.len()
        )));
    }

    let stored = state
        .channel
        .append(&id, req.messages)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(PublishAck { id: stored.id })))
}

async fn list_bundles(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<Vec<MessageBundle>> {
    Json(state.channel.snapshot(&id))
}
