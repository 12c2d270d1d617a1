//! Like / connection-request / match endpoints. The verification gate for
//! like and connect lives here, ahead of the ledger: both parties must be
//! verified, and failing that is Forbidden rather than NotFound/Duplicate.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use amora_db::models::{parse_timestamp, MatchRow};
use amora_db::StoreError;
use amora_types::api::{
    Claims, ConnectionRequestActivity, ConnectionRequestResponse, LikeActivity, UserSummary,
};
use amora_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::{with_store, AppState};

pub async fn like_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(liked_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let liker_id = claims.sub;
    if liker_id == liked_id {
        return Err(ApiError::BadRequest("cannot like your own profile".into()));
    }
    ensure_verified_pair(&state, liker_id, liked_id).await?;

    let created = with_store(&state, move |db| db.create_like(liker_id, liked_id))
        .await?
        .ok_or_else(|| ApiError::Duplicate("profile already liked".into()))?;

    if let Some(m) = &created.new_match {
        announce_match(&state, m).await;
    }

    Ok(StatusCode::CREATED)
}

pub async fn connect_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(receiver_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let sender_id = claims.sub;
    if sender_id == receiver_id {
        return Err(ApiError::BadRequest(
            "cannot send a connection request to yourself".into(),
        ));
    }
    ensure_verified_pair(&state, sender_id, receiver_id).await?;

    with_store(&state, move |db| {
        db.create_connection_request(sender_id, receiver_id)
    })
    .await?
    .ok_or_else(|| ApiError::Duplicate("connection request already sent".into()))?;

    Ok(StatusCode::CREATED)
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let acting_user = claims.sub;
    let accepted = with_store(&state, move |db| {
        db.accept_connection_request(request_id, acting_user)
    })
    .await?;

    if let Some(m) = &accepted.new_match {
        announce_match(&state, m).await;
    }

    let request = accepted.request;
    Ok(Json(ConnectionRequestResponse {
        id: request.id,
        sender_id: request.sender_id,
        receiver_id: request.receiver_id,
        status: request.status.as_str().to_string(),
        created_at: parse_timestamp(&request.created_at),
    }))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let acting_user = claims.sub;
    with_store(&state, move |db| {
        db.decline_connection_request(request_id, acting_user)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn likes_received(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let rows = with_store(&state, move |db| db.likes_received(user_id)).await?;
    let likes: Vec<LikeActivity> = rows
        .into_iter()
        .map(|row| LikeActivity {
            id: row.id,
            liker_id: row.liker_id,
            liker_username: row.liker_username,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();
    Ok(Json(likes))
}

pub async fn likes_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let ids = with_store(&state, move |db| db.liked_ids(user_id)).await?;
    Ok(Json(ids))
}

pub async fn requests_received(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let rows = with_store(&state, move |db| db.requests_received(user_id)).await?;
    let requests: Vec<ConnectionRequestActivity> = rows
        .into_iter()
        .map(|row| ConnectionRequestActivity {
            id: row.id,
            sender_id: row.sender_id,
            sender_username: row.sender_username,
            status: row.status.as_str().to_string(),
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();
    Ok(Json(requests))
}

pub async fn requests_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let ids = with_store(&state, move |db| db.requested_ids(user_id)).await?;
    Ok(Json(ids))
}

pub async fn matches_of(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_store(&state, move |db| db.match_partners(user_id)).await?;
    let partners: Vec<UserSummary> = rows
        .into_iter()
        .map(|row| UserSummary {
            id: row.partner_id,
            username: row.partner_username,
        })
        .collect();
    Ok(Json(partners))
}

/// Verification gate: both profiles must exist and be verified before a
/// like or connection request is recorded.
async fn ensure_verified_pair(state: &AppState, user_x: i64, user_y: i64) -> Result<(), ApiError> {
    let (x_verified, y_verified) = with_store(state, move |db| {
        let x = db
            .get_user(user_x)?
            .ok_or(StoreError::UserNotFound(user_x))?;
        let y = db
            .get_user(user_y)?
            .ok_or(StoreError::UserNotFound(user_y))?;
        Ok((x.verified, y.verified))
    })
    .await?;

    if x_verified && y_verified {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "both profiles must be verified for this action".into(),
        ))
    }
}

/// Push the freshly materialized match to both parties' sockets.
async fn announce_match(state: &AppState, m: &MatchRow) {
    let event = GatewayEvent::MatchCreate {
        id: m.id,
        user_a_id: m.user_a_id,
        user_b_id: m.user_b_id,
        matched_at: parse_timestamp(&m.matched_at),
    };
    state.dispatcher.send_to_user(m.user_a_id, event.clone()).await;
    state.dispatcher.send_to_user(m.user_b_id, event).await;
}
