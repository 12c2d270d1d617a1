use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};

use amora_db::models::{parse_timestamp, MessageRow};
use amora_db::StoreError;
use amora_types::api::{Claims, MessageResponse, SendMessageRequest};
use amora_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::{with_store, AppState, PageQuery};

/// Upper bound on a single message body.
const MAX_CONTENT_LEN: usize = 4000;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(receiver_id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("message content is empty".into()));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(ApiError::BadRequest("message content is too long".into()));
    }

    let sender_id = claims.sub;
    let row = with_store(&state, move |db| {
        db.create_message(sender_id, receiver_id, &content)
    })
    .await?;

    let response = message_response(&row);

    // Deliver to the receiver's socket; best-effort, at-most-once.
    state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::MessageCreate {
                id: row.id,
                sender_id: row.sender_id,
                receiver_id: row.receiver_id,
                content: row.content,
                created_at: response.created_at,
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// The conversation between the caller and the addressed user, oldest
/// first, paginated, with an `X-Total-Count` header.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other_user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let (limit, offset) = (query.limit(), query.offset());
    let (rows, total) = with_store(&state, move |db| {
        db.get_user(other_user_id)?
            .ok_or(StoreError::UserNotFound(other_user_id))?;
        db.find_conversation(caller, other_user_id, limit, offset)
    })
    .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "x-total-count",
        HeaderValue::from_str(&total.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let messages: Vec<MessageResponse> = rows.iter().map(message_response).collect();
    Ok((headers, Json(messages)))
}

fn message_response(row: &MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        content: row.content.clone(),
        created_at: parse_timestamp(&row.created_at),
    }
}
