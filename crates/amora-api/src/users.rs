use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use tracing::warn;

use amora_db::models::{parse_timestamp, UserRow, UserUpdate};
use amora_types::api::{Claims, UpdateUserRequest, UserResponse, VerifyUserRequest};

use crate::auth::{hash_password, validate_email, validate_password, validate_username};
use crate::error::ApiError;
use crate::{with_store, AppState, PageQuery};

pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub;
    let row = with_store(&state, move |db| db.get_user(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {id}")))?;
    Ok(Json(user_response(row)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = with_store(&state, move |db| db.get_user(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {id}")))?;
    Ok(Json(user_response(row)))
}

/// Discovery feed: verified profiles excluding the caller, paginated, with
/// `X-Total-Count` / `X-Total-Pages` headers.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let (limit, offset) = (query.limit(), query.offset());
    let (rows, total) =
        with_store(&state, move |db| db.list_users_excluding(caller, limit, offset)).await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-total-count", header_value(total));
    headers.insert("x-total-pages", header_value(query.total_pages(total)));

    let users: Vec<UserResponse> = rows.into_iter().map(user_response).collect();
    Ok((headers, Json(users)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if id != claims.sub {
        return Err(ApiError::Forbidden(
            "cannot modify another user's profile".into(),
        ));
    }
    validate_username(&req.username)?;
    validate_email(&req.email)?;

    let password_hash = match req.password.as_deref() {
        Some(password) if !password.is_empty() => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        _ => None,
    };

    let update = UserUpdate {
        username: req.username,
        email: req.email,
        password_hash,
        full_name: req.full_name,
        bio: req.bio,
        gender: req.gender,
        date_of_birth: req.date_of_birth.map(|d| d.to_string()),
        city: req.city,
        country: req.country,
        profile_picture_url: req.profile_picture_url,
    };

    let row = with_store(&state, move |db| db.update_user(id, update)).await?;
    Ok(Json(user_response(row)))
}

pub async fn verify_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<VerifyUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = with_store(&state, move |db| {
        db.set_verification(id, req.verified, req.verification_notes)
    })
    .await?;
    Ok(Json(user_response(row)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if id != claims.sub {
        return Err(ApiError::Forbidden(
            "cannot delete another user's profile".into(),
        ));
    }
    with_store(&state, move |db| db.delete_user(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn user_response(row: UserRow) -> UserResponse {
    let date_of_birth = row.date_of_birth.as_deref().and_then(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| warn!("Corrupt date_of_birth '{}' on user {}: {}", s, row.id, e))
            .ok()
    });

    UserResponse {
        id: row.id,
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        bio: row.bio,
        gender: row.gender,
        date_of_birth,
        city: row.city,
        country: row.country,
        profile_picture_url: row.profile_picture_url,
        verified: row.verified,
        verification_notes: row.verification_notes,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn header_value(n: i64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}
