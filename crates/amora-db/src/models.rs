//! Database row types — these map directly to SQLite rows.
//! Distinct from the amora-types API models to keep the store layer
//! independent; timestamps stay as SQLite TEXT until the API edge.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub profile_picture_url: Option<String>,
    pub verified: bool,
    pub verification_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for a new profile. The password is already hashed by the
/// caller; the store never sees a raw credential.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub profile_picture_url: Option<String>,
}

/// Full-field profile update. `password_hash` of `None` keeps the stored
/// credential untouched.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub id: i64,
    pub liker_id: i64,
    pub liked_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Accepted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
        }
    }
}

impl ToSql for RequestStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            other => Err(FromSqlError::Other(
                format!("unknown request status: {other}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionRequestRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: RequestStatus,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MatchRow {
    pub id: i64,
    pub user_a_id: i64,
    pub user_b_id: i64,
    pub matched_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LikeReceivedRow {
    pub id: i64,
    pub liker_id: i64,
    pub liker_username: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RequestReceivedRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub status: RequestStatus,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MatchPartnerRow {
    pub match_id: i64,
    pub partner_id: i64,
    pub partner_username: String,
    pub matched_at: String,
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC, falling back to RFC 3339 for values written by
/// other tooling.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| s.parse::<DateTime<Utc>>())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::<Utc>::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_datetime() {
        let ts = parse_timestamp("2026-08-05 12:30:00");
        assert_eq!(ts.to_rfc3339(), "2026-08-05T12:30:00+00:00");
    }

    #[test]
    fn parses_rfc3339_fallback() {
        let ts = parse_timestamp("2026-08-05T12:30:00Z");
        assert_eq!(ts.timestamp(), 1785933000);
    }

    #[test]
    fn corrupt_timestamp_maps_to_epoch() {
        assert_eq!(parse_timestamp("not a date").timestamp(), 0);
    }
}
