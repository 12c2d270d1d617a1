use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events pushed to clients over the WebSocket gateway. Every event is
/// addressed to a single user's socket; there is no broadcast surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: i64, username: String },

    /// A direct message addressed to the receiver was persisted
    MessageCreate {
        id: i64,
        sender_id: i64,
        receiver_id: i64,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// A mutual match involving this user was materialized
    MatchCreate {
        id: i64,
        user_a_id: i64,
        user_b_id: i64,
        matched_at: DateTime<Utc>,
    },
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Send a direct chat message; persisted, then delivered to the
    /// receiver's socket exactly like the REST send path
    SendChat { receiver_id: i64, content: String },
}
