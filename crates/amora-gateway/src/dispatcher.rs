use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use amora_types::events::GatewayEvent;

/// Manages connected clients and routes targeted events to their sockets.
/// Every event is addressed to a single user id; there is no broadcast.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<i64, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a per-user channel. Returns (conn_id, receiver). A newer
    /// connection for the same user replaces the previous channel.
    pub async fn register_user_channel(
        &self,
        user_id: i64,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user channel, but only if conn_id still matches —
    /// a stale disconnect must not tear down a newer connection.
    pub async fn unregister_user_channel(&self, user_id: i64, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Best-effort: silently
    /// dropped when the user has no open socket.
    pub async fn send_to_user(&self, user_id: i64, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Whether the user currently has a registered socket.
    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: i64) -> GatewayEvent {
        GatewayEvent::Ready {
            user_id,
            username: format!("user{user_id}"),
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_user_only() {
        let dispatcher = Dispatcher::new();
        let (_conn, mut rx) = dispatcher.register_user_channel(1).await;

        dispatcher.send_to_user(1, ready(1)).await;
        dispatcher.send_to_user(2, ready(2)).await; // no socket, dropped

        let event = rx.recv().await.expect("event");
        assert!(matches!(event, GatewayEvent::Ready { user_id: 1, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn newer_connection_supersedes_older() {
        let dispatcher = Dispatcher::new();
        let (old_conn, mut old_rx) = dispatcher.register_user_channel(1).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(1).await;

        // Stale disconnect must not unregister the newer channel.
        dispatcher.unregister_user_channel(1, old_conn).await;
        assert!(dispatcher.is_online(1).await);

        dispatcher.send_to_user(1, ready(1)).await;
        assert!(new_rx.recv().await.is_some());
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_channel() {
        let dispatcher = Dispatcher::new();
        let (conn, _rx) = dispatcher.register_user_channel(1).await;
        dispatcher.unregister_user_channel(1, conn).await;
        assert!(!dispatcher.is_online(1).await);
    }
}
