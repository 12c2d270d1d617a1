pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod relationships;
pub mod users;

use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use amora_db::{Database, StoreError};
use amora_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

/// Runs a blocking store call off the async runtime and maps store errors
/// onto the API taxonomy.
pub(crate) async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("store task failed"))
        })?
        .map_err(ApiError::from)
}

/// Page/size query parameters shared by the discovery and conversation
/// listings. Zero-based page; size is clamped to 1..=100.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_page_size() -> i64 {
    10
}

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.size.clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.page.max(0) * self.limit()
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let limit = self.limit();
        (total + limit - 1) / limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps_and_paginates() {
        let q = PageQuery { page: 2, size: 250 };
        assert_eq!(q.limit(), 100);
        assert_eq!(q.offset(), 200);

        let q = PageQuery { page: -1, size: 0 };
        assert_eq!(q.limit(), 1);
        assert_eq!(q.offset(), 0);

        let q = PageQuery { page: 0, size: 10 };
        assert_eq!(q.total_pages(0), 0);
        assert_eq!(q.total_pages(10), 1);
        assert_eq!(q.total_pages(11), 2);
    }
}
