use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};

use crate::error::AppResult;

use super::token::TokenSet;

#[derive(Debug, Default)]
pub struct TokenCache {
    current: RwLock<Option<Arc<TokenSet>>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<TokenSet>> {
        self.current.read().await.clone()
    }

    pub async fn fresh(&self) -> Option<Arc<TokenSet>> {
        self.current()
            .await
            .filter(|token| !token.is_expired(SystemTime::now()))
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> AppResult<Arc<TokenSet>>
    where
        F: FnOnce(Option<Arc<TokenSet>>) -> Fut,
        Fut: Future<Output = AppResult<TokenSet>>,
    {
        if let Some(token) = self.fresh().await {
            return Ok(token);
        }

        // Single flight: callers queued behind a refresh reuse its result.
        let _guard = self.refresh.lock().await;
        if let Some(token) = self.fresh().await {
            return Ok(token);
        }

        let stale = self.current().await;
        let token = Arc::new(refresh(stale).await?);
        *self.current.write().await = Some(Arc::clone(&token));
        Ok(token)
    }
}
