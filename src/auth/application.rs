use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

use super::CredentialProvider;
use super::cache::TokenCache;
use super::oauth::{self, APPLICATION_SCOPE, Authority};
use super::token::TokenSet;

#[derive(Debug)]
pub struct ApplicationCredential {
    http: reqwest::Client,
    authority: Authority,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ApplicationCredential {
    pub fn new(
        http: reqwest::Client,
        authority: Authority,
        client_id: &str,
        client_secret: &str,
    ) -> AppResult<Self> {
        let client_id = client_id.trim();
        let client_secret = client_secret.trim();
        if client_id.is_empty() {
            return Err(AppError::Config("application id is empty".to_string()));
        }
        if client_secret.is_empty() {
            return Err(AppError::Config("client secret is empty".to_string()));
        }

        Ok(Self {
            http,
            authority,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: TokenCache::new(),
        })
    }

    async fn request_token(&self) -> AppResult<TokenSet> {
        tracing::debug!(client_id = %self.client_id, "requesting application token");

        let form = HashMap::from([
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
            ("scope", APPLICATION_SCOPE.to_string()),
        ]);

        let token = oauth::request_token(&self.http, &self.authority, &form).await?;
        tracing::info!(client_id = %self.client_id, "application token acquired");
        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for ApplicationCredential {
    async fn token(&self) -> AppResult<Arc<TokenSet>> {
        self.cache.get_or_refresh(|_| self.request_token()).await
    }
}
