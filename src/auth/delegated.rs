use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

use super::CredentialProvider;
use super::cache::TokenCache;
use super::oauth::{self, Authority, AuthorizationPrompt, LoginFlow};
use super::token::TokenSet;

pub struct DelegatedCredential {
    http: reqwest::Client,
    authority: Authority,
    client_id: String,
    redirect_uri: String,
    scopes: String,
    prompt: Arc<dyn AuthorizationPrompt>,
    cache: TokenCache,
}

impl DelegatedCredential {
    pub fn new(
        http: reqwest::Client,
        authority: Authority,
        client_id: &str,
        redirect_uri: impl Into<String>,
        scopes: impl Into<String>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> AppResult<Self> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(AppError::Config("application id is empty".to_string()));
        }

        Ok(Self {
            http,
            authority,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: scopes.into(),
            prompt,
            cache: TokenCache::new(),
        })
    }

    async fn acquire(&self, stale: Option<Arc<TokenSet>>) -> AppResult<TokenSet> {
        if let Some(refresh_token) = stale.as_ref().and_then(|token| token.refresh_token.clone()) {
            match self.refresh(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(err) => {
                    tracing::warn!(error = %err, "silent token refresh failed, signing in again");
                }
            }
        }

        self.sign_in().await
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenSet> {
        tracing::debug!(client_id = %self.client_id, "refreshing delegated token");

        let form = HashMap::from([
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
            ("scope", self.scopes.clone()),
        ]);

        let mut token = oauth::request_token(&self.http, &self.authority, &form).await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        tracing::info!(client_id = %self.client_id, "delegated token refreshed");
        Ok(token)
    }

    async fn sign_in(&self) -> AppResult<TokenSet> {
        let flow = LoginFlow::new(
            &self.authority,
            &self.client_id,
            &self.redirect_uri,
            &self.scopes,
        )?;

        let code = self
            .prompt
            .authorization_code(&flow.authorization_url, &self.redirect_uri, &flow.state)
            .await?;

        let form = HashMap::from([
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("code_verifier", flow.code_verifier),
            ("scope", self.scopes.clone()),
        ]);

        let token = oauth::request_token(&self.http, &self.authority, &form).await?;
        tracing::info!(client_id = %self.client_id, "user signed in");
        Ok(token)
    }
}

impl std::fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for DelegatedCredential {
    async fn token(&self) -> AppResult<Arc<TokenSet>> {
        self.cache.get_or_refresh(|stale| self.acquire(stale)).await
    }
}
