pub mod application;
pub mod cache;
pub mod delegated;
pub mod oauth;
pub mod token;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::error::AppResult;

pub use application::ApplicationCredential;
pub use cache::TokenCache;
pub use delegated::DelegatedCredential;
pub use oauth::{Authority, AuthorizationPrompt, BrowserPrompt};
pub use token::TokenSet;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> AppResult<Arc<TokenSet>>;

    async fn authorize(&self, request: RequestBuilder) -> AppResult<RequestBuilder> {
        let token = self.token().await?;
        Ok(request.bearer_auth(&token.access_token))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    Application,
    Delegated,
}

#[derive(Debug)]
pub enum Credential {
    Application(ApplicationCredential),
    Delegated(DelegatedCredential),
}

impl Credential {
    pub fn mode(&self) -> CredentialMode {
        match self {
            Self::Application(_) => CredentialMode::Application,
            Self::Delegated(_) => CredentialMode::Delegated,
        }
    }
}

#[async_trait]
impl CredentialProvider for Credential {
    async fn token(&self) -> AppResult<Arc<TokenSet>> {
        match self {
            Self::Application(credential) => credential.token().await,
            Self::Delegated(credential) => credential.token().await,
        }
    }
}
