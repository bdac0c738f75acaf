pub mod dispatch;

use std::sync::{Arc, OnceLock};
use std::thread;

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

use crate::api::{GraphClient, MailTransport};
use crate::auth::{
    ApplicationCredential, Authority, AuthorizationPrompt, BrowserPrompt, Credential,
    CredentialMode, DelegatedCredential,
};
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::mail::{EmailMessage, translate};

pub use dispatch::{SendResult, dispatch};

pub struct GraphSender {
    transport: Arc<dyn MailTransport>,
    credential: Option<Arc<Credential>>,
    save_sent_items: bool,
    blocking: OnceLock<BlockingRuntime>,
}

impl GraphSender {
    pub fn with_client_secret(
        app_id: &str,
        tenant_id: &str,
        client_secret: &str,
        save_sent_items: bool,
    ) -> AppResult<Self> {
        let defaults = Settings::default();
        let http = http_client()?;
        let credential = ApplicationCredential::new(
            http.clone(),
            tenant_authority(defaults.authority(), tenant_id)?,
            app_id,
            client_secret,
        )?;

        Ok(Self::with_credential(
            http,
            defaults.api_base_url(),
            Credential::Application(credential),
            save_sent_items,
        ))
    }

    pub fn delegated(app_id: &str, tenant_id: &str, save_sent_items: bool) -> AppResult<Self> {
        let defaults = Settings::default();
        let http = http_client()?;
        let credential = DelegatedCredential::new(
            http.clone(),
            tenant_authority(defaults.authority(), tenant_id)?,
            app_id,
            defaults.redirect_uri(),
            defaults.scopes(),
            Arc::new(BrowserPrompt),
        )?;

        Ok(Self::with_credential(
            http,
            defaults.api_base_url(),
            Credential::Delegated(credential),
            save_sent_items,
        ))
    }

    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Self::from_settings_with_prompt(settings, Arc::new(BrowserPrompt))
    }

    // A configured secret selects the application credential.
    pub fn from_settings_with_prompt(
        settings: &Settings,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> AppResult<Self> {
        let app_id = settings.app_id()?;
        let authority = tenant_authority(settings.authority(), settings.tenant_id()?)?;
        let http = http_client()?;

        let credential = match settings.client_secret() {
            Some(secret) => Credential::Application(ApplicationCredential::new(
                http.clone(),
                authority,
                app_id,
                secret,
            )?),
            None => Credential::Delegated(DelegatedCredential::new(
                http.clone(),
                authority,
                app_id,
                settings.redirect_uri(),
                settings.scopes(),
                prompt,
            )?),
        };

        Ok(Self::with_credential(
            http,
            settings.api_base_url(),
            credential,
            settings.save_sent_items(),
        ))
    }

    fn with_credential(
        http: reqwest::Client,
        api_base_url: String,
        credential: Credential,
        save_sent_items: bool,
    ) -> Self {
        tracing::debug!(mode = ?credential.mode(), "credential configured");

        let credential = Arc::new(credential);
        let client = GraphClient::new(http, api_base_url, credential.clone());

        Self {
            transport: Arc::new(client),
            credential: Some(credential),
            save_sent_items,
            blocking: OnceLock::new(),
        }
    }

    pub fn with_transport(transport: Arc<dyn MailTransport>, save_sent_items: bool) -> Self {
        Self {
            transport,
            credential: None,
            save_sent_items,
            blocking: OnceLock::new(),
        }
    }

    pub fn credential(&self) -> Option<&Arc<Credential>> {
        self.credential.as_ref()
    }

    pub fn credential_mode(&self) -> Option<CredentialMode> {
        self.credential.as_ref().map(|credential| credential.mode())
    }

    pub fn save_sent_items(&self) -> bool {
        self.save_sent_items
    }

    pub async fn send_async(
        &self,
        email: EmailMessage,
        cancel: Option<&CancellationToken>,
    ) -> SendResult {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return SendResult::from_error(&AppError::Cancelled);
        }

        let message = match translate(email) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "message translation failed");
                return SendResult::from_error(&err);
            }
        };

        let send = dispatch(self.transport.as_ref(), message, self.save_sent_items);
        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("send cancelled by caller");
                        SendResult::from_error(&AppError::Cancelled)
                    }
                    result = send => result,
                }
            }
            None => send.await,
        }
    }

    pub fn send(&self, email: EmailMessage, cancel: Option<&CancellationToken>) -> SendResult {
        thread::scope(|scope| {
            scope
                .spawn(|| match self.blocking_runtime() {
                    Ok(runtime) => runtime.block_on(self.send_async(email, cancel)),
                    Err(err) => SendResult::from_error(&err),
                })
                .join()
                .unwrap_or_else(|_| SendResult::failed("send task panicked"))
        })
    }

    fn blocking_runtime(&self) -> AppResult<&Runtime> {
        if let Some(runtime) = self.blocking.get() {
            return Ok(runtime.get());
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("graph-mail-send")
            .enable_all()
            .build()?;

        // Runs off any async context, so dropping a runtime that lost the race is fine.
        Ok(self.blocking.get_or_init(|| BlockingRuntime(Some(runtime))).get())
    }
}

impl std::fmt::Debug for GraphSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSender")
            .field("credential_mode", &self.credential_mode())
            .field("save_sent_items", &self.save_sent_items)
            .finish_non_exhaustive()
    }
}

// Shut down in the background on drop so a sender can be dropped from async code.
struct BlockingRuntime(Option<Runtime>);

impl BlockingRuntime {
    fn get(&self) -> &Runtime {
        match &self.0 {
            Some(runtime) => runtime,
            None => unreachable!("runtime is only taken on drop"),
        }
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

fn tenant_authority(base: String, tenant_id: &str) -> AppResult<Authority> {
    let tenant_id = tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(AppError::Config("tenant id is empty".to_string()));
    }

    Ok(Authority::new(base, tenant_id))
}

fn http_client() -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("graph-mail/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
