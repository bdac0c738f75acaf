use std::time::SystemTime;

use serde::Serialize;

use crate::auth::{CredentialMode, CredentialProvider};
use crate::cli::AuthCommand;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct AuthCheck {
    pub profile: String,
    pub mode: CredentialMode,
    pub expires_in_seconds: Option<i64>,
    pub has_refresh_token: bool,
}

pub async fn run(ctx: &AppContext, command: AuthCommand) -> AppResult<()> {
    match command {
        AuthCommand::Check => {
            let sender = ctx.sender(None)?;
            let credential = sender.credential().ok_or_else(|| {
                AppError::Config("sender has no credential configured".to_string())
            })?;

            let token = credential.token().await?;
            let check = AuthCheck {
                profile: ctx.profile.clone(),
                mode: credential.mode(),
                expires_in_seconds: token.expires_in_seconds(SystemTime::now()),
                has_refresh_token: token.has_refresh_token(),
            };

            ctx.output.emit(&describe(&check), &check)
        }
    }
}

fn describe(check: &AuthCheck) -> String {
    let mode = match check.mode {
        CredentialMode::Application => "application credential",
        CredentialMode::Delegated => "delegated credential",
    };
    let expiry = check
        .expires_in_seconds
        .map(|secs| format!(", expires in {secs}s"))
        .unwrap_or_default();

    format!("{}: token acquired with {mode}{expiry}", check.profile)
}
