use serde::Serialize;

use crate::cli::{ConfigCommand, ConfigSetArgs};
use crate::config::{self, Settings};
use crate::context::AppContext;
use crate::error::AppResult;

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub profile: String,
    pub path: String,
    pub app_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secret: Option<&'static str>,
    pub save_sent_items: bool,
    pub redirect_uri: String,
    pub authority: String,
    pub api_base_url: String,
}

pub fn run(ctx: &AppContext, command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Show => {
            let view = view(ctx, &ctx.settings);
            ctx.output.emit(&describe(&view), &view)
        }
        ConfigCommand::Set(args) => {
            // Start from the file alone so environment overrides are not persisted.
            let current = config::settings::load(ctx.paths.settings_file(&ctx.profile))?;
            let updated = apply(current, args);
            config::save_settings(&ctx.paths, &ctx.profile, &updated)?;

            let view = view(ctx, &updated);
            ctx.output.emit(&format!("saved {}", view.path), &view)
        }
    }
}

fn apply(mut settings: Settings, args: ConfigSetArgs) -> Settings {
    if let Some(app_id) = args.app_id {
        settings.app_id = Some(app_id);
    }
    if let Some(tenant_id) = args.tenant_id {
        settings.tenant_id = Some(tenant_id);
    }
    if args.clear_client_secret {
        settings.client_secret = None;
    } else if let Some(secret) = args.client_secret {
        settings.client_secret = Some(secret);
    }
    if let Some(save) = args.save_sent_items {
        settings.save_sent_items = Some(save);
    }
    if let Some(redirect_uri) = args.redirect_uri {
        settings.redirect_uri = Some(redirect_uri);
    }
    settings
}

fn view(ctx: &AppContext, settings: &Settings) -> SettingsView {
    SettingsView {
        profile: ctx.profile.clone(),
        path: ctx.paths.settings_file(&ctx.profile).display().to_string(),
        app_id: settings.app_id.clone(),
        tenant_id: settings.tenant_id.clone(),
        client_secret: settings.client_secret().map(|_| "<redacted>"),
        save_sent_items: settings.save_sent_items(),
        redirect_uri: settings.redirect_uri(),
        authority: settings.authority(),
        api_base_url: settings.api_base_url(),
    }
}

fn describe(view: &SettingsView) -> String {
    let mode = if view.client_secret.is_some() {
        "application"
    } else {
        "delegated"
    };

    format!(
        "{}: app_id={} tenant_id={} mode={mode} save_sent_items={}",
        view.profile,
        view.app_id.as_deref().unwrap_or("(unset)"),
        view.tenant_id.as_deref().unwrap_or("(unset)"),
        view.save_sent_items,
    )
}
