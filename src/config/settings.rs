use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::client::GRAPH_API_BASE_URL;
use crate::auth::oauth::{DEFAULT_AUTHORITY, DEFAULT_DELEGATED_SCOPES};
use crate::error::{AppError, AppResult};

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8400/callback";

pub const APP_ID_ENV: &str = "GRAPH_MAIL_APP_ID";
pub const TENANT_ID_ENV: &str = "GRAPH_MAIL_TENANT_ID";
pub const CLIENT_SECRET_ENV: &str = "GRAPH_MAIL_CLIENT_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub save_sent_items: Option<bool>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<String>,
}

impl Settings {
    pub fn app_id(&self) -> AppResult<&str> {
        non_empty(self.app_id.as_deref()).ok_or_else(|| {
            AppError::Config(format!(
                "missing app_id. add it to your profile json or set {APP_ID_ENV}"
            ))
        })
    }

    pub fn tenant_id(&self) -> AppResult<&str> {
        non_empty(self.tenant_id.as_deref()).ok_or_else(|| {
            AppError::Config(format!(
                "missing tenant_id. add it to your profile json or set {TENANT_ID_ENV}"
            ))
        })
    }

    pub fn client_secret(&self) -> Option<&str> {
        non_empty(self.client_secret.as_deref())
    }

    pub fn save_sent_items(&self) -> bool {
        self.save_sent_items.unwrap_or(true)
    }

    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string())
    }

    pub fn authority(&self) -> String {
        self.authority
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string())
    }

    pub fn api_base_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| GRAPH_API_BASE_URL.to_string())
    }

    pub fn scopes(&self) -> String {
        self.scopes
            .clone()
            .unwrap_or_else(|| DEFAULT_DELEGATED_SCOPES.to_string())
    }

    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| env::var(key).ok());
        self
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(value) = lookup(APP_ID_ENV) {
            self.app_id = Some(value);
        }
        if let Some(value) = lookup(TENANT_ID_ENV) {
            self.tenant_id = Some(value);
        }
        if let Some(value) = lookup(CLIENT_SECRET_ENV) {
            self.client_secret = Some(value);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn load(path: PathBuf) -> AppResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(path)?;
    let settings = serde_json::from_str(&raw)?;
    Ok(settings)
}

pub fn save(path: PathBuf, settings: &Settings) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string_pretty(settings)?;
    fs::write(&path, payload)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)?;
    }

    Ok(())
}
