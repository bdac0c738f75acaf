use std::collections::HashMap;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time;
use url::Url;

use crate::error::{AppError, AppResult};

use super::token::TokenSet;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const APPLICATION_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_DELEGATED_SCOPES: &str = "offline_access https://graph.microsoft.com/Mail.Send";
const OAUTH_CALLBACK_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone)]
pub struct Authority {
    base: String,
    tenant_id: String,
}

impl Authority {
    pub fn new(base: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            tenant_id: tenant_id.into(),
        }
    }

    pub fn token_endpoint(&self) -> AppResult<Url> {
        self.endpoint("token")
    }

    pub fn authorize_endpoint(&self) -> AppResult<Url> {
        self.endpoint("authorize")
    }

    fn endpoint(&self, leaf: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.base)?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("invalid authority url: {}", self.base)))?
            .pop_if_empty()
            .extend([self.tenant_id.as_str(), "oauth2", "v2.0", leaf]);
        Ok(url)
    }
}

#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorization_code(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
        expected_state: &str,
    ) -> AppResult<String>;
}

#[derive(Debug, Default)]
pub struct BrowserPrompt;

#[async_trait]
impl AuthorizationPrompt for BrowserPrompt {
    async fn authorization_code(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
        expected_state: &str,
    ) -> AppResult<String> {
        if !open_browser(authorization_url) {
            eprintln!("open this URL in your browser to continue login:\n{authorization_url}");
        }

        wait_for_auth_callback(
            redirect_uri,
            expected_state,
            Duration::from_secs(OAUTH_CALLBACK_TIMEOUT_SECS),
        )
        .await
    }
}

#[derive(Debug)]
pub struct LoginFlow {
    pub authorization_url: String,
    pub code_verifier: String,
    pub state: String,
}

impl LoginFlow {
    pub fn new(
        authority: &Authority,
        client_id: &str,
        redirect_uri: &str,
        scopes: &str,
    ) -> AppResult<Self> {
        let state = random_token(32);
        let code_verifier = random_token(64);
        let code_challenge = pkce_challenge(&code_verifier);

        let mut url = authority.authorize_endpoint()?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scopes)
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(Self {
            authorization_url: url.to_string(),
            code_verifier,
            state,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

pub async fn request_token(
    http: &reqwest::Client,
    authority: &Authority,
    form: &HashMap<&str, String>,
) -> AppResult<TokenSet> {
    let response = http
        .post(authority.token_endpoint()?)
        .form(form)
        .send()
        .await
        .map_err(|err| AppError::Auth(format!("token endpoint unreachable: {err}")))?;

    parse_token_response(response).await
}

async fn parse_token_response(response: reqwest::Response) -> AppResult<TokenSet> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await?;
        return Err(token_error(status, &body));
    }

    let OAuthTokenResponse {
        access_token,
        refresh_token,
        expires_in,
        token_type,
        scope,
    } = response.json().await?;

    Ok(TokenSet {
        access_token,
        refresh_token,
        expires_at_unix: expires_in.and_then(expires_at_unix),
        token_type,
        scope,
    })
}

fn token_error(status: reqwest::StatusCode, body: &str) -> AppError {
    if let Ok(err_payload) = serde_json::from_str::<OAuthErrorResponse>(body) {
        let error = err_payload
            .error
            .unwrap_or_else(|| "unknown_oauth_error".to_string());
        let description = err_payload
            .error_description
            .map(|value| value.lines().next().unwrap_or_default().trim().to_string())
            .unwrap_or_else(|| "no description".to_string());
        return AppError::Auth(format!(
            "token request failed ({status}): {error} ({description})"
        ));
    }

    AppError::Auth(format!("token request failed ({status}): {body}"))
}

fn expires_at_unix(expires_in: u64) -> Option<u64> {
    let elapsed = UNIX_EPOCH.elapsed().ok()?;
    Some(elapsed.as_secs().saturating_add(expires_in))
}

async fn wait_for_auth_callback(
    redirect_uri: &str,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<String> {
    let (listener, path) = bind_redirect_listener(redirect_uri).await?;

    time::timeout(timeout, accept_callback(&listener, &path, expected_state))
        .await
        .map_err(|_| AppError::Auth("timed out waiting for sign-in callback".to_string()))?
}

async fn accept_callback(
    listener: &TcpListener,
    path: &str,
    expected_state: &str,
) -> AppResult<String> {
    loop {
        let (mut stream, _) = listener.accept().await?;
        let Some(target) = read_request_target(&mut stream).await? else {
            write_callback_response(&mut stream, "405 Method Not Allowed", "GET only").await?;
            continue;
        };

        // Browsers also ask for things like /favicon.ico on the same origin.
        if !target.starts_with(path) {
            write_callback_response(&mut stream, "404 Not Found", "not found").await?;
            continue;
        }

        return match extract_callback_code(&target, path, expected_state) {
            Ok(code) => {
                write_callback_response(
                    &mut stream,
                    "200 OK",
                    "sign-in complete. you can return to the terminal.",
                )
                .await?;
                Ok(code)
            }
            Err(err) => {
                let _ = write_callback_response(
                    &mut stream,
                    "400 Bad Request",
                    &format!("sign-in failed: {err}"),
                )
                .await;
                Err(err)
            }
        };
    }
}

async fn bind_redirect_listener(redirect_uri: &str) -> AppResult<(TcpListener, String)> {
    let redirect = Url::parse(redirect_uri)?;
    if redirect.scheme() != "http" {
        return Err(AppError::Config(
            "redirect_uri must be a loopback http url".to_string(),
        ));
    }

    let host = redirect
        .host_str()
        .ok_or_else(|| AppError::Config("redirect_uri is missing host".to_string()))?;
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| AppError::Config("redirect_uri is missing port".to_string()))?;

    let listener = TcpListener::bind((host, port)).await.map_err(|err| {
        AppError::Auth(format!(
            "failed to listen for sign-in callback on {host}:{port}: {err}"
        ))
    })?;

    Ok((listener, redirect.path().to_string()))
}

async fn read_request_target(stream: &mut tokio::net::TcpStream) -> AppResult<Option<String>> {
    let mut buf = vec![0_u8; 8192];
    let size = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..size]);

    let request_line = request.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        (Some(_), Some(_)) => Ok(None),
        _ => Err(AppError::Auth("malformed sign-in callback request".to_string())),
    }
}

#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        url.query_pairs()
            .fold(Self::default(), |mut params, (key, value)| {
                let slot = match key.as_ref() {
                    "code" => &mut params.code,
                    "state" => &mut params.state,
                    "error" => &mut params.error,
                    "error_description" => &mut params.error_description,
                    _ => return params,
                };
                *slot = Some(value.into_owned());
                params
            })
    }
}

fn extract_callback_code(
    target: &str,
    expected_path: &str,
    expected_state: &str,
) -> AppResult<String> {
    let callback_url = Url::parse(&format!("http://localhost{target}"))?;
    if callback_url.path() != expected_path {
        return Err(AppError::Auth(format!(
            "sign-in callback path mismatch: expected {expected_path}, got {}",
            callback_url.path()
        )));
    }

    let params = CallbackParams::from_url(&callback_url);
    if let Some(error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| "no description".to_string());
        return Err(AppError::Auth(format!(
            "authorization denied: {error} ({description})"
        )));
    }

    match params.state {
        Some(state) if state == expected_state => {}
        Some(_) => {
            return Err(AppError::Auth(
                "sign-in state mismatch; aborting".to_string(),
            ));
        }
        None => {
            return Err(AppError::Auth(
                "sign-in callback missing state parameter".to_string(),
            ));
        }
    }

    params
        .code
        .ok_or_else(|| AppError::Auth("sign-in callback missing code parameter".to_string()))
}

async fn write_callback_response(
    stream: &mut tokio::net::TcpStream,
    status: &str,
    message: &str,
) -> AppResult<()> {
    let body = format!(
        "<!doctype html><html><body><p>{}</p></body></html>",
        html_escape::encode_text(message)
    );

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(target_os = "macos")]
const BROWSER_COMMAND: Option<(&str, &[&str])> = Some(("open", &[]));
#[cfg(target_os = "linux")]
const BROWSER_COMMAND: Option<(&str, &[&str])> = Some(("xdg-open", &[]));
#[cfg(target_os = "windows")]
const BROWSER_COMMAND: Option<(&str, &[&str])> = Some(("cmd", &["/C", "start", ""]));
#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const BROWSER_COMMAND: Option<(&str, &[&str])> = None;

fn open_browser(url: &str) -> bool {
    let Some((program, args)) = BROWSER_COMMAND else {
        return false;
    };

    std::process::Command::new(program)
        .args(args)
        .arg(url)
        .status()
        .is_ok_and(|status| status.success())
}
