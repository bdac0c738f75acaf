use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::auth::CredentialProvider;
use crate::error::{AppError, AppResult};

use super::MailTransport;
use super::models::SendMailRequest;
use super::users;

pub const GRAPH_API_BASE_URL: &str = "https://graph.microsoft.com";

#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    credential: Arc<dyn CredentialProvider>,
}

impl GraphClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        credential: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credential,
        }
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailTransport for GraphClient {
    async fn send_mail(
        &self,
        sender: &str,
        request: &SendMailRequest,
    ) -> AppResult<Option<String>> {
        let url = users::send_mail_url(&self.base_url, sender)?;
        let builder = self.http.post(url).json(request);
        let builder = self.credential.authorize(builder).await?;

        let response = builder.send().await?;
        let status = response.status();
        let request_id = header_str(response.headers(), "request-id");

        if !status.is_success() {
            let retry_after = header_str(response.headers(), RETRY_AFTER.as_str());
            let body = error_body(response.text().await);
            return Err(map_api_error(status, retry_after.as_deref(), &body));
        }

        let message_id = match response.text().await {
            Ok(body) => parse_message_id(&body),
            Err(err) => {
                tracing::warn!(sender, error = %err, "could not read sendMail response body");
                None
            }
        };
        tracing::info!(
            sender,
            request_id = request_id.as_deref().unwrap_or("-"),
            "mail accepted by graph api"
        );

        Ok(message_id)
    }
}

#[derive(Debug, Deserialize)]
struct SendMailResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphApiErrorEnvelope {
    error: GraphApiError,
}

#[derive(Debug, Deserialize)]
struct GraphApiError {
    code: Option<String>,
    message: Option<String>,
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn error_body<E: std::fmt::Display>(body: Result<String, E>) -> String {
    body.unwrap_or_else(|err| format!("error body unreadable: {err}"))
}

fn parse_message_id(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    serde_json::from_str::<SendMailResponse>(body)
        .ok()
        .and_then(|response| response.id)
        .filter(|id| !id.is_empty())
}

fn map_api_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> AppError {
    let message = parse_api_error_message(body).unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            "no error details in response body".to_string()
        } else {
            body.to_string()
        }
    });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::Auth(format!(
            "graph api authorization failed ({status}): {message}"
        ));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let hint = retry_after
            .map(|value| format!(", retry after {value}s"))
            .unwrap_or_default();
        return AppError::Api(format!(
            "graph api rate limited ({status}){hint}: {message}"
        ));
    }

    AppError::Api(format!("graph api request failed ({status}): {message}"))
}

fn parse_api_error_message(body: &str) -> Option<String> {
    let envelope = serde_json::from_str::<GraphApiErrorEnvelope>(body).ok()?;
    let mut parts = Vec::new();

    if let Some(message) = envelope.error.message {
        parts.push(message);
    }

    if let Some(code) = envelope.error.code {
        parts.push(format!("code={code}"));
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_unauthorized_as_auth_error() {
        let error = map_api_error(
            StatusCode::UNAUTHORIZED,
            None,
            r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired or is not yet valid."}}"#,
        );

        match error {
            AppError::Auth(message) => {
                assert!(message.contains("Access token has expired"));
                assert!(message.contains("code=InvalidAuthenticationToken"));
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn maps_throttling_with_retry_hint() {
        let error = map_api_error(
            StatusCode::TOO_MANY_REQUESTS,
            Some("12"),
            r#"{"error":{"code":"ApplicationThrottled","message":"Too many requests"}}"#,
        );

        match error {
            AppError::Api(message) => {
                assert!(message.contains("rate limited"));
                assert!(message.contains("retry after 12s"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_raw_body() {
        let error = map_api_error(StatusCode::BAD_GATEWAY, None, "upstream down");
        match error {
            AppError::Api(message) => assert!(message.contains("upstream down")),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn keeps_body_read_failure_in_error() {
        let body = error_body(Err::<String, _>(std::io::Error::other("connection reset")));
        let error = map_api_error(StatusCode::INTERNAL_SERVER_ERROR, None, &body);

        match error {
            AppError::Api(message) => {
                assert!(message.contains("error body unreadable: connection reset"));
                assert!(!message.contains("no error details"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn reads_optional_message_id() {
        assert_eq!(parse_message_id(""), None);
        assert_eq!(parse_message_id("{}"), None);
        assert_eq!(
            parse_message_id(r#"{"id":"msg-1"}"#).as_deref(),
            Some("msg-1")
        );
    }
}
