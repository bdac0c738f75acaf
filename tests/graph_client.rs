use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use graph_mail::auth::{AuthorizationPrompt, CredentialMode, CredentialProvider};
use graph_mail::config::Settings;
use graph_mail::error::{AppError, AppResult};
use graph_mail::mail::{Address, Attachment, EmailMessage, Priority};
use graph_mail::sender::GraphSender;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "tenant-1";
const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";
const SEND_PATH: &str = "/v1.0/users/a@x.com/sendMail";

fn settings(server: &MockServer, secret: Option<&str>) -> Settings {
    Settings {
        app_id: Some("app-1".to_string()),
        tenant_id: Some(TENANT.to_string()),
        client_secret: secret.map(ToOwned::to_owned),
        save_sent_items: Some(true),
        authority: Some(server.uri()),
        api_base_url: Some(server.uri()),
        ..Settings::default()
    }
}

fn hello_email() -> EmailMessage {
    EmailMessage::new(Address::with_name("a@x.com", "Alice"))
        .subject("Hi")
        .text_body("Hello")
        .to(Address::new("b@x.com"))
        .priority(Priority::Normal)
}

fn token_response(access_token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token_type": "Bearer",
        "expires_in": expires_in,
        "access_token": access_token,
    }))
}

/// Answers the sign-in prompt with a fixed code and counts how often it is asked.
#[derive(Default)]
struct FixedCodePrompt {
    calls: AtomicUsize,
}

#[async_trait]
impl AuthorizationPrompt for FixedCodePrompt {
    async fn authorization_code(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
        expected_state: &str,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let url = Url::parse(authorization_url)?;
        let state = url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.to_string());
        assert_eq!(state.as_deref(), Some(expected_state));
        assert_eq!(redirect_uri, "http://localhost:8400/callback");
        assert!(url.path().ends_with("/tenant-1/oauth2/v2.0/authorize"));

        Ok("auth-code-1".to_string())
    }
}

struct DenyingPrompt;

#[async_trait]
impl AuthorizationPrompt for DenyingPrompt {
    async fn authorization_code(&self, _: &str, _: &str, _: &str) -> AppResult<String> {
        Err(AppError::Auth(
            "authorization denied: access_denied (user declined)".to_string(),
        ))
    }
}

#[tokio::test]
async fn application_credential_sends_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(token_response("app-token", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer app-token"))
        .and(body_partial_json(json!({
            "saveToSentItems": true,
            "message": {
                "subject": "Hi",
                "body": { "contentType": "text", "content": "Hello" },
                "from": { "emailAddress": { "address": "a@x.com", "name": "Alice" } },
                "toRecipients": [{ "emailAddress": { "address": "b@x.com" } }],
                "importance": "normal"
            }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;

    let sender = GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender");
    assert_eq!(sender.credential_mode(), Some(CredentialMode::Application));

    let first = sender.send_async(hello_email(), None).await;
    let second = sender.send_async(hello_email(), None).await;

    assert!(first.is_success(), "{:?}", first.error_messages());
    assert_eq!(first.message_id(), Some(""));
    assert!(second.is_success());
}

#[tokio::test]
async fn attachments_are_base64_encoded_on_the_wire() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("app-token", 3600))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({
            "message": {
                "attachments": [{
                    "@odata.type": "#microsoft.graph.fileAttachment",
                    "name": "a.txt",
                    "contentType": "text/plain",
                    "contentBytes": "aGVsbG8gYXR0YWNobWVudA=="
                }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-9" })))
        .expect(1)
        .mount(&server)
        .await;

    let sender = GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender");
    let email = hello_email().attach(Attachment::from_bytes(
        "a.txt",
        "text/plain",
        "hello attachment",
    ));

    let result = sender.send_async(email, None).await;
    assert_eq!(result.message_id(), Some("msg-9"));
}

#[tokio::test]
async fn rejected_secret_surfaces_as_send_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let sender = GraphSender::from_settings(&settings(&server, Some("wrong"))).expect("sender");
    let result = sender.send_async(hello_email(), None).await;

    assert_eq!(result.message_id(), None);
    assert_eq!(result.error_messages().len(), 1);
    assert!(result.error_messages()[0].contains("invalid_client"));
}

#[tokio::test]
async fn throttled_send_surfaces_as_send_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("app-token", 3600))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_json(json!({
                    "error": { "code": "ApplicationThrottled", "message": "Too many requests" }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sender = GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender");
    let result = sender.send_async(hello_email(), None).await;

    let errors = result.error_messages();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("rate limited"));
    assert!(errors[0].contains("retry after 7s"));
}

#[tokio::test]
async fn delegated_credential_signs_in_once_then_refreshes_silently() {
    let server = MockServer::start().await;

    // Expires inside the skew window, so the next send has to refresh.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 5,
            "access_token": "user-token-1",
            "refresh_token": "refresh-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(token_response("user-token-2", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer user-token-1"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer user-token-2"))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;

    let prompt = Arc::new(FixedCodePrompt::default());
    let sender = GraphSender::from_settings_with_prompt(&settings(&server, None), prompt.clone())
        .expect("sender");
    assert_eq!(sender.credential_mode(), Some(CredentialMode::Delegated));

    for _ in 0..3 {
        let result = sender.send_async(hello_email(), None).await;
        assert!(result.is_success(), "{:?}", result.error_messages());
    }

    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn denied_sign_in_aborts_the_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let sender =
        GraphSender::from_settings_with_prompt(&settings(&server, None), Arc::new(DenyingPrompt))
            .expect("sender");
    let result = sender.send_async(hello_email(), None).await;

    assert_eq!(
        result.error_messages(),
        ["auth error: authorization denied: access_denied (user declined)".to_string()]
    );
}

#[tokio::test]
async fn application_token_is_shared_by_concurrent_sends() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("app-token", 3600))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(202))
        .expect(8)
        .mount(&server)
        .await;

    let sender = Arc::new(
        GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender"),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sender = Arc::clone(&sender);
        handles.push(tokio::spawn(async move {
            sender.send_async(hello_email(), None).await
        }));
    }

    for handle in handles {
        assert!(handle.await.expect("join").is_success());
    }
}

#[tokio::test]
async fn credential_token_is_exposed_for_checks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("app-token", 3600))
        .mount(&server)
        .await;

    let sender = GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender");
    let token = sender
        .credential()
        .expect("credential")
        .token()
        .await
        .expect("token");

    assert_eq!(token.access_token, "app-token");
    assert!(!token.has_refresh_token());
}

#[test]
fn construction_rejects_missing_identifiers() {
    let missing_tenant = Settings {
        app_id: Some("app-1".to_string()),
        client_secret: Some("s3cret".to_string()),
        ..Settings::default()
    };
    assert!(matches!(
        GraphSender::from_settings(&missing_tenant),
        Err(AppError::Config(_))
    ));

    assert!(matches!(
        GraphSender::with_client_secret("", "tenant", "s3cret", true),
        Err(AppError::Config(_))
    ));
}

#[test]
fn explicit_constructors_fix_the_credential_variant() {
    assert!(matches!(
        GraphSender::with_client_secret("app-1", TENANT, "   ", true),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        GraphSender::with_client_secret("app-1", " ", "s3cret", true),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        GraphSender::delegated("app-1", "", true),
        Err(AppError::Config(_))
    ));

    let application =
        GraphSender::with_client_secret("app-1", TENANT, "s3cret", false).expect("application");
    assert_eq!(application.credential_mode(), Some(CredentialMode::Application));
    assert!(!application.save_sent_items());

    let delegated = GraphSender::delegated("app-1", TENANT, true).expect("delegated");
    assert_eq!(delegated.credential_mode(), Some(CredentialMode::Delegated));
    assert!(delegated.save_sent_items());
}

#[test]
fn blocking_send_against_live_endpoint() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(token_response("app-token", 3600))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1" })))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let sender = GraphSender::from_settings(&settings(&server, Some("s3cret"))).expect("sender");
    let result = sender.send(hello_email(), None);

    assert_eq!(result.message_id(), Some("msg-1"));
    runtime.block_on(async { server.verify().await });
}
