use serde::Serialize;

use crate::api::MailTransport;
use crate::api::models::{SendMailRequest, WireMessage};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_messages: Option<Vec<String>>,
}

impl SendResult {
    // A missing id from the service is recorded as an empty string.
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            message_id: Some(message_id.unwrap_or_default()),
            error_messages: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message_id: None,
            error_messages: Some(vec![message.into()]),
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        Self::failed(error.to_string())
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn error_messages(&self) -> &[String] {
        self.error_messages.as_deref().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.error_messages().is_empty()
    }
}

pub async fn dispatch<T>(transport: &T, message: WireMessage, save_sent_items: bool) -> SendResult
where
    T: MailTransport + ?Sized,
{
    let sender = message.from.email_address.address.clone();
    let request = SendMailRequest {
        message,
        save_to_sent_items: save_sent_items,
    };

    match transport.send_mail(&sender, &request).await {
        Ok(message_id) => SendResult::sent(message_id),
        Err(err) => {
            tracing::warn!(sender = %sender, error = %err, "send failed");
            SendResult::from_error(&err)
        }
    }
}
