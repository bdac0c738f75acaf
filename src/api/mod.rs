pub mod client;
pub mod models;
pub mod users;

use async_trait::async_trait;

use crate::error::AppResult;

pub use client::GraphClient;
pub use models::{SendMailRequest, WireMessage};

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, sender: &str, request: &SendMailRequest)
    -> AppResult<Option<String>>;
}
