pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod mail;
pub mod output;
pub mod sender;

use cli::Cli;
use error::AppResult;

pub use mail::{Address, Attachment, EmailMessage, Priority};
pub use sender::{GraphSender, SendResult};

pub async fn run(cli: Cli) -> AppResult<()> {
    app::run(cli).await
}
