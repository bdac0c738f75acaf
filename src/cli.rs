use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::mail::Priority;

#[derive(Debug, Parser)]
#[command(
    name = "graph-mail",
    version,
    about = "Send mail through the Microsoft Graph API"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "default",
        help = "Profile name to use"
    )]
    pub profile: String,
    #[arg(long, global = true, help = "Emit JSON output")]
    pub json: bool,
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Verbose logging")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Send(SendArgs),
    Auth(AuthArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Acquire a token with the configured credential and report its expiry
    Check,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    #[arg(long, help = "Application (client) id")]
    pub app_id: Option<String>,
    #[arg(long, help = "Directory (tenant) id")]
    pub tenant_id: Option<String>,
    #[arg(long, help = "Client secret; selects app-only authentication")]
    pub client_secret: Option<String>,
    #[arg(long, help = "Remove the stored client secret")]
    pub clear_client_secret: bool,
    #[arg(long, help = "Keep a copy in Sent Items")]
    pub save_sent_items: Option<bool>,
    #[arg(long, help = "Loopback redirect uri for interactive sign-in")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[arg(long, help = "Sender mailbox address")]
    pub from: String,
    #[arg(long, help = "Sender display name")]
    pub from_name: Option<String>,
    #[arg(long, value_delimiter = ',', num_args = 1.., help = "Recipient addresses")]
    pub to: Vec<String>,
    #[arg(long, value_delimiter = ',', num_args = 1.., help = "CC addresses")]
    pub cc: Vec<String>,
    #[arg(long, value_delimiter = ',', num_args = 1.., help = "BCC addresses")]
    pub bcc: Vec<String>,
    #[arg(long, visible_alias = "subj", help = "Email subject")]
    pub subject: String,
    #[arg(long, help = "Inline body text")]
    pub body: Option<String>,
    #[arg(long, help = "Read body from file")]
    pub body_file: Option<PathBuf>,
    #[arg(long, help = "Read body from stdin")]
    pub stdin: bool,
    #[arg(long, conflicts_with = "markdown", help = "Send the body as HTML")]
    pub html: bool,
    #[arg(long, help = "Render the body from Markdown to HTML")]
    pub markdown: bool,
    #[arg(long, value_enum, help = "Message importance")]
    pub priority: Option<PriorityArg>,
    #[arg(long, action = ArgAction::Append, help = "Attach file (repeatable)")]
    pub attach: Vec<PathBuf>,
    #[arg(long, help = "Do not keep a copy in Sent Items")]
    pub no_save_sent: bool,
}
