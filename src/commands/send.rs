use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::cli::SendArgs;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::mail::markdown::markdown_to_html;
use crate::mail::{Address, Attachment, EmailMessage, Priority};
use crate::output::OutputMode;

pub async fn run(ctx: &AppContext, args: SendArgs) -> AppResult<()> {
    let save_sent_items = args.no_save_sent.then_some(false);
    let email = build_email(args)?;
    let sender = ctx.sender(save_sent_items)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = sender.send_async(email, Some(&cancel)).await;
    watcher.abort();

    if result.is_success() {
        let text = match result.message_id() {
            Some(id) if !id.is_empty() => format!("sent message {id}"),
            _ => "message accepted".to_string(),
        };
        return ctx.output.emit(&text, &result);
    }

    if ctx.output.mode() == OutputMode::Json {
        ctx.output.emit("", &result)?;
    }

    Err(AppError::Api(result.error_messages().join("; ")))
}

fn build_email(args: SendArgs) -> AppResult<EmailMessage> {
    if args.to.is_empty() && args.cc.is_empty() && args.bcc.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one of --to, --cc or --bcc is required".to_string(),
        ));
    }

    let body = read_body(&args)?;
    let from = match args.from_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Address::with_name(args.from.trim(), name),
        _ => parse_address(&args.from)?,
    };

    let mut email = EmailMessage::new(from)
        .subject(args.subject)
        .priority(args.priority.map(Priority::from).unwrap_or_default());

    email = if args.markdown {
        email.html_body(markdown_to_html(&body))
    } else if args.html {
        email.html_body(body)
    } else {
        email.text_body(body)
    };

    email.to = parse_addresses(&args.to)?;
    email.cc = parse_addresses(&args.cc)?;
    email.bcc = parse_addresses(&args.bcc)?;
    email.attachments = open_attachments(&args.attach)?;

    Ok(email)
}

fn read_body(args: &SendArgs) -> AppResult<String> {
    let selected = [args.body.is_some(), args.body_file.is_some(), args.stdin]
        .into_iter()
        .filter(|selected| *selected)
        .count();

    if selected == 0 {
        return Err(AppError::InvalidInput(
            "missing body source; pass one of --body, --body-file, or --stdin".to_string(),
        ));
    }

    if selected > 1 {
        return Err(AppError::InvalidInput(
            "pass only one body source: --body, --body-file, or --stdin".to_string(),
        ));
    }

    if let Some(body) = &args.body {
        return Ok(body.clone());
    }

    if let Some(path) = &args.body_file {
        return Ok(fs::read_to_string(path)?);
    }

    let mut body = String::new();
    io::stdin().read_to_string(&mut body)?;
    Ok(body)
}

fn open_attachments(paths: &[PathBuf]) -> AppResult<Vec<Attachment>> {
    paths
        .iter()
        .map(|path| Attachment::from_path(path))
        .collect()
}

fn parse_addresses(values: &[String]) -> AppResult<Vec<Address>> {
    values
        .iter()
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_address)
        .collect()
}

// Accepts `user@host` or `Display Name <user@host>`.
fn parse_address(raw: &str) -> AppResult<Address> {
    let raw = raw.trim();
    let (name, email) = match (raw.rfind('<'), raw.strip_suffix('>')) {
        (Some(open), Some(inner)) => {
            let name = raw[..open].trim().trim_matches('"').trim();
            (Some(name), inner[open + 1..].trim())
        }
        _ => (None, raw),
    };

    if email.is_empty() || !email.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidInput(format!(
            "invalid email address `{raw}`"
        )));
    }

    Ok(match name.filter(|name| !name.is_empty()) {
        Some(name) => Address::with_name(email, name),
        None => Address::new(email),
    })
}
