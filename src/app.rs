use crate::cli::{Cli, Command};
use crate::commands;
use crate::context::AppContext;
use crate::error::AppResult;

pub async fn run(cli: Cli) -> AppResult<()> {
    let Cli {
        profile,
        json,
        command,
        ..
    } = cli;

    let ctx = AppContext::bootstrap(profile, json)?;

    match command {
        Command::Send(args) => commands::send::run(&ctx, args).await,
        Command::Auth(args) => commands::auth::run(&ctx, args.command).await,
        Command::Config(args) => commands::config::run(&ctx, args.command),
    }
}
