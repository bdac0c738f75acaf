use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = graph_mail::cli::Cli::parse();
    graph_mail::logging::init(cli.verbose);

    if let Err(err) = graph_mail::run(cli).await {
        tracing::debug!(error = ?err, "command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
