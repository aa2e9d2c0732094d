use clap::Parser;
use colored::Colorize;
use infrastructure::config::Config;
use presentation::cli::{Cli, CliApp};
use shared::telemetry::init_tracing;
use shared::types::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{}", format!("{err:#}").red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let app = CliApp::new(config, cli.show_sources);
    app.run(&cli).await
}
