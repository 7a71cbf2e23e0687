use anyhow::{Context, Result};
use clap::Parser;
use rao_cli::{Cli, Commands};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    match &cli.command {
        Commands::Run {
            case,
            parameters,
            out,
            threads,
        } => commands::run::handle(case, parameters.as_deref(), out.as_deref(), threads.as_deref()),
        Commands::Validate { case } => commands::validate::handle(case),
        Commands::Params { out } => commands::params::handle(out.as_deref()),
    }
}
