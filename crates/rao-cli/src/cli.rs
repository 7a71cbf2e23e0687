use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rao", author, version, about = "Remedial action optimisation for transmission networks", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimise remedial actions for a case
    Run {
        /// Case file (JSON with network, crac and oracle)
        #[arg(long, value_hint = ValueHint::FilePath)]
        case: PathBuf,
        /// Parameters file (TOML); defaults apply for missing keys
        #[arg(long, value_hint = ValueHint::FilePath)]
        parameters: Option<PathBuf>,
        /// Where to write the JSON result; printed on stdout otherwise
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        /// Worker threads for leaves and scenarios (`auto` or a number)
        #[arg(long)]
        threads: Option<String>,
    },
    /// Check the referential integrity of a case
    Validate {
        #[arg(long, value_hint = ValueHint::FilePath)]
        case: PathBuf,
    },
    /// Write the default parameters as TOML
    Params {
        /// Output file; printed on stdout otherwise
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
}
