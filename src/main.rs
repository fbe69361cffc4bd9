use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use taproot_spend::crypto::taptree::TreeShape;
use taproot_spend::log_error;
use taproot_spend::utils::logging;
use taproot_spend::{
    build_spend, derive, SigningConfig, SpendRequest, TaprootError, TaprootOutputSpec,
    TaprootResult,
};

/// Derive Taproot outputs and sign spends from them
#[derive(Debug, Parser)]
#[command(name = "taproot-spend", version)]
struct Cli {
    /// JSON signing configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log intermediate values to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the output key, scriptPubKey and control blocks
    Derive {
        /// x-only internal key (hex)
        #[arg(long, required_unless_present = "request")]
        internal_key: Option<String>,

        /// Leaf script (hex), repeatable
        #[arg(long = "leaf")]
        leaves: Vec<String>,

        /// Tree shape as JSON, e.g. "[[0,1],2]"
        #[arg(long)]
        tree: Option<String>,

        /// Read the output description from a JSON file instead
        #[arg(long, conflicts_with_all = ["internal_key", "leaves", "tree"])]
        request: Option<PathBuf>,
    },
    /// Build and sign a one-input spend
    Spend {
        /// JSON spend request; stdin when omitted
        request: Option<PathBuf>,
    },
}

fn read_input(path: Option<&PathBuf>) -> TaprootResult<String> {
    let result = match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map(|_| buffer)
        }
    };
    result.map_err(|e| TaprootError::ParseError(format!("cannot read request: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> TaprootResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn run(cli: Cli) -> TaprootResult<String> {
    let config = SigningConfig::load(cli.config.as_deref())?;
    if cli.debug || config.debug_logging {
        logging::enable_debug();
    }

    match cli.command {
        Command::Derive {
            internal_key,
            leaves,
            tree,
            request,
        } => {
            let spec: TaprootOutputSpec = match request {
                Some(path) => serde_json::from_str(&read_input(Some(&path))?)?,
                None => TaprootOutputSpec {
                    internal_key: internal_key.unwrap_or_default(),
                    leaves,
                    tree: tree
                        .map(|json| serde_json::from_str::<TreeShape>(&json))
                        .transpose()?,
                },
            };
            to_json(&derive(&spec, &config)?)
        }
        Command::Spend { request } => {
            let request: SpendRequest = serde_json::from_str(&read_input(request.as_ref())?)?;
            to_json(&build_spend(&request, &config)?)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log_error!("cli", "Command failed", error = err);
            let report = serde_json::json!({ "error": err.to_report() });
            println!("{}", report);
            ExitCode::FAILURE
        }
    }
}
