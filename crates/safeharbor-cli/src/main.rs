use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "safeharbor", version, about = "HIPAA Safe Harbor SQL query validator")]
struct Cli {
    /// Path to safeharbor.yaml. Built-in defaults are used when omitted.
    #[arg(long, short = 'c', global = true, env = "SAFEHARBOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a query and print the outcome as JSON.
    ///
    /// The query is read from --query, --file, or standard input. Exits with
    /// status 1 when the query is rejected.
    Validate {
        /// Query text
        #[arg(long, short = 'q', conflicts_with = "file")]
        query: Option<String>,

        /// File containing the query
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,

        /// Request id to use instead of a generated one
        #[arg(long)]
        request_id: Option<String>,

        /// Override the minimum patient count
        #[arg(long)]
        threshold: Option<u64>,

        /// Leave educational guidance out of rejections
        #[arg(long, default_value_t = false)]
        no_guidance: bool,
    },

    /// Validate a result set (a JSON array of row objects).
    ///
    /// Exits with status 1 when the result set must be withheld.
    CheckOutput {
        /// JSON file with the rows; standard input when omitted
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,

        /// Request id reported with the result
        #[arg(long, default_value = "req-output")]
        request_id: String,
    },

    /// Recover the original query from a wrapped one.
    Unwrap {
        /// File containing the wrapped query; standard input when omitted
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Load the configuration and every file it references, and report what
    /// was loaded.
    Check,
}

fn main() -> anyhow::Result<ExitCode> {
    // stdout carries command output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let accepted = match cli.cmd {
        Command::Validate {
            query,
            file,
            request_id,
            threshold,
            no_guidance,
        } => commands::validate::run(commands::validate::ValidateArgs {
            config: cli.config,
            query,
            file,
            request_id,
            threshold,
            guidance: !no_guidance,
        })?,
        Command::CheckOutput { file, request_id } => {
            commands::output::run(cli.config, file, &request_id)?
        }
        Command::Unwrap { file } => commands::unwrap::run(file)?,
        Command::Check => commands::check::run(cli.config)?,
    };

    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
