// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipexec", version, about = "Run process pipelines with tracing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command or pipeline.
    ///
    /// Stages on the command line are separated by a literal `|` argument:
    /// pipexec run -- echo hi '|' tr a-z A-Z
    Run {
        /// TOML pipeline definition.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Environment entries for every stage as KEY=VALUE. Can be repeated.
        #[arg(long = "env")]
        env_vars: Vec<String>,

        /// Command line of the pipeline.
        #[arg(last = true)]
        argv: Vec<String>,
    },

    /// Print the resolved path of an executable.
    Which {
        /// Executable name.
        name: String,
    },

    /// Validate a TOML pipeline definition.
    Check {
        /// TOML pipeline definition.
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_logging(debug: bool, level: Option<&str>) {
    let filter = if debug {
        EnvFilter::new("pipexec=debug")
    } else if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else {
        EnvFilter::new(format!("pipexec={}", level.unwrap_or("info")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            env_vars,
            argv,
        } => {
            let source = commands::PipelineSource::from_args(config.as_deref(), &argv)?;
            init_logging(cli.debug, source.log_level());
            commands::cmd_run(source, &env_vars).await
        }
        Commands::Which { name } => {
            init_logging(cli.debug, None);
            commands::cmd_which(&name)
        }
        Commands::Check { config } => {
            init_logging(cli.debug, None);
            commands::cmd_check(&config)
        }
    }
}
