use clap::{Parser, Subcommand};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use vigil_core::infrastructure::config::load_config;
use vigil_core::infrastructure::logging::init_logger;

#[derive(Parser)]
#[command(name = "vigil-signer", about = "High-availability threshold remote signer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the signer process.
    Start {
        /// Path to the TOML configuration file.
        #[arg(long, default_value = "vigil.toml")]
        config: PathBuf,
        /// Log filter expression, e.g. "info", "vigil_core=debug", "root=warn".
        #[arg(long, default_value = "info")]
        log_filters: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Start { config, log_filters } => {
            let config = match load_config(&config) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("failed to load config: {err}");
                    return ExitCode::FAILURE;
                }
            };
            init_logger(config.service.log_dir.as_deref(), &log_filters);
            if let Err(err) = vigil_service::service::run(config).await {
                error!("signer exited with error: {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}
