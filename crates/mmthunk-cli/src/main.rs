//! mmthunk: replay 16-bit MCI and MMIO calls through the thunk bridges
//!
//! Layout:
//!   script    : TOML replay scripts
//!   session   : one 16-bit task wired to the loopback drivers

mod script;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mmthunk_common::BridgeConfig;
use script::Script;
use session::Session;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mmthunk")]
#[command(about = "Replay 16-bit multimedia calls through the 16/32-bit thunk layer")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `debug` or `mmthunk_mci=trace` (overrides the config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a replay script and print each result
    Replay {
        script: PathBuf,

        /// Bridge configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Cannot load config {}", path.display())),
        None => Ok(BridgeConfig::new()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Bad log filter '{}'", level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay { script, config } => {
            let config = load_config(config.as_deref())?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level))?;
            replay(&script, &config)
        }
        Command::Config { file } => {
            let config = load_config(file.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn replay(path: &Path, config: &BridgeConfig) -> Result<()> {
    let script = Script::load(path)?;
    tracing::info!("mmthunk v{}: {} steps", env!("CARGO_PKG_VERSION"), script.steps.len());

    let mut session = Session::new(config, &script.files);
    for (index, step) in script.steps.iter().enumerate() {
        let outcome = session
            .run(step)
            .with_context(|| format!("Step {} ({})", index + 1, step.name()))?;
        println!("{:>3}  {:<10} {}", index + 1, step.name(), outcome);
    }

    println!(
        "--- {} live thunks, {} open devices, {} open files, {} 16-bit calls",
        session.mci().registry().live() + session.mmio().registry().live(),
        session.mci().driver().open_devices(),
        session.mmio().driver().open_files(),
        session.host().calls()
    );
    Ok(())
}
