//! Remix CLI - Rebuild a container image on a different base image
//!
//! Lists the packages installed in an existing image, writes a Dockerfile
//! installing them on the new base, and builds it.

mod commands;

use clap::Parser;
use commands::RebaseCommand;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "REMIX_LOG_LEVEL")]
    log_level: String,

    /// Log format: compact, full
    #[arg(long, default_value = "compact", env = "REMIX_LOG_FORMAT")]
    log_format: String,

    #[command(flatten)]
    rebase: RebaseCommand,
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "remix={level},\
             remix_cli={level},\
             remix_core={level},\
             remix_engine={level},\
             bollard=warn,\
             hyper=warn,\
             hyper_util=warn,\
             h2=warn",
            level = log_level
        ))?
    };

    // stdout carries progress and build output, logs go to stderr
    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// One line carrying the whole cause chain
fn render_error(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match cli.rebase.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&e));
            ExitCode::FAILURE
        }
    }
}
