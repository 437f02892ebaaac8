//! Rebase command: rebuild an image's package set on a new base image

use clap::Args;
use colored::Colorize;
use remix_core::{RebaseRequest, Rebaser};
use remix_engine::{DockerEngine, LogSink};
use std::sync::Arc;
use tracing::debug;

/// Build a new container image using a different base image
#[derive(Args, Debug)]
pub struct RebaseCommand {
    /// Existing container image to analyze
    #[arg(long, env = "REMIX_OLD_IMAGE")]
    pub old_image: String,

    /// New base image to use
    #[arg(long, env = "REMIX_NEW_BASE_IMAGE")]
    pub new_base_image: String,

    /// Name for the new container image
    #[arg(long, env = "REMIX_NEW_IMAGE")]
    pub new_image: String,

    /// Pull the old image if it is not present locally
    #[arg(long)]
    pub pull_missing: bool,

    /// Print the generated Dockerfile instead of building it
    #[arg(long)]
    pub dry_run: bool,
}

impl RebaseCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        // One pipeline, one container at a time
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        rt.block_on(self.execute_async())
    }

    pub fn request(&self) -> RebaseRequest {
        RebaseRequest::new(&self.old_image, &self.new_base_image, &self.new_image)
            .with_pull_missing(self.pull_missing)
            .with_dry_run(self.dry_run)
    }

    async fn execute_async(self) -> anyhow::Result<()> {
        println!("{}", "Remix".bright_blue().bold());
        println!("  Old image: {}", self.old_image);
        println!("  New base image: {}", self.new_base_image);
        println!("  New image: {}", self.new_image);
        println!();

        let engine = DockerEngine::connect_with_local_defaults()
            .map_err(|e| anyhow::anyhow!("Failed to connect to Docker: {}", e))?;
        engine
            .ping()
            .await
            .map_err(|e| anyhow::anyhow!("Docker daemon is not running: {}", e))?;
        debug!("Connected to Docker daemon");

        let report: LogSink = Arc::new(|line: &str| println!("{}", line));
        let rebaser = Rebaser::new(Arc::new(engine));
        let outcome = rebaser.run(&self.request(), report).await?;

        if self.dry_run {
            println!();
            print!("{}", outcome.recipe);
            return Ok(());
        }

        println!(
            "{} New container image '{}' has been built successfully.",
            "✅".bright_green(),
            self.new_image
        );
        Ok(())
    }
}
