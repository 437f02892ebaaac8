//! Materializes a recipe into a tagged image through the container engine

use crate::error::BuildError;
use crate::recipe::BuildRecipe;
use remix_engine::{BuildRequest, ContainerEngine, EngineError, ImageHandle, LogSink};
use std::sync::Arc;
use tracing::{error, info};

pub const DOCKERFILE_NAME: &str = "Dockerfile";

pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Build `recipe` as `tag`, always re-pulling the base and dropping
    /// intermediate containers.
    ///
    /// Every log record goes to `log` as it arrives. On a failed build the
    /// lines captured by the engine are replayed through `log` before the
    /// error is returned.
    pub async fn build(
        &self,
        recipe: &BuildRecipe,
        tag: &str,
        log: LogSink,
    ) -> Result<ImageHandle, BuildError> {
        // Removed on drop, including the error paths below
        let context = tempfile::Builder::new()
            .prefix("remix-build-")
            .tempdir()?;
        tokio::fs::write(context.path().join(DOCKERFILE_NAME), recipe.as_str()).await?;

        let mut request = BuildRequest::new(tag, context.path().to_path_buf());
        request.dockerfile = DOCKERFILE_NAME.to_string();
        request.remove_intermediate = true;
        request.pull = true;

        match self.engine.build_image(request, log.clone()).await {
            Ok(image) => {
                info!("Built {} ({})", tag, image.id);
                Ok(image)
            }
            Err(EngineError::BuildFailed { message, log: lines }) => {
                error!("Build of {} failed: {}", tag, message);
                for line in &lines {
                    log(line);
                }
                Err(BuildError::Failed {
                    message,
                    log: lines,
                })
            }
            Err(e) => Err(BuildError::Engine(e)),
        }
    }
}
