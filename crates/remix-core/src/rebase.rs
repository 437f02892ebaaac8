//! Extract, generate, build

use crate::builder::ImageBuilder;
use crate::error::RebaseError;
use crate::inventory::{PackageExtractor, PackageInventory};
use crate::recipe::{generate, BuildRecipe};
use remix_engine::{ContainerEngine, EngineError, ImageHandle, LogSink};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RebaseRequest {
    /// Image whose packages are carried over
    pub old_image: String,
    /// Base the rebuilt image starts `FROM`
    pub new_base_image: String,
    /// Tag for the rebuilt image
    pub new_image: String,
    /// Pull `old_image` if it is not present locally
    pub pull_missing: bool,
    /// Stop after generating the recipe
    pub dry_run: bool,
}

impl RebaseRequest {
    pub fn new(
        old_image: impl Into<String>,
        new_base_image: impl Into<String>,
        new_image: impl Into<String>,
    ) -> Self {
        Self {
            old_image: old_image.into(),
            new_base_image: new_base_image.into(),
            new_image: new_image.into(),
            pull_missing: false,
            dry_run: false,
        }
    }

    pub fn with_pull_missing(mut self, pull_missing: bool) -> Self {
        self.pull_missing = pull_missing;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RebaseOutcome {
    pub inventory: PackageInventory,
    pub recipe: BuildRecipe,
    /// `None` for a dry run
    pub image: Option<ImageHandle>,
}

pub struct Rebaser {
    engine: Arc<dyn ContainerEngine>,
    extractor: PackageExtractor,
    builder: ImageBuilder,
}

impl Rebaser {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            extractor: PackageExtractor::new(engine.clone()),
            builder: ImageBuilder::new(engine.clone()),
            engine,
        }
    }

    /// Run the pipeline once. Progress lines and build log lines go to `report`.
    pub async fn run(
        &self,
        request: &RebaseRequest,
        report: LogSink,
    ) -> Result<RebaseOutcome, RebaseError> {
        let old_image = self
            .resolve(&request.old_image, request.pull_missing)
            .await?;

        report(&format!("Analyzing installed packages in {}", request.old_image));
        let inventory =
            self.extractor
                .extract(&old_image)
                .await
                .map_err(|source| RebaseError::Extraction {
                    image: request.old_image.clone(),
                    source,
                })?;
        report(&format!(
            "Found {} installed packages ({})",
            inventory.len(),
            inventory.manager()
        ));

        let recipe = generate(&request.new_base_image, &inventory);
        if request.dry_run {
            info!("Dry run, skipping build of {}", request.new_image);
            return Ok(RebaseOutcome {
                inventory,
                recipe,
                image: None,
            });
        }

        report(&format!("Building new container image: {}", request.new_image));
        let image = self
            .builder
            .build(&recipe, &request.new_image, report.clone())
            .await
            .map_err(|source| RebaseError::Build {
                tag: request.new_image.clone(),
                source,
            })?;

        Ok(RebaseOutcome {
            inventory,
            recipe,
            image: Some(image),
        })
    }

    async fn resolve(&self, reference: &str, pull_missing: bool) -> Result<ImageHandle, RebaseError> {
        let resolve_error = |source: EngineError| RebaseError::Resolve {
            reference: reference.to_string(),
            source,
        };

        match self.engine.resolve_image(reference).await {
            Err(EngineError::ImageNotFound(_)) if pull_missing => {
                info!("{} not present locally, pulling", reference);
                self.engine
                    .pull_image(reference)
                    .await
                    .map_err(resolve_error)?;
                self.engine
                    .resolve_image(reference)
                    .await
                    .map_err(resolve_error)
            }
            result => result.map_err(resolve_error),
        }
    }
}
