use remix_engine::EngineError;
use std::fmt;
use thiserror::Error;

/// Lifecycle step of the introspection container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Create,
    Upload,
    Start,
    Exec,
    Remove,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStage::Create => write!(f, "create"),
            ExtractionStage::Upload => write!(f, "upload probe to"),
            ExtractionStage::Start => write!(f, "start"),
            ExtractionStage::Exec => write!(f, "run probe in"),
            ExtractionStage::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to build probe archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("Failed to {stage} introspection container: {source}")]
    Engine {
        stage: ExtractionStage,
        #[source]
        source: EngineError,
    },
}

impl ExtractionError {
    pub fn engine(stage: ExtractionStage, source: EngineError) -> Self {
        ExtractionError::Engine { stage, source }
    }

    /// The underlying engine failure, if the engine raised it
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ExtractionError::Engine { source, .. } => Some(source),
            ExtractionError::Archive(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    /// The engine ran the recipe and reported a failure
    #[error("Build failed: {message}")]
    Failed { message: String, log: Vec<String> },

    #[error("Failed to prepare build context: {0}")]
    Context(#[from] std::io::Error),

    #[error(transparent)]
    Engine(EngineError),
}

#[derive(Error, Debug)]
pub enum RebaseError {
    #[error("Failed to resolve image {reference}: {source}")]
    Resolve {
        reference: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to list installed packages in {image}: {source}")]
    Extraction {
        image: String,
        #[source]
        source: ExtractionError,
    },

    #[error("Error building the new image {tag}: {source}")]
    Build {
        tag: String,
        #[source]
        source: BuildError,
    },
}
