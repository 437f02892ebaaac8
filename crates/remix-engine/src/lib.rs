//! Remix Engine - Container engine boundary
//!
//! This crate provides a unified interface for:
//! - Resolving and pulling images
//! - Managing throwaway container lifecycle (create, start, stop, remove)
//! - Uploading archives into containers and executing commands in them
//! - Building OCI images from a Dockerfile context
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Callback invoked once per build log record, in engine order
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

pub mod docker;

pub use docker::DockerEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Container operation failed: {0}")]
    ContainerFailed(String),

    #[error("Exec failed: {0}")]
    ExecFailed(String),

    #[error("Build failed: {message}")]
    BuildFailed { message: String, log: Vec<String> },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// True when the engine accepted the build and reported it as failed
    pub fn is_build_failure(&self) -> bool {
        matches!(self, EngineError::BuildFailed { .. })
    }
}

/// A resolved image. Immutable once returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub tags: Vec<String>,
}

impl ImageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// First tag if any, otherwise the image id
    pub fn display_name(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or(&self.id)
    }
}

/// Configuration for creating a container that is not started yet
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub tty: bool,
}

impl ContainerSpec {
    /// A container that idles in a shell until stopped, whatever the image's entrypoint
    pub fn idle_shell() -> Self {
        Self {
            entrypoint: Some(vec!["/bin/sh".to_string()]),
            cmd: None,
            tty: true,
        }
    }
}

/// Result of a synchronous exec. `output` is stdout and stderr interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i64>,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub tag: String,
    pub context_path: PathBuf,
    pub dockerfile: String,
    /// Remove intermediate containers after the build
    pub remove_intermediate: bool,
    /// Always pull the referenced base images
    pub pull: bool,
}

impl BuildRequest {
    pub fn new(tag: impl Into<String>, context_path: PathBuf) -> Self {
        Self {
            tag: tag.into(),
            context_path,
            dockerfile: "Dockerfile".to_string(),
            remove_intermediate: true,
            pull: true,
        }
    }
}

/// Everything the rebase pipeline needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Resolve a name, tag or digest to a local image
    async fn resolve_image(&self, reference: &str) -> Result<ImageHandle, EngineError>;

    /// Fetch an image from its registry
    async fn pull_image(&self, reference: &str) -> Result<(), EngineError>;

    /// Create a container from an image without starting it, returning its id
    async fn create_container(
        &self,
        image: &ImageHandle,
        spec: ContainerSpec,
    ) -> Result<String, EngineError>;

    /// Extract a tar archive into the container filesystem at `path`
    async fn upload_archive(
        &self,
        container_id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError>;

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Run a command inside a running container and wait for it to finish
    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError>;

    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Remove a container, forcing it down if still running
    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Build an image from a context directory, streaming log lines to `log`
    async fn build_image(
        &self,
        request: BuildRequest,
        log: LogSink,
    ) -> Result<ImageHandle, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_defaults() {
        let request = BuildRequest::new("app:rebased", PathBuf::from("/tmp/ctx"));

        assert_eq!(request.tag, "app:rebased");
        assert_eq!(request.dockerfile, "Dockerfile");
        assert!(request.remove_intermediate);
        assert!(request.pull);
    }

    #[test]
    fn test_idle_shell_spec() {
        let spec = ContainerSpec::idle_shell();
        assert_eq!(spec.entrypoint, Some(vec!["/bin/sh".to_string()]));
        assert!(spec.cmd.is_none());
        assert!(spec.tty);
    }

    #[test]
    fn test_image_handle_display_name() {
        let bare = ImageHandle::new("sha256:abc123");
        assert_eq!(bare.display_name(), "sha256:abc123");

        let tagged = ImageHandle::new("sha256:abc123").with_tags(vec![
            "debian:12".to_string(),
            "debian:bookworm".to_string(),
        ]);
        assert_eq!(tagged.display_name(), "debian:12");
    }

    #[test]
    fn test_build_failure_detection() {
        let build = EngineError::BuildFailed {
            message: "returned a non-zero code: 100".to_string(),
            log: vec!["Step 1/2 : FROM debian:12".to_string()],
        };
        let other = EngineError::ContainerFailed("no such container".to_string());

        assert!(build.is_build_failure());
        assert!(!other.is_build_failure());
    }

    #[test]
    fn test_error_display_messages() {
        let not_found = EngineError::ImageNotFound("ghost:latest".to_string());
        let build = EngineError::BuildFailed {
            message: "boom".to_string(),
            log: Vec::new(),
        };

        assert_eq!(not_found.to_string(), "Image not found: ghost:latest");
        assert_eq!(build.to_string(), "Build failed: boom");
    }
}
