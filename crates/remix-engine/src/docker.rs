//! Docker implementation of the ContainerEngine trait

use crate::{
    BuildRequest, ContainerEngine, ContainerSpec, EngineError, ExecOutput, ImageHandle, LogSink,
};
use async_trait::async_trait;
use bollard::{
    body_full,
    exec::{CreateExecOptions, StartExecResults},
    query_parameters::{
        BuildImageOptions, CreateContainerOptionsBuilder, CreateImageOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
        UploadToContainerOptions,
    },
    models::BuildInfo,
    Docker,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// The idle shell ignores SIGTERM and the container is force-removed next
const STOP_TIMEOUT_SECS: i32 = 0;

pub struct DockerEngine {
    docker: Arc<Docker>,
}

impl DockerEngine {
    pub fn new(docker: Arc<Docker>) -> Self {
        Self { docker }
    }

    /// Connect using DOCKER_HOST or the platform's local socket
    pub fn connect_with_local_defaults() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self::new(Arc::new(docker)))
    }

    /// Check the daemon answers before starting any work
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn create_tar_context(context_path: &Path) -> Result<Bytes, EngineError> {
        let mut tar_buffer = Vec::new();
        {
            let mut tar_builder = tar::Builder::new(&mut tar_buffer);
            tar_builder.append_dir_all(".", context_path)?;
            tar_builder.finish()?;
        }
        Ok(Bytes::from(tar_buffer))
    }

    /// Forward build output to the sink, keeping every line for the failure report.
    ///
    /// Only errors reported by the build itself are build failures; transport
    /// and API errors stay engine errors.
    async fn follow_build<S>(build_stream: S, log: &LogSink) -> Result<Vec<String>, EngineError>
    where
        S: Stream<Item = Result<BuildInfo, bollard::errors::Error>>,
    {
        futures::pin_mut!(build_stream);

        let mut captured = Vec::new();
        while let Some(build_info) = build_stream.next().await {
            match build_info {
                Ok(info) => {
                    if let Some(stream) = info.stream {
                        let line = stream.trim().to_string();
                        debug!("Build: {}", line);
                        log(&line);
                        captured.push(line);
                    }
                    if let Some(message) = info.error {
                        error!("Build error: {}", message);
                        return Err(EngineError::BuildFailed {
                            message,
                            log: captured,
                        });
                    }
                }
                Err(bollard::errors::Error::DockerStreamError { error: message }) => {
                    error!("Build error: {}", message);
                    return Err(EngineError::BuildFailed {
                        message,
                        log: captured,
                    });
                }
                Err(e @ bollard::errors::Error::DockerResponseServerError { .. }) => {
                    return Err(EngineError::Other(format!("Build request rejected: {}", e)));
                }
                Err(e) => {
                    return Err(EngineError::Unavailable(format!(
                        "Lost connection during build: {}",
                        e
                    )));
                }
            }
        }

        Ok(captured)
    }

    fn stop_options() -> StopContainerOptions {
        StopContainerOptions {
            t: Some(STOP_TIMEOUT_SECS),
            ..Default::default()
        }
    }

    fn is_not_found(err: &bollard::errors::Error) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }
        )
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn resolve_image(&self, reference: &str) -> Result<ImageHandle, EngineError> {
        let image = self.docker.inspect_image(reference).await.map_err(|e| {
            if Self::is_not_found(&e) {
                EngineError::ImageNotFound(reference.to_string())
            } else {
                EngineError::Other(format!("Failed to inspect image {}: {}", reference, e))
            }
        })?;

        let id = image
            .id
            .ok_or_else(|| EngineError::Other(format!("Image {} has no id", reference)))?;
        debug!("Resolved {} to {}", reference, id);

        Ok(ImageHandle::new(id).with_tags(image.repo_tags.unwrap_or_default()))
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        info!("Pulling image {}", reference);

        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: Some(reference.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull {}: {}", reference, status);
                    }
                }
                Err(e) => {
                    return Err(if Self::is_not_found(&e) {
                        EngineError::ImageNotFound(reference.to_string())
                    } else {
                        EngineError::Other(format!("Failed to pull {}: {}", reference, e))
                    });
                }
            }
        }

        Ok(())
    }

    async fn create_container(
        &self,
        image: &ImageHandle,
        spec: ContainerSpec,
    ) -> Result<String, EngineError> {
        let container_config = bollard::models::ContainerCreateBody {
            image: Some(image.id.clone()),
            entrypoint: spec.entrypoint,
            cmd: spec.cmd,
            tty: Some(spec.tty),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().build()),
                container_config,
            )
            .await
            .map_err(|e| {
                EngineError::ContainerFailed(format!("Failed to create container: {}", e))
            })?;

        debug!(
            "Created container {} from {}",
            container.id,
            image.display_name()
        );
        Ok(container.id)
    }

    async fn upload_archive(
        &self,
        container_id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.docker
            .upload_to_container(
                container_id,
                Some(UploadToContainerOptions {
                    path: path.to_string(),
                    ..Default::default()
                }),
                body_full(Bytes::from(archive)),
            )
            .await
            .map_err(|e| {
                EngineError::ContainerFailed(format!(
                    "Failed to upload archive to {}:{}: {}",
                    container_id, path, e
                ))
            })?;
        Ok(())
    }

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(|e| {
                EngineError::ContainerFailed(format!("Failed to start container: {}", e))
            })?;
        Ok(())
    }

    async fn exec(&self, container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EngineError::ExecFailed(format!("Failed to create exec: {}", e)))?;

        let mut output = String::new();
        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| EngineError::ExecFailed(format!("Failed to start exec: {}", e)))?
        {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        EngineError::ExecFailed(format!("Failed to read exec output: {}", e))
                    })?;
                    output.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
                }
            }
            StartExecResults::Detached => {
                return Err(EngineError::ExecFailed(
                    "Exec started detached, no output to capture".to_string(),
                ));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| EngineError::ExecFailed(format!("Failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code,
            output,
        })
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(
                container_id,
                Some(Self::stop_options()),
            )
            .await
            .map_err(|e| {
                EngineError::ContainerFailed(format!("Failed to stop container: {}", e))
            })?;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| {
                EngineError::ContainerFailed(format!("Failed to remove container: {}", e))
            })?;
        Ok(())
    }

    async fn build_image(
        &self,
        request: BuildRequest,
        log: LogSink,
    ) -> Result<ImageHandle, EngineError> {
        info!(
            "Building image {} from context: {:?}",
            request.tag, request.context_path
        );

        let tar_context = Self::create_tar_context(&request.context_path)?;

        let build_options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: Some(request.tag.clone()),
            rm: request.remove_intermediate,
            forcerm: request.remove_intermediate,
            pull: request.pull.then(|| "true".to_string()),
            ..Default::default()
        };

        let build_stream =
            self.docker
                .build_image(build_options, None, Some(body_full(tar_context)));
        Self::follow_build(build_stream, &log).await?;

        self.resolve_image(&request.tag).await
    }
}
