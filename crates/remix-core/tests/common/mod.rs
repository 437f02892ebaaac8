//! In-memory container engine that records every call
#![allow(dead_code)]

use async_trait::async_trait;
use remix_engine::{
    BuildRequest, ContainerEngine, ContainerSpec, EngineError, ExecOutput, ImageHandle, LogSink,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Pull(String),
    Create(String),
    Upload(String),
    Start,
    Exec(Vec<String>),
    Stop,
    Remove,
    Build { tag: String, dockerfile: String },
}

#[derive(Default)]
pub struct FakeEngine {
    /// Images present locally
    pub images: Mutex<Vec<String>>,
    /// Images a pull can fetch
    pub registry: Vec<String>,
    pub probe_output: String,
    pub fail_upload: bool,
    pub fail_exec: bool,
    pub fail_remove: bool,
    /// Log lines of a failing build; `None` means the build succeeds
    pub build_failure: Option<Vec<String>>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeEngine {
    pub fn with_image(image: &str, probe_output: &str) -> Self {
        Self {
            images: Mutex::new(vec![image.to_string()]),
            probe_output: probe_output.to_string(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn resolve_image(&self, reference: &str) -> Result<ImageHandle, EngineError> {
        self.record(Call::Resolve(reference.to_string()));
        if self.images.lock().unwrap().iter().any(|i| i == reference) {
            Ok(ImageHandle::new(format!("sha256:{}", reference))
                .with_tags(vec![reference.to_string()]))
        } else {
            Err(EngineError::ImageNotFound(reference.to_string()))
        }
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        self.record(Call::Pull(reference.to_string()));
        if self.registry.iter().any(|i| i == reference) {
            self.images.lock().unwrap().push(reference.to_string());
            Ok(())
        } else {
            Err(EngineError::ImageNotFound(reference.to_string()))
        }
    }

    async fn create_container(
        &self,
        image: &ImageHandle,
        _spec: ContainerSpec,
    ) -> Result<String, EngineError> {
        self.record(Call::Create(image.id.clone()));
        Ok("probe-container".to_string())
    }

    async fn upload_archive(
        &self,
        _container_id: &str,
        path: &str,
        _archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.record(Call::Upload(path.to_string()));
        if self.fail_upload {
            return Err(EngineError::ContainerFailed("read-only filesystem".to_string()));
        }
        Ok(())
    }

    async fn start_container(&self, _container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Start);
        Ok(())
    }

    async fn exec(&self, _container_id: &str, cmd: Vec<String>) -> Result<ExecOutput, EngineError> {
        self.record(Call::Exec(cmd));
        if self.fail_exec {
            return Err(EngineError::ExecFailed("container died".to_string()));
        }
        Ok(ExecOutput {
            exit_code: Some(0),
            output: self.probe_output.clone(),
        })
    }

    async fn stop_container(&self, _container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Stop);
        Ok(())
    }

    async fn remove_container(&self, _container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Remove);
        if self.fail_remove {
            return Err(EngineError::ContainerFailed("device busy".to_string()));
        }
        Ok(())
    }

    async fn build_image(
        &self,
        request: BuildRequest,
        log: LogSink,
    ) -> Result<ImageHandle, EngineError> {
        let dockerfile = std::fs::read_to_string(request.context_path.join(&request.dockerfile))?;
        self.record(Call::Build {
            tag: request.tag.clone(),
            dockerfile,
        });

        log("Step 1/2 : FROM base");
        match &self.build_failure {
            Some(lines) => Err(EngineError::BuildFailed {
                message: "The command '/bin/sh -c apt-get update' returned a non-zero code: 100"
                    .to_string(),
                log: lines.clone(),
            }),
            None => Ok(ImageHandle::new("sha256:rebuilt").with_tags(vec![request.tag])),
        }
    }
}

/// Sink collecting every reported line
pub fn capture() -> (LogSink, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = lines.clone();
    let sink: LogSink = Arc::new(move |line: &str| {
        sink_lines.lock().unwrap().push(line.to_string());
    });
    (sink, lines)
}
