use crate::error::{BuildError, BuildResult};
use crate::image_ref::ImageRef;
use crate::plan::exec_form;
use crate::store::{LayerOp, LayerStore};
use async_trait::async_trait;
use bollard::container::{
    Config, LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CommitContainerOptions, CreateImageOptions, TagImageOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, error, info, instrument, warn};

const LAYER_REPO: &str = "scribe-layer";
const MAX_OUTPUT_BYTES: usize = 8 * 1024;

/// Builds layers the way the classic builder does: one throwaway container
/// per step, committed into an image tagged with the step's cache key.
pub struct DockerLayerStore {
    docker: Docker,
    layer_repo: String,
}

impl DockerLayerStore {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            layer_repo: LAYER_REPO.to_string(),
        }
    }

    /// Empty `host` means the platform's default socket.
    pub fn connect(host: &str) -> BuildResult<Self> {
        let docker = if host.is_empty() {
            Docker::connect_with_socket_defaults()?
        } else {
            Docker::connect_with_socket(host, 120, bollard::API_DEFAULT_VERSION)?
        };
        Ok(Self::new(docker))
    }

    async fn image_id(&self, reference: &str) -> BuildResult<Option<String>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Config lines that put the parent's entrypoint and command back after
    /// a container was created with a shell in their place.
    async fn restore_lines(&self, parent: &str) -> BuildResult<String> {
        let image = self.docker.inspect_image(parent).await?;
        let config = image.config.unwrap_or_default();
        let entrypoint = config.entrypoint.unwrap_or_default();
        let cmd = config.cmd.unwrap_or_default();
        Ok(format!(
            "ENTRYPOINT {}\nCMD {}",
            exec_form(&entrypoint),
            exec_form(&cmd)
        ))
    }

    async fn create_container(&self, parent: &str, command: &str) -> BuildResult<String> {
        let config = Config {
            image: Some(parent.to_string()),
            entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            cmd: Some(vec![command.to_string()]),
            ..Default::default()
        };
        let response = self
            .docker
            .create_container::<String, String>(None, config)
            .await?;
        debug!("Created build container {} from {}", response.id, parent);
        Ok(response.id)
    }

    async fn remove_container(&self, container_id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            warn!("Failed to remove build container {}: {}", container_id, e);
        }
    }

    async fn run_to_completion(&self, container_id: &str) -> BuildResult<i64> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;

        let mut wait = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions<String>>);
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(BuildError::StepFailed {
                instruction: "RUN".to_string(),
                reason: format!("container {container_id} vanished before exiting"),
            }),
        }
    }

    async fn container_output(&self, container_id: &str) -> String {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_id, Some(options));

        let mut output = String::new();
        while let Some(log) = stream.next().await {
            match log {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading build container logs: {}", e);
                    break;
                }
            }
        }

        if output.len() > MAX_OUTPUT_BYTES {
            let mut cut = output.len() - MAX_OUTPUT_BYTES;
            while !output.is_char_boundary(cut) {
                cut += 1;
            }
            output = output[cut..].to_string();
        }
        output
    }

    async fn commit(&self, container_id: &str, cache_key: &str, changes: String) -> BuildResult<String> {
        let options = CommitContainerOptions {
            container: container_id.to_string(),
            repo: self.layer_repo.clone(),
            tag: cache_key.to_string(),
            changes: Some(changes),
            ..Default::default()
        };
        self.docker
            .commit_container(options, Config::<String>::default())
            .await?;

        let reference = format!("{}:{}", self.layer_repo, cache_key);
        self.image_id(&reference)
            .await?
            .ok_or_else(|| BuildError::StepFailed {
                instruction: "commit".to_string(),
                reason: format!("committed image {reference} not found"),
            })
    }

    async fn apply_in_container(
        &self,
        container_id: &str,
        parent: &str,
        op: &LayerOp,
        cache_key: &str,
    ) -> BuildResult<String> {
        let mut changes = self.restore_lines(parent).await?;

        match op {
            LayerOp::Workdir { path, archive } => {
                self.upload(container_id, "/", archive.clone()).await?;
                changes.push_str(&format!("\nWORKDIR {path}"));
            }
            LayerOp::Copy { dest, archive } => {
                self.upload(container_id, dest, archive.clone()).await?;
            }
            LayerOp::Run { .. } => {
                let exit_code = self.run_to_completion(container_id).await?;
                if exit_code != 0 {
                    let output = self.container_output(container_id).await;
                    return Err(BuildError::DependencyInstall { exit_code, output });
                }
            }
            LayerOp::Config { change } => {
                changes.push('\n');
                changes.push_str(change);
            }
        }

        self.commit(container_id, cache_key, changes).await
    }

    async fn upload(&self, container_id: &str, path: &str, archive: bytes::Bytes) -> BuildResult<()> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(container_id, Some(options), archive)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LayerStore for DockerLayerStore {
    #[instrument(skip(self))]
    async fn resolve_base(&self, image: &ImageRef) -> BuildResult<String> {
        let reference = image.pull_reference();
        let unresolvable = |reason: String| BuildError::BaseImageUnresolvable {
            image: reference.clone(),
            reason,
        };

        if let Some(id) = self.image_id(&reference).await.map_err(|e| unresolvable(e.to_string()))? {
            return Ok(id);
        }

        info!("Pulling base image: {}", reference);
        let options = CreateImageOptions {
            from_image: image.repository.clone(),
            tag: image.digest.clone().unwrap_or_else(|| image.tag.clone()),
            ..Default::default()
        };
        let mut pull = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("{}: {}", reference, status);
                    }
                }
                Err(e) => return Err(unresolvable(e.to_string())),
            }
        }

        self.image_id(&reference)
            .await
            .map_err(|e| unresolvable(e.to_string()))?
            .ok_or_else(|| unresolvable("image missing after pull".to_string()))
    }

    #[instrument(skip(self, op), fields(op = op.kind()))]
    async fn apply(&self, parent: &str, op: &LayerOp, cache_key: &str) -> BuildResult<String> {
        let command = match op {
            LayerOp::Run { command } => command.as_str(),
            _ => "true",
        };
        let container_id = self.create_container(parent, command).await?;

        let result = self
            .apply_in_container(&container_id, parent, op, cache_key)
            .await;
        self.remove_container(&container_id).await;
        result
    }

    async fn exists(&self, image_id: &str) -> BuildResult<bool> {
        Ok(self.image_id(image_id).await?.is_some())
    }

    async fn tag(&self, image_id: &str, target: &ImageRef) -> BuildResult<()> {
        let options = TagImageOptions {
            repo: target.repository.clone(),
            tag: target.tag.clone(),
        };
        self.docker.tag_image(image_id, Some(options)).await?;
        info!("Tagged {} as {}", image_id, target);
        Ok(())
    }
}
