/// Sandbox Execution Engine
///
/// Runs one untrusted program per container and reports its combined output.
///
/// **Isolation, applied to every container:**
/// - No network (`network_disabled`, `NetworkMode=none`)
/// - Memory ceiling with swap pinned to it, CPU shares, pids limit
/// - All capabilities dropped, `no-new-privileges`, non-root user
/// - Private working directory; source arrives as a tar upload, never a host mount
///
/// **Lifecycle:** ensure image -> create -> upload source -> attach -> start ->
/// race output collection against the deadline -> remove. Removal is owned by
/// `ContainerGuard` so it happens on every path, including when the request
/// future itself is dropped.
use crate::archive::{parse_user, source_archive};
use crate::config::SandboxPolicy;
use crate::deadline::{race_deadline, Raced};
use crate::languages::{LanguageConfigManager, LanguageSpec};
use crate::output::OutputBuffer;
use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use runway_common::runner::CodeRunner;
use runway_common::types::ExecutionOutput;
use runway_common::{Language, RunwayError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Pathological inputs never reach Docker
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024;

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: &Docker, container_id: String) -> Self {
        Self {
            docker: docker.clone(),
            container_id,
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Drop cannot await; removal runs detached
        let container_id = std::mem::take(&mut self.container_id);
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            match docker.remove_container(&container_id, Some(remove_options)).await {
                Ok(()) => debug!(container_id = %container_id, "Container removed"),
                Err(e) => warn!(container_id = %container_id, error = %e, "Failed to remove container"),
            }
        });
    }
}

pub struct DockerEngine {
    docker: Docker,
    languages: LanguageConfigManager,
    policy: SandboxPolicy,
    owner: (u64, u64),
}

impl DockerEngine {
    pub fn new(languages: LanguageConfigManager, policy: SandboxPolicy) -> anyhow::Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        let owner = parse_user(&policy.user)
            .with_context(|| format!("SANDBOX_USER must be numeric uid[:gid], got {}", policy.user))?;

        Ok(Self {
            docker,
            languages,
            policy,
            owner,
        })
    }

    /// Container definition for one run of `spec`
    pub fn container_config(&self, spec: &LanguageSpec) -> Config<String> {
        build_container_config(spec, &self.policy)
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<(), RunwayError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image cache hit");
            return Ok(());
        }

        warn!(image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RunwayError::ImageUnavailable(format!("{}: {}", image, e)))?;
        }

        info!(image, "Image pulled");
        Ok(())
    }

    #[instrument(skip(self, code), fields(language = %language, source_size = code.len()))]
    pub async fn run(&self, language: Language, code: &str) -> Result<ExecutionOutput, RunwayError> {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(RunwayError::Validation(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            )));
        }

        let spec = self.languages.resolve(language);
        self.ensure_image(&spec.image).await?;

        let container_name = format!("runway-{}", uuid::Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), self.container_config(&spec))
            .await
            .map_err(|e| sandbox_failure("create container", e))?;

        let container_id = container.id;
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let archive = source_archive(&spec.file_name, code, self.owner.0, self.owner.1)?;
        self.docker
            .upload_to_container(
                &container_id,
                Some(UploadToContainerOptions {
                    path: self.policy.working_dir.clone(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .map_err(|e| sandbox_failure("upload source", e))?;

        // Attach before start so no early output is lost
        let AttachContainerResults { output, .. } = self
            .docker
            .attach_container(
                &container_id,
                Some(AttachContainerOptions::<String> {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| sandbox_failure("attach", e))?;

        let start_time = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| sandbox_failure("start container", e))?;

        let buffer = OutputBuffer::new(self.policy.output_limit, self.policy.tty);
        let token = CancellationToken::new();
        let collected = race_deadline(
            self.policy.timeout,
            &token,
            self.collect(&container_id, output, buffer),
        )
        .await;

        let (buffer, exit_status) = match collected {
            Raced::Finished(done) => done,
            Raced::Cancelled => {
                let timeout_ms = self.policy.timeout.as_millis() as u64;
                warn!(container_id = %container_id, timeout_ms, "Execution timed out, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                }
                return Err(RunwayError::ExecutionTimeout(timeout_ms));
            }
        };

        let elapsed = start_time.elapsed();
        if buffer.is_truncated() {
            warn!(limit = self.policy.output_limit, "Output exceeded limit and was truncated");
        }
        let mut text = buffer.finish();
        match exit_status {
            Some(137) => text.push_str("\n[Container killed: likely OOM or exceeded memory limit]"),
            Some(139) => text.push_str("\n[Container killed: segmentation fault]"),
            _ => {}
        }

        info!(
            exit_status = ?exit_status,
            elapsed_ms = elapsed.as_millis() as u64,
            output_bytes = text.len(),
            "Execution finished"
        );

        Ok(ExecutionOutput {
            output: text,
            exit_status,
            elapsed,
        })
    }

    /// Drain the attached stream, then read the exit status
    async fn collect<S>(
        &self,
        container_id: &str,
        mut output: S,
        mut buffer: OutputBuffer,
    ) -> (OutputBuffer, Option<i64>)
    where
        S: futures_util::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
    {
        while let Some(frame) = output.next().await {
            match frame {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => buffer.push(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading container output");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        let exit_status = match wait_stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(e)) => {
                warn!(error = %e, "Failed to get container exit code");
                None
            }
            None => {
                warn!("No wait response from container");
                None
            }
        };

        (buffer, exit_status)
    }
}

#[async_trait]
impl CodeRunner for DockerEngine {
    async fn execute(&self, language: Language, code: &str) -> Result<ExecutionOutput, RunwayError> {
        self.run(language, code).await
    }
}

fn sandbox_failure(step: &str, e: bollard::errors::Error) -> RunwayError {
    RunwayError::SandboxFailure(format!("Failed to {}: {}", step, e))
}

pub fn build_container_config(spec: &LanguageSpec, policy: &SandboxPolicy) -> Config<String> {
    let memory = i64::from(spec.memory_limit_mb) * 1024 * 1024;

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            spec.command.clone(),
        ]),
        env: Some(vec!["HOME=/tmp".to_string()]),
        user: Some(policy.user.clone()),
        working_dir: Some(policy.working_dir.clone()),
        tty: Some(policy.tty),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        network_disabled: Some(true),
        host_config: Some(HostConfig {
            memory: Some(memory),
            memory_swap: Some(memory),
            cpu_shares: Some(spec.cpu_shares),
            pids_limit: Some(policy.pids_limit),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            // Removal is the guard's job; auto-remove races the exit-code read
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}
