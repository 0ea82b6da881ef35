//! Container runtime adapter for the vulnerable service.
//!
//! The [`ServiceRuntime`] trait decouples command orchestration from the
//! `docker` CLI. Tests use recording runtimes that never spawn processes.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::config::ServiceSettings;
use crate::io::process::run_command;

/// Build, run and stop the service container.
pub trait ServiceRuntime {
    /// Build `image` from `context`.
    fn build_image(&self, image: &str, context: &Path) -> Result<()>;
    /// Start a detached container of `image` publishing `ports`; returns its id.
    fn run_container(&self, image: &str, ports: &str) -> Result<String>;
    /// Stop container `id`.
    fn stop_container(&self, id: &str) -> Result<()>;
}

/// Runtime that shells out to `docker`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    workdir: PathBuf,
    settings: ServiceSettings,
}

impl DockerCli {
    pub fn new(workdir: impl Into<PathBuf>, settings: ServiceSettings) -> Self {
        Self {
            workdir: workdir.into(),
            settings,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args(args).current_dir(&self.workdir);
        cmd
    }
}

impl ServiceRuntime for DockerCli {
    #[instrument(skip_all, fields(image = %image))]
    fn build_image(&self, image: &str, context: &Path) -> Result<()> {
        info!(context = %context.display(), "building service image");
        let context = context.to_string_lossy();
        let out = run_command(
            self.command(&["build", "-t", image, context.as_ref()]),
            self.settings.build_timeout(),
            self.settings.output_limit_bytes,
        )?;
        if !out.success() {
            return Err(anyhow!("docker build failed:\n{}", out.stderr_text()));
        }
        debug!("image built");
        Ok(())
    }

    #[instrument(skip_all, fields(image = %image, ports = %ports))]
    fn run_container(&self, image: &str, ports: &str) -> Result<String> {
        let out = run_command(
            self.command(&["run", "-d", "-p", ports, image]),
            self.settings.run_timeout(),
            self.settings.output_limit_bytes,
        )?;
        if !out.success() {
            return Err(anyhow!(
                "failed to start docker container:\n{}",
                out.stderr_text()
            ));
        }
        let id = out.stdout_text();
        if id.is_empty() {
            return Err(anyhow!("docker run printed no container id"));
        }
        info!(container_id = %id, "container started");
        Ok(id)
    }

    #[instrument(skip_all, fields(container_id = %id))]
    fn stop_container(&self, id: &str) -> Result<()> {
        let out = run_command(
            self.command(&["stop", id]),
            self.settings.stop_timeout(),
            self.settings.output_limit_bytes,
        )?;
        if !out.success() {
            return Err(anyhow!(
                "failed to stop docker container:\n{}",
                out.stderr_text()
            ));
        }
        info!("container stopped");
        Ok(())
    }
}
