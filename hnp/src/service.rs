//! Orchestration for the vulnerable service container.
//!
//! The container-id marker file is the only record that a service is running:
//! it is written after `docker run` succeeds and removed after `docker stop`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::error::RoundError;
use crate::io::docker::ServiceRuntime;
use crate::workspace::Workspace;

/// Outcome of `hnp --stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { container_id: String },
    NotRunning,
}

/// Id of the running service container, if the marker says one is running.
pub fn running_container(marker: &Path) -> Result<Option<String>> {
    if !marker.exists() {
        return Ok(None);
    }
    let id = fs::read_to_string(marker)
        .with_context(|| format!("read container marker {}", marker.display()))?
        .trim()
        .to_string();
    if id.is_empty() {
        warn!(marker = %marker.display(), "empty container marker");
        return Ok(None);
    }
    Ok(Some(id))
}

/// Fail with a precondition error if a service container is already running.
pub fn ensure_not_running(workspace: &Workspace) -> Result<()> {
    if let Some(id) = running_container(&workspace.paths.container_id_path)? {
        debug!(container_id = %id, "service already running");
        return Err(RoundError::ServiceRunning.into());
    }
    Ok(())
}

/// Build the image and start the service, recording the container id.
///
/// Build and run failures are fatal and leave no marker behind.
pub fn launch_service<R: ServiceRuntime>(workspace: &Workspace, runtime: &R) -> Result<String> {
    ensure_not_running(workspace)?;
    let service = &workspace.settings.service;
    runtime.build_image(&service.image, &workspace.paths.build_context)?;
    let container_id = runtime.run_container(&service.image, &service.ports)?;
    write_marker(&workspace.paths.container_id_path, &container_id)?;
    info!(container_id = %container_id, "service started");
    Ok(container_id)
}

/// Stop the running service, if any, and clear its marker.
pub fn stop_service<R: ServiceRuntime>(workspace: &Workspace, runtime: &R) -> Result<StopOutcome> {
    let marker = &workspace.paths.container_id_path;
    let Some(container_id) = running_container(marker)? else {
        if marker.exists() {
            remove_marker(marker)?;
        }
        return Ok(StopOutcome::NotRunning);
    };
    runtime.stop_container(&container_id)?;
    remove_marker(marker)?;
    info!(container_id = %container_id, "service stopped");
    Ok(StopOutcome::Stopped { container_id })
}

fn write_marker(path: &Path, container_id: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, container_id)
        .with_context(|| format!("write container marker {}", path.display()))
}

fn remove_marker(path: &Path) -> Result<()> {
    fs::remove_file(path).with_context(|| format!("remove container marker {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRuntime, TestTable};

    #[test]
    fn launch_builds_runs_and_records_id() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let runtime = FakeRuntime::default();

        let id = launch_service(&ws, &runtime).expect("launch");
        assert_eq!(id, "c0ffee01");
        assert_eq!(
            runtime.calls(),
            vec!["build hnp-service", "run hnp-service 8000:8000"]
        );
        assert_eq!(
            running_container(&ws.paths.container_id_path).expect("marker"),
            Some("c0ffee01".to_string())
        );
    }

    #[test]
    fn second_launch_is_refused_before_building() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let runtime = FakeRuntime::default();
        launch_service(&ws, &runtime).expect("launch");

        let err = launch_service(&ws, &runtime).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RoundError>(),
            Some(&RoundError::ServiceRunning)
        );
        assert_eq!(runtime.calls().len(), 2);
    }

    #[test]
    fn failed_build_is_fatal_and_leaves_no_marker() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let runtime = FakeRuntime::failing("build");

        let err = launch_service(&ws, &runtime).unwrap_err();
        assert!(err.downcast_ref::<RoundError>().is_none());
        assert!(!ws.paths.container_id_path.exists());
        assert_eq!(runtime.calls(), vec!["build hnp-service"]);
    }

    #[test]
    fn stop_clears_marker() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let runtime = FakeRuntime::default();
        launch_service(&ws, &runtime).expect("launch");

        let outcome = stop_service(&ws, &runtime).expect("stop");
        assert_eq!(
            outcome,
            StopOutcome::Stopped {
                container_id: "c0ffee01".to_string()
            }
        );
        assert!(!ws.paths.container_id_path.exists());
        assert_eq!(stop_service(&ws, &runtime).expect("stop"), StopOutcome::NotRunning);
    }

    #[test]
    fn failed_stop_keeps_marker() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        launch_service(&ws, &FakeRuntime::default()).expect("launch");

        let err = stop_service(&ws, &FakeRuntime::failing("stop")).unwrap_err();
        assert!(err.downcast_ref::<RoundError>().is_none());
        assert!(ws.paths.container_id_path.exists());
    }
}
