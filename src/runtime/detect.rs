//! Why Docker is unusable here, and what to do about it.
//!
//! Used by `doctor` and by the preflight of every run, so a failed ping
//! comes back with a remedy instead of a bare connection error.

use std::path::Path;

use serde::Serialize;

use crate::error::RuntimeError;

const INSTALL_DESKTOP: &str = "install Docker Desktop and make sure `docker` is on PATH";
const INSTALL_ENGINE: &str =
    "install Docker Engine from your distribution or https://docs.docker.com/engine/install/";
const START_DESKTOP: &str = "open Docker Desktop and wait for the engine to start";
const START_ENGINE: &str =
    "start the daemon (`sudo systemctl start docker`) or point DOCKER_HOST at a running one";

/// State of the local Docker installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DockerState {
    Ready,
    /// No `docker` executable on `PATH`.
    NoCli,
    /// The CLI is installed but the daemon does not answer.
    DaemonDown,
}

impl DockerState {
    pub fn describe(self) -> &'static str {
        match self {
            DockerState::Ready => "daemon reachable",
            DockerState::NoCli => "docker CLI not on PATH",
            DockerState::DaemonDown => "daemon not answering",
        }
    }
}

/// A [`DockerState`] observed on a particular OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockerDiagnosis {
    pub state: DockerState,
    /// Value of `std::env::consts::OS`.
    pub os: &'static str,
}

impl DockerDiagnosis {
    pub fn new(state: DockerState) -> Self {
        Self {
            state,
            os: std::env::consts::OS,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == DockerState::Ready
    }

    /// What the user should do next. `None` when nothing is wrong.
    pub fn remedy(&self) -> Option<&'static str> {
        let desktop = matches!(self.os, "macos" | "windows");
        let remedy = match (self.state, desktop) {
            (DockerState::Ready, _) => return None,
            (DockerState::NoCli, true) => INSTALL_DESKTOP,
            (DockerState::NoCli, false) => INSTALL_ENGINE,
            (DockerState::DaemonDown, true) => START_DESKTOP,
            (DockerState::DaemonDown, false) => START_ENGINE,
        };
        Some(remedy)
    }

    /// One line for `doctor` output.
    pub fn summary(&self) -> String {
        match self.remedy() {
            Some(remedy) => format!("{}; {}", self.state.describe(), remedy),
            None => self.state.describe().to_string(),
        }
    }
}

/// Full check: CLI on PATH and a daemon that answers.
pub async fn diagnose_docker() -> DockerDiagnosis {
    if !cli_on_path() {
        return DockerDiagnosis::new(DockerState::NoCli);
    }
    match crate::runtime::connect_docker().await {
        Ok(_) => DockerDiagnosis::new(DockerState::Ready),
        Err(e) => {
            tracing::debug!("Docker daemon unreachable: {}", e);
            DockerDiagnosis::new(DockerState::DaemonDown)
        }
    }
}

/// Explain a failed connection or ping.
///
/// The daemon is already known to be down, so only the CLI is checked.
pub fn explain_unreachable(error: &RuntimeError) -> String {
    let state = if cli_on_path() {
        DockerState::DaemonDown
    } else {
        DockerState::NoCli
    };
    with_remedy(error, DockerDiagnosis::new(state))
}

fn with_remedy(error: &RuntimeError, diagnosis: DockerDiagnosis) -> String {
    let reason = match error {
        RuntimeError::Unavailable { reason } => reason.clone(),
        other => other.to_string(),
    };
    match diagnosis.remedy() {
        Some(remedy) => format!("{} ({})", reason, remedy),
        None => reason,
    }
}

fn cli_on_path() -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    let binary = if cfg!(windows) { "docker.exe" } else { "docker" };
    std::env::split_paths(&path).any(|dir| is_file(&dir.join(binary)))
}

fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn on(os: &'static str, state: DockerState) -> DockerDiagnosis {
        DockerDiagnosis { state, os }
    }

    #[test]
    fn test_ready_has_no_remedy() {
        for os in ["linux", "macos", "windows"] {
            let diagnosis = on(os, DockerState::Ready);
            assert!(diagnosis.is_ready());
            assert_eq!(diagnosis.remedy(), None);
            assert_eq!(diagnosis.summary(), "daemon reachable");
        }
    }

    #[test]
    fn test_remedy_depends_on_os() {
        let linux = on("linux", DockerState::DaemonDown).remedy().unwrap();
        let mac = on("macos", DockerState::DaemonDown).remedy().unwrap();
        assert!(linux.contains("systemctl"));
        assert!(mac.contains("Docker Desktop"));
        assert_eq!(on("windows", DockerState::NoCli).remedy(), Some(INSTALL_DESKTOP));
        assert_eq!(on("freebsd", DockerState::NoCli).remedy(), Some(INSTALL_ENGINE));
    }

    #[test]
    fn test_unavailable_reason_gets_remedy() {
        let error = RuntimeError::Unavailable {
            reason: "connection refused".to_string(),
        };
        let text = with_remedy(&error, on("linux", DockerState::DaemonDown));
        assert!(text.starts_with("connection refused ("));
        assert!(text.contains("DOCKER_HOST"));
    }

    #[test]
    fn test_explain_unreachable_keeps_reason() {
        let error = RuntimeError::Unavailable {
            reason: "no daemon".to_string(),
        };
        assert!(explain_unreachable(&error).starts_with("no daemon ("));
    }
}
