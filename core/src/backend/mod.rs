//! Backend adapters: one per virtualization technology, one shared contract
//!
//! Each adapter translates the abstract operations below into invocations of
//! its CLI and parses the output. Output formats never leave this module.

mod lxd;
mod multipass;
mod runner;

pub use lxd::LxdAdapter;
pub use multipass::MultipassAdapter;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};

#[cfg(test)]
pub(crate) use runner::fake::FakeRunner;

use crate::{
    AppConfig, BackendKind, EnvState, EnvironmentDetails, Error, ListedEnvironment, Mount,
    ResourceSpec, Result, Template,
};
use std::path::Path;
use std::sync::Arc;

/// Operations every backend supports
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Whether the CLI is installed and answering; never fails
    fn is_available(&self) -> bool;

    /// State a freshly created environment is left in
    fn created_state(&self) -> EnvState {
        EnvState::Running
    }

    /// Launch a new environment and wait until it can be provisioned
    fn create(&self, name: &str, template: &Template, resources: &ResourceSpec) -> Result<()>;

    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str) -> Result<()>;

    fn delete(&self, name: &str) -> Result<()>;

    /// Run a command inside the environment; guest exit codes are returned, not raised
    fn execute(&self, name: &str, command: &[&str]) -> Result<CommandOutput>;

    fn list(&self) -> Result<Vec<ListedEnvironment>>;

    /// Share a host directory into the environment
    fn mount(&self, name: &str, host_path: &str, guest_path: &str) -> Result<()>;

    /// Directories currently shared into the environment
    fn mounts(&self, name: &str) -> Result<Vec<Mount>>;

    fn details(&self, name: &str) -> Result<EnvironmentDetails>;

    /// argv that opens an interactive shell in the environment
    fn shell_command(&self, name: &str) -> Vec<String>;
}

/// Build both adapters with the settings from the config
pub fn default_backends(
    config: &AppConfig,
    runner: Arc<dyn CommandRunner>,
) -> Vec<Box<dyn Backend>> {
    let multipass = MultipassAdapter::new(runner.clone())
        .with_network(non_empty(&config.multipass.network));
    let lxd = LxdAdapter::new(runner)
        .with_storage_pool(non_empty(&config.lxd.storage_pool))
        .with_network(non_empty(&config.lxd.network));
    vec![Box::new(multipass), Box::new(lxd)]
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Run a backend CLI, treating a missing binary as an unavailable backend
fn run_tool(
    runner: &dyn CommandRunner,
    kind: BackendKind,
    args: &[&str],
) -> Result<CommandOutput> {
    runner.run(kind.program(), args).map_err(|e| match e {
        Error::CommandNotFound(program) => Error::unavailable(format!(
            "{} is not installed ({}). Install with: {}",
            kind.display_name(),
            program,
            kind.install_hint()
        )),
        other => other,
    })
}

/// Like `run_tool`, but a non-zero exit becomes a backend error carrying stderr
fn run_checked(
    runner: &dyn CommandRunner,
    kind: BackendKind,
    args: &[&str],
) -> Result<CommandOutput> {
    let output = run_tool(runner, kind, args)?;
    if !output.success() {
        return Err(Error::backend(
            format!("{} {}", kind.program(), args.join(" ")),
            output.stderr.trim(),
        ));
    }
    Ok(output)
}

fn probe(runner: &dyn CommandRunner, kind: BackendKind) -> bool {
    match run_tool(runner, kind, &["version"]) {
        Ok(output) => output.success(),
        Err(e) => {
            log::debug!("{} probe failed: {}", kind, e);
            false
        }
    }
}

/// Reject host paths that do not exist before the tool gets a chance to
fn check_host_path(kind: BackendKind, host_path: &str) -> Result<()> {
    if !Path::new(host_path).exists() {
        return Err(Error::backend(
            format!("{} mount", kind.program()),
            format!("Host path does not exist: {}", host_path),
        ));
    }
    Ok(())
}

/// Command that waits for first-boot provisioning and refreshes the package index
const READY_SCRIPT: &str =
    "cloud-init status --wait >/dev/null 2>&1; DEBIAN_FRONTEND=noninteractive apt-get update -q";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backends_cover_all_kinds() {
        let runner: Arc<dyn CommandRunner> = Arc::new(FakeRunner::new());
        let backends = default_backends(&AppConfig::default(), runner);
        let kinds: Vec<BackendKind> = backends.iter().map(|b| b.kind()).collect();
        assert_eq!(kinds, BackendKind::ALL.to_vec());
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let runner = FakeRunner::new();
        runner.remove("lxc");
        let err = run_checked(&runner, BackendKind::Lxd, &["list"]).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(!probe(&runner, BackendKind::Lxd));
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let runner = FakeRunner::new();
        runner.respond(
            &["multipass", "start"],
            CommandOutput::failed(2, "instance \"dev9\" does not exist\n"),
        );
        match run_checked(&runner, BackendKind::Multipass, &["start", "dev9"]) {
            Err(Error::Backend { cmd, stderr }) => {
                assert_eq!(cmd, "multipass start dev9");
                assert_eq!(stderr, "instance \"dev9\" does not exist");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_host_path() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_str().unwrap();
        assert!(check_host_path(BackendKind::Lxd, existing).is_ok());
        assert!(matches!(
            check_host_path(BackendKind::Lxd, "/definitely/not/here"),
            Err(Error::Backend { .. })
        ));
    }
}
