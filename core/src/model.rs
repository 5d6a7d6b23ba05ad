//! Domain model types for DevEnv Manager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Virtualization technology an environment runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Multipass,
    Lxd,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Multipass, BackendKind::Lxd];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Multipass => "multipass",
            BackendKind::Lxd => "lxd",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Multipass => "Multipass (VM)",
            BackendKind::Lxd => "LXD (container)",
        }
    }

    /// Name of the CLI this backend is driven through
    pub fn program(&self) -> &'static str {
        match self {
            BackendKind::Multipass => "multipass",
            BackendKind::Lxd => "lxc",
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            BackendKind::Multipass => "sudo snap install multipass",
            BackendKind::Lxd => "sudo snap install lxd && sudo lxd init --auto",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an environment as reported by its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnvState {
    Absent,
    Stopped,
    Running,
    Transitioning,
    #[default]
    Error,
}

impl EnvState {
    /// Map a `multipass list` state string
    pub fn from_multipass_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "running" => EnvState::Running,
            "stopped" | "suspended" => EnvState::Stopped,
            "starting" | "restarting" | "delayed shutdown" | "suspending" => {
                EnvState::Transitioning
            }
            "deleted" => EnvState::Absent,
            _ => EnvState::Error,
        }
    }

    /// Map an `lxc list` status string
    pub fn from_lxd_status(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "running" => EnvState::Running,
            "stopped" => EnvState::Stopped,
            "starting" | "stopping" | "freezing" | "thawing" | "frozen" | "aborting" => {
                EnvState::Transitioning
            }
            _ => EnvState::Error,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EnvState::Absent => "Absent",
            EnvState::Stopped => "Stopped",
            EnvState::Running => "Running",
            EnvState::Transitioning => "Busy",
            EnvState::Error => "Error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, EnvState::Running)
    }

    /// States from which delete may be issued
    pub fn is_stable(&self) -> bool {
        matches!(self, EnvState::Stopped | EnvState::Error | EnvState::Absent)
    }
}

/// CPU/memory/disk sizing for a new environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpus: u32,
    /// e.g. "2GB", "2048M"
    pub memory: String,
    /// e.g. "10GB"
    pub disk: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpus: 2,
            memory: "2GB".to_string(),
            disk: "10GB".to_string(),
        }
    }
}

impl ResourceSpec {
    pub fn new(cpus: u32, memory: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            cpus,
            memory: memory.into(),
            disk: disk.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cpus == 0 {
            return Err("CPU count must be at least 1".to_string());
        }
        validate_size(&self.memory).map_err(|e| format!("Memory: {}", e))?;
        validate_size(&self.disk).map_err(|e| format!("Disk: {}", e))?;
        Ok(())
    }
}

/// A host directory shared into an environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Mount {
    pub host: String,
    pub guest: String,
}

impl Mount {
    pub fn new(host: impl Into<String>, guest: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            guest: guest.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Mount host path cannot be empty".to_string());
        }
        if self.guest.trim().is_empty() {
            return Err("Mount guest path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Names are unique per backend only, so an environment is identified by both
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvironmentId {
    pub backend: BackendKind,
    pub name: String,
}

impl EnvironmentId {
    pub fn new(backend: BackendKind, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.backend)
    }
}

/// Everything needed to create an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    pub backend: BackendKind,
    pub template_id: String,
    pub resources: ResourceSpec,
    pub mounts: Vec<Mount>,
}

impl EnvironmentSpec {
    pub fn id(&self) -> EnvironmentId {
        EnvironmentId::new(self.backend, self.name.clone())
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_env_name(&self.name)?;
        self.resources.validate()?;
        for mount in &self.mounts {
            mount.validate()?;
        }
        Ok(())
    }
}

/// A known environment (cached view of backend state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub backend: BackendKind,
    pub template_id: Option<String>,
    pub resources: Option<ResourceSpec>,
    pub mounts: Vec<Mount>,
    pub state: EnvState,
    pub ipv4: Option<String>,
}

impl Environment {
    pub fn id(&self) -> EnvironmentId {
        EnvironmentId::new(self.backend, self.name.clone())
    }

    pub fn is(&self, id: &EnvironmentId) -> bool {
        self.backend == id.backend && self.name == id.name
    }
}

/// One row of a backend listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEnvironment {
    pub name: String,
    pub state: EnvState,
    pub ipv4: Option<String>,
}

/// Detailed information about one environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentDetails {
    pub name: String,
    pub fields: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

/// Steps of environment creation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStep {
    BackendCreate,
    InstallPackages,
    RunSetup,
    Mount,
}

impl fmt::Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreateStep::BackendCreate => "creating the environment",
            CreateStep::InstallPackages => "installing packages",
            CreateStep::RunSetup => "running the setup script",
            CreateStep::Mount => "mounting directories",
        })
    }
}

/// Progress of a single create operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateStage {
    Requested,
    BackendCreating,
    InstallingPackage {
        index: usize,
        total: usize,
        package: String,
    },
    RunningSetup,
    Mounting {
        index: usize,
        total: usize,
    },
    Complete,
    Failed(CreateStep),
}

impl CreateStage {
    pub fn describe(&self) -> String {
        match self {
            CreateStage::Requested => "Queued".to_string(),
            CreateStage::BackendCreating => "Launching instance...".to_string(),
            CreateStage::InstallingPackage {
                index,
                total,
                package,
            } => format!("Installing {} ({}/{})", package, index + 1, total),
            CreateStage::RunningSetup => "Running setup script...".to_string(),
            CreateStage::Mounting { index, total } => {
                format!("Mounting directory {}/{}", index + 1, total)
            }
            CreateStage::Complete => "Complete".to_string(),
            CreateStage::Failed(step) => format!("Failed while {}", step),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CreateStage::Complete | CreateStage::Failed(_))
    }
}

fn env_name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").unwrap())
}

fn size_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[0-9]+(\.[0-9]+)?([KMGT]i?B?)?$").unwrap())
}

/// Validates an environment name against what both multipass and LXD accept
pub fn validate_env_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Environment name cannot be empty".to_string());
    }

    if !env_name_regex().is_match(name) {
        return Err(
            "Environment name must start with a letter and contain only letters, numbers, and hyphens"
                .to_string(),
        );
    }

    if name.ends_with('-') {
        return Err("Environment name cannot end with a hyphen".to_string());
    }

    if name.len() > 63 {
        return Err("Environment name must be 63 characters or less".to_string());
    }

    Ok(())
}

/// Validates a memory/disk size such as "2GB", "512M" or "10GiB"
pub fn validate_size(size: &str) -> Result<(), String> {
    if size_regex().is_match(size.trim()) {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not a valid size (expected e.g. 2GB, 512M)",
            size
        ))
    }
}
