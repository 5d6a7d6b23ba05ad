//! Environment lifecycle on top of the backend adapters
//!
//! The manager owns the adapters, the template catalog, the record store and
//! the cached environment list. Every call is blocking; the GUI reaches it
//! only through [`crate::Worker`].

use crate::backend::{Backend, CommandRunner};
use crate::registry::{EnvironmentRecord, EnvironmentRegistry};
use crate::{
    BackendKind, CreateStage, CreateStep, EnvState, Environment, EnvironmentDetails,
    EnvironmentId, EnvironmentSpec, Error, Result, Template, TemplateCatalog,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Terminal emulators tried in order when no preference is configured
pub const TERMINAL_CANDIDATES: [&str; 8] = [
    "gnome-terminal",
    "konsole",
    "xfce4-terminal",
    "alacritty",
    "kitty",
    "wezterm",
    "terminator",
    "xterm",
];

pub struct EnvironmentManager {
    backends: Vec<Box<dyn Backend>>,
    available: BTreeSet<BackendKind>,
    runner: Arc<dyn CommandRunner>,
    catalog: TemplateCatalog,
    registry: EnvironmentRegistry,
    environments: Vec<Environment>,
}

impl EnvironmentManager {
    /// All registered backends start out as available until probed
    pub fn new(
        backends: Vec<Box<dyn Backend>>,
        runner: Arc<dyn CommandRunner>,
        catalog: TemplateCatalog,
        registry: EnvironmentRegistry,
    ) -> Self {
        let available = backends.iter().map(|b| b.kind()).collect();
        Self {
            backends,
            available,
            runner,
            catalog,
            registry,
            environments: Vec::new(),
        }
    }

    /// Check which backend tools answer and remember the result
    pub fn probe_backends(&mut self) -> Vec<BackendKind> {
        self.available = self
            .backends
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.kind())
            .collect();

        if self.available.is_empty() {
            log::warn!("No backend available (neither multipass nor lxc answered)");
        } else {
            log::info!(
                "Available backends: {}",
                self.available
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        self.available_backends()
    }

    pub fn available_backends(&self) -> Vec<BackendKind> {
        self.available.iter().copied().collect()
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn environment(&self, id: &EnvironmentId) -> Option<&Environment> {
        self.environments.iter().find(|e| e.is(id))
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn set_catalog(&mut self, catalog: TemplateCatalog) {
        self.catalog = catalog;
    }

    fn backend(&self, kind: BackendKind) -> Result<&dyn Backend> {
        if !self.available.contains(&kind) {
            return Err(Error::unavailable(format!(
                "{} is not available. Install with: {}",
                kind.display_name(),
                kind.install_hint()
            )));
        }
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::unavailable(format!("{} is not configured", kind.display_name())))
    }

    pub fn create_environment(&mut self, spec: &EnvironmentSpec) -> Result<Environment> {
        self.create_environment_with_progress(spec, &mut |_| {})
    }

    /// Create, provision and mount a new environment, reporting each stage
    ///
    /// A failure at any step stops the sequence. Once the backend has created
    /// the instance, it stays there and in the cache with state `Error`. When
    /// the create call itself fails, the cache takes whatever the backend
    /// then lists under that name.
    pub fn create_environment_with_progress(
        &mut self,
        spec: &EnvironmentSpec,
        on_progress: &mut dyn FnMut(CreateStage),
    ) -> Result<Environment> {
        spec.validate().map_err(Error::validation)?;
        let id = spec.id();
        if self.environment(&id).is_some() {
            return Err(Error::AlreadyExists(id.to_string()));
        }

        let backend = self.backend(spec.backend)?;
        let template = self.catalog.get(&spec.template_id)?;
        let created_state = backend.created_state();

        log::info!("Creating environment {} from template '{}'", id, template.id);
        on_progress(CreateStage::Requested);

        let result = provision(backend, spec, template, on_progress);
        let mut environment = Environment {
            name: spec.name.clone(),
            backend: spec.backend,
            template_id: Some(spec.template_id.clone()),
            resources: Some(spec.resources.clone()),
            mounts: Vec::new(),
            state: EnvState::Error,
            ipv4: None,
        };

        match result {
            Ok(()) => {
                environment.mounts = spec.mounts.clone();
                environment.state = created_state;
                self.upsert(environment.clone());

                let record = EnvironmentRecord {
                    template_id: spec.template_id.clone(),
                    backend: spec.backend,
                    resources: spec.resources.clone(),
                    created_at: chrono::Utc::now(),
                };
                if let Err(e) = self.registry.insert(&id, record) {
                    log::warn!("Could not save record for {}: {}", id, e);
                }
                log::info!("Environment {} created", id);
                on_progress(CreateStage::Complete);
                Ok(environment)
            }
            Err(e) => {
                log::error!("Creating {} failed: {}", id, e);
                match e.failed_step() {
                    Some(CreateStep::BackendCreate) => self.reconcile(&id),
                    _ => self.upsert(environment),
                }
                if let Some(step) = e.failed_step() {
                    on_progress(CreateStage::Failed(step));
                }
                Err(e)
            }
        }
    }

    /// Re-read one environment from its backend after a failed create
    ///
    /// The name may belong to an instance this call did not make, so the
    /// listed state is cached as-is. Nothing is cached when it is not listed
    /// or the listing fails.
    fn reconcile(&mut self, id: &EnvironmentId) {
        let listed = match self.backend(id.backend).and_then(|b| b.list()) {
            Ok(listed) => listed,
            Err(e) => {
                log::warn!("Could not re-list {} after a failed create: {}", id.backend, e);
                return;
            }
        };
        let Some(row) = listed.into_iter().find(|row| row.name == id.name) else {
            return;
        };
        log::info!(
            "{} already exists and is {}",
            id,
            row.state.display_name().to_lowercase()
        );
        let record = self.registry.get(id);
        let environment = Environment {
            template_id: record.map(|r| r.template_id.clone()),
            resources: record.map(|r| r.resources.clone()),
            mounts: Vec::new(),
            state: row.state,
            ipv4: row.ipv4,
            name: row.name,
            backend: id.backend,
        };
        self.upsert(environment);
    }

    fn upsert(&mut self, environment: Environment) {
        let id = environment.id();
        self.environments.retain(|e| !e.is(&id));
        self.environments.push(environment);
        sort_environments(&mut self.environments);
    }

    /// Re-derive the cache from every available backend
    pub fn refresh(&mut self) -> &[Environment] {
        let previous: HashMap<(BackendKind, String), Environment> = self
            .environments
            .drain(..)
            .map(|e| ((e.backend, e.name.clone()), e))
            .collect();

        let mut refreshed = Vec::new();
        for backend in &self.backends {
            let kind = backend.kind();
            if !self.available.contains(&kind) {
                continue;
            }
            let listed = match backend.list() {
                Ok(listed) => listed,
                Err(e) => {
                    log::warn!("Listing {} environments failed: {}", kind, e);
                    continue;
                }
            };
            for row in listed {
                let record = self.registry.get(&EnvironmentId::new(kind, row.name.clone()));
                let mounts = previous
                    .get(&(kind, row.name.clone()))
                    .map(|e| e.mounts.clone())
                    .unwrap_or_default();
                refreshed.push(Environment {
                    template_id: record.map(|r| r.template_id.clone()),
                    resources: record.map(|r| r.resources.clone()),
                    mounts,
                    state: row.state,
                    ipv4: row.ipv4,
                    name: row.name,
                    backend: kind,
                });
            }
        }

        sort_environments(&mut refreshed);
        log::debug!("Refreshed {} environments", refreshed.len());
        self.environments = refreshed;
        &self.environments
    }

    /// Cache position of `id`, refreshing once if it is unknown
    fn locate(&mut self, id: &EnvironmentId) -> Result<usize> {
        if let Some(index) = self.environments.iter().position(|e| e.is(id)) {
            return Ok(index);
        }
        self.refresh();
        self.environments
            .iter()
            .position(|e| e.is(id))
            .ok_or_else(|| Error::NotFound(format!("environment {}", id)))
    }

    pub fn start(&mut self, id: &EnvironmentId) -> Result<()> {
        let index = self.locate(id)?;
        if self.environments[index].state == EnvState::Running {
            log::debug!("{} is already running", id);
            return Ok(());
        }
        self.backend(id.backend)?.start(&id.name)?;
        self.environments[index].state = EnvState::Running;
        log::info!("Started {}", id);
        Ok(())
    }

    pub fn stop(&mut self, id: &EnvironmentId) -> Result<()> {
        let index = self.locate(id)?;
        if self.environments[index].state == EnvState::Stopped {
            log::debug!("{} is already stopped", id);
            return Ok(());
        }
        self.backend(id.backend)?.stop(&id.name)?;
        let env = &mut self.environments[index];
        env.state = EnvState::Stopped;
        env.ipv4 = None;
        log::info!("Stopped {}", id);
        Ok(())
    }

    /// Delete a stopped (or failed) environment
    pub fn delete(&mut self, id: &EnvironmentId) -> Result<()> {
        let index = self.locate(id)?;
        let state = self.environments[index].state;
        if !state.is_stable() {
            return Err(Error::precondition(format!(
                "'{}' is {}; stop it before deleting",
                id.name,
                state.display_name().to_lowercase()
            )));
        }
        self.backend(id.backend)?.delete(&id.name)?;
        self.environments.remove(index);
        if let Err(e) = self.registry.remove(id) {
            log::warn!("Could not remove record for {}: {}", id, e);
        }
        log::info!("Deleted {}", id);
        Ok(())
    }

    pub fn details(&mut self, id: &EnvironmentId) -> Result<EnvironmentDetails> {
        let index = self.locate(id)?;
        let details = self.backend(id.backend)?.details(&id.name)?;
        self.environments[index].mounts = details.mounts.clone();
        Ok(details)
    }

    /// Terminal program to use: the preference unless "auto", then the search order
    pub fn resolve_terminal(&self, preference: Option<&str>) -> Result<String> {
        let preferred = preference
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != "auto");

        let mut tried = Vec::new();
        for candidate in preferred.into_iter().chain(TERMINAL_CANDIDATES) {
            if let Some(path) = self.runner.locate(candidate) {
                return Ok(path.to_string_lossy().into_owned());
            }
            if Some(candidate) == preferred {
                log::warn!("Configured terminal '{}' not found, searching", candidate);
            }
            tried.push(candidate);
        }
        Err(Error::NoTerminalFound(tried.join(", ")))
    }

    /// Open a terminal window with a shell inside a running environment
    pub fn shell_into(
        &mut self,
        id: &EnvironmentId,
        terminal_preference: Option<&str>,
    ) -> Result<()> {
        let terminal = self.resolve_terminal(terminal_preference)?;
        let index = self.locate(id)?;
        if !self.environments[index].state.is_running() {
            return Err(Error::precondition(format!(
                "'{}' must be running to open a shell",
                id.name
            )));
        }

        let shell = self.backend(id.backend)?.shell_command(&id.name).join(" ");
        let args = terminal_args(&terminal, &shell);
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        log::info!("Opening shell in {} with {}", id, terminal);
        self.runner.spawn_detached(&terminal, &args)
    }
}

fn sort_environments(environments: &mut [Environment]) {
    environments.sort_by(|a, b| (a.backend, &a.name).cmp(&(b.backend, &b.name)));
}

/// Steps after input validation; stops at the first failure
fn provision(
    backend: &dyn Backend,
    spec: &EnvironmentSpec,
    template: &Template,
    on_progress: &mut dyn FnMut(CreateStage),
) -> Result<()> {
    let name = spec.name.as_str();

    on_progress(CreateStage::BackendCreating);
    backend
        .create(name, template, &spec.resources)
        .map_err(|e| Error::at_step(CreateStep::BackendCreate, e))?;

    let total = template.packages.len();
    for (index, package) in template.packages.iter().enumerate() {
        on_progress(CreateStage::InstallingPackage {
            index,
            total,
            package: package.clone(),
        });
        let command = [
            "sudo",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            package.as_str(),
        ];
        guest_command(backend, name, &command)
            .map_err(|e| Error::at_step(CreateStep::InstallPackages, e))?;
    }

    on_progress(CreateStage::RunningSetup);
    guest_command(backend, name, &["sudo", "bash", "-c", &template.setup_script])
        .map_err(|e| Error::at_step(CreateStep::RunSetup, e))?;

    let total = spec.mounts.len();
    for (index, mount) in spec.mounts.iter().enumerate() {
        on_progress(CreateStage::Mounting { index, total });
        backend
            .mount(name, &mount.host, &mount.guest)
            .map_err(|e| Error::at_step(CreateStep::Mount, e))?;
    }
    Ok(())
}

/// `execute`, with a non-zero guest exit turned into an error
fn guest_command(backend: &dyn Backend, name: &str, command: &[&str]) -> Result<()> {
    let output = backend.execute(name, command)?;
    if !output.success() {
        let stderr = output.stderr.trim();
        return Err(Error::backend(
            command.join(" "),
            if stderr.is_empty() {
                format!("exited with status {}", output.exit_code)
            } else {
                stderr.to_string()
            },
        ));
    }
    Ok(())
}

/// Arguments that make `terminal` run `shell` and stay open afterwards
pub fn terminal_args(terminal: &str, shell: &str) -> Vec<String> {
    let script = format!("{}; exec bash", shell);
    let program = Path::new(terminal)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(terminal);

    let prefix: &[&str] = match program {
        "gnome-terminal" => &["--"],
        "wezterm" => &["start", "--"],
        "xfce4-terminal" | "terminator" => &["-x"],
        "kitty" => &[],
        _ => &["-e"],
    };

    prefix
        .iter()
        .copied()
        .chain(["bash", "-c", script.as_str()])
        .map(str::to_string)
        .collect()
}
