//! End-to-end lifecycle through the public API with a scripted command runner

use devenv_core::{
    default_backends, AppConfig, BackendKind, CommandOutput, CommandRunner, EnvState,
    EnvironmentManager, EnvironmentRegistry, EnvironmentSpec, Error, Mount, ResourceSpec, Result,
    TemplateCatalog,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Pretends to be multipass; `lxc` is not installed
#[derive(Default)]
struct ScriptedHost {
    calls: Mutex<Vec<String>>,
    running: Mutex<Vec<(String, &'static str)>>,
}

impl ScriptedHost {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn listing(&self) -> String {
        let entries: Vec<String> = self
            .running
            .lock()
            .unwrap()
            .iter()
            .map(|(name, state)| {
                format!(
                    r#"{{"name": "{}", "state": "{}", "ipv4": [], "release": "22.04 LTS"}}"#,
                    name, state
                )
            })
            .collect();
        format!(r#"{{"list": [{}]}}"#, entries.join(","))
    }

    fn set_state(&self, name: &str, state: &'static str) {
        let mut running = self.running.lock().unwrap();
        running.retain(|(n, _)| n != name);
        running.push((name.to_string(), state));
    }
}

impl CommandRunner for ScriptedHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));
        if program != "multipass" {
            return Err(Error::CommandNotFound(program.to_string()));
        }
        match args.first().copied() {
            Some("list") => Ok(CommandOutput::ok(self.listing())),
            Some("launch") => {
                self.set_state(args[2], "Running");
                Ok(CommandOutput::ok(""))
            }
            Some("stop") => {
                self.set_state(args[1], "Stopped");
                Ok(CommandOutput::ok(""))
            }
            Some("delete") => {
                let name = args.last().copied().unwrap_or_default();
                self.running.lock().unwrap().retain(|(n, _)| n != name);
                Ok(CommandOutput::ok(""))
            }
            _ => Ok(CommandOutput::ok("")),
        }
    }

    fn spawn_detached(&self, program: &str, _args: &[&str]) -> Result<()> {
        panic!("nothing should be spawned, got {}", program);
    }

    fn locate(&self, _program: &str) -> Option<PathBuf> {
        None
    }
}

#[test]
fn test_full_lifecycle_on_multipass() {
    let host = Arc::new(ScriptedHost::default());
    let runner: Arc<dyn CommandRunner> = host.clone();
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("proj");
    std::fs::create_dir(&project).unwrap();

    let mut manager = EnvironmentManager::new(
        default_backends(&AppConfig::default(), runner.clone()),
        runner,
        TemplateCatalog::builtin(),
        EnvironmentRegistry::open(dir.path().join("environments.json")),
    );
    assert_eq!(manager.probe_backends(), vec![BackendKind::Multipass]);

    let spec = EnvironmentSpec {
        name: "dev1".to_string(),
        backend: BackendKind::Multipass,
        template_id: "python-dev".to_string(),
        resources: ResourceSpec::new(2, "2GB", "10GB"),
        mounts: vec![Mount::new(project.to_str().unwrap(), "/home/ubuntu/proj")],
    };
    let created = manager.create_environment(&spec).unwrap();
    let id = spec.id();
    assert_eq!(created.state, EnvState::Running);

    let calls = host.calls();
    assert!(calls
        .iter()
        .any(|c| c.starts_with("multipass launch --name dev1 --cpus 2 --memory 2GB --disk 10GB")));
    assert!(calls.last().unwrap().ends_with("dev1:/home/ubuntu/proj"));

    let listed = manager.refresh().to_vec();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].template_id.as_deref(), Some("python-dev"));

    assert!(matches!(
        manager.shell_into(&id, None),
        Err(Error::NoTerminalFound(_))
    ));
    assert!(matches!(
        manager.delete(&id),
        Err(Error::PreconditionFailed(_))
    ));

    manager.stop(&id).unwrap();
    manager.delete(&id).unwrap();
    assert!(host.calls().iter().any(|c| c == "multipass delete --purge dev1"));
    assert!(manager.refresh().is_empty());

    let registry = EnvironmentRegistry::open(dir.path().join("environments.json"));
    assert!(registry.get(&id).is_none());
}

#[test]
fn test_lxd_without_tool_is_unavailable() {
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedHost::default());
    let mut manager = EnvironmentManager::new(
        default_backends(&AppConfig::default(), runner.clone()),
        runner,
        TemplateCatalog::builtin(),
        EnvironmentRegistry::in_memory(),
    );
    manager.probe_backends();

    let spec = EnvironmentSpec {
        name: "c1".to_string(),
        backend: BackendKind::Lxd,
        template_id: "ubuntu-basic".to_string(),
        resources: ResourceSpec::default(),
        mounts: Vec::new(),
    };
    assert!(matches!(
        manager.create_environment(&spec),
        Err(Error::BackendUnavailable(_))
    ));
}
