//! Multipass virtual machines via the `multipass` CLI

use super::{check_host_path, probe, run_checked, run_tool, Backend, CommandOutput, CommandRunner, READY_SCRIPT};
use crate::{
    BackendKind, EnvState, EnvironmentDetails, Error, ListedEnvironment, Mount, ResourceSpec,
    Result, Template,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const KIND: BackendKind = BackendKind::Multipass;

/// Adapter for multipass operations via CLI
#[derive(Clone)]
pub struct MultipassAdapter {
    runner: Arc<dyn CommandRunner>,
    /// Extra network for `launch --network`
    network: Option<String>,
}

impl MultipassAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            network: None,
        }
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network.filter(|n| n != "default");
        self
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        run_checked(self.runner.as_ref(), KIND, args)
    }

    /// Build `multipass launch` arguments
    pub fn build_launch_args(
        &self,
        name: &str,
        template: &Template,
        resources: &ResourceSpec,
    ) -> Vec<String> {
        let mut args = vec![
            "launch".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--cpus".to_string(),
            resources.cpus.to_string(),
            "--memory".to_string(),
            resources.memory.clone(),
            "--disk".to_string(),
            resources.disk.clone(),
        ];
        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        args.push(template.base_image.clone());
        args
    }

    fn info(&self, name: &str) -> Result<Value> {
        let output = self.run(&["info", name, "--format", "json"])?;
        let doc: Value = serde_json::from_str(&output.stdout).map_err(|e| {
            Error::backend(format!("multipass info {}", name), format!("unparseable output: {}", e))
        })?;
        doc.get("info")
            .and_then(|info| info.get(name))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No multipass info for '{}'", name)))
    }
}

/// Parse `multipass list --format json`
pub(crate) fn parse_list(stdout: &str) -> Result<Vec<ListedEnvironment>> {
    let doc: Value = serde_json::from_str(stdout).map_err(|e| {
        Error::backend("multipass list --format json", format!("unparseable output: {}", e))
    })?;

    let entries = doc
        .get("list")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut listed = Vec::new();
    for entry in &entries {
        let (Some(name), Some(state)) = (
            entry.get("name").and_then(Value::as_str),
            entry.get("state").and_then(Value::as_str),
        ) else {
            log::debug!("Skipping unparseable multipass entry: {}", entry);
            continue;
        };
        listed.push(ListedEnvironment {
            name: name.to_string(),
            state: EnvState::from_multipass_state(state),
            ipv4: first_ipv4(entry),
        });
    }
    Ok(listed)
}

fn first_ipv4(entry: &Value) -> Option<String> {
    entry
        .get("ipv4")
        .and_then(Value::as_array)
        .and_then(|addrs| addrs.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_mounts(info: &Value) -> Vec<Mount> {
    info.get("mounts")
        .and_then(Value::as_object)
        .map(|mounts| {
            mounts
                .iter()
                .map(|(guest, data)| Mount {
                    host: data
                        .get("source_path")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string(),
                    guest: guest.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// multipass reports sizes as numbers or numeric strings
fn as_bytes(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn format_usage(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let used = value.get("used").and_then(as_bytes)?;
    let total = value.get("total").and_then(as_bytes)?;
    Some(format!("{} of {}", human_bytes(used), human_bytes(total)))
}

fn human_bytes(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1}GiB", b / GIB)
    } else {
        format!("{:.1}MiB", b / MIB)
    }
}

fn parse_details(name: &str, info: &Value) -> EnvironmentDetails {
    let mut fields = BTreeMap::new();
    let text = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);

    if let Some(state) = text("state") {
        fields.insert("State".to_string(), state);
    }
    if let Some(ip) = first_ipv4(info) {
        fields.insert("IPv4".to_string(), ip);
    }
    if let Some(release) = text("release") {
        fields.insert("Release".to_string(), release);
    }
    if let Some(image) = text("image_release") {
        fields.insert("Image".to_string(), image);
    }
    if let Some(cpus) = info.get("cpu_count").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }) {
        fields.insert("CPUs".to_string(), cpus);
    }
    if let Some(load) = info.get("load").and_then(Value::as_array) {
        let load: Vec<String> = load.iter().map(|l| l.to_string()).collect();
        fields.insert("Load".to_string(), load.join(" "));
    }
    if let Some(memory) = format_usage(info.get("memory")) {
        fields.insert("Memory".to_string(), memory);
    }
    if let Some(disk) = info
        .get("disks")
        .and_then(Value::as_object)
        .and_then(|disks| disks.values().next())
        .and_then(|disk| format_usage(Some(disk)))
    {
        fields.insert("Disk".to_string(), disk);
    }

    EnvironmentDetails {
        name: name.to_string(),
        fields,
        mounts: parse_mounts(info),
    }
}

impl Backend for MultipassAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_available(&self) -> bool {
        probe(self.runner.as_ref(), KIND)
    }

    fn create(&self, name: &str, template: &Template, resources: &ResourceSpec) -> Result<()> {
        let args = self.build_launch_args(name, template, resources);
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        log::info!("Launching multipass instance '{}'", name);
        self.run(&args)?;

        self.run(&["exec", name, "--", "sudo", "bash", "-c", READY_SCRIPT])?;
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.run(&["start", name])?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.run(&["stop", name])?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.run(&["delete", "--purge", name])?;
        Ok(())
    }

    fn execute(&self, name: &str, command: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["exec", name, "--"];
        args.extend_from_slice(command);
        run_tool(self.runner.as_ref(), KIND, &args)
    }

    fn list(&self) -> Result<Vec<ListedEnvironment>> {
        let output = self.run(&["list", "--format", "json"])?;
        parse_list(&output.stdout)
    }

    fn mount(&self, name: &str, host_path: &str, guest_path: &str) -> Result<()> {
        check_host_path(KIND, host_path)?;
        let target = format!("{}:{}", name, guest_path);
        self.run(&["mount", host_path, &target])?;
        Ok(())
    }

    fn mounts(&self, name: &str) -> Result<Vec<Mount>> {
        Ok(parse_mounts(&self.info(name)?))
    }

    fn details(&self, name: &str) -> Result<EnvironmentDetails> {
        Ok(parse_details(name, &self.info(name)?))
    }

    fn shell_command(&self, name: &str) -> Vec<String> {
        vec!["multipass".to_string(), "shell".to_string(), name.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeRunner;
    use crate::TemplateCatalog;

    const LIST_JSON: &str = r#"{
        "list": [
            {"ipv4": ["10.36.12.5"], "name": "dev1", "release": "22.04 LTS", "state": "Running"},
            {"ipv4": [], "name": "old", "release": "20.04 LTS", "state": "Stopped"},
            {"name": "broken"},
            {"ipv4": [], "name": "booting", "release": "", "state": "Starting"}
        ]
    }"#;

    const INFO_JSON: &str = r#"{
        "errors": [],
        "info": {
            "dev1": {
                "cpu_count": "2",
                "disks": {"sda1": {"total": "10213466112", "used": "2147483648"}},
                "image_release": "22.04 LTS",
                "ipv4": ["10.36.12.5"],
                "load": [0.1, 0.05, 0],
                "memory": {"total": 2062614528, "used": 268435456},
                "mounts": {
                    "/home/ubuntu/proj": {"source_path": "/home/u/proj"}
                },
                "release": "Ubuntu 22.04.4 LTS",
                "state": "Running"
            }
        }
    }"#;

    fn adapter(runner: &FakeRunner) -> MultipassAdapter {
        MultipassAdapter::new(Arc::new(runner.clone()))
    }

    #[test]
    fn test_launch_args() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.get("python-dev").unwrap();
        let resources = ResourceSpec::new(2, "2GB", "10GB");

        let args = adapter(&FakeRunner::new()).build_launch_args("dev1", template, &resources);
        assert_eq!(
            args,
            vec![
                "launch", "--name", "dev1", "--cpus", "2", "--memory", "2GB", "--disk", "10GB",
                "22.04"
            ]
        );

        let args = adapter(&FakeRunner::new())
            .with_network(Some("eth1".to_string()))
            .build_launch_args("dev1", template, &resources);
        assert!(args.windows(2).any(|w| w == ["--network", "eth1"]));
    }

    #[test]
    fn test_default_network_is_omitted() {
        let catalog = TemplateCatalog::builtin();
        let args = adapter(&FakeRunner::new())
            .with_network(Some("default".to_string()))
            .build_launch_args(
                "dev1",
                catalog.get("go-dev").unwrap(),
                &ResourceSpec::default(),
            );
        assert!(!args.contains(&"--network".to_string()));
    }

    #[test]
    fn test_create_launches_then_waits() {
        let runner = FakeRunner::new();
        let catalog = TemplateCatalog::builtin();
        adapter(&runner)
            .create("dev1", catalog.get("rust-dev").unwrap(), &ResourceSpec::default())
            .unwrap();

        let calls = runner.call_lines();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("multipass launch --name dev1"));
        assert!(calls[1].starts_with("multipass exec dev1 -- sudo bash -c cloud-init"));
    }

    #[test]
    fn test_create_failure_carries_stderr() {
        let runner = FakeRunner::new();
        runner.respond(
            &["multipass", "launch"],
            CommandOutput::failed(1, "launch failed: instance name already in use"),
        );
        let catalog = TemplateCatalog::builtin();
        let err = adapter(&runner)
            .create("dev1", catalog.get("rust-dev").unwrap(), &ResourceSpec::default())
            .unwrap_err();
        match err {
            Error::Backend { stderr, .. } => assert!(stderr.contains("already in use")),
            other => panic!("unexpected error: {:?}", other),
        }
        // No readiness wait after a failed launch
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_list_skips_unparseable_entries() {
        let listed = parse_list(LIST_JSON).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].name, "dev1");
        assert_eq!(listed[0].state, EnvState::Running);
        assert_eq!(listed[0].ipv4.as_deref(), Some("10.36.12.5"));
        assert_eq!(listed[1].state, EnvState::Stopped);
        assert_eq!(listed[1].ipv4, None);
        assert_eq!(listed[2].state, EnvState::Transitioning);
    }

    #[test]
    fn test_list_rejects_garbage() {
        assert!(matches!(parse_list("not json"), Err(Error::Backend { .. })));
        assert!(parse_list(r#"{"list": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_execute_returns_guest_exit_code() {
        let runner = FakeRunner::new();
        runner.respond(
            &["multipass", "exec", "dev1", "--", "false"],
            CommandOutput::failed(1, ""),
        );
        let output = adapter(&runner).execute("dev1", &["false"]).unwrap();
        assert_eq!(output.exit_code, 1);
    }

    #[test]
    fn test_mount_translation() {
        let runner = FakeRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().to_str().unwrap();

        adapter(&runner)
            .mount("dev1", host, "/home/ubuntu/proj")
            .unwrap();
        assert_eq!(
            runner.calls()[0],
            vec!["multipass", "mount", host, "dev1:/home/ubuntu/proj"]
        );
    }

    #[test]
    fn test_mount_missing_host_path() {
        let runner = FakeRunner::new();
        let err = adapter(&runner)
            .mount("dev1", "/no/such/dir", "/home/ubuntu/proj")
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_info_parsing() {
        let runner = FakeRunner::new();
        runner.respond(&["multipass", "info"], CommandOutput::ok(INFO_JSON));
        let adapter = adapter(&runner);

        let mounts = adapter.mounts("dev1").unwrap();
        assert_eq!(mounts, vec![Mount::new("/home/u/proj", "/home/ubuntu/proj")]);

        let details = adapter.details("dev1").unwrap();
        assert_eq!(details.fields["State"], "Running");
        assert_eq!(details.fields["CPUs"], "2");
        assert_eq!(details.fields["Disk"], "2.0GiB of 9.5GiB");
        assert_eq!(details.fields["Memory"], "256.0MiB of 1.9GiB");
    }

    #[test]
    fn test_shell_command() {
        assert_eq!(
            adapter(&FakeRunner::new()).shell_command("dev1"),
            vec!["multipass", "shell", "dev1"]
        );
    }
}
