//! LXD system containers via the `lxc` CLI

use super::{check_host_path, probe, run_checked, run_tool, Backend, CommandOutput, CommandRunner, READY_SCRIPT};
use crate::{
    BackendKind, EnvState, EnvironmentDetails, Error, ListedEnvironment, Mount, ResourceSpec,
    Result, Template,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

const KIND: BackendKind = BackendKind::Lxd;

/// Image remote used when a template names a bare release
const DEFAULT_REMOTE: &str = "ubuntu";

/// Keeps device names short; the digest suffix keeps them distinct
const MAX_SLUG_LEN: usize = 40;

/// Adapter for LXD operations via CLI
#[derive(Clone)]
pub struct LxdAdapter {
    runner: Arc<dyn CommandRunner>,
    storage_pool: Option<String>,
    network: Option<String>,
}

impl LxdAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            storage_pool: None,
            network: None,
        }
    }

    pub fn with_storage_pool(mut self, pool: Option<String>) -> Self {
        self.storage_pool = pool;
        self
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        run_checked(self.runner.as_ref(), KIND, args)
    }

    /// Build `lxc launch` arguments
    pub fn build_launch_args(
        &self,
        name: &str,
        template: &Template,
        resources: &ResourceSpec,
    ) -> Vec<String> {
        let mut args = vec![
            "launch".to_string(),
            image_ref(&template.base_image),
            name.to_string(),
            "-c".to_string(),
            format!("limits.cpu={}", resources.cpus),
            "-c".to_string(),
            format!("limits.memory={}", lxd_size(&resources.memory)),
            "-d".to_string(),
            format!("root,size={}", lxd_size(&resources.disk)),
        ];
        if let Some(pool) = &self.storage_pool {
            args.push("-s".to_string());
            args.push(pool.clone());
        }
        if let Some(network) = &self.network {
            args.push("-n".to_string());
            args.push(network.clone());
        }
        args
    }
}

/// "22.04" -> "ubuntu:22.04"; explicit remotes are kept
fn image_ref(base_image: &str) -> String {
    if base_image.contains(':') {
        base_image.to_string()
    } else {
        format!("{}:{}", DEFAULT_REMOTE, base_image)
    }
}

/// LXD wants byte suffixes: "2048M" -> "2048MiB", "2G" -> "2GiB"
fn lxd_size(size: &str) -> String {
    let size = size.trim();
    match size.chars().last() {
        Some('K' | 'M' | 'G' | 'T') => format!("{}iB", size),
        Some('i') => format!("{}B", size),
        _ => size.to_string(),
    }
}

/// Disk device name for a mount: a readable slug of the guest path plus a
/// digest, so "/a/b" and "/a-b" get different devices
pub(crate) fn mount_device_name(guest_path: &str) -> String {
    let slug: String = guest_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let mut slug = slug
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        slug = "root".to_string();
    }
    slug.truncate(MAX_SLUG_LEN);

    let digest = Sha256::digest(guest_path.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("mount-{}-{}", slug.trim_end_matches('-'), suffix)
}

/// Parse `lxc list --format json`
pub(crate) fn parse_list(stdout: &str) -> Result<Vec<ListedEnvironment>> {
    let doc: Value = serde_json::from_str(stdout).map_err(|e| {
        Error::backend("lxc list --format json", format!("unparseable output: {}", e))
    })?;
    let entries = doc.as_array().ok_or_else(|| {
        Error::backend("lxc list --format json", "expected a JSON array")
    })?;

    let mut listed = Vec::new();
    for entry in entries {
        let (Some(name), Some(status)) = (
            entry.get("name").and_then(Value::as_str),
            entry.get("status").and_then(Value::as_str),
        ) else {
            log::debug!("Skipping unparseable lxc entry");
            continue;
        };
        listed.push(ListedEnvironment {
            name: name.to_string(),
            state: EnvState::from_lxd_status(status),
            ipv4: first_ipv4(entry),
        });
    }
    Ok(listed)
}

fn first_ipv4(entry: &Value) -> Option<String> {
    let networks = entry
        .get("state")
        .and_then(|s| s.get("network"))
        .and_then(Value::as_object)?;

    networks
        .iter()
        .filter(|(iface, _)| iface.as_str() != "lo")
        .filter_map(|(_, data)| data.get("addresses").and_then(Value::as_array))
        .flatten()
        .find(|addr| addr.get("family").and_then(Value::as_str) == Some("inet"))
        .and_then(|addr| addr.get("address").and_then(Value::as_str))
        .map(str::to_string)
}

/// Disk devices with a host source, from `lxc query /1.0/instances/<name>`
fn parse_mounts(instance: &Value) -> Vec<Mount> {
    let Some(devices) = instance.get("devices").and_then(Value::as_object) else {
        return Vec::new();
    };
    devices
        .values()
        .filter(|d| d.get("type").and_then(Value::as_str) == Some("disk"))
        .filter_map(|d| {
            let host = d.get("source").and_then(Value::as_str)?;
            let guest = d.get("path").and_then(Value::as_str)?;
            Some(Mount::new(host, guest))
        })
        .collect()
}

/// Top-level `Key: value` lines of `lxc info`
fn parse_info_fields(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .collect()
}

impl Backend for LxdAdapter {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_available(&self) -> bool {
        probe(self.runner.as_ref(), KIND)
    }

    fn create(&self, name: &str, template: &Template, resources: &ResourceSpec) -> Result<()> {
        let args = self.build_launch_args(name, template, resources);
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        log::info!("Launching LXD container '{}'", name);
        self.run(&args)?;

        self.run(&["exec", name, "--", "sh", "-c", READY_SCRIPT])?;
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
        self.run(&["delete", name])?;
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
        let device = mount_device_name(guest_path);
        let source = format!("source={}", host_path);
        let path = format!("path={}", guest_path);
        self.run(&[
            "config", "device", "add", name, &device, "disk", &source, &path,
        ])?;
        Ok(())
    }

    fn mounts(&self, name: &str) -> Result<Vec<Mount>> {
        let endpoint = format!("/1.0/instances/{}", name);
        let output = self.run(&["query", &endpoint])?;
        let instance: Value = serde_json::from_str(&output.stdout).map_err(|e| {
            Error::backend(format!("lxc query {}", endpoint), format!("unparseable output: {}", e))
        })?;
        Ok(parse_mounts(&instance))
    }

    fn details(&self, name: &str) -> Result<EnvironmentDetails> {
        let output = self.run(&["info", name])?;
        let mounts = self.mounts(name).unwrap_or_else(|e| {
            log::debug!("Could not read mounts for '{}': {}", name, e);
            Vec::new()
        });
        Ok(EnvironmentDetails {
            name: name.to_string(),
            fields: parse_info_fields(&output.stdout),
            mounts,
        })
    }

    fn shell_command(&self, name: &str) -> Vec<String> {
        ["lxc", "exec", name, "--", "/bin/bash"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeRunner;
    use crate::TemplateCatalog;

    const LIST_JSON: &str = r#"[
        {
            "name": "web1",
            "status": "Running",
            "state": {
                "network": {
                    "eth0": {"addresses": [
                        {"family": "inet6", "address": "fd42::1"},
                        {"family": "inet", "address": "10.158.0.23"}
                    ]},
                    "lo": {"addresses": [{"family": "inet", "address": "127.0.0.1"}]}
                }
            }
        },
        {"name": "idle", "status": "Stopped", "state": null},
        {"status": "Running"},
        {"name": "paused", "status": "Frozen", "state": {"network": {}}}
    ]"#;

    const QUERY_JSON: &str = r#"{
        "name": "web1",
        "devices": {
            "mount-home-ubuntu-proj": {
                "type": "disk",
                "source": "/home/u/proj",
                "path": "/home/ubuntu/proj"
            },
            "root": {"type": "disk", "pool": "default", "path": "/"},
            "eth1": {"type": "nic", "network": "lxdbr0"}
        }
    }"#;

    const INFO_TEXT: &str = "Name: web1
Status: RUNNING
Type: container
Architecture: x86_64
Created: 2024/05/01 10:00 UTC

Resources:
  Processes: 42
  Disk usage:
    root: 1.20GiB
";

    fn adapter(runner: &FakeRunner) -> LxdAdapter {
        LxdAdapter::new(Arc::new(runner.clone()))
    }

    #[test]
    fn test_launch_args() {
        let catalog = TemplateCatalog::builtin();
        let args = adapter(&FakeRunner::new())
            .with_storage_pool(Some("fast".to_string()))
            .with_network(Some("lxdbr0".to_string()))
            .build_launch_args(
                "web1",
                catalog.get("web-dev").unwrap(),
                &ResourceSpec::new(4, "2048M", "20G"),
            );

        assert_eq!(args[0..3], ["launch", "ubuntu:22.04", "web1"]);
        assert!(args.contains(&"limits.cpu=4".to_string()));
        assert!(args.contains(&"limits.memory=2048MiB".to_string()));
        assert!(args.contains(&"root,size=20GiB".to_string()));
        assert!(args.windows(2).any(|w| w == ["-s", "fast"]));
        assert!(args.windows(2).any(|w| w == ["-n", "lxdbr0"]));
    }

    #[test]
    fn test_size_translation() {
        assert_eq!(lxd_size("2GB"), "2GB");
        assert_eq!(lxd_size("2G"), "2GiB");
        assert_eq!(lxd_size("512Mi"), "512MiB");
        assert_eq!(lxd_size("1073741824"), "1073741824");
    }

    #[test]
    fn test_image_ref() {
        assert_eq!(image_ref("22.04"), "ubuntu:22.04");
        assert_eq!(image_ref("images:debian/12"), "images:debian/12");
    }

    #[test]
    fn test_device_names() {
        let proj = mount_device_name("/home/ubuntu/proj");
        assert!(proj.starts_with("mount-home-ubuntu-proj-"));
        assert_eq!(proj.len(), "mount-home-ubuntu-proj-".len() + 8);
        assert_eq!(proj, mount_device_name("/home/ubuntu/proj"));

        assert!(mount_device_name("/srv/my data/").starts_with("mount-srv-my-data-"));
        assert!(mount_device_name("/").starts_with("mount-root-"));

        // Same slug, different paths
        let nested = mount_device_name("/a/b");
        let dashed = mount_device_name("/a-b");
        assert!(nested.starts_with("mount-a-b-") && dashed.starts_with("mount-a-b-"));
        assert_ne!(nested, dashed);

        let long = mount_device_name(&format!("/{}", "x".repeat(200)));
        assert!(long.len() <= "mount-".len() + MAX_SLUG_LEN + 9);
    }

    #[test]
    fn test_list_parsing() {
        let listed = parse_list(LIST_JSON).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].name, "web1");
        assert_eq!(listed[0].state, EnvState::Running);
        assert_eq!(listed[0].ipv4.as_deref(), Some("10.158.0.23"));
        assert_eq!(listed[1].state, EnvState::Stopped);
        assert_eq!(listed[1].ipv4, None);
        assert_eq!(listed[2].state, EnvState::Transitioning);

        assert!(parse_list(r#"{"list": []}"#).is_err());
    }

    #[test]
    fn test_mount_translation() {
        let runner = FakeRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().to_str().unwrap();

        adapter(&runner).mount("web1", host, "/home/ubuntu/proj").unwrap();
        let source = format!("source={}", host);
        let device = mount_device_name("/home/ubuntu/proj");
        assert_eq!(
            runner.calls()[0],
            vec![
                "lxc",
                "config",
                "device",
                "add",
                "web1",
                device.as_str(),
                "disk",
                source.as_str(),
                "path=/home/ubuntu/proj",
            ]
        );
    }

    #[test]
    fn test_mounts_and_details() {
        let runner = FakeRunner::new();
        runner
            .respond(&["lxc", "query"], CommandOutput::ok(QUERY_JSON))
            .respond(&["lxc", "info"], CommandOutput::ok(INFO_TEXT));
        let adapter = adapter(&runner);

        assert_eq!(
            adapter.mounts("web1").unwrap(),
            vec![Mount::new("/home/u/proj", "/home/ubuntu/proj")]
        );

        let details = adapter.details("web1").unwrap();
        assert_eq!(details.fields["Status"], "RUNNING");
        assert_eq!(details.fields["Type"], "container");
        assert!(!details.fields.contains_key("Processes"));
        assert!(!details.fields.contains_key("Resources"));
        assert_eq!(details.mounts.len(), 1);
    }

    #[test]
    fn test_create_and_lifecycle_commands() {
        let runner = FakeRunner::new();
        let catalog = TemplateCatalog::builtin();
        let adapter = adapter(&runner);
        adapter
            .create("web1", catalog.get("ubuntu-basic").unwrap(), &ResourceSpec::default())
            .unwrap();
        adapter.stop("web1").unwrap();
        adapter.start("web1").unwrap();
        adapter.delete("web1").unwrap();

        let calls = runner.call_lines();
        assert!(calls[0].starts_with("lxc launch ubuntu:22.04 web1"));
        assert!(calls[1].starts_with("lxc exec web1 -- sh -c"));
        assert_eq!(calls[2..], ["lxc stop web1", "lxc start web1", "lxc delete web1"]);
    }

    #[test]
    fn test_unavailable() {
        let runner = FakeRunner::new();
        runner.remove("lxc");
        let adapter = adapter(&runner);
        assert!(!adapter.is_available());
        assert!(matches!(adapter.list(), Err(Error::BackendUnavailable(_))));
    }
}
