//! Subprocess execution behind a trait so adapters can be driven by a script in tests

use crate::{Error, Result};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Everything this crate does to the host goes through here
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Start a command without waiting for it (terminal windows)
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()>;

    /// Resolve a program name on PATH
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Runs real processes on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

fn spawn_error(program: &str, args: &[&str], e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound(program.to_string())
    } else {
        Error::backend(format!("{} {}", program, args.join(" ")), e.to_string())
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("Running: {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(program, args, e))?;

        let output = CommandOutput::from(output);
        if !output.success() {
            log::debug!(
                "{} exited with {}: {}",
                program,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()> {
        log::debug!("Spawning: {} {}", program, args.join(" "));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(program, args, e))?;
        Ok(())
    }
}

/// Scripted runner used by the adapter and manager tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        calls: Vec<Vec<String>>,
        spawned: Vec<Vec<String>>,
        responses: Vec<(Vec<String>, CommandOutput)>,
        on_path: HashSet<String>,
        missing: HashSet<String>,
    }

    /// Replies with the response whose argv prefix matches, success otherwise
    #[derive(Clone, Default)]
    pub struct FakeRunner {
        state: Arc<Mutex<State>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, prefix: &[&str], output: CommandOutput) -> &Self {
            self.state
                .lock()
                .unwrap()
                .responses
                .push((prefix.iter().map(|s| s.to_string()).collect(), output));
            self
        }

        pub fn install(&self, program: &str) -> &Self {
            self.state
                .lock()
                .unwrap()
                .on_path
                .insert(program.to_string());
            self
        }

        /// Make every invocation of `program` fail as if it were not installed
        pub fn remove(&self, program: &str) -> &Self {
            self.state
                .lock()
                .unwrap()
                .missing
                .insert(program.to_string());
            self
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn call_lines(&self) -> Vec<String> {
            self.calls().iter().map(|c| c.join(" ")).collect()
        }

        pub fn spawned(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().spawned.clone()
        }
    }

    fn argv(program: &str, args: &[&str]) -> Vec<String> {
        std::iter::once(program)
            .chain(args.iter().copied())
            .map(|s| s.to_string())
            .collect()
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            let argv = argv(program, args);
            let mut state = self.state.lock().unwrap();
            state.calls.push(argv.clone());
            if state.missing.contains(program) {
                return Err(Error::CommandNotFound(program.to_string()));
            }
            let response = state
                .responses
                .iter()
                .find(|(prefix, _)| argv.starts_with(prefix))
                .map(|(_, output)| output.clone());
            Ok(response.unwrap_or_default())
        }

        fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .spawned
                .push(argv(program, args));
            Ok(())
        }

        fn locate(&self, program: &str) -> Option<PathBuf> {
            let state = self.state.lock().unwrap();
            state
                .on_path
                .contains(program)
                .then(|| PathBuf::from("/usr/bin").join(program))
        }
    }
}
