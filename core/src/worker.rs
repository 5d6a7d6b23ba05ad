//! Background thread that owns the [`EnvironmentManager`]
//!
//! Backend calls block for seconds to minutes. The GUI sends [`Request`]s and
//! polls [`Event`]s; requests are handled one at a time, in order.

use crate::{
    BackendKind, CreateStage, Environment, EnvironmentDetails, EnvironmentId,
    EnvironmentManager, EnvironmentSpec, Result, TemplateCatalog,
};
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug)]
pub enum Request {
    Probe,
    Refresh,
    Create(EnvironmentSpec),
    Start(EnvironmentId),
    Stop(EnvironmentId),
    Delete(EnvironmentId),
    Shell {
        id: EnvironmentId,
        terminal: Option<String>,
    },
    Details(EnvironmentId),
    SetCatalog(TemplateCatalog),
    Shutdown,
}

/// User-triggered operation reported by [`Event::Finished`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Start,
    Stop,
    Delete,
    Shell,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Delete => "delete",
            Operation::Shell => "open shell in",
        })
    }
}

#[derive(Debug)]
pub enum Event {
    BackendsProbed(Vec<BackendKind>),
    Environments(Vec<Environment>),
    Progress {
        id: EnvironmentId,
        stage: CreateStage,
    },
    Finished {
        op: Operation,
        id: EnvironmentId,
        result: Result<()>,
    },
    Details {
        id: EnvironmentId,
        result: Result<EnvironmentDetails>,
    },
}

type Notify = Box<dyn Fn() + Send>;

/// Handle held by the GUI; dropping it asks the thread to stop
pub struct Worker {
    requests: Sender<Request>,
    events: Receiver<Event>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Move `manager` onto a new thread; `notify` runs after every event
    pub fn spawn<F>(manager: EnvironmentManager, notify: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (requests, request_rx) = channel();
        let (event_tx, events) = channel();
        let notify: Notify = Box::new(notify);

        let handle = std::thread::Builder::new()
            .name("devenv-worker".to_string())
            .spawn(move || {
                let mut state = WorkerState {
                    manager,
                    events: event_tx,
                    notify,
                };
                while let Ok(request) = request_rx.recv() {
                    if matches!(request, Request::Shutdown) {
                        break;
                    }
                    state.handle(request);
                }
                log::debug!("Worker thread exiting");
            })
            .map_err(|e| log::error!("Could not start worker thread: {}", e))
            .ok();

        Self {
            requests,
            events,
            handle,
        }
    }

    /// Queue a request; false once the worker has stopped
    pub fn send(&self, request: Request) -> bool {
        self.requests.send(request).is_ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop after the request in progress and wait for the thread
    pub fn shutdown(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    /// Asks the thread to stop but never waits for it: a create can run for
    /// minutes and must not hold up closing the window
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::info!("Leaving the worker to finish its current operation");
            }
        }
    }
}

struct WorkerState {
    manager: EnvironmentManager,
    events: Sender<Event>,
    notify: Notify,
}

impl WorkerState {
    fn emit(&self, event: Event) {
        if self.events.send(event).is_ok() {
            (self.notify)();
        }
    }

    fn snapshot(&self) {
        self.emit(Event::Environments(self.manager.environments().to_vec()));
    }

    fn finished(&self, op: Operation, id: EnvironmentId, result: Result<()>) {
        self.emit(Event::Finished { op, id, result });
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Probe => {
                let available = self.manager.probe_backends();
                self.emit(Event::BackendsProbed(available));
            }
            Request::Refresh => {
                self.manager.refresh();
                self.snapshot();
            }
            Request::Create(spec) => {
                let id = spec.id();
                let events = self.events.clone();
                let notify = &self.notify;
                let result = self
                    .manager
                    .create_environment_with_progress(&spec, &mut |stage| {
                        let progress = Event::Progress {
                            id: id.clone(),
                            stage,
                        };
                        if events.send(progress).is_ok() {
                            notify();
                        }
                    })
                    .map(|_| ());
                self.snapshot();
                self.finished(Operation::Create, id, result);
            }
            Request::Start(id) => {
                let result = self.manager.start(&id);
                self.snapshot();
                self.finished(Operation::Start, id, result);
            }
            Request::Stop(id) => {
                let result = self.manager.stop(&id);
                self.snapshot();
                self.finished(Operation::Stop, id, result);
            }
            Request::Delete(id) => {
                let result = self.manager.delete(&id);
                self.snapshot();
                self.finished(Operation::Delete, id, result);
            }
            Request::Shell { id, terminal } => {
                let result = self.manager.shell_into(&id, terminal.as_deref());
                self.finished(Operation::Shell, id, result);
            }
            Request::Details(id) => {
                let result = self.manager.details(&id);
                self.emit(Event::Details { id, result });
            }
            Request::SetCatalog(catalog) => {
                log::debug!("Worker received a catalog of {} templates", catalog.len());
                self.manager.set_catalog(catalog);
            }
            Request::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_backends, CommandOutput, CommandRunner, FakeRunner};
    use crate::{AppConfig, EnvironmentRegistry, Error, Mount, ResourceSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    const LIST_JSON: &str = r#"{"list": [
        {"name": "dev1", "state": "Running", "ipv4": ["10.0.0.5"], "release": "22.04 LTS"}
    ]}"#;

    fn spawn_worker(runner: &FakeRunner) -> (Worker, Arc<AtomicUsize>) {
        let manager = EnvironmentManager::new(
            default_backends(&AppConfig::default(), Arc::new(runner.clone())),
            Arc::new(runner.clone()),
            TemplateCatalog::builtin(),
            EnvironmentRegistry::in_memory(),
        );
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let worker = Worker::spawn(manager, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (worker, notified)
    }

    fn next(worker: &Worker) -> Event {
        worker
            .recv_timeout(Duration::from_secs(5))
            .expect("worker produced no event")
    }

    #[test]
    fn test_create_reports_progress_then_finished() {
        let runner = FakeRunner::new();
        let (mut worker, notified) = spawn_worker(&runner);
        let dir = tempfile::tempdir().unwrap();

        let spec = EnvironmentSpec {
            name: "dev1".to_string(),
            backend: BackendKind::Multipass,
            template_id: "rust-dev".to_string(),
            resources: ResourceSpec::default(),
            mounts: vec![Mount::new(dir.path().to_str().unwrap(), "/home/ubuntu/proj")],
        };
        assert!(worker.send(Request::Create(spec)));

        let mut stages = Vec::new();
        let finished = loop {
            match next(&worker) {
                Event::Progress { id, stage } => {
                    assert_eq!(id.name, "dev1");
                    stages.push(stage);
                }
                Event::Environments(list) => {
                    assert_eq!(list.len(), 1);
                    assert_eq!(list[0].name, "dev1");
                }
                Event::Finished { op, id, result } => break (op, id, result),
                other => panic!("unexpected event: {:?}", other),
            }
        };

        assert_eq!(stages.first(), Some(&CreateStage::Requested));
        assert_eq!(stages.last(), Some(&CreateStage::Complete));
        assert!(stages.contains(&CreateStage::RunningSetup));
        assert_eq!(finished.0, Operation::Create);
        assert_eq!(finished.1, EnvironmentId::new(BackendKind::Multipass, "dev1"));
        assert!(finished.2.is_ok());

        worker.shutdown();
        assert_eq!(notified.load(Ordering::SeqCst), stages.len() + 2);
    }

    #[test]
    fn test_refresh_and_delete_precondition() {
        let runner = FakeRunner::new();
        runner.respond(&["multipass", "list"], CommandOutput::ok(LIST_JSON));
        runner.respond(&["lxc", "list"], CommandOutput::ok("[]"));
        let (worker, _) = spawn_worker(&runner);

        worker.send(Request::Refresh);
        match next(&worker) {
            Event::Environments(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].ipv4.as_deref(), Some("10.0.0.5"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        worker.send(Request::Delete(EnvironmentId::new(
            BackendKind::Multipass,
            "dev1",
        )));
        assert!(matches!(next(&worker), Event::Environments(_)));
        match next(&worker) {
            Event::Finished { op, result, .. } => {
                assert_eq!(op, Operation::Delete);
                assert!(matches!(result, Err(Error::PreconditionFailed(_))));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!runner.call_lines().iter().any(|c| c.contains("delete")));
    }

    #[test]
    fn test_probe_and_shutdown() {
        let runner = FakeRunner::new();
        runner.remove("lxc");
        let (mut worker, _) = spawn_worker(&runner);

        worker.send(Request::Probe);
        match next(&worker) {
            Event::BackendsProbed(kinds) => assert_eq!(kinds, vec![BackendKind::Multipass]),
            other => panic!("unexpected event: {:?}", other),
        }

        worker.shutdown();
        assert!(!worker.is_running());
        assert!(!worker.send(Request::Refresh));
    }

    /// Runner whose commands block until the test opens the gate
    struct GatedRunner {
        gate: Mutex<Receiver<()>>,
    }

    impl CommandRunner for GatedRunner {
        fn run(&self, _: &str, _: &[&str]) -> Result<CommandOutput> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(CommandOutput::ok(""))
        }

        fn spawn_detached(&self, _: &str, _: &[&str]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drop_does_not_wait_for_running_create() {
        let (open_gate, gate) = channel();
        let runner: Arc<dyn CommandRunner> = Arc::new(GatedRunner {
            gate: Mutex::new(gate),
        });
        let manager = EnvironmentManager::new(
            default_backends(&AppConfig::default(), runner.clone()),
            runner,
            TemplateCatalog::builtin(),
            EnvironmentRegistry::in_memory(),
        );
        let worker = Worker::spawn(manager, || {});

        let spec = EnvironmentSpec {
            name: "dev1".to_string(),
            backend: BackendKind::Multipass,
            template_id: "ubuntu-basic".to_string(),
            resources: ResourceSpec::default(),
            mounts: Vec::new(),
        };
        worker.send(Request::Create(spec));
        loop {
            if let Event::Progress {
                stage: CreateStage::BackendCreating,
                ..
            } = next(&worker)
            {
                break;
            }
        }

        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_secs(1));

        // Let the detached thread run to completion
        drop(open_gate);
    }
}
