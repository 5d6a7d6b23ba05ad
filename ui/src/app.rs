//! Main application state and logic

use devenv_core::{
    default_backends, AppConfig, BackendKind, CreateStage, Environment, EnvironmentDetails,
    EnvironmentId, EnvironmentManager, EnvironmentRegistry, EnvironmentSpec, Event, Mount, Operation, Request,
    ResourceSpec, SystemRunner, Template, TemplateCatalog, Worker,
};
use eframe::egui;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::views::{
    CreateDialog, EnvironmentsView, LogsView, SettingsView, TemplatesView, View,
};

/// How often the environment list is re-read when nothing is running
const AUTO_REFRESH: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub level: StatusLevel,
    pub message: String,
}

/// UI state restored across launches through eframe storage
#[derive(Default, Serialize, Deserialize)]
struct PersistedUi {
    view: View,
    selected: Option<EnvironmentId>,
}

/// Create dialog form
pub struct CreateDialogState {
    pub open: bool,
    pub name: String,
    pub backend: BackendKind,
    pub template_id: String,
    pub cpus: u32,
    pub memory: String,
    pub disk: String,
    pub mounts: Vec<Mount>,
    pub error: Option<String>,
}

impl Default for CreateDialogState {
    fn default() -> Self {
        let resources = ResourceSpec::default();
        Self {
            open: false,
            name: String::new(),
            backend: BackendKind::default(),
            template_id: "ubuntu-basic".to_string(),
            cpus: resources.cpus,
            memory: resources.memory,
            disk: resources.disk,
            mounts: Vec::new(),
            error: None,
        }
    }
}

/// Templates view state
#[derive(Default)]
pub struct TemplatesViewState {
    pub selected: Option<String>,
    pub show_add_dialog: bool,
    pub pending_remove: Option<String>,

    // Form fields
    pub form_id: String,
    pub form_name: String,
    pub form_description: String,
    pub form_base_image: String,
    pub form_packages: String,
    pub form_setup_script: String,
    pub form_error: Option<String>,
}

/// Settings view state, as editable text
#[derive(Default)]
pub struct SettingsViewState {
    pub default_backend: BackendKind,
    pub default_cpus: String,
    pub default_memory: String,
    pub default_disk: String,
    pub terminal_emulator: String,
    pub log_level: String,
    pub multipass_network: String,
    pub lxd_storage_pool: String,
    pub lxd_network: String,
    pub error: Option<String>,
    pub saved: bool,
}

impl SettingsViewState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_backend: config.default_backend,
            default_cpus: config.default_cpus.to_string(),
            default_memory: config.default_memory_mb.to_string(),
            default_disk: config.default_disk_gb.to_string(),
            terminal_emulator: config.terminal_emulator.clone(),
            log_level: config.log_level.clone(),
            multipass_network: config.multipass.network.clone(),
            lxd_storage_pool: config.lxd.storage_pool.clone(),
            lxd_network: config.lxd.network.clone(),
            error: None,
            saved: false,
        }
    }
}

/// Main application state
pub struct DevEnvManagerApp {
    // Configuration
    pub config: AppConfig,
    pub catalog: TemplateCatalog,
    worker: Worker,

    // Navigation
    pub current_view: View,

    // Environments
    pub available_backends: Vec<BackendKind>,
    pub environments: Vec<Environment>,
    pub selected: Option<EnvironmentId>,
    pub details: Option<EnvironmentDetails>,
    pub in_flight: HashSet<EnvironmentId>,
    pub progress: BTreeMap<EnvironmentId, CreateStage>,
    pub last_refresh: Option<Instant>,

    // Dialogs
    pub create_dialog: CreateDialogState,
    pub pending_delete: Option<EnvironmentId>,
    pub error_dialog: Option<String>,

    pub templates_view: TemplatesViewState,
    pub settings_view: SettingsViewState,

    // Logs
    pub logs: Vec<LogEntry>,
    pub max_logs: usize,

    // Status
    pub status_message: Option<(String, StatusLevel)>,
    pub prereq_error: Option<String>,
}

impl DevEnvManagerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        // Configure style
        let mut style = (*cc.egui_ctx.style()).clone();
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        style.spacing.button_padding = egui::vec2(12.0, 6.0);
        cc.egui_ctx.set_style(style);

        let persisted: PersistedUi = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();

        let catalog = TemplateCatalog::with_custom_from(&TemplateCatalog::custom_path());
        let runner = Arc::new(SystemRunner);
        let manager = EnvironmentManager::new(
            default_backends(&config, runner.clone()),
            runner,
            catalog.clone(),
            EnvironmentRegistry::open(EnvironmentRegistry::default_path()),
        );

        let ctx = cc.egui_ctx.clone();
        let worker = Worker::spawn(manager, move || ctx.request_repaint());

        let mut app = Self {
            settings_view: SettingsViewState::from_config(&config),
            config,
            catalog,
            worker,
            current_view: persisted.view,
            available_backends: Vec::new(),
            environments: Vec::new(),
            selected: persisted.selected,
            details: None,
            in_flight: HashSet::new(),
            progress: BTreeMap::new(),
            last_refresh: None,
            create_dialog: CreateDialogState::default(),
            pending_delete: None,
            error_dialog: None,
            templates_view: TemplatesViewState::default(),
            logs: Vec::new(),
            max_logs: 500,
            status_message: None,
            prereq_error: None,
        };

        app.log(
            StatusLevel::Info,
            format!("Loaded {} templates", app.catalog.len()),
        );
        app.send(Request::Probe);
        app.refresh();
        if let Some(id) = app.selected.clone() {
            app.send(Request::Details(id));
        }
        app
    }

    pub fn log(&mut self, level: StatusLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: chrono::Local::now(),
            level,
            message: message.into(),
        };
        self.logs.push(entry);
        if self.logs.len() > self.max_logs {
            self.logs.remove(0);
        }
    }

    pub fn set_status(&mut self, level: StatusLevel, message: impl Into<String>) {
        let msg = message.into();
        self.log(level, &msg);
        self.status_message = Some((msg, level));
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    /// Report an error in the status bar, the log and a dialog
    pub fn show_error(&mut self, message: impl Into<String>) {
        let msg = message.into();
        self.set_status(StatusLevel::Error, &msg);
        self.error_dialog = Some(msg);
    }

    fn send(&mut self, request: Request) {
        if !self.worker.send(request) {
            self.show_error("Background worker stopped; restart the application");
        }
    }

    pub fn refresh(&mut self) {
        self.last_refresh = Some(Instant::now());
        self.send(Request::Refresh);
    }

    pub fn is_busy(&self, id: &EnvironmentId) -> bool {
        self.in_flight.contains(id)
    }

    fn begin(&mut self, id: &EnvironmentId, request: Request) {
        if self.is_busy(id) {
            self.set_status(
                StatusLevel::Warning,
                format!("An operation on {} is already running", id),
            );
            return;
        }
        self.in_flight.insert(id.clone());
        self.send(request);
    }

    pub fn start_environment(&mut self, id: &EnvironmentId) {
        self.log(StatusLevel::Info, format!("Starting {}...", id));
        self.begin(id, Request::Start(id.clone()));
    }

    pub fn stop_environment(&mut self, id: &EnvironmentId) {
        self.log(StatusLevel::Info, format!("Stopping {}...", id));
        self.begin(id, Request::Stop(id.clone()));
    }

    pub fn delete_environment(&mut self, id: &EnvironmentId) {
        self.log(StatusLevel::Info, format!("Deleting {}...", id));
        self.begin(id, Request::Delete(id.clone()));
    }

    pub fn open_shell(&mut self, id: &EnvironmentId) {
        let terminal = self.config.terminal_preference().map(str::to_string);
        self.begin(
            id,
            Request::Shell {
                id: id.clone(),
                terminal,
            },
        );
    }

    pub fn select_environment(&mut self, id: &EnvironmentId) {
        self.selected = Some(id.clone());
        self.details = None;
        self.send(Request::Details(id.clone()));
    }

    pub fn open_create_dialog(&mut self) {
        let resources = self.config.default_resources();
        let backend = if self.available_backends.contains(&self.config.default_backend) {
            self.config.default_backend
        } else {
            self.available_backends
                .first()
                .copied()
                .unwrap_or(self.config.default_backend)
        };
        self.create_dialog = CreateDialogState {
            open: true,
            backend,
            cpus: resources.cpus,
            memory: resources.memory,
            disk: resources.disk,
            ..Default::default()
        };
    }

    pub fn submit_create(&mut self) {
        let form = &self.create_dialog;
        let spec = EnvironmentSpec {
            name: form.name.trim().to_string(),
            backend: form.backend,
            template_id: form.template_id.clone(),
            resources: ResourceSpec::new(form.cpus, form.memory.trim(), form.disk.trim()),
            mounts: form.mounts.clone(),
        };

        if let Err(e) = spec.validate() {
            self.create_dialog.error = Some(e);
            return;
        }
        if !self.available_backends.contains(&spec.backend) {
            self.create_dialog.error = Some(format!(
                "{} is not available on this host",
                spec.backend.display_name()
            ));
            return;
        }
        let id = spec.id();
        if self.environments.iter().any(|e| e.is(&id)) || self.is_busy(&id) {
            self.create_dialog.error = Some(format!(
                "{} already has an environment named '{}'",
                spec.backend.display_name(),
                spec.name
            ));
            return;
        }

        self.create_dialog.open = false;
        self.progress.insert(id.clone(), CreateStage::Requested);
        self.set_status(
            StatusLevel::Info,
            format!("Creating {} from template '{}'...", id, spec.template_id),
        );
        self.begin(&id, Request::Create(spec));
    }

    /// Persist custom templates and hand the new catalog to the worker
    pub fn catalog_changed(&mut self) {
        if let Err(e) = self.catalog.save_custom(&TemplateCatalog::custom_path()) {
            self.set_status(
                StatusLevel::Warning,
                format!("Failed to save custom templates: {}", e),
            );
        }
        self.send(Request::SetCatalog(self.catalog.clone()));
    }

    pub fn add_custom_template(&mut self, template: Template) -> devenv_core::Result<()> {
        let id = template.id.clone();
        self.catalog.add_custom(template)?;
        self.catalog_changed();
        self.set_status(StatusLevel::Success, format!("Added template '{}'", id));
        Ok(())
    }

    pub fn remove_custom_template(&mut self, id: &str) {
        match self.catalog.remove_custom(id) {
            Ok(()) => {
                self.catalog_changed();
                self.set_status(StatusLevel::Success, format!("Removed template '{}'", id));
            }
            Err(e) => self.show_error(format!("Could not remove template '{}': {}", id, e)),
        }
    }

    pub fn save_settings(&mut self) {
        let form = &self.settings_view;
        let parse = |value: &str, label: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("{} must be a whole number", label))
        };
        let parsed = parse(&form.default_cpus, "Default CPUs").and_then(|cpus| {
            Ok((
                cpus,
                parse(&form.default_memory, "Default memory")?,
                parse(&form.default_disk, "Default disk")?,
            ))
        });
        let (cpus, memory, disk) = match parsed {
            Ok(values) => values,
            Err(e) => {
                self.settings_view.error = Some(e);
                return;
            }
        };

        let mut config = self.config.clone();
        config.default_backend = form.default_backend;
        config.default_cpus = cpus;
        config.default_memory_mb = memory;
        config.default_disk_gb = disk;
        config.terminal_emulator = form.terminal_emulator.trim().to_string();
        config.log_level = form.log_level.clone();
        config.multipass.network = form.multipass_network.trim().to_string();
        config.lxd.storage_pool = form.lxd_storage_pool.trim().to_string();
        config.lxd.network = form.lxd_network.trim().to_string();

        if let Err(e) = config.validate() {
            self.settings_view.error = Some(e.to_string());
            return;
        }

        let backend_settings_changed =
            config.multipass != self.config.multipass || config.lxd != self.config.lxd;
        self.config = config;
        self.settings_view.error = None;

        match self.config.save() {
            Ok(()) => {
                self.settings_view.saved = true;
                self.set_status(StatusLevel::Success, "Settings saved");
            }
            Err(e) => {
                self.set_status(
                    StatusLevel::Warning,
                    format!("Settings applied but not saved: {}", e),
                );
            }
        }
        if backend_settings_changed {
            self.log(
                StatusLevel::Info,
                "Network and storage settings take effect after a restart",
            );
        }
    }

    /// Replace the settings form with the current configuration
    pub fn reload_settings_form(&mut self) {
        self.settings_view = SettingsViewState::from_config(&self.config);
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::BackendsProbed(kinds) => {
                self.available_backends = kinds;
                if self.available_backends.is_empty() {
                    self.prereq_error = Some(prerequisite_message());
                    self.log(StatusLevel::Warning, "No backend available");
                } else {
                    self.prereq_error = None;
                    let names: Vec<&str> =
                        self.available_backends.iter().map(|k| k.display_name()).collect();
                    self.log(
                        StatusLevel::Info,
                        format!("Available backends: {}", names.join(", ")),
                    );
                }
            }
            Event::Environments(list) => {
                self.environments = list;
                if let Some(selected) = &self.selected {
                    if !self.environments.iter().any(|e| e.is(selected)) {
                        self.selected = None;
                        self.details = None;
                    }
                }
            }
            Event::Progress { id, stage } => {
                let level = match stage {
                    CreateStage::Complete => StatusLevel::Success,
                    CreateStage::Failed(_) => StatusLevel::Error,
                    _ => StatusLevel::Info,
                };
                self.log(level, format!("{}: {}", id, stage.describe()));
                self.progress.insert(id, stage);
            }
            Event::Finished { op, id, result } => {
                self.in_flight.remove(&id);
                match result {
                    Ok(()) => {
                        let message = match op {
                            Operation::Create => format!("Environment {} is ready", id),
                            Operation::Start => format!("Started {}", id),
                            Operation::Stop => format!("Stopped {}", id),
                            Operation::Delete => format!("Deleted {}", id),
                            Operation::Shell => format!("Opened a shell in {}", id),
                        };
                        self.set_status(StatusLevel::Success, message);
                        if op == Operation::Delete {
                            self.progress.remove(&id);
                        }
                        if self.selected.as_ref() == Some(&id) && op != Operation::Delete {
                            self.send(Request::Details(id));
                        }
                    }
                    Err(e) => {
                        let mut message = format!("Could not {} {}: {}", op, id, e);
                        if op == Operation::Create {
                            message.push_str(
                                "\n\nThe partially created environment was left in place; \
                                 delete it once you have looked at it.",
                            );
                        }
                        self.show_error(message);
                    }
                }
            }
            Event::Details { id, result } => match result {
                Ok(details) => {
                    if self.selected.as_ref() == Some(&id) {
                        self.details = Some(details);
                    }
                }
                Err(e) => self.log(
                    StatusLevel::Warning,
                    format!("Could not read details of {}: {}", id, e),
                ),
            },
        }
    }

    fn show_prerequisite_modal(&mut self, ctx: &egui::Context) {
        let Some(error) = self.prereq_error.clone() else {
            return;
        };
        egui::Window::new("⚠ No Backend Available")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(error);
                ui.add_space(10.0);
                for kind in BackendKind::ALL {
                    ui.label(format!("{}:", kind.display_name()));
                    ui.code(kind.install_hint());
                }
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("🔄 Check Again").clicked() {
                        self.send(Request::Probe);
                        self.refresh();
                    }
                    if ui.button("Continue Anyway").clicked() {
                        self.prereq_error = None;
                    }
                });
            });
    }

    fn show_error_dialog(&mut self, ctx: &egui::Context) {
        let Some(message) = self.error_dialog.clone() else {
            return;
        };
        egui::Window::new("✗ Error")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_max_width(480.0);
                ui.label(message);
                ui.add_space(10.0);
                if ui.button("OK").clicked() {
                    self.error_dialog = None;
                }
            });
    }
}

fn prerequisite_message() -> String {
    "Neither multipass nor LXD could be found on this host.\n\
     Install at least one of them, then check again."
        .to_string()
}

impl eframe::App for DevEnvManagerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Handle worker events
        while let Some(event) = self.worker.try_recv() {
            self.handle_event(event);
        }

        let refresh_due = self
            .last_refresh
            .map_or(true, |at| at.elapsed() >= AUTO_REFRESH);
        if refresh_due && self.in_flight.is_empty() {
            self.refresh();
        }

        self.show_prerequisite_modal(ctx);
        self.show_error_dialog(ctx);

        // Top panel with navigation
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("🖥 DevEnv Manager");
                ui.separator();

                ui.selectable_value(&mut self.current_view, View::Environments, "📦 Environments");
                ui.selectable_value(&mut self.current_view, View::Templates, "📁 Templates");
                ui.selectable_value(&mut self.current_view, View::Settings, "⚙ Settings");
                ui.selectable_value(&mut self.current_view, View::Logs, "📝 Logs");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("🔄 Refresh").clicked() {
                        self.refresh();
                    }
                    if !self.in_flight.is_empty() {
                        ui.spinner();
                        ui.label(format!("{} running", self.in_flight.len()));
                    }
                });
            });
        });

        // Status bar
        if let Some((ref msg, level)) = self.status_message.clone() {
            egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let color = match level {
                        StatusLevel::Info => egui::Color32::from_rgb(100, 149, 237),
                        StatusLevel::Success => egui::Color32::from_rgb(34, 139, 34),
                        StatusLevel::Warning => egui::Color32::from_rgb(255, 165, 0),
                        StatusLevel::Error => egui::Color32::from_rgb(220, 20, 60),
                    };
                    ui.colored_label(color, msg.lines().next().unwrap_or_default());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("✕").clicked() {
                            self.clear_status();
                        }
                    });
                });
            });
        }

        if self.create_dialog.open {
            CreateDialog::show(self, ctx);
        }

        // Main content
        egui::CentralPanel::default().show(ctx, |ui| match self.current_view {
            View::Environments => EnvironmentsView::show(self, ui),
            View::Templates => TemplatesView::show(self, ui),
            View::Settings => SettingsView::show(self, ui),
            View::Logs => LogsView::show(self, ui),
        });

        // Wake up for the periodic refresh
        ctx.request_repaint_after(Duration::from_secs(5));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let persisted = PersistedUi {
            view: self.current_view,
            selected: self.selected.clone(),
        };
        eframe::set_value(storage, eframe::APP_KEY, &persisted);
    }
}
