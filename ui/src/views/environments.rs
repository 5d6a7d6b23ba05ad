//! Environments view - list, lifecycle actions, details and creation progress

use crate::app::DevEnvManagerApp;
use devenv_core::{CreateStage, EnvState, Environment, EnvironmentId};
use eframe::egui;

pub struct EnvironmentsView;

fn state_color(state: EnvState) -> egui::Color32 {
    match state {
        EnvState::Running => egui::Color32::from_rgb(34, 139, 34),
        EnvState::Stopped => egui::Color32::GRAY,
        EnvState::Transitioning => egui::Color32::from_rgb(255, 165, 0),
        EnvState::Error => egui::Color32::from_rgb(220, 20, 60),
        EnvState::Absent => egui::Color32::DARK_GRAY,
    }
}

impl EnvironmentsView {
    pub fn show(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        // Handle delete confirmation dialog
        if let Some(id) = app.pending_delete.clone() {
            egui::Window::new("⚠ Confirm Delete")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ui.ctx(), |ui| {
                    ui.label(format!(
                        "Delete environment '{}' from {}?",
                        id.name,
                        id.backend.display_name()
                    ));
                    ui.add_space(5.0);
                    ui.label("The VM or container and everything stored inside it is removed.");
                    ui.label("Mounted host directories are not touched.");
                    ui.add_space(10.0);
                    ui.colored_label(
                        egui::Color32::from_rgb(220, 20, 60),
                        "This action cannot be undone!",
                    );
                    ui.add_space(10.0);
                    ui.horizontal(|ui| {
                        if ui.button("Cancel").clicked() {
                            app.pending_delete = None;
                        }
                        if ui.button("🗑 Delete").clicked() {
                            app.pending_delete = None;
                            app.delete_environment(&id);
                        }
                    });
                });
        }

        ui.heading("📦 Environments");
        ui.add_space(10.0);

        ui.horizontal(|ui| {
            let can_create = !app.available_backends.is_empty();
            if ui
                .add_enabled(can_create, egui::Button::new("➕ New Environment"))
                .on_disabled_hover_text("Install multipass or LXD first")
                .clicked()
            {
                app.open_create_dialog();
            }
            ui.separator();
            ui.label(format!("{} environments", app.environments.len()));
            if let Some(instant) = app.last_refresh {
                ui.label(format!("Last refresh: {}s ago", instant.elapsed().as_secs()));
            }
        });

        ui.add_space(10.0);
        Self::show_progress(app, ui);

        if app.environments.is_empty() {
            ui.vertical_centered(|ui| {
                ui.add_space(50.0);
                ui.label("No environments yet.");
                ui.add_space(10.0);
                ui.label("Click 'New Environment' to create one from a template.");
            });
            return;
        }

        let environments = app.environments.clone();
        egui::ScrollArea::vertical()
            .id_salt("environment_list")
            .max_height(ui.available_height() * 0.55)
            .show(ui, |ui| {
                egui::Grid::new("environments_grid")
                    .num_columns(6)
                    .striped(true)
                    .spacing([16.0, 8.0])
                    .show(ui, |ui| {
                        ui.strong("Name");
                        ui.strong("Backend");
                        ui.strong("Template");
                        ui.strong("State");
                        ui.strong("IPv4");
                        ui.strong("Actions");
                        ui.end_row();

                        for env in &environments {
                            Self::show_row(app, ui, env);
                            ui.end_row();
                        }
                    });
            });

        ui.separator();
        Self::show_details(app, ui);
    }

    fn show_row(app: &mut DevEnvManagerApp, ui: &mut egui::Ui, env: &Environment) {
        let id = env.id();
        let selected = app.selected.as_ref() == Some(&id);
        if ui.selectable_label(selected, &env.name).clicked() {
            app.select_environment(&id);
        }
        ui.label(env.backend.display_name());
        ui.label(env.template_id.as_deref().unwrap_or("-"));

        let busy = app.is_busy(&id);
        ui.horizontal(|ui| {
            ui.colored_label(state_color(env.state), env.state.display_name());
            if busy {
                ui.spinner();
            }
        });
        ui.monospace(env.ipv4.as_deref().unwrap_or("-"));

        ui.horizontal(|ui| {
            let stopped = env.state == EnvState::Stopped;
            let running = env.state.is_running();

            if ui
                .add_enabled(!busy && stopped, egui::Button::new("▶").small())
                .on_hover_text("Start")
                .clicked()
            {
                app.start_environment(&id);
            }
            if ui
                .add_enabled(!busy && running, egui::Button::new("⏹").small())
                .on_hover_text("Stop")
                .clicked()
            {
                app.stop_environment(&id);
            }
            if ui
                .add_enabled(!busy && running, egui::Button::new(">_").small())
                .on_hover_text("Open a shell in a terminal window")
                .clicked()
            {
                app.open_shell(&id);
            }
            if ui
                .add_enabled(!busy && env.state.is_stable(), egui::Button::new("🗑").small())
                .on_hover_text("Delete (stop it first)")
                .clicked()
            {
                app.pending_delete = Some(id.clone());
            }
        });
    }

    fn show_progress(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        if app.progress.is_empty() {
            return;
        }

        let entries: Vec<(EnvironmentId, CreateStage)> = app
            .progress
            .iter()
            .map(|(id, stage)| (id.clone(), stage.clone()))
            .collect();

        egui::Frame::group(ui.style())
            .rounding(8.0)
            .inner_margin(12.0)
            .show(ui, |ui| {
                ui.strong("Creating");
                for (id, stage) in entries {
                    ui.horizontal(|ui| {
                        if stage.is_terminal() {
                            let color = match stage {
                                CreateStage::Complete => egui::Color32::from_rgb(34, 139, 34),
                                _ => egui::Color32::from_rgb(220, 20, 60),
                            };
                            ui.colored_label(color, format!("{}: {}", id, stage.describe()));
                            if ui.small_button("✕").on_hover_text("Dismiss").clicked() {
                                app.progress.remove(&id);
                            }
                        } else {
                            ui.spinner();
                            ui.label(format!("{}: {}", id, stage.describe()));
                        }
                    });
                }
            });
        ui.add_space(10.0);
    }

    fn show_details(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        let Some(id) = app.selected.clone() else {
            ui.label(
                egui::RichText::new("Select an environment to see its details.")
                    .color(egui::Color32::GRAY),
            );
            return;
        };

        ui.horizontal(|ui| {
            ui.heading(format!("🏷 {}", id.name));
            ui.label(
                egui::RichText::new(id.backend.display_name()).color(egui::Color32::GRAY),
            );
            if ui.small_button("🔄").on_hover_text("Reload details").clicked() {
                app.select_environment(&id);
            }
        });

        let Some(details) = app.details.clone() else {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading details...");
            });
            return;
        };

        egui::ScrollArea::vertical()
            .id_salt("environment_details")
            .show(ui, |ui| {
                egui::Grid::new("details_grid")
                    .num_columns(2)
                    .spacing([10.0, 6.0])
                    .show(ui, |ui| {
                        if let Some(env) = app.environments.iter().find(|e| e.is(&id)) {
                            if let Some(resources) = &env.resources {
                                ui.label("Requested:");
                                ui.label(format!(
                                    "{} CPUs, {} memory, {} disk",
                                    resources.cpus, resources.memory, resources.disk
                                ));
                                ui.end_row();
                            }
                        }
                        for (key, value) in &details.fields {
                            ui.label(format!("{}:", key));
                            ui.label(value);
                            ui.end_row();
                        }
                    });

                ui.add_space(8.0);
                ui.strong("Mounts");
                if details.mounts.is_empty() {
                    ui.label(egui::RichText::new("None").color(egui::Color32::GRAY));
                }
                for mount in &details.mounts {
                    ui.monospace(format!("{} → {}", mount.host, mount.guest));
                }
            });
    }
}
