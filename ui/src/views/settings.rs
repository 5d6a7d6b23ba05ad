//! Settings view - application configuration

use crate::app::{DevEnvManagerApp, StatusLevel};
use devenv_core::{config::LOG_LEVELS, AppConfig, BackendKind, TERMINAL_CANDIDATES};
use eframe::egui;

pub struct SettingsView;

impl SettingsView {
    pub fn show(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        ui.heading("⚙ Settings");
        ui.add_space(10.0);

        egui::ScrollArea::vertical().show(ui, |ui| {
            // Defaults section
            egui::CollapsingHeader::new("💾 Defaults for New Environments")
                .default_open(true)
                .show(ui, |ui| {
                    egui::Grid::new("defaults_grid")
                        .num_columns(2)
                        .spacing([10.0, 8.0])
                        .show(ui, |ui| {
                            ui.label("Backend:");
                            egui::ComboBox::from_id_salt("default_backend")
                                .selected_text(app.settings_view.default_backend.display_name())
                                .show_ui(ui, |ui| {
                                    for kind in BackendKind::ALL {
                                        ui.selectable_value(
                                            &mut app.settings_view.default_backend,
                                            kind,
                                            kind.display_name(),
                                        );
                                    }
                                });
                            ui.end_row();

                            ui.label("CPUs:");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.default_cpus)
                                    .desired_width(80.0),
                            );
                            ui.end_row();

                            ui.label("Memory (MB):");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.default_memory)
                                    .desired_width(80.0),
                            );
                            ui.end_row();

                            ui.label("Disk (GB):");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.default_disk)
                                    .desired_width(80.0),
                            );
                            ui.end_row();
                        });

                    ui.add_space(5.0);
                    ui.label(
                        egui::RichText::new(
                            "CPUs 1-32, memory 512-32768 MB, disk 5-1000 GB.",
                        )
                        .color(egui::Color32::GRAY)
                        .small(),
                    );
                });

            ui.add_space(10.0);

            // Terminal section
            egui::CollapsingHeader::new(">_ Terminal")
                .default_open(true)
                .show(ui, |ui| {
                    egui::Grid::new("terminal_grid")
                        .num_columns(2)
                        .spacing([10.0, 8.0])
                        .show(ui, |ui| {
                            ui.label("Terminal emulator:");
                            ui.horizontal(|ui| {
                                ui.add(
                                    egui::TextEdit::singleline(
                                        &mut app.settings_view.terminal_emulator,
                                    )
                                    .hint_text("auto")
                                    .desired_width(200.0),
                                );
                                egui::ComboBox::from_id_salt("terminal_pick")
                                    .selected_text("Pick")
                                    .show_ui(ui, |ui| {
                                        for name in std::iter::once("auto").chain(TERMINAL_CANDIDATES)
                                        {
                                            if ui.selectable_label(false, name).clicked() {
                                                app.settings_view.terminal_emulator =
                                                    name.to_string();
                                            }
                                        }
                                    });
                            });
                            ui.end_row();
                        });

                    ui.add_space(5.0);
                    ui.label(
                        egui::RichText::new(format!(
                            "\"auto\" tries {} in that order.",
                            TERMINAL_CANDIDATES.join(", ")
                        ))
                        .color(egui::Color32::GRAY)
                        .small(),
                    );
                });

            ui.add_space(10.0);

            // Backend section
            egui::CollapsingHeader::new("🖥 Backends")
                .default_open(false)
                .show(ui, |ui| {
                    egui::Grid::new("backend_grid")
                        .num_columns(2)
                        .spacing([10.0, 8.0])
                        .show(ui, |ui| {
                            ui.label("Multipass network:");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.multipass_network)
                                    .hint_text("default")
                                    .desired_width(200.0),
                            );
                            ui.end_row();

                            ui.label("LXD storage pool:");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.lxd_storage_pool)
                                    .hint_text("default")
                                    .desired_width(200.0),
                            );
                            ui.end_row();

                            ui.label("LXD network:");
                            ui.add(
                                egui::TextEdit::singleline(&mut app.settings_view.lxd_network)
                                    .hint_text("lxdbr0")
                                    .desired_width(200.0),
                            );
                            ui.end_row();
                        });

                    ui.add_space(5.0);
                    ui.label(
                        egui::RichText::new("Changes here take effect after a restart.")
                            .color(egui::Color32::GRAY)
                            .small(),
                    );
                });

            ui.add_space(10.0);

            // Logging section
            egui::CollapsingHeader::new("📝 Logging")
                .default_open(false)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Log level:");
                        egui::ComboBox::from_id_salt("log_level")
                            .selected_text(app.settings_view.log_level.clone())
                            .show_ui(ui, |ui| {
                                for level in LOG_LEVELS {
                                    ui.selectable_value(
                                        &mut app.settings_view.log_level,
                                        level.to_string(),
                                        level,
                                    );
                                }
                            });
                    });
                    ui.label(
                        egui::RichText::new("Applies from the next start; RUST_LOG overrides it.")
                            .color(egui::Color32::GRAY)
                            .small(),
                    );
                });

            ui.add_space(20.0);

            if let Some(ref error) = app.settings_view.error {
                ui.colored_label(egui::Color32::from_rgb(220, 20, 60), error);
                ui.add_space(10.0);
            }

            ui.horizontal(|ui| {
                if ui.button("💾 Save Settings").clicked() {
                    app.save_settings();
                }

                if ui.button("↺ Reset to Defaults").clicked() {
                    app.settings_view = crate::app::SettingsViewState::from_config(
                        &AppConfig::default(),
                    );
                    app.set_status(
                        StatusLevel::Info,
                        "Defaults loaded into the form; save to apply",
                    );
                }

                ui.separator();

                if ui.button("📤 Export...").clicked() {
                    Self::export(app);
                }
                if ui.button("📥 Import...").clicked() {
                    Self::import(app);
                }

                if app.settings_view.saved {
                    ui.colored_label(egui::Color32::from_rgb(34, 139, 34), "✓ Saved");
                }
            });

            ui.add_space(10.0);
            ui.label(
                egui::RichText::new(format!(
                    "Config file: {}",
                    AppConfig::default_path().display()
                ))
                .color(egui::Color32::GRAY)
                .small(),
            );
        });
    }

    fn export(app: &mut DevEnvManagerApp) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .set_file_name("devenv-manager-config.json")
            .save_file()
        else {
            return;
        };
        match app.config.export_to(&path) {
            Ok(()) => app.set_status(
                StatusLevel::Success,
                format!("Exported settings to {}", path.display()),
            ),
            Err(e) => app.show_error(format!("Export failed: {}", e)),
        }
    }

    fn import(app: &mut DevEnvManagerApp) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .pick_file()
        else {
            return;
        };
        let mut config = app.config.clone();
        match config.import_from(&path) {
            Ok(()) => {
                app.config = config;
                app.reload_settings_form();
                app.set_status(
                    StatusLevel::Info,
                    format!("Imported settings from {}; save to keep them", path.display()),
                );
            }
            Err(e) => app.show_error(format!("Import failed: {}", e)),
        }
    }
}
