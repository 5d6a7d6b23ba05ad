//! Create dialog - name, backend, template, sizing and mounts for a new environment

use crate::app::DevEnvManagerApp;
use devenv_core::Mount;
use eframe::egui;
use std::path::Path;

pub struct CreateDialog;

/// Guest path suggested for a host folder
fn default_guest_path(host: &Path) -> String {
    let folder = host
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "host".to_string());
    format!("/home/ubuntu/{}", folder)
}

impl CreateDialog {
    pub fn show(app: &mut DevEnvManagerApp, ctx: &egui::Context) {
        let mut open = app.create_dialog.open;

        egui::Window::new("➕ New Environment")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_width(560.0)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::Grid::new("create_grid")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("Name:");
                        ui.add(
                            egui::TextEdit::singleline(&mut app.create_dialog.name)
                                .hint_text("dev1")
                                .desired_width(240.0),
                        );
                        ui.end_row();

                        ui.label("Backend:");
                        let backends = app.available_backends.clone();
                        egui::ComboBox::from_id_salt("create_backend")
                            .selected_text(app.create_dialog.backend.display_name())
                            .show_ui(ui, |ui| {
                                for kind in backends {
                                    ui.selectable_value(
                                        &mut app.create_dialog.backend,
                                        kind,
                                        kind.display_name(),
                                    );
                                }
                            });
                        ui.end_row();

                        ui.label("Template:");
                        let selected_name = app
                            .catalog
                            .get(&app.create_dialog.template_id)
                            .map(|t| t.name.clone())
                            .unwrap_or_else(|_| app.create_dialog.template_id.clone());
                        let names = app.catalog.names();
                        egui::ComboBox::from_id_salt("create_template")
                            .selected_text(selected_name)
                            .width(240.0)
                            .show_ui(ui, |ui| {
                                for (id, name) in names {
                                    ui.selectable_value(
                                        &mut app.create_dialog.template_id,
                                        id,
                                        name,
                                    );
                                }
                            });
                        ui.end_row();

                        ui.label("CPUs:");
                        ui.add(egui::DragValue::new(&mut app.create_dialog.cpus).range(1..=32));
                        ui.end_row();

                        ui.label("Memory:");
                        ui.add(
                            egui::TextEdit::singleline(&mut app.create_dialog.memory)
                                .hint_text("2GB")
                                .desired_width(100.0),
                        );
                        ui.end_row();

                        ui.label("Disk:");
                        ui.add(
                            egui::TextEdit::singleline(&mut app.create_dialog.disk)
                                .hint_text("10GB")
                                .desired_width(100.0),
                        );
                        ui.end_row();
                    });

                if let Ok(template) = app.catalog.get(&app.create_dialog.template_id) {
                    ui.add_space(5.0);
                    ui.label(
                        egui::RichText::new(&template.description)
                            .color(egui::Color32::GRAY)
                            .small(),
                    );
                    ui.label(
                        egui::RichText::new(format!("Packages: {}", template.packages.join(", ")))
                            .color(egui::Color32::GRAY)
                            .small(),
                    );
                }

                ui.add_space(10.0);
                Self::show_mounts(app, ui);

                if let Some(error) = &app.create_dialog.error {
                    ui.add_space(5.0);
                    ui.colored_label(egui::Color32::from_rgb(220, 20, 60), error);
                }

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        app.create_dialog.open = false;
                    }
                    if ui.button("✓ Create").clicked() {
                        app.submit_create();
                    }
                });
            });

        // Closing via the title bar, Cancel, or a successful submit
        app.create_dialog.open &= open;
    }

    fn show_mounts(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.strong("Mounts");
            if ui.small_button("➕ Add Folder...").clicked() {
                if let Some(path) = rfd::FileDialog::new().pick_folder() {
                    let guest = default_guest_path(&path);
                    app.create_dialog
                        .mounts
                        .push(Mount::new(path.display().to_string(), guest));
                }
            }
        });

        if app.create_dialog.mounts.is_empty() {
            ui.label(
                egui::RichText::new("No host folders will be shared.")
                    .color(egui::Color32::GRAY)
                    .small(),
            );
            return;
        }

        let mut remove = None;
        egui::Grid::new("mounts_grid")
            .num_columns(3)
            .spacing([8.0, 4.0])
            .show(ui, |ui| {
                for (index, mount) in app.create_dialog.mounts.iter_mut().enumerate() {
                    ui.add(
                        egui::TextEdit::singleline(&mut mount.host)
                            .hint_text("host folder")
                            .desired_width(220.0),
                    );
                    ui.add(
                        egui::TextEdit::singleline(&mut mount.guest)
                            .hint_text("guest path")
                            .desired_width(180.0),
                    );
                    if ui.small_button("✕").clicked() {
                        remove = Some(index);
                    }
                    ui.end_row();
                }
            });
        if let Some(index) = remove {
            app.create_dialog.mounts.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_guest_path() {
        assert_eq!(
            default_guest_path(Path::new("/home/u/proj")),
            "/home/ubuntu/proj"
        );
        assert_eq!(default_guest_path(Path::new("/")), "/home/ubuntu/host");
    }
}
