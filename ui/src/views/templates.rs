//! Templates view - browse the catalog and manage custom templates

use crate::app::{DevEnvManagerApp, TemplatesViewState};
use devenv_core::Template;
use eframe::egui;

pub struct TemplatesView;

/// Split a free-form package list on commas and whitespace
fn parse_packages(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

impl TemplatesView {
    pub fn show(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        ui.heading("📁 Templates");
        ui.add_space(10.0);

        ui.horizontal(|ui| {
            if ui.button("➕ Add Custom Template").clicked() {
                app.templates_view = TemplatesViewState {
                    show_add_dialog: true,
                    form_base_image: "22.04".to_string(),
                    selected: app.templates_view.selected.take(),
                    ..Default::default()
                };
            }
            ui.label(format!("{} templates", app.catalog.len()));
        });

        ui.add_space(10.0);

        let templates: Vec<Template> = app.catalog.list().into_iter().cloned().collect();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for template in &templates {
                Self::show_template_card(app, ui, template);
                ui.add_space(8.0);
            }
        });

        if app.templates_view.show_add_dialog {
            Self::show_add_dialog(app, ui);
        }

        if let Some(id) = app.templates_view.pending_remove.clone() {
            egui::Window::new("⚠ Remove Template")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ui.ctx(), |ui| {
                    ui.label(format!("Remove custom template '{}'?", id));
                    ui.label("Existing environments created from it are not affected.");
                    ui.add_space(10.0);
                    ui.horizontal(|ui| {
                        if ui.button("Cancel").clicked() {
                            app.templates_view.pending_remove = None;
                        }
                        if ui.button("🗑 Remove").clicked() {
                            app.templates_view.pending_remove = None;
                            app.remove_custom_template(&id);
                        }
                    });
                });
        }
    }

    fn show_template_card(app: &mut DevEnvManagerApp, ui: &mut egui::Ui, template: &Template) {
        egui::Frame::group(ui.style())
            .rounding(8.0)
            .inner_margin(12.0)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.strong(&template.name);
                    ui.label(
                        egui::RichText::new(format!("({})", template.id))
                            .monospace()
                            .color(egui::Color32::GRAY),
                    );
                    if !template.builtin {
                        ui.label(
                            egui::RichText::new("custom")
                                .small()
                                .color(egui::Color32::from_rgb(100, 149, 237)),
                        );
                    }

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if !template.builtin
                            && ui.button("🗑").on_hover_text("Remove template").clicked()
                        {
                            app.templates_view.pending_remove = Some(template.id.clone());
                        }
                        if ui.button("➕").on_hover_text("Create an environment from this").clicked()
                            && !app.available_backends.is_empty()
                        {
                            app.open_create_dialog();
                            app.create_dialog.template_id = template.id.clone();
                        }
                    });
                });

                ui.label(&template.description);
                ui.label(
                    egui::RichText::new(format!(
                        "Ubuntu {} · {} packages",
                        template.base_image,
                        template.packages.len()
                    ))
                    .small()
                    .color(egui::Color32::GRAY),
                );

                egui::CollapsingHeader::new("Packages and setup script")
                    .id_salt(format!("template_details_{}", template.id))
                    .show(ui, |ui| {
                        ui.label(template.packages.join(", "));
                        ui.add_space(4.0);
                        let mut script = template.setup_script.clone();
                        ui.add(
                            egui::TextEdit::multiline(&mut script)
                                .code_editor()
                                .interactive(false)
                                .desired_width(f32::INFINITY),
                        );
                    });
            });
    }

    fn show_add_dialog(app: &mut DevEnvManagerApp, ui: &mut egui::Ui) {
        let mut open = true;
        egui::Window::new("➕ Custom Template")
            .open(&mut open)
            .collapsible(false)
            .default_width(520.0)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ui.ctx(), |ui| {
                let form = &mut app.templates_view;
                egui::Grid::new("template_form_grid")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("ID:");
                        ui.add(
                            egui::TextEdit::singleline(&mut form.form_id)
                                .hint_text("elixir-dev")
                                .desired_width(240.0),
                        );
                        ui.end_row();

                        ui.label("Name:");
                        ui.add(
                            egui::TextEdit::singleline(&mut form.form_name).desired_width(240.0),
                        );
                        ui.end_row();

                        ui.label("Description:");
                        ui.add(
                            egui::TextEdit::singleline(&mut form.form_description)
                                .desired_width(360.0),
                        );
                        ui.end_row();

                        ui.label("Base image:");
                        ui.add(
                            egui::TextEdit::singleline(&mut form.form_base_image)
                                .hint_text("22.04")
                                .desired_width(120.0),
                        );
                        ui.end_row();

                        ui.label("Packages:");
                        ui.add(
                            egui::TextEdit::singleline(&mut form.form_packages)
                                .hint_text("erlang, elixir")
                                .desired_width(360.0),
                        );
                        ui.end_row();
                    });

                ui.label("Setup script (runs as root):");
                ui.add(
                    egui::TextEdit::multiline(&mut form.form_setup_script)
                        .code_editor()
                        .desired_rows(8)
                        .desired_width(f32::INFINITY),
                );

                if let Some(error) = &form.form_error {
                    ui.colored_label(egui::Color32::from_rgb(220, 20, 60), error);
                }

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        app.templates_view.show_add_dialog = false;
                    }
                    if ui.button("💾 Save Template").clicked() {
                        Self::save_form(app);
                    }
                });
            });

        if !open {
            app.templates_view.show_add_dialog = false;
        }
    }

    fn save_form(app: &mut DevEnvManagerApp) {
        let form = &app.templates_view;
        let template = Template {
            id: form.form_id.trim().to_string(),
            name: form.form_name.trim().to_string(),
            description: form.form_description.trim().to_string(),
            base_image: form.form_base_image.trim().to_string(),
            packages: parse_packages(&form.form_packages),
            setup_script: form.form_setup_script.clone(),
            builtin: false,
        };

        match app.add_custom_template(template) {
            Ok(()) => {
                app.templates_view.show_add_dialog = false;
                app.templates_view.form_error = None;
            }
            Err(e) => app.templates_view.form_error = Some(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packages() {
        assert_eq!(
            parse_packages("erlang, elixir\n  inotify-tools,,"),
            vec!["erlang", "elixir", "inotify-tools"]
        );
        assert!(parse_packages("  ").is_empty());
    }
}
