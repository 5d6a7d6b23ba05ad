//! View modules for the DevEnv Manager GUI

mod create;
mod environments;
mod logs;
mod settings;
mod templates;

pub use create::CreateDialog;
pub use environments::EnvironmentsView;
pub use logs::LogsView;
pub use settings::SettingsView;
pub use templates::TemplatesView;

use serde::{Deserialize, Serialize};

/// Navigation views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum View {
    #[default]
    Environments,
    Templates,
    Settings,
    Logs,
}
