//! DevEnv Manager - GUI Application
//!
//! Creates and manages isolated development environments backed by
//! multipass VMs or LXD containers.

mod app;
mod views;

use app::DevEnvManagerApp;
use devenv_core::AppConfig;
use eframe::egui;

fn main() -> eframe::Result<()> {
    // RUST_LOG wins over the configured level
    let config_path = AppConfig::default_path();
    let loaded = config_path.exists().then(|| AppConfig::load(&config_path));
    let level = match &loaded {
        Some(Ok(config)) => config.log_level.clone(),
        _ => "info".to_string(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match loaded {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            log::warn!("{}; using default configuration", e);
            AppConfig::default()
        }
        None => AppConfig::default(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window.width, config.window.height])
            .with_min_inner_size([800.0, 500.0])
            .with_title("DevEnv Manager"),
        ..Default::default()
    };

    eframe::run_native(
        "DevEnv Manager",
        options,
        Box::new(|cc| Ok(Box::new(DevEnvManagerApp::new(cc, config)))),
    )
}
