mod app;
mod bridge;
mod error;
mod geometry;
mod model;
mod skeleton;
mod store;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1180.0, 760.0])
            .with_title("Crouch start pose editor"),
        ..Default::default()
    };
    eframe::run_native(
        "crouchpose",
        native_options,
        Box::new(|cc| Ok(Box::new(app::PoseApp::new(cc)))),
    )
}
