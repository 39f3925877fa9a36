use eframe::egui;

pub(super) fn draw_help_window(ctx: &egui::Context, open: &mut bool) {
    egui::Window::new("Help & Shortcuts")
        .open(open)
        .resizable(true)
        .default_width(520.0)
        .default_height(440.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("Keyboard Shortcuts");
                ui.separator();

                ui.label("General");
                help_row(ui, "⌘⇧P", "Open command palette");
                help_row(ui, "⌘O", "Open image (or drop one on the window)");
                help_row(ui, "⌘E", "Export annotated PNG");
                help_row(ui, "⌘Enter", "Run analysis");
                help_row(ui, "⌘Z", "Undo");
                help_row(ui, "⌘⇧Z / ⌘Y", "Redo");
                help_row(ui, "F1", "This window");

                ui.add_space(10.0);
                ui.label("Editing");
                help_row(ui, "1-9", "Select joint by number");
                help_row(ui, "Escape", "Clear selection");
                help_row(ui, "Arrow keys", "Nudge selected joint (direction mode)");

                ui.add_space(20.0);
                ui.heading("Modes");
                ui.separator();
                help_row(ui, "Click", "Select a joint, then click where it belongs");
                help_row(ui, "Drag", "Grab a marker and move it");
                help_row(ui, "Direction", "Nudge the selected joint with the pad");
                help_row(ui, "Dropdown", "Pick a joint from the list, type X/Y");
                help_row(ui, "Batch", "Edit every joint's X/Y in one table");
                ui.add_space(5.0);
                ui.label("Coordinates are in original image pixels. Edits are kept inside the image.");

                ui.add_space(20.0);
                ui.heading("Analysis");
                ui.separator();
                ui.label("Once you have run an analysis, every finished edit re-runs it.");
                ui.label("Only the newest result is shown.");
                ui.add_space(5.0);
                ui.label("Set position: front knee 80-100°, rear knee 120-135°, front hip 40-60°.");
                ui.label("Takeoff: lower body 30-60°, upper body 25-55°, kunoji 150-180°.");

                ui.add_space(20.0);
                ui.heading("Settings");
                ui.separator();
                ui.label("Read from ~/.config/crouchpose.toml, ./settings.toml or ./settings.json:");
                ui.add_space(5.0);
                ui.code(r##"server_url = "http://127.0.0.1:5000"
request_timeout_secs = 30
max_display_width = 800
max_display_height = 600
move_step = 5
step_space = "display"
analysis_mode = "set"
detector_coordinates = "pixels""##);
            });
        });
}

fn help_row(ui: &mut egui::Ui, shortcut: &str, description: &str) {
    ui.horizontal(|ui| {
        ui.add_sized([100.0, 16.0], egui::Label::new(
            egui::RichText::new(shortcut).monospace().strong()
        ));
        ui.label(description);
    });
}
