use crate::error::EditorError;
use crate::geometry::Direction;
use crate::model::{AnalysisMode, Joint};
use crate::store::{Axis, EditSpace};
use eframe::egui;
use std::time::{Duration, Instant};

use super::command_palette::{CommandContext, CommandId, CommandPalette};
use super::render::{EguiSurface, draw_scene, metric_card, mode_button};
use super::session::{Phase, ToastKind};
use super::{InteractionMode, PoseApp};

const JOINT_KEYS: [egui::Key; 9] = [
    egui::Key::Num1,
    egui::Key::Num2,
    egui::Key::Num3,
    egui::Key::Num4,
    egui::Key::Num5,
    egui::Key::Num6,
    egui::Key::Num7,
    egui::Key::Num8,
    egui::Key::Num9,
];

const ERROR_RED: egui::Color32 = egui::Color32::from_rgb(220, 53, 69);
const SUCCESS_GREEN: egui::Color32 = egui::Color32::from_rgb(40, 167, 69);

impl eframe::App for PoseApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for event in self.bridge.poll() {
            self.session.apply(event, &self.bridge);
        }
        if let Some(path) = ctx.input(|i| super::dropped_path(&i.raw.dropped_files)) {
            self.open_image(&path);
        }
        self.session.prune_toasts(Instant::now());
        self.sync_texture(ctx);
        self.sync_fields();

        let (commands, nudge) = self.read_shortcuts(ctx);
        for cmd in commands {
            CommandPalette::execute(self, ctx, cmd);
        }
        if let Some(direction) = nudge {
            self.nudge(direction);
        }

        let mut fields_focused = false;

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                let uploading = self.session.phase() == Phase::Uploading;
                if ui
                    .add_enabled(!uploading, egui::Button::new("Open image…"))
                    .clicked()
                {
                    self.open_image_dialog();
                }
                let has_image = self.session.image().is_some();
                if ui
                    .add_enabled(
                        has_image && !self.session.is_detecting(),
                        egui::Button::new("Re-detect"),
                    )
                    .clicked()
                {
                    self.detect();
                }
                if ui
                    .add_enabled(has_image, egui::Button::new("Export PNG…"))
                    .clicked()
                {
                    self.export_dialog();
                }
                ui.separator();
                if ui
                    .add_enabled(self.session.store.can_undo(), egui::Button::new("⟲"))
                    .on_hover_text("Undo (⌘Z)")
                    .clicked()
                {
                    self.undo();
                }
                if ui
                    .add_enabled(self.session.store.can_redo(), egui::Button::new("⟳"))
                    .on_hover_text("Redo (⌘⇧Z)")
                    .clicked()
                {
                    self.redo();
                }
                ui.separator();
                let mut mode = self.session.controller.mode();
                for m in InteractionMode::ALL {
                    mode_button(ui, m.label(), m, &mut mode);
                }
                self.set_mode(mode);
                ui.separator();
                if ui.button("?").on_hover_text("Help (F1)").clicked() {
                    self.show_help = true;
                }
                if uploading || self.session.is_detecting() {
                    ui.spinner();
                }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match self.session.phase() {
                    Phase::Empty => ui.label("Open an image to begin"),
                    Phase::Uploading => ui.label("Uploading…"),
                    Phase::Editing => match self.session.store.selected_joint() {
                        Some(joint) => ui.label(format!("Selected: {}", joint.display_name())),
                        None => ui.label("No joint selected"),
                    },
                };
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(self.settings.server_url.as_str());
                    ui.separator();
                    if let Some(view) = self.session.view() {
                        ui.label(format!("Scale: {:.0}%", view.sx * 100.0));
                        ui.separator();
                        ui.label(format!(
                            "Image: {:.0}×{:.0}",
                            view.image_size.x, view.image_size.y
                        ));
                        ui.separator();
                    }
                    ui.label(format!("Joints: {}", self.session.store.keypoints().len()));
                });
            });
        });

        egui::SidePanel::right("controls")
            .resizable(true)
            .min_width(240.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    fields_focused |= self.joint_controls(ui);
                    ui.separator();
                    self.analysis_controls(ui);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            self.session.set_max_display(egui::vec2(
                available.x.min(self.settings.max_display_width),
                available.y.min(self.settings.max_display_height),
            ));
            let (Some(view), Some((_, texture))) =
                (self.session.view().copied(), self.texture.as_ref())
            else {
                ui.centered_and_justified(|ui| {
                    if self.session.phase() == Phase::Uploading {
                        ui.spinner();
                    } else {
                        ui.label("Open an image to begin (⌘O)");
                    }
                });
                return;
            };

            let (response, painter) =
                ui.allocate_painter(view.display_size, egui::Sense::click_and_drag());
            let origin = response.rect.min;

            let pointer = ctx
                .input(|i| i.pointer.interact_pos())
                .map(|p| (p - origin).to_pos2());
            let pressed = response.hovered() && ctx.input(|i| i.pointer.primary_pressed());
            let moved = ctx.input(|i| i.pointer.delta() != egui::Vec2::ZERO);
            if let Some(pos) = pointer {
                let session = &mut self.session;
                if pressed {
                    let result = session.controller.press(&mut session.store, &view, pos);
                    session.after_edit(result, &self.bridge);
                } else if response.dragged() && moved {
                    let result = session.controller.drag_to(&mut session.store, &view, pos);
                    session.after_edit(result, &self.bridge);
                }
            }
            if ctx.input(|i| i.pointer.primary_released()) {
                let session = &mut self.session;
                let edit = session.controller.release(&mut session.store);
                session.after_edit(Ok(edit), &self.bridge);
            }
            if self.session.controller.mode() == InteractionMode::Drag && response.hovered() {
                ctx.set_cursor_icon(if self.session.controller.drag_session().is_some() {
                    egui::CursorIcon::Grabbing
                } else {
                    egui::CursorIcon::Grab
                });
            }

            let mut surface = EguiSurface::new(&painter, origin);
            draw_scene(
                &mut surface,
                texture,
                self.session.store.keypoints(),
                self.session.store.selected_joint(),
                &view,
                &self.session.style,
            );
        });

        self.draw_toasts(ctx);
        draw_drop_hint(ctx);

        let store = &self.session.store;
        let mut present = [false; 9];
        for joint in store.keypoints().present() {
            present[joint.order() - 1] = true;
        }
        let cx = CommandContext {
            has_image: self.session.image().is_some(),
            uploading: self.session.phase() == Phase::Uploading,
            can_analyze: self.session.can_analyze(),
            detecting: self.session.is_detecting(),
            has_undo: store.can_undo(),
            has_redo: store.can_redo(),
            has_selection: store.selected_joint().is_some(),
            present,
        };
        if let Some(cmd) = self.command_palette.ui(ctx, cx) {
            CommandPalette::execute(self, ctx, cmd);
        }

        super::help::draw_help_window(ctx, &mut self.show_help);

        self.editing_fields = fields_focused;
        if !self.session.toasts().is_empty()
            || self.session.is_analyzing()
            || self.session.is_detecting()
            || self.session.phase() == Phase::Uploading
        {
            ctx.request_repaint_after(Duration::from_millis(200));
        }
    }
}

impl PoseApp {
    fn sync_texture(&mut self, ctx: &egui::Context) {
        let Some(image) = self.session.image() else {
            self.texture = None;
            return;
        };
        if self
            .texture
            .as_ref()
            .is_some_and(|(generation, _)| *generation == image.generation)
        {
            return;
        }
        let size = [image.pixels.width() as usize, image.pixels.height() as usize];
        let color = egui::ColorImage::from_rgba_unmultiplied(size, image.pixels.as_raw());
        let handle = ctx.load_texture("photo", color, egui::TextureOptions::LINEAR);
        self.texture = Some((image.generation, handle));
    }

    fn read_shortcuts(&mut self, ctx: &egui::Context) -> (Vec<CommandId>, Option<Direction>) {
        let wants_keyboard = ctx.wants_keyboard_input();
        let palette_open = self.command_palette.open;
        let direction_mode = self.session.controller.mode() == InteractionMode::Direction;
        let mut commands = Vec::new();
        let mut nudge = None;
        ctx.input_mut(|i| {
            if !palette_open
                && i.consume_key(egui::Modifiers::COMMAND | egui::Modifiers::SHIFT, egui::Key::P)
            {
                self.command_palette.open("");
            }
            if i.consume_key(egui::Modifiers::NONE, egui::Key::F1) {
                commands.push(CommandId::Help);
            }
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::O) {
                commands.push(CommandId::OpenImage);
            }
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::E) {
                commands.push(CommandId::Export);
            }
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::Enter) {
                commands.push(CommandId::Analyze);
            }
            if wants_keyboard || palette_open {
                return;
            }
            if i.consume_key(
                egui::Modifiers::COMMAND | egui::Modifiers::SHIFT,
                egui::Key::Z,
            ) || i.consume_key(egui::Modifiers::COMMAND, egui::Key::Y)
            {
                commands.push(CommandId::Redo);
            } else if i.consume_key(egui::Modifiers::COMMAND, egui::Key::Z) {
                commands.push(CommandId::Undo);
            }
            if i.consume_key(egui::Modifiers::NONE, egui::Key::Escape) {
                commands.push(CommandId::ClearSelection);
            }
            for (key, joint) in JOINT_KEYS.into_iter().zip(Joint::ALL) {
                if i.consume_key(egui::Modifiers::NONE, key) {
                    commands.push(CommandId::Select(joint));
                }
            }
            if direction_mode {
                for (key, direction) in [
                    (egui::Key::ArrowUp, Direction::N),
                    (egui::Key::ArrowDown, Direction::S),
                    (egui::Key::ArrowLeft, Direction::W),
                    (egui::Key::ArrowRight, Direction::E),
                ] {
                    if i.consume_key(egui::Modifiers::NONE, key) {
                        nudge = Some(direction);
                    }
                }
            }
        });
        (commands, nudge)
    }

    fn nudge(&mut self, direction: Direction) {
        let Some(view) = self.session.view().copied() else {
            return;
        };
        let session = &mut self.session;
        let result = session
            .controller
            .nudge(&mut session.store, &view, direction);
        session.after_edit(result, &self.bridge);
    }

    fn apply_coordinate_fields(&mut self) {
        let session = &mut self.session;
        let result =
            session
                .controller
                .numeric_entry(&mut session.store, &self.fields.x, &self.fields.y);
        match result {
            Err(EditorError::Input(msg)) => {
                log::debug!("Rejected coordinate entry: {msg}");
                self.fields.error = Some(msg);
            }
            other => {
                self.fields.error = None;
                self.synced_revision = None;
                session.after_edit(other, &self.bridge);
            }
        }
    }

    /// Selection, pad, coordinate fields and batch table, as the active mode
    /// allows. Returns whether a text field has keyboard focus.
    fn joint_controls(&mut self, ui: &mut egui::Ui) -> bool {
        let mut focused = false;
        let affordances = self.session.controller.mode().affordances();
        let choices = self.session.joint_choices();
        let selected = self.session.store.selected_joint();

        ui.heading("Joints");
        match selected {
            Some(joint) => {
                ui.colored_label(SUCCESS_GREEN, format!("Selected: {}", joint.display_name()));
            }
            None => {
                ui.weak("No joint selected");
            }
        }
        if choices.is_empty() {
            ui.weak("No joints yet");
            return false;
        }

        if affordances.joint_buttons {
            ui.horizontal_wrapped(|ui| {
                for joint in &choices {
                    if ui
                        .selectable_label(selected == Some(*joint), joint.display_name())
                        .clicked()
                    {
                        self.select_joint(*joint);
                    }
                }
            });
        }

        if affordances.dropdown {
            let mut choice = selected;
            egui::ComboBox::from_id_salt("joint_dropdown")
                .width(200.0)
                .selected_text(
                    choice
                        .map(|j| j.display_name())
                        .unwrap_or_else(|| "Choose a joint".to_string()),
                )
                .show_ui(ui, |ui| {
                    for joint in &choices {
                        ui.selectable_value(&mut choice, Some(*joint), joint.display_name());
                    }
                });
            if let Some(joint) = choice.filter(|j| Some(*j) != selected) {
                self.select_joint(joint);
            }
        }

        if affordances.direction_pad {
            ui.add_space(6.0);
            let mut pressed = None;
            ui.add_enabled_ui(selected.is_some(), |ui| {
                egui::Grid::new("direction_pad")
                    .spacing(egui::vec2(4.0, 4.0))
                    .show(ui, |ui| {
                        for row in Direction::PAD {
                            for direction in row {
                                let button = egui::Button::new(direction.arrow())
                                    .min_size(egui::vec2(32.0, 32.0));
                                if ui
                                    .add_enabled(direction != Direction::Center, button)
                                    .clicked()
                                {
                                    pressed = Some(direction);
                                }
                            }
                            ui.end_row();
                        }
                    });
            });
            if let Some(direction) = pressed {
                self.nudge(direction);
            }
            let controller = &mut self.session.controller;
            let mut save = false;
            ui.horizontal(|ui| {
                ui.label("Step");
                let step = ui.add(step_value(&mut controller.step));
                save |= settled(&step);
                save |= ui
                    .radio_value(&mut controller.step_space, EditSpace::Display, "screen")
                    .changed();
                save |= ui
                    .radio_value(&mut controller.step_space, EditSpace::Image, "image")
                    .changed();
            });
            if save {
                self.persist_settings();
            }
        }

        if affordances.numeric {
            ui.add_space(6.0);
            ui.label("Position (image pixels)");
            let mut submit = false;
            ui.add_enabled_ui(selected.is_some(), |ui| {
                ui.horizontal(|ui| {
                    ui.label("X");
                    let rx = ui.add(egui::TextEdit::singleline(&mut self.fields.x).desired_width(64.0));
                    ui.label("Y");
                    let ry = ui.add(egui::TextEdit::singleline(&mut self.fields.y).desired_width(64.0));
                    focused |= rx.has_focus() || ry.has_focus();
                    submit |= (rx.lost_focus() || ry.lost_focus())
                        && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    submit |= ui.button("Apply").clicked();
                });
            });
            if let Some(err) = &self.fields.error {
                ui.colored_label(ERROR_RED, err);
            }
            if submit {
                self.apply_coordinate_fields();
            }
        }

        if affordances.batch_table {
            let mut edits = Vec::new();
            egui::Grid::new("batch_table")
                .striped(true)
                .num_columns(3)
                .show(ui, |ui| {
                    ui.strong("Joint");
                    ui.strong("X");
                    ui.strong("Y");
                    ui.end_row();
                    for row in &mut self.batch {
                        ui.label(row.joint.display_name());
                        let rx = ui.add(egui::TextEdit::singleline(&mut row.x).desired_width(56.0));
                        let ry = ui.add(egui::TextEdit::singleline(&mut row.y).desired_width(56.0));
                        focused |= rx.has_focus() || ry.has_focus();
                        if rx.lost_focus() {
                            edits.push((row.joint, Axis::X, row.x.clone()));
                        }
                        if ry.lost_focus() {
                            edits.push((row.joint, Axis::Y, row.y.clone()));
                        }
                        ui.end_row();
                    }
                });
            for (joint, axis, text) in edits {
                let session = &mut self.session;
                let result = session
                    .controller
                    .batch_entry(&mut session.store, joint, axis, &text);
                // Rejected or clamped values are shown as stored.
                self.synced_revision = None;
                session.after_edit(result, &self.bridge);
            }
        }
        focused
    }

    fn analysis_controls(&mut self, ui: &mut egui::Ui) {
        ui.heading("Analysis");
        let current = self.session.analysis_mode();
        let mut mode = current;
        ui.horizontal(|ui| {
            for m in [AnalysisMode::Set, AnalysisMode::Takeoff] {
                ui.radio_value(&mut mode, m, m.label());
            }
        });
        if mode != current {
            self.set_analysis_mode(mode);
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.session.can_analyze(), egui::Button::new("Analyze"))
                .on_hover_text("⌘Enter")
                .clicked()
            {
                self.analyze();
            }
            if self.session.is_analyzing() {
                ui.spinner();
            }
        });
        let readings = self
            .session
            .report()
            .map(|r| r.readings())
            .unwrap_or_default();
        for reading in &readings {
            metric_card(ui, reading);
        }
    }

    fn draw_toasts(&self, ctx: &egui::Context) {
        if self.session.toasts().is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -36.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for toast in self.session.toasts() {
                    let fill = match toast.kind {
                        ToastKind::Success => SUCCESS_GREEN,
                        ToastKind::Error => ERROR_RED,
                    };
                    egui::Frame::new()
                        .fill(fill)
                        .inner_margin(8.0)
                        .corner_radius(egui::CornerRadius::same(6))
                        .show(ui, |ui| {
                            ui.colored_label(egui::Color32::WHITE, &toast.message);
                        });
                    ui.add_space(4.0);
                }
            });
    }
}

fn step_value(step: &mut f32) -> egui::DragValue<'_> {
    egui::DragValue::new(step).range(1.0..=100.0).suffix(" px")
}

/// True once a drag or typed edit of a value widget is over. Saving on
/// `changed()` would rewrite the settings file every frame of a drag.
fn settled(response: &egui::Response) -> bool {
    response.drag_stopped() || response.lost_focus()
}

fn draw_drop_hint(ctx: &egui::Context) {
    if ctx.input(|i| i.raw.hovered_files.is_empty()) {
        return;
    }
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Foreground,
        egui::Id::new("drop_hint"),
    ));
    let screen = ctx.content_rect();
    painter.rect_filled(screen, 0.0, egui::Color32::from_black_alpha(160));
    painter.text(
        screen.center(),
        egui::Align2::CENTER_CENTER,
        "Drop an image to open it",
        egui::FontId::proportional(24.0),
        egui::Color32::WHITE,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ctx: &egui::Context, events: Vec<egui::Event>, step: &mut f32) -> (egui::Rect, bool) {
        let mut out = (egui::Rect::NOTHING, false);
        let input = egui::RawInput {
            events,
            ..Default::default()
        };
        let _ = ctx.run(input, |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                let response = ui.add(step_value(step));
                out = (response.rect, settled(&response));
            });
        });
        out
    }

    fn button(pos: egui::Pos2, pressed: bool) -> egui::Event {
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::NONE,
        }
    }

    #[test]
    fn step_drag_settles_only_on_release() {
        let ctx = egui::Context::default();
        let mut step = 5.0;
        let (rect, _) = frame(&ctx, Vec::new(), &mut step);
        let start = rect.center();
        let end = start + egui::vec2(60.0, 0.0);

        let during = [
            vec![egui::Event::PointerMoved(start)],
            vec![button(start, true)],
            vec![egui::Event::PointerMoved(start + egui::vec2(30.0, 0.0))],
            vec![egui::Event::PointerMoved(end)],
        ];
        for events in during {
            let (_, settled) = frame(&ctx, events, &mut step);
            assert!(!settled);
        }
        assert!(step > 5.0);
        let (_, settled) = frame(&ctx, vec![button(end, false)], &mut step);
        assert!(settled);
    }
}
