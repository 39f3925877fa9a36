use crate::model::{AnalysisMode, Joint};
use eframe::egui;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use super::{InteractionMode, PoseApp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CommandId {
    Mode(InteractionMode),
    Select(Joint),
    ClearSelection,
    AnalysisSet,
    AnalysisTakeoff,
    Analyze,
    Detect,
    OpenImage,
    Export,
    Undo,
    Redo,
    Help,
}

pub(super) struct CommandSpec {
    pub id: CommandId,
    pub name: &'static str,
    pub search: &'static str,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec { id: CommandId::Mode(InteractionMode::Click), name: "Mode: Click to place", search: "mode click place" },
    CommandSpec { id: CommandId::Mode(InteractionMode::Drag), name: "Mode: Drag", search: "mode drag move" },
    CommandSpec { id: CommandId::Mode(InteractionMode::Direction), name: "Mode: Direction pad", search: "mode direction pad nudge arrows" },
    CommandSpec { id: CommandId::Mode(InteractionMode::Dropdown), name: "Mode: Dropdown", search: "mode dropdown list" },
    CommandSpec { id: CommandId::Mode(InteractionMode::Batch), name: "Mode: Batch table", search: "mode batch table coordinates" },
    CommandSpec { id: CommandId::Select(Joint::LShoulder), name: "Select: 1. Left shoulder", search: "select 1 left shoulder" },
    CommandSpec { id: CommandId::Select(Joint::RShoulder), name: "Select: 2. Right shoulder", search: "select 2 right shoulder" },
    CommandSpec { id: CommandId::Select(Joint::LHip), name: "Select: 3. Left hip", search: "select 3 left hip" },
    CommandSpec { id: CommandId::Select(Joint::RHip), name: "Select: 4. Right hip", search: "select 4 right hip" },
    CommandSpec { id: CommandId::Select(Joint::LKnee), name: "Select: 5. Left knee", search: "select 5 left knee" },
    CommandSpec { id: CommandId::Select(Joint::RKnee), name: "Select: 6. Right knee", search: "select 6 right knee" },
    CommandSpec { id: CommandId::Select(Joint::LAnkle), name: "Select: 7. Left ankle", search: "select 7 left ankle" },
    CommandSpec { id: CommandId::Select(Joint::RAnkle), name: "Select: 8. Right ankle", search: "select 8 right ankle" },
    CommandSpec { id: CommandId::Select(Joint::C7), name: "Select: 9. C7 vertebra", search: "select 9 c7 vertebra neck spine" },
    CommandSpec { id: CommandId::ClearSelection, name: "Select: None", search: "select none clear deselect" },
    CommandSpec { id: CommandId::AnalysisSet, name: "Analysis: Set position", search: "analysis set position mode" },
    CommandSpec { id: CommandId::AnalysisTakeoff, name: "Analysis: Takeoff", search: "analysis takeoff mode" },
    CommandSpec { id: CommandId::Analyze, name: "Analysis: Run", search: "analyze run angles" },
    CommandSpec { id: CommandId::Detect, name: "Analysis: Re-detect joints", search: "detect redetect joints pose" },
    CommandSpec { id: CommandId::OpenImage, name: "File: Open image", search: "open upload image photo file" },
    CommandSpec { id: CommandId::Export, name: "File: Export PNG", search: "export save png result" },
    CommandSpec { id: CommandId::Undo, name: "Edit: Undo", search: "undo" },
    CommandSpec { id: CommandId::Redo, name: "Edit: Redo", search: "redo" },
    CommandSpec { id: CommandId::Help, name: "Help: Shortcuts", search: "help shortcuts keys" },
];

/// Palette state between frames. `selected` indexes the ranked list of the
/// current query, not [`COMMANDS`].
#[derive(Default)]
pub(super) struct CommandPalette {
    pub open: bool,
    pub query: String,
    pub selected: usize,
    request_focus: bool,
}

#[derive(Clone, Copy, Default)]
pub(super) struct CommandContext {
    pub has_image: bool,
    pub uploading: bool,
    pub can_analyze: bool,
    pub detecting: bool,
    pub has_undo: bool,
    pub has_redo: bool,
    pub has_selection: bool,
    /// Bit per joint present, indexed by canonical order.
    pub present: [bool; 9],
}

impl CommandContext {
    fn allows(&self, id: CommandId) -> bool {
        match id {
            CommandId::Undo => self.has_undo,
            CommandId::Redo => self.has_redo,
            CommandId::Select(joint) => self.present[joint.order() - 1],
            CommandId::ClearSelection => self.has_selection,
            CommandId::Analyze => self.can_analyze,
            CommandId::Detect => self.has_image && !self.detecting,
            CommandId::Export => self.has_image,
            CommandId::OpenImage => !self.uploading,
            CommandId::Mode(_)
            | CommandId::AnalysisSet
            | CommandId::AnalysisTakeoff
            | CommandId::Help => true,
        }
    }
}

/// One row of the palette list.
#[derive(Clone, Copy)]
struct Ranked {
    spec: &'static CommandSpec,
    enabled: bool,
}

impl CommandPalette {
    pub fn open(&mut self, query: impl Into<String>) {
        self.open = true;
        self.query = query.into();
        self.selected = 0;
        self.request_focus = true;
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }

    pub(super) fn execute(app: &mut PoseApp, ctx: &egui::Context, id: CommandId) {
        match id {
            CommandId::Mode(mode) => app.set_mode(mode),
            CommandId::Select(joint) => app.select_joint(joint),
            CommandId::ClearSelection => {
                if let Err(e) = app.session.store.select(None) {
                    app.session.report_error(&e);
                }
            }
            CommandId::AnalysisSet => app.set_analysis_mode(AnalysisMode::Set),
            CommandId::AnalysisTakeoff => app.set_analysis_mode(AnalysisMode::Takeoff),
            CommandId::Analyze => app.analyze(),
            CommandId::Detect => app.detect(),
            CommandId::OpenImage => app.open_image_dialog(),
            CommandId::Export => app.export_dialog(),
            CommandId::Undo => app.undo(),
            CommandId::Redo => app.redo(),
            CommandId::Help => app.show_help = true,
        }
        ctx.request_repaint();
    }

    /// Commands matching the query. Runnable ones come first, best match
    /// first; the rest follow greyed out so the user can see why a command
    /// is missing.
    fn ranked(&self, cx: CommandContext) -> Vec<Ranked> {
        let matcher = SkimMatcherV2::default();
        let q = self.query.trim();
        let mut out: Vec<(Ranked, i64)> = COMMANDS
            .iter()
            .filter_map(|spec| {
                let score = if q.is_empty() {
                    0
                } else {
                    matcher.fuzzy_match(spec.search, q)?
                };
                let enabled = cx.allows(spec.id);
                Some((Ranked { spec, enabled }, score))
            })
            .collect();
        // Stable, so an empty query keeps table order within each group.
        out.sort_by(|(a, sa), (b, sb)| b.enabled.cmp(&a.enabled).then(sb.cmp(sa)));
        out.into_iter().map(|(r, _)| r).collect()
    }

    /// Moves the highlight to the next runnable row in `forward` direction,
    /// staying put at either end.
    fn step(&mut self, rows: &[Ranked], forward: bool) {
        let next = if forward {
            (self.selected + 1..rows.len()).find(|&i| rows[i].enabled)
        } else {
            (0..self.selected).rev().find(|&i| rows[i].enabled)
        };
        if let Some(i) = next {
            self.selected = i;
        }
    }

    pub fn ui(&mut self, ctx: &egui::Context, cx: CommandContext) -> Option<CommandId> {
        if !self.open {
            return None;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.close();
            return None;
        }
        let rows = self.ranked(cx);
        self.selected = self.selected.min(rows.len().saturating_sub(1));
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowDown)) {
            self.step(&rows, true);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowUp)) {
            self.step(&rows, false);
        }
        let mut chosen = ctx
            .input(|i| i.key_pressed(egui::Key::Enter))
            .then_some(self.selected);

        let screen = ctx.content_rect();
        let size = egui::vec2(420.0, 360.0);
        egui::Area::new(egui::Id::new("command_palette"))
            .fixed_pos(egui::pos2(screen.center().x - size.x * 0.5, screen.top() + 40.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_min_size(size);
                    let query = ui.add(
                        egui::TextEdit::singleline(&mut self.query)
                            .desired_width(f32::INFINITY)
                            .hint_text("Mode, joint, analysis, file…"),
                    );
                    if std::mem::take(&mut self.request_focus) {
                        query.request_focus();
                    }
                    if query.changed() {
                        self.selected = 0;
                    }
                    ui.separator();
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        for (idx, row) in rows.iter().enumerate() {
                            let button =
                                egui::Button::new(row.spec.name).selected(idx == self.selected);
                            if ui.add_enabled(row.enabled, button).clicked() {
                                chosen = Some(idx);
                            }
                        }
                    });
                });
            });

        let cmd = chosen
            .and_then(|idx| rows.get(idx))
            .filter(|row| row.enabled)
            .map(|row| row.spec.id)?;
        self.close();
        Some(cmd)
    }
}
