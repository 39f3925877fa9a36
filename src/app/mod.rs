use crate::bridge::{AnalysisBridge, HttpPoseService, PoseService, Upload};
use crate::error::{EditorError, Result};
use crate::model::{AnalysisMode, AnalysisResult, Joint, KeypointSet, Point};
use eframe::egui;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod command_palette;
mod export;
mod help;
mod interaction;
mod render;
mod session;
mod settings;
mod update;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InteractionMode {
    Click,
    Drag,
    Direction,
    Dropdown,
    Batch,
}

impl InteractionMode {
    pub const ALL: [InteractionMode; 5] = [
        InteractionMode::Click,
        InteractionMode::Drag,
        InteractionMode::Direction,
        InteractionMode::Dropdown,
        InteractionMode::Batch,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InteractionMode::Click => "Click",
            InteractionMode::Drag => "Drag",
            InteractionMode::Direction => "Direction",
            InteractionMode::Dropdown => "Dropdown",
            InteractionMode::Batch => "Batch",
        }
    }
}

/// Text in the X/Y fields for the selected joint. Reloaded from the store
/// whenever it changes underneath, unless the user is typing.
#[derive(Default)]
struct CoordinateFields {
    x: String,
    y: String,
    error: Option<String>,
}

/// One editable row of the batch table.
struct BatchRow {
    joint: Joint,
    x: String,
    y: String,
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

fn coordinate_text(value: f32) -> String {
    format!("{}", value.round() as i64)
}

/// Settings file to read and later write back: the first candidate that
/// exists, else `settings.toml` so the first save creates it.
fn first_existing(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .find(|p| p.exists())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "settings.toml".to_string())
}

/// The file to open from a drop: the first one that lives on disk. Only one
/// image is edited at a time, so any others are ignored.
fn dropped_path(files: &[egui::DroppedFile]) -> Option<PathBuf> {
    let mut paths = files.iter().filter_map(|f| f.path.clone());
    let first = paths.next();
    let ignored = paths.count();
    if ignored > 0 {
        log::info!("Ignoring {ignored} more dropped file(s)");
    }
    first
}

pub struct PoseApp {
    session: session::Session,
    bridge: AnalysisBridge,
    settings: settings::AppSettings,
    settings_path: String,
    texture: Option<(u64, egui::TextureHandle)>,
    fields: CoordinateFields,
    batch: Vec<BatchRow>,
    synced_revision: Option<u64>,
    editing_fields: bool,
    command_palette: command_palette::CommandPalette,
    show_help: bool,
}

impl PoseApp {
    fn config_path() -> String {
        let mut candidates = Vec::new();
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".config").join("crouchpose.toml"));
        }
        candidates.push(PathBuf::from("settings.toml"));
        candidates.push(PathBuf::from("settings.json"));
        first_existing(&candidates)
    }

    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let settings_path = Self::config_path();
        let settings = settings::load_settings(&settings_path).unwrap_or_default();
        log::info!("Using pose service at {}", settings.server_url);

        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let service: Arc<dyn PoseService> =
            match HttpPoseService::new(&settings.server_url, timeout) {
                Ok(service) => Arc::new(service),
                Err(e) => {
                    log::error!("Cannot build HTTP client: {e}");
                    Arc::new(OfflineService(e.to_string()))
                }
            };
        let ctx = cc.egui_ctx.clone();
        let bridge = AnalysisBridge::new(service).with_notifier(move || ctx.request_repaint());

        let session = session::Session::new(session::SessionConfig {
            max_display: egui::vec2(settings.max_display_width, settings.max_display_height),
            move_step: settings.move_step,
            step_space: settings.step_space,
            analysis_mode: settings.analysis_mode,
            detector_coordinates: settings.detector_coordinates,
        });

        Self {
            session,
            bridge,
            settings,
            settings_path,
            texture: None,
            fields: CoordinateFields::default(),
            batch: Vec::new(),
            synced_revision: None,
            editing_fields: false,
            command_palette: command_palette::CommandPalette::default(),
            show_help: false,
        }
    }

    pub(super) fn open_image_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.open_image(&path);
        }
    }

    /// Starts uploading `path`, picked from the dialog or dropped on the window.
    pub(super) fn open_image(&mut self, path: &Path) {
        if let Err(e) = self.session.begin_upload(path, &self.bridge) {
            self.session.report_error(&e);
        }
    }

    pub(super) fn export_dialog(&mut self) {
        if self.session.image().is_none() {
            self.session
                .notify(session::ToastKind::Error, "Load an image before exporting");
            return;
        }
        if let Some(path) = rfd::FileDialog::new()
            .set_file_name(&self.settings.export_path)
            .add_filter("PNG", &["png"])
            .save_file()
        {
            match self.session.export(&path) {
                Ok(()) => self.session.notify(
                    session::ToastKind::Success,
                    format!("Saved {}", path.display()),
                ),
                Err(e) => self.session.report_error(&e),
            }
        }
    }

    pub(super) fn analyze(&mut self) {
        if !self.session.can_analyze() {
            return;
        }
        if let Err(e) = self.session.request_analysis(&self.bridge) {
            self.session.report_error(&e);
        }
    }

    pub(super) fn detect(&mut self) {
        if self.session.is_detecting() {
            return;
        }
        if let Err(e) = self.session.request_detect(&self.bridge) {
            self.session.report_error(&e);
        }
    }

    pub(super) fn undo(&mut self) {
        if self.session.store.undo() {
            self.session
                .after_edit(Ok(interaction::Edit::Commit), &self.bridge);
        }
    }

    pub(super) fn redo(&mut self) {
        if self.session.store.redo() {
            self.session
                .after_edit(Ok(interaction::Edit::Commit), &self.bridge);
        }
    }

    pub(super) fn set_mode(&mut self, mode: InteractionMode) {
        if self.session.controller.mode() == mode {
            return;
        }
        // A drag cut short by a mode switch still counts as an edit.
        let session = &mut self.session;
        let edit = session.controller.release(&mut session.store);
        session.after_edit(Ok(edit), &self.bridge);
        session.controller.set_mode(mode);
    }

    pub(super) fn select_joint(&mut self, joint: Joint) {
        let result = self.session.controller.choose(&mut self.session.store, joint);
        self.session.after_edit(result, &self.bridge);
    }

    pub(super) fn set_analysis_mode(&mut self, mode: AnalysisMode) {
        self.session.set_analysis_mode(mode, &self.bridge);
        if self.settings.analysis_mode != mode {
            self.settings.analysis_mode = mode;
            self.persist_settings();
        }
    }

    pub(super) fn persist_settings(&mut self) {
        self.settings.move_step = self.session.controller.step;
        self.settings.step_space = self.session.controller.step_space;
        if let Err(e) = settings::save_settings(&self.settings_path, &self.settings) {
            self.session.notify(
                session::ToastKind::Error,
                format!("Settings save failed: {e}"),
            );
        }
    }

    /// Refreshes the numeric fields and batch table from the store after it
    /// changed by some other route. Skipped while a field has focus so
    /// typing is not overwritten.
    fn sync_fields(&mut self) {
        let revision = self.session.store.revision();
        if self.synced_revision == Some(revision) || self.editing_fields {
            return;
        }
        self.synced_revision = Some(revision);
        self.fields.error = None;
        let selected = self.session.store.selected_joint();
        let point = selected.and_then(|j| self.session.store.get(j));
        self.fields.x = point.map(|p| coordinate_text(p.x)).unwrap_or_default();
        self.fields.y = point.map(|p| coordinate_text(p.y)).unwrap_or_default();
        self.batch = self
            .session
            .batch_rows()
            .into_iter()
            .map(|(joint, p): (Joint, Point)| BatchRow {
                joint,
                x: coordinate_text(p.x),
                y: coordinate_text(p.y),
            })
            .collect();
    }
}

/// Stands in when the HTTP client cannot be built, so every request fails
/// with the same reason instead of the app refusing to start.
struct OfflineService(String);

impl PoseService for OfflineService {
    fn upload(&self, _path: &Path) -> Result<Upload> {
        Err(EditorError::Network(self.0.clone()))
    }

    fn detect(&self, _png: Vec<u8>) -> Result<KeypointSet> {
        Err(EditorError::Network(self.0.clone()))
    }

    fn analyze(&self, _keypoints: &KeypointSet, _mode: AnalysisMode) -> Result<AnalysisResult> {
        Err(EditorError::Network(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_display_as_whole_pixels() {
        assert_eq!(coordinate_text(12.4), "12");
        assert_eq!(coordinate_text(12.5), "13");
        assert_eq!(coordinate_text(0.0), "0");
    }

    #[test]
    fn settings_path_is_the_file_that_exists() {
        let dir = std::env::temp_dir().join(format!("crouchpose-{}-cfg", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let toml = dir.join("settings.toml");
        let json = dir.join("settings.json");
        std::fs::write(&json, "{}").unwrap();
        let candidates = [toml.clone(), json.clone()];
        assert_eq!(first_existing(&candidates), json.display().to_string());

        std::fs::remove_file(&json).unwrap();
        assert_eq!(first_existing(&candidates), "settings.toml");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn drop_opens_first_file_with_a_path() {
        let files = vec![
            egui::DroppedFile {
                name: "clipboard.png".into(),
                ..Default::default()
            },
            egui::DroppedFile {
                path: Some(PathBuf::from("/tmp/start.jpg")),
                ..Default::default()
            },
            egui::DroppedFile {
                path: Some(PathBuf::from("/tmp/other.jpg")),
                ..Default::default()
            },
        ];
        assert_eq!(dropped_path(&files), Some(PathBuf::from("/tmp/start.jpg")));
        assert_eq!(dropped_path(&[]), None);
    }

    #[test]
    fn mode_labels_are_distinct() {
        let labels: std::collections::BTreeSet<_> =
            InteractionMode::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(labels.len(), InteractionMode::ALL.len());
    }
}
