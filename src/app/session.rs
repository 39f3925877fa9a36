use eframe::egui;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::bridge::{AnalysisBridge, BridgeEvent, DetectorCoordinates, SequenceTracker, Upload};
use crate::error::{EditorError, Result};
use crate::geometry::ViewTransform;
use crate::model::{AnalysisMode, AnalysisResult, Joint, KeypointSet, MetricReading, Point};
use crate::store::{EditSpace, KeypointStore};

use super::export;
use super::interaction::{Edit, InteractionController};
use super::render::RenderStyle;

const TOAST_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Empty,
    Uploading,
    Editing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ToastKind {
    Success,
    Error,
}

#[derive(Clone, Debug)]
pub(crate) struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub created: Instant,
}

pub(crate) struct LoadedImage {
    pub path: PathBuf,
    pub pixels: RgbaImage,
    /// Bumped on every new image so the UI knows to re-upload its texture.
    pub generation: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnalysisReport {
    pub mode: AnalysisMode,
    pub result: AnalysisResult,
}

impl AnalysisReport {
    pub fn readings(&self) -> Vec<MetricReading> {
        self.result.readings(self.mode)
    }
}

pub(crate) struct SessionConfig {
    pub max_display: egui::Vec2,
    pub move_step: f32,
    pub step_space: EditSpace,
    pub analysis_mode: AnalysisMode,
    pub detector_coordinates: DetectorCoordinates,
}

/// One image, its keypoints, and everything that happens to them between
/// upload and export.
pub(crate) struct Session {
    pub store: KeypointStore,
    pub controller: InteractionController,
    pub style: RenderStyle,
    phase: Phase,
    image: Option<LoadedImage>,
    pending: Option<LoadedImage>,
    view: Option<ViewTransform>,
    max_display: egui::Vec2,
    analysis_mode: AnalysisMode,
    detector_coordinates: DetectorCoordinates,
    tracker: SequenceTracker,
    analysis_requested: bool,
    report: Option<AnalysisReport>,
    detecting: bool,
    next_generation: u64,
    toasts: Vec<Toast>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let style = RenderStyle::default();
        Self {
            store: KeypointStore::new(),
            controller: InteractionController::new(
                config.move_step,
                config.step_space,
                style.hit_radius(),
            ),
            style,
            phase: Phase::Empty,
            image: None,
            pending: None,
            view: None,
            max_display: config.max_display,
            analysis_mode: config.analysis_mode,
            detector_coordinates: config.detector_coordinates,
            tracker: SequenceTracker::default(),
            analysis_requested: false,
            report: None,
            detecting: false,
            next_generation: 1,
            toasts: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    pub fn view(&self) -> Option<&ViewTransform> {
        self.view.as_ref()
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn analysis_mode(&self) -> AnalysisMode {
        self.analysis_mode
    }

    pub fn is_analyzing(&self) -> bool {
        self.tracker.is_busy()
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    /// Manual analysis is offered once an image is loaded and no analysis is
    /// already outstanding.
    pub fn can_analyze(&self) -> bool {
        self.phase == Phase::Editing && !self.store.keypoints().is_empty() && !self.is_analyzing()
    }

    /// Present joints in canonical order; one button or dropdown entry each.
    pub fn joint_choices(&self) -> Vec<Joint> {
        self.store.keypoints().present().collect()
    }

    /// Rows of the batch table, in canonical order.
    pub fn batch_rows(&self) -> Vec<(Joint, Point)> {
        self.store.keypoints().iter().collect()
    }

    pub fn toasts(&self) -> &[Toast] {
        &self.toasts
    }

    pub fn notify(&mut self, kind: ToastKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            ToastKind::Success => log::info!("{message}"),
            ToastKind::Error => log::warn!("{message}"),
        }
        self.toasts.push(Toast {
            message,
            kind,
            created: Instant::now(),
        });
    }

    pub fn report_error(&mut self, err: &EditorError) {
        if err.is_user_visible() {
            self.notify(ToastKind::Error, err.to_string());
        } else {
            log::debug!("{err}");
        }
    }

    pub fn prune_toasts(&mut self, now: Instant) {
        self.toasts
            .retain(|t| now.saturating_duration_since(t.created) < TOAST_LIFETIME);
    }

    /// Changes the display envelope, e.g. when the window is resized.
    pub fn set_max_display(&mut self, max_display: egui::Vec2) {
        if self.max_display != max_display {
            self.max_display = max_display;
            self.relayout();
        }
    }

    fn relayout(&mut self) {
        self.view = self.image.as_ref().map(|img| {
            let (w, h) = img.pixels.dimensions();
            ViewTransform::fit(w as f32, h as f32, self.max_display.x, self.max_display.y)
        });
    }

    /// Decodes the file locally and sends it to the upload service.
    pub fn begin_upload(&mut self, path: &Path, bridge: &AnalysisBridge) -> Result<()> {
        if self.phase == Phase::Uploading {
            return Err(EditorError::Input("An upload is already in progress".into()));
        }
        let pixels = decode_image(path)?;
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending = Some(LoadedImage {
            path: path.to_path_buf(),
            pixels,
            generation,
        });
        self.phase = Phase::Uploading;
        bridge.upload(path.to_path_buf());
        Ok(())
    }

    pub fn apply(&mut self, event: BridgeEvent, bridge: &AnalysisBridge) {
        match event {
            BridgeEvent::Uploaded(Ok(upload)) => self.finish_upload(upload),
            BridgeEvent::Uploaded(Err(err)) => {
                self.pending = None;
                self.phase = if self.image.is_some() {
                    Phase::Editing
                } else {
                    Phase::Empty
                };
                self.report_error(&err);
            }
            BridgeEvent::Detected { generation, result } => {
                if self.image.as_ref().map(|img| img.generation) != Some(generation) {
                    log::debug!("Dropping detection for replaced image #{generation}");
                    return;
                }
                self.detecting = false;
                match result {
                    Ok(joints) => self.merge_detection(joints, bridge),
                    Err(err) => self.report_error(&err),
                }
            }
            BridgeEvent::Analyzed { seq, result } => {
                if let Err(stale) = self.tracker.accept(seq) {
                    self.report_error(&stale);
                    return;
                }
                match result {
                    Ok(result) => {
                        log::info!("Analysis #{seq} applied");
                        self.report = Some(AnalysisReport {
                            mode: self.analysis_mode,
                            result,
                        });
                    }
                    Err(err) => self.report_error(&err),
                }
            }
        }
    }

    fn finish_upload(&mut self, upload: Upload) {
        let Some(image) = self.pending.take().filter(|p| p.path == upload.path) else {
            log::warn!("Upload of {} finished with no pending image", upload.path.display());
            return;
        };
        let (w, h) = image.pixels.dimensions();
        if let Some((sw, sh)) = upload.image_size.filter(|s| *s != (w, h)) {
            log::warn!("Service reports {sw}x{sh} but the file decodes to {w}x{h}");
        }
        if let Some(url) = &upload.image_url {
            log::debug!("Stored at {url}");
        }
        let count = upload.keypoints.len();
        self.store
            .seed(upload.keypoints, egui::vec2(w as f32, h as f32));
        self.image = Some(image);
        self.relayout();
        self.phase = Phase::Editing;
        // Nothing asked about the previous image applies to this one.
        self.tracker.supersede();
        self.detecting = false;
        self.analysis_requested = false;
        self.report = None;
        log::info!("Loaded {}x{} image with {count} joints", w, h);
        self.notify(
            ToastKind::Success,
            "Image uploaded. Adjust the joints, then analyze.",
        );
    }

    fn merge_detection(&mut self, joints: KeypointSet, bridge: &AnalysisBridge) {
        let size = self.store.image_size();
        let joints = crate::bridge::to_image_space(joints, self.detector_coordinates, size.x, size.y);
        if joints.is_empty() {
            self.notify(ToastKind::Error, "No joints detected");
            return;
        }
        let before = self.store.snapshot();
        self.store.merge(&joints);
        self.notify(
            ToastKind::Success,
            format!("Detected {} joints", joints.len()),
        );
        if self.store.commit(before) {
            self.after_edit(Ok(Edit::Commit), bridge);
        }
    }

    pub fn request_detect(&mut self, bridge: &AnalysisBridge) -> Result<()> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| EditorError::Input("Load an image first".into()))?;
        let mut png = Vec::new();
        image
            .pixels
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
        self.detecting = true;
        bridge.detect(image.generation, png);
        Ok(())
    }

    /// Sends the current keypoints for analysis. Only the newest request's
    /// response will be shown.
    pub fn request_analysis(&mut self, bridge: &AnalysisBridge) -> Result<()> {
        if self.phase != Phase::Editing || self.store.keypoints().is_empty() {
            return Err(EditorError::Input("Load an image first".into()));
        }
        let seq = self.tracker.issue();
        self.analysis_requested = true;
        bridge.analyze(seq, self.store.keypoints().clone(), self.analysis_mode);
        Ok(())
    }

    pub fn set_analysis_mode(&mut self, mode: AnalysisMode, bridge: &AnalysisBridge) {
        if self.analysis_mode == mode {
            return;
        }
        self.analysis_mode = mode;
        self.report = None;
        if self.analysis_requested {
            self.rerun_analysis(bridge);
        }
    }

    /// Shared tail of every interaction: surface errors, and after a
    /// committed edit re-run analysis if the user has analyzed before.
    pub fn after_edit(&mut self, result: Result<Edit>, bridge: &AnalysisBridge) -> Edit {
        match result {
            Ok(Edit::Commit) => {
                if self.analysis_requested {
                    self.rerun_analysis(bridge);
                }
                Edit::Commit
            }
            Ok(edit) => edit,
            Err(err) => {
                self.report_error(&err);
                Edit::None
            }
        }
    }

    fn rerun_analysis(&mut self, bridge: &AnalysisBridge) {
        if self.phase == Phase::Uploading {
            // The result would be thrown away when the new image lands.
            log::debug!("Upload in progress; not re-analyzing");
            return;
        }
        if let Err(err) = self.request_analysis(bridge) {
            self.report_error(&err);
        }
    }

    /// Writes the photo with skeleton and markers at original resolution.
    pub fn export(&self, path: &Path) -> Result<()> {
        let (Some(image), Some(view)) = (&self.image, &self.view) else {
            return Err(EditorError::Input("Nothing to export yet".into()));
        };
        let annotated = export::render_annotated(
            &image.pixels,
            self.store.keypoints(),
            self.store.selected_joint(),
            &self.style,
            view.sx.min(view.sy),
        )?;
        export::save_png(&annotated, path)
    }
}

fn decode_image(path: &Path) -> Result<RgbaImage> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    if reader.format().is_none() {
        return Err(EditorError::Input(format!(
            "{} is not an image file",
            path.display()
        )));
    }
    Ok(reader.decode()?.to_rgba8())
}
