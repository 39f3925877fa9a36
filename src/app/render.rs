use crate::geometry::ViewTransform;
use crate::model::{self, Joint, KeypointSet};
use crate::skeleton;
use eframe::egui;

use super::InteractionMode;

/// Something the scene can be drawn onto: the live canvas or the export
/// pixmap. Coordinates are relative to the surface's own top-left corner.
pub(crate) trait Surface {
    type Image: ?Sized;

    fn clear(&mut self, size: egui::Vec2);
    fn image(&mut self, image: &Self::Image, size: egui::Vec2);
    fn line(&mut self, a: egui::Pos2, b: egui::Pos2, stroke: egui::Stroke);
    fn circle(&mut self, center: egui::Pos2, radius: f32, fill: egui::Color32, stroke: egui::Stroke);
    fn label(&mut self, center: egui::Pos2, text: &str, size: f32, color: egui::Color32);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RenderStyle {
    pub bone: egui::Stroke,
    pub marker_radius: f32,
    pub selected_radius: f32,
    pub marker_fill: egui::Color32,
    pub selected_fill: egui::Color32,
    pub marker_outline: egui::Stroke,
    pub label_size: f32,
    pub label_color: egui::Color32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            bone: egui::Stroke::new(3.0, egui::Color32::from_rgb(255, 0, 0)),
            marker_radius: 8.0,
            selected_radius: 12.0,
            marker_fill: egui::Color32::from_rgb(255, 255, 0),
            selected_fill: egui::Color32::from_rgb(0, 255, 0),
            marker_outline: egui::Stroke::new(2.0, egui::Color32::from_rgb(255, 0, 0)),
            label_size: 12.0,
            label_color: egui::Color32::BLACK,
        }
    }
}

impl RenderStyle {
    /// Same style with every size multiplied by `factor`, for drawing at a
    /// different resolution than the screen.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            bone: egui::Stroke::new(self.bone.width * factor, self.bone.color),
            marker_radius: self.marker_radius * factor,
            selected_radius: self.selected_radius * factor,
            marker_outline: egui::Stroke::new(
                self.marker_outline.width * factor,
                self.marker_outline.color,
            ),
            label_size: self.label_size * factor,
            ..*self
        }
    }

    /// Grab radius for dragging a marker, a little larger than the marker.
    pub fn hit_radius(&self) -> f32 {
        self.selected_radius + 2.0
    }
}

/// Draws image, bones and joint markers. Markers go in canonical joint order
/// so identical inputs always produce the same sequence of draw calls.
pub(crate) fn draw_scene<S: Surface>(
    surface: &mut S,
    image: &S::Image,
    keypoints: &KeypointSet,
    selection: Option<Joint>,
    view: &ViewTransform,
    style: &RenderStyle,
) {
    surface.clear(view.display_size);
    surface.image(image, view.display_size);

    for (a, b) in skeleton::resolved_edges(keypoints) {
        let (Some(pa), Some(pb)) = (keypoints.get(a), keypoints.get(b)) else {
            continue;
        };
        surface.line(view.to_display(pa), view.to_display(pb), style.bone);
    }

    for (joint, p) in keypoints.iter() {
        let center = view.to_display(p);
        let selected = selection == Some(joint);
        let (radius, fill) = if selected {
            (style.selected_radius, style.selected_fill)
        } else {
            (style.marker_radius, style.marker_fill)
        };
        surface.circle(center, radius, fill, style.marker_outline);
        surface.label(
            center,
            &joint.order().to_string(),
            style.label_size,
            style.label_color,
        );
    }
}

/// Live canvas backed by an egui painter.
pub(super) struct EguiSurface<'a> {
    painter: &'a egui::Painter,
    origin: egui::Pos2,
}

impl<'a> EguiSurface<'a> {
    pub fn new(painter: &'a egui::Painter, origin: egui::Pos2) -> Self {
        Self { painter, origin }
    }
}

impl Surface for EguiSurface<'_> {
    type Image = egui::TextureHandle;

    fn clear(&mut self, size: egui::Vec2) {
        let bg = self.painter.ctx().style().visuals.extreme_bg_color;
        self.painter
            .rect_filled(egui::Rect::from_min_size(self.origin, size), 0.0, bg);
    }

    fn image(&mut self, image: &egui::TextureHandle, size: egui::Vec2) {
        self.painter.image(
            image.id(),
            egui::Rect::from_min_size(self.origin, size),
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }

    fn line(&mut self, a: egui::Pos2, b: egui::Pos2, stroke: egui::Stroke) {
        let offset = self.origin.to_vec2();
        self.painter.line_segment([a + offset, b + offset], stroke);
    }

    fn circle(&mut self, center: egui::Pos2, radius: f32, fill: egui::Color32, stroke: egui::Stroke) {
        self.painter
            .circle(center + self.origin.to_vec2(), radius, fill, stroke);
    }

    fn label(&mut self, center: egui::Pos2, text: &str, size: f32, color: egui::Color32) {
        self.painter.text(
            center + self.origin.to_vec2(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(size),
            color,
        );
    }
}

pub(super) fn mode_button(
    ui: &mut egui::Ui,
    label: &str,
    mode: InteractionMode,
    selected: &mut InteractionMode,
) {
    let active = *selected == mode;
    if ui.selectable_label(active, label).clicked() {
        *selected = mode;
    }
}

pub(super) fn metric_card(ui: &mut egui::Ui, reading: &model::MetricReading) {
    let (color, status) = match reading.status {
        model::MetricStatus::Ideal => (egui::Color32::from_rgb(40, 167, 69), "ideal"),
        model::MetricStatus::NeedsWork => (egui::Color32::from_rgb(220, 53, 69), "needs work"),
        model::MetricStatus::NotMeasurable => (egui::Color32::GRAY, ""),
    };
    let range = reading.metric.ideal_range();
    egui::Frame::group(ui.style())
        .stroke(egui::Stroke::new(1.0, color))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.label(reading.metric.label());
            ui.label(
                egui::RichText::new(reading.value_text())
                    .size(20.0)
                    .strong(),
            );
            if !status.is_empty() {
                ui.colored_label(
                    color,
                    format!("{status} (ideal {:.0}-{:.0}°)", range.start(), range.end()),
                );
            }
        });
}
