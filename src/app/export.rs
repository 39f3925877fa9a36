//! Rasterizes the annotated photo at its original resolution.
//!
//! Uses the same [`draw_scene`] as the live canvas, so topology, draw order
//! and styling cannot drift between screen and file.

use ab_glyph::{Font, FontRef, OutlineCurve, PxScale, ScaleFont};
use eframe::egui;
use image::RgbaImage;
use std::path::Path;
use tiny_skia::{
    Color, ColorU8, FillRule, LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform,
};

use crate::error::{EditorError, Result};
use crate::geometry::ViewTransform;
use crate::model::{Joint, KeypointSet};

use super::render::{RenderStyle, Surface, draw_scene};

pub(super) struct RasterSurface {
    pixmap: Pixmap,
    font: FontRef<'static>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| EditorError::Image(format!("cannot rasterize {width}x{height}")))?;
        let font = FontRef::try_from_slice(epaint_default_fonts::UBUNTU_LIGHT)
            .map_err(|e| EditorError::Image(format!("label font: {e}")))?;
        Ok(Self { pixmap, font })
    }

    pub fn into_rgba(self) -> RgbaImage {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let mut raw = Vec::with_capacity((w * h * 4) as usize);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(w, h, raw).unwrap_or_else(|| RgbaImage::new(w, h))
    }
}

fn paint(color: egui::Color32) -> Paint<'static> {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        ..Default::default()
    }
}

impl Surface for RasterSurface {
    type Image = RgbaImage;

    fn clear(&mut self, _size: egui::Vec2) {
        self.pixmap.fill(Color::TRANSPARENT);
    }

    fn image(&mut self, image: &RgbaImage, _size: egui::Vec2) {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let resized;
        let src = if image.dimensions() == (w, h) {
            image
        } else {
            resized = image::imageops::resize(image, w, h, image::imageops::FilterType::Triangle);
            &resized
        };
        for (dst, px) in self.pixmap.pixels_mut().iter_mut().zip(src.pixels()) {
            let [r, g, b, a] = px.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
    }

    fn line(&mut self, a: egui::Pos2, b: egui::Pos2, s: egui::Stroke) {
        let mut pb = PathBuilder::new();
        pb.move_to(a.x, a.y);
        pb.line_to(b.x, b.y);
        if let Some(path) = pb.finish() {
            self.pixmap.stroke_path(
                &path,
                &paint(s.color),
                &stroke(s.width),
                Transform::identity(),
                None,
            );
        }
    }

    fn circle(&mut self, center: egui::Pos2, radius: f32, fill: egui::Color32, s: egui::Stroke) {
        let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &paint(fill),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
        if s.width > 0.0 {
            self.pixmap.stroke_path(
                &path,
                &paint(s.color),
                &stroke(s.width),
                Transform::identity(),
                None,
            );
        }
    }

    fn label(&mut self, center: egui::Pos2, text: &str, size: f32, color: egui::Color32) {
        let scaled = self.font.as_scaled(PxScale::from(size));
        let width: f32 = text
            .chars()
            .map(|c| scaled.h_advance(self.font.glyph_id(c)))
            .sum();
        let baseline = center.y + (scaled.ascent() + scaled.descent()) * 0.5;
        let (hs, vs) = (scaled.h_scale_factor(), scaled.v_scale_factor());

        // Glyph outlines are in unscaled font units with y pointing up.
        let mut pb = PathBuilder::new();
        let mut pen_x = center.x - width * 0.5;
        for c in text.chars() {
            let id = self.font.glyph_id(c);
            if let Some(outline) = self.font.outline(id) {
                let map = |p: ab_glyph::Point| (pen_x + p.x * hs, baseline - p.y * vs);
                let mut last: Option<(f32, f32)> = None;
                for curve in &outline.curves {
                    let (start, end) = match curve {
                        OutlineCurve::Line(a, b) => (map(*a), map(*b)),
                        OutlineCurve::Quad(a, _, c) => (map(*a), map(*c)),
                        OutlineCurve::Cubic(a, _, _, d) => (map(*a), map(*d)),
                    };
                    if last != Some(start) {
                        pb.move_to(start.0, start.1);
                    }
                    match curve {
                        OutlineCurve::Line(..) => pb.line_to(end.0, end.1),
                        OutlineCurve::Quad(_, b, _) => {
                            let b = map(*b);
                            pb.quad_to(b.0, b.1, end.0, end.1);
                        }
                        OutlineCurve::Cubic(_, b, c, _) => {
                            let (b, c) = (map(*b), map(*c));
                            pb.cubic_to(b.0, b.1, c.0, c.1, end.0, end.1);
                        }
                    }
                    last = Some(end);
                }
            }
            pen_x += scaled.h_advance(id);
        }
        if let Some(path) = pb.finish() {
            self.pixmap.fill_path(
                &path,
                &paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }
}

/// Draws bones and markers over `image` at full resolution, highlighting
/// `selection` as the canvas does. `display_scale` is the on-screen scale
/// factor (the fit keeps aspect, so one number covers both axes); marker
/// sizes are divided by it so the file looks like what the user saw.
pub(crate) fn render_annotated(
    image: &RgbaImage,
    keypoints: &KeypointSet,
    selection: Option<Joint>,
    style: &RenderStyle,
    display_scale: f32,
) -> Result<RgbaImage> {
    let (w, h) = image.dimensions();
    let view = ViewTransform::identity(w as f32, h as f32);
    let style = style.scaled(1.0 / display_scale.max(f32::EPSILON));
    let mut surface = RasterSurface::new(w, h)?;
    draw_scene(&mut surface, image, keypoints, selection, &view, &style);
    Ok(surface.into_rgba())
}

pub(crate) fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    log::info!("Exported annotated image to {}", path.display());
    Ok(())
}
