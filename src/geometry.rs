use crate::model::{Joint, KeypointSet, Point};
use eframe::egui;

/// Mapping from image space (original pixels) to display space (the
/// possibly downscaled canvas). Recomputed whenever the image or the
/// display envelope changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ViewTransform {
    pub image_size: egui::Vec2,
    pub display_size: egui::Vec2,
    pub sx: f32,
    pub sy: f32,
}

impl ViewTransform {
    /// Fits the image into `max_width` x `max_height`, never upscaling.
    ///
    /// Width is constrained first and height re-checked afterwards, shrinking
    /// the already width-fitted size. This two-step clamp is kept as-is so
    /// stored display coordinates stay reproducible.
    pub fn fit(image_width: f32, image_height: f32, max_width: f32, max_height: f32) -> Self {
        if image_width <= 0.0 || image_height <= 0.0 {
            return Self::identity(image_width.max(0.0), image_height.max(0.0));
        }
        let mut width = image_width;
        let mut height = image_height;
        if width > max_width {
            width = max_width;
            height = image_height * max_width / image_width;
        }
        if height > max_height {
            width = width * max_height / height;
            height = max_height;
        }
        Self {
            image_size: egui::vec2(image_width, image_height),
            display_size: egui::vec2(width, height),
            sx: width / image_width,
            sy: height / image_height,
        }
    }

    pub fn identity(width: f32, height: f32) -> Self {
        Self {
            image_size: egui::vec2(width, height),
            display_size: egui::vec2(width, height),
            sx: 1.0,
            sy: 1.0,
        }
    }

    pub fn to_display(&self, p: Point) -> egui::Pos2 {
        egui::pos2(p.x * self.sx, p.y * self.sy)
    }

    pub fn to_image(&self, p: egui::Pos2) -> Point {
        Point::new(p.x / self.sx, p.y / self.sy)
    }

    pub fn display_rect(&self) -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::ZERO, self.display_size)
    }

    pub fn image_rect(&self) -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::ZERO, self.image_size)
    }
}

/// Compass directions of the nudge pad. Diagonals move one step on each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
    Center,
}

impl Direction {
    /// Pad layout, row by row.
    pub const PAD: [[Direction; 3]; 3] = [
        [Direction::NW, Direction::N, Direction::NE],
        [Direction::W, Direction::Center, Direction::E],
        [Direction::SW, Direction::S, Direction::SE],
    ];

    pub fn delta(self, step: f32) -> egui::Vec2 {
        let (x, y) = match self {
            Direction::N => (0.0, -1.0),
            Direction::NE => (1.0, -1.0),
            Direction::E => (1.0, 0.0),
            Direction::SE => (1.0, 1.0),
            Direction::S => (0.0, 1.0),
            Direction::SW => (-1.0, 1.0),
            Direction::W => (-1.0, 0.0),
            Direction::NW => (-1.0, -1.0),
            Direction::Center => (0.0, 0.0),
        };
        egui::vec2(x, y) * step
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::N => Direction::S,
            Direction::NE => Direction::SW,
            Direction::E => Direction::W,
            Direction::SE => Direction::NW,
            Direction::S => Direction::N,
            Direction::SW => Direction::NE,
            Direction::W => Direction::E,
            Direction::NW => Direction::SE,
            Direction::Center => Direction::Center,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Direction::N => "↑",
            Direction::NE => "↗",
            Direction::E => "→",
            Direction::SE => "↘",
            Direction::S => "↓",
            Direction::SW => "↙",
            Direction::W => "←",
            Direction::NW => "↖",
            Direction::Center => "·",
        }
    }
}

pub(crate) fn clamp_to_rect(p: egui::Pos2, rect: egui::Rect) -> egui::Pos2 {
    egui::pos2(
        p.x.clamp(rect.min.x, rect.max.x),
        p.y.clamp(rect.min.y, rect.max.y),
    )
}

/// Joint whose marker contains `display_pos`. Among overlapping markers the
/// closest wins, and on a tie the one drawn last (later in canonical order).
pub(crate) fn hit_test_joint(
    keypoints: &KeypointSet,
    view: &ViewTransform,
    display_pos: egui::Pos2,
    radius: f32,
) -> Option<Joint> {
    let mut best: Option<(Joint, f32)> = None;
    for (joint, p) in keypoints.iter() {
        let d = view.to_display(p).distance(display_pos);
        if d > radius {
            continue;
        }
        if best.is_none_or(|(_, bd)| d <= bd) {
            best = Some((joint, d));
        }
    }
    best.map(|(j, _)| j)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_image_is_identity() {
        let vt = ViewTransform::fit(640.0, 480.0, 800.0, 600.0);
        assert_eq!(vt.display_size, egui::vec2(640.0, 480.0));
        assert_eq!((vt.sx, vt.sy), (1.0, 1.0));
    }

    #[test]
    fn wide_image_is_width_constrained() {
        let vt = ViewTransform::fit(1600.0, 900.0, 800.0, 600.0);
        assert_eq!(vt.display_size, egui::vec2(800.0, 450.0));
        assert!((vt.sx - 0.5).abs() < 1e-6);
        assert!((vt.sy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tall_image_goes_through_both_passes() {
        // 2000x3000: width pass gives 800x1200, height pass gives 400x600.
        let vt = ViewTransform::fit(2000.0, 3000.0, 800.0, 600.0);
        assert!((vt.display_size.x - 400.0).abs() < 1e-3);
        assert!((vt.display_size.y - 600.0).abs() < 1e-3);
        assert!((vt.sx - vt.sy).abs() < 1e-6);
    }

    #[test]
    fn height_only_overflow() {
        let vt = ViewTransform::fit(500.0, 1000.0, 800.0, 600.0);
        assert!((vt.display_size.x - 300.0).abs() < 1e-3);
        assert_eq!(vt.display_size.y, 600.0);
    }

    #[test]
    fn display_round_trip() {
        let transforms = [
            ViewTransform::fit(4032.0, 3024.0, 800.0, 600.0),
            ViewTransform::fit(333.0, 777.0, 800.0, 600.0),
            ViewTransform::identity(10.0, 10.0),
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(123.4, 567.8),
            Point::new(4031.0, 3023.0),
        ];
        for vt in &transforms {
            for p in points {
                let back = vt.to_image(vt.to_display(p));
                assert!((back.x - p.x).abs() < 1e-2, "{p:?} -> {back:?}");
                assert!((back.y - p.y).abs() < 1e-2, "{p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn zero_sized_image_does_not_divide_by_zero() {
        let vt = ViewTransform::fit(0.0, 0.0, 800.0, 600.0);
        assert_eq!((vt.sx, vt.sy), (1.0, 1.0));
    }

    #[test]
    fn directions_mirror() {
        for row in Direction::PAD {
            for d in row {
                assert_eq!(d.delta(5.0) + d.opposite().delta(5.0), egui::Vec2::ZERO);
            }
        }
        assert_eq!(Direction::Center.delta(5.0), egui::Vec2::ZERO);
    }

    #[test]
    fn hit_test_prefers_closest_marker() {
        let mut set = KeypointSet::new();
        set.insert(Joint::LKnee, Point::new(100.0, 100.0));
        set.insert(Joint::RKnee, Point::new(110.0, 100.0));
        let vt = ViewTransform::identity(200.0, 200.0);
        assert_eq!(
            hit_test_joint(&set, &vt, egui::pos2(108.0, 100.0), 10.0),
            Some(Joint::RKnee)
        );
        assert_eq!(
            hit_test_joint(&set, &vt, egui::pos2(101.0, 100.0), 10.0),
            Some(Joint::LKnee)
        );
        assert_eq!(hit_test_joint(&set, &vt, egui::pos2(150.0, 150.0), 10.0), None);
    }
}
