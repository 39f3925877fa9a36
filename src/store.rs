use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::geometry::{ViewTransform, clamp_to_rect};
use crate::model::{Joint, KeypointSet, Point};

/// Coordinate space an edit is expressed in. Decides both how a delta is
/// applied and which bounds the result is clamped to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditSpace {
    #[default]
    Display,
    Image,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Keypoints and selection as they were before an edit. Handed back to
/// [`KeypointStore::commit`] once the edit is done.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    keypoints: KeypointSet,
    selected: Option<Joint>,
}

/// Owns the keypoint set and the selection for the editing session.
///
/// Positions are image-space only. Every mutation bumps `revision`, which the
/// UI compares against to know the canvas and the entry fields are stale.
#[derive(Default)]
pub struct KeypointStore {
    keypoints: KeypointSet,
    selected: Option<Joint>,
    image_size: egui::Vec2,
    revision: u64,
    history: Vec<Snapshot>,
    future: Vec<Snapshot>,
}

impl KeypointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything with a freshly uploaded image's keypoints.
    pub fn seed(&mut self, keypoints: KeypointSet, image_size: egui::Vec2) {
        self.keypoints = keypoints;
        self.selected = None;
        self.image_size = image_size;
        self.history.clear();
        self.future.clear();
        self.touch();
    }

    /// Overwrites or introduces the given joints; used for detector output.
    pub fn merge(&mut self, detected: &KeypointSet) {
        let bounds = self.image_rect();
        for (joint, p) in detected.iter() {
            let p = clamp_to_rect(p.to_pos2(), bounds);
            self.keypoints.insert(joint, Point::from_pos2(p));
        }
        self.touch();
    }

    pub fn keypoints(&self) -> &KeypointSet {
        &self.keypoints
    }

    pub fn get(&self, joint: Joint) -> Option<Point> {
        self.keypoints.get(joint)
    }

    pub fn image_size(&self) -> egui::Vec2 {
        self.image_size
    }

    fn image_rect(&self) -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::ZERO, self.image_size)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Moves an existing joint. Joints only come into being through upload
    /// or detection, so an absent joint is an error.
    pub fn set(&mut self, joint: Joint, point: Point) -> Result<()> {
        if !self.keypoints.contains(joint) {
            return Err(EditorError::MissingJoint(joint));
        }
        self.keypoints.insert(joint, point);
        self.touch();
        Ok(())
    }

    /// Like [`set`](Self::set) but keeps the point inside the image.
    pub fn place(&mut self, joint: Joint, point: Point) -> Result<Point> {
        let p = Point::from_pos2(clamp_to_rect(point.to_pos2(), self.image_rect()));
        self.set(joint, p)?;
        Ok(p)
    }

    /// Overwrites a single coordinate, clamped to the image on that axis.
    pub fn set_axis(&mut self, joint: Joint, axis: Axis, value: f32) -> Result<Point> {
        let mut p = self.get(joint).ok_or(EditorError::MissingJoint(joint))?;
        match axis {
            Axis::X => p.x = value.clamp(0.0, self.image_size.x),
            Axis::Y => p.y = value.clamp(0.0, self.image_size.y),
        }
        self.set(joint, p)?;
        Ok(p)
    }

    /// Offsets a joint by `delta`, expressed and clamped in `space`.
    pub fn translate(
        &mut self,
        joint: Joint,
        delta: egui::Vec2,
        space: EditSpace,
        view: &ViewTransform,
    ) -> Result<Point> {
        let current = self.get(joint).ok_or(EditorError::MissingJoint(joint))?;
        let moved = match space {
            EditSpace::Image => {
                let p = clamp_to_rect(current.to_pos2() + delta, self.image_rect());
                Point::from_pos2(p)
            }
            EditSpace::Display => {
                let p = clamp_to_rect(view.to_display(current) + delta, view.display_rect());
                view.to_image(p)
            }
        };
        self.set(joint, moved)?;
        Ok(moved)
    }

    pub fn selected_joint(&self) -> Option<Joint> {
        self.selected
    }

    pub fn select(&mut self, joint: Option<Joint>) -> Result<()> {
        if let Some(j) = joint.filter(|j| !self.keypoints.contains(*j)) {
            return Err(EditorError::MissingJoint(j));
        }
        if self.selected != joint {
            self.selected = joint;
            self.touch();
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            keypoints: self.keypoints.clone(),
            selected: self.selected,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.keypoints = snapshot.keypoints;
        self.selected = snapshot.selected;
        self.touch();
    }

    /// Makes the edit since `before` undoable. Returns false, and records
    /// nothing, when no keypoint moved.
    pub fn commit(&mut self, before: Snapshot) -> bool {
        if before.keypoints == self.keypoints {
            return false;
        }
        self.push_history(before);
        true
    }

    fn push_history(&mut self, snapshot: Snapshot) {
        const LIMIT: usize = 200;
        self.history.push(snapshot);
        if self.history.len() > LIMIT {
            let overflow = self.history.len() - LIMIT;
            self.history.drain(0..overflow);
        }
        self.future.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(prev) = self.history.pop() else {
            return false;
        };
        let current = self.snapshot();
        self.future.push(current);
        self.restore(prev);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = self.snapshot();
        self.history.push(current);
        self.restore(next);
        true
    }
}
