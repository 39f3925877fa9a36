use crate::error::{EditorError, Result};
use crate::geometry::{Direction, ViewTransform, clamp_to_rect, hit_test_joint};
use crate::model::{Joint, Point};
use crate::store::{Axis, EditSpace, KeypointStore, Snapshot};
use eframe::egui;

use super::InteractionMode;

/// What an input did to the keypoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Edit {
    /// Nothing changed.
    None,
    /// Redraw needed, but the edit is still in progress (drag samples,
    /// selection changes). Does not re-run analysis.
    Preview,
    /// A finished, discrete edit. Redraw and re-run analysis if one ran before.
    Commit,
}

/// A drag in progress. Created on press over a marker, consumed on release.
#[derive(Clone, Debug)]
pub(crate) struct DragSession {
    pub joint: Joint,
    /// Pointer position minus marker center at press time, in display space.
    pub grab_offset: egui::Vec2,
    pub moved: bool,
    /// Store state at press time; becomes the undo step if the drag moved.
    before: Snapshot,
}

/// Which controls are shown for a mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Affordances {
    pub joint_buttons: bool,
    pub direction_pad: bool,
    pub dropdown: bool,
    pub numeric: bool,
    pub batch_table: bool,
}

impl InteractionMode {
    pub fn affordances(self) -> Affordances {
        match self {
            InteractionMode::Click => Affordances {
                joint_buttons: true,
                numeric: true,
                ..Default::default()
            },
            InteractionMode::Drag => Affordances {
                joint_buttons: true,
                ..Default::default()
            },
            InteractionMode::Direction => Affordances {
                joint_buttons: true,
                direction_pad: true,
                numeric: true,
                ..Default::default()
            },
            InteractionMode::Dropdown => Affordances {
                dropdown: true,
                numeric: true,
                ..Default::default()
            },
            InteractionMode::Batch => Affordances {
                batch_table: true,
                ..Default::default()
            },
        }
    }
}

/// Parses a coordinate typed by the user as a whole number of pixels.
pub(crate) fn parse_coordinate(text: &str) -> Result<f32> {
    text.trim()
        .parse::<i32>()
        .map(|v| v as f32)
        .map_err(|_| EditorError::Input(format!("'{}' is not a whole number", text.trim())))
}

/// Turns pointer, pad and field input into keypoint edits for the active
/// mode. Holds no keypoints itself; every call borrows the store.
pub(crate) struct InteractionController {
    mode: InteractionMode,
    drag: Option<DragSession>,
    pub step: f32,
    pub step_space: EditSpace,
    pub hit_radius: f32,
}

impl InteractionController {
    pub fn new(step: f32, step_space: EditSpace, hit_radius: f32) -> Self {
        Self {
            mode: InteractionMode::Click,
            drag: None,
            step,
            step_space,
            hit_radius,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Switches mode. Keypoints and selection are untouched; a drag in
    /// progress is dropped without an undo step, so release it first.
    pub fn set_mode(&mut self, mode: InteractionMode) {
        if self.mode != mode {
            log::debug!("Interaction mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
            self.drag = None;
        }
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    /// Primary-button press on the canvas, in display coordinates.
    pub fn press(
        &mut self,
        store: &mut KeypointStore,
        view: &ViewTransform,
        pos: egui::Pos2,
    ) -> Result<Edit> {
        if !view.display_rect().contains(pos) {
            return Ok(Edit::None);
        }
        match self.mode {
            InteractionMode::Click => {
                let joint = store.selected_joint().ok_or(EditorError::NoSelection)?;
                self.place(store, joint, view.to_image(pos))
            }
            InteractionMode::Drag => {
                let Some(joint) = hit_test_joint(store.keypoints(), view, pos, self.hit_radius)
                else {
                    return Ok(Edit::None);
                };
                let center = store
                    .get(joint)
                    .map(|p| view.to_display(p))
                    .ok_or(EditorError::MissingJoint(joint))?;
                let before = store.snapshot();
                store.select(Some(joint))?;
                self.drag = Some(DragSession {
                    joint,
                    grab_offset: pos - center,
                    moved: false,
                    before,
                });
                Ok(Edit::Preview)
            }
            _ => Ok(Edit::None),
        }
    }

    /// Pointer moved while pressed. Only does anything during a drag.
    pub fn drag_to(
        &mut self,
        store: &mut KeypointStore,
        view: &ViewTransform,
        pos: egui::Pos2,
    ) -> Result<Edit> {
        let Some(session) = self.drag.as_mut() else {
            return Ok(Edit::None);
        };
        let target = clamp_to_rect(pos - session.grab_offset, view.display_rect());
        if let Err(err) = store.set(session.joint, view.to_image(target)) {
            self.drag = None;
            return Err(err);
        }
        session.moved = true;
        log::trace!("drag {:?} to {:?}", session.joint, target);
        Ok(Edit::Preview)
    }

    /// Pointer released. A drag that moved the joint counts as one edit.
    pub fn release(&mut self, store: &mut KeypointStore) -> Edit {
        match self.drag.take() {
            Some(session) if session.moved && store.commit(session.before.clone()) => {
                log::debug!("Dragged {:?}", session.joint);
                Edit::Commit
            }
            _ => Edit::None,
        }
    }

    /// Direction-pad or arrow-key nudge of the selected joint.
    pub fn nudge(
        &mut self,
        store: &mut KeypointStore,
        view: &ViewTransform,
        direction: Direction,
    ) -> Result<Edit> {
        if self.mode != InteractionMode::Direction {
            return Ok(Edit::None);
        }
        let joint = store.selected_joint().ok_or(EditorError::NoSelection)?;
        if direction == Direction::Center {
            return Ok(Edit::None);
        }
        let before = store.snapshot();
        store.translate(joint, direction.delta(self.step), self.step_space, view)?;
        Ok(committed(store, before))
    }

    /// Selection from the dropdown or the joint buttons.
    pub fn choose(&mut self, store: &mut KeypointStore, joint: Joint) -> Result<Edit> {
        let before = store.selected_joint();
        store.select(Some(joint))?;
        Ok(if before == Some(joint) {
            Edit::None
        } else {
            Edit::Preview
        })
    }

    /// X/Y fields bound to the selected joint, in image pixels. Input that
    /// does not parse leaves the store untouched.
    pub fn numeric_entry(&mut self, store: &mut KeypointStore, x: &str, y: &str) -> Result<Edit> {
        let joint = store.selected_joint().ok_or(EditorError::NoSelection)?;
        let x = parse_coordinate(x)?;
        let y = parse_coordinate(y)?;
        self.place(store, joint, Point::new(x, y))
    }

    /// One cell of the batch table. Selection plays no part.
    pub fn batch_entry(
        &mut self,
        store: &mut KeypointStore,
        joint: Joint,
        axis: Axis,
        value: &str,
    ) -> Result<Edit> {
        let value = parse_coordinate(value)?;
        let current = store.get(joint).ok_or(EditorError::MissingJoint(joint))?;
        let current = match axis {
            Axis::X => current.x,
            Axis::Y => current.y,
        };
        // The cell shows the rounded value; getting it back is not an edit.
        if current.round() == value {
            return Ok(Edit::None);
        }
        let before = store.snapshot();
        store.set_axis(joint, axis, value)?;
        Ok(committed(store, before))
    }

    fn place(&mut self, store: &mut KeypointStore, joint: Joint, target: Point) -> Result<Edit> {
        let before = store.snapshot();
        store.place(joint, target)?;
        Ok(committed(store, before))
    }
}

fn committed(store: &mut KeypointStore, before: Snapshot) -> Edit {
    if store.commit(before) {
        Edit::Commit
    } else {
        Edit::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeypointSet;

    const IMAGE: (f32, f32) = (1600.0, 1200.0);

    fn setup() -> (KeypointStore, ViewTransform, InteractionController) {
        let mut store = KeypointStore::new();
        let set: KeypointSet = [
            (Joint::LShoulder, Point::new(400.0, 300.0)),
            (Joint::LHip, Point::new(600.0, 700.0)),
            (Joint::RAnkle, Point::new(1590.0, 1190.0)),
        ]
        .into_iter()
        .collect();
        store.seed(set, egui::vec2(IMAGE.0, IMAGE.1));
        let view = ViewTransform::fit(IMAGE.0, IMAGE.1, 800.0, 600.0);
        (store, view, InteractionController::new(5.0, EditSpace::Display, 14.0))
    }

    #[test]
    fn click_without_selection_is_rejected() {
        let (mut store, view, mut ctl) = setup();
        let before = store.keypoints().clone();
        let err = ctl.press(&mut store, &view, egui::pos2(10.0, 10.0)).unwrap_err();
        assert!(matches!(err, EditorError::NoSelection));
        assert_eq!(store.keypoints(), &before);
    }

    #[test]
    fn click_places_selected_joint_in_image_space() {
        let (mut store, view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LHip).unwrap();
        let edit = ctl.press(&mut store, &view, egui::pos2(100.0, 50.0)).unwrap();
        assert_eq!(edit, Edit::Commit);
        assert_eq!(store.get(Joint::LHip), Some(Point::new(200.0, 100.0)));
    }

    #[test]
    fn click_outside_surface_is_ignored() {
        let (mut store, view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LHip).unwrap();
        let edit = ctl.press(&mut store, &view, egui::pos2(900.0, 50.0)).unwrap();
        assert_eq!(edit, Edit::None);
        assert_eq!(store.get(Joint::LHip), Some(Point::new(600.0, 700.0)));
    }

    #[test]
    fn drag_selects_moves_and_commits_on_release() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Drag);
        // LShoulder is drawn at (200, 150); grab it slightly off-center.
        let edit = ctl.press(&mut store, &view, egui::pos2(203.0, 151.0)).unwrap();
        assert_eq!(edit, Edit::Preview);
        assert_eq!(store.selected_joint(), Some(Joint::LShoulder));

        ctl.drag_to(&mut store, &view, egui::pos2(253.0, 201.0)).unwrap();
        let p = store.get(Joint::LShoulder).unwrap();
        assert!((p.x - 500.0).abs() < 1e-3 && (p.y - 400.0).abs() < 1e-3);

        assert_eq!(ctl.release(&mut store), Edit::Commit);
        assert!(store.undo());
        assert_eq!(store.get(Joint::LShoulder), Some(Point::new(400.0, 300.0)));
        assert!(ctl.drag_session().is_none());
    }

    #[test]
    fn drag_is_clamped_to_surface() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Drag);
        ctl.press(&mut store, &view, egui::pos2(300.0, 350.0)).unwrap();
        ctl.drag_to(&mut store, &view, egui::pos2(-500.0, 9000.0)).unwrap();
        let p = store.get(Joint::LHip).unwrap();
        assert_eq!(p.x, 0.0);
        assert!((p.y - IMAGE.1).abs() < 1e-3);
    }

    #[test]
    fn press_on_empty_canvas_starts_no_drag() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Drag);
        assert_eq!(ctl.press(&mut store, &view, egui::pos2(700.0, 20.0)).unwrap(), Edit::None);
        assert!(ctl.drag_session().is_none());
        assert_eq!(ctl.release(&mut store), Edit::None);
    }

    #[test]
    fn nudge_and_mirror_return_to_start() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Direction);
        ctl.choose(&mut store, Joint::LHip).unwrap();
        let start = store.get(Joint::LHip).unwrap();
        for row in Direction::PAD {
            for d in row {
                ctl.nudge(&mut store, &view, d).unwrap();
                ctl.nudge(&mut store, &view, d.opposite()).unwrap();
                let p = store.get(Joint::LHip).unwrap();
                assert!((p.x - start.x).abs() < 1e-3 && (p.y - start.y).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn nudge_near_edge_stays_in_bounds() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Direction);
        ctl.choose(&mut store, Joint::RAnkle).unwrap();
        for _ in 0..10 {
            ctl.nudge(&mut store, &view, Direction::SE).unwrap();
        }
        let p = store.get(Joint::RAnkle).unwrap();
        assert!(p.x <= IMAGE.0 + 1e-3 && p.y <= IMAGE.1 + 1e-3);
        assert!((p.x - IMAGE.0).abs() < 1e-3);

        ctl.step_space = EditSpace::Image;
        ctl.choose(&mut store, Joint::LShoulder).unwrap();
        for _ in 0..200 {
            ctl.nudge(&mut store, &view, Direction::NW).unwrap();
        }
        assert_eq!(store.get(Joint::LShoulder), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn nudge_needs_selection_and_direction_mode() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Direction);
        assert!(matches!(
            ctl.nudge(&mut store, &view, Direction::N),
            Err(EditorError::NoSelection)
        ));
        ctl.choose(&mut store, Joint::LHip).unwrap();
        ctl.set_mode(InteractionMode::Batch);
        assert_eq!(ctl.nudge(&mut store, &view, Direction::N).unwrap(), Edit::None);
        assert_eq!(store.selected_joint(), Some(Joint::LHip));
    }

    #[test]
    fn numeric_garbage_changes_nothing() {
        let (mut store, _view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LHip).unwrap();
        let revision = store.revision();
        let err = ctl.numeric_entry(&mut store, "abc", "100").unwrap_err();
        assert!(matches!(err, EditorError::Input(_)));
        assert_eq!(store.get(Joint::LHip), Some(Point::new(600.0, 700.0)));
        assert_eq!(store.revision(), revision);
        assert!(!store.can_undo());
    }

    #[test]
    fn numeric_entry_is_clamped_to_image() {
        let (mut store, _view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LHip).unwrap();
        assert_eq!(ctl.numeric_entry(&mut store, " 120 ", "-40").unwrap(), Edit::Commit);
        assert_eq!(store.get(Joint::LHip), Some(Point::new(120.0, 0.0)));
        ctl.numeric_entry(&mut store, "99999", "500").unwrap();
        assert_eq!(store.get(Joint::LHip), Some(Point::new(IMAGE.0, 500.0)));
    }

    #[test]
    fn batch_edit_of_y_leaves_everything_else_alone() {
        let (mut store, _view, mut ctl) = setup();
        let before = store.keypoints().clone();
        let edit = ctl.batch_entry(&mut store, Joint::LShoulder, Axis::Y, "333").unwrap();
        assert_eq!(edit, Edit::Commit);
        assert_eq!(store.get(Joint::LShoulder), Some(Point::new(400.0, 333.0)));
        for joint in [Joint::LHip, Joint::RAnkle] {
            assert_eq!(store.get(joint), before.get(joint));
        }
        assert_eq!(store.selected_joint(), None);
    }

    #[test]
    fn batch_edit_of_absent_joint_is_rejected() {
        let (mut store, _view, mut ctl) = setup();
        let err = ctl.batch_entry(&mut store, Joint::C7, Axis::X, "10").unwrap_err();
        assert!(matches!(err, EditorError::MissingJoint(Joint::C7)));
    }

    #[test]
    fn choosing_absent_joint_is_rejected() {
        let (mut store, _view, mut ctl) = setup();
        assert!(ctl.choose(&mut store, Joint::RKnee).is_err());
        assert_eq!(store.selected_joint(), None);
        assert_eq!(ctl.choose(&mut store, Joint::LHip).unwrap(), Edit::Preview);
        assert_eq!(ctl.choose(&mut store, Joint::LHip).unwrap(), Edit::None);
    }

    #[test]
    fn mode_switch_keeps_keypoints_and_selection() {
        let (mut store, _view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LShoulder).unwrap();
        let before = store.keypoints().clone();
        for mode in InteractionMode::ALL {
            ctl.set_mode(mode);
            assert_eq!(ctl.mode(), mode);
        }
        assert_eq!(store.keypoints(), &before);
        assert_eq!(store.selected_joint(), Some(Joint::LShoulder));
    }

    #[test]
    fn affordances_per_mode() {
        assert!(InteractionMode::Direction.affordances().direction_pad);
        assert!(InteractionMode::Dropdown.affordances().dropdown);
        assert!(!InteractionMode::Dropdown.affordances().joint_buttons);
        let batch = InteractionMode::Batch.affordances();
        assert!(batch.batch_table && !batch.numeric);
    }

    #[test]
    fn edits_that_change_nothing_are_not_undo_steps() {
        let (mut store, view, mut ctl) = setup();
        ctl.set_mode(InteractionMode::Direction);
        ctl.step_space = EditSpace::Image;
        ctl.choose(&mut store, Joint::LShoulder).unwrap();
        let mut commits = 0;
        for _ in 0..200 {
            if ctl.nudge(&mut store, &view, Direction::NW).unwrap() == Edit::Commit {
                commits += 1;
            }
        }
        // From (400, 300) the top edge is hit after 60 steps of 5 and the
        // corner after 80; past that nothing moves.
        assert_eq!(commits, 80);
        let mut undone = 0;
        while store.undo() {
            undone += 1;
        }
        assert_eq!(undone, 80);

        let (mut store, view, mut ctl) = setup();
        ctl.choose(&mut store, Joint::LHip).unwrap();
        assert_eq!(ctl.numeric_entry(&mut store, "600", "700").unwrap(), Edit::None);
        ctl.set_mode(InteractionMode::Drag);
        ctl.press(&mut store, &view, egui::pos2(300.0, 350.0)).unwrap();
        assert_eq!(ctl.release(&mut store), Edit::None);
        assert!(!store.can_undo());
    }

    #[test]
    fn batch_cell_left_as_shown_keeps_fractional_position() {
        let (mut store, _view, mut ctl) = setup();
        store.set(Joint::LHip, Point::new(100.4, 200.6)).unwrap();
        let edit = ctl
            .batch_entry(&mut store, Joint::LHip, Axis::X, &super::super::coordinate_text(100.4))
            .unwrap();
        assert_eq!(edit, Edit::None);
        assert_eq!(store.get(Joint::LHip), Some(Point::new(100.4, 200.6)));
        assert!(!store.can_undo());

        let edit = ctl.batch_entry(&mut store, Joint::LHip, Axis::X, "101").unwrap();
        assert_eq!(edit, Edit::Commit);
        assert_eq!(store.get(Joint::LHip), Some(Point::new(101.0, 200.6)));
    }
}
