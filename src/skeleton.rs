use crate::model::{Joint, KeypointSet};

pub type Edge = (Joint, Joint);

/// Bones that are always drawn when both ends are present.
pub const STATIC_EDGES: [Edge; 8] = [
    (Joint::LShoulder, Joint::LHip),
    (Joint::LHip, Joint::LKnee),
    (Joint::LKnee, Joint::LAnkle),
    (Joint::RShoulder, Joint::RHip),
    (Joint::RHip, Joint::RKnee),
    (Joint::RKnee, Joint::RAnkle),
    (Joint::LShoulder, Joint::RShoulder),
    (Joint::LHip, Joint::RHip),
];

pub fn static_edges() -> &'static [Edge] {
    &STATIC_EDGES
}

/// The spine line from C7 to the hip on the side of the more forward ankle.
/// Recomputed from positions on every call; nothing is cached.
pub fn dynamic_edges(keypoints: &KeypointSet) -> Vec<Edge> {
    let (Some(_), Some(_), Some(_), Some(l_ankle), Some(r_ankle)) = (
        keypoints.get(Joint::C7),
        keypoints.get(Joint::LHip),
        keypoints.get(Joint::RHip),
        keypoints.get(Joint::LAnkle),
        keypoints.get(Joint::RAnkle),
    ) else {
        return Vec::new();
    };
    let hip = if r_ankle.x > l_ankle.x {
        Joint::RHip
    } else {
        Joint::LHip
    };
    vec![(Joint::C7, hip)]
}

/// Static plus dynamic edges, keeping only pairs whose endpoints both exist.
pub fn resolved_edges(keypoints: &KeypointSet) -> Vec<Edge> {
    static_edges()
        .iter()
        .copied()
        .chain(dynamic_edges(keypoints))
        .filter(|(a, b)| keypoints.contains(*a) && keypoints.contains(*b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Point;

    fn full_set(l_ankle_x: f32, r_ankle_x: f32) -> KeypointSet {
        Joint::ALL
            .into_iter()
            .map(|j| {
                let x = match j {
                    Joint::LAnkle => l_ankle_x,
                    Joint::RAnkle => r_ankle_x,
                    _ => 100.0,
                };
                (j, Point::new(x, 50.0))
            })
            .collect()
    }

    #[test]
    fn c7_follows_the_forward_ankle() {
        let right_forward = full_set(100.0, 300.0);
        assert_eq!(dynamic_edges(&right_forward), vec![(Joint::C7, Joint::RHip)]);

        let left_forward = full_set(300.0, 100.0);
        assert_eq!(dynamic_edges(&left_forward), vec![(Joint::C7, Joint::LHip)]);
    }

    #[test]
    fn equal_ankles_fall_back_to_left_hip() {
        let set = full_set(200.0, 200.0);
        assert_eq!(dynamic_edges(&set), vec![(Joint::C7, Joint::LHip)]);
    }

    #[test]
    fn dynamic_edge_needs_both_ankles() {
        let mut set: KeypointSet = full_set(1.0, 2.0)
            .iter()
            .filter(|(j, _)| *j != Joint::RAnkle)
            .collect();
        assert!(dynamic_edges(&set).is_empty());
        set.insert(Joint::RAnkle, Point::new(5.0, 5.0));
        assert_eq!(dynamic_edges(&set).len(), 1);
    }

    #[test]
    fn resolved_edges_skip_absent_endpoints() {
        let set: KeypointSet = full_set(100.0, 300.0)
            .iter()
            .filter(|(j, _)| !matches!(j, Joint::C7 | Joint::LKnee))
            .collect();
        let edges = resolved_edges(&set);
        for (a, b) in &edges {
            assert!(set.contains(*a) && set.contains(*b));
        }
        assert!(!edges.iter().any(|(a, b)| *a == Joint::LKnee || *b == Joint::LKnee));
        assert!(!edges.iter().any(|(a, b)| *a == Joint::C7 || *b == Joint::C7));
        assert_eq!(edges.len(), 6);
    }

    #[test]
    fn full_set_has_nine_bones() {
        assert_eq!(resolved_edges(&full_set(0.0, 10.0)).len(), 9);
    }

    #[test]
    fn empty_set_draws_nothing() {
        assert!(resolved_edges(&KeypointSet::new()).is_empty());
    }
}
