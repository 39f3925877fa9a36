use eframe::egui;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// One of the nine anatomical landmarks tracked on a crouch-start photo.
///
/// Declaration order is the canonical display order, so the derived `Ord`
/// agrees with [`Joint::ALL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Joint {
    LShoulder,
    RShoulder,
    LHip,
    RHip,
    LKnee,
    RKnee,
    LAnkle,
    RAnkle,
    C7,
}

impl Joint {
    pub const ALL: [Joint; 9] = [
        Joint::LShoulder,
        Joint::RShoulder,
        Joint::LHip,
        Joint::RHip,
        Joint::LKnee,
        Joint::RKnee,
        Joint::LAnkle,
        Joint::RAnkle,
        Joint::C7,
    ];

    /// Identifier used on the wire by the upload, detect and analyze services.
    pub fn id(self) -> &'static str {
        match self {
            Joint::LShoulder => "LShoulder",
            Joint::RShoulder => "RShoulder",
            Joint::LHip => "LHip",
            Joint::RHip => "RHip",
            Joint::LKnee => "LKnee",
            Joint::RKnee => "RKnee",
            Joint::LAnkle => "LAnkle",
            Joint::RAnkle => "RAnkle",
            Joint::C7 => "C7",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|j| j.id() == id)
    }

    /// 1-based position in the canonical order; drawn inside the marker.
    pub fn order(self) -> usize {
        self as usize + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Joint::LShoulder => "Left shoulder",
            Joint::RShoulder => "Right shoulder",
            Joint::LHip => "Left hip",
            Joint::RHip => "Right hip",
            Joint::LKnee => "Left knee",
            Joint::RKnee => "Right knee",
            Joint::LAnkle => "Left ankle",
            Joint::RAnkle => "Right ankle",
            Joint::C7 => "C7 vertebra",
        }
    }

    /// Label with its order number, as listed in buttons and tables.
    pub fn display_name(self) -> String {
        format!("{}. {}", self.order(), self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_pos2(p: egui::Pos2) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn to_pos2(self) -> egui::Pos2 {
        egui::pos2(self.x, self.y)
    }
}

/// Joint positions in image space. Any subset of the nine joints may be
/// present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeypointSet {
    points: BTreeMap<Joint, Point>,
}

impl KeypointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, joint: Joint) -> Option<Point> {
        self.points.get(&joint).copied()
    }

    pub fn contains(&self, joint: Joint) -> bool {
        self.points.contains_key(&joint)
    }

    pub fn insert(&mut self, joint: Joint, point: Point) -> Option<Point> {
        self.points.insert(joint, point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Present joints, always in canonical order.
    pub fn present(&self) -> impl Iterator<Item = Joint> + '_ {
        Joint::ALL.into_iter().filter(|j| self.points.contains_key(j))
    }

    /// Present joints with their positions, always in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Joint, Point)> + '_ {
        Joint::ALL
            .into_iter()
            .filter_map(|j| self.points.get(&j).map(|p| (j, *p)))
    }
}

impl FromIterator<(Joint, Point)> for KeypointSet {
    fn from_iter<I: IntoIterator<Item = (Joint, Point)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Set,
    Takeoff,
}

impl AnalysisMode {
    pub fn label(self) -> &'static str {
        match self {
            AnalysisMode::Set => "Set position",
            AnalysisMode::Takeoff => "Takeoff",
        }
    }
}

/// Angles returned by the analysis service, in degrees. A metric the
/// service could not compute is simply absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub analysis_type: Option<AnalysisMode>,
    #[serde(default)]
    pub front_angle: Option<f64>,
    #[serde(default)]
    pub rear_angle: Option<f64>,
    #[serde(default)]
    pub front_hip_angle: Option<f64>,
    #[serde(default)]
    pub lower_angle: Option<f64>,
    #[serde(default)]
    pub upper_angle: Option<f64>,
    #[serde(default)]
    pub kunoji_angle: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    FrontKnee,
    RearKnee,
    FrontHip,
    LowerBody,
    UpperBody,
    Kunoji,
}

impl Metric {
    pub fn for_mode(mode: AnalysisMode) -> [Metric; 3] {
        match mode {
            AnalysisMode::Set => [Metric::FrontKnee, Metric::RearKnee, Metric::FrontHip],
            AnalysisMode::Takeoff => [Metric::LowerBody, Metric::UpperBody, Metric::Kunoji],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::FrontKnee => "Front knee angle",
            Metric::RearKnee => "Rear knee angle",
            Metric::FrontHip => "Front hip angle",
            Metric::LowerBody => "Lower body angle",
            Metric::UpperBody => "Upper body angle",
            Metric::Kunoji => "Kunoji angle",
        }
    }

    pub fn ideal_range(self) -> RangeInclusive<f64> {
        match self {
            Metric::FrontKnee => 80.0..=100.0,
            Metric::RearKnee => 120.0..=135.0,
            Metric::FrontHip => 40.0..=60.0,
            Metric::LowerBody => 30.0..=60.0,
            Metric::UpperBody => 25.0..=55.0,
            Metric::Kunoji => 150.0..=180.0,
        }
    }

    fn value(self, result: &AnalysisResult) -> Option<f64> {
        match self {
            Metric::FrontKnee => result.front_angle,
            Metric::RearKnee => result.rear_angle,
            Metric::FrontHip => result.front_hip_angle,
            Metric::LowerBody => result.lower_angle,
            Metric::UpperBody => result.upper_angle,
            Metric::Kunoji => result.kunoji_angle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricStatus {
    Ideal,
    NeedsWork,
    NotMeasurable,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricReading {
    pub metric: Metric,
    pub value: Option<f64>,
    pub status: MetricStatus,
}

impl MetricReading {
    pub fn value_text(&self) -> String {
        match self.value {
            Some(v) => format!("{v:.1}°"),
            None => "not measurable".to_string(),
        }
    }
}

impl AnalysisResult {
    /// Readings for every metric of `requested`, or of the mode the service
    /// reports if it names one. Missing angles become `NotMeasurable`.
    pub fn readings(&self, requested: AnalysisMode) -> Vec<MetricReading> {
        let mode = self.analysis_type.unwrap_or(requested);
        Metric::for_mode(mode)
            .into_iter()
            .map(|metric| {
                let value = metric.value(self).filter(|v| v.is_finite());
                let status = match value {
                    None => MetricStatus::NotMeasurable,
                    Some(v) if metric.ideal_range().contains(&v) => MetricStatus::Ideal,
                    Some(_) => MetricStatus::NeedsWork,
                };
                MetricReading {
                    metric,
                    value,
                    status,
                }
            })
            .collect()
    }
}
