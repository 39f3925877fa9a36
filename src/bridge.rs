//! Requests to the upload, detect and analyze services.
//!
//! Calls are blocking HTTP on short-lived worker threads; results come back
//! to the UI thread as [`BridgeEvent`]s through a channel that the frame loop
//! drains. Analysis requests carry a sequence number so a slow, superseded
//! response can never overwrite a newer one.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EditorError, Result};
use crate::model::{AnalysisMode, AnalysisResult, Joint, KeypointSet, Point};

/// Coordinate convention of the detector's joint output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorCoordinates {
    #[default]
    Pixels,
    Normalized,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
    #[serde(default)]
    keypoints: BTreeMap<String, Point>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    success: bool,
    #[serde(default)]
    joints: BTreeMap<String, Point>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    keypoints: &'a KeypointSet,
    analysis_mode: AnalysisMode,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    result: AnalysisResult,
}

/// Accepted upload: keypoints are in original-image pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Upload {
    pub path: PathBuf,
    pub image_url: Option<String>,
    pub image_size: Option<(u32, u32)>,
    pub keypoints: KeypointSet,
}

fn service_error(what: &str, error: Option<String>) -> EditorError {
    EditorError::Network(error.unwrap_or_else(|| format!("{what} failed")))
}

fn joints_from_wire(raw: BTreeMap<String, Point>) -> KeypointSet {
    raw.into_iter()
        .filter_map(|(id, p)| match Joint::from_id(&id) {
            Some(joint) if p.x.is_finite() && p.y.is_finite() => Some((joint, p)),
            Some(joint) => {
                log::warn!("Dropping non-finite position for {}", joint.id());
                None
            }
            None => {
                log::warn!("Ignoring unknown joint '{id}'");
                None
            }
        })
        .collect()
}

fn parse_upload(path: &Path, resp: UploadResponse) -> Result<Upload> {
    if !resp.success {
        return Err(service_error("upload", resp.error));
    }
    Ok(Upload {
        path: path.to_path_buf(),
        image_url: resp.image_url,
        image_size: resp.image_width.zip(resp.image_height),
        keypoints: joints_from_wire(resp.keypoints),
    })
}

fn parse_detect(resp: DetectResponse) -> Result<KeypointSet> {
    if !resp.success {
        return Err(service_error("detection", resp.error));
    }
    Ok(joints_from_wire(resp.joints))
}

fn parse_analyze(resp: AnalyzeResponse) -> Result<AnalysisResult> {
    if resp.success == Some(false) || resp.error.is_some() {
        return Err(service_error("analysis", resp.error));
    }
    Ok(resp.result)
}

/// Brings detector output into image space under the configured contract.
pub fn to_image_space(
    joints: KeypointSet,
    coords: DetectorCoordinates,
    image_width: f32,
    image_height: f32,
) -> KeypointSet {
    match coords {
        DetectorCoordinates::Pixels => joints,
        DetectorCoordinates::Normalized => joints
            .iter()
            .map(|(j, p)| (j, Point::new(p.x * image_width, p.y * image_height)))
            .collect(),
    }
}

/// The external collaborators, as one narrow request/response contract.
pub trait PoseService: Send + Sync {
    fn upload(&self, path: &Path) -> Result<Upload>;
    /// Raw detector output; may be normalized, see [`to_image_space`].
    fn detect(&self, png: Vec<u8>) -> Result<KeypointSet>;
    fn analyze(&self, keypoints: &KeypointSet, mode: AnalysisMode) -> Result<AnalysisResult>;
}

pub struct HttpPoseService {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpPoseService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

impl PoseService for HttpPoseService {
    fn upload(&self, path: &Path) -> Result<Upload> {
        let form = reqwest::blocking::multipart::Form::new().file("file", path)?;
        let resp: UploadResponse = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()?;
        parse_upload(path, resp)
    }

    fn detect(&self, png: Vec<u8>) -> Result<KeypointSet> {
        let part = reqwest::blocking::multipart::Part::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);
        let resp: DetectResponse = self
            .client
            .post(self.url("/detect"))
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()?;
        parse_detect(resp)
    }

    fn analyze(&self, keypoints: &KeypointSet, mode: AnalysisMode) -> Result<AnalysisResult> {
        let body = AnalyzeRequest {
            keypoints,
            analysis_mode: mode,
        };
        let resp: AnalyzeResponse = self
            .client
            .post(self.url("/analyze"))
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        parse_analyze(resp)
    }
}

#[derive(Debug)]
pub enum BridgeEvent {
    Uploaded(Result<Upload>),
    /// `generation` is the image the detection was requested for.
    Detected {
        generation: u64,
        result: Result<KeypointSet>,
    },
    Analyzed { seq: u64, result: Result<AnalysisResult> },
}

/// Issues analysis sequence numbers and decides which responses still count.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    issued: u64,
    in_flight: usize,
    /// Requests numbered up to here were abandoned by [`Self::supersede`].
    floor: u64,
}

impl SequenceTracker {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.in_flight += 1;
        self.issued
    }

    /// Abandons every request issued so far, e.g. when a new image loads.
    /// Their responses will be rejected and no longer count as in flight.
    pub fn supersede(&mut self) {
        self.floor = self.issued;
        self.in_flight = 0;
    }

    /// Accepts only the response to the most recently issued request.
    pub fn accept(&mut self, seq: u64) -> Result<()> {
        if seq > self.floor {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        if seq == self.issued && seq > self.floor {
            Ok(())
        } else {
            Err(EditorError::StaleResponse {
                seq,
                latest: self.issued,
            })
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn latest(&self) -> u64 {
        self.issued
    }
}

type Notifier = Arc<dyn Fn() + Send + Sync>;

pub struct AnalysisBridge {
    service: Arc<dyn PoseService>,
    tx: Sender<BridgeEvent>,
    rx: Receiver<BridgeEvent>,
    notify: Option<Notifier>,
}

impl AnalysisBridge {
    pub fn new(service: Arc<dyn PoseService>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            service,
            tx,
            rx,
            notify: None,
        }
    }

    /// Called from the worker after each event is queued, to wake the UI.
    pub fn with_notifier(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    fn spawn(&self, job: impl FnOnce(&dyn PoseService) -> BridgeEvent + Send + 'static) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let notify = self.notify.clone();
        std::thread::spawn(move || {
            let event = job(service.as_ref());
            if tx.send(event).is_err() {
                log::debug!("Bridge receiver gone; dropping response");
            }
            if let Some(notify) = notify {
                notify();
            }
        });
    }

    pub fn upload(&self, path: PathBuf) {
        log::info!("Uploading {}", path.display());
        self.spawn(move |svc| BridgeEvent::Uploaded(svc.upload(&path)));
    }

    pub fn detect(&self, generation: u64, png: Vec<u8>) {
        log::info!("Requesting detection ({} bytes)", png.len());
        self.spawn(move |svc| BridgeEvent::Detected {
            generation,
            result: svc.detect(png),
        });
    }

    /// Serializes the keypoints as they are now and requests analysis.
    pub fn analyze(&self, seq: u64, keypoints: KeypointSet, mode: AnalysisMode) {
        log::debug!("Analysis #{seq} ({mode:?}, {} joints)", keypoints.len());
        self.spawn(move |svc| BridgeEvent::Analyzed {
            seq,
            result: svc.analyze(&keypoints, mode),
        });
    }

    pub fn poll(&self) -> Vec<BridgeEvent> {
        self.rx.try_iter().collect()
    }

    #[cfg(test)]
    pub fn wait(&self, timeout: Duration) -> Option<BridgeEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers analysis with the request's sequence-dependent delay, and
    /// echoes the number of joints as the front angle.
    pub(crate) struct FakeService {
        pub delays: Mutex<Vec<Duration>>,
        pub upload: Mutex<Option<Result<Upload>>>,
        pub detect: Mutex<Option<Result<KeypointSet>>>,
    }

    impl FakeService {
        pub fn new() -> Self {
            Self {
                delays: Mutex::new(Vec::new()),
                upload: Mutex::new(None),
                detect: Mutex::new(None),
            }
        }
    }

    impl PoseService for FakeService {
        fn upload(&self, path: &Path) -> Result<Upload> {
            self.upload
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(EditorError::Network(format!("no server for {}", path.display()))))
        }

        fn detect(&self, _png: Vec<u8>) -> Result<KeypointSet> {
            self.detect
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(EditorError::Network("no detector".into())))
        }

        fn analyze(&self, keypoints: &KeypointSet, _mode: AnalysisMode) -> Result<AnalysisResult> {
            let delay = {
                let mut delays = self.delays.lock().unwrap();
                if delays.is_empty() { Duration::ZERO } else { delays.remove(0) }
            };
            std::thread::sleep(delay);
            Ok(AnalysisResult {
                front_angle: Some(keypoints.len() as f64),
                ..Default::default()
            })
        }
    }

    #[test]
    fn tracker_accepts_only_latest() {
        let mut t = SequenceTracker::default();
        let first = t.issue();
        let second = t.issue();
        assert!(t.is_busy());
        assert!(t.accept(second).is_ok());
        assert!(matches!(
            t.accept(first),
            Err(EditorError::StaleResponse { seq: 1, latest: 2 })
        ));
        assert!(!t.is_busy());
    }

    #[test]
    fn superseded_requests_are_stale_and_not_busy() {
        let mut t = SequenceTracker::default();
        let old = t.issue();
        t.supersede();
        assert!(!t.is_busy());
        assert!(t.accept(old).is_err());

        let new = t.issue();
        assert!(t.accept(old).is_err());
        assert!(t.is_busy());
        assert!(t.accept(new).is_ok());
        assert!(!t.is_busy());
    }

    #[test]
    fn slow_first_response_arrives_last() {
        let fake = Arc::new(FakeService::new());
        *fake.delays.lock().unwrap() = vec![Duration::from_millis(300), Duration::ZERO];
        let bridge = AnalysisBridge::new(fake);
        let mut tracker = SequenceTracker::default();

        let one: KeypointSet = [(Joint::LHip, Point::new(1.0, 1.0))].into_iter().collect();
        let mut two = one.clone();
        two.insert(Joint::RHip, Point::new(2.0, 2.0));

        let s1 = tracker.issue();
        bridge.analyze(s1, one, AnalysisMode::Set);
        // Let the first worker claim the slow delay before the second starts.
        std::thread::sleep(Duration::from_millis(50));
        let s2 = tracker.issue();
        bridge.analyze(s2, two, AnalysisMode::Set);

        let mut shown = None;
        for _ in 0..2 {
            match bridge.wait(Duration::from_secs(5)) {
                Some(BridgeEvent::Analyzed { seq, result }) => {
                    if tracker.accept(seq).is_ok() {
                        shown = Some(result.unwrap());
                    }
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(shown.unwrap().front_angle, Some(2.0));
    }

    #[test]
    fn unknown_joint_ids_are_skipped() {
        let mut raw = BTreeMap::new();
        raw.insert("LHip".to_string(), Point::new(1.0, 2.0));
        raw.insert("Nose".to_string(), Point::new(3.0, 4.0));
        let set = joints_from_wire(raw);
        assert_eq!(set.len(), 1);
        assert!(set.contains(Joint::LHip));
    }

    #[test]
    fn upload_response_with_partial_keypoints() {
        let json = serde_json::json!({
            "success": true,
            "image_url": "/static/uploads/a.jpg",
            "image_width": 1920,
            "image_height": 1080,
            "keypoints": {"LHip": {"x": 10, "y": 20}, "RHip": {"x": 30.5, "y": 40}}
        });
        let resp: UploadResponse = serde_json::from_value(json).unwrap();
        let upload = parse_upload(Path::new("a.jpg"), resp).unwrap();
        assert_eq!(upload.image_size, Some((1920, 1080)));
        assert_eq!(upload.keypoints.get(Joint::RHip), Some(Point::new(30.5, 40.0)));
        assert_eq!(upload.keypoints.len(), 2);
    }

    #[test]
    fn failed_upload_carries_service_message() {
        let json = serde_json::json!({"success": false, "error": "no person found"});
        let resp: UploadResponse = serde_json::from_value(json).unwrap();
        let err = parse_upload(Path::new("a.jpg"), resp).unwrap_err();
        assert_eq!(err.to_string(), "Network error: no person found");
    }

    #[test]
    fn analyze_request_wire_shape() {
        let set: KeypointSet = [(Joint::C7, Point::new(5.0, 6.0))].into_iter().collect();
        let body = AnalyzeRequest {
            keypoints: &set,
            analysis_mode: AnalysisMode::Takeoff,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"keypoints": {"C7": {"x": 5.0, "y": 6.0}}, "analysis_mode": "takeoff"})
        );
    }

    #[test]
    fn analyze_response_tolerates_missing_angles() {
        let json = serde_json::json!({"success": true, "analysis_type": "set", "front_angle": 92.5});
        let resp: AnalyzeResponse = serde_json::from_value(json).unwrap();
        let result = parse_analyze(resp).unwrap();
        assert_eq!(result.front_angle, Some(92.5));
        assert_eq!(result.rear_angle, None);

        let json = serde_json::json!({"error": "RAnkle missing"});
        let resp: AnalyzeResponse = serde_json::from_value(json).unwrap();
        assert!(matches!(parse_analyze(resp), Err(EditorError::Network(_))));
    }

    #[test]
    fn normalized_detections_are_scaled() {
        let set: KeypointSet = [(Joint::LKnee, Point::new(0.5, 0.25))].into_iter().collect();
        let out = to_image_space(set.clone(), DetectorCoordinates::Normalized, 1000.0, 800.0);
        assert_eq!(out.get(Joint::LKnee), Some(Point::new(500.0, 200.0)));
        let same = to_image_space(set.clone(), DetectorCoordinates::Pixels, 1000.0, 800.0);
        assert_eq!(same, set);
    }

    #[test]
    fn detect_failure_is_network_error() {
        let json = serde_json::json!({"success": false});
        let resp: DetectResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parse_detect(resp).unwrap_err().to_string(), "Network error: detection failed");
    }
}
