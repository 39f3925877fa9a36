use crate::bridge::DetectorCoordinates;
use crate::model::AnalysisMode;
use crate::store::EditSpace;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(super) struct AppSettings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub max_display_width: f32,
    pub max_display_height: f32,
    pub move_step: f32,
    pub step_space: EditSpace,
    pub analysis_mode: AnalysisMode,
    pub detector_coordinates: DetectorCoordinates,
    pub export_path: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
            max_display_width: 800.0,
            max_display_height: 600.0,
            move_step: 5.0,
            step_space: EditSpace::Display,
            analysis_mode: AnalysisMode::Set,
            detector_coordinates: DetectorCoordinates::Pixels,
            export_path: "crouch_analysis_result.png".to_string(),
        }
    }
}

pub(super) fn load_settings(path: &str) -> Option<AppSettings> {
    let s = std::fs::read_to_string(path).ok()?;
    let settings = if path.ends_with(".toml") {
        toml::from_str::<AppSettings>(&s)
            .ok()
            .or_else(|| serde_json::from_str::<AppSettings>(&s).ok())
    } else {
        serde_json::from_str::<AppSettings>(&s)
            .ok()
            .or_else(|| toml::from_str::<AppSettings>(&s).ok())
    };
    if settings.is_none() {
        log::warn!("Ignoring unreadable settings file {path}");
    }
    settings
}

pub(super) fn save_settings(path: &str, settings: &AppSettings) -> Result<(), String> {
    if path.ends_with(".toml") {
        let toml = toml::to_string_pretty(settings).map_err(|e| e.to_string())?;
        std::fs::write(path, toml).map_err(|e| e.to_string())
    } else {
        let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("crouchpose-{}-{name}", std::process::id()));
        dir.display().to_string()
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let path = temp_path("partial.toml");
        std::fs::write(&path, "server_url = \"http://pose.local\"\nanalysis_mode = \"takeoff\"\n").unwrap();
        let s = load_settings(&path).unwrap();
        assert_eq!(s.server_url, "http://pose.local");
        assert_eq!(s.analysis_mode, AnalysisMode::Takeoff);
        assert_eq!(s.max_display_width, 800.0);
        assert_eq!(s.detector_coordinates, DetectorCoordinates::Pixels);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn round_trips_through_json_and_toml() {
        let mut settings = AppSettings::default();
        settings.step_space = EditSpace::Image;
        settings.detector_coordinates = DetectorCoordinates::Normalized;
        for name in ["rt.toml", "rt.json"] {
            let path = temp_path(name);
            save_settings(&path, &settings).unwrap();
            assert_eq!(load_settings(&path), Some(settings.clone()));
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_settings(&temp_path("absent.toml")).is_none());
    }
}
