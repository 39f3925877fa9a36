use std::fmt;

use crate::model::Joint;

pub type Result<T> = std::result::Result<T, EditorError>;

/// Failures the editor can run into. None of them end the session.
#[derive(Debug)]
pub enum EditorError {
    /// Rejected user input: a non-image file, a malformed number.
    Input(String),
    /// Upload, detect or analyze request failed.
    Network(String),
    /// An analysis response arrived after a newer request was issued.
    StaleResponse { seq: u64, latest: u64 },
    /// The edit targets a joint that is not in the current keypoint set.
    MissingJoint(Joint),
    /// The edit needs a selected joint and there is none.
    NoSelection,
    /// Image decode or encode failure.
    Image(String),
    Io(std::io::Error),
}

impl EditorError {
    /// Stale responses are dropped silently; everything else gets a toast.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResponse { .. })
    }
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(msg) => write!(f, "{msg}"),
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::StaleResponse { seq, latest } => {
                write!(f, "analysis #{seq} superseded by #{latest}")
            }
            Self::MissingJoint(joint) => write!(f, "{} is not on this image", joint.label()),
            Self::NoSelection => write!(f, "Select a joint first"),
            Self::Image(msg) => write!(f, "Image error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for EditorError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<reqwest::Error> for EditorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network("request timed out".to_string())
        } else if let Some(status) = err.status() {
            Self::Network(format!("HTTP {status}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}
