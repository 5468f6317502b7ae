use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Audio,
    Image,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Audio => f.write_str("audio"),
            AssetKind::Image => f.write_str("image"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to parse payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("payload contains no scenes")]
    EmptyPayload,

    #[error("scene {scene}: missing {kind} file {}", .path.display())]
    MissingAsset {
        scene: usize,
        kind: AssetKind,
        path: PathBuf,
    },

    #[error("scene {scene}: failed to download image {url}: {reason}")]
    Download {
        scene: usize,
        url: String,
        reason: String,
    },

    #[error("{}: {source:#}", scene_label(.scene))]
    Media {
        scene: Option<usize>,
        #[source]
        source: anyhow::Error,
    },

    #[error("no scene {scene} in payload of {count} scenes")]
    NoSuchScene { scene: usize, count: usize },

    #[error("{context}: {reason}")]
    Runtime { context: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn media(scene: usize, source: anyhow::Error) -> Self {
        RenderError::Media {
            scene: Some(scene),
            source,
        }
    }

    pub fn encode(source: anyhow::Error) -> Self {
        RenderError::Media {
            scene: None,
            source,
        }
    }

    pub fn runtime(context: &'static str, reason: impl fmt::Display) -> Self {
        RenderError::Runtime {
            context,
            reason: reason.to_string(),
        }
    }

    /// Scene index (1-based) the failure is attributed to, if any.
    pub fn scene(&self) -> Option<usize> {
        match self {
            RenderError::MissingAsset { scene, .. } | RenderError::Download { scene, .. } => {
                Some(*scene)
            }
            RenderError::Media { scene, .. } => *scene,
            RenderError::NoSuchScene { scene, .. } => Some(*scene),
            _ => None,
        }
    }
}

fn scene_label(scene: &Option<usize>) -> String {
    match scene {
        Some(index) => format!("media error in scene {}", index),
        None => "media error".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_error_names_scene() {
        let err = RenderError::media(4, anyhow::anyhow!("cannot decode image"));
        assert_eq!(err.scene(), Some(4));
        assert_eq!(err.to_string(), "media error in scene 4: cannot decode image");
    }

    #[test]
    fn missing_asset_message_includes_path() {
        let err = RenderError::MissingAsset {
            scene: 3,
            kind: AssetKind::Audio,
            path: PathBuf::from("data/audio-3.mp3"),
        };
        assert_eq!(err.to_string(), "scene 3: missing audio file data/audio-3.mp3");
        assert_eq!(err.scene(), Some(3));
    }

    #[test]
    fn runtime_failures_keep_their_context() {
        let err = RenderError::runtime("failed to build HTTP client", "tls backend unavailable");
        assert_eq!(err.to_string(), "failed to build HTTP client: tls backend unavailable");
        assert_eq!(err.scene(), None);
        assert!(!matches!(err, RenderError::Io(_)));
    }
}
