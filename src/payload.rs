use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub scene_id: String,
    pub script: String,
    #[serde(rename = "imagePrompt")]
    pub image_prompt: String,
    #[serde(rename = "audioPath")]
    pub audio_path: String,
    #[serde(rename = "imageUrl", skip_serializing_if = "String::is_empty")]
    pub image_url: String,
    #[serde(rename = "imagePath", skip_serializing_if = "String::is_empty")]
    pub image_path: String,
}

/// Where a scene's illustration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Remote(String),
    Local(PathBuf),
}

impl Scene {
    /// `imagePath` wins over `imageUrl`; an `imageUrl` without an http(s) scheme is a local path.
    pub fn image_source(&self) -> Option<ImageSource> {
        if !self.image_path.trim().is_empty() {
            return Some(ImageSource::Local(PathBuf::from(self.image_path.trim())));
        }
        let url = self.image_url.trim();
        if url.is_empty() {
            return None;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            Some(ImageSource::Remote(url.to_string()))
        } else {
            Some(ImageSource::Local(PathBuf::from(
                url.strip_prefix("file://").unwrap_or(url),
            )))
        }
    }

    pub fn audio_path(&self) -> &Path {
        Path::new(&self.audio_path)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    scenes: Vec<Scene>,
    metadata: Metadata,
    request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadIssue {
    pub scene: usize,
    pub message: String,
}

fn is_scene_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

impl Payload {
    pub fn new(scenes: Vec<Scene>, metadata: Metadata, request_id: impl Into<String>) -> Self {
        Self {
            scenes,
            metadata,
            request_id: request_id.into(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: Map<String, Value> = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    fn from_document(mut document: Map<String, Value>) -> Result<Self> {
        let metadata = match document.remove("metadata") {
            Some(Value::Null) | None => Metadata::default(),
            Some(value) => serde_json::from_value(value)?,
        };
        let request_id = match document.remove("request_id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        // Sorted by integer value, so "10" lands after "9". Leading zeros compare by value too.
        let mut keyed: Vec<(u128, String, Value)> = Vec::new();
        for (key, value) in document {
            if !is_scene_key(&key) {
                debug!("Ignoring non-scene key '{}'", key);
                continue;
            }
            let order = key.parse::<u128>().unwrap_or(u128::MAX);
            keyed.push((order, key, value));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let scenes = keyed
            .into_iter()
            .map(|(_, _, value)| serde_json::from_value::<Scene>(value))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            scenes,
            metadata,
            request_id,
        })
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// 1-based position lookup.
    pub fn scene(&self, number: usize) -> Option<&Scene> {
        number.checked_sub(1).and_then(|i| self.scenes.get(i))
    }

    pub fn scene_by_id(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_id == scene_id)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Non-fatal problems worth surfacing before a render.
    pub fn validate(&self) -> Vec<PayloadIssue> {
        let mut issues = Vec::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            let number = i + 1;
            let mut push = |message: &str| {
                issues.push(PayloadIssue {
                    scene: number,
                    message: message.to_string(),
                })
            };
            if scene.script.trim().is_empty() {
                push("missing script");
            }
            if scene.scene_id.is_empty() {
                push("missing scene_id");
            }
            if scene.image_prompt.is_empty() {
                push("missing imagePrompt");
            }
            if scene.audio_path.is_empty() {
                push("missing audioPath");
            }
            if scene.image_source().is_none() {
                push("missing imageUrl/imagePath");
            }
        }
        issues
    }

    /// Rebuilds the upstream document shape with keys "1".."N".
    pub fn to_json(&self) -> Value {
        let mut document = Map::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            document.insert((i + 1).to_string(), scene.to_json());
        }
        document.insert(
            "metadata".to_string(),
            serde_json::to_value(&self.metadata).unwrap_or(Value::Null),
        );
        document.insert("request_id".to_string(), Value::String(self.request_id.clone()));
        Value::Object(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn scenes_sort_by_numeric_key() {
        let json = r#"{
            "10": {"script": "ten", "scene_id": "s10"},
            "2": {"script": "two", "scene_id": "s2"},
            "1": {"script": "one", "scene_id": "s1"},
            "9": {"script": "nine", "scene_id": "s9"},
            "metadata": {"title": "T", "description": "D"},
            "request_id": "req-1"
        }"#;
        let payload = Payload::from_json(json).unwrap();
        let scripts: Vec<&str> = payload.scenes().iter().map(|s| s.script.as_str()).collect();
        assert_eq!(scripts, ["one", "two", "nine", "ten"]);
        assert_eq!(payload.len(), 4);
        assert_eq!(payload.request_id(), "req-1");
        assert_eq!(payload.metadata().title, "T");
        assert_eq!(payload.metadata().description, "D");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let payload = Payload::from_json(r#"{"1": {}}"#).unwrap();
        let scene = payload.scene(1).unwrap();
        assert_eq!(scene, &Scene::default());
        assert_eq!(payload.request_id(), "");
        assert_eq!(payload.metadata(), &Metadata::default());
    }

    #[test]
    fn non_numeric_keys_are_not_scenes() {
        let json = r#"{"1": {"script": "a"}, "1a": {"script": "b"}, "-2": {}, "scenes": "1"}"#;
        let payload = Payload::from_json(json).unwrap();
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            Payload::from_json("{not json"),
            Err(RenderError::Parse(_))
        ));
        assert!(matches!(Payload::from_json("[1, 2]"), Err(RenderError::Parse(_))));
        assert!(matches!(
            Payload::from_json(r#"{"1": "just a string"}"#),
            Err(RenderError::Parse(_))
        ));
    }

    #[test]
    fn scene_lookup_is_one_based() {
        let payload = Payload::from_json(r#"{"1": {"script": "a"}, "3": {"script": "c"}}"#).unwrap();
        assert_eq!(payload.scene(0), None);
        assert_eq!(payload.scene(2).unwrap().script, "c");
        assert_eq!(payload.scene(3), None);
    }

    #[test]
    fn image_source_resolution() {
        let mut scene = Scene {
            image_url: "https://cdn.example.com/a.jpg".into(),
            ..Scene::default()
        };
        assert_eq!(
            scene.image_source(),
            Some(ImageSource::Remote("https://cdn.example.com/a.jpg".into()))
        );
        scene.image_path = "/tmp/local.png".into();
        assert_eq!(
            scene.image_source(),
            Some(ImageSource::Local(PathBuf::from("/tmp/local.png")))
        );
        scene.image_path.clear();
        scene.image_url = "file:///srv/img.png".into();
        assert_eq!(
            scene.image_source(),
            Some(ImageSource::Local(PathBuf::from("/srv/img.png")))
        );
        scene.image_url.clear();
        assert_eq!(scene.image_source(), None);
    }

    #[test]
    fn validate_reports_missing_fields() {
        let payload =
            Payload::from_json(r#"{"1": {"script": "hello", "scene_id": "a", "imagePrompt": "p", "audioPath": "a.mp3", "imageUrl": "https://x/y.png"}, "2": {}}"#)
                .unwrap();
        let issues = payload.validate();
        assert!(issues.iter().all(|issue| issue.scene == 2));
        assert_eq!(issues.len(), 5);
    }

    #[test]
    fn to_json_uses_upstream_keys() {
        let payload = Payload::from_json(
            r#"{"5": {"script": "s", "imagePrompt": "p", "audioPath": "a.mp3", "imageUrl": "https://x"}, "request_id": "r"}"#,
        )
        .unwrap();
        let doc = payload.to_json();
        assert_eq!(doc["1"]["imagePrompt"], "p");
        assert_eq!(doc["1"]["audioPath"], "a.mp3");
        assert_eq!(doc["request_id"], "r");
        assert!(doc["1"].get("imagePath").is_none());
    }
}
