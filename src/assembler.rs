use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::clip::{SceneAssets, SceneClip, SceneClipBuilder};
use crate::config::RenderConfig;
use crate::download::{self, ImageRequest};
use crate::error::{AssetKind, RenderError, Result};
use crate::ffmpeg::concat_segments;
use crate::font::FontFace;
use crate::payload::{ImageSource, Payload};

/// What a caller hands to [`VideoAssembler::render`].
#[derive(Debug, Clone)]
pub enum RenderInput {
    Path(PathBuf),
    Json(String),
    Payload(Payload),
}

impl From<Payload> for RenderInput {
    fn from(payload: Payload) -> Self {
        RenderInput::Payload(payload)
    }
}

impl From<&Path> for RenderInput {
    fn from(path: &Path) -> Self {
        RenderInput::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for RenderInput {
    fn from(path: PathBuf) -> Self {
        RenderInput::Path(path)
    }
}

impl RenderInput {
    pub fn load(self) -> Result<Payload> {
        match self {
            RenderInput::Path(path) => Payload::from_file(&path),
            RenderInput::Json(json) => Payload::from_json(&json),
            RenderInput::Payload(payload) => Ok(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub output: PathBuf,
    pub request_id: String,
    pub scene_durations: Vec<f64>,
}

impl RenderSummary {
    pub fn total_duration(&self) -> f64 {
        self.scene_durations.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingImage {
    Local(PathBuf),
    Remote(String),
}

/// A scene whose audio exists and whose image source is known.
#[derive(Debug, Clone)]
struct CheckedScene {
    index: usize,
    script: String,
    audio: PathBuf,
    image: PendingImage,
}

/// Fails on the first scene, in order, with a missing audio file or no usable image source.
fn check_assets(payload: &Payload) -> Result<Vec<CheckedScene>> {
    let mut checked = Vec::with_capacity(payload.len());
    for (i, scene) in payload.scenes().iter().enumerate() {
        let index = i + 1;
        let audio = scene.audio_path().to_path_buf();
        if scene.audio_path.is_empty() || !audio.is_file() {
            error!("Audio file not found for scene {}: {}", index, audio.display());
            return Err(RenderError::MissingAsset {
                scene: index,
                kind: AssetKind::Audio,
                path: audio,
            });
        }
        let image = match scene.image_source() {
            Some(ImageSource::Remote(url)) => PendingImage::Remote(url),
            Some(ImageSource::Local(path)) if path.is_file() => PendingImage::Local(path),
            Some(ImageSource::Local(path)) => {
                error!("Image file not found for scene {}: {}", index, path.display());
                return Err(RenderError::MissingAsset {
                    scene: index,
                    kind: AssetKind::Image,
                    path,
                });
            }
            None => {
                error!("Scene {} has no image source", index);
                return Err(RenderError::MissingAsset {
                    scene: index,
                    kind: AssetKind::Image,
                    path: PathBuf::new(),
                });
            }
        };
        checked.push(CheckedScene {
            index,
            script: scene.script.clone(),
            audio,
            image,
        });
    }
    Ok(checked)
}

/// Temp namespace prefix from the filesystem-safe part of the request id.
fn scope_prefix(request_id: &str) -> String {
    let safe: String = request_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(32)
        .collect();
    if safe.is_empty() {
        "headline-shorts-".to_string()
    } else {
        format!("headline-shorts-{}-", safe)
    }
}

pub struct VideoAssembler {
    config: RenderConfig,
}

impl VideoAssembler {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Unique per call, removed when dropped.
    fn run_scope(&self, request_id: &str) -> Result<TempDir> {
        fs::create_dir_all(&self.config.temp_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&scope_prefix(request_id))
            .tempdir_in(&self.config.temp_root)?;
        info!("Created temp directory {}", dir.path().display());
        Ok(dir)
    }

    async fn resolve_images(&self, scenes: Vec<CheckedScene>, scope: &Path) -> Result<Vec<SceneAssets>> {
        let requests: Vec<ImageRequest> = scenes
            .iter()
            .filter_map(|scene| match &scene.image {
                PendingImage::Remote(url) => Some(ImageRequest {
                    scene: scene.index,
                    url: url.clone(),
                    dest: download::image_dest(scope, scene.index),
                }),
                PendingImage::Local(_) => None,
            })
            .collect();

        let mut downloaded = Vec::new();
        if !requests.is_empty() {
            info!("Downloading {} scene images", requests.len());
            let client = download::client(self.config.download_timeout)?;
            downloaded = download::download_all(&client, requests).await?;
        }

        let mut assets = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let image = match scene.image {
                PendingImage::Local(path) => path,
                PendingImage::Remote(url) => downloaded
                    .iter()
                    .find(|(index, _)| *index == scene.index)
                    .map(|(_, path)| path.clone())
                    .ok_or_else(|| RenderError::Download {
                        scene: scene.index,
                        url,
                        reason: "download produced no file".to_string(),
                    })?,
            };
            info!(
                "Scene {}: image={}, audio={}",
                scene.index,
                image.display(),
                scene.audio.display()
            );
            assets.push(SceneAssets {
                index: scene.index,
                script: scene.script,
                audio: scene.audio,
                image,
            });
        }
        Ok(assets)
    }

    /// Renders every scene in order and writes one MP4 to `output`.
    ///
    /// All-or-nothing: any scene failure aborts the whole video and no output file is left
    /// behind. Downloaded images and intermediate segments live in a per-run temp directory
    /// that is removed on every exit path.
    pub async fn render(&self, input: impl Into<RenderInput>, output: &Path) -> Result<RenderSummary> {
        let payload = input.into().load()?;
        if payload.is_empty() {
            error!("No scenes found in payload");
            return Err(RenderError::EmptyPayload);
        }
        info!(
            "Rendering {} scenes for request '{}' ({})",
            payload.len(),
            payload.request_id(),
            payload.metadata().title
        );

        let checked = check_assets(&payload)?;
        let scope = self.run_scope(payload.request_id())?;
        let assets = self.resolve_images(checked, scope.path()).await?;

        let config = self.config.clone();
        let work_dir = scope.path().to_path_buf();
        let output_path = output.to_path_buf();
        let clips = tokio::task::spawn_blocking(move || encode_video(&config, &assets, &work_dir, &output_path))
            .await
            .map_err(|e| RenderError::runtime("render task failed", e))?;

        drop(scope);
        let clips = clips?;
        info!("Final video written to {}", output.display());
        Ok(RenderSummary {
            output: output.to_path_buf(),
            request_id: payload.request_id().to_string(),
            scene_durations: clips.iter().map(|c| c.duration).collect(),
        })
    }

    /// Same as [`render`](Self::render) for callers without a runtime.
    pub fn render_blocking(&self, input: impl Into<RenderInput>, output: &Path) -> Result<RenderSummary> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.render(input, output))
    }

    /// Writes the composited frame of scene `number` (1-based) at `t` seconds as a PNG.
    pub async fn preview(&self, input: impl Into<RenderInput>, number: usize, t: f64, png: &Path) -> Result<()> {
        let payload = input.into().load()?;
        if payload.is_empty() {
            return Err(RenderError::EmptyPayload);
        }
        let count = payload.len();
        let checked = check_assets(&payload)?;
        let scene = checked
            .into_iter()
            .find(|s| s.index == number)
            .ok_or(RenderError::NoSuchScene { scene: number, count })?;
        let scope = self.run_scope(payload.request_id())?;
        let mut assets = self.resolve_images(vec![scene], scope.path()).await?;
        let Some(assets) = assets.pop() else {
            return Err(RenderError::EmptyPayload);
        };

        let font = resolve_font(&self.config)?;
        let builder = SceneClipBuilder::new(&self.config, &font);
        let mut prepared = builder.prepare(&assets)?;
        let frame = prepared.frame_at(t.clamp(0.0, prepared.duration));
        frame
            .save_with_format(png, image::ImageFormat::Png)
            .map_err(|e| RenderError::media(number, e.into()))?;
        info!("Preview of scene {} at {:.2}s written to {}", number, t, png.display());
        Ok(())
    }
}

fn resolve_font(config: &RenderConfig) -> Result<FontFace> {
    FontFace::resolve(&config.font_search_order(), config.caption_style().font_size).map_err(RenderError::encode)
}

fn encode_video(config: &RenderConfig, assets: &[SceneAssets], work_dir: &Path, output: &Path) -> Result<Vec<SceneClip>> {
    let font = resolve_font(config)?;
    let builder = SceneClipBuilder::new(config, &font);

    let mut clips = Vec::with_capacity(assets.len());
    for scene in assets {
        let segment = work_dir.join(format!("scene_{:03}.mp4", scene.index));
        let clip = builder.build(scene, &segment)?;
        info!("Scene {} rendered: {:.2}s", clip.index, clip.duration);
        clips.push(clip);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let segments: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
    let preexisting = output.exists();
    if let Err(err) = concat_segments(&config.ffmpeg, &segments, config.fps, work_dir, output) {
        discard_partial_output(output, preexisting);
        return Err(RenderError::encode(err));
    }
    Ok(clips)
}

/// Removes what a failed concat left at `output`, unless the file was there before the run.
fn discard_partial_output(output: &Path, preexisting: bool) {
    if !preexisting && output.exists() {
        warn!("Removing partial output {}", output.display());
        let _ = fs::remove_file(output);
    }
}
