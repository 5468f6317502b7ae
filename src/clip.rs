use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{ImageReader, RgbaImage, imageops};
use tracing::{debug, info};

use crate::audio::audio_duration_seconds;
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::ffmpeg::SegmentEncoder;
use crate::font::FontFace;
use crate::image_fit::cover_fit;
use crate::subtitle::{CaptionRenderer, CaptionTrack, SubtitleLayout};

/// Inputs for one scene, all already on local disk.
#[derive(Debug, Clone)]
pub struct SceneAssets {
    /// 1-based scene position.
    pub index: usize,
    pub script: String,
    pub audio: PathBuf,
    pub image: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneClip {
    pub index: usize,
    pub path: PathBuf,
    pub duration: f64,
    pub frames: u64,
}

pub fn frame_count(duration: f64, fps: u32) -> u64 {
    ((duration * fps as f64).ceil() as u64).max(1)
}

pub fn load_image(path: &Path) -> anyhow::Result<image::DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("failed to open image '{}'", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff image format of '{}'", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image '{}'", path.display()))
}

/// A scene ready to be sampled: fitted background plus its caption track.
pub struct PreparedScene<'a> {
    pub index: usize,
    pub duration: f64,
    background: RgbaImage,
    track: CaptionTrack<'a>,
    anchor_y: u32,
}

impl PreparedScene<'_> {
    pub fn layout(&self) -> &SubtitleLayout {
        self.track.layout()
    }

    /// Full composited frame at `t` seconds into the scene.
    pub fn frame_at(&mut self, t: f64) -> RgbaImage {
        let mut frame = self.background.clone();
        let frame_width = frame.width() as i64;
        if let Some(caption) = self.track.frame_at(t) {
            let x = (frame_width - caption.width() as i64) / 2;
            imageops::overlay(&mut frame, caption, x, self.anchor_y as i64);
        }
        frame
    }
}

pub struct SceneClipBuilder<'a> {
    config: &'a RenderConfig,
    font: &'a FontFace,
}

impl<'a> SceneClipBuilder<'a> {
    pub fn new(config: &'a RenderConfig, font: &'a FontFace) -> Self {
        Self { config, font }
    }

    /// Duration comes from the audio; image and captions are held for exactly that long.
    pub fn prepare(&self, assets: &SceneAssets) -> Result<PreparedScene<'a>> {
        let duration = audio_duration_seconds(&self.config.ffprobe, &assets.audio)
            .map_err(|e| RenderError::media(assets.index, e))?;
        let image = load_image(&assets.image).map_err(|e| RenderError::media(assets.index, e))?;
        let background = cover_fit(&image, self.config.width(), self.config.height());

        let style = self.config.caption_style();
        let layout = SubtitleLayout::new(&assets.script, duration, style.max_text_width, self.font);
        debug!(
            "Scene {}: {:.2}s, {} words in {} cards",
            assets.index,
            duration,
            layout.total_words(),
            layout.cards().len()
        );
        let track = CaptionTrack::new(layout, CaptionRenderer::new(self.font, style));
        Ok(PreparedScene {
            index: assets.index,
            duration,
            background,
            track,
            anchor_y: style.anchor_y,
        })
    }

    pub fn build(&self, assets: &SceneAssets, output: &Path) -> Result<SceneClip> {
        let mut scene = self.prepare(assets)?;
        let fps = self.config.fps;
        let frames = frame_count(scene.duration, fps);
        info!(
            "Scene {}: encoding {} frames ({:.2}s) to {}",
            assets.index,
            frames,
            scene.duration,
            output.display()
        );

        let mut encoder = SegmentEncoder::spawn(
            &self.config.ffmpeg,
            self.config.width(),
            self.config.height(),
            fps,
            &assets.audio,
            scene.duration,
            output,
        )
        .map_err(|e| RenderError::media(assets.index, e))?;

        for i in 0..frames {
            let t = i as f64 / fps as f64;
            let frame = scene.frame_at(t);
            encoder
                .write_frame(frame.as_raw())
                .map_err(|e| RenderError::media(assets.index, e))?;
        }
        encoder
            .finish()
            .map_err(|e| RenderError::media(assets.index, e))?;

        Ok(SceneClip {
            index: assets.index,
            path: output.to_path_buf(),
            duration: scene.duration,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cover_whole_audio() {
        assert_eq!(frame_count(1.0, 24), 24);
        assert_eq!(frame_count(1.01, 24), 25);
        assert_eq!(frame_count(0.0, 24), 1);
        assert!(frame_count(4.37, 24) as f64 / 24.0 >= 4.37);
    }

    #[test]
    fn undecodable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_001.img");
        std::fs::write(&path, b"<html>not an image</html>").unwrap();
        let err = load_image(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("scene_001.img"));
    }

    fn scene_on_disk(dir: &Path, script: &str) -> SceneAssets {
        let audio = dir.join("scene_001.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&audio, spec).unwrap();
        for _ in 0..16_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let image = dir.join("scene_001.img");
        RgbaImage::from_pixel(600, 800, image::Rgba([20, 40, 60, 255]))
            .save_with_format(&image, image::ImageFormat::Png)
            .unwrap();
        SceneAssets {
            index: 1,
            script: script.to_string(),
            audio,
            image,
        }
    }

    fn is_background(p: &image::Rgba<u8>) -> bool {
        let expected = [20u8, 40, 60, 255];
        p.0.iter().zip(expected).all(|(a, b)| a.abs_diff(b) <= 2)
    }

    #[test]
    fn composited_frames_at_both_ends_carry_the_caption() {
        let dir = tempfile::tempdir().unwrap();
        let assets = scene_on_disk(dir.path(), "Markets rallied today as central banks paused");
        let config = RenderConfig::default();
        let style = config.caption_style();
        let font = FontFace::bundled(style.font_size).unwrap();
        let builder = SceneClipBuilder::new(&config, &font);
        let mut prepared = builder.prepare(&assets).unwrap();
        assert!((prepared.duration - 2.0).abs() < 1e-9);

        for t in [0.0, prepared.duration - 1e-6] {
            let frame = prepared.frame_at(t);
            assert_eq!(frame.dimensions(), (config.width(), config.height()));
            let red = frame
                .enumerate_pixels()
                .filter(|(_, y, p)| *y >= style.anchor_y && p.0 == style.highlight)
                .count();
            assert!(red > 0, "no highlighted word at t={t}");
            assert!(is_background(frame.get_pixel(5, 5)));
        }
    }

    #[test]
    fn empty_script_holds_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let assets = scene_on_disk(dir.path(), "   ");
        let config = RenderConfig::default();
        let font = FontFace::bundled(config.caption_style().font_size).unwrap();
        let mut prepared = SceneClipBuilder::new(&config, &font).prepare(&assets).unwrap();
        let frame = prepared.frame_at(1.0);
        assert!(frame.pixels().all(is_background));
    }

    #[test]
    fn png_on_disk_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_002.img");
        RgbaImage::from_pixel(4, 8, image::Rgba([1, 2, 3, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        let decoded = load_image(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 8));
    }
}
