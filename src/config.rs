use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

/// Output frame sizes used by callers in practice, plus an escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProfile {
    /// 1080x1920
    Hd,
    /// 1152x2048, matches the image generator's native output
    Tall,
    Custom { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileName {
    Hd,
    Tall,
}

impl FrameProfile {
    pub fn width(&self) -> u32 {
        match self {
            FrameProfile::Hd => 1080,
            FrameProfile::Tall => 1152,
            FrameProfile::Custom { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameProfile::Hd => 1920,
            FrameProfile::Tall => 2048,
            FrameProfile::Custom { height, .. } => *height,
        }
    }
}

impl From<ProfileName> for FrameProfile {
    fn from(name: ProfileName) -> Self {
        match name {
            ProfileName::Hd => FrameProfile::Hd,
            ProfileName::Tall => FrameProfile::Tall,
        }
    }
}

/// Fonts tried after any user-supplied ones. First one that loads wins.
pub const SYSTEM_FONT_CANDIDATES: [&str; 7] = [
    "/usr/share/fonts/truetype/montserrat/Montserrat-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\impact.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub profile: FrameProfile,
    pub fps: u32,
    pub font_candidates: Vec<PathBuf>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub temp_root: PathBuf,
    pub download_timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            profile: FrameProfile::Hd,
            fps: 24,
            font_candidates: Vec::new(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            temp_root: std::env::temp_dir(),
            download_timeout: Duration::from_secs(30),
        }
    }
}

impl RenderConfig {
    pub fn new(profile: FrameProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn width(&self) -> u32 {
        self.profile.width()
    }

    pub fn height(&self) -> u32 {
        self.profile.height()
    }

    /// User fonts first, then the well-known system locations.
    pub fn font_search_order(&self) -> Vec<PathBuf> {
        self.font_candidates
            .iter()
            .cloned()
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from))
            .collect()
    }

    pub fn caption_style(&self) -> CaptionStyle {
        CaptionStyle::for_frame(self.width(), self.height())
    }
}

/// Caption geometry, all derived from the frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionStyle {
    pub frame_width: u32,
    pub frame_height: u32,
    pub font_size: f32,
    pub max_text_width: u32,
    pub padding: u32,
    pub line_spacing: u32,
    pub corner_radius: f32,
    pub blur_sigma: f32,
    pub stroke_width: i32,
    pub background: [u8; 4],
    pub highlight: [u8; 4],
    pub text: [u8; 4],
    pub outline: [u8; 4],
    /// Top edge of the caption card.
    pub anchor_y: u32,
}

impl CaptionStyle {
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            frame_width: width,
            frame_height: height,
            font_size: (height as f32 * 0.04).floor().max(1.0),
            max_text_width: (width as f32 * 0.85) as u32,
            padding: (width.min(height) as f32 * 0.03) as u32,
            line_spacing: ((height as f32 * 0.005) as u32).max(10),
            corner_radius: 15.0,
            blur_sigma: 5.0,
            stroke_width: 3,
            background: [0, 0, 0, 180],
            highlight: [255, 0, 0, 255],
            text: [255, 255, 0, 255],
            outline: [0, 0, 0, 255],
            anchor_y: (height as f32 * 0.625) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_vertical() {
        assert_eq!((FrameProfile::Hd.width(), FrameProfile::Hd.height()), (1080, 1920));
        assert_eq!((FrameProfile::Tall.width(), FrameProfile::Tall.height()), (1152, 2048));
    }

    #[test]
    fn caption_style_scales_with_frame() {
        let style = CaptionStyle::for_frame(1080, 1920);
        assert_eq!(style.max_text_width, 918);
        assert_eq!(style.padding, 32);
        assert_eq!(style.anchor_y, 1200);
        assert_eq!(style.font_size, 76.0);
        assert_eq!(style.line_spacing, 10);
    }

    #[test]
    fn user_fonts_come_first() {
        let mut config = RenderConfig::default();
        config.font_candidates.push(PathBuf::from("/opt/fonts/Brand.ttf"));
        let order = config.font_search_order();
        assert_eq!(order[0], PathBuf::from("/opt/fonts/Brand.ttf"));
        assert_eq!(order.len(), SYSTEM_FONT_CANDIDATES.len() + 1);
    }
}
