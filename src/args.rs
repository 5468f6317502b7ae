use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use headline_shorts::config::{FrameProfile, ProfileName, RenderConfig};

#[derive(Parser, Debug)]
#[clap(about = "Turns a scene payload into a captioned vertical video")]
pub struct Args {
    /// Overrides RUST_LOG, e.g. "debug" or "headline_shorts=trace"
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the whole payload to an MP4
    Render {
        #[clap(long)]
        input: PathBuf,

        #[clap(long, default_value = "final_video.mp4")]
        out: PathBuf,

        #[clap(flatten)]
        render: RenderArgs,
    },
    /// Print scene order and caption statistics without rendering
    Inspect {
        #[clap(long)]
        input: PathBuf,

        #[clap(flatten)]
        render: RenderArgs,
    },
    /// Write one composited frame of a scene as PNG
    Preview {
        #[clap(long)]
        input: PathBuf,

        #[clap(long, default_value_t = 1)]
        scene: usize,

        #[clap(long, default_value_t = 0.0)]
        at: f64,

        #[clap(long, default_value = "preview.png")]
        out: PathBuf,

        #[clap(flatten)]
        render: RenderArgs,
    },
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    #[clap(long, value_enum, default_value = "hd")]
    pub profile: ProfileName,

    /// Custom frame width; requires --height
    #[clap(long, requires = "height")]
    pub width: Option<u32>,

    #[clap(long, requires = "width")]
    pub height: Option<u32>,

    #[clap(long, default_value_t = 24)]
    pub fps: u32,

    /// Caption font, tried before the system fonts. Repeatable.
    #[clap(long = "font")]
    pub fonts: Vec<PathBuf>,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    #[clap(long)]
    pub temp_dir: Option<PathBuf>,
}

impl RenderArgs {
    pub fn to_config(&self) -> RenderConfig {
        let profile = match (self.width, self.height) {
            (Some(width), Some(height)) => FrameProfile::Custom { width, height },
            _ => self.profile.into(),
        };
        let mut config = RenderConfig::new(profile);
        config.fps = self.fps.max(1);
        config.font_candidates = self.fonts.clone();
        config.ffmpeg = self.ffmpeg.clone();
        config.ffprobe = self.ffprobe.clone();
        if let Some(dir) = &self.temp_dir {
            config.temp_root = dir.clone();
        }
        config
    }
}
