pub mod assembler;
pub mod audio;
pub mod clip;
pub mod config;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod font;
pub mod image_fit;
pub mod payload;
pub mod subtitle;

pub use assembler::{RenderInput, RenderSummary, VideoAssembler};
pub use config::{FrameProfile, RenderConfig};
pub use error::{AssetKind, RenderError, Result};
pub use payload::{Metadata, Payload, Scene};
