use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fontdue::{Font, FontSettings};
use tracing::{debug, info, warn};

/// Pixel measurements the layout engine needs from a font.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> u32;
    fn line_height(&self) -> u32;
    fn has_glyph(&self, ch: char) -> bool;

    fn space_width(&self) -> u32 {
        self.text_width(" ")
    }
}

/// Tries each candidate in order and returns the first one `load` accepts.
pub fn resolve_first<T, F>(candidates: &[PathBuf], mut load: F) -> Result<(PathBuf, T)>
where
    F: FnMut(&Path) -> Result<T>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match load(candidate) {
            Ok(loaded) => return Ok((candidate.clone(), loaded)),
            Err(err) => {
                debug!("Font candidate {} rejected: {:#}", candidate.display(), err);
                failures.push(format!("{}: {:#}", candidate.display(), err));
            }
        }
    }
    Err(anyhow!(
        "no usable caption font among {} candidates ({})",
        candidates.len(),
        failures.join("; ")
    ))
}

#[derive(Debug, Clone)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub xmin: i32,
    pub ymin: i32,
    pub coverage: Vec<u8>,
}

/// Last resort when no configured or system font loads.
pub const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");
pub const BUNDLED_FONT_NAME: &str = "<bundled DejaVuSans-Bold>";

pub struct FontFace {
    font: Font,
    size: f32,
    path: PathBuf,
}

impl FontFace {
    pub fn from_bytes(bytes: Vec<u8>, size: f32, path: PathBuf) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))?;
        Ok(Self { font, size, path })
    }

    pub fn load(path: &Path, size: f32) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font file '{}'", path.display()))?;
        Self::from_bytes(bytes, size, path.to_path_buf())
    }

    pub fn bundled(size: f32) -> Result<Self> {
        Self::from_bytes(BUNDLED_FONT.to_vec(), size, PathBuf::from(BUNDLED_FONT_NAME))
    }

    /// First loadable candidate, or the bundled face when none loads.
    pub fn resolve(candidates: &[PathBuf], size: f32) -> Result<Self> {
        match resolve_first(candidates, |path| Self::load(path, size)) {
            Ok((path, face)) => {
                info!("Using caption font {}", path.display());
                Ok(face)
            }
            Err(err) => {
                warn!("{:#}, falling back to the bundled font", err);
                Self::bundled(size)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distance from the top of a line box to the baseline.
    pub fn ascent(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map(|m| m.ascent)
            .unwrap_or(self.size * 0.8)
    }

    pub fn advance(&self, ch: char) -> f32 {
        self.font.metrics(ch, self.size).advance_width
    }

    pub fn rasterize(&self, ch: char) -> GlyphBitmap {
        let (metrics, coverage) = self.font.rasterize(ch, self.size);
        GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            coverage,
        }
    }
}

impl TextMeasure for FontFace {
    fn text_width(&self, text: &str) -> u32 {
        text.chars().map(|ch| self.advance(ch)).sum::<f32>().ceil() as u32
    }

    fn line_height(&self) -> u32 {
        match self.font.horizontal_line_metrics(self.size) {
            Some(m) => (m.ascent - m.descent).ceil().max(1.0) as u32,
            None => {
                warn!("Font {} has no horizontal metrics", self.path.display());
                self.size.ceil() as u32
            }
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        ch == ' ' || self.font.lookup_glyph_index(ch) != 0
    }
}
