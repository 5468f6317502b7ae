use std::collections::HashMap;
use std::sync::LazyLock;

use image::{Rgba, RgbaImage};
use regex::Regex;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use tracing::debug;

use crate::config::CaptionStyle;
use crate::font::{FontFace, GlyphBitmap, TextMeasure};

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Cc}").expect("valid control-character pattern"));

/// Control characters become spaces, characters the font cannot draw become `?`.
pub fn normalize_text<M: TextMeasure + ?Sized>(text: &str, measure: &M) -> String {
    let cleaned = CONTROL_CHARS.replace_all(text, " ");
    cleaned
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || measure.has_glyph(ch) {
                ch
            } else {
                '?'
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub words: Vec<String>,
    pub width: u32,
    pub height: u32,
}

/// One or two lines shown together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub lines: Vec<Line>,
}

impl Card {
    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|l| l.words.len()).sum()
    }

    pub fn text_width(&self) -> u32 {
        self.lines.iter().map(|l| l.width).max().unwrap_or(0)
    }

    pub fn text_height(&self, line_spacing: u32) -> u32 {
        let heights: u32 = self.lines.iter().map(|l| l.height).sum();
        heights + line_spacing * (self.lines.len().saturating_sub(1) as u32)
    }
}

/// Greedy wrap. A word wider than `max_width` still gets a line of its own.
pub fn wrap_words_into_lines<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: u32,
    measure: &M,
) -> Vec<Line> {
    let space = measure.space_width();
    let height = measure.line_height();
    let mut lines = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_width = 0u32;

    for word in text.split_whitespace() {
        let word_width = measure.text_width(word);
        let new_width = if current.is_empty() {
            word_width
        } else {
            current_width + space + word_width
        };
        if new_width <= max_width {
            current.push(word.to_string());
            current_width = new_width;
        } else {
            if !current.is_empty() {
                lines.push(Line {
                    words: std::mem::take(&mut current),
                    width: current_width,
                    height,
                });
            }
            current.push(word.to_string());
            current_width = word_width;
        }
    }
    if !current.is_empty() {
        lines.push(Line {
            words: current,
            width: current_width,
            height,
        });
    }
    lines
}

pub fn group_cards(lines: Vec<Line>) -> Vec<Card> {
    let mut cards = Vec::new();
    let mut iter = lines.into_iter();
    while let Some(first) = iter.next() {
        let mut card = vec![first];
        if let Some(second) = iter.next() {
            card.push(second);
        }
        cards.push(Card { lines: card });
    }
    cards
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub card: usize,
    /// Index of the lit word within the card.
    pub word: usize,
}

/// Word-timed caption cards for one scene.
#[derive(Debug, Clone)]
pub struct SubtitleLayout {
    cards: Vec<Card>,
    cumulative: Vec<usize>,
    total_words: usize,
    duration: f64,
}

impl SubtitleLayout {
    pub fn new<M: TextMeasure + ?Sized>(
        text: &str,
        duration: f64,
        max_width: u32,
        measure: &M,
    ) -> Self {
        let safe_text = normalize_text(text, measure);
        let lines = wrap_words_into_lines(&safe_text, max_width, measure);
        let cards = group_cards(lines);
        let mut cumulative = Vec::with_capacity(cards.len());
        let mut running = 0;
        for card in &cards {
            running += card.word_count();
            cumulative.push(running);
        }
        debug!(
            "Subtitle layout: {} words, {} cards over {:.2}s",
            running,
            cards.len(),
            duration
        );
        Self {
            cards,
            cumulative,
            total_words: running,
            duration,
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn line_count(&self) -> usize {
        self.cards.iter().map(|c| c.lines.len()).sum()
    }

    /// Uniform speaking rate; an empty script counts as one word.
    pub fn word_duration(&self) -> f64 {
        self.duration / self.total_words.max(1) as f64
    }

    pub fn global_word_at(&self, t: f64) -> Option<usize> {
        if self.total_words == 0 {
            return None;
        }
        let word_time = self.word_duration();
        let raw = if word_time > 0.0 && t.is_finite() {
            // Slots are half-open; nudge so t = k * word_time lands in slot k despite rounding.
            (t / word_time + 1e-9).floor()
        } else {
            0.0
        };
        let last = (self.total_words - 1) as f64;
        Some(raw.clamp(0.0, last) as usize)
    }

    pub fn highlight_at(&self, t: f64) -> Option<Highlight> {
        let global = self.global_word_at(t)?;
        let card = self.cumulative.partition_point(|&c| c <= global);
        let previous = if card > 0 { self.cumulative[card - 1] } else { 0 };
        Some(Highlight {
            card,
            word: global - previous,
        })
    }
}

/// Draws caption cards. Glyph bitmaps are cached per character.
pub struct CaptionRenderer<'a> {
    font: &'a FontFace,
    style: CaptionStyle,
    glyphs: HashMap<char, GlyphBitmap>,
    stroke_offsets: Vec<(i32, i32)>,
}

impl<'a> CaptionRenderer<'a> {
    pub fn new(font: &'a FontFace, style: CaptionStyle) -> Self {
        let r = style.stroke_width;
        let stroke_offsets = (-r..=r)
            .flat_map(|dx| (-r..=r).map(move |dy| (dx, dy)))
            .filter(|&(dx, dy)| (dx, dy) != (0, 0) && dx * dx + dy * dy <= r * r)
            .collect();
        Self {
            font,
            style,
            glyphs: HashMap::new(),
            stroke_offsets,
        }
    }

    pub fn render_card(&mut self, card: &Card, highlighted: usize) -> RgbaImage {
        let style = self.style;
        let pad = style.padding;
        let max_w = card.text_width().min(style.max_text_width).max(1);
        let total_h = card.text_height(style.line_spacing).max(1);
        let mut canvas = rounded_background(
            max_w + 2 * pad,
            total_h + 2 * pad,
            style.corner_radius,
            style.background,
            style.blur_sigma,
        );

        let space = self.font.space_width() as f32;
        let ascent = self.font.ascent();
        let mut y = pad as f32;
        let mut index = 0usize;
        for line in &card.lines {
            let mut x = pad as f32 + (max_w as f32 - line.width as f32) / 2.0;
            let baseline = y + ascent;
            for word in &line.words {
                let color = if index == highlighted {
                    style.highlight
                } else {
                    style.text
                };
                x = self.draw_word(&mut canvas, word, x, baseline, color);
                x += space;
                index += 1;
            }
            y += (line.height + style.line_spacing) as f32;
        }
        canvas
    }

    /// Returns the pen position after the word.
    fn draw_word(&mut self, canvas: &mut RgbaImage, word: &str, x: f32, baseline: f32, color: [u8; 4]) -> f32 {
        let outline = self.style.outline;
        let mut pen = x;
        let mut placed = Vec::with_capacity(word.len());
        for ch in word.chars() {
            let font = self.font;
            let glyph = self.glyphs.entry(ch).or_insert_with(|| font.rasterize(ch));
            let left = pen.round() as i32 + glyph.xmin;
            let top = baseline.round() as i32 - glyph.ymin - glyph.height as i32;
            placed.push((ch, left, top));
            pen += self.font.advance(ch);
        }
        for &(dx, dy) in &self.stroke_offsets {
            for &(ch, left, top) in &placed {
                if let Some(glyph) = self.glyphs.get(&ch) {
                    blend_glyph(canvas, glyph, left + dx, top + dy, outline);
                }
            }
        }
        for &(ch, left, top) in &placed {
            if let Some(glyph) = self.glyphs.get(&ch) {
                blend_glyph(canvas, glyph, left, top, color);
            }
        }
        pen
    }
}

/// Semi-transparent rounded rectangle, softened with a gaussian blur.
pub fn rounded_background(width: u32, height: u32, radius: f32, fill: [u8; 4], blur_sigma: f32) -> RgbaImage {
    let mut image = RgbaImage::new(width, height);
    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return image;
    };
    let (w, h) = (width as f32, height as f32);
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    let mut pb = PathBuilder::new();
    pb.move_to(r, 0.0);
    pb.line_to(w - r, 0.0);
    pb.quad_to(w, 0.0, w, r);
    pb.line_to(w, h - r);
    pb.quad_to(w, h, w - r, h);
    pb.line_to(r, h);
    pb.quad_to(0.0, h, 0.0, h - r);
    pb.line_to(0.0, r);
    pb.quad_to(0.0, 0.0, r, 0.0);
    pb.close();
    if let Some(path) = pb.finish() {
        let mut paint = Paint::default();
        paint.set_color_rgba8(fill[0], fill[1], fill[2], fill[3]);
        paint.anti_alias = true;
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    if blur_sigma > 0.0 {
        image = image::imageops::blur(&image, blur_sigma);
    }
    image
}

fn blend_glyph(canvas: &mut RgbaImage, glyph: &GlyphBitmap, left: i32, top: i32, color: [u8; 4]) {
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    for gy in 0..glyph.height {
        let py = top + gy as i32;
        if py < 0 || py >= ch {
            continue;
        }
        for gx in 0..glyph.width {
            let px = left + gx as i32;
            if px < 0 || px >= cw {
                continue;
            }
            let coverage = glyph.coverage[gy * glyph.width + gx];
            if coverage == 0 {
                continue;
            }
            blend_pixel(canvas.get_pixel_mut(px as u32, py as u32), color, coverage);
        }
    }
}

/// Source-over with straight alpha.
pub fn blend_pixel(dst: &mut Rgba<u8>, color: [u8; 4], coverage: u8) {
    let sa = (color[3] as f32 / 255.0) * (coverage as f32 / 255.0);
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    let mut out = [0u8; 4];
    for i in 0..3 {
        let value = (color[i] as f32 * sa + dst[i] as f32 * da * (1.0 - sa)) / out_a;
        out[i] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    *dst = Rgba(out);
}

/// A scene's captions as a function of time. Consecutive frames usually share a
/// card and highlight, so the last rendered card is kept.
pub struct CaptionTrack<'a> {
    layout: SubtitleLayout,
    renderer: CaptionRenderer<'a>,
    last: Option<(Highlight, RgbaImage)>,
}

impl<'a> CaptionTrack<'a> {
    pub fn new(layout: SubtitleLayout, renderer: CaptionRenderer<'a>) -> Self {
        Self {
            layout,
            renderer,
            last: None,
        }
    }

    pub fn layout(&self) -> &SubtitleLayout {
        &self.layout
    }

    /// `None` when the script has no words: nothing is drawn for that scene.
    pub fn frame_at(&mut self, t: f64) -> Option<&RgbaImage> {
        let highlight = self.layout.highlight_at(t)?;
        let stale = self.last.as_ref().is_none_or(|(key, _)| *key != highlight);
        if stale {
            let card = &self.layout.cards[highlight.card];
            let image = self.renderer.render_card(card, highlight.word);
            self.last = Some((highlight, image));
        }
        self.last.as_ref().map(|(_, image)| image)
    }
}
