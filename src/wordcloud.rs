//! Word cloud rendering: text → frequency-weighted image.
//!
//! ## Pipeline
//!
//! 1. Tokenise (`\w[\w']+`), strip a trailing `'s`, drop stop-words and
//!    pure numbers.
//! 2. Count case-insensitively, fold `dogs` into `dog` when both occur, show
//!    each word in its most frequent casing.
//! 3. Keep the `max_words` most frequent, ties broken alphabetically.
//! 4. Size each word relative to its predecessor and place it on an
//!    Archimedean spiral out from the canvas centre, shrinking until it fits.
//!    A word with no room even at `min_font_size` is left out.
//! 5. Rasterise the glyphs with `rusttype` on a white canvas.
//!
//! ## Why a spiral instead of random placement?
//!
//! The same text must always produce the same image, so placement is fully
//! deterministic. Free space is looked up through a summed-area table over a
//! coarse cell grid, which makes each candidate position an O(1) check. Only
//! cells a glyph actually inks are marked, so small words can still settle
//! into the empty space around ascenders and descenders of larger ones.

use crate::error::ExtractError;
use crate::stopwords::is_stopword;
use image::{ImageFormat, Rgb, RgbImage};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rusttype::{point, Font, Scale};
use serde::Serialize;
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::debug;

/// Bundled DejaVu Sans, used unless `font_path` is set.
static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w[\w']+").unwrap());

/// Side length in pixels of one occupancy cell.
const CELL: u32 = 4;

/// Viridis, dark to light. The final yellow stop is left out; it is
/// unreadable on white.
const PALETTE: [[u8; 3]; 9] = [
    [68, 1, 84],
    [72, 40, 120],
    [62, 73, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [110, 206, 88],
    [181, 222, 43],
];

// ── Configuration ────────────────────────────────────────────────────────

/// Rendering settings for [`generate_wordcloud`].
#[derive(Debug, Clone, PartialEq)]
pub struct WordCloudConfig {
    /// Canvas width in pixels. Default: 800.
    pub width: u32,
    /// Canvas height in pixels. Default: 400.
    pub height: u32,
    /// Most words drawn. Default: 200.
    pub max_words: usize,
    /// Words that only fit below this size are left out. Default: 4.
    pub min_font_size: u32,
    /// Size of the most frequent word. Default: `height * 0.6`.
    pub max_font_size: Option<u32>,
    /// Shrink step while looking for space. Default: 1.
    pub font_step: u32,
    /// How strongly frequency drives size, 0.0..=1.0. Default: 0.5.
    ///
    /// At 0 only rank matters; at 1 a word half as frequent as its
    /// predecessor is drawn half as large.
    pub relative_scaling: f32,
    /// Padding in pixels around each word's box. Default: 2.
    pub margin: u32,
    /// Canvas colour. Default: white.
    pub background: [u8; 3],
    /// TrueType font to use instead of the bundled one.
    pub font_path: Option<PathBuf>,
}

impl Default for WordCloudConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            max_words: 200,
            min_font_size: 4,
            max_font_size: None,
            font_step: 1,
            relative_scaling: 0.5,
            margin: 2,
            background: [255, 255, 255],
            font_path: None,
        }
    }
}

impl WordCloudConfig {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.width < CELL || self.height < CELL {
            return Err(ExtractError::InvalidConfig(format!(
                "Word cloud must be at least {CELL}x{CELL} pixels, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_words == 0 {
            return Err(ExtractError::InvalidConfig("max_words must be ≥ 1".into()));
        }
        if self.min_font_size == 0 || self.font_step == 0 {
            return Err(ExtractError::InvalidConfig(
                "min_font_size and font_step must be ≥ 1".into(),
            ));
        }
        if let Some(max) = self.max_font_size {
            if max < self.min_font_size {
                return Err(ExtractError::InvalidConfig(format!(
                    "max_font_size ({max}) is below min_font_size ({})",
                    self.min_font_size
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.relative_scaling) {
            return Err(ExtractError::InvalidConfig(format!(
                "relative_scaling must be within 0.0..=1.0, got {}",
                self.relative_scaling
            )));
        }
        Ok(())
    }

    fn start_font_size(&self) -> u32 {
        self.max_font_size
            .unwrap_or_else(|| (self.height as f32 * 0.6).round() as u32)
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// One word as drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedWord {
    pub text: String,
    /// Occurrences in the source text.
    pub count: usize,
    pub font_size: u32,
    /// Top-left corner of the text box.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: [u8; 3],
}

/// A rendered word cloud.
#[derive(Debug, Clone)]
pub struct WordCloud {
    pub image: RgbImage,
    /// Drawn words, most frequent first.
    pub words: Vec<PlacedWord>,
}

impl WordCloud {
    /// Encode the image as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, ExtractError> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ExtractError::ImageEncode(e.to_string()))?;
        debug!("Encoded word cloud → {} bytes PNG", buf.len());
        Ok(buf)
    }
}

// ── Public entry points ──────────────────────────────────────────────────

/// Count words the way they will appear in the cloud.
///
/// Sorted by count descending, then word ascending.
pub fn word_frequencies(text: &str) -> Vec<(String, usize)> {
    // lowercase form → (casing → count), both in first-seen order
    let mut by_lower: IndexMap<String, IndexMap<String, usize>> = IndexMap::new();

    for m in RE_WORD.find_iter(text) {
        let mut word = m.as_str();
        if word.ends_with("'s") || word.ends_with("'S") {
            word = &word[..word.len() - 2];
        }
        if word.is_empty() || word.chars().all(char::is_numeric) || is_stopword(word) {
            continue;
        }
        *by_lower
            .entry(word.to_lowercase())
            .or_default()
            .entry(word.to_string())
            .or_insert(0) += 1;
    }

    let plurals: Vec<String> = by_lower
        .keys()
        .filter(|k| {
            k.ends_with('s') && !k.ends_with("ss") && by_lower.contains_key(&k[..k.len() - 1])
        })
        .cloned()
        .collect();

    for plural in plurals {
        let Some(casings) = by_lower.shift_remove(&plural) else {
            continue;
        };
        let singular = by_lower
            .entry(plural[..plural.len() - 1].to_string())
            .or_default();
        for (casing, count) in casings {
            *singular
                .entry(casing[..casing.len() - 1].to_string())
                .or_insert(0) += count;
        }
    }

    let mut counts: Vec<(String, usize)> = by_lower
        .into_values()
        .filter_map(|casings| {
            let total = casings.values().sum();
            let mut best: Option<(&String, usize)> = None;
            for (casing, &count) in &casings {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((casing, count));
                }
            }
            best.map(|(casing, _)| (casing.clone(), total))
        })
        .collect();

    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Render `text` as a word cloud.
///
/// # Errors
/// - [`ExtractError::NoWords`] when nothing survives tokenising
/// - [`ExtractError::InvalidConfig`] for a bad config or unusable font
/// - [`ExtractError::Io`] when `font_path` cannot be read
pub fn generate_wordcloud(text: &str, config: &WordCloudConfig) -> Result<WordCloud, ExtractError> {
    config.validate()?;

    let mut frequencies = word_frequencies(text);
    if frequencies.is_empty() {
        return Err(ExtractError::NoWords);
    }
    frequencies.truncate(config.max_words);

    let font = load_font(config)?;
    let words = layout_words(&frequencies, &font, config);
    debug!(
        "Word cloud: placed {}/{} words",
        words.len(),
        frequencies.len()
    );

    let mut image = RgbImage::from_pixel(config.width, config.height, Rgb(config.background));
    for word in &words {
        draw_word(&mut image, &font, word);
    }

    Ok(WordCloud { image, words })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn load_font(config: &WordCloudConfig) -> Result<Font<'static>, ExtractError> {
    match config.font_path {
        Some(ref path) => {
            let data = std::fs::read(path).map_err(|e| ExtractError::Io {
                path: path.clone(),
                source: e,
            })?;
            Font::try_from_vec(data).ok_or_else(|| {
                ExtractError::InvalidConfig(format!("'{}' is not a usable font", path.display()))
            })
        }
        None => Font::try_from_bytes(EMBEDDED_FONT)
            .ok_or_else(|| ExtractError::Internal("bundled font failed to parse".into())),
    }
}

fn layout_words(
    frequencies: &[(String, usize)],
    font: &Font<'_>,
    config: &WordCloudConfig,
) -> Vec<PlacedWord> {
    let max_count = frequencies.first().map_or(1, |(_, c)| *c).max(1) as f32;
    let rs = config.relative_scaling;
    let half_margin = config.margin / 2;

    let mut grid = OccupancyGrid::new(config.width, config.height);
    let mut placed = Vec::with_capacity(frequencies.len());
    let mut font_size = config.start_font_size();
    let mut last_freq = 1.0f32;

    for (rank, (word, count)) in frequencies.iter().enumerate() {
        let freq = *count as f32 / max_count;
        if rs > 0.0 {
            font_size = ((rs * (freq / last_freq) + (1.0 - rs)) * font_size as f32).round() as u32;
            font_size = font_size.max(config.min_font_size);
        }

        let mut found = None;
        while font_size >= config.min_font_size {
            let (w, h) = text_extent(font, font_size, word);
            if let Some(pos) = grid.find_space(w + config.margin, h + config.margin) {
                found = Some((pos, w, h));
                break;
            }
            font_size = font_size.saturating_sub(config.font_step);
        }

        let Some(((x, y), width, height)) = found else {
            debug!("No room left at minimum size for '{}'", word);
            font_size = config.min_font_size;
            continue;
        };

        let word = PlacedWord {
            text: word.clone(),
            count: *count,
            font_size,
            x: x + half_margin,
            y: y + half_margin,
            width,
            height,
            color: PALETTE[rank % PALETTE.len()],
        };
        rasterize(font, &word, |px, py, _| grid.mark(px, py));
        grid.rebuild();
        placed.push(word);
        last_freq = freq;
    }

    placed
}

/// Pixel width and height of `text` at `size`.
fn text_extent(font: &Font<'_>, size: u32, text: &str) -> (u32, u32) {
    let scale = Scale::uniform(size as f32);
    let v = font.v_metrics(scale);

    let mut width = 0.0f32;
    for glyph in font.layout(text, scale, point(0.0, v.ascent)) {
        let advance = glyph.position().x + glyph.unpositioned().h_metrics().advance_width;
        width = width.max(advance);
        if let Some(bb) = glyph.pixel_bounding_box() {
            width = width.max(bb.max.x as f32);
        }
    }

    (width.ceil() as u32, (v.ascent - v.descent).ceil() as u32)
}

/// Call `ink` for every pixel `word` covers, with its coverage.
fn rasterize(font: &Font<'_>, word: &PlacedWord, mut ink: impl FnMut(i32, i32, f32)) {
    let scale = Scale::uniform(word.font_size as f32);
    let v = font.v_metrics(scale);
    let origin = point(word.x as f32, word.y as f32 + v.ascent);

    for glyph in font.layout(&word.text, scale, origin) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            if coverage > 0.0 {
                ink(bb.min.x + gx as i32, bb.min.y + gy as i32, coverage);
            }
        });
    }
}

fn draw_word(image: &mut RgbImage, font: &Font<'_>, word: &PlacedWord) {
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);
    rasterize(font, word, |px, py, coverage| {
        if px < 0 || py < 0 || px >= img_w || py >= img_h {
            return;
        }
        let pixel = image.get_pixel_mut(px as u32, py as u32);
        for (channel, &fg) in pixel.0.iter_mut().zip(word.color.iter()) {
            *channel = blend(*channel, fg, coverage);
        }
    });
}

fn blend(bg: u8, fg: u8, alpha: f32) -> u8 {
    let a = alpha.clamp(0.0, 1.0);
    (bg as f32 * (1.0 - a) + fg as f32 * a).round() as u8
}

/// Coarse occupancy map with a summed-area table for O(1) box queries.
struct OccupancyGrid {
    cols: usize,
    rows: usize,
    occupied: Vec<bool>,
    /// `(rows + 1) * (cols + 1)` prefix sums of `occupied`.
    integral: Vec<u32>,
}

impl OccupancyGrid {
    fn new(width: u32, height: u32) -> Self {
        let cols = (width / CELL) as usize;
        let rows = (height / CELL) as usize;
        Self {
            cols,
            rows,
            occupied: vec![false; cols * rows],
            integral: vec![0; (cols + 1) * (rows + 1)],
        }
    }

    fn cells(px: u32) -> usize {
        px.div_ceil(CELL) as usize
    }

    /// Number of occupied cells in `[c0, c1) x [r0, r1)`.
    fn occupied_in(&self, c0: usize, r0: usize, c1: usize, r1: usize) -> u32 {
        let stride = self.cols + 1;
        let at = |r: usize, c: usize| self.integral[r * stride + c];
        (at(r1, c1) + at(r0, c0)) - (at(r0, c1) + at(r1, c0))
    }

    /// Top-left pixel of the free `w x h` box closest along the spiral.
    fn find_space(&self, w: u32, h: u32) -> Option<(u32, u32)> {
        let (bw, bh) = (Self::cells(w), Self::cells(h));
        if bw == 0 || bh == 0 || bw > self.cols || bh > self.rows {
            return None;
        }

        let (max_col, max_row) = (self.cols - bw, self.rows - bh);
        let (cx, cy) = (max_col as f32 / 2.0, max_row as f32 / 2.0);

        // Stretch the spiral to the canvas aspect ratio.
        let aspect = self.cols as f32 / self.rows as f32;
        let (ax, ay) = (aspect.max(1.0), (1.0 / aspect).max(1.0));
        let stretch = ax.max(ay);
        let b = 1.0 / (2.0 * PI * stretch);
        let r_max = (cx / ax).hypot(cy / ay) + 1.0;

        let mut theta = 0.0f32;
        let mut last = None;
        loop {
            let r = b * theta;
            if r > r_max {
                return None;
            }
            let col = (cx + r * ax * theta.cos()).round();
            let row = (cy + r * ay * theta.sin()).round();
            if col >= 0.0 && row >= 0.0 && col <= max_col as f32 && row <= max_row as f32 {
                let cell = (col as usize, row as usize);
                if last != Some(cell) {
                    last = Some(cell);
                    if self.occupied_in(cell.0, cell.1, cell.0 + bw, cell.1 + bh) == 0 {
                        return Some((cell.0 as u32 * CELL, cell.1 as u32 * CELL));
                    }
                }
            }
            theta += (1.0 / (r * stretch + 1.0)).min(0.5);
        }
    }

    /// Mark the cell holding pixel `(px, py)`; call [`Self::rebuild`] after.
    fn mark(&mut self, px: i32, py: i32) {
        if px < 0 || py < 0 {
            return;
        }
        let (c, r) = (px as usize / CELL as usize, py as usize / CELL as usize);
        if c < self.cols && r < self.rows {
            self.occupied[r * self.cols + c] = true;
        }
    }

    fn rebuild(&mut self) {
        let stride = self.cols + 1;
        for r in 0..self.rows {
            let mut row_sum = 0u32;
            for c in 0..self.cols {
                row_sum += self.occupied[r * self.cols + c] as u32;
                self.integral[(r + 1) * stride + c + 1] = self.integral[r * stride + c + 1] + row_sum;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_fold_case_and_plurals() {
        let freqs = word_frequencies("Dog dog dogs DOG cat's cats 2024 cat");
        assert_eq!(
            freqs,
            vec![("dog".to_string(), 4), ("cat".to_string(), 3)]
        );
    }

    #[test]
    fn frequencies_keep_double_s_words() {
        let freqs = word_frequencies("glass glas glass");
        assert_eq!(
            freqs,
            vec![("glass".to_string(), 2), ("glas".to_string(), 1)]
        );
    }

    #[test]
    fn frequencies_drop_stopwords_and_single_letters() {
        let freqs = word_frequencies("The product is a product of X and it's final");
        assert_eq!(
            freqs,
            vec![("product".to_string(), 2), ("final".to_string(), 1)]
        );
    }

    #[test]
    fn frequency_ties_sort_alphabetically() {
        let freqs = word_frequencies("zeta alpha mid");
        let words: Vec<_> = freqs.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn grid_finds_centre_first() {
        let grid = OccupancyGrid::new(800, 400);
        let (x, y) = grid.find_space(40, 20).unwrap();
        assert_eq!((x, y), (380, 192));
    }

    #[test]
    fn grid_avoids_occupied_cells() {
        let mut grid = OccupancyGrid::new(80, 40);
        for py in 0..20 {
            for px in 0..80 {
                grid.mark(px, py);
            }
        }
        grid.mark(-1, 100);
        grid.rebuild();
        let (_, y) = grid.find_space(16, 16).unwrap();
        assert!(y >= 20, "placed at y={y}");
        assert!(grid.find_space(16, 24).is_none());
    }

    fn distinct_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{i:03} "))
            .collect::<String>()
    }

    #[test]
    fn layout_fills_the_canvas_with_many_words() {
        let text = distinct_words(150);
        let cloud = generate_wordcloud(&text, &WordCloudConfig::default()).unwrap();
        assert!(
            cloud.words.len() > 110,
            "only {} of 150 words placed",
            cloud.words.len()
        );
    }

    #[test]
    fn later_words_never_cover_earlier_ink() {
        let config = WordCloudConfig::default();
        let font = load_font(&config).unwrap();
        let text = distinct_words(60);
        let cloud = generate_wordcloud(&text, &config).unwrap();

        for (i, earlier) in cloud.words.iter().enumerate() {
            let mut ink = Vec::new();
            rasterize(&font, earlier, |px, py, _| ink.push((px, py)));
            for later in &cloud.words[i + 1..] {
                let (x0, y0) = (later.x as i32, later.y as i32);
                let (x1, y1) = (x0 + later.width as i32, y0 + later.height as i32);
                let hit = ink
                    .iter()
                    .find(|&&(px, py)| px >= x0 && px < x1 && py >= y0 && py < y1);
                assert!(
                    hit.is_none(),
                    "'{}' sits on ink of '{}' at {:?}",
                    later.text,
                    earlier.text,
                    hit
                );
            }
        }
    }

    #[test]
    fn grid_rejects_oversized_boxes() {
        let grid = OccupancyGrid::new(80, 40);
        assert!(grid.find_space(81, 10).is_none());
        assert!(grid.find_space(10, 41).is_none());
    }

    #[test]
    fn validate_rejects_bad_scaling() {
        let config = WordCloudConfig {
            relative_scaling: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn blend_extremes() {
        assert_eq!(blend(255, 0, 0.0), 255);
        assert_eq!(blend(255, 0, 1.0), 0);
        assert_eq!(blend(255, 0, 2.0), 0);
    }
}
