//! Sprite atlas handling for icon and pattern rendering.
//!
//! A sprite id resolves to two companion resources: a JSON index (icon name
//! to sub-rectangle) and an image. The host fetches both; this module
//! selects between the high-DPI (`@2x`) and standard variants, decodes the
//! index, and builds per-icon images on demand. Built icons are cached by
//! `(icon, size, halo width, halo color, tint)` and only dropped on an
//! explicit cache clear.

use std::collections::HashMap;
use std::rc::Rc;

use image::{Rgba, RgbaImage};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{StyleError, StyleResult};

/// A single icon's sub-rectangle in the atlas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteEntry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Pixel ratio the entry was rasterized at (1 or 2).
    #[serde(rename = "pixelRatio", default = "default_pixel_ratio")]
    pub pixel_ratio: f32,
    /// Whether the entry is a signed distance field.
    #[serde(default)]
    pub sdf: bool,
}

fn default_pixel_ratio() -> f32 {
    1.0
}

/// One decoded sprite sheet: index plus image.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    pub entries: HashMap<String, SpriteEntry>,
    pub image: Rc<RgbaImage>,
    pub pixel_ratio: f32,
}

impl SpriteSheet {
    /// Decode an index JSON and PNG image pair.
    pub fn decode(index_json: &str, image_bytes: &[u8], pixel_ratio: f32) -> StyleResult<Self> {
        let entries: HashMap<String, SpriteEntry> = serde_json::from_str(index_json)?;
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| StyleError::sprite(format!("image decode failed: {}", e)))?
            .to_rgba8();
        Ok(Self {
            entries,
            image: Rc::new(image),
            pixel_ratio,
        })
    }

    pub fn get(&self, name: &str) -> Option<&SpriteEntry> {
        self.entries.get(name)
    }

    /// Copy an icon's pixels out of the atlas.
    pub fn extract(&self, name: &str) -> Option<RgbaImage> {
        let entry = self.entries.get(name)?;
        if entry.x + entry.width > self.image.width()
            || entry.y + entry.height > self.image.height()
        {
            warn!("sprite '{}' exceeds atlas bounds", name);
            return None;
        }
        let mut out = RgbaImage::new(entry.width, entry.height);
        for y in 0..entry.height {
            for x in 0..entry.width {
                out.put_pixel(x, y, *self.image.get_pixel(entry.x + x, entry.y + y));
            }
        }
        Some(out)
    }
}

/// Raw fetched bytes for one sprite id, as delivered by the host loader.
#[derive(Debug, Clone, Default)]
pub struct SpriteVariants {
    /// Standard-resolution index JSON and image bytes.
    pub standard: Option<(String, Vec<u8>)>,
    /// `@2x` index JSON and image bytes.
    pub high_dpi: Option<(String, Vec<u8>)>,
}

/// All sprite sheets of a style, selected for one display pixel ratio.
#[derive(Debug, Clone, Default)]
pub struct SpriteSet {
    sheets: HashMap<String, SpriteSheet>,
}

/// Default sprite id for styles with a single (string) sprite reference.
pub const DEFAULT_SPRITE_ID: &str = "default";

impl SpriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select and decode sheets from fetched variants. A high-DPI variant
    /// that fails to decode falls back to the standard one; a missing or
    /// broken standard variant fails the whole style application.
    pub fn load(
        variants: &HashMap<String, SpriteVariants>,
        display_pixel_ratio: f32,
    ) -> StyleResult<Self> {
        let mut sheets = HashMap::new();
        for (id, pair) in variants {
            let mut sheet = None;
            if display_pixel_ratio > 1.0 {
                if let Some((json, bytes)) = &pair.high_dpi {
                    match SpriteSheet::decode(json, bytes, 2.0) {
                        Ok(s) => sheet = Some(s),
                        Err(e) => {
                            warn!("sprite '{}': @2x variant failed ({}), falling back", id, e);
                        }
                    }
                }
            }
            let sheet = match sheet {
                Some(s) => s,
                None => {
                    let (json, bytes) = pair.standard.as_ref().ok_or_else(|| {
                        StyleError::sprite(format!("sprite '{}' has no usable variant", id))
                    })?;
                    SpriteSheet::decode(json, bytes, 1.0)?
                }
            };
            sheets.insert(id.clone(), sheet);
        }
        Ok(Self { sheets })
    }

    pub fn sheet(&self, sprite_id: &str) -> Option<&SpriteSheet> {
        self.sheets.get(sprite_id)
    }

    /// Look up an icon across all sheets. Multi-sprite icon references use
    /// the `id:name` form; bare names search the default sheet first.
    pub fn lookup(&self, name: &str) -> Option<(&SpriteSheet, &SpriteEntry)> {
        if let Some((sprite_id, icon)) = name.split_once(':') {
            let sheet = self.sheets.get(sprite_id)?;
            return sheet.get(icon).map(|e| (sheet, e));
        }
        if let Some(sheet) = self.sheets.get(DEFAULT_SPRITE_ID) {
            if let Some(entry) = sheet.get(name) {
                return Some((sheet, entry));
            }
        }
        self.sheets
            .values()
            .find_map(|sheet| sheet.get(name).map(|e| (sheet, e)))
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

/// Convert a signed-distance-field icon into a plain bitmap.
///
/// Pure function: the input is untouched and a new image is returned. The
/// distance cutoff is 0.75 with a small smoothing window around it, so
/// edges stay antialiased.
pub fn unsdf(sdf: &RgbaImage) -> RgbaImage {
    const CUTOFF_LO: f32 = 0.71;
    const CUTOFF_HI: f32 = 0.79;
    let mut out = RgbaImage::new(sdf.width(), sdf.height());
    for (x, y, px) in sdf.enumerate_pixels() {
        let distance = px[3] as f32 / 255.0;
        let t = ((distance - CUTOFF_LO) / (CUTOFF_HI - CUTOFF_LO)).clamp(0.0, 1.0);
        let coverage = t * t * (3.0 - 2.0 * t);
        out.put_pixel(
            x,
            y,
            Rgba([px[0], px[1], px[2], (coverage * 255.0).round() as u8]),
        );
    }
    out
}

/// Multiply an icon's color channels by a tint, preserving alpha.
pub fn tint(image: &RgbaImage, color: [u8; 4]) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        px[0] = ((px[0] as u16 * color[0] as u16) / 255) as u8;
        px[1] = ((px[1] as u16 * color[1] as u16) / 255) as u8;
        px[2] = ((px[2] as u16 * color[2] as u16) / 255) as u8;
        px[3] = ((px[3] as u16 * color[3] as u16) / 255) as u8;
    }
    out
}

/// Composite a widened, colored copy of the icon beneath itself.
pub fn with_halo(image: &RgbaImage, halo_color: [u8; 4], halo_width: u32) -> RgbaImage {
    let r = halo_width as i32;
    let (w, h) = (image.width(), image.height());
    let mut out = RgbaImage::new(w + 2 * halo_width, h + 2 * halo_width);

    // Halo layer: max source alpha within the halo radius.
    for y in 0..out.height() as i32 {
        for x in 0..out.width() as i32 {
            let mut max_alpha = 0u8;
            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let sx = x - r + dx;
                    let sy = y - r + dy;
                    if sx >= 0 && sy >= 0 && (sx as u32) < w && (sy as u32) < h {
                        max_alpha = max_alpha.max(image.get_pixel(sx as u32, sy as u32)[3]);
                    }
                }
            }
            let a = (max_alpha as u16 * halo_color[3] as u16 / 255) as u8;
            out.put_pixel(
                x as u32,
                y as u32,
                Rgba([halo_color[0], halo_color[1], halo_color[2], a]),
            );
        }
    }

    // Base icon over the halo.
    for (x, y, px) in image.enumerate_pixels() {
        let dst = out.get_pixel_mut(x + halo_width, y + halo_width);
        let sa = px[3] as u16;
        let da = 255 - sa;
        for c in 0..3 {
            dst[c] = ((px[c] as u16 * sa + dst[c] as u16 * da) / 255) as u8;
        }
        dst[3] = (sa + dst[3] as u16 * da / 255).min(255) as u8;
    }
    out
}

/// Cache key for built icon images.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconKey {
    pub icon: String,
    pub size_bits: u64,
    pub halo_width_bits: u64,
    pub halo_color: Option<[u8; 4]>,
    pub tint_color: Option<[u8; 4]>,
}

impl IconKey {
    pub fn new(
        icon: &str,
        size: f64,
        halo_width: f64,
        halo_color: Option<[u8; 4]>,
        tint_color: Option<[u8; 4]>,
    ) -> Self {
        Self {
            icon: icon.to_string(),
            size_bits: size.to_bits(),
            halo_width_bits: halo_width.to_bits(),
            halo_color,
            tint_color,
        }
    }
}

/// Built-image caches: icons and fill patterns. Entries are only dropped by
/// an explicit clear, never per feature.
#[derive(Debug, Default)]
pub struct IconCache {
    icons: HashMap<IconKey, Rc<RgbaImage>>,
    /// Plain bitmaps for SDF entries, keyed by icon name. The atlas entry
    /// itself is never mutated.
    unsdf: HashMap<String, Rc<RgbaImage>>,
    patterns: HashMap<(String, u64), Rc<RgbaImage>>,
}

impl IconCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or build a ready-to-draw icon image.
    pub fn icon(
        &mut self,
        sprites: &SpriteSet,
        key: IconKey,
    ) -> Option<Rc<RgbaImage>> {
        if let Some(built) = self.icons.get(&key) {
            return Some(built.clone());
        }

        let (sheet, entry) = sprites.lookup(&key.icon)?;
        let base = if entry.sdf {
            match self.unsdf.get(&key.icon) {
                Some(plain) => (**plain).clone(),
                None => {
                    let plain = Rc::new(unsdf(&sheet.extract(&key.icon)?));
                    self.unsdf.insert(key.icon.clone(), plain.clone());
                    (*plain).clone()
                }
            }
        } else {
            sheet.extract(&key.icon)?
        };

        let tinted = match key.tint_color {
            Some(color) => tint(&base, color),
            None => base,
        };
        let halo_width = f64::from_bits(key.halo_width_bits);
        let built = if halo_width > 0.0 {
            match key.halo_color {
                Some(color) => with_halo(&tinted, color, halo_width.round() as u32),
                None => tinted,
            }
        } else {
            tinted
        };

        let built = Rc::new(built);
        self.icons.insert(key, built.clone());
        Some(built)
    }

    /// Fetch or build a fill pattern image, keyed by `(icon, opacity)`.
    pub fn pattern(
        &mut self,
        sprites: &SpriteSet,
        icon: &str,
        opacity: f64,
    ) -> Option<Rc<RgbaImage>> {
        let key = (icon.to_string(), opacity.to_bits());
        if let Some(built) = self.patterns.get(&key) {
            return Some(built.clone());
        }
        let (sheet, _) = sprites.lookup(icon)?;
        let mut img = sheet.extract(icon)?;
        if opacity < 1.0 {
            for px in img.pixels_mut() {
                px[3] = (px[3] as f64 * opacity).round() as u8;
            }
        }
        let built = Rc::new(img);
        self.patterns.insert(key, built.clone());
        Some(built)
    }

    pub fn clear(&mut self) {
        self.icons.clear();
        self.unsdf.clear();
        self.patterns.clear();
    }

    pub fn len(&self) -> usize {
        self.icons.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty() && self.patterns.is_empty()
    }
}
