//! Style primitive building.
//!
//! Turns one (feature, layer) pair into renderable primitives: fills,
//! strokes, icons, circles and text. Invoked once per feature per frame by
//! the compiled group's style function, so everything here leans on the
//! document caches and the per-group primitive pool.

pub mod builder;
pub mod pool;
pub mod primitives;
pub mod props;
pub mod symbol;

pub use builder::build_layer_style;
pub use pool::StylePool;
pub use primitives::{
    CircleStyle, DeclutterMode, FillPaint, FillStyle, IconStyle, ImageStyle, LineCap, LineJoin,
    RenderableStyle, StrokeStyle, TextAlign, TextBaseline, TextPlacement, TextSection, TextStyle,
};
pub use props::{apply_template, Bag, PropReader};

use std::collections::HashMap;
use std::rc::Rc;

use image::RgbaImage;

/// Host-facing knobs for style evaluation.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    /// Display pixel ratio, used for sprite variant selection at load time.
    pub display_pixel_ratio: f32,
    /// When set, fully transparent colors resolve to the literal
    /// `"transparent"` instead of suppressing the primitive.
    pub render_transparent: bool,
    /// Resolution per integer zoom level, in world units per device unit.
    pub resolutions: Vec<f64>,
    /// Externally supplied images, consulted before the sprite atlas.
    pub images: HashMap<String, Rc<RgbaImage>>,
}

/// Top-of-pyramid resolution of the default web mercator grid.
const MAX_RESOLUTION: f64 = 156543.03392804097;

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            display_pixel_ratio: 1.0,
            render_transparent: false,
            resolutions: (0..=24).map(|z| MAX_RESOLUTION / f64::powi(2.0, z)).collect(),
            images: HashMap::new(),
        }
    }
}

impl StyleOptions {
    pub fn with_display_pixel_ratio(mut self, ratio: f32) -> Self {
        self.display_pixel_ratio = ratio;
        self
    }

    pub fn with_render_transparent(mut self, on: bool) -> Self {
        self.render_transparent = on;
        self
    }

    pub fn with_resolutions(mut self, resolutions: Vec<f64>) -> Self {
        self.resolutions = resolutions;
        self
    }

    pub fn with_image(mut self, name: &str, image: Rc<RgbaImage>) -> Self {
        self.images.insert(name.to_string(), image);
        self
    }

    /// Zoom for a view resolution: the exact grid index when it matches,
    /// log-ratio interpolation between neighbors otherwise.
    pub fn zoom_for_resolution(&self, resolution: f64) -> f64 {
        let grid = &self.resolutions;
        if grid.is_empty() {
            return 0.0;
        }
        if resolution >= grid[0] {
            return 0.0;
        }
        for (i, pair) in grid.windows(2).enumerate() {
            if resolution == pair[0] {
                return i as f64;
            }
            if resolution > pair[1] {
                return i as f64 + (pair[0] / resolution).ln() / std::f64::consts::LN_2;
            }
        }
        (grid.len() - 1) as f64
    }
}
