//! Renderable style primitives handed to the host.
//!
//! One [`RenderableStyle`] carries up to four sub-objects (fill, stroke,
//! image, text), mirroring what a host draw call consumes. The `z_index`
//! is the layer's position within its evaluation group, not the global
//! document order, so layers sharing a source sort correctly against each
//! other while the whole group occupies one slot in the host's z stack.

use std::rc::Rc;

use glam::DVec2;
use image::RgbaImage;

/// Overlap-suppression participation of a label or icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclutterMode {
    /// Participates and may be suppressed.
    #[default]
    Declutter,
    /// Never suppressed itself, but suppresses others.
    Obstacle,
    /// Ignores decluttering entirely.
    None,
}

/// How a polygon interior is painted.
#[derive(Debug, Clone, PartialEq)]
pub enum FillPaint {
    /// Flat CSS color.
    Color(String),
    /// Tiled sprite region, opacity baked in.
    Pattern(Rc<RgbaImage>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub paint: FillPaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

impl LineCap {
    pub fn parse(s: &str) -> Self {
        match s {
            "round" => LineCap::Round,
            "square" => LineCap::Square,
            _ => LineCap::Butt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl LineJoin {
    pub fn parse(s: &str) -> Self {
        match s {
            "round" => LineJoin::Round,
            "bevel" => LineJoin::Bevel,
            _ => LineJoin::Miter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
    /// Dash pattern in device units, already scaled by width.
    pub dash: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IconStyle {
    pub image: Rc<RgbaImage>,
    /// Scale relative to the image's own pixel ratio.
    pub scale: f64,
    /// Rotation in radians.
    pub rotation: f64,
    pub opacity: f64,
    /// Fractional anchor within the image (0..1 per axis).
    pub anchor: [f64; 2],
    /// Offset from the anchor in device units.
    pub displacement: [f64; 2],
    /// True when the icon rotates with the map (`map` rotation alignment).
    pub rotate_with_map: bool,
    /// Explicit placement point for line-placed icons, in world units.
    pub placement_point: Option<DVec2>,
    pub declutter_mode: DeclutterMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircleStyle {
    pub radius: f64,
    pub fill_color: Option<String>,
    pub stroke_color: Option<String>,
    pub stroke_width: f64,
    pub displacement: [f64; 2],
    pub declutter_mode: DeclutterMode,
}

/// Point-drawn sub-object: an icon or a circle.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStyle {
    Icon(IconStyle),
    Circle(Rc<CircleStyle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextBaseline {
    Top,
    #[default]
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextPlacement {
    #[default]
    Point,
    Line,
}

/// One rich-text section with optional per-section overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSection {
    pub text: String,
    pub font: Option<String>,
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Wrapped content; sections concatenate to this.
    pub content: String,
    pub sections: Vec<TextSection>,
    /// Resolved CSS font string.
    pub font: String,
    pub size: f64,
    pub fill_color: Option<String>,
    pub halo_color: Option<String>,
    /// Stroke width of the halo, already capped and doubled.
    pub halo_width: f64,
    pub offset: [f64; 2],
    pub align: TextAlign,
    pub baseline: TextBaseline,
    pub placement: TextPlacement,
    pub letter_spacing: f64,
    pub declutter_mode: DeclutterMode,
}

/// One drawable primitive, tagged with its in-group z position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderableStyle {
    pub z_index: i32,
    pub fill: Option<FillStyle>,
    pub stroke: Option<StrokeStyle>,
    pub image: Option<ImageStyle>,
    pub text: Option<TextStyle>,
}

impl RenderableStyle {
    /// Whether the same sub-object slots are populated in both styles, the
    /// compatibility test for pooled reuse. Text slots additionally require
    /// equal declutter modes.
    pub fn same_shape(&self, other: &RenderableStyle) -> bool {
        self.fill.is_some() == other.fill.is_some()
            && self.stroke.is_some() == other.stroke.is_some()
            && self.image.is_some() == other.image.is_some()
            && self.text.is_some() == other.text.is_some()
            && match (&self.text, &other.text) {
                (Some(a), Some(b)) => a.declutter_mode == b.declutter_mode,
                _ => true,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_cap_join_parse() {
        assert_eq!(LineCap::parse("round"), LineCap::Round);
        assert_eq!(LineCap::parse("unknown"), LineCap::Butt);
        assert_eq!(LineJoin::parse("bevel"), LineJoin::Bevel);
        assert_eq!(LineJoin::parse(""), LineJoin::Miter);
    }

    #[test]
    fn test_same_shape() {
        let fill = RenderableStyle {
            fill: Some(FillStyle {
                paint: FillPaint::Color("rgba(1,2,3,1)".to_string()),
            }),
            ..Default::default()
        };
        let other_fill = RenderableStyle {
            fill: Some(FillStyle {
                paint: FillPaint::Color("rgba(9,9,9,1)".to_string()),
            }),
            ..Default::default()
        };
        let stroke_only = RenderableStyle {
            stroke: Some(StrokeStyle {
                color: "#000".to_string(),
                width: 1.0,
                cap: LineCap::Butt,
                join: LineJoin::Miter,
                miter_limit: 2.0,
                dash: None,
            }),
            ..Default::default()
        };
        assert!(fill.same_shape(&other_fill));
        assert!(!fill.same_shape(&stroke_only));
    }
}
