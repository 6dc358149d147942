//! Symbol layer resolution: icons and labels.

use serde_json::Value;

use crate::color::{color_with_opacity, Rgba};
use crate::expr::{evaluate_expression, value_to_string};
use crate::feature::{flat_midpoint, path_length, placement_angle, Feature};
use crate::render::builder::BuildInputs;
use crate::render::pool::StylePool;
use crate::render::primitives::{
    DeclutterMode, IconStyle, ImageStyle, RenderableStyle, TextAlign, TextBaseline, TextPlacement,
    TextSection, TextStyle,
};
use crate::render::props::{apply_template, Bag, PropReader};
use crate::sprite::IconKey;

/// Minimum projected line length for icon placement, in device units.
/// Shorter segments would just be cluttered by their icon.
const MIN_LINE_ICON_LENGTH: f64 = 150.0;

/// Segment-matching tolerance when deriving a placement angle.
const ANGLE_TOLERANCE: f64 = 1e-10;

fn declutter_mode(reader: &PropReader, allow: &str, ignore: &str) -> DeclutterMode {
    match (
        reader.boolean(Bag::Layout, allow),
        reader.boolean(Bag::Layout, ignore),
    ) {
        (false, _) => DeclutterMode::Declutter,
        (true, false) => DeclutterMode::Obstacle,
        (true, true) => DeclutterMode::None,
    }
}

fn rgba_bytes(color: Rgba) -> [u8; 4] {
    let (r, g, b, a) = color.to_straight_u8();
    [r, g, b, (a * 255.0).round() as u8]
}

/// Fractional in-image anchor for an anchor keyword.
fn anchor_fraction(anchor: &str) -> [f64; 2] {
    let x = if anchor.contains("left") {
        0.0
    } else if anchor.contains("right") {
        1.0
    } else {
        0.5
    };
    let y = if anchor.starts_with("top") {
        0.0
    } else if anchor.starts_with("bottom") {
        1.0
    } else {
        0.5
    };
    [x, y]
}

pub(crate) fn build_icon(
    reader: &PropReader,
    z_index: i32,
    feature: &Feature,
    resolution: f64,
    inputs: &BuildInputs,
    pool: &mut StylePool,
) {
    let Some(raw_name) = reader.opt_string(Bag::Layout, "icon-image") else {
        return;
    };
    let name = apply_template(&raw_name, &feature.properties);
    if name.is_empty() {
        return;
    }

    let placement = reader.string(Bag::Layout, "symbol-placement");
    let alignment = reader.string(Bag::Layout, "icon-rotation-alignment");
    let mut placement_point = None;
    let mut line_rotation = 0.0;
    if let Some(coords) = feature.geometry.line_coordinates() {
        if path_length(coords) / resolution <= MIN_LINE_ICON_LENGTH {
            return;
        }
        let Some(mid) = flat_midpoint(coords) else {
            return;
        };
        placement_point = Some(mid);
        if alignment == "map" && placement == "line" {
            line_rotation = placement_angle(coords, mid, ANGLE_TOLERANCE);
        }
    }

    let size = reader.number(Bag::Layout, "icon-size");
    let rotation = reader.number(Bag::Layout, "icon-rotate").to_radians() + line_rotation;
    let displacement = reader
        .number_array(Bag::Layout, "icon-offset")
        .filter(|o| o.len() >= 2)
        .map(|o| [o[0], o[1]])
        .unwrap_or([0.0, 0.0]);

    let (image, scale) = if let Some(external) = inputs.options.images.get(&name) {
        (external.clone(), size)
    } else {
        let Some((_, entry)) = inputs.sprites.lookup(&name) else {
            // Unknown icon degrades to "nothing drawn", not an error.
            return;
        };
        let pixel_ratio = entry.pixel_ratio as f64;
        let tint = reader.color(Bag::Paint, "icon-color").map(rgba_bytes);
        let halo_color = reader.color(Bag::Paint, "icon-halo-color").map(rgba_bytes);
        let halo_width = reader.number(Bag::Paint, "icon-halo-width");
        let key = IconKey::new(&name, size, halo_width, halo_color, tint);
        let Some(image) = inputs.icon_cache.borrow_mut().icon(inputs.sprites, key) else {
            return;
        };
        (image, size / pixel_ratio)
    };

    pool.emit(RenderableStyle {
        z_index,
        fill: None,
        stroke: None,
        image: Some(ImageStyle::Icon(IconStyle {
            image,
            scale,
            rotation,
            opacity: reader.number(Bag::Paint, "icon-opacity"),
            anchor: anchor_fraction(&reader.string(Bag::Layout, "icon-anchor")),
            displacement,
            rotate_with_map: alignment == "map",
            placement_point,
            declutter_mode: declutter_mode(reader, "icon-allow-overlap", "icon-ignore-placement"),
        })),
        text: None,
    });
}

struct RawSection {
    text: String,
    fonts: Option<Vec<String>>,
    scale: Option<f64>,
}

/// Pull rich-text sections out of a `format` expression.
fn format_sections(arr: &[Value], reader: &PropReader) -> Vec<RawSection> {
    let ctx = reader.ctx();
    let mut sections: Vec<RawSection> = Vec::new();
    for el in &arr[1..] {
        if let Value::Object(opts) = el {
            if let Some(section) = sections.last_mut() {
                section.scale = opts
                    .get("font-scale")
                    .and_then(|fs| evaluate_expression(fs, ctx))
                    .and_then(|v| v.as_f64());
                section.fonts = opts
                    .get("text-font")
                    .and_then(|tf| evaluate_expression(tf, ctx))
                    .and_then(|v| {
                        v.as_array()?
                            .iter()
                            .map(|f| f.as_str().map(str::to_string))
                            .collect()
                    });
            }
        } else {
            let text = evaluate_expression(el, ctx)
                .map(|v| value_to_string(&v))
                .unwrap_or_default();
            sections.push(RawSection {
                text,
                fonts: None,
                scale: None,
            });
        }
    }
    sections
}

fn transform_case(text: String, transform: &str) -> String {
    match transform {
        "uppercase" => text.to_uppercase(),
        "lowercase" => text.to_lowercase(),
        _ => text,
    }
}

/// Anchor keyword to alignment and baseline.
fn anchor_alignment(anchor: &str) -> (TextAlign, TextBaseline) {
    let align = if anchor.contains("left") {
        TextAlign::Left
    } else if anchor.contains("right") {
        TextAlign::Right
    } else {
        TextAlign::Center
    };
    let baseline = if anchor.starts_with("top") {
        TextBaseline::Top
    } else if anchor.starts_with("bottom") {
        TextBaseline::Bottom
    } else {
        TextBaseline::Middle
    };
    (align, baseline)
}

pub(crate) fn build_text(
    reader: &PropReader,
    z_index: i32,
    feature: &Feature,
    inputs: &BuildInputs,
    pool: &mut StylePool,
) {
    let mut raw_sections: Vec<RawSection> = Vec::new();
    let text = match reader.raw(Bag::Layout, "text-field") {
        Some(Value::Array(arr)) if arr.first().and_then(|v| v.as_str()) == Some("format") => {
            raw_sections = format_sections(arr, reader);
            raw_sections.iter().map(|s| s.text.as_str()).collect()
        }
        Some(Value::String(template)) => apply_template(template, &feature.properties),
        _ => reader.string(Bag::Layout, "text-field"),
    };
    let text = transform_case(text, &reader.string(Bag::Layout, "text-transform"));
    if text.is_empty() {
        return;
    }

    let size = reader.number(Bag::Layout, "text-size");
    let line_height = reader.number(Bag::Layout, "text-line-height");
    let letter_spacing = reader.number(Bag::Layout, "text-letter-spacing");
    let font_stack = reader.string_array(Bag::Layout, "text-font");
    // No font yet means webfonts are still loading; the primitive is
    // deferred until a later evaluation finds them ready.
    let Some(font) = inputs.fonts.resolve(&font_stack, size, line_height) else {
        return;
    };

    let placement = if reader.string(Bag::Layout, "symbol-placement") == "line"
        && feature.geometry.line_coordinates().is_some()
    {
        TextPlacement::Line
    } else {
        TextPlacement::Point
    };

    // Line-placed text flows along the geometry; only point labels wrap.
    let content = match placement {
        TextPlacement::Point => {
            let max_width = reader.number(Bag::Layout, "text-max-width");
            inputs
                .wrap_cache
                .borrow_mut()
                .get_or_wrap(&text, &font, size, max_width, letter_spacing, inputs.measurer)
                .to_string()
        }
        TextPlacement::Line => text,
    };

    let render_transparent = inputs.options.render_transparent;
    let opacity = reader.number(Bag::Paint, "text-opacity");
    let fill_color = color_with_opacity(
        reader.color(Bag::Paint, "text-color"),
        opacity,
        render_transparent,
    );
    // Halo strokes are symmetric around the glyph outline: cap at half the
    // text size, then double for the stroke width.
    let capped_halo = reader.number(Bag::Paint, "text-halo-width").min(size / 2.0);
    let halo_width = capped_halo * 2.0;
    let halo_color = if capped_halo > 0.0 {
        color_with_opacity(
            reader.color(Bag::Paint, "text-halo-color"),
            opacity,
            render_transparent,
        )
    } else {
        None
    };
    if fill_color.is_none() && halo_color.is_none() {
        return;
    }

    let anchor = reader.string(Bag::Layout, "text-anchor");
    let (align, baseline) = anchor_alignment(&anchor);
    let offset_em = reader
        .number_array(Bag::Layout, "text-offset")
        .filter(|o| o.len() >= 2)
        .map(|o| [o[0], o[1]])
        .unwrap_or([0.0, 0.0]);
    let mut offset = [offset_em[0] * size, offset_em[1] * size];

    // Push the text clear of its anchor so halo strokes and tall line
    // boxes do not clip against it.
    let pad = capped_halo + (line_height - 1.0) * size / 2.0;
    match baseline {
        TextBaseline::Top => offset[1] += pad,
        TextBaseline::Bottom => offset[1] -= pad,
        TextBaseline::Middle => {}
    }
    match align {
        TextAlign::Left => offset[0] += capped_halo,
        TextAlign::Right => offset[0] -= capped_halo,
        TextAlign::Center => {}
    }

    let sections = raw_sections
        .into_iter()
        .map(|rs| {
            let font = rs.fonts.as_ref().and_then(|stack| {
                inputs
                    .fonts
                    .resolve(stack, size * rs.scale.unwrap_or(1.0), line_height)
            });
            TextSection {
                text: rs.text,
                font,
                scale: rs.scale,
            }
        })
        .collect();

    pool.emit(RenderableStyle {
        z_index,
        fill: None,
        stroke: None,
        image: None,
        text: Some(TextStyle {
            content,
            sections,
            font,
            size,
            fill_color,
            halo_color,
            halo_width,
            offset,
            align,
            baseline,
            placement,
            letter_spacing,
            declutter_mode: declutter_mode(reader, "text-allow-overlap", "text-ignore-placement"),
        }),
    });
}
