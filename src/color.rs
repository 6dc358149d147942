//! CSS color parsing and the premultiplied RGBA representation used by
//! style evaluation.
//!
//! Channels are stored premultiplied by alpha in 0..1 range. Serializing back
//! to a CSS string divides the channels by alpha before scaling to 0..255;
//! a fully transparent color serializes to the literal `"transparent"`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Premultiplied RGBA color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    /// Build from straight (non-premultiplied) channels in 0..1 range.
    pub fn from_straight(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: r * a,
            g: g * a,
            b: b * a,
            a,
        }
    }

    /// Fully transparent black.
    pub fn transparent() -> Self {
        Self {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 0.0,
        }
    }

    /// Straight channels in 0..255 / 0..1 range, as used for CSS output.
    pub fn to_straight_u8(&self) -> (u8, u8, u8, f64) {
        if self.a == 0.0 {
            return (0, 0, 0, 0.0);
        }
        let r = (self.r / self.a * 255.0).round().clamp(0.0, 255.0) as u8;
        let g = (self.g / self.a * 255.0).round().clamp(0.0, 255.0) as u8;
        let b = (self.b / self.a * 255.0).round().clamp(0.0, 255.0) as u8;
        (r, g, b, self.a)
    }

    /// CSS string form. A zero-alpha color is the literal `transparent`.
    pub fn to_css(&self) -> String {
        if self.a == 0.0 {
            return "transparent".to_string();
        }
        let (r, g, b, a) = self.to_straight_u8();
        format!("rgba({},{},{},{})", r, g, b, format_alpha(a))
    }

    /// Multiply the RGB channels by a darkening factor, leaving alpha alone.
    pub fn darken(&self, factor: f64) -> Self {
        Self {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
            a: self.a,
        }
    }
}

/// Combine a resolved color with a paint opacity into a CSS color string.
///
/// Returns `None` when either alpha is exactly zero, unless
/// `render_transparent` is set, in which case the literal `"transparent"`
/// is produced so the host still draws (invisible) geometry.
pub fn color_with_opacity(
    color: Option<Rgba>,
    opacity: f64,
    render_transparent: bool,
) -> Option<String> {
    let color = color?;
    if color.a == 0.0 || opacity == 0.0 {
        return if render_transparent {
            Some("transparent".to_string())
        } else {
            None
        };
    }
    let (r, g, b, a) = color.to_straight_u8();
    Some(format!(
        "rgba({},{},{},{})",
        r,
        g,
        b,
        format_alpha(a * opacity)
    ))
}

fn format_alpha(a: f64) -> String {
    if (a - a.round()).abs() < 1e-9 {
        format!("{}", a.round() as i64)
    } else {
        let mut s = format!("{}", a);
        if s.len() > 8 {
            s = format!("{:.6}", a);
            while s.ends_with('0') {
                s.pop();
            }
        }
        s
    }
}

/// Parse a CSS color string into premultiplied RGBA.
pub fn parse_color(s: &str) -> Option<Rgba> {
    let s = s.trim();

    if s.starts_with('#') {
        return parse_hex(s);
    }
    if s.starts_with("rgb") {
        return parse_rgb(s);
    }
    if s.starts_with("hsl") {
        return parse_hsl(s);
    }

    NAMED_COLORS
        .get(s.to_ascii_lowercase().as_str())
        .map(|&(r, g, b, a)| Rgba::from_straight(r, g, b, a))
}

fn parse_hex(s: &str) -> Option<Rgba> {
    let hex = s.trim_start_matches('#');
    let channel = |h: &str| u8::from_str_radix(h, 16).ok().map(|v| v as f64 / 255.0);
    let wide = |h: &str| channel(&h.repeat(2));
    match hex.len() {
        3 => Some(Rgba::from_straight(
            wide(&hex[0..1])?,
            wide(&hex[1..2])?,
            wide(&hex[2..3])?,
            1.0,
        )),
        4 => Some(Rgba::from_straight(
            wide(&hex[0..1])?,
            wide(&hex[1..2])?,
            wide(&hex[2..3])?,
            wide(&hex[3..4])?,
        )),
        6 => Some(Rgba::from_straight(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            1.0,
        )),
        8 => Some(Rgba::from_straight(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            channel(&hex[6..8])?,
        )),
        _ => None,
    }
}

fn parse_rgb(s: &str) -> Option<Rgba> {
    let inner = s
        .trim_start_matches("rgba(")
        .trim_start_matches("rgb(")
        .trim_end_matches(')');
    let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
    if parts.len() < 3 {
        return None;
    }

    let r: f64 = parts[0].trim_end_matches('%').parse().ok()?;
    let g: f64 = parts[1].trim_end_matches('%').parse().ok()?;
    let b: f64 = parts[2].trim_end_matches('%').parse().ok()?;
    let (r, g, b) = if parts[0].contains('%') {
        (r / 100.0, g / 100.0, b / 100.0)
    } else {
        (r / 255.0, g / 255.0, b / 255.0)
    };

    let a = if parts.len() >= 4 {
        parts[3].parse().unwrap_or(1.0)
    } else {
        1.0
    };

    Some(Rgba::from_straight(r, g, b, a))
}

fn parse_hsl(s: &str) -> Option<Rgba> {
    let inner = s
        .trim_start_matches("hsla(")
        .trim_start_matches("hsl(")
        .trim_end_matches(')');
    let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
    if parts.len() < 3 {
        return None;
    }

    let h: f64 = parts[0].parse().ok()?;
    let sat: f64 = parts[1].trim_end_matches('%').parse::<f64>().ok()? / 100.0;
    let l: f64 = parts[2].trim_end_matches('%').parse::<f64>().ok()? / 100.0;
    let a = if parts.len() >= 4 {
        parts[3].parse().unwrap_or(1.0)
    } else {
        1.0
    };

    let (r, g, b) = hsl_to_rgb(h / 360.0, sat, l);
    Some(Rgba::from_straight(r, g, b, a))
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 0.5 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// CSS named colors, straight (r, g, b, a) in 0..1 range.
static NAMED_COLORS: Lazy<HashMap<&'static str, (f64, f64, f64, f64)>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let table: &[(&str, u32)] = &[
        ("aliceblue", 0xf0f8ff),
        ("antiquewhite", 0xfaebd7),
        ("aqua", 0x00ffff),
        ("beige", 0xf5f5dc),
        ("black", 0x000000),
        ("blue", 0x0000ff),
        ("brown", 0xa52a2a),
        ("coral", 0xff7f50),
        ("crimson", 0xdc143c),
        ("cyan", 0x00ffff),
        ("darkblue", 0x00008b),
        ("darkgray", 0xa9a9a9),
        ("darkgreen", 0x006400),
        ("darkgrey", 0xa9a9a9),
        ("darkred", 0x8b0000),
        ("dimgray", 0x696969),
        ("dimgrey", 0x696969),
        ("fuchsia", 0xff00ff),
        ("gainsboro", 0xdcdcdc),
        ("gold", 0xffd700),
        ("gray", 0x808080),
        ("green", 0x008000),
        ("grey", 0x808080),
        ("hotpink", 0xff69b4),
        ("indigo", 0x4b0082),
        ("ivory", 0xfffff0),
        ("khaki", 0xf0e68c),
        ("lavender", 0xe6e6fa),
        ("lightblue", 0xadd8e6),
        ("lightgray", 0xd3d3d3),
        ("lightgreen", 0x90ee90),
        ("lightgrey", 0xd3d3d3),
        ("lime", 0x00ff00),
        ("magenta", 0xff00ff),
        ("maroon", 0x800000),
        ("navy", 0x000080),
        ("olive", 0x808000),
        ("orange", 0xffa500),
        ("orangered", 0xff4500),
        ("pink", 0xffc0cb),
        ("purple", 0x800080),
        ("red", 0xff0000),
        ("salmon", 0xfa8072),
        ("silver", 0xc0c0c0),
        ("skyblue", 0x87ceeb),
        ("slategray", 0x708090),
        ("slategrey", 0x708090),
        ("tan", 0xd2b48c),
        ("teal", 0x008080),
        ("tomato", 0xff6347),
        ("violet", 0xee82ee),
        ("wheat", 0xf5deb3),
        ("white", 0xffffff),
        ("whitesmoke", 0xf5f5f5),
        ("yellow", 0xffff00),
    ];
    for &(name, hex) in table {
        let r = ((hex >> 16) & 0xff) as f64 / 255.0;
        let g = ((hex >> 8) & 0xff) as f64 / 255.0;
        let b = (hex & 0xff) as f64 / 255.0;
        m.insert(name, (r, g, b, 1.0));
    }
    m.insert("transparent", (0.0, 0.0, 0.0, 0.0));
    m
});
