//! Text measurement and font availability hooks.
//!
//! The host usually measures text against its own canvas/raster backend;
//! the engine only needs widths. [`ApproxMeasurer`] is the built-in
//! fallback with fixed per-character advances, and doubles as the
//! deterministic measurement context for wrapping tests.

/// Width oracle for label layout.
pub trait TextMeasurer {
    /// Width of `text` in device units, for a font at `size` pixels with
    /// letter spacing given in ems.
    fn width(&self, font: &str, size: f64, text: &str, letter_spacing: f64) -> f64;
}

/// Approximate measurer with fixed advances per character class.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasurer;

impl ApproxMeasurer {
    fn advance(c: char) -> f64 {
        if c.is_ascii_uppercase() {
            0.7
        } else if c == 'i' || c == 'l' || c == '!' || c == '.' || c == ' ' {
            0.3
        } else {
            0.5
        }
    }
}

impl TextMeasurer for ApproxMeasurer {
    fn width(&self, _font: &str, size: f64, text: &str, letter_spacing: f64) -> f64 {
        let advances: f64 = text.chars().map(Self::advance).sum();
        let spacing = letter_spacing * size * text.chars().count() as f64;
        advances * size + spacing
    }
}

/// Maps a style's font stack to a host font, deferring while webfonts load.
pub trait FontResolver {
    /// CSS-style font string for the stack, or `None` while the fonts are
    /// still loading. Returning `None` suppresses the text primitive until
    /// a later call succeeds.
    fn resolve(&self, fonts: &[String], size: f64, line_height: f64) -> Option<String>;
}

/// Resolver that trusts the system to have every font: always returns the
/// first font of the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFontResolver;

impl FontResolver for SystemFontResolver {
    fn resolve(&self, fonts: &[String], size: f64, line_height: f64) -> Option<String> {
        let family = fonts.first().map(|f| f.as_str()).unwrap_or("sans-serif");
        Some(format!("{}px/{} {}", size, line_height, family))
    }
}
