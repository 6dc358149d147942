//! Text measurement and label line wrapping.

pub mod measure;
pub mod wrap;

pub use measure::{ApproxMeasurer, FontResolver, SystemFontResolver, TextMeasurer};
pub use wrap::{wrap_text, WrapCache};
