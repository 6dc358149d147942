//! Mapbox GL Style Spec document model.
//!
//! Parses version 8 style documents into a typed in-memory form. Paint and
//! layout properties stay as raw JSON values because each one may be a
//! literal, a legacy zoom-stop function object, or an expression array; the
//! expression compiler gives them meaning per layer and property.

pub mod parser;
pub mod types;

pub use parser::{parse_document, parse_document_value};
pub use types::{
    ConfigEntry, LayerType, PropertyBag, SourceDesc, SourceType, SpriteRef, StyleDocument,
    StyleLayer,
};
