//! Mapbox GL style-function compiler and per-feature evaluation engine.
//!
//! Translates a declarative style document (version 8: sources, layers,
//! paint/layout properties, expressions) into renderable per-feature style
//! primitives for a tile/vector rendering host, and keeps them in sync as
//! the document is edited at runtime.
//!
//! The pipeline, leaves first:
//! - [`expr`]: compiles a property value (literal, legacy zoom-stop
//!   function, or expression array) into a cached evaluator.
//! - [`filter`]: compiles layer filters into cached, fail-closed predicates.
//! - [`render`]: resolves paint/layout per feature into fill, stroke, icon,
//!   circle and text primitives, with icon caches and label wrapping.
//! - [`stack`]: groups document layers by shared source and exposes the one
//!   style function the host invokes per rendered feature.
//! - [`document`]: the mutation façade — add/update/remove layers and
//!   update sources with per-group recompilation, plus feature state.
//!
//! Everything runs single-threaded; caches mutate as a memoization side
//! effect under a re-entrant call pattern and are owned by the
//! [`document::DocumentHandle`] of each loaded document.

pub mod color;
pub mod document;
pub mod error;
pub mod expr;
pub mod feature;
pub mod filter;
pub mod render;
pub mod spec;
pub mod sprite;
pub mod stack;
pub mod text;

pub use color::{color_with_opacity, parse_color, Rgba};
pub use document::{DocumentHandle, HostLayer, StyleHost};
pub use error::{StyleError, StyleResult};
pub use expr::{CompiledExpression, EvalContext, ExprCache};
pub use feature::{Feature, FeatureId, Geometry};
pub use filter::{CompiledFilter, FilterCache};
pub use render::{RenderableStyle, StyleOptions};
pub use spec::{parse_document, LayerType, SourceDesc, SourceType, StyleDocument, StyleLayer};
pub use sprite::{SpriteSet, SpriteSheet, SpriteVariants};
pub use stack::{background_color, plan_groups, CompiledGroup, GroupKind, GEOJSON_SOURCE_LAYER};
pub use text::{ApproxMeasurer, FontResolver, SystemFontResolver, TextMeasurer};
