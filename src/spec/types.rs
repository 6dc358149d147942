//! Style document types for the Mapbox GL Style Spec (version 8).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Complete style document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleDocument {
    /// Style version (must be 8).
    pub version: u32,
    /// Style name.
    #[serde(default)]
    pub name: String,
    /// Data sources by id.
    #[serde(default)]
    pub sources: HashMap<String, SourceDesc>,
    /// Style layers, in paint order.
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
    /// Sprite base URL, or a map of sprite id to base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<SpriteRef>,
    /// Glyphs URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyphs: Option<String>,
    /// Named config values referenced by the `config` expression operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<HashMap<String, ConfigEntry>>,
    /// Free-form metadata. The `ol:webfonts` key holds a font template URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Sprite reference: a single base URL or one per sprite id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpriteRef {
    Single(String),
    Multi(HashMap<String, String>),
}

/// One entry in the document's `schema` config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Default value used when the host supplies none.
    pub default: Value,
    /// Declared value type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

/// Source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDesc {
    /// Source kind.
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// TileJSON URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Tile URL templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<String>>,
    /// Inline or referenced GeoJSON data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Minimum tile zoom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    /// Maximum tile zoom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    /// Raster tile size in pixels.
    #[serde(rename = "tileSize", default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

/// Source kinds recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Vector,
    Raster,
    RasterDem,
    Geojson,
}

/// Layer types of the style spec. The set is closed; dispatch is per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerType {
    Fill,
    Line,
    Symbol,
    Circle,
    FillExtrusion,
    Background,
    Raster,
    Hillshade,
    Heatmap,
}

impl LayerType {
    /// Whether features of this layer type flow through the shared style
    /// function. Background, raster and hillshade layers get dedicated
    /// single-layer handling; heatmap is unsupported.
    pub fn is_stylable(&self) -> bool {
        matches!(
            self,
            LayerType::Fill
                | LayerType::Line
                | LayerType::Symbol
                | LayerType::Circle
                | LayerType::FillExtrusion
        )
    }
}

/// Paint or layout property bag. Values stay raw: each may be a literal, a
/// legacy zoom-stop function object, or an expression array.
pub type PropertyBag = serde_json::Map<String, Value>;

/// A single style layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleLayer {
    /// Unique layer id.
    pub id: String,
    /// Layer type. Absent for `ref` layers, which inherit it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<LayerType>,
    /// Source id. Absent for background layers and `ref` layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Source layer name within a vector tile.
    #[serde(
        rename = "source-layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,
    /// Id of another layer to inherit source, source-layer, type and filter
    /// from.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// Minimum zoom (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    /// Maximum zoom (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    /// Feature filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Layout properties.
    #[serde(default)]
    pub layout: PropertyBag,
    /// Paint properties.
    #[serde(default)]
    pub paint: PropertyBag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StyleLayer {
    /// Layout visibility check (default visible).
    pub fn is_visible(&self) -> bool {
        self.layout
            .get("visibility")
            .and_then(|v| v.as_str())
            .map(|v| v != "none")
            .unwrap_or(true)
    }

    /// Half-open zoom visibility window: `minzoom <= zoom < maxzoom`.
    pub fn in_zoom_range(&self, zoom: f64) -> bool {
        let min_ok = self.minzoom.map(|z| zoom >= z).unwrap_or(true);
        let max_ok = self.maxzoom.map(|z| zoom < z).unwrap_or(true);
        min_ok && max_ok
    }

    /// Look up a paint property value.
    pub fn paint_value(&self, name: &str) -> Option<&Value> {
        self.paint.get(name)
    }

    /// Look up a layout property value.
    pub fn layout_value(&self, name: &str) -> Option<&Value> {
        self.layout.get(name)
    }
}

/// A layer's effective identity after `ref` dereferencing.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLayer<'a> {
    pub layer: &'a StyleLayer,
    pub source: Option<&'a str>,
    pub source_layer: Option<&'a str>,
    pub layer_type: LayerType,
    pub filter: Option<&'a Value>,
}

impl StyleDocument {
    /// Find a layer by id.
    pub fn layer(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Index of a layer by id.
    pub fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Dereference a layer's `ref`, yielding its effective source,
    /// source-layer, type and filter. Parser validation guarantees a type
    /// exists; unvalidated documents fall back to `Background`.
    pub fn resolve<'a>(&'a self, layer: &'a StyleLayer) -> ResolvedLayer<'a> {
        if let Some(base) = layer.ref_id.as_deref().and_then(|id| self.layer(id)) {
            ResolvedLayer {
                layer,
                source: base.source.as_deref(),
                source_layer: base.source_layer.as_deref(),
                layer_type: layer
                    .layer_type
                    .or(base.layer_type)
                    .unwrap_or(LayerType::Background),
                filter: base.filter.as_ref(),
            }
        } else {
            ResolvedLayer {
                layer,
                source: layer.source.as_deref(),
                source_layer: layer.source_layer.as_deref(),
                layer_type: layer.layer_type.unwrap_or(LayerType::Background),
                filter: layer.filter.as_ref(),
            }
        }
    }

    /// Effective source id of a layer after `ref` dereferencing.
    pub fn resolved_source(&self, layer: &StyleLayer) -> Option<&str> {
        self.resolve(layer).source
    }

    /// Config value for the `config` expression operator: the schema default.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.schema.as_ref()?.get(key).map(|e| &e.default)
    }
}
