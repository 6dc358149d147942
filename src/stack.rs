//! Layer-stack compilation.
//!
//! Walks the document's layers in order and folds consecutive runs sharing
//! one source into evaluation groups. Each group compiles into a
//! [`CompiledGroup`] owning its build inputs, whose `style` method is the
//! single function the host invokes per rendered feature. Incremental edits
//! call [`CompiledGroup::recompile`] instead of redoing setup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::document::DocumentHandle;
use crate::error::{StyleError, StyleResult};
use crate::expr::EvalContext;
use crate::feature::{Feature, FeatureStateMap, Geometry};
use crate::render::builder::{BuildInputs, CircleKey};
use crate::render::primitives::CircleStyle;
use crate::render::props::{Bag, PropReader};
use crate::render::{build_layer_style, RenderableStyle, StyleOptions, StylePool};
use crate::spec::{LayerType, SourceType, StyleDocument};
use crate::sprite::SpriteSet;
use crate::text::{FontResolver, TextMeasurer};

/// Source-layer bucket key for GeoJSON features, which carry none.
pub const GEOJSON_SOURCE_LAYER: &str = "_geojson";

/// What kind of host-layer a group maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Fill/line/symbol/circle/fill-extrusion layers sharing one source,
    /// evaluated through the shared style function.
    Styled,
    /// Dedicated single-layer handling.
    Background,
    Raster,
    Hillshade,
}

/// One planned evaluation group.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub kind: GroupKind,
    /// Resolved source id; empty for background groups.
    pub source_id: String,
    pub layer_ids: Vec<String>,
}

/// Derive the evaluation plan from document layer order. A new group starts
/// whenever the resolved source changes or the previous layer was not
/// stylable. Heatmap layers are unsupported and skipped.
pub fn plan_groups(doc: &StyleDocument) -> Vec<GroupPlan> {
    let mut plans: Vec<GroupPlan> = Vec::new();
    let mut run_source: Option<String> = None;

    for layer in &doc.layers {
        let resolved = doc.resolve(layer);
        let layer_type = resolved.layer_type;

        if layer_type == LayerType::Heatmap {
            warn!("layer '{}': heatmap layers are not supported, skipping", layer.id);
            run_source = None;
            continue;
        }

        if layer_type.is_stylable() {
            let source = resolved.source.unwrap_or_default().to_string();
            if run_source.as_deref() == Some(source.as_str()) {
                if let Some(plan) = plans.last_mut() {
                    plan.layer_ids.push(layer.id.clone());
                }
            } else {
                plans.push(GroupPlan {
                    kind: GroupKind::Styled,
                    source_id: source.clone(),
                    layer_ids: vec![layer.id.clone()],
                });
            }
            run_source = Some(source);
        } else {
            let kind = match layer_type {
                LayerType::Background => GroupKind::Background,
                LayerType::Raster => GroupKind::Raster,
                _ => GroupKind::Hillshade,
            };
            plans.push(GroupPlan {
                kind,
                source_id: resolved.source.unwrap_or_default().to_string(),
                layer_ids: vec![layer.id.clone()],
            });
            run_source = None;
        }
    }

    plans
}

/// A compiled evaluation group: the style function plus everything it needs,
/// owned so later edits can recompile in place.
pub struct CompiledGroup {
    handle: Rc<DocumentHandle>,
    source_id: String,
    layer_ids: RefCell<Vec<String>>,
    sprites: Rc<SpriteSet>,
    options: Rc<StyleOptions>,
    measurer: Rc<dyn TextMeasurer>,
    fonts: Rc<dyn FontResolver>,
    feature_states: Rc<RefCell<FeatureStateMap>>,
    pool: RefCell<StylePool>,
    circle_cache: RefCell<HashMap<CircleKey, Rc<CircleStyle>>>,
    /// Source-layer bucket to (position-in-group, layer id).
    buckets: RefCell<HashMap<String, Vec<(usize, String)>>>,
}

impl CompiledGroup {
    /// Compile a styled group. Sprite and font resources must already be
    /// loaded; validation failures here are document errors.
    #[allow(clippy::too_many_arguments)]
    pub fn compile(
        handle: Rc<DocumentHandle>,
        source_id: &str,
        layer_ids: Vec<String>,
        sprites: Rc<SpriteSet>,
        options: Rc<StyleOptions>,
        measurer: Rc<dyn TextMeasurer>,
        fonts: Rc<dyn FontResolver>,
        feature_states: Rc<RefCell<FeatureStateMap>>,
    ) -> StyleResult<Rc<Self>> {
        let group = Rc::new(Self {
            handle,
            source_id: source_id.to_string(),
            layer_ids: RefCell::new(layer_ids),
            sprites,
            options,
            measurer,
            fonts,
            feature_states,
            pool: RefCell::new(StylePool::new()),
            circle_cache: RefCell::new(HashMap::new()),
            buckets: RefCell::new(HashMap::new()),
        });
        group.recompile()?;
        Ok(group)
    }

    /// Re-derive the evaluation plan from the current document. Called after
    /// any edit that touches this group's layers.
    pub fn recompile(&self) -> StyleResult<()> {
        let doc = self.handle.document();

        let desc = doc.sources.get(&self.source_id).ok_or_else(|| {
            StyleError::MissingSource {
                layer: self
                    .layer_ids
                    .borrow()
                    .first()
                    .cloned()
                    .unwrap_or_default(),
                source: self.source_id.clone(),
            }
        })?;
        if !matches!(desc.source_type, SourceType::Vector | SourceType::Geojson) {
            return Err(StyleError::SourceTypeMismatch {
                source: self.source_id.clone(),
                expected: "vector or geojson",
            });
        }

        let mut buckets: HashMap<String, Vec<(usize, String)>> = HashMap::new();
        for (position, id) in self.layer_ids.borrow().iter().enumerate() {
            let layer = doc
                .layer(id)
                .ok_or_else(|| StyleError::UnknownLayer(id.clone()))?;
            let resolved = doc.resolve(layer);
            if resolved.source != Some(self.source_id.as_str()) {
                return Err(StyleError::MixedSources(format!(
                    "layer '{}' does not use source '{}'",
                    id, self.source_id
                )));
            }
            let key = resolved
                .source_layer
                .unwrap_or(GEOJSON_SOURCE_LAYER)
                .to_string();
            buckets.entry(key).or_default().push((position, id.clone()));
        }

        *self.buckets.borrow_mut() = buckets;
        // The derived caches may hold results from the previous plan.
        self.circle_cache.borrow_mut().clear();
        Ok(())
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layer_ids.borrow().clone()
    }

    pub fn contains_layer(&self, id: &str) -> bool {
        self.layer_ids.borrow().iter().any(|l| l == id)
    }

    pub(crate) fn insert_layer_id(&self, id: &str, index: usize) {
        let mut ids = self.layer_ids.borrow_mut();
        let index = index.min(ids.len());
        ids.insert(index, id.to_string());
    }

    pub(crate) fn remove_layer_id(&self, id: &str) {
        self.layer_ids.borrow_mut().retain(|l| l != id);
    }

    /// The style function: all primitives this group draws for one feature
    /// at one resolution, or `None` when there is nothing to draw.
    /// `only_layer` restricts evaluation to a single document layer.
    pub fn style(
        &self,
        feature: &Feature,
        resolution: f64,
        only_layer: Option<&str>,
    ) -> Option<Vec<Rc<RenderableStyle>>> {
        // Geometry collections explode into one synthetic feature per child,
        // each styled on its own; the call returns the concatenation.
        if let Geometry::Collection(children) = &feature.geometry {
            let mut all = Vec::new();
            for child in children {
                let sub = Feature {
                    id: feature.id.clone(),
                    geometry: child.clone(),
                    properties: feature.properties.clone(),
                    source_layer: feature.source_layer.clone(),
                };
                if let Some(styles) = self.style(&sub, resolution, only_layer) {
                    all.extend(styles);
                }
            }
            return if all.is_empty() { None } else { Some(all) };
        }

        let zoom = self.options.zoom_for_resolution(resolution);
        let doc = self.handle.document();
        let buckets = self.buckets.borrow();
        let key = feature
            .source_layer
            .as_deref()
            .unwrap_or(GEOJSON_SOURCE_LAYER);
        let candidates = buckets.get(key)?;

        let feature_states = self.feature_states.borrow();
        let state = feature
            .id
            .as_ref()
            .and_then(|id| feature_states.get(id));

        let mut ctx = EvalContext::new(&feature.properties, zoom)
            .with_geometry(
                feature.geometry.type_name(),
                feature.geometry.type_code().unwrap_or(0),
            );
        if let Some(id) = &feature.id {
            ctx = ctx.with_feature_id(id);
        }
        if let Some(state) = state {
            ctx = ctx.with_feature_state(state);
        }
        if let Some(schema) = &doc.schema {
            ctx = ctx.with_config(schema);
        }

        let inputs = BuildInputs {
            expr_cache: self.handle.expr_cache(),
            icon_cache: self.handle.icon_cache(),
            wrap_cache: self.handle.wrap_cache(),
            circle_cache: &self.circle_cache,
            sprites: &self.sprites,
            options: &self.options,
            measurer: &*self.measurer,
            fonts: &*self.fonts,
        };

        let mut pool = self.pool.borrow_mut();
        pool.begin();
        for (position, layer_id) in candidates {
            if only_layer.map(|only| only != layer_id).unwrap_or(false) {
                continue;
            }
            let Some(layer) = doc.layer(layer_id) else {
                continue;
            };
            let resolved = doc.resolve(layer);

            // Visibility gates, in order, short-circuiting.
            if !layer.is_visible() {
                continue;
            }
            if !layer.in_zoom_range(zoom) {
                continue;
            }
            let filter = self
                .handle
                .filter_cache()
                .borrow_mut()
                .get_or_compile(&layer.id, resolved.filter);
            if !filter.evaluate(&ctx) {
                continue;
            }

            build_layer_style(
                layer,
                resolved.layer_type,
                *position as i32,
                feature,
                resolution,
                &ctx,
                &inputs,
                &mut pool,
            );
        }

        let styles = pool.finish();
        if styles.is_empty() {
            None
        } else {
            Some(styles)
        }
    }
}

impl std::fmt::Debug for CompiledGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGroup")
            .field("source_id", &self.source_id)
            .field("layer_ids", &self.layer_ids.borrow())
            .finish()
    }
}

/// Resolved background color for a background layer, for the host's own
/// canvas clearing. Pixel shading stays with the host.
pub fn background_color(
    handle: &DocumentHandle,
    layer_id: &str,
    zoom: f64,
    options: &StyleOptions,
) -> Option<String> {
    let doc = handle.document();
    let layer = doc.layer(layer_id)?;
    let properties = serde_json::Map::new();
    let ctx = EvalContext::new(&properties, zoom);
    let reader = PropReader::new(layer, handle.expr_cache(), &ctx);
    if !layer.is_visible() {
        return None;
    }
    crate::color::color_with_opacity(
        reader.color(Bag::Paint, "background-color"),
        reader.number(Bag::Paint, "background-opacity"),
        options.render_transparent,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_document;
    use serde_json::json;

    fn doc_with_layers(layers: serde_json::Value) -> StyleDocument {
        parse_document(
            &json!({
                "version": 8,
                "sources": {
                    "a": {"type": "vector", "tiles": ["http://a/{z}/{x}/{y}.pbf"]},
                    "b": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}},
                    "r": {"type": "raster", "tiles": ["http://r/{z}/{x}/{y}.png"]}
                },
                "layers": layers
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_consecutive_same_source_layers_group() {
        let doc = doc_with_layers(json!([
            {"id": "a1", "type": "fill", "source": "a", "source-layer": "water"},
            {"id": "a2", "type": "line", "source": "a", "source-layer": "road"},
            {"id": "b1", "type": "circle", "source": "b"}
        ]));
        let plans = plan_groups(&doc);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].source_id, "a");
        assert_eq!(plans[0].layer_ids, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(plans[1].source_id, "b");
    }

    #[test]
    fn test_non_stylable_layer_splits_runs() {
        let doc = doc_with_layers(json!([
            {"id": "a1", "type": "fill", "source": "a", "source-layer": "w"},
            {"id": "rast", "type": "raster", "source": "r"},
            {"id": "a2", "type": "fill", "source": "a", "source-layer": "w"}
        ]));
        let plans = plan_groups(&doc);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].kind, GroupKind::Styled);
        assert_eq!(plans[1].kind, GroupKind::Raster);
        assert_eq!(plans[2].kind, GroupKind::Styled);
    }

    #[test]
    fn test_heatmap_skipped() {
        let doc = doc_with_layers(json!([
            {"id": "h", "type": "heatmap", "source": "a", "source-layer": "w"},
            {"id": "a1", "type": "fill", "source": "a", "source-layer": "w"}
        ]));
        let plans = plan_groups(&doc);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].layer_ids, vec!["a1".to_string()]);
    }

    #[test]
    fn test_background_is_its_own_group() {
        let doc = doc_with_layers(json!([
            {"id": "bg", "type": "background", "paint": {"background-color": "#abcdef"}},
            {"id": "a1", "type": "fill", "source": "a", "source-layer": "w"}
        ]));
        let plans = plan_groups(&doc);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].kind, GroupKind::Background);
    }
}
