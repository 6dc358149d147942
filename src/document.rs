//! Document ownership and the mutation façade.
//!
//! [`DocumentHandle`] owns the canonical style document plus every cache the
//! evaluators memoize into, so multiple host-layers rendering the same
//! document share compiled evaluators. [`StyleHost`] binds the document to
//! host-layers and carries the add/update/remove/update-source operations.
//! All mutations are atomic: validation happens before any state changes,
//! and only the affected group is recompiled.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{StyleError, StyleResult};
use crate::expr::ExprCache;
use crate::feature::{FeatureId, FeatureStateMap};
use crate::filter::FilterCache;
use crate::render::StyleOptions;
use crate::spec::{parser, SourceDesc, StyleDocument, StyleLayer};
use crate::sprite::{IconCache, SpriteSet, SpriteVariants};
use crate::stack::{plan_groups, CompiledGroup, GroupKind};
use crate::text::{ApproxMeasurer, FontResolver, SystemFontResolver, TextMeasurer, WrapCache};

/// The canonical document and its caches, shared by reference across every
/// host-layer and compiled group.
#[derive(Debug)]
pub struct DocumentHandle {
    doc: RefCell<StyleDocument>,
    expr_cache: RefCell<ExprCache>,
    filter_cache: RefCell<FilterCache>,
    icon_cache: RefCell<IconCache>,
    wrap_cache: RefCell<WrapCache>,
    /// Bumped on document replacement; async resource completions carrying
    /// a stale generation are discarded.
    generation: Cell<u64>,
}

impl DocumentHandle {
    pub fn new(doc: StyleDocument) -> Rc<Self> {
        Rc::new(Self {
            doc: RefCell::new(doc),
            expr_cache: RefCell::new(ExprCache::new()),
            filter_cache: RefCell::new(FilterCache::new()),
            icon_cache: RefCell::new(IconCache::new()),
            wrap_cache: RefCell::new(WrapCache::new()),
            generation: Cell::new(0),
        })
    }

    pub fn document(&self) -> Ref<'_, StyleDocument> {
        self.doc.borrow()
    }

    pub(crate) fn document_mut(&self) -> RefMut<'_, StyleDocument> {
        self.doc.borrow_mut()
    }

    pub fn expr_cache(&self) -> &RefCell<ExprCache> {
        &self.expr_cache
    }

    pub fn filter_cache(&self) -> &RefCell<FilterCache> {
        &self.filter_cache
    }

    pub fn icon_cache(&self) -> &RefCell<IconCache> {
        &self.icon_cache
    }

    pub fn wrap_cache(&self) -> &RefCell<WrapCache> {
        &self.wrap_cache
    }

    /// Drop one layer's compiled expression and filter entries. Entries of
    /// other layers are never touched.
    pub fn invalidate_layer(&self, layer_id: &str) {
        self.expr_cache.borrow_mut().invalidate_layer(layer_id);
        self.filter_cache.borrow_mut().invalidate_layer(layer_id);
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }
}

/// One host-layer binding: what the host reads back after style application.
pub struct HostLayer {
    pub kind: GroupKind,
    /// Source id this host-layer was built from.
    pub source_id: String,
    /// The concrete source descriptor, swapped by `update_source`.
    pub source: Option<SourceDesc>,
    /// Document layer ids folded into this host-layer, in order.
    pub layer_ids: Vec<String>,
    /// External per-feature state, shared by every host-layer of one source.
    pub feature_states: Rc<RefCell<FeatureStateMap>>,
    /// The compiled style function, for styled groups.
    pub group: Option<Rc<CompiledGroup>>,
}

/// Live binding of one style document onto a host's layer collection.
pub struct StyleHost {
    handle: Rc<DocumentHandle>,
    host_layers: Vec<HostLayer>,
    sprites: Rc<SpriteSet>,
    options: Rc<StyleOptions>,
    measurer: Rc<dyn TextMeasurer>,
    fonts: Rc<dyn FontResolver>,
    state_by_source: HashMap<String, Rc<RefCell<FeatureStateMap>>>,
}

impl StyleHost {
    /// Apply a parsed document with default measurement and font hooks.
    pub fn apply(doc: StyleDocument, sprites: SpriteSet, options: StyleOptions) -> StyleResult<Self> {
        Self::apply_with(
            doc,
            sprites,
            options,
            Rc::new(ApproxMeasurer),
            Rc::new(SystemFontResolver),
        )
    }

    /// Apply a parsed document. Sprite and font resources must be loaded
    /// before this call; the first compilation of every group is gated on
    /// them.
    pub fn apply_with(
        doc: StyleDocument,
        sprites: SpriteSet,
        options: StyleOptions,
        measurer: Rc<dyn TextMeasurer>,
        fonts: Rc<dyn FontResolver>,
    ) -> StyleResult<Self> {
        parser::validate(&doc)?;
        let handle = DocumentHandle::new(doc);
        let mut host = Self {
            handle,
            host_layers: Vec::new(),
            sprites: Rc::new(sprites),
            options: Rc::new(options),
            measurer,
            fonts,
            state_by_source: HashMap::new(),
        };
        host.build_host_layers()?;
        Ok(host)
    }

    fn build_host_layers(&mut self) -> StyleResult<()> {
        let plans = {
            let doc = self.handle.document();
            plan_groups(&doc)
        };
        let mut host_layers = Vec::with_capacity(plans.len());
        for plan in plans {
            host_layers.push(self.host_layer_for(plan.kind, &plan.source_id, plan.layer_ids)?);
        }
        self.host_layers = host_layers;
        Ok(())
    }

    fn host_layer_for(
        &mut self,
        kind: GroupKind,
        source_id: &str,
        layer_ids: Vec<String>,
    ) -> StyleResult<HostLayer> {
        let states = self
            .state_by_source
            .entry(source_id.to_string())
            .or_default()
            .clone();
        let source = self.handle.document().sources.get(source_id).cloned();
        let group = if kind == GroupKind::Styled {
            Some(CompiledGroup::compile(
                self.handle.clone(),
                source_id,
                layer_ids.clone(),
                self.sprites.clone(),
                self.options.clone(),
                self.measurer.clone(),
                self.fonts.clone(),
                states.clone(),
            )?)
        } else {
            None
        };
        Ok(HostLayer {
            kind,
            source_id: source_id.to_string(),
            source,
            layer_ids,
            feature_states: states,
            group,
        })
    }

    pub fn handle(&self) -> &Rc<DocumentHandle> {
        &self.handle
    }

    pub fn document(&self) -> Ref<'_, StyleDocument> {
        self.handle.document()
    }

    pub fn host_layers(&self) -> &[HostLayer] {
        &self.host_layers
    }

    /// The compiled group that evaluates a given document layer.
    pub fn group_for_layer(&self, layer_id: &str) -> Option<Rc<CompiledGroup>> {
        self.host_layers
            .iter()
            .find(|hl| hl.layer_ids.iter().any(|id| id == layer_id))
            .and_then(|hl| hl.group.clone())
    }

    fn host_layer_index_for(&self, layer_id: &str) -> Option<usize> {
        self.host_layers
            .iter()
            .position(|hl| hl.layer_ids.iter().any(|id| id == layer_id))
    }

    /// Add a document layer, before `before_id` when given.
    pub fn add_layer(&mut self, layer: StyleLayer, before_id: Option<&str>) -> StyleResult<()> {
        // All validation happens before any mutation.
        let (index, resolved_source, layer_type) = {
            let doc = self.handle.document();
            if doc.layer(&layer.id).is_some() {
                return Err(StyleError::DuplicateLayerId(layer.id.clone()));
            }
            let index = match before_id {
                Some(anchor) => doc
                    .layer_index(anchor)
                    .ok_or_else(|| StyleError::AnchorNotFound(anchor.to_string()))?,
                None => doc.layers.len(),
            };

            let base = layer.ref_id.as_deref().and_then(|id| doc.layer(id));
            let layer_type = layer
                .layer_type
                .or_else(|| base.and_then(|b| b.layer_type))
                .ok_or_else(|| {
                    StyleError::Invalid(format!("layer '{}' has no type", layer.id))
                })?;
            let source = layer
                .source
                .clone()
                .or_else(|| base.and_then(|b| b.source.clone()));

            if layer_type != crate::spec::LayerType::Background {
                let source = source.clone().unwrap_or_default();
                if !doc.sources.contains_key(&source) {
                    return Err(StyleError::MissingSource {
                        layer: layer.id.clone(),
                        source,
                    });
                }
            }
            (index, source.unwrap_or_default(), layer_type)
        };
        let stylable = layer_type.is_stylable();

        // Cheap path: splice into the adjacent group when sources match.
        let adjacent_group = if stylable {
            self.adjacent_styled_group(index, &resolved_source)
        } else {
            None
        };

        let layer_id = layer.id.clone();
        self.handle.document_mut().layers.insert(index, layer);

        match adjacent_group {
            Some(host_index) => {
                let doc = self.handle.document();
                let hl = &mut self.host_layers[host_index];
                // Group order follows document order.
                let ids: Vec<String> = doc
                    .layers
                    .iter()
                    .map(|l| l.id.clone())
                    .filter(|id| *id == layer_id || hl.layer_ids.contains(id))
                    .collect();
                drop(doc);
                hl.layer_ids = ids.clone();
                if let Some(group) = &hl.group {
                    let position = ids
                        .iter()
                        .position(|id| *id == layer_id)
                        .unwrap_or(ids.len().saturating_sub(1));
                    group.insert_layer_id(&layer_id, position);
                    group.recompile()?;
                }
                Ok(())
            }
            None => {
                let kind = match layer_type {
                    t if t.is_stylable() => GroupKind::Styled,
                    crate::spec::LayerType::Background => GroupKind::Background,
                    crate::spec::LayerType::Raster => GroupKind::Raster,
                    _ => GroupKind::Hillshade,
                };
                let host_layer =
                    self.host_layer_for(kind, &resolved_source, vec![layer_id.clone()])?;
                let host_index = before_id
                    .and_then(|anchor| self.host_layer_index_for(anchor))
                    .unwrap_or(self.host_layers.len());
                self.host_layers.insert(host_index, host_layer);
                Ok(())
            }
        }
    }

    /// The styled host-layer adjacent to a document insertion point whose
    /// source matches, if any.
    fn adjacent_styled_group(&self, index: usize, source: &str) -> Option<usize> {
        let doc = self.handle.document();
        let neighbor_ids: Vec<String> = [index.checked_sub(1), Some(index)]
            .into_iter()
            .flatten()
            .filter_map(|i| doc.layers.get(i))
            .map(|l| l.id.clone())
            .collect();
        drop(doc);
        for id in neighbor_ids {
            if let Some(host_index) = self.host_layer_index_for(&id) {
                let hl = &self.host_layers[host_index];
                if hl.kind == GroupKind::Styled && hl.source_id == source {
                    return Some(host_index);
                }
            }
        }
        None
    }

    /// Replace a document layer in place. The replacement must keep the
    /// same source.
    pub fn update_layer(&mut self, layer: StyleLayer) -> StyleResult<()> {
        let index = {
            let doc = self.handle.document();
            let index = doc
                .layer_index(&layer.id)
                .ok_or_else(|| StyleError::UnknownLayer(layer.id.clone()))?;
            let existing_source = doc.resolved_source(&doc.layers[index]).map(str::to_string);
            let new_source = layer
                .source
                .clone()
                .or_else(|| {
                    layer
                        .ref_id
                        .as_deref()
                        .and_then(|id| doc.layer(id))
                        .and_then(|b| b.source.clone())
                });
            if existing_source != new_source {
                return Err(StyleError::SourceMismatch(layer.id.clone()));
            }
            index
        };

        let layer_id = layer.id.clone();
        self.handle.document_mut().layers[index] = layer;
        self.handle.invalidate_layer(&layer_id);
        if let Some(group) = self.group_for_layer(&layer_id) {
            group.recompile()?;
        }
        Ok(())
    }

    /// Remove a document layer. Fails when it is the last layer of its
    /// host-layer; remove the host-layer itself instead.
    pub fn remove_layer(&mut self, layer_id: &str) -> StyleResult<()> {
        let host_index = self
            .host_layer_index_for(layer_id)
            .ok_or_else(|| StyleError::UnknownLayer(layer_id.to_string()))?;
        if self.host_layers[host_index].layer_ids.len() == 1 {
            return Err(StyleError::LastLayerInGroup(layer_id.to_string()));
        }

        {
            let mut doc = self.handle.document_mut();
            let index = doc
                .layer_index(layer_id)
                .ok_or_else(|| StyleError::UnknownLayer(layer_id.to_string()))?;
            doc.layers.remove(index);
        }
        let hl = &mut self.host_layers[host_index];
        hl.layer_ids.retain(|id| id != layer_id);
        self.handle.invalidate_layer(layer_id);
        if let Some(group) = &hl.group {
            group.remove_layer_id(layer_id);
            group.recompile()?;
        }
        Ok(())
    }

    /// Rebuild the concrete source object for a source id and swap it onto
    /// every bound host-layer. Layer styles are untouched.
    pub fn update_source(&mut self, source_id: &str, desc: SourceDesc) -> StyleResult<()> {
        self.handle
            .document_mut()
            .sources
            .insert(source_id.to_string(), desc.clone());
        for hl in &mut self.host_layers {
            if hl.source_id == source_id {
                hl.source = Some(desc.clone());
            }
        }
        Ok(())
    }

    /// Set (or with `None`, delete) external state for one feature.
    pub fn set_feature_state(
        &mut self,
        source_id: &str,
        feature_id: FeatureId,
        state: Option<serde_json::Map<String, Value>>,
    ) -> StyleResult<()> {
        let bound = self.host_layers.iter().any(|hl| hl.source_id == source_id);
        if !bound {
            return Err(StyleError::FeatureStateTargetNotFound(source_id.to_string()));
        }
        let states = self
            .state_by_source
            .get(source_id)
            .ok_or_else(|| StyleError::FeatureStateTargetNotFound(source_id.to_string()))?;
        match state {
            Some(state) => {
                states.borrow_mut().insert(feature_id, state);
            }
            None => {
                states.borrow_mut().remove(&feature_id);
            }
        }
        Ok(())
    }

    /// Read back a feature's external state, `None` when unset.
    pub fn get_feature_state(
        &self,
        source_id: &str,
        feature_id: &FeatureId,
    ) -> Option<serde_json::Map<String, Value>> {
        self.state_by_source
            .get(source_id)?
            .borrow()
            .get(feature_id)
            .cloned()
    }

    /// Generation token async resource loads must present on completion.
    pub fn resource_generation(&self) -> u64 {
        self.handle.generation()
    }

    /// Install sprite resources that finished loading asynchronously. A
    /// completion for a superseded document generation is discarded and
    /// reported as `Ok(false)`.
    pub fn install_sprites(
        &mut self,
        variants: &HashMap<String, SpriteVariants>,
        generation: u64,
    ) -> StyleResult<bool> {
        if generation != self.handle.generation() {
            return Ok(false);
        }
        let sprites = SpriteSet::load(variants, self.options.display_pixel_ratio)?;
        self.sprites = Rc::new(sprites);
        self.handle.icon_cache().borrow_mut().clear();
        self.build_host_layers()?;
        Ok(true)
    }

    /// Replace the whole document: bumps the generation so in-flight
    /// resource loads for the old document are discarded on arrival.
    pub fn replace_document(&mut self, doc: StyleDocument) -> StyleResult<()> {
        parser::validate(&doc)?;
        self.handle.bump_generation();
        *self.handle.document_mut() = doc;
        self.handle.expr_cache().borrow_mut().clear();
        self.handle.filter_cache().borrow_mut().clear();
        self.handle.icon_cache().borrow_mut().clear();
        self.handle.wrap_cache().borrow_mut().clear();
        self.state_by_source.clear();
        self.build_host_layers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_document;
    use serde_json::json;

    fn base_doc() -> StyleDocument {
        parse_document(
            &json!({
                "version": 8,
                "sources": {
                    "a": {"type": "vector", "tiles": ["http://a/{z}/{x}/{y}.pbf"]},
                    "b": {"type": "geojson", "data": {"type": "FeatureCollection", "features": []}}
                },
                "layers": [
                    {"id": "a1", "type": "fill", "source": "a", "source-layer": "w",
                     "paint": {"fill-color": "#ff0000"}},
                    {"id": "a2", "type": "line", "source": "a", "source-layer": "w",
                     "paint": {"line-color": "#00ff00", "line-width": 1}},
                    {"id": "b1", "type": "circle", "source": "b"}
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn host() -> StyleHost {
        StyleHost::apply(base_doc(), SpriteSet::new(), StyleOptions::default()).unwrap()
    }

    fn layer_json(value: serde_json::Value) -> StyleLayer {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_apply_builds_groups() {
        let host = host();
        assert_eq!(host.host_layers().len(), 2);
        assert_eq!(host.host_layers()[0].layer_ids, vec!["a1", "a2"]);
        assert_eq!(host.host_layers()[1].layer_ids, vec!["b1"]);
    }

    #[test]
    fn test_add_layer_duplicate_id() {
        let mut host = host();
        let result = host.add_layer(
            layer_json(json!({"id": "a1", "type": "fill", "source": "a"})),
            None,
        );
        assert!(matches!(result, Err(StyleError::DuplicateLayerId(_))));
        assert_eq!(host.document().layers.len(), 3);
    }

    #[test]
    fn test_add_layer_missing_anchor() {
        let mut host = host();
        let result = host.add_layer(
            layer_json(json!({"id": "new", "type": "fill", "source": "a"})),
            Some("nope"),
        );
        assert!(matches!(result, Err(StyleError::AnchorNotFound(_))));
        assert_eq!(host.document().layers.len(), 3);
    }

    #[test]
    fn test_add_layer_splices_into_adjacent_group() {
        let mut host = host();
        host.add_layer(
            layer_json(json!({
                "id": "a3", "type": "fill", "source": "a", "source-layer": "w"
            })),
            Some("a2"),
        )
        .unwrap();
        assert_eq!(host.host_layers().len(), 2);
        assert_eq!(host.host_layers()[0].layer_ids, vec!["a1", "a3", "a2"]);
        let doc = host.document();
        assert_eq!(doc.layers[1].id, "a3");
    }

    #[test]
    fn test_add_layer_appends_into_trailing_group() {
        let mut host = host();
        // Appended at the end; the adjacent layer b1 shares the source.
        host.add_layer(
            layer_json(json!({"id": "b2", "type": "circle", "source": "b"})),
            None,
        )
        .unwrap();
        assert_eq!(host.host_layers().len(), 2);
        assert_eq!(host.host_layers()[1].layer_ids, vec!["b1", "b2"]);
    }

    #[test]
    fn test_add_layer_new_group_when_no_neighbor_matches() {
        let mut host = host();
        // Inserted between two source-"a" layers: no adjacent "b" group, so
        // a new host-layer appears before a2's host-layer.
        host.add_layer(
            layer_json(json!({"id": "b9", "type": "circle", "source": "b"})),
            Some("a2"),
        )
        .unwrap();
        assert_eq!(host.host_layers().len(), 3);
        assert_eq!(host.host_layers()[0].layer_ids, vec!["b9"]);
        assert_eq!(host.document().layers[1].id, "b9");
    }

    #[test]
    fn test_update_layer_keeps_source() {
        let mut host = host();
        let result = host.update_layer(layer_json(json!({
            "id": "a1", "type": "fill", "source": "b"
        })));
        assert!(matches!(result, Err(StyleError::SourceMismatch(_))));

        host.update_layer(layer_json(json!({
            "id": "a1", "type": "fill", "source": "a", "source-layer": "w",
            "paint": {"fill-color": "#0000ff"}
        })))
        .unwrap();
        let doc = host.document();
        assert_eq!(
            doc.layer("a1").unwrap().paint.get("fill-color"),
            Some(&json!("#0000ff"))
        );
    }

    #[test]
    fn test_update_layer_clears_only_its_cache_entries() {
        let host = host();
        // Prime caches for two layers.
        host.handle
            .expr_cache()
            .borrow_mut()
            .get_or_compile("a1", "fill-color", Some(&json!("#ff0000")));
        host.handle
            .expr_cache()
            .borrow_mut()
            .get_or_compile("a2", "line-color", Some(&json!("#00ff00")));
        host.handle.invalidate_layer("a1");
        assert_eq!(host.handle.expr_cache().borrow().len(), 1);
    }

    #[test]
    fn test_remove_last_layer_in_group_fails() {
        let mut host = host();
        let before = host.document().layers.len();
        let result = host.remove_layer("b1");
        assert!(matches!(result, Err(StyleError::LastLayerInGroup(_))));
        assert_eq!(host.document().layers.len(), before);
        assert_eq!(host.document().layers[2].id, "b1");
    }

    #[test]
    fn test_remove_layer() {
        let mut host = host();
        host.remove_layer("a2").unwrap();
        assert_eq!(host.document().layers.len(), 2);
        assert_eq!(host.host_layers()[0].layer_ids, vec!["a1"]);
    }

    #[test]
    fn test_update_source_swaps_descriptor() {
        let mut host = host();
        let desc: SourceDesc = serde_json::from_value(json!({
            "type": "vector", "tiles": ["http://elsewhere/{z}/{x}/{y}.pbf"]
        }))
        .unwrap();
        host.update_source("a", desc).unwrap();
        let hl = &host.host_layers()[0];
        assert_eq!(
            hl.source.as_ref().unwrap().tiles.as_ref().unwrap()[0],
            "http://elsewhere/{z}/{x}/{y}.pbf"
        );
    }

    #[test]
    fn test_feature_state_roundtrip() {
        let mut host = host();
        let id = FeatureId::Number(7);
        let mut state = serde_json::Map::new();
        state.insert("hover".to_string(), json!(true));

        assert!(matches!(
            host.set_feature_state("missing", id.clone(), Some(state.clone())),
            Err(StyleError::FeatureStateTargetNotFound(_))
        ));

        host.set_feature_state("a", id.clone(), Some(state.clone()))
            .unwrap();
        assert_eq!(host.get_feature_state("a", &id), Some(state));

        host.set_feature_state("a", id.clone(), None).unwrap();
        assert_eq!(host.get_feature_state("a", &id), None);
    }

    #[test]
    fn test_stale_sprite_install_discarded() {
        let mut host = host();
        let stale = host.resource_generation();
        host.replace_document(base_doc()).unwrap();
        let installed = host
            .install_sprites(&HashMap::new(), stale)
            .unwrap();
        assert!(!installed);
    }
}
