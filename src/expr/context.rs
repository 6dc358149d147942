//! Expression evaluation context.

use std::collections::HashMap;

use serde_json::Value;

use crate::feature::FeatureId;
use crate::spec::ConfigEntry;

/// Per-evaluation inputs: zoom, the feature under evaluation, its external
/// state, and the document's named config values. Feature state is read-only
/// input; evaluators never mutate it.
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    /// Current zoom level.
    pub zoom: f64,
    /// Feature properties.
    pub properties: &'a serde_json::Map<String, Value>,
    /// Feature id, if the source assigned one.
    pub feature_id: Option<&'a FeatureId>,
    /// Collapsed geometry type name ("Point", "LineString", "Polygon").
    pub geometry_type: Option<&'a str>,
    /// Integer geometry discriminator (1=point, 2=line, 3=polygon).
    pub geometry_code: Option<u8>,
    /// This feature's external state object, if any.
    pub feature_state: Option<&'a serde_json::Map<String, Value>>,
    /// Document schema entries consumed by the `config` operator.
    pub config: Option<&'a HashMap<String, ConfigEntry>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(properties: &'a serde_json::Map<String, Value>, zoom: f64) -> Self {
        Self {
            zoom,
            properties,
            feature_id: None,
            geometry_type: None,
            geometry_code: None,
            feature_state: None,
            config: None,
        }
    }

    pub fn with_geometry(mut self, type_name: &'a str, code: u8) -> Self {
        self.geometry_type = Some(type_name);
        self.geometry_code = Some(code);
        self
    }

    pub fn with_feature_id(mut self, id: &'a FeatureId) -> Self {
        self.feature_id = Some(id);
        self
    }

    pub fn with_feature_state(mut self, state: &'a serde_json::Map<String, Value>) -> Self {
        self.feature_state = Some(state);
        self
    }

    pub fn with_config(mut self, config: &'a HashMap<String, ConfigEntry>) -> Self {
        self.config = Some(config);
        self
    }
}
