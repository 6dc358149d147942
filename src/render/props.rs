//! Typed property access over the compiled-expression cache.
//!
//! One reader per (layer, feature) evaluation. Every lookup goes through
//! the cache, so compilation cost is paid once per `(layer, property)`;
//! missing values and evaluation misses coerce to the property's spec
//! default.

use std::cell::RefCell;

use serde_json::Value;

use crate::color::{parse_color, Rgba};
use crate::expr::{property_spec, EvalContext, ExprCache};
use crate::spec::StyleLayer;

/// Which property bag a name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bag {
    Paint,
    Layout,
}

pub struct PropReader<'a> {
    layer: &'a StyleLayer,
    cache: &'a RefCell<ExprCache>,
    ctx: &'a EvalContext<'a>,
}

impl<'a> PropReader<'a> {
    pub fn new(layer: &'a StyleLayer, cache: &'a RefCell<ExprCache>, ctx: &'a EvalContext<'a>) -> Self {
        Self { layer, cache, ctx }
    }

    fn evaluate(&self, bag: Bag, name: &str) -> Option<Value> {
        let raw = match bag {
            Bag::Paint => self.layer.paint.get(name),
            Bag::Layout => self.layer.layout.get(name),
        };
        let compiled = self
            .cache
            .borrow_mut()
            .get_or_compile(&self.layer.id, name, raw);
        compiled.evaluate(self.ctx)
    }

    pub fn number(&self, bag: Bag, name: &str) -> f64 {
        self.evaluate(bag, name)
            .and_then(|v| v.as_f64())
            .or_else(|| property_spec(name).default.as_f64())
            .unwrap_or(0.0)
    }

    pub fn boolean(&self, bag: Bag, name: &str) -> bool {
        self.evaluate(bag, name)
            .and_then(|v| v.as_bool())
            .or_else(|| property_spec(name).default.as_bool())
            .unwrap_or(false)
    }

    /// Resolved color, or `None` when neither value nor default parses.
    pub fn color(&self, bag: Bag, name: &str) -> Option<Rgba> {
        let value = self.evaluate(bag, name);
        match value.as_ref().and_then(|v| v.as_str()).and_then(parse_color) {
            Some(c) => Some(c),
            None => property_spec(name).default.as_str().and_then(parse_color),
        }
    }

    pub fn string(&self, bag: Bag, name: &str) -> String {
        self.evaluate(bag, name)
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| {
                property_spec(name)
                    .default
                    .as_str()
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }

    /// Non-empty resolved string, or `None`.
    pub fn opt_string(&self, bag: Bag, name: &str) -> Option<String> {
        let s = self.string(bag, name);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn number_array(&self, bag: Bag, name: &str) -> Option<Vec<f64>> {
        let value = self.evaluate(bag, name)?;
        let arr = value.as_array()?;
        arr.iter().map(|v| v.as_f64()).collect()
    }

    pub fn string_array(&self, bag: Bag, name: &str) -> Vec<String> {
        let from_value = |v: &Value| -> Option<Vec<String>> {
            v.as_array()?
                .iter()
                .map(|e| e.as_str().map(str::to_string))
                .collect()
        };
        self.evaluate(bag, name)
            .and_then(|v| from_value(&v))
            .or_else(|| from_value(&property_spec(name).default))
            .unwrap_or_default()
    }

    /// The layer's raw (uncompiled) property value, for shapes the builder
    /// inspects structurally (rich-text `format` expressions).
    pub fn raw(&self, bag: Bag, name: &str) -> Option<&'a Value> {
        match bag {
            Bag::Paint => self.layer.paint.get(name),
            Bag::Layout => self.layer.layout.get(name),
        }
    }

    pub fn ctx(&self) -> &'a EvalContext<'a> {
        self.ctx
    }
}

/// Expand `{property}` placeholders against feature properties. Unknown
/// keys expand to nothing.
pub fn apply_template(template: &str, properties: &serde_json::Map<String, Value>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        match rest.find('}') {
            Some(close) => {
                let key = &rest[..close];
                if let Some(value) = properties.get(key) {
                    out.push_str(&crate::expr::value_to_string(value));
                }
                rest = &rest[close + 1..];
            }
            None => {
                out.push('{');
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(paint: Value, layout: Value) -> StyleLayer {
        serde_json::from_value(json!({
            "id": "test", "type": "fill", "source": "s",
            "paint": paint, "layout": layout
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let layer = layer(json!({}), json!({}));
        let cache = RefCell::new(ExprCache::new());
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 10.0);
        let reader = PropReader::new(&layer, &cache, &ctx);

        assert_eq!(reader.number(Bag::Paint, "circle-radius"), 5.0);
        assert_eq!(reader.number(Bag::Paint, "fill-opacity"), 1.0);
        let color = reader.color(Bag::Paint, "fill-color").unwrap();
        assert_eq!(color.to_css(), "rgba(0,0,0,1)");
        assert!(reader.opt_string(Bag::Paint, "fill-pattern").is_none());
    }

    #[test]
    fn test_expression_property() {
        let layer = layer(
            json!({"line-width": ["interpolate", ["linear"], ["zoom"], 0, 1, 10, 5]}),
            json!({}),
        );
        let cache = RefCell::new(ExprCache::new());
        let props = serde_json::Map::new();
        let ctx = EvalContext::new(&props, 5.0);
        let reader = PropReader::new(&layer, &cache, &ctx);
        assert!((reader.number(Bag::Paint, "line-width") - 3.0).abs() < 1e-9);
        assert_eq!(cache.borrow().len(), 1);
    }

    #[test]
    fn test_template() {
        let mut props = serde_json::Map::new();
        props.insert("name".to_string(), json!("Berlin"));
        props.insert("ref".to_string(), json!(100));
        assert_eq!(apply_template("{name}", &props), "Berlin");
        assert_eq!(apply_template("{name} ({ref})", &props), "Berlin (100)");
        assert_eq!(apply_template("{missing}", &props), "");
        assert_eq!(apply_template("plain", &props), "plain");
    }
}
