//! Layer filter compilation and evaluation.
//!
//! Filters gate a layer's participation per feature. Both encodings are
//! accepted: legacy comparison forms (`["==", key, value]`, `all`/`any`/
//! `has`/`in` with property keys) and expression-style filters. A filter
//! that fails to compile hides its layer (constant false) rather than
//! crashing or showing everything; the failure is logged once.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use serde_json::Value;

use crate::expr::ops::{evaluate_expression, values_equal, KNOWN_OPERATORS};
use crate::expr::EvalContext;

/// Geometry type names used by `$type` filters, by integer discriminator
/// (1=point, 2=line, 3=polygon).
fn type_code_for_name(name: &str) -> Option<u8> {
    match name {
        "Point" => Some(1),
        "LineString" => Some(2),
        "Polygon" => Some(3),
        _ => None,
    }
}

/// A compiled filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledFilter {
    /// Constant result; `Always(false)` is the fail-closed form.
    Always(bool),
    /// Structurally valid filter, walked per feature.
    Filter(Value),
}

impl CompiledFilter {
    /// Compile a raw filter. `Err` carries the reason for the caller to log.
    pub fn compile(raw: &Value) -> Result<Self, String> {
        match raw {
            Value::Bool(b) => Ok(CompiledFilter::Always(*b)),
            Value::Array(_) => {
                validate(raw)?;
                Ok(CompiledFilter::Filter(raw.clone()))
            }
            _ => Err(format!("filter must be a boolean or array, got {}", raw)),
        }
    }

    /// Evaluate against a feature context. Runtime type mismatches are
    /// fail-closed.
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        match self {
            CompiledFilter::Always(b) => *b,
            CompiledFilter::Filter(f) => eval_filter(f, ctx).unwrap_or(false),
        }
    }
}

fn validate(filter: &Value) -> Result<(), String> {
    let arr = filter
        .as_array()
        .ok_or_else(|| "filter operand must be an array".to_string())?;
    let op = arr
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| "filter must start with an operator".to_string())?;

    match op {
        "all" | "any" | "none" => {
            for sub in &arr[1..] {
                validate(sub)?;
            }
            Ok(())
        }
        "!" => {
            let sub = arr.get(1).ok_or_else(|| "'!' needs an operand".to_string())?;
            validate(sub)
        }
        "has" | "!has" => {
            arr.get(1)
                .and_then(|v| v.as_str())
                .map(|_| ())
                .ok_or_else(|| format!("'{}' needs a property key", op))
        }
        "in" | "!in" => {
            if arr.len() < 3 {
                return Err(format!("'{}' needs a key and at least one value", op));
            }
            Ok(())
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            if arr.len() != 3 {
                return Err(format!("'{}' needs exactly two operands", op));
            }
            Ok(())
        }
        other if KNOWN_OPERATORS.contains(&other) => Ok(()),
        other => Err(format!("unknown filter operator '{}'", other)),
    }
}

fn eval_filter(filter: &Value, ctx: &EvalContext) -> Option<bool> {
    match filter {
        Value::Bool(b) => Some(*b),
        Value::Array(arr) => eval_filter_array(arr, ctx),
        _ => None,
    }
}

fn eval_filter_array(arr: &[Value], ctx: &EvalContext) -> Option<bool> {
    let op = arr.first()?.as_str()?;

    match op {
        "all" => {
            for sub in &arr[1..] {
                if !eval_filter(sub, ctx)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        "any" => {
            for sub in &arr[1..] {
                if eval_filter(sub, ctx)? {
                    return Some(true);
                }
            }
            Some(false)
        }
        "none" => {
            for sub in &arr[1..] {
                if eval_filter(sub, ctx)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        "!" => Some(!eval_filter(arr.get(1)?, ctx)?),
        "has" => Some(key_value(arr.get(1)?.as_str()?, ctx).is_some()),
        "!has" => Some(key_value(arr.get(1)?.as_str()?, ctx).is_none()),
        "in" | "!in" if arr.get(1).map(|k| k.is_string()).unwrap_or(false) => {
            let actual = key_value(arr.get(1)?.as_str()?, ctx);
            let found = match actual {
                Some(actual) => arr[2..].iter().any(|v| filter_values_equal(&actual, v, ctx)),
                None => false,
            };
            Some(if op == "in" { found } else { !found })
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => eval_comparison(op, arr, ctx),
        // Anything else is an expression-style filter.
        _ => evaluate_expression(&Value::Array(arr.to_vec()), ctx)?.as_bool(),
    }
}

fn eval_comparison(op: &str, arr: &[Value], ctx: &EvalContext) -> Option<bool> {
    let lhs = arr.get(1)?;

    // Legacy form: the left operand is a property key (or $type/$id).
    if let Some(key) = lhs.as_str() {
        let actual = key_value(key, ctx);
        let expected = arr.get(2)?;
        return Some(match op {
            "==" => actual
                .map(|a| filter_values_equal(&a, expected, ctx))
                .unwrap_or(false),
            "!=" => actual
                .map(|a| !filter_values_equal(&a, expected, ctx))
                .unwrap_or(true),
            _ => {
                let a = actual?.as_f64()?;
                let b = expected.as_f64()?;
                match op {
                    "<" => a < b,
                    "<=" => a <= b,
                    ">" => a > b,
                    ">=" => a >= b,
                    _ => return None,
                }
            }
        });
    }

    // Expression form: evaluate the whole comparison as an expression.
    evaluate_expression(&Value::Array(arr.to_vec()), ctx)?.as_bool()
}

/// Look up a legacy filter key: `$type` and `$id` are special, everything
/// else reads feature properties.
fn key_value(key: &str, ctx: &EvalContext) -> Option<Value> {
    match key {
        "$type" => ctx.geometry_code.map(|c| Value::Number(c.into())),
        "$id" => ctx.feature_id.map(|id| id.to_value()),
        _ => ctx.properties.get(key).cloned(),
    }
}

/// Comparison that understands `$type` values: geometry names on the
/// expected side compare against the feature's integer discriminator.
fn filter_values_equal(actual: &Value, expected: &Value, _ctx: &EvalContext) -> bool {
    if let (Some(code), Some(name)) = (actual.as_u64(), expected.as_str()) {
        if let Some(expected_code) = type_code_for_name(name) {
            return code == expected_code as u64;
        }
    }
    values_equal(actual, expected)
}

/// Filter cache, keyed per layer id. A compile attempt (success or failure)
/// happens exactly once per distinct layer id.
#[derive(Debug, Default)]
pub struct FilterCache {
    entries: HashMap<String, Rc<CompiledFilter>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the compiled predicate for a layer, compiling on first use.
    /// A missing filter compiles to constant true; a malformed one to
    /// constant false.
    pub fn get_or_compile(&mut self, layer_id: &str, raw: Option<&Value>) -> Rc<CompiledFilter> {
        if let Some(entry) = self.entries.get(layer_id) {
            return entry.clone();
        }
        let compiled = Rc::new(match raw {
            None => CompiledFilter::Always(true),
            Some(value) => CompiledFilter::compile(value).unwrap_or_else(|reason| {
                warn!("layer '{}': invalid filter ({}), layer hidden", layer_id, reason);
                CompiledFilter::Always(false)
            }),
        });
        self.entries.insert(layer_id.to_string(), compiled.clone());
        compiled
    }

    /// Drop the entry for one layer.
    pub fn invalidate_layer(&mut self, layer_id: &str) {
        self.entries.remove(layer_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props() -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("class".to_string(), json!("road"));
        m.insert("level".to_string(), json!(1));
        m
    }

    #[test]
    fn test_legacy_equality() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0);
        let f = CompiledFilter::compile(&json!(["==", "class", "road"])).unwrap();
        assert!(f.evaluate(&ctx));
        let f = CompiledFilter::compile(&json!(["==", "class", "rail"])).unwrap();
        assert!(!f.evaluate(&ctx));
    }

    #[test]
    fn test_combinators() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0);
        let f = CompiledFilter::compile(&json!([
            "all",
            ["==", "class", "road"],
            ["==", "level", 1]
        ]))
        .unwrap();
        assert!(f.evaluate(&ctx));

        let f = CompiledFilter::compile(&json!([
            "any",
            ["==", "class", "rail"],
            ["in", "class", "road", "path"]
        ]))
        .unwrap();
        assert!(f.evaluate(&ctx));

        let f = CompiledFilter::compile(&json!(["none", ["has", "class"]])).unwrap();
        assert!(!f.evaluate(&ctx));
    }

    #[test]
    fn test_type_filter_uses_code() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0).with_geometry("Polygon", 3);
        let f = CompiledFilter::compile(&json!(["==", "$type", "Polygon"])).unwrap();
        assert!(f.evaluate(&ctx));
        let f = CompiledFilter::compile(&json!(["==", "$type", "Point"])).unwrap();
        assert!(!f.evaluate(&ctx));
    }

    #[test]
    fn test_expression_filter() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0);
        let f =
            CompiledFilter::compile(&json!(["==", ["get", "class"], "road"])).unwrap();
        assert!(f.evaluate(&ctx));
    }

    #[test]
    fn test_malformed_filter_fails_closed() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0);
        let mut cache = FilterCache::new();
        let raw = json!(["frobnicate", "class"]);
        let f = cache.get_or_compile("broken", Some(&raw));
        assert!(!f.evaluate(&ctx));
        // One entry, even for the failure; re-requests hit the cache.
        let again = cache.get_or_compile("broken", Some(&raw));
        assert_eq!(cache.len(), 1);
        assert!(Rc::ptr_eq(&f, &again));
    }

    #[test]
    fn test_missing_filter_passes_everything() {
        let props = props();
        let ctx = EvalContext::new(&props, 10.0);
        let mut cache = FilterCache::new();
        assert!(cache.get_or_compile("open", None).evaluate(&ctx));
    }
}
