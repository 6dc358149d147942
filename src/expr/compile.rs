//! Expression compilation and the per-layer evaluator cache.
//!
//! `compile` normalizes the three accepted property encodings (literal,
//! legacy zoom-stop function, expression array) into a [`CompiledExpression`].
//! Compilation happens at most once per `(layer id, property)` pair; entries
//! live until that layer is edited.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

use crate::expr::context::EvalContext;
use crate::expr::ops::{evaluate_expression, KNOWN_OPERATORS};

/// Value type of a style property, for coercion of evaluated results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    Number,
    Color,
    String,
    Boolean,
    NumberArray,
    StringArray,
}

/// Static description of one paint/layout property.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub prop_type: PropType,
    /// Spec default, substituted on compile failure and missing values.
    pub default: Value,
}

/// A property value compiled for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpression {
    /// Constant value, returned as-is.
    Literal(Value),
    /// Expression tree, walked per evaluation.
    Expr(Value),
    /// Literal array with per-element expressions, recombined per evaluation.
    Elements(Vec<CompiledExpression>),
    /// Compile failed; the spec default is returned forever.
    Fallback(Value),
}

impl CompiledExpression {
    /// Evaluate against a context. `None` means "no value"; callers
    /// substitute the property default.
    pub fn evaluate(&self, ctx: &EvalContext) -> Option<Value> {
        match self {
            CompiledExpression::Literal(v) | CompiledExpression::Fallback(v) => {
                if v.is_null() {
                    None
                } else {
                    Some(v.clone())
                }
            }
            CompiledExpression::Expr(e) => evaluate_expression(e, ctx),
            CompiledExpression::Elements(parts) => Some(Value::Array(
                parts
                    .iter()
                    .map(|p| p.evaluate(ctx).unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }
}

/// Compile a raw property value. Never fails: malformed input degrades to
/// the property's spec default with a logged warning.
pub fn compile(raw: &Value, spec: &PropertySpec, layer_id: &str, prop: &str) -> CompiledExpression {
    match raw {
        Value::Object(obj) if is_zoom_function(obj) => match convert_zoom_function(obj) {
            Some(expr) => CompiledExpression::Expr(expr),
            None => {
                warn!(
                    "layer '{}': cannot convert function for '{}', using default",
                    layer_id, prop
                );
                CompiledExpression::Fallback(spec.default.clone())
            }
        },
        Value::Array(arr) => compile_array(arr, raw, spec, layer_id, prop),
        _ => CompiledExpression::Literal(raw.clone()),
    }
}

fn compile_array(
    arr: &[Value],
    raw: &Value,
    spec: &PropertySpec,
    layer_id: &str,
    prop: &str,
) -> CompiledExpression {
    if is_expression(arr) {
        if validate_expression(raw).is_ok() {
            return CompiledExpression::Expr(raw.clone());
        }
        // One rewrite attempt: tolerate the non-standard image shorthand with
        // a trailing config object before giving up.
        if let Some(rewritten) = rewrite_image_shorthand(raw) {
            if validate_expression(&rewritten).is_ok() {
                return CompiledExpression::Expr(rewritten);
            }
        }
        warn!(
            "layer '{}': invalid expression for '{}', using default",
            layer_id, prop
        );
        return CompiledExpression::Fallback(spec.default.clone());
    }

    // Literal array; individual elements may still be expressions
    // (font stacks, dash arrays).
    if arr
        .iter()
        .any(|el| el.as_array().map(|a| is_expression(a)).unwrap_or(false))
    {
        let element_spec = PropertySpec {
            prop_type: spec.prop_type,
            default: Value::Null,
        };
        let parts = arr
            .iter()
            .map(|el| compile(el, &element_spec, layer_id, prop))
            .collect();
        return CompiledExpression::Elements(parts);
    }

    CompiledExpression::Literal(raw.clone())
}

/// An array is an expression iff its first element names a known operator.
fn is_expression(arr: &[Value]) -> bool {
    arr.first()
        .and_then(|v| v.as_str())
        .map(|op| KNOWN_OPERATORS.contains(&op))
        .unwrap_or(false)
}

fn is_zoom_function(obj: &Map<String, Value>) -> bool {
    obj.contains_key("stops")
        || obj.get("type").and_then(|t| t.as_str()) == Some("identity")
}

/// Convert a legacy `{stops: [...]}` function into an equivalent expression.
fn convert_zoom_function(obj: &Map<String, Value>) -> Option<Value> {
    let property = obj.get("property").and_then(|p| p.as_str());
    let input = match property {
        Some(p) => json!(["get", p]),
        None => json!(["zoom"]),
    };

    let func_type = obj.get("type").and_then(|t| t.as_str());
    if func_type == Some("identity") {
        return Some(json!(["get", property?]));
    }

    let stops = obj.get("stops")?.as_array()?;
    if stops.is_empty() {
        return None;
    }

    let func_type = func_type.unwrap_or_else(|| {
        let interpolable = stops.iter().all(|stop| {
            stop.as_array()
                .and_then(|pair| pair.get(1))
                .map(value_is_interpolable)
                .unwrap_or(false)
        });
        if interpolable {
            "exponential"
        } else {
            "interval"
        }
    });

    match func_type {
        "exponential" => {
            let base = obj.get("base").and_then(|b| b.as_f64()).unwrap_or(1.0);
            let kind = if base == 1.0 {
                json!(["linear"])
            } else {
                json!(["exponential", base])
            };
            let mut expr = vec![json!("interpolate"), kind, input];
            for stop in stops {
                let pair = stop.as_array()?;
                expr.push(pair.first()?.clone());
                expr.push(pair.get(1)?.clone());
            }
            Some(Value::Array(expr))
        }
        "interval" => {
            let first = stops.first()?.as_array()?.get(1)?.clone();
            let mut expr = vec![json!("step"), input, first];
            for stop in &stops[1..] {
                let pair = stop.as_array()?;
                expr.push(pair.first()?.clone());
                expr.push(pair.get(1)?.clone());
            }
            Some(Value::Array(expr))
        }
        "categorical" => {
            let default = obj
                .get("default")
                .cloned()
                .or_else(|| stops.first()?.as_array()?.get(1).cloned())?;
            let mut expr = vec![json!("match"), input];
            for stop in stops {
                let pair = stop.as_array()?;
                expr.push(pair.first()?.clone());
                expr.push(pair.get(1)?.clone());
            }
            expr.push(default);
            Some(Value::Array(expr))
        }
        _ => None,
    }
}

fn value_is_interpolable(v: &Value) -> bool {
    match v {
        Value::Number(_) => true,
        Value::String(s) => crate::color::parse_color(s).is_some(),
        Value::Array(a) => a.iter().all(|e| e.is_number()),
        _ => false,
    }
}

/// Shallow structural validation: known operators and minimum arities,
/// recursing into operands that are themselves expressions.
fn validate_expression(expr: &Value) -> Result<(), String> {
    let Some(arr) = expr.as_array() else {
        return Ok(());
    };
    if !is_expression(arr) {
        // Literal array operand (match labels, font stacks).
        return Ok(());
    }
    let op = arr[0].as_str().unwrap_or_default();

    let min_len = match op {
        "interpolate" | "interpolate-hcl" | "interpolate-lab" => 5,
        "match" => 4,
        "step" | "case" | "at" | "in" | "index-of" | "slice" => 3,
        "get" | "has" | "length" | "feature-state" | "config" | "literal" | "image" | "!"
        | "abs" | "ceil" | "floor" | "round" | "sqrt" | "ln" | "log10" | "log2" | "sin"
        | "cos" | "tan" | "to-number" | "to-string" | "to-boolean" | "to-color" | "typeof"
        | "downcase" | "upcase" => 2,
        "rgb" => 4,
        "rgba" => 5,
        _ => 1,
    };
    if arr.len() < min_len {
        return Err(format!("'{}' expects at least {} items", op, min_len - 1));
    }
    if op == "image" && arr.len() > 2 {
        return Err("'image' takes a single operand".to_string());
    }

    if op == "literal" {
        return Ok(());
    }
    for operand in &arr[1..] {
        validate_expression(operand)?;
    }
    Ok(())
}

/// Rewrite `["image", name, {…}]` shapes (a non-standard shorthand seen in
/// the wild) by dropping the trailing config object, anywhere in the tree.
/// Returns `None` when nothing changed.
fn rewrite_image_shorthand(expr: &Value) -> Option<Value> {
    let arr = expr.as_array()?;
    let mut changed = false;
    let mut out: Vec<Value> = Vec::with_capacity(arr.len());
    for el in arr {
        match rewrite_image_shorthand(el) {
            Some(rewritten) => {
                changed = true;
                out.push(rewritten);
            }
            None => out.push(el.clone()),
        }
    }
    if arr.first().and_then(|v| v.as_str()) == Some("image")
        && arr.len() > 2
        && arr.last().map(|v| v.is_object()).unwrap_or(false)
    {
        out.pop();
        changed = true;
    }
    if changed {
        Some(Value::Array(out))
    } else {
        None
    }
}

/// Compiled-evaluator cache, keyed per `(layer id, property name)`.
///
/// Entries for one layer are invalidated when that layer is edited; entries
/// for unrelated layers must never be touched. Keyed as a two-level map so
/// cache hits (the per-feature common case) never allocate.
#[derive(Debug, Default)]
pub struct ExprCache {
    entries: HashMap<String, HashMap<String, Rc<CompiledExpression>>>,
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the compiled evaluator for a property, compiling on first use.
    /// The returned `Rc` is reference-stable until invalidation.
    pub fn get_or_compile(
        &mut self,
        layer_id: &str,
        prop: &str,
        raw: Option<&Value>,
    ) -> Rc<CompiledExpression> {
        if let Some(entry) = self.entries.get(layer_id).and_then(|props| props.get(prop)) {
            return entry.clone();
        }
        let spec = property_spec(prop);
        let compiled = Rc::new(match raw {
            Some(value) => compile(value, spec, layer_id, prop),
            None => CompiledExpression::Literal(spec.default.clone()),
        });
        self.entries
            .entry(layer_id.to_string())
            .or_default()
            .insert(prop.to_string(), compiled.clone());
        compiled
    }

    /// Drop all entries belonging to one layer.
    pub fn invalidate_layer(&mut self, layer_id: &str) {
        self.entries.remove(layer_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|props| props.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Look up the static spec for a property name.
pub fn property_spec(name: &str) -> &'static PropertySpec {
    static GENERIC: Lazy<PropertySpec> = Lazy::new(|| PropertySpec {
        prop_type: PropType::String,
        default: Value::Null,
    });
    PROPERTY_SPECS.get(name).unwrap_or(&GENERIC)
}

static PROPERTY_SPECS: Lazy<HashMap<&'static str, PropertySpec>> = Lazy::new(|| {
    use PropType::*;
    let mut m = HashMap::new();
    let mut add = |name: &'static str, prop_type: PropType, default: Value| {
        m.insert(name, PropertySpec { prop_type, default });
    };

    // Fill
    add("fill-color", Color, json!("#000000"));
    add("fill-opacity", Number, json!(1.0));
    add("fill-outline-color", Color, Value::Null);
    add("fill-pattern", String, Value::Null);

    // Fill-extrusion
    add("fill-extrusion-color", Color, json!("#000000"));
    add("fill-extrusion-opacity", Number, json!(1.0));
    add("fill-extrusion-height", Number, json!(0.0));
    add("fill-extrusion-base", Number, json!(0.0));
    add("fill-extrusion-pattern", String, Value::Null);

    // Line
    add("line-color", Color, json!("#000000"));
    add("line-opacity", Number, json!(1.0));
    add("line-width", Number, json!(1.0));
    add("line-dasharray", NumberArray, Value::Null);
    add("line-pattern", String, Value::Null);
    add("line-cap", String, json!("butt"));
    add("line-join", String, json!("miter"));
    add("line-miter-limit", Number, json!(2.0));

    // Circle
    add("circle-radius", Number, json!(5.0));
    add("circle-color", Color, json!("#000000"));
    add("circle-opacity", Number, json!(1.0));
    add("circle-stroke-color", Color, json!("#000000"));
    add("circle-stroke-width", Number, json!(0.0));
    add("circle-stroke-opacity", Number, json!(1.0));
    add("circle-translate", NumberArray, json!([0.0, 0.0]));

    // Icon
    add("icon-image", String, Value::Null);
    add("icon-size", Number, json!(1.0));
    add("icon-rotate", Number, json!(0.0));
    add("icon-opacity", Number, json!(1.0));
    add("icon-color", Color, Value::Null);
    add("icon-halo-color", Color, Value::Null);
    add("icon-halo-width", Number, json!(0.0));
    add("icon-rotation-alignment", String, json!("auto"));
    add("icon-anchor", String, json!("center"));
    add("icon-offset", NumberArray, json!([0.0, 0.0]));

    // Symbol / text
    add("symbol-placement", String, json!("point"));
    add("icon-allow-overlap", Boolean, json!(false));
    add("icon-ignore-placement", Boolean, json!(false));
    add("text-allow-overlap", Boolean, json!(false));
    add("text-ignore-placement", Boolean, json!(false));
    add("text-field", String, json!(""));
    add(
        "text-font",
        StringArray,
        json!(["Open Sans Regular", "Arial Unicode MS Regular"]),
    );
    add("text-size", Number, json!(16.0));
    add("text-line-height", Number, json!(1.2));
    add("text-letter-spacing", Number, json!(0.0));
    add("text-max-width", Number, json!(10.0));
    add("text-anchor", String, json!("center"));
    add("text-justify", String, json!("center"));
    add("text-offset", NumberArray, json!([0.0, 0.0]));
    add("text-transform", String, json!("none"));
    add("text-rotation-alignment", String, json!("auto"));
    add("text-color", Color, json!("#000000"));
    add("text-halo-color", Color, Value::Null);
    add("text-halo-width", Number, json!(0.0));
    add("text-opacity", Number, json!(1.0));

    // Background
    add("background-color", Color, json!("#000000"));
    add("background-opacity", Number, json!(1.0));

    // Layout common
    add("visibility", String, json!("visible"));

    m
});
