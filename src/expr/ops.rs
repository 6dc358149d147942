//! Expression operator evaluation.
//!
//! Evaluates array-encoded expressions against an [`EvalContext`]. Unknown
//! operators and type mismatches yield `None`; the caller substitutes the
//! property's spec default.

use serde_json::Value;

use crate::color;
use crate::expr::context::EvalContext;

/// Operators accepted by the compiler. Kept in sync with the dispatch below.
pub(crate) const KNOWN_OPERATORS: &[&str] = &[
    "get", "has", "at", "in", "index-of", "slice", "length", "feature-state", "id", "properties",
    "geometry-type", "zoom", "config", "literal", "image", "interpolate", "interpolate-hcl",
    "interpolate-lab", "step", "match", "case", "coalesce", "==", "!=", "<", "<=", ">", ">=",
    "all", "any", "!", "+", "-", "*", "/", "%", "^", "abs", "ceil", "floor", "round", "min",
    "max", "ln", "log10", "log2", "sqrt", "sin", "cos", "tan", "concat", "downcase", "upcase",
    "to-number", "to-string", "to-boolean", "to-color", "typeof", "rgb", "rgba",
];

/// Evaluate an expression and return a typed result.
pub fn evaluate_expression(expr: &Value, ctx: &EvalContext) -> Option<Value> {
    match expr {
        Value::Null => Some(Value::Null),
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Array(arr) => evaluate_array_expression(arr, ctx),
        Value::Object(_) => Some(expr.clone()),
    }
}

fn evaluate_array_expression(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    if arr.is_empty() {
        return None;
    }

    let op = arr[0].as_str()?;

    match op {
        // Feature data access
        "get" => eval_get(arr, ctx),
        "has" => eval_has(arr, ctx),
        "at" => eval_at(arr, ctx),
        "in" => eval_in(arr, ctx),
        "index-of" => eval_index_of(arr, ctx),
        "slice" => eval_slice(arr, ctx),
        "length" => eval_length(arr, ctx),
        "feature-state" => eval_feature_state(arr, ctx),
        "id" => ctx.feature_id.map(|id| id.to_value()),
        "properties" => Some(Value::Object(ctx.properties.clone())),
        "geometry-type" => ctx.geometry_type.map(|s| Value::String(s.to_string())),

        // Camera and document inputs
        "zoom" => Some(Value::Number(serde_json::Number::from_f64(ctx.zoom)?)),
        "config" => eval_config(arr, ctx),

        // Literals and resources
        "literal" => arr.get(1).cloned(),
        "image" => evaluate_expression(arr.get(1)?, ctx),

        // Interpolation
        "interpolate" | "interpolate-hcl" | "interpolate-lab" => eval_interpolate(arr, ctx),
        "step" => eval_step(arr, ctx),

        // Branching
        "match" => eval_match(arr, ctx),
        "case" => eval_case(arr, ctx),
        "coalesce" => eval_coalesce(arr, ctx),

        // Comparison
        "==" => eval_cmp(arr, ctx, |o| o == std::cmp::Ordering::Equal),
        "!=" => eval_cmp(arr, ctx, |o| o != std::cmp::Ordering::Equal),
        "<" => eval_numeric_cmp(arr, ctx, |a, b| a < b),
        "<=" => eval_numeric_cmp(arr, ctx, |a, b| a <= b),
        ">" => eval_numeric_cmp(arr, ctx, |a, b| a > b),
        ">=" => eval_numeric_cmp(arr, ctx, |a, b| a >= b),

        // Logic
        "all" => eval_all(arr, ctx),
        "any" => eval_any(arr, ctx),
        "!" => eval_not(arr, ctx),

        // Math
        "+" => eval_fold(arr, ctx, 0.0, |acc, v| acc + v),
        "*" => eval_fold(arr, ctx, 1.0, |acc, v| acc * v),
        "-" => eval_sub(arr, ctx),
        "/" => eval_div(arr, ctx),
        "%" => eval_mod(arr, ctx),
        "^" => eval_binary(arr, ctx, f64::powf),
        "abs" => eval_unary(arr, ctx, f64::abs),
        "ceil" => eval_unary(arr, ctx, f64::ceil),
        "floor" => eval_unary(arr, ctx, f64::floor),
        "round" => eval_unary(arr, ctx, f64::round),
        "sqrt" => eval_unary(arr, ctx, f64::sqrt),
        "ln" => eval_unary(arr, ctx, f64::ln),
        "log10" => eval_unary(arr, ctx, f64::log10),
        "log2" => eval_unary(arr, ctx, f64::log2),
        "sin" => eval_unary(arr, ctx, f64::sin),
        "cos" => eval_unary(arr, ctx, f64::cos),
        "tan" => eval_unary(arr, ctx, f64::tan),
        "min" => eval_reduce(arr, ctx, f64::min),
        "max" => eval_reduce(arr, ctx, f64::max),

        // Strings
        "concat" => eval_concat(arr, ctx),
        "downcase" => eval_case_fold(arr, ctx, str::to_lowercase),
        "upcase" => eval_case_fold(arr, ctx, str::to_uppercase),

        // Type conversion
        "to-number" => eval_to_number(arr, ctx),
        "to-string" => eval_to_string(arr, ctx),
        "to-boolean" => eval_to_boolean(arr, ctx),
        "to-color" => eval_to_color(arr, ctx),
        "typeof" => eval_typeof(arr, ctx),

        // Color constructors
        "rgb" => eval_rgb(arr, ctx, false),
        "rgba" => eval_rgb(arr, ctx, true),

        _ => None,
    }
}

// Feature data access

fn eval_get(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let key = arr.get(1)?.as_str()?;
    ctx.properties.get(key).cloned()
}

fn eval_has(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let key = arr.get(1)?.as_str()?;
    Some(Value::Bool(ctx.properties.contains_key(key)))
}

fn eval_at(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let index = evaluate_expression(arr.get(1)?, ctx)?.as_u64()? as usize;
    let array = evaluate_expression(arr.get(2)?, ctx)?;
    array.as_array()?.get(index).cloned()
}

fn eval_in(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let needle = evaluate_expression(arr.get(1)?, ctx)?;
    let haystack = evaluate_expression(arr.get(2)?, ctx)?;
    let found = match &haystack {
        Value::Array(items) => items.iter().any(|v| values_equal(v, &needle)),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        _ => return None,
    };
    Some(Value::Bool(found))
}

fn eval_index_of(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let needle = evaluate_expression(arr.get(1)?, ctx)?;
    let haystack = evaluate_expression(arr.get(2)?, ctx)?;
    let index: i64 = match &haystack {
        Value::Array(items) => items
            .iter()
            .position(|v| values_equal(v, &needle))
            .map(|i| i as i64)
            .unwrap_or(-1),
        Value::String(s) => needle
            .as_str()
            .and_then(|n| s.find(n))
            .map(|i| i as i64)
            .unwrap_or(-1),
        _ => return None,
    };
    Some(Value::Number(index.into()))
}

fn eval_slice(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let input = evaluate_expression(arr.get(1)?, ctx)?;
    let start = evaluate_expression(arr.get(2)?, ctx)?.as_u64()? as usize;
    let end = match arr.get(3) {
        Some(e) => Some(evaluate_expression(e, ctx)?.as_u64()? as usize),
        None => None,
    };
    match &input {
        Value::Array(items) => {
            let end = end.unwrap_or(items.len()).min(items.len());
            Some(Value::Array(items.get(start..end)?.to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let end = end.unwrap_or(chars.len()).min(chars.len());
            Some(Value::String(chars.get(start..end)?.iter().collect()))
        }
        _ => None,
    }
}

fn eval_length(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    let len = match &val {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        _ => return None,
    };
    Some(Value::Number(serde_json::Number::from(len as u64)))
}

fn eval_feature_state(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // Unset keys are null, not an error, so branches can test them.
    let key = arr.get(1)?.as_str()?;
    Some(
        ctx.feature_state
            .and_then(|state| state.get(key))
            .cloned()
            .unwrap_or(Value::Null),
    )
}

fn eval_config(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let key = evaluate_expression(arr.get(1)?, ctx)?;
    let key = key.as_str()?;
    ctx.config?.get(key).map(|entry| entry.default.clone())
}

// Interpolation

fn eval_interpolate(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // ["interpolate", ["linear"]|["exponential", base], input, stop, value, ...]
    if arr.len() < 5 {
        return None;
    }

    let input = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;

    let (is_exponential, base) = match arr.get(1)?.as_array() {
        Some(kind) => match kind.first().and_then(|k| k.as_str()) {
            Some("exponential") => (true, kind.get(1).and_then(|b| b.as_f64()).unwrap_or(1.0)),
            // cubic-bezier degrades to linear
            _ => (false, 1.0),
        },
        None => (false, 1.0),
    };

    let stops: Vec<(f64, &Value)> = arr[3..]
        .chunks(2)
        .filter_map(|chunk| match chunk {
            [stop, value] => Some((stop.as_f64()?, value)),
            _ => None,
        })
        .collect();
    if stops.is_empty() {
        return None;
    }

    if input <= stops[0].0 {
        return evaluate_expression(stops[0].1, ctx);
    }
    let last = stops.last()?;
    if input >= last.0 {
        return evaluate_expression(last.1, ctx);
    }

    for pair in stops.windows(2) {
        let (lo, lo_val) = pair[0];
        let (hi, hi_val) = pair[1];
        if input >= lo && input <= hi {
            let range = hi - lo;
            let t = if range == 0.0 {
                0.0
            } else if is_exponential && base != 1.0 {
                (base.powf(input - lo) - 1.0) / (base.powf(range) - 1.0)
            } else {
                (input - lo) / range
            };
            let a = evaluate_expression(lo_val, ctx)?;
            let b = evaluate_expression(hi_val, ctx)?;
            return interpolate_values(&a, &b, t);
        }
    }

    None
}

fn interpolate_values(a: &Value, b: &Value, t: f64) -> Option<Value> {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => {
            let va = na.as_f64()?;
            let vb = nb.as_f64()?;
            Some(Value::Number(serde_json::Number::from_f64(
                va + (vb - va) * t,
            )?))
        }
        (Value::Array(aa), Value::Array(ab)) if aa.len() == ab.len() => {
            let result: Option<Vec<Value>> = aa
                .iter()
                .zip(ab.iter())
                .map(|(ea, eb)| interpolate_values(ea, eb, t))
                .collect();
            result.map(Value::Array)
        }
        (Value::String(sa), Value::String(sb)) => {
            match (color::parse_color(sa), color::parse_color(sb)) {
                (Some(ca), Some(cb)) => {
                    let lerp = |x: f64, y: f64| x + (y - x) * t;
                    let mixed = color::Rgba {
                        r: lerp(ca.r, cb.r),
                        g: lerp(ca.g, cb.g),
                        b: lerp(ca.b, cb.b),
                        a: lerp(ca.a, cb.a),
                    };
                    Some(Value::String(mixed.to_css()))
                }
                _ => Some(if t < 0.5 { a.clone() } else { b.clone() }),
            }
        }
        _ => Some(if t < 0.5 { a.clone() } else { b.clone() }),
    }
}

fn eval_step(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // ["step", input, default, stop, value, ...]
    if arr.len() < 3 {
        return None;
    }

    let input = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    let mut result = arr.get(2)?;

    for chunk in arr[3..].chunks(2) {
        if let [stop, value] = chunk {
            if stop.as_f64().map(|s| input >= s).unwrap_or(false) {
                result = value;
            } else {
                break;
            }
        }
    }

    evaluate_expression(result, ctx)
}

// Branching

fn eval_match(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // ["match", input, label, output, ..., default]
    if arr.len() < 4 {
        return None;
    }

    let input = evaluate_expression(arr.get(1)?, ctx)?;
    let pairs = &arr[2..arr.len() - 1];
    let default = arr.last()?;

    for chunk in pairs.chunks(2) {
        let [label, output] = chunk else { continue };
        let matches = match label.as_array() {
            Some(labels) => labels.iter().any(|l| values_equal(&input, l)),
            None => values_equal(&input, label),
        };
        if matches {
            return evaluate_expression(output, ctx);
        }
    }

    evaluate_expression(default, ctx)
}

fn eval_case(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // ["case", condition, output, ..., default]
    if arr.len() < 3 {
        return None;
    }

    let pairs = &arr[1..arr.len() - 1];
    let default = arr.last()?;

    for chunk in pairs.chunks(2) {
        let [condition, output] = chunk else { continue };
        let passed = evaluate_expression(condition, ctx)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if passed {
            return evaluate_expression(output, ctx);
        }
    }

    evaluate_expression(default, ctx)
}

fn eval_coalesce(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    for expr in &arr[1..] {
        if let Some(val) = evaluate_expression(expr, ctx) {
            if !val.is_null() {
                return Some(val);
            }
        }
    }
    None
}

// Comparison

fn eval_cmp(
    arr: &[Value],
    ctx: &EvalContext,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?;
    let b = evaluate_expression(arr.get(2)?, ctx)?;
    let ordering = if values_equal(&a, &b) {
        std::cmp::Ordering::Equal
    } else {
        std::cmp::Ordering::Less
    };
    Some(Value::Bool(check(ordering)))
}

fn eval_numeric_cmp(
    arr: &[Value],
    ctx: &EvalContext,
    check: impl Fn(f64, f64) -> bool,
) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?;
    let b = evaluate_expression(arr.get(2)?, ctx)?;
    // Strings compare lexicographically, everything else numerically.
    if let (Value::String(sa), Value::String(sb)) = (&a, &b) {
        let ord = sa.cmp(sb);
        return Some(Value::Bool(check(
            match ord {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            },
            0.0,
        )));
    }
    Some(Value::Bool(check(a.as_f64()?, b.as_f64()?)))
}

// Logic

fn eval_all(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    for expr in &arr[1..] {
        let val = evaluate_expression(expr, ctx)?;
        if !val.as_bool().unwrap_or(false) {
            return Some(Value::Bool(false));
        }
    }
    Some(Value::Bool(true))
}

fn eval_any(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    for expr in &arr[1..] {
        let val = evaluate_expression(expr, ctx)?;
        if val.as_bool().unwrap_or(false) {
            return Some(Value::Bool(true));
        }
    }
    Some(Value::Bool(false))
}

fn eval_not(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    Some(Value::Bool(!val.as_bool().unwrap_or(false)))
}

// Math

fn eval_fold(
    arr: &[Value],
    ctx: &EvalContext,
    init: f64,
    fold: impl Fn(f64, f64) -> f64,
) -> Option<Value> {
    let mut acc = init;
    for expr in &arr[1..] {
        acc = fold(acc, evaluate_expression(expr, ctx)?.as_f64()?);
    }
    Some(Value::Number(serde_json::Number::from_f64(acc)?))
}

fn eval_reduce(arr: &[Value], ctx: &EvalContext, pick: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let mut acc: Option<f64> = None;
    for expr in &arr[1..] {
        let v = evaluate_expression(expr, ctx)?.as_f64()?;
        acc = Some(match acc {
            Some(prev) => pick(prev, v),
            None => v,
        });
    }
    Some(Value::Number(serde_json::Number::from_f64(acc?)?))
}

fn eval_sub(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    if arr.len() == 2 {
        return Some(Value::Number(serde_json::Number::from_f64(-a)?));
    }
    let b = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;
    Some(Value::Number(serde_json::Number::from_f64(a - b)?))
}

fn eval_div(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    let b = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;
    if b == 0.0 {
        return None;
    }
    Some(Value::Number(serde_json::Number::from_f64(a / b)?))
}

fn eval_mod(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    let b = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;
    if b == 0.0 {
        return None;
    }
    Some(Value::Number(serde_json::Number::from_f64(a % b)?))
}

fn eval_unary(arr: &[Value], ctx: &EvalContext, op: impl Fn(f64) -> f64) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    Some(Value::Number(serde_json::Number::from_f64(op(a))?))
}

fn eval_binary(arr: &[Value], ctx: &EvalContext, op: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let a = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    let b = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;
    Some(Value::Number(serde_json::Number::from_f64(op(a, b))?))
}

// Strings

fn eval_concat(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let mut result = String::new();
    for expr in &arr[1..] {
        let val = evaluate_expression(expr, ctx)?;
        result.push_str(&value_to_string(&val));
    }
    Some(Value::String(result))
}

fn eval_case_fold(
    arr: &[Value],
    ctx: &EvalContext,
    fold: impl Fn(&str) -> String,
) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    Some(Value::String(fold(val.as_str()?)))
}

// Type conversion

fn eval_to_number(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    let num = match &val {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.parse().ok()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        _ => return None,
    };
    Some(Value::Number(serde_json::Number::from_f64(num)?))
}

fn eval_to_string(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    Some(Value::String(value_to_string(&val)))
}

fn eval_to_boolean(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx).unwrap_or(Value::Null);
    let b = match &val {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    };
    Some(Value::Bool(b))
}

fn eval_to_color(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    // Returns the first operand that parses as a color, as its CSS string.
    for expr in &arr[1..] {
        let val = evaluate_expression(expr, ctx)?;
        if let Some(s) = val.as_str() {
            if color::parse_color(s).is_some() {
                return Some(val);
            }
        }
    }
    None
}

fn eval_typeof(arr: &[Value], ctx: &EvalContext) -> Option<Value> {
    let val = evaluate_expression(arr.get(1)?, ctx)?;
    let name = match &val {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    Some(Value::String(name.to_string()))
}

// Color constructors

fn eval_rgb(arr: &[Value], ctx: &EvalContext, with_alpha: bool) -> Option<Value> {
    let r = evaluate_expression(arr.get(1)?, ctx)?.as_f64()?;
    let g = evaluate_expression(arr.get(2)?, ctx)?.as_f64()?;
    let b = evaluate_expression(arr.get(3)?, ctx)?.as_f64()?;
    let a = if with_alpha {
        evaluate_expression(arr.get(4)?, ctx)?.as_f64()?
    } else {
        1.0
    };
    let css = color::Rgba::from_straight(r / 255.0, g / 255.0, b / 255.0, a).to_css();
    Some(Value::String(css))
}

// Helpers

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => false,
    }
}

/// Stringify a value the way `to-string`/`concat` do.
pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

/// Evaluate an expression to a number.
pub fn evaluate_number(expr: &Value, ctx: &EvalContext) -> Option<f64> {
    evaluate_expression(expr, ctx)?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_props() -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    fn props_with(key: &str, val: Value) -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert(key.to_string(), val);
        m
    }

    #[test]
    fn test_get_property() {
        let props = props_with("name", json!("Test"));
        let ctx = EvalContext::new(&props, 10.0);
        assert_eq!(
            evaluate_expression(&json!(["get", "name"]), &ctx),
            Some(json!("Test"))
        );
    }

    #[test]
    fn test_feature_state() {
        let props = empty_props();
        let state = props_with("hover", json!(true));
        let ctx = EvalContext::new(&props, 10.0).with_feature_state(&state);
        assert_eq!(
            evaluate_expression(&json!(["feature-state", "hover"]), &ctx),
            Some(json!(true))
        );
        assert_eq!(
            evaluate_expression(&json!(["feature-state", "missing"]), &ctx),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_interpolate_linear() {
        let props = empty_props();
        let ctx = EvalContext::new(&props, 10.0);
        let expr = json!(["interpolate", ["linear"], ["zoom"], 5, 1, 15, 10]);
        let result = evaluate_expression(&expr, &ctx).and_then(|v| v.as_f64());
        assert!((result.unwrap() - 5.5).abs() < 0.01);
    }

    #[test]
    fn test_interpolate_clamps_to_endpoints() {
        let props = empty_props();
        let expr = json!(["interpolate", ["linear"], ["zoom"], 5, 1, 15, 10]);

        let ctx = EvalContext::new(&props, 0.0);
        assert_eq!(
            evaluate_expression(&expr, &ctx).and_then(|v| v.as_f64()),
            Some(1.0)
        );
        let ctx = EvalContext::new(&props, 22.0);
        assert_eq!(
            evaluate_expression(&expr, &ctx).and_then(|v| v.as_f64()),
            Some(10.0)
        );
    }

    #[test]
    fn test_interpolate_colors() {
        let props = empty_props();
        let ctx = EvalContext::new(&props, 10.0);
        let expr = json!([
            "interpolate", ["linear"], ["zoom"],
            5, "#000000",
            15, "#ffffff"
        ]);
        let result = evaluate_expression(&expr, &ctx).unwrap();
        let mixed = color::parse_color(result.as_str().unwrap()).unwrap();
        assert!((mixed.r - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_step() {
        let props = empty_props();
        let expr = json!(["step", ["zoom"], "small", 10, "medium", 15, "large"]);

        let ctx = EvalContext::new(&props, 5.0);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("small")));
        let ctx = EvalContext::new(&props, 12.0);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("medium")));
        let ctx = EvalContext::new(&props, 20.0);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("large")));
    }

    #[test]
    fn test_match_with_array_labels() {
        let props = props_with("class", json!("secondary"));
        let ctx = EvalContext::new(&props, 10.0);
        let expr = json!([
            "match", ["get", "class"],
            ["primary", "secondary"], "#ff0000",
            "#888888"
        ]);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("#ff0000")));
    }

    #[test]
    fn test_case() {
        let props = props_with("population", json!(50000));
        let ctx = EvalContext::new(&props, 10.0);
        let expr = json!([
            "case",
            [">", ["get", "population"], 100000], "large",
            [">", ["get", "population"], 10000], "medium",
            "small"
        ]);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("medium")));
    }

    #[test]
    fn test_coalesce() {
        let props = props_with("alt_name", json!("Alternative"));
        let ctx = EvalContext::new(&props, 10.0);
        let expr = json!(["coalesce", ["get", "name"], ["get", "alt_name"], "Unknown"]);
        assert_eq!(evaluate_expression(&expr, &ctx), Some(json!("Alternative")));
    }

    #[test]
    fn test_math_and_comparison() {
        let props = empty_props();
        let ctx = EvalContext::new(&props, 10.0);

        assert_eq!(
            evaluate_expression(&json!(["+", 1, 2, 3]), &ctx).and_then(|v| v.as_f64()),
            Some(6.0)
        );
        assert_eq!(
            evaluate_expression(&json!(["min", 4, 2, 9]), &ctx).and_then(|v| v.as_f64()),
            Some(2.0)
        );
        assert_eq!(
            evaluate_expression(&json!(["<=", 5, 5]), &ctx),
            Some(json!(true))
        );
        assert_eq!(
            evaluate_expression(&json!(["/", 1, 0]), &ctx),
            None
        );
    }

    #[test]
    fn test_in_and_index_of() {
        let props = props_with("class", json!("path"));
        let ctx = EvalContext::new(&props, 10.0);
        assert_eq!(
            evaluate_expression(
                &json!(["in", ["get", "class"], ["literal", ["road", "path"]]]),
                &ctx
            ),
            Some(json!(true))
        );
        assert_eq!(
            evaluate_expression(
                &json!(["index-of", "path", ["literal", ["road", "path"]]]),
                &ctx
            ),
            Some(json!(1))
        );
    }

    #[test]
    fn test_image_returns_name() {
        let props = empty_props();
        let ctx = EvalContext::new(&props, 10.0);
        assert_eq!(
            evaluate_expression(&json!(["image", "airport-15"]), &ctx),
            Some(json!("airport-15"))
        );
    }

    #[test]
    fn test_config() {
        use crate::spec::ConfigEntry;
        let props = empty_props();
        let mut config = std::collections::HashMap::new();
        config.insert(
            "accent".to_string(),
            ConfigEntry {
                default: json!("#ff8800"),
                value_type: Some("color".to_string()),
            },
        );
        let ctx = EvalContext::new(&props, 10.0).with_config(&config);
        assert_eq!(
            evaluate_expression(&json!(["config", "accent"]), &ctx),
            Some(json!("#ff8800"))
        );
    }
}
