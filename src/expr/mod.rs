//! Expression compilation and evaluation.
//!
//! A paint/layout property value may be a literal, a legacy zoom-stop
//! function object, or an expression array. [`compile`] normalizes all three
//! into a [`CompiledExpression`] that is cached per `(layer id, property)`
//! and evaluated cheaply per feature per frame against an [`EvalContext`].
//!
//! Compilation is fail-soft: a property that cannot be compiled falls back
//! to its spec default forever (logged once), so one bad property never
//! aborts rendering of the whole layer.

pub mod compile;
pub mod context;
pub mod ops;

pub use compile::{
    compile, property_spec, CompiledExpression, ExprCache, PropType, PropertySpec,
};
pub use context::EvalContext;
pub use ops::{evaluate_expression, evaluate_number, value_to_string};
