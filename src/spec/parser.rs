//! Style document parsing and validation.

use serde_json::Value;

use crate::error::{StyleError, StyleResult};
use crate::spec::types::{LayerType, StyleDocument};

/// Parse and validate a style document from a JSON string.
pub fn parse_document(json: &str) -> StyleResult<StyleDocument> {
    let doc: StyleDocument = serde_json::from_str(json)?;
    validate(&doc)?;
    Ok(doc)
}

/// Parse and validate a style document from an already-decoded JSON value.
pub fn parse_document_value(value: Value) -> StyleResult<StyleDocument> {
    let doc: StyleDocument = serde_json::from_value(value)?;
    validate(&doc)?;
    Ok(doc)
}

/// Document-level invariants. Violations are fatal to the apply call.
pub fn validate(doc: &StyleDocument) -> StyleResult<()> {
    if doc.version != 8 {
        return Err(StyleError::UnsupportedVersion(doc.version));
    }

    for (i, layer) in doc.layers.iter().enumerate() {
        if doc.layers[..i].iter().any(|other| other.id == layer.id) {
            return Err(StyleError::DuplicateLayerId(layer.id.clone()));
        }

        let resolved = doc.resolve(layer);
        if layer.layer_type.is_none() && layer.ref_id.is_none() {
            return Err(StyleError::Invalid(format!(
                "layer '{}' has neither a type nor a ref",
                layer.id
            )));
        }
        if let Some(ref_id) = layer.ref_id.as_deref() {
            if doc.layer(ref_id).is_none() {
                return Err(StyleError::Invalid(format!(
                    "layer '{}' references unknown layer '{}'",
                    layer.id, ref_id
                )));
            }
        }

        if resolved.layer_type != LayerType::Background {
            match resolved.source {
                Some(source) if doc.sources.contains_key(source) => {}
                Some(source) => {
                    return Err(StyleError::MissingSource {
                        layer: layer.id.clone(),
                        source: source.to_string(),
                    });
                }
                None => {
                    return Err(StyleError::MissingSource {
                        layer: layer.id.clone(),
                        source: String::new(),
                    });
                }
            }
        }
    }

    Ok(())
}
