//! Prompt enrichment from sampled documents
//!
//! Schema text and sample documents are added to prompts only while they fit
//! the model's input-token budget. Degradation order: full sample set, then a
//! single representative document, then nothing. Enrichment never fails a
//! request.

use serde_json::{Map, Value};
use tracing::debug;

use crate::provider::ModelProvider;

/// Documents sampled for query-generation enrichment.
pub const QUERY_SAMPLE_SIZE: usize = 3;

/// Documents sampled to derive a schema description.
pub const SCHEMA_SAMPLE_SIZE: usize = 100;

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Number",
        Value::Number(_) => "Double",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Document",
    }
}

fn merge_field(summary: &mut Map<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Object(fields) => {
            let nested = summary
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(nested) = nested {
                for (k, v) in fields {
                    merge_field(nested, k, v);
                }
            }
        }
        _ => {
            let name = type_name(value);
            let entry = summary
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(types) = entry {
                let name = Value::String(name.to_string());
                if !types.contains(&name) {
                    types.push(name);
                }
            }
        }
    }
}

/// Derive a simplified field -> type summary from sampled documents. Nested
/// documents are summarized recursively; every field maps to the list of
/// types observed for it across the sample.
pub fn simplified_schema(documents: &[Value]) -> String {
    let mut summary = Map::new();
    for document in documents {
        if let Value::Object(fields) = document {
            for (key, value) in fields {
                merge_field(&mut summary, key, value);
            }
        }
    }
    serde_json::to_string_pretty(&Value::Object(summary)).unwrap_or_default()
}

/// Stringify sample documents for inclusion in a prompt, degrading to fit
/// the budget: all documents, then one, then none. `used_tokens` is what the
/// prompt already costs without the sample fragment.
pub fn stringify_sample_documents(
    documents: &[Value],
    used_tokens: usize,
    model: &dyn ModelProvider,
) -> Option<String> {
    if documents.is_empty() {
        return None;
    }

    let budget = model.max_input_tokens().saturating_sub(used_tokens);

    let full = serde_json::to_string_pretty(documents).ok()?;
    if model.count_tokens(&full) <= budget {
        return Some(full);
    }

    let single = serde_json::to_string_pretty(&documents[..1]).ok()?;
    if model.count_tokens(&single) <= budget {
        debug!("sample documents over budget, degrading to one document");
        return Some(single);
    }

    debug!("sample documents over budget, omitting entirely");
    None
}
