//! Output schemas sent to the oracle.
//!
//! Schemas are written in the OpenAPI subset Gemini accepts (uppercase type
//! names). [`to_json_schema`] converts them for providers that expect plain
//! JSON Schema.

use serde_json::{json, Map, Value};

use super::FunctionDeclaration;
use crate::types::{LogStatus, MetricCategory};

/// Name of the single capability exposed during conversation
pub const PROPOSE_UPDATE_FN: &str = "propose_process_update";

fn category_enum() -> Vec<&'static str> {
    MetricCategory::ALL.iter().map(|c| c.as_str()).collect()
}

fn status_enum() -> Vec<&'static str> {
    LogStatus::ALL.iter().map(|s| s.as_str()).collect()
}

fn step_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "id": { "type": "STRING" },
            "name": { "type": "STRING" },
            "description": { "type": "STRING" },
            "inputs": { "type": "STRING" },
            "conditions": { "type": "STRING" }
        },
        "required": ["id", "name", "description"]
    })
}

/// Schema of a simulation run: metrics, logs, summary, assumptions
pub fn simulation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "metrics": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "value": { "type": "NUMBER" },
                        "unit": { "type": "STRING" },
                        "category": { "type": "STRING", "enum": category_enum() }
                    },
                    "required": ["name", "value", "unit", "category"]
                }
            },
            "logs": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "stepId": { "type": "STRING" },
                        "stepName": { "type": "STRING" },
                        "outcome": { "type": "STRING" },
                        "details": { "type": "STRING" },
                        "status": { "type": "STRING", "enum": status_enum() }
                    },
                    "required": ["stepId", "stepName", "outcome", "details", "status"]
                }
            },
            "summary": { "type": "STRING" },
            "assumptions": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["metrics", "logs", "summary", "assumptions"]
    })
}

/// Schema of an imported step list
pub fn steps_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": step_schema()
    })
}

/// The "propose an updated process definition" capability
pub fn propose_update_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: PROPOSE_UPDATE_FN.to_string(),
        description: "Propose an updated process definition. Call this when the user asks \
                      to optimize, restructure or otherwise change the process steps. \
                      Provide the complete replacement step list, not a diff."
            .to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "steps": {
                    "type": "ARRAY",
                    "description": "The full, ordered list of steps for the updated process",
                    "items": step_schema()
                },
                "rationale": {
                    "type": "STRING",
                    "description": "Why these changes improve the process"
                }
            },
            "required": ["steps", "rationale"]
        }),
    }
}

/// Convert an uppercase-typed schema into plain JSON Schema.
///
/// Type names are lowercased; objects forbid extra properties.
pub fn to_json_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let converted = match (key.as_str(), value) {
                    ("type", Value::String(t)) => Value::String(t.to_ascii_lowercase()),
                    // property names are user keys, not schema keywords
                    ("properties", Value::Object(props)) => Value::Object(
                        props
                            .iter()
                            .map(|(name, prop)| (name.clone(), to_json_schema(prop)))
                            .collect(),
                    ),
                    _ => to_json_schema(value),
                };
                out.insert(key.clone(), converted);
            }
            if out.get("type").and_then(Value::as_str) == Some("object") {
                out.entry("additionalProperties")
                    .or_insert(Value::Bool(false));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(to_json_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_schema_requires_top_level_fields() {
        let schema = simulation_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["metrics", "logs", "summary", "assumptions"]);
        assert_eq!(
            schema["properties"]["metrics"]["items"]["properties"]["category"]["enum"],
            json!(["efficiency", "waste", "yield", "throughput", "other"])
        );
    }

    #[test]
    fn test_to_json_schema_lowercases_types() {
        let converted = to_json_schema(&steps_schema());
        assert_eq!(converted["type"], "array");
        assert_eq!(converted["items"]["type"], "object");
        assert_eq!(converted["items"]["properties"]["name"]["type"], "string");
        assert_eq!(converted["items"]["additionalProperties"], false);
    }

    #[test]
    fn test_to_json_schema_keeps_property_named_type() {
        let schema = json!({
            "type": "OBJECT",
            "properties": { "type": { "type": "STRING" } }
        });
        let converted = to_json_schema(&schema);
        assert_eq!(converted["properties"]["type"]["type"], "string");
    }
}
