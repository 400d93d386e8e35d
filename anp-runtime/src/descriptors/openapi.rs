use anp_common::state::Did;
use indexmap::IndexMap;
use serde_json::{json, Value};

use super::AggregatedPath;

/// Build an OpenAPI 3.0 document with one path entry per aggregated API
/// path, request schema derived from [`super::params::extract_params`],
/// and return it serialized as YAML.
pub fn build_yaml(did: &Did, base_url: &str, paths: &[AggregatedPath]) -> String {
    let doc = build_value(did, base_url, paths);
    serde_yaml::to_string(&doc).unwrap_or_else(|e| {
        tracing::error!("failed to serialize OpenAPI document to YAML: {e}");
        String::new()
    })
}

fn build_value(did: &Did, base_url: &str, paths: &[AggregatedPath]) -> Value {
    let mut path_items: IndexMap<String, Value> = IndexMap::new();

    for p in paths {
        let properties: IndexMap<String, Value> = p
            .params
            .iter()
            .map(|(name, default)| (name.clone(), json!({ "type": json_type_of(default), "default": default })))
            .collect();

        let operation = json!({
            "summary": p.summary.clone().unwrap_or_default(),
            "operationId": p.path.trim_start_matches('/').replace('/', "_"),
            "requestBody": {
                "content": {
                    "application/json": {
                        "schema": {
                            "type": "object",
                            "properties": properties,
                        }
                    }
                }
            },
            "responses": {
                "200": {
                    "description": "Successful response",
                    "content": {
                        "application/json": {
                            "schema": p.result.clone().unwrap_or_else(|| json!({ "type": "object" })),
                        }
                    }
                }
            }
        });

        path_items.insert(p.path.clone(), json!({ p.method.to_lowercase(): operation }));
    }

    json!({
        "openapi": "3.0.0",
        "info": {
            "title": format!("Agent interface for {did}"),
            "version": "1.0.0",
        },
        "servers": [{ "url": base_url }],
        "paths": path_items,
    })
}

fn json_type_of(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn yaml_contains_registered_path() {
        let did = Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap();
        let paths = vec![AggregatedPath {
            path: "/add".into(),
            method: "POST".into(),
            summary: Some("adds two numbers".into()),
            params: Default::default(),
            result: None,
        }];
        let yaml = build_yaml(&did, "http://localhost:9527", &paths);
        assert!(yaml.contains("/add"));
        assert!(yaml.contains("openapi"));
    }
}
