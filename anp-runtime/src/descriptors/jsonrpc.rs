use anp_common::state::Did;
use serde_json::{json, Value};

use super::AggregatedPath;

/// Build the JSON-RPC 2.0 methods document: one entry per aggregated API
/// path, with `method.name` the path with `/` replaced by `.`.
pub fn build(did: &Did, paths: &[AggregatedPath]) -> Value {
    let methods: Vec<Value> = paths
        .iter()
        .map(|p| {
            let params: Vec<Value> = p
                .params
                .iter()
                .map(|(name, default)| json!({ "name": name, "default": default }))
                .collect();

            json!({
                "name": method_name(&p.path),
                "summary": p.summary.clone().unwrap_or_default(),
                "params": params,
                "result": p.result.clone().unwrap_or_else(|| json!({ "type": "object" })),
            })
        })
        .collect();

    json!({
        "jsonrpc": "2.0",
        "did": did.to_string(),
        "methods": methods,
    })
}

fn method_name(path: &str) -> String {
    path.trim_start_matches('/').replace('/', ".")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_becomes_dotted_method_name() {
        assert_eq!(method_name("/weather/current"), "weather.current");
    }

    #[test]
    fn builds_methods_array() {
        let did = Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap();
        let paths = vec![AggregatedPath {
            path: "/add".into(),
            method: "POST".into(),
            summary: None,
            params: Default::default(),
            result: None,
        }];
        let doc = build(&did, &paths);
        assert_eq!(doc["methods"][0]["name"], "add");
    }
}
