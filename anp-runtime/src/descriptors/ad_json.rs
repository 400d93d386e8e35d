use anp_common::state::Did;
use serde_json::{json, Value};

use super::AggregatedPath;

/// Build the JSON-LD `ad.json` agent description for `did`: a fixed
/// `@context`/`ad:AgentDescription` envelope, the natural-language and
/// structured discovery URLs, and one structured HTTP interface entry per
/// aggregated API path.
pub fn build(did: &Did, base_url: &str, paths: &[AggregatedPath]) -> Value {
    let encoded_did = urlencoding_for_path(did);

    let interfaces: Vec<Value> = paths
        .iter()
        .map(|p| {
            json!({
                "@type": "ad:StructuredInterface",
                "protocol": "HTTP",
                "method": p.method,
                "url": format!("{base_url}/agent/api/{encoded_did}{}", p.path),
                "description": p.summary.clone().unwrap_or_default(),
            })
        })
        .collect();

    json!({
        "@context": {
            "ad": "https://service.agent-network-protocol.com/ad#",
            "did": "https://www.w3.org/ns/did#",
        },
        "@type": "ad:AgentDescription",
        "did": did.to_string(),
        "url": base_url,
        "interfaces": [
            {
                "@type": "ad:NaturalLanguageInterface",
                "protocol": "YAML",
                "url": format!("{base_url}/wba/user/{encoded_did}/api_interface.yaml"),
            },
            {
                "@type": "ad:StructuredInterface",
                "protocol": "JSON-RPC",
                "url": format!("{base_url}/wba/user/{encoded_did}/api_interface.json"),
            },
        ]
            .into_iter()
            .chain(interfaces)
            .collect::<Vec<_>>(),
    })
}

fn urlencoding_for_path(did: &Did) -> String {
    percent_encoding::utf8_percent_encode(&did.to_string(), percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_an_interface_per_path() {
        let did = Did::parse("did:wba:localhost%3A9527:wba:user:AAAA").unwrap();
        let paths = vec![AggregatedPath {
            path: "/add".into(),
            method: "POST".into(),
            summary: Some("adds two numbers".into()),
            params: Default::default(),
            result: None,
        }];
        let doc = build(&did, "http://localhost:9527", &paths);
        assert_eq!(doc["@type"], "ad:AgentDescription");
        let interfaces = doc["interfaces"].as_array().unwrap();
        assert!(interfaces.iter().any(|i| i["url"].as_str().unwrap().ends_with("/add")));
    }
}
