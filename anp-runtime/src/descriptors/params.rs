use indexmap::IndexMap;
use serde_json::Value;

use crate::state::agent::ApiConfig;

/// Parameter schema for one `(agent, path)`, resolved by the precedence
/// order in [`extract_params`].
#[derive(Debug, Clone, Default)]
pub struct ExtractedParams {
    pub params: IndexMap<String, Value>,
    pub summary: Option<String>,
}

/// Resolve the effective parameter schema for a registered API path.
///
/// Only the first precedence tier — the config saved at registration time
/// — has a meaningful Rust analogue: handlers here are opaque
/// `Arc<dyn Fn(..) -> ..>` closures, so there is no handler signature to
/// reflect and no source text to scan for `params.get("name", default)`
/// calls the way the originating framework could. Both fallback tiers
/// degrade to an empty schema with a warning, matching the spec's own
/// "if none yield parameters" terminal case.
pub fn extract_params(config: Option<&ApiConfig>, path: &str) -> ExtractedParams {
    if let Some(config) = config {
        if !config.params.is_empty() {
            return ExtractedParams {
                params: config.params.clone(),
                summary: config.summary.clone(),
            };
        }
        if config.summary.is_some() {
            return ExtractedParams {
                params: IndexMap::new(),
                summary: config.summary.clone(),
            };
        }
    }

    tracing::warn!(%path, "no declared parameters for API path; emitting empty schema");
    ExtractedParams::default()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_declared_config_params() {
        let mut params = IndexMap::new();
        params.insert("a".to_owned(), json!(0));
        let config = ApiConfig {
            params,
            summary: Some("adds two numbers".into()),
            result: None,
            method: "POST".into(),
        };
        let extracted = extract_params(Some(&config), "/add");
        assert_eq!(extracted.params.len(), 1);
        assert_eq!(extracted.summary.as_deref(), Some("adds two numbers"));
    }

    #[test]
    fn falls_back_to_empty_schema() {
        let extracted = extract_params(None, "/mystery");
        assert!(extracted.params.is_empty());
    }
}
