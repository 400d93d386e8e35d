use rand::RngCore;
use serde_json::Value;

/// Generate a 16-hex-character short id (8 random bytes, hex-encoded).
pub fn new_short_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Rewrite an inbound DID document into a hosted one rooted at `(host,
/// port)`, per the six-step transform: replace the host segment, flip every
/// `user` segment to `hostuser`, replace the trailing id with a fresh short
/// id, then recursively replace every string occurrence of the old `id`
/// with the new one.
///
/// Idempotent: re-running the transform on an already-hosted document (one
/// whose `id` has no `user` segment left to flip and a fresh `sid`) simply
/// mints another hosted identity rather than erroring — callers are
/// expected to dedupe before invoking this, not rely on a no-op here.
pub fn rewrite_as_hosted(mut doc: Value, host: &str, port: u16, sid: &str) -> Result<Value, String> {
    let old_id = doc
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| "did document is missing an `id` field".to_owned())?
        .to_owned();

    let parts: Vec<&str> = old_id.split(':').collect();
    if parts.len() <= 3 {
        return Err(format!("`{old_id}` is not shaped like a did:wba identifier"));
    }

    let mut new_parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
    new_parts[2] = format!("{host}%3A{port}");
    for part in new_parts.iter_mut() {
        if part == "user" {
            *part = "hostuser".to_owned();
        }
    }
    let last = new_parts.len() - 1;
    new_parts[last] = sid.to_owned();
    let new_id = new_parts.join(":");

    replace_all_strings(&mut doc, &old_id, &new_id);
    if let Some(map) = doc.as_object_mut() {
        map.insert("id".to_owned(), Value::String(new_id));
    }

    Ok(doc)
}

fn replace_all_strings(value: &mut Value, from: &str, to: &str) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                replace_all_strings(v, from, to);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                replace_all_strings(item, from, to);
            }
        }
        Value::String(s) => {
            if s.contains(from) {
                *s = s.replace(from, to);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn rewrites_host_kind_and_id() {
        let doc = json!({
            "id": "did:wba:oldhost%3A8000:wba:user:OLDID",
            "verificationMethod": [
                { "id": "did:wba:oldhost%3A8000:wba:user:OLDID#key-1" }
            ],
        });

        let out = rewrite_as_hosted(doc, "localhost", 9527, "0123456789abcdef").unwrap();
        assert_eq!(out["id"], "did:wba:localhost%3A9527:wba:hostuser:0123456789abcdef");
        assert_eq!(
            out["verificationMethod"][0]["id"],
            "did:wba:localhost%3A9527:wba:hostuser:0123456789abcdef#key-1"
        );
    }

    #[test]
    fn rejects_document_without_id() {
        assert!(rewrite_as_hosted(json!({}), "localhost", 9527, "abc").is_err());
    }

    #[test]
    fn short_id_is_sixteen_hex_chars() {
        let sid = new_short_id();
        assert_eq!(sid.len(), 16);
        assert!(sid.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
