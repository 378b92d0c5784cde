//! Deterministic cache-key generation.

use serde_json::Value;

/// Options for [`generate_key`].
#[derive(Debug, Clone)]
pub struct KeyOptions {
    /// Append a `:v{version}` suffix so format changes can invalidate by
    /// bumping the version.
    pub include_version: bool,
    pub version: u32,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            include_version: false,
            version: 1,
        }
    }
}

/// Build a cache key from a prefix and a parameter set.
///
/// Parameters are serialized with names sorted lexicographically, so two
/// semantically identical parameter sets produce the same key regardless of
/// insertion order.
pub fn generate_key(
    prefix: &str,
    params: &serde_json::Map<String, Value>,
    options: &KeyOptions,
) -> String {
    let mut entries: Vec<(&String, &Value)> = params.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = String::from(prefix);
    for (name, value) in entries {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(&render_param(value));
    }

    if options.include_version {
        key.push_str(":v");
        key.push_str(&options.version.to_string());
    }

    key
}

fn render_param(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn insertion_order_does_not_change_the_key() {
        let first = params(&[("tag", json!("rust")), ("page", json!(2))]);
        let second = params(&[("page", json!(2)), ("tag", json!("rust"))]);

        assert_eq!(
            generate_key("posts", &first, &KeyOptions::default()),
            generate_key("posts", &second, &KeyOptions::default())
        );
    }

    #[test]
    fn key_layout_is_prefix_then_sorted_params() {
        let key = generate_key(
            "posts:list",
            &params(&[("tag", json!("rust")), ("limit", json!(20))]),
            &KeyOptions::default(),
        );

        assert_eq!(key, "posts:list:limit=20:tag=rust");
    }

    #[test]
    fn version_suffix_is_opt_in() {
        let options = KeyOptions {
            include_version: true,
            version: 3,
        };

        let key = generate_key("posts", &params(&[("id", json!("abc"))]), &options);
        assert_eq!(key, "posts:id=abc:v3");

        let default_version = KeyOptions {
            include_version: true,
            ..KeyOptions::default()
        };
        let key = generate_key("posts", &params(&[]), &default_version);
        assert_eq!(key, "posts:v1");
    }

    #[test]
    fn compound_values_render_as_json() {
        let key = generate_key(
            "search",
            &params(&[("tags", json!(["a", "b"]))]),
            &KeyOptions::default(),
        );

        assert_eq!(key, r#"search:tags=["a","b"]"#);
    }
}
