use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Key fragments that mark a value as secret.  Matched case-insensitively as
/// substrings, so `db_password` and `X-Auth-Header` are both caught.
pub const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "auth",
    "authorization",
    "credential",
    "private_key",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Return a copy of `params` with every sensitive key's value replaced by
/// [`REDACTED`], descending into nested objects and arrays.
pub fn sanitize_parameters(params: &Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_parameters(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_parameters).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_matching_keys_and_keeps_siblings() {
        let out = sanitize_parameters(&json!({
            "path": "/tmp/x",
            "Password": "hunter2",
            "API_KEY": "abc",
        }));
        assert_eq!(out["path"], "/tmp/x");
        assert_eq!(out["Password"], REDACTED);
        assert_eq!(out["API_KEY"], REDACTED);
    }

    #[test]
    fn recurses_into_objects_and_arrays() {
        let out = sanitize_parameters(&json!({
            "conn": {"host": "db", "db_secret": "s"},
            "items": [{"token": "t", "name": "a"}, "plain", 3],
        }));
        assert_eq!(out["conn"]["host"], "db");
        assert_eq!(out["conn"]["db_secret"], REDACTED);
        assert_eq!(out["items"][0]["token"], REDACTED);
        assert_eq!(out["items"][0]["name"], "a");
        assert_eq!(out["items"][1], "plain");
        assert_eq!(out["items"][2], 3);
    }

    #[test]
    fn sensitive_key_with_object_value_is_replaced_whole() {
        let out = sanitize_parameters(&json!({"credentials": {"user": "u"}}));
        assert_eq!(out["credentials"], REDACTED);
    }

    #[test]
    fn idempotent() {
        let input = json!({
            "auth": "x",
            "nested": [{"private_key": "k"}, {"ok": true}],
            "n": null,
        });
        let once = sanitize_parameters(&input);
        let twice = sanitize_parameters(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(sanitize_parameters(&json!(42)), json!(42));
        assert_eq!(sanitize_parameters(&Value::Null), Value::Null);
        assert_eq!(sanitize_parameters(&json!("token")), json!("token"));
    }
}
