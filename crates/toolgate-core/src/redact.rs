//! Redaction of call arguments before they reach the logs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Strings longer than this that look like credentials are redacted.
const TOKEN_MIN_LEN: usize = 20;

/// Strings longer than this are replaced by a length placeholder.
const LONG_STRING_LEN: usize = 100;

const SENSITIVE_KEY_PARTS: &[&str] = &["key", "token", "secret"];

#[allow(clippy::expect_used)]
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-+=.]+$").expect("static regex is valid"));

#[allow(clippy::expect_used)]
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]:[\\/]|~?/|\.{1,2}[\\/])").expect("static regex is valid")
});

/// Sanitize every argument of a call.
pub fn sanitize_args(args: &[Value]) -> Vec<Value> {
    args.iter().map(sanitize_value).collect()
}

/// Return a copy of `value` safe to write to logs.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let sanitized: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        sanitize_value(v)
                    };
                    (k.clone(), v)
                })
                .collect();
            Value::Object(sanitized)
        }
        other => other.clone(),
    }
}

fn sanitize_str(s: &str) -> String {
    let len = s.chars().count();
    if len > TOKEN_MIN_LEN && TOKEN_RE.is_match(s) {
        return format!("[REDACTED_{len}]");
    }
    if PATH_RE.is_match(s) {
        return format!("[PATH_{}]", basename(s));
    }
    if len > LONG_STRING_LEN {
        return format!("[STRING_{len}]");
    }
    s.to_string()
}

fn basename(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_token_like_strings() {
        let token = "sk_live_abcdefghijklmnop123456";
        assert_eq!(
            sanitize_value(&json!(token)),
            json!(format!("[REDACTED_{}]", token.len()))
        );
    }

    #[test]
    fn keeps_short_plain_strings() {
        assert_eq!(sanitize_value(&json!("hello world")), json!("hello world"));
        assert_eq!(sanitize_value(&json!("abc123")), json!("abc123"));
    }

    #[test]
    fn collapses_paths_to_basename() {
        assert_eq!(sanitize_value(&json!("/home/alice/notes.txt")), json!("[PATH_notes.txt]"));
        assert_eq!(sanitize_value(&json!("C:\\Users\\bob\\a.doc")), json!("[PATH_a.doc]"));
        assert_eq!(sanitize_value(&json!("~/projects/")), json!("[PATH_projects]"));
    }

    #[test]
    fn redacts_sensitive_keys() {
        let value = json!({"apiKey": "abc", "auth_token": 42, "client_secret": {"x": 1}, "name": "ok"});
        assert_eq!(
            sanitize_value(&value),
            json!({
                "apiKey": "[REDACTED]",
                "auth_token": "[REDACTED]",
                "client_secret": "[REDACTED]",
                "name": "ok"
            })
        );
    }

    #[test]
    fn replaces_long_prose() {
        let prose = "word ".repeat(30);
        assert_eq!(sanitize_value(&json!(prose)), json!("[STRING_150]"));
    }

    #[test]
    fn recurses_into_arrays() {
        let args = sanitize_args(&[json!(["/tmp/a.log", 3]), json!(true)]);
        assert_eq!(args, vec![json!(["[PATH_a.log]", 3]), json!(true)]);
    }
}
