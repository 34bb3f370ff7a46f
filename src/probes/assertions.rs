//! HTTP assertion evaluation. Assertions are a list of
//! `{type, op, value}` over `status_code`, `body_contains`, `body_regex`,
//! `header`, `json_path`, `response_time_ms`. Evaluation short-circuits on
//! first failure.

use serde_json::Value;

pub struct AssertionContext<'a> {
    pub status_code: u16,
    pub body: &'a str,
    pub headers: &'a reqwest::header::HeaderMap,
    pub response_time_ms: u32,
}

/// Returns `Ok(())` if every assertion passes, `Err(message)` describing the
/// first failure otherwise. An empty or missing assertion list defaults to
/// "2xx is success" per spec.md §4.3.
pub fn evaluate(assertions: &Value, ctx: &AssertionContext) -> Result<(), String> {
    let list = match assertions.as_array() {
        Some(list) if !list.is_empty() => list,
        _ => {
            return if (200..300).contains(&ctx.status_code) {
                Ok(())
            } else {
                Err(format!("unexpected status code {}", ctx.status_code))
            };
        }
    };

    for assertion in list {
        evaluate_one(assertion, ctx)?;
    }
    Ok(())
}

fn evaluate_one(assertion: &Value, ctx: &AssertionContext) -> Result<(), String> {
    let kind = assertion["type"].as_str().unwrap_or("");
    let op = assertion["op"].as_str().unwrap_or("eq");

    match kind {
        "status_code" => {
            let expected = assertion["value"].as_u64().unwrap_or(200) as u16;
            let ok = match op {
                "eq" => ctx.status_code == expected,
                "lt" => ctx.status_code < expected,
                "gt" => ctx.status_code > expected,
                _ => ctx.status_code == expected,
            };
            if !ok {
                return Err(format!("status_code {} {op} {expected} failed (got {})", kind, ctx.status_code));
            }
        }
        "body_contains" => {
            let needle = assertion["value"].as_str().unwrap_or("");
            if !ctx.body.contains(needle) {
                return Err(format!("body does not contain {needle:?}"));
            }
        }
        "body_regex" => {
            let pattern = assertion["value"].as_str().unwrap_or("");
            let re = regex::Regex::new(pattern).map_err(|e| format!("invalid body_regex {pattern:?}: {e}"))?;
            if !re.is_match(ctx.body) {
                return Err(format!("body does not match regex {pattern:?}"));
            }
        }
        "header" => {
            let name = assertion["name"].as_str().unwrap_or("");
            let expected = assertion["value"].as_str().unwrap_or("");
            let actual = ctx.headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
            if actual != expected {
                return Err(format!("header {name} expected {expected:?}, got {actual:?}"));
            }
        }
        "json_path" => {
            let path = assertion["path"].as_str().unwrap_or("");
            let expected = &assertion["value"];
            let parsed: Value = serde_json::from_str(ctx.body).map_err(|e| format!("body is not JSON: {e}"))?;
            let actual = json_path_get(&parsed, path);
            if actual.as_ref() != Some(expected) {
                return Err(format!("json_path {path} expected {expected}, got {actual:?}"));
            }
        }
        "response_time_ms" => {
            let threshold = assertion["value"].as_u64().unwrap_or(0) as u32;
            let ok = match op {
                "lt" => ctx.response_time_ms < threshold,
                "gt" => ctx.response_time_ms > threshold,
                _ => ctx.response_time_ms <= threshold,
            };
            if !ok {
                return Err(format!("response_time_ms {op} {threshold} failed (got {})", ctx.response_time_ms));
            }
        }
        other => return Err(format!("unknown assertion type {other:?}")),
    }
    Ok(())
}

/// Minimal dotted-path JSON lookup (`a.b.c`), enough for simple assertions
/// without pulling in a full JSONPath implementation.
fn json_path_get(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(status: u16, body: &'static str) -> (reqwest::header::HeaderMap, u16, &'static str) {
        (reqwest::header::HeaderMap::new(), status, body)
    }

    #[test]
    fn default_is_2xx_success() {
        let (headers, status_code, body) = ctx(200, "ok");
        let c = AssertionContext { status_code, body, headers: &headers, response_time_ms: 10 };
        assert!(evaluate(&serde_json::json!([]), &c).is_ok());

        let (headers, status_code, body) = ctx(500, "err");
        let c = AssertionContext { status_code, body, headers: &headers, response_time_ms: 10 };
        assert!(evaluate(&serde_json::json!([]), &c).is_err());
    }

    #[test]
    fn body_contains_assertion() {
        let (headers, status_code, body) = ctx(200, "hello world");
        let c = AssertionContext { status_code, body, headers: &headers, response_time_ms: 10 };
        let assertions = serde_json::json!([{"type": "body_contains", "value": "world"}]);
        assert!(evaluate(&assertions, &c).is_ok());
        let assertions = serde_json::json!([{"type": "body_contains", "value": "missing"}]);
        assert!(evaluate(&assertions, &c).is_err());
    }

    #[test]
    fn short_circuits_on_first_failure() {
        let (headers, status_code, body) = ctx(404, "nope");
        let c = AssertionContext { status_code, body, headers: &headers, response_time_ms: 10 };
        let assertions = serde_json::json!([
            {"type": "status_code", "value": 200},
            {"type": "body_contains", "value": "nope"}
        ]);
        let err = evaluate(&assertions, &c).unwrap_err();
        assert!(err.contains("status_code"));
    }
}
