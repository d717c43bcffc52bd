use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Interval between status polls of statements still running server-side.
pub(crate) const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) fn client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("whbench/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")
}

/// Reads a JSON body; non-2xx statuses become errors carrying the vendor message.
pub(crate) async fn read_json(resp: reqwest::Response, api: &str) -> anyhow::Result<(StatusCode, Value)> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .with_context(|| format!("{} response body unreadable", api))?;
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if !status.is_success() {
        anyhow::bail!("{} error ({}): {}", api, status.as_u16(), error_message(&body));
    }
    Ok((status, body))
}

pub(crate) fn error_message(body: &Value) -> String {
    ["/message", "/error/message", "/status/error/message"]
        .iter()
        .find_map(|p| body.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| match body {
            Value::String(s) => s.clone(),
            Value::Null => "empty response".to_string(),
            other => other.to_string(),
        })
}

/// Numbers arrive as JSON numbers or as decimal strings depending on the API.
pub(crate) fn as_f64(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_u64(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as u64))
        }
        _ => None,
    }
}

pub(crate) fn cell_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_pointers() {
        assert_eq!(error_message(&json!({"message": "bad sql"})), "bad sql");
        assert_eq!(
            error_message(&json!({"error": {"code": 400, "message": "Unrecognized name"}})),
            "Unrecognized name"
        );
        assert_eq!(error_message(&Value::String("gateway".into())), "gateway");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(as_u64(Some(&json!("1048576"))), Some(1_048_576));
        assert_eq!(as_u64(Some(&json!(12))), Some(12));
        assert_eq!(as_f64(Some(&json!("0.000123"))), Some(0.000123));
        assert_eq!(as_f64(Some(&json!(null))), None);
        assert_eq!(as_u64(None), None);
    }
}
