//! Parsers for proxy list feeds.

use crate::proxy::{Protocol, RawProxy};

use serde_json::{Map, Value};

/// Parse a feed body: JSON if it decodes as JSON, plain text otherwise.
pub(crate) fn parse_proxy_feed(content: &str, default: Protocol) -> Vec<RawProxy> {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => parse_json_proxy_list(&value),
        _ => parse_proxy_list(content, default),
    }
}

/// Parse one proxy per line, `scheme://host:port` or bare `host:port`.
///
/// Blank lines and `#` comments are skipped. Bare entries get `default`.
pub(crate) fn parse_proxy_list(content: &str, default: Protocol) -> Vec<RawProxy> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || !line.contains(':') {
                return None;
            }
            if line.contains("://") {
                Some(RawProxy::new(line))
            } else {
                Some(RawProxy::new(line).protocol(default.as_str()))
            }
        })
        .collect()
}

/// Parse a JSON feed: an array of proxy objects, or an object holding one
/// under `proxies`.
pub(crate) fn parse_json_proxy_list(value: &Value) -> Vec<RawProxy> {
    let entries: &[Value] = match value {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match map.get("proxies") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(raw_proxy_from_object)
        .collect()
}

fn raw_proxy_from_object(object: &Map<String, Value>) -> Option<RawProxy> {
    let protocol = text_field(object, "protocol");
    let ip = text_field(object, "ip");
    let port = text_field(object, "port");

    let mut raw = match (protocol, ip, port) {
        (Some(protocol), Some(ip), Some(port)) => {
            RawProxy::new(format!("{}:{}", ip, port)).protocol(protocol)
        }
        _ => RawProxy::new(text_field(object, "url").or_else(|| text_field(object, "proxy"))?),
    };

    raw.country = lookup(object, "country");
    raw.anonymity = lookup(object, "anonymity");
    Some(raw)
}

// Top level first, then one level down in any nested object.
fn lookup(object: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(object, key).or_else(|| {
        object
            .values()
            .filter_map(Value::as_object)
            .find_map(|nested| text_field(nested, key))
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
