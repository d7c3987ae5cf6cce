use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct IpSearchRequest {
    pub ip: Option<String>,
}

/// Optional filters; each set one becomes a `name:value` term.
#[derive(Debug, Default, Deserialize)]
pub struct FilterSearchRequest {
    pub port: Option<Value>,
    pub country: Option<Value>,
    pub product: Option<Value>,
    pub os: Option<Value>,
    pub category: Option<Value>,
}

/// Text of a filter value, or `None` when it should be left out
/// (null, blank, zero, false, or a structured value).
fn term_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

impl FilterSearchRequest {
    /// Provider query string, `None` if no filter is set.
    pub fn to_query(&self) -> Option<String> {
        let fields = [
            ("port", &self.port),
            ("country", &self.country),
            ("product", &self.product),
            ("os", &self.os),
            ("category", &self.category),
        ];
        let terms: Vec<String> = fields
            .into_iter()
            .filter_map(|(name, v)| {
                v.as_ref()
                    .and_then(term_value)
                    .map(|value| format!("{name}:{value}"))
            })
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }
}
