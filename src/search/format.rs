//! Reshapes provider search matches into the fixed record the clients render.
//! Every key is always emitted; missing values become `null` or empty lists.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

const DEFAULT_TRANSPORT: &str = "tcp";

/// A field of the wrong type reads as absent instead of failing the match.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLocation {
    #[serde(default, deserialize_with = "lenient")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub country_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub country_code: Option<String>,
}

/// One match as the provider sends it; only the fields we reshape are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMatch {
    #[serde(default, deserialize_with = "lenient")]
    pub ip_str: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "lenient")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub org: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub hostnames: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub domains: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub vulns: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub location: Option<RawLocation>,
    #[serde(default, deserialize_with = "lenient")]
    pub transport: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub info: Option<String>,
    #[serde(default)]
    pub http: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Decodes each match on its own; entries that are not objects are dropped.
pub fn decode_matches(matches: Vec<Value>) -> Vec<RawMatch> {
    matches
        .into_iter()
        .filter_map(|m| match serde_json::from_value::<RawMatch>(m) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(error = %e, "skipping undecodable search match");
                None
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct Location {
    pub city: Option<String>,
    pub country_name: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Opts {
    pub vulns: Map<String, Value>,
}

/// Per-service summary block.
#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub port: Option<u16>,
    pub transport: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub info: Option<String>,
    pub http: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct HostMatch {
    pub ip_str: Option<String>,
    pub port: Option<u16>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub org: Option<String>,
    pub os: Option<String>,
    pub hostnames: Vec<String>,
    pub domains: Vec<String>,
    pub timestamp: Option<String>,
    pub vulns: Vec<String>,
    pub opts: Opts,
    pub location: Location,
    pub transport: String,
    pub data: Vec<ServiceSummary>,
    pub raw_data: Option<Value>,
}

impl From<RawMatch> for HostMatch {
    fn from(m: RawMatch) -> Self {
        let transport = m
            .transport
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string());
        let vulns_map = m.vulns.unwrap_or_default();
        let location = m.location.unwrap_or_default();

        HostMatch {
            ip_str: m.ip_str,
            port: m.port,
            product: m.product.clone(),
            version: m.version.clone(),
            org: m.org,
            os: m.os,
            hostnames: m.hostnames.unwrap_or_default(),
            domains: m.domains.unwrap_or_default(),
            timestamp: m.timestamp,
            vulns: vulns_map.keys().cloned().collect(),
            opts: Opts { vulns: vulns_map },
            location: Location {
                city: location.city,
                country_name: location.country_name,
                country_code: location.country_code,
            },
            transport: transport.clone(),
            data: vec![ServiceSummary {
                port: m.port,
                transport,
                product: m.product,
                version: m.version,
                info: m.info,
                http: m.http,
            }],
            raw_data: m.data,
        }
    }
}

pub fn reshape(matches: Vec<RawMatch>) -> Vec<HostMatch> {
    matches.into_iter().map(HostMatch::from).collect()
}
