use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::transport::ClientCert;

/// JSON object used for request payloads.
///
/// Backed by a `BTreeMap`, so serialization emits keys in sorted order and
/// the signed body is reproducible for identical payloads.
pub type JsonMap = serde_json::Map<String, Value>;

/// Shallow, ordered merge: a key takes the value from the last source that
/// defines it. Nested objects are replaced wholesale. `None` sources count
/// as empty maps.
pub fn merge<'a, I>(sources: I) -> JsonMap
where
    I: IntoIterator<Item = Option<&'a JsonMap>>,
{
    let mut merged = JsonMap::new();
    for source in sources.into_iter().flatten() {
        for (key, value) in source {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Drops top-level keys holding `null`, `""` or `{}`.
pub fn prune_empty(map: JsonMap) -> JsonMap {
    map.into_iter().filter(|(_, value)| !is_empty(value)).collect()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Joins query parameters as `k=v&k=v` in ascending key order.
///
/// Keys and values are percent-encoded here, leaving only unreserved
/// characters, so the HTTP client has nothing left to re-encode and the
/// signed query is the one on the wire.
pub fn canonical_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Per-call options supplied by the caller.
///
/// `body` takes part in the merge with identity fields and prepends;
/// headers and the client certificate travel beside it and are never signed.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: JsonMap,
    pub headers: BTreeMap<String, String>,
    pub client_cert: Option<ClientCert>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from any serializable payload that encodes as a JSON object.
    pub fn from_body<B: Serialize>(body: &B) -> Result<Self> {
        let body: JsonMap = serde_json::from_value(serde_json::to_value(body)?)?;
        Ok(Self {
            body,
            ..Self::default()
        })
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
