use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::options::JsonMap;
use crate::transport::ResponseEnvelope;

/// Shape a response body is cast into.
///
/// Deserializes from the provider-facing names used in configuration files;
/// `"array"` is the historical name of the generic map shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ResponseShape {
    #[default]
    #[serde(alias = "array", alias = "map")]
    GenericMap,
    #[serde(alias = "raw")]
    RawBytes,
    #[serde(alias = "typed", alias = "object")]
    Typed,
}

/// A cast response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Casted<T> {
    GenericMap(JsonMap),
    RawBytes(Bytes),
    Typed(T),
}

impl<T> Casted<T> {
    pub fn into_map(self) -> Option<JsonMap> {
        match self {
            Self::GenericMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_typed(self) -> Option<T> {
        match self {
            Self::Typed(value) => Some(value),
            _ => None,
        }
    }
}

/// Result of a request: either the untouched envelope or a cast body.
#[derive(Debug, Clone)]
pub enum Reply<T = serde_json::Value> {
    Raw(ResponseEnvelope),
    Casted(Casted<T>),
}

impl<T> Reply<T> {
    pub fn into_raw(self) -> Option<ResponseEnvelope> {
        match self {
            Self::Raw(envelope) => Some(envelope),
            Self::Casted(_) => None,
        }
    }

    pub fn into_casted(self) -> Option<Casted<T>> {
        match self {
            Self::Casted(casted) => Some(casted),
            Self::Raw(_) => None,
        }
    }
}

/// Converts a response body into `shape`.
///
/// An empty body casts to an empty map, since several provider endpoints
/// answer `204 No Content`. Malformed JSON is a serialization fault.
pub fn cast<T: DeserializeOwned>(
    envelope: ResponseEnvelope,
    shape: ResponseShape,
) -> Result<Casted<T>> {
    let body = envelope.body;
    match shape {
        ResponseShape::RawBytes => Ok(Casted::RawBytes(body)),
        ResponseShape::GenericMap if body.iter().all(u8::is_ascii_whitespace) => {
            Ok(Casted::GenericMap(JsonMap::new()))
        }
        ResponseShape::GenericMap => Ok(Casted::GenericMap(serde_json::from_slice(&body)?)),
        ResponseShape::Typed => Ok(Casted::Typed(serde_json::from_slice(&body)?)),
    }
}

/// Binds a response body directly into `T`.
pub fn cast_typed<T: DeserializeOwned>(envelope: ResponseEnvelope) -> Result<T> {
    Ok(serde_json::from_slice(&envelope.body)?)
}
