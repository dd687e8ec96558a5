//! JSON payload attached to every bridge request and response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Zero or one JSON value. An empty payload is `null` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Option<Value>);

impl Payload {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(BridgeError::Encode)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self(None),
            value => Self(Some(value)),
        }
    }

    /// Parses wire bytes. Empty input is an empty payload.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty());
        }

        serde_json::from_slice::<Value>(raw)
            .map(Self::from_value)
            .map_err(BridgeError::decode::<Value>)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(BridgeError::Encode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Decodes into `T`. An empty payload decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.0.clone().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(BridgeError::decode::<T>)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}
