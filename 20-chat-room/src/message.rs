use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub type ClientId = u64;

const ANONYMOUS: &str = "anonymous";

/// An opaque broadcast payload.
///
/// The hub never looks inside a message and attaches no sender, sequence
/// number or timestamp. Cloning is cheap, so fan-out hands every member its
/// own handle to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message(Bytes);

impl Message {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&'static str> for Message {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Identity metadata resolved for a connection before it reaches the hub.
///
/// Treated as inert: nothing in the hub validates or interprets it beyond
/// reading a display name for logs and chat stamping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    pub fn named(name: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), name.into());
        Self(fields)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Display name, or `"anonymous"` when the bag carries none.
    pub fn name(&self) -> &str {
        self.get("name")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
    }

    pub fn has_name(&self) -> bool {
        self.get("name").is_some_and(|name| !name.trim().is_empty())
    }
}
