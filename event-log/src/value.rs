//! The normalized shape of a variable-schema payload.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A decoded payload: a string, a mapping, or nothing at all.
///
/// There is deliberately no numeric or boolean case. Everything the source
/// does not mark as text collapses to either a string or a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecoderValue {
    /// The field was absent or carried no content.
    #[default]
    Null,

    /// Text content.
    String(String),

    /// Child tags and attributes keyed by name.
    Map(IndexMap<String, Field>),
}

/// One entry of a [`DecoderValue::Map`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    /// A tag that appeared once, or an attribute.
    One(DecoderValue),

    /// A tag that appeared several times, in document order.
    Many(Vec<DecoderValue>),
}

impl DecoderValue {
    /// Check if the value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the text if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the mapping if this is a map value.
    pub fn as_map(&self) -> Option<&IndexMap<String, Field>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl Field {
    /// The value of a single-occurrence entry.
    pub fn as_one(&self) -> Option<&DecoderValue> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(_) => None,
        }
    }

    /// The values of a repeated entry.
    pub fn as_many(&self) -> Option<&[DecoderValue]> {
        match self {
            Self::One(_) => None,
            Self::Many(values) => Some(values),
        }
    }
}

impl From<&str> for DecoderValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for DecoderValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
