//! Opaque sequence keys
//!
//! A sequence key is URL-safe base64 (no padding) of a small JSON object.
//! Clients treat it as opaque and hand it back to get the next page.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::feed_cache::CacheCursor;
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceKey {
    /// Feed cache generation and offset
    Cache { g: String, o: usize },
    /// Last row id seen by a time-sorted listing
    Row { id: String },
    /// Last ordering key seen by a thread listing
    Ordering { k: String },
    Offset { o: usize },
}

impl SequenceKey {
    pub fn encode(&self) -> String {
        // serializing these variants cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| PrismError::Validation("malformed sequenceKey".into()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| PrismError::Validation("malformed sequenceKey".into()))
    }

    /// Decode an optional key
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>> {
        raw.filter(|s| !s.is_empty()).map(Self::decode).transpose()
    }

    pub fn row(id: ObjectId) -> Self {
        SequenceKey::Row { id: id.to_hex() }
    }

    pub fn from_cache(cursor: &CacheCursor) -> Self {
        SequenceKey::Cache {
            g: cursor.generation.clone(),
            o: cursor.offset,
        }
    }

    pub fn into_cache(self) -> Result<CacheCursor> {
        match self {
            SequenceKey::Cache { g, o } => Ok(CacheCursor {
                generation: g,
                offset: o,
            }),
            _ => Err(mismatch()),
        }
    }

    pub fn into_row(self) -> Result<ObjectId> {
        match self {
            SequenceKey::Row { id } => ObjectId::parse_str(&id)
                .map_err(|_| PrismError::Validation("malformed sequenceKey".into())),
            _ => Err(mismatch()),
        }
    }

    pub fn into_ordering(self) -> Result<String> {
        match self {
            SequenceKey::Ordering { k } => Ok(k),
            _ => Err(mismatch()),
        }
    }

    pub fn into_offset(self) -> Result<usize> {
        match self {
            SequenceKey::Offset { o } => Ok(o),
            _ => Err(mismatch()),
        }
    }
}

fn mismatch() -> PrismError {
    PrismError::Validation("sequenceKey does not belong to this listing".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_are_distinguished() {
        let keys = [
            SequenceKey::Cache { g: "gen".into(), o: 20 },
            SequenceKey::row(ObjectId::new()),
            SequenceKey::Ordering { k: "0001-0002".into() },
            SequenceKey::Offset { o: 5 },
        ];
        for key in keys {
            assert_eq!(SequenceKey::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn test_encoding_is_url_safe() {
        let encoded = SequenceKey::Ordering { k: "??>>??".repeat(4) }.encode();
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
    }

    #[test]
    fn test_malformed_key() {
        let err = SequenceKey::decode("%%%").unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
        let wrong = SequenceKey::Offset { o: 1 }.into_row().unwrap_err();
        assert!(matches!(wrong, PrismError::Validation(_)));
        assert_eq!(SequenceKey::parse(Some("")).unwrap(), None);
    }
}
