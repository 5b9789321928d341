//! Conversion of stored documents into response items

use bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

/// Stored document as client JSON: `_id` becomes a hex `id`, dates become
/// RFC 3339 strings.
pub fn to_item(doc: Document) -> JsonValue {
    let mut object = Map::new();
    for (key, value) in doc {
        if key == "_id" {
            if let Bson::ObjectId(id) = value {
                object.insert("id".into(), JsonValue::String(id.to_hex()));
            }
            continue;
        }
        object.insert(key, to_json(value));
    }
    JsonValue::Object(object)
}

pub fn to_json(value: Bson) -> JsonValue {
    match value {
        Bson::ObjectId(id) => JsonValue::String(id.to_hex()),
        Bson::DateTime(time) => JsonValue::String(
            time.try_to_rfc3339_string()
                .unwrap_or_else(|_| time.timestamp_millis().to_string()),
        ),
        Bson::Document(doc) => JsonValue::Object(
            doc.into_iter()
                .map(|(key, value)| (key, to_json(value)))
                .collect(),
        ),
        Bson::Array(items) => JsonValue::Array(items.into_iter().map(to_json).collect()),
        Bson::Int32(v) => JsonValue::from(v),
        Bson::Int64(v) => JsonValue::from(v),
        Bson::Double(v) => JsonValue::from(v),
        Bson::String(s) => JsonValue::String(s),
        Bson::Boolean(b) => JsonValue::Bool(b),
        Bson::Null | Bson::Undefined => JsonValue::Null,
        other => other.into_relaxed_extjson(),
    }
}

/// Mark whether `viewer` voted on a content item
pub fn with_viewer_votes(mut item: JsonValue, viewer: Option<&str>) -> JsonValue {
    let Some(viewer) = viewer else {
        return item;
    };
    let Some(votes) = item.get_mut("votes").and_then(JsonValue::as_object_mut) else {
        return item;
    };
    let voted = |list: &str| {
        votes
            .get(list)
            .and_then(JsonValue::as_array)
            .is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| e.get("userId").and_then(JsonValue::as_str) == Some(viewer))
            })
    };
    let has_up = voted("upVotes");
    let has_down = voted("downVotes");
    votes.insert("hasUpVote".into(), JsonValue::Bool(has_up));
    votes.insert("hasDownVote".into(), JsonValue::Bool(has_down));
    item
}
