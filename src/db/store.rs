//! Document store seam
//!
//! Handlers, the undo log, the feed cache and the query API all talk to the
//! read-model through [`DocumentStore`]. Production uses MongoDB
//! ([`super::MongoStore`]); tests and dev mode use [`super::MemoryStore`].

use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::types::{PrismError, Result};

/// Static registry of every collection Prism materializes.
///
/// The undo log stores the model tag with each entry so the revert engine can
/// resolve the collection without any string lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    Post,
    Comment,
    Profile,
    Leader,
    Proposal,
    Pool,
    Hashtag,
    Community,
    UndoStack,
    ServiceState,
}

impl Model {
    pub const ALL: [Model; 10] = [
        Model::Post,
        Model::Comment,
        Model::Profile,
        Model::Leader,
        Model::Proposal,
        Model::Pool,
        Model::Hashtag,
        Model::Community,
        Model::UndoStack,
        Model::ServiceState,
    ];

    /// MongoDB collection backing this model
    pub fn collection_name(&self) -> &'static str {
        match self {
            Model::Post => "posts",
            Model::Comment => "comments",
            Model::Profile => "profiles",
            Model::Leader => "leaders",
            Model::Proposal => "proposals",
            Model::Pool => "pools",
            Model::Hashtag => "hashtags",
            Model::Community => "communities",
            Model::UndoStack => "undo_stacks",
            Model::ServiceState => "service_state",
        }
    }

    /// Whether mutations of this model go through the undo log.
    ///
    /// Bookkeeping collections are written directly by the dispatcher.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Model::UndoStack | Model::ServiceState)
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Sort/skip/limit for range queries
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sorted(sort: Document) -> Self {
        Self {
            sort: Some(sort),
            ..Default::default()
        }
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Point CRUD, atomic read-modify-write, update operators and range queries.
///
/// Update documents use MongoDB operator syntax (`$set`, `$unset`, `$inc`,
/// `$push`, `$pull`, `$addToSet`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, assigning an `_id` if it has none
    async fn insert_one(&self, model: Model, doc: Document) -> Result<ObjectId>;

    /// Insert a batch of documents
    async fn insert_many(&self, model: Model, docs: Vec<Document>) -> Result<usize>;

    async fn find_one(&self, model: Model, filter: Document) -> Result<Option<Document>>;

    async fn find(&self, model: Model, filter: Document, options: FindOptions)
        -> Result<Vec<Document>>;

    async fn count(&self, model: Model, filter: Document) -> Result<u64>;

    /// Apply `update` to the first match and return its pre-update image.
    ///
    /// Returns `None` when nothing matched; with `upsert` a new document is
    /// created in that case.
    async fn find_one_and_update(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>>;

    /// Apply `update` to the first match, returning the matched count
    async fn update_one(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<u64>;

    async fn update_many(&self, model: Model, filter: Document, update: Document) -> Result<u64>;

    /// Remove the first match and return it
    async fn find_one_and_delete(&self, model: Model, filter: Document)
        -> Result<Option<Document>>;

    async fn delete_many(&self, model: Model, filter: Document) -> Result<u64>;

    /// Distinct values of `field` across matching documents
    async fn distinct(&self, model: Model, field: &str, filter: Document) -> Result<Vec<Bson>>;
}

/// Shared handle used across tasks
pub type SharedStore = Arc<dyn DocumentStore>;

/// Decode a raw document into a typed schema
pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(bson::from_document(doc)?)
}

/// Encode a typed schema into a raw document
pub fn encode<T: Serialize>(value: &T) -> Result<Document> {
    Ok(bson::to_document(value)?)
}

/// Encode any serializable value as a BSON value
pub fn to_bson<T: Serialize + ?Sized>(value: &T) -> Result<Bson> {
    Ok(bson::to_bson(value)?)
}

/// Read the `_id` of a stored document
pub fn document_id(doc: &Document) -> Result<ObjectId> {
    doc.get_object_id("_id")
        .map_err(|e| PrismError::Database(format!("Document without ObjectId _id: {}", e)))
}

/// Resolve a dotted path (`stats.rShares`) inside a document
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Top-level field names touched by an update document.
///
/// `{"$set": {"stats.hot": 1}, "$inc": {"votes.upCount": 1}}` touches
/// `stats` and `votes`.
pub fn touched_top_level_fields(update: &Document) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for (_, spec) in update {
        if let Bson::Document(spec) = spec {
            for path in spec.keys() {
                let top = path.split('.').next().unwrap_or(path).to_string();
                if !fields.contains(&top) {
                    fields.push(top);
                }
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_collection_names_unique() {
        let mut names: Vec<&str> = Model::ALL.iter().map(|m| m.collection_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Model::ALL.len());
    }

    #[test]
    fn test_bookkeeping_models_not_recorded() {
        assert!(Model::Post.is_recorded());
        assert!(!Model::UndoStack.is_recorded());
        assert!(!Model::ServiceState.is_recorded());
    }

    #[test]
    fn test_get_path() {
        let d = doc! { "stats": { "rShares": 10_i64 }, "flat": "x" };
        assert_eq!(get_path(&d, "stats.rShares"), Some(&Bson::Int64(10)));
        assert_eq!(get_path(&d, "flat"), Some(&Bson::String("x".into())));
        assert!(get_path(&d, "flat.deeper").is_none());
        assert!(get_path(&d, "missing").is_none());
    }

    #[test]
    fn test_touched_fields() {
        let update = doc! {
            "$set": { "stats.hot": 1.0, "stats.trending": 2.0 },
            "$inc": { "votes.upCount": 1 },
            "$push": { "tags": "x" },
        };
        assert_eq!(touched_top_level_fields(&update), vec!["stats", "votes", "tags"]);
    }
}
