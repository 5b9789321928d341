//! MongoDB client and document store
//!
//! Pattern adapted from the gateway's typed collection wrapper: connect with a
//! short server-selection timeout, ping, then apply schema-declared indexes.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{
    options::{
        FindOneAndUpdateOptions, FindOptions as MongoFindOptions, IndexOptions, ReturnDocument,
        UpdateOptions,
    },
    Client, Collection, IndexModel,
};
use tracing::{debug, info, warn};

use super::schemas::indexes_for;
use super::store::{DocumentStore, FindOptions, Model};
use crate::types::{PrismError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast on an unreachable server instead of hanging at startup
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| PrismError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PrismError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// [`DocumentStore`] backed by MongoDB collections of raw documents
#[derive(Clone)]
pub struct MongoStore {
    mongo: MongoClient,
}

impl MongoStore {
    /// Wrap a connected client and apply every model's indexes
    pub async fn new(mongo: MongoClient) -> Result<Self> {
        let store = Self { mongo };
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn collection(&self, model: Model) -> Collection<Document> {
        self.mongo
            .inner()
            .database(self.mongo.db_name())
            .collection::<Document>(model.collection_name())
    }

    /// Apply schema-defined indexes for every model
    async fn ensure_indexes(&self) -> Result<()> {
        for model in Model::ALL {
            let schema_indices = indexes_for(model);
            if schema_indices.is_empty() {
                continue;
            }

            let indices: Vec<IndexModel> = schema_indices
                .into_iter()
                .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
                .collect();

            if let Err(e) = self.collection(model).create_indexes(indices).await {
                warn!(collection = %model, error = %e, "Failed to create indexes");
            } else {
                debug!(collection = %model, "Indexes applied");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(&self, model: Model, mut doc: Document) -> Result<ObjectId> {
        if !doc.contains_key("_id") {
            doc.insert("_id", ObjectId::new());
        }

        let result = self
            .collection(model)
            .insert_one(doc)
            .await
            .map_err(|e| PrismError::Database(format!("Insert into {} failed: {}", model, e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| PrismError::Database("Failed to get inserted ID".into()))
    }

    async fn insert_many(&self, model: Model, docs: Vec<Document>) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(model)
            .insert_many(docs)
            .await
            .map_err(|e| PrismError::Database(format!("Bulk insert into {} failed: {}", model, e)))?;
        Ok(result.inserted_ids.len())
    }

    async fn find_one(&self, model: Model, filter: Document) -> Result<Option<Document>> {
        self.collection(model)
            .find_one(filter)
            .await
            .map_err(|e| PrismError::Database(format!("Find in {} failed: {}", model, e)))
    }

    async fn find(
        &self,
        model: Model,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let find_options = MongoFindOptions::builder()
            .sort(options.sort)
            .skip(options.skip)
            .limit(options.limit)
            .build();

        let cursor = self
            .collection(model)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(|e| PrismError::Database(format!("Query on {} failed: {}", model, e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| PrismError::Database(format!("Cursor on {} failed: {}", model, e)))
    }

    async fn count(&self, model: Model, filter: Document) -> Result<u64> {
        self.collection(model)
            .count_documents(filter)
            .await
            .map_err(|e| PrismError::Database(format!("Count on {} failed: {}", model, e)))
    }

    async fn find_one_and_update(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .upsert(upsert)
            .build();

        self.collection(model)
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(|e| PrismError::Database(format!("Update of {} failed: {}", model, e)))
    }

    async fn update_one(
        &self,
        model: Model,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<u64> {
        let options = UpdateOptions::builder().upsert(upsert).build();
        let result = self
            .collection(model)
            .update_one(filter, update)
            .with_options(options)
            .await
            .map_err(|e| PrismError::Database(format!("Update of {} failed: {}", model, e)))?;
        Ok(result.matched_count + u64::from(result.upserted_id.is_some()))
    }

    async fn update_many(&self, model: Model, filter: Document, update: Document) -> Result<u64> {
        let result = self
            .collection(model)
            .update_many(filter, update)
            .await
            .map_err(|e| PrismError::Database(format!("Update of {} failed: {}", model, e)))?;
        Ok(result.modified_count)
    }

    async fn find_one_and_delete(
        &self,
        model: Model,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.collection(model)
            .find_one_and_delete(filter)
            .await
            .map_err(|e| PrismError::Database(format!("Delete from {} failed: {}", model, e)))
    }

    async fn delete_many(&self, model: Model, filter: Document) -> Result<u64> {
        let result = self
            .collection(model)
            .delete_many(filter)
            .await
            .map_err(|e| PrismError::Database(format!("Delete from {} failed: {}", model, e)))?;
        Ok(result.deleted_count)
    }

    async fn distinct(&self, model: Model, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.collection(model)
            .distinct(field, filter)
            .await
            .map_err(|e| PrismError::Database(format!("Distinct on {} failed: {}", model, e)))
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance; the
    // in-memory store covers the same trait surface.
}
