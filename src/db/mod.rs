//! Database layer
//!
//! MongoDB for production, an in-memory store for dev mode and tests, both
//! behind the [`DocumentStore`] trait.

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{IntoIndexes, MongoClient, MongoStore};
pub use store::{
    decode, document_id, encode, get_path, to_bson, touched_top_level_fields, DocumentStore,
    FindOptions, Model, SharedStore,
};
