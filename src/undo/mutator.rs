//! Recording mutation layer
//!
//! Every write a handler makes to the read-model goes through [`Mutator`],
//! which applies it and appends the inverse to the current block's undo
//! stack. Update inverses hold the full pre-image of each touched top-level
//! field; fields that did not exist are listed for removal.

use bson::{oid::ObjectId, Document};

use super::log::UndoLog;
use crate::db::schemas::{UndoCommand, UndoEntry, UpdateInverse};
use crate::db::{document_id, touched_top_level_fields, Model, SharedStore};
use crate::types::{BlockContext, PrismError, Result};

#[derive(Clone)]
pub struct Mutator {
    store: SharedStore,
    log: UndoLog,
}

impl Mutator {
    pub fn new(store: SharedStore) -> Self {
        let log = UndoLog::new(store.clone());
        Self { store, log }
    }

    /// Read access for handlers; reads are not recorded
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn log(&self) -> &UndoLog {
        &self.log
    }

    /// Insert a document and record its deletion as the inverse
    pub async fn create(&self, ctx: &BlockContext, model: Model, doc: Document) -> Result<ObjectId> {
        guard(model)?;
        let id = self.store.insert_one(model, doc).await?;
        self.log
            .record(ctx, &entry(UndoCommand::Create, model, id))
            .await?;
        Ok(id)
    }

    /// Update the first match, returning its pre-image (`None` if nothing matched)
    pub async fn update(
        &self,
        ctx: &BlockContext,
        model: Model,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>> {
        guard(model)?;
        let fields = touched_top_level_fields(&update);
        let before = self
            .store
            .find_one_and_update(model, filter, update, false)
            .await?;

        if let Some(before) = &before {
            self.record_update(ctx, model, before, &fields).await?;
        }
        Ok(before)
    }

    /// Update the first match or insert one seeded from the filter.
    ///
    /// An insert is recorded as a create, an update as an update.
    pub async fn upsert(
        &self,
        ctx: &BlockContext,
        model: Model,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>> {
        guard(model)?;
        let fields = touched_top_level_fields(&update);
        let before = self
            .store
            .find_one_and_update(model, filter.clone(), update, true)
            .await?;

        match &before {
            Some(before) => self.record_update(ctx, model, before, &fields).await?,
            None => {
                let created = self.store.find_one(model, filter).await?.ok_or_else(|| {
                    PrismError::Database(format!("Upserted document in {} not found", model))
                })?;
                self.log
                    .record(
                        ctx,
                        &entry(UndoCommand::Create, model, document_id(&created)?),
                    )
                    .await?;
            }
        }
        Ok(before)
    }

    /// Delete the first match, recording the full document as the inverse
    pub async fn remove(
        &self,
        ctx: &BlockContext,
        model: Model,
        filter: Document,
    ) -> Result<Option<Document>> {
        guard(model)?;
        let removed = self.store.find_one_and_delete(model, filter).await?;
        if let Some(removed) = &removed {
            let mut undo = entry(UndoCommand::Remove, model, document_id(removed)?);
            undo.inverse = removed.clone();
            self.log.record(ctx, &undo).await?;
        }
        Ok(removed)
    }

    async fn record_update(
        &self,
        ctx: &BlockContext,
        model: Model,
        before: &Document,
        fields: &[String],
    ) -> Result<()> {
        let mut undo = entry(UndoCommand::Update, model, document_id(before)?);
        undo.restore = restore_fields(before, fields);
        self.log.record(ctx, &undo).await
    }
}

fn guard(model: Model) -> Result<()> {
    if model.is_recorded() {
        Ok(())
    } else {
        Err(PrismError::Internal(format!(
            "{} is bookkeeping and cannot be mutated through the undo log",
            model
        )))
    }
}

fn entry(command: UndoCommand, model: Model, id: ObjectId) -> UndoEntry {
    UndoEntry {
        command,
        model_name: model,
        document_id: id,
        inverse: Document::new(),
        restore: UpdateInverse::default(),
    }
}

/// Previous values of `fields` in `before`
pub fn restore_fields(before: &Document, fields: &[String]) -> UpdateInverse {
    let mut restore = UpdateInverse::default();
    for field in fields {
        match before.get(field) {
            Some(value) => {
                restore.set.insert(field.clone(), value.clone());
            }
            None => restore.unset.push(field.clone()),
        }
    }
    restore
}
