//! Persisted ingestion position

use bson::{doc, DateTime};

use crate::db::schemas::ServiceStateDoc;
use crate::db::{decode, DocumentStore, Model};
use crate::types::Result;

/// Last block whose actions were fully dispersed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestPosition {
    pub block_num: u64,
    pub block_time: Option<DateTime>,
}

pub async fn load(store: &dyn DocumentStore) -> Result<Option<IngestPosition>> {
    let Some(doc) = store
        .find_one(Model::ServiceState, ServiceStateDoc::filter())
        .await?
    else {
        return Ok(None);
    };
    let state: ServiceStateDoc = decode(doc)?;
    Ok(Some(IngestPosition {
        block_num: state.last_block_num.max(0) as u64,
        block_time: state.last_block_time,
    }))
}

pub async fn save(store: &dyn DocumentStore, position: IngestPosition) -> Result<()> {
    let update = match position.block_time {
        Some(time) => doc! {
            "$set": { "lastBlockNum": position.block_num as i64, "lastBlockTime": time },
        },
        None => doc! {
            "$set": { "lastBlockNum": position.block_num as i64 },
            "$unset": { "lastBlockTime": "" },
        },
    };
    store
        .update_one(Model::ServiceState, ServiceStateDoc::filter(), update, true)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_position_round_trip() {
        let store = MemoryStore::new();
        assert!(load(&store).await.unwrap().is_none());

        let time = DateTime::from_millis(1_700_000_000_000);
        save(&store, IngestPosition { block_num: 10, block_time: Some(time) })
            .await
            .unwrap();
        save(&store, IngestPosition { block_num: 11, block_time: None })
            .await
            .unwrap();

        let position = load(&store).await.unwrap().unwrap();
        assert_eq!(position.block_num, 11);
        assert!(position.block_time.is_none());
        assert_eq!(store.len(Model::ServiceState), 1);
    }
}
