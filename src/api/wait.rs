//! `content.waitForBlock` / `content.waitForTransaction`

use serde::{Deserialize, Serialize};

use super::QueryApi;
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitBlockParams {
    pub block_num: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTransactionParams {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitResult {
    pub block_num: u64,
}

impl QueryApi {
    /// Resolve once `blockNum` is ingested
    pub async fn wait_for_block(&self, params: WaitBlockParams) -> Result<WaitResult> {
        let block_num = self
            .waiter
            .wait_for_block(params.block_num, self.config.wait_timeout)
            .await?;
        Ok(WaitResult { block_num })
    }

    /// Resolve with the ingesting block once the transaction is seen
    pub async fn wait_for_transaction(&self, params: WaitTransactionParams) -> Result<WaitResult> {
        if params.transaction_id.is_empty() {
            return Err(PrismError::Validation("transactionId is required".into()));
        }
        let block_num = self
            .waiter
            .wait_for_transaction(&params.transaction_id, self.config.wait_timeout)
            .await?;
        Ok(WaitResult { block_num })
    }
}
