//! Block and transaction completion notifications
//!
//! The dispatcher publishes every committed block here; wait endpoints block
//! on it with a bounded timeout.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::types::{PrismError, Result};

/// Blocks a transaction id stays resolvable after its block was committed
const TRANSACTION_HORIZON: u64 = 1_000;

pub struct BlockWaiter {
    last_block: watch::Sender<u64>,
    transactions: DashMap<String, u64>,
}

impl Default for BlockWaiter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BlockWaiter {
    pub fn new(last_block: u64) -> Self {
        let (last_block, _) = watch::channel(last_block);
        Self {
            last_block,
            transactions: DashMap::new(),
        }
    }

    pub fn last_block(&self) -> u64 {
        *self.last_block.borrow()
    }

    /// Record a committed block and wake waiters
    pub fn notify(&self, block_num: u64, transaction_ids: impl IntoIterator<Item = String>) {
        for id in transaction_ids {
            self.transactions.insert(id, block_num);
        }
        if block_num > TRANSACTION_HORIZON {
            let horizon = block_num - TRANSACTION_HORIZON;
            self.transactions.retain(|_, seen_in| *seen_in >= horizon);
        }
        self.last_block.send_replace(block_num);
    }

    /// Resolve once `block_num` is committed
    pub async fn wait_for_block(&self, block_num: u64, timeout: Duration) -> Result<u64> {
        let mut rx = self.last_block.subscribe();
        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                if current >= block_num {
                    return Ok(current);
                }
                if rx.changed().await.is_err() {
                    return Err(PrismError::Internal("block notifier closed".into()));
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| PrismError::Timeout(format!("block {} not reached", block_num)))?
    }

    /// Resolve with the block number once the transaction is committed
    pub async fn wait_for_transaction(&self, transaction_id: &str, timeout: Duration) -> Result<u64> {
        let mut rx = self.last_block.subscribe();
        let wait = async {
            loop {
                let _ = rx.borrow_and_update();
                if let Some(block_num) = self.transactions.get(transaction_id) {
                    return Ok(*block_num);
                }
                if rx.changed().await.is_err() {
                    return Err(PrismError::Internal("block notifier closed".into()));
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            PrismError::Timeout(format!("transaction {} not seen", transaction_id))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_block_resolves() {
        let waiter = Arc::new(BlockWaiter::new(5));
        let task = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.wait_for_block(7, Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.notify(6, vec![]);
        waiter.notify(7, vec!["tx".to_string()]);
        assert_eq!(task.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_past_block_resolves_immediately() {
        let waiter = BlockWaiter::new(10);
        assert_eq!(waiter.wait_for_block(3, Duration::from_millis(1)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let waiter = BlockWaiter::new(1);
        let err = waiter
            .wait_for_block(2, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 408);

        let err = waiter
            .wait_for_transaction("missing", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PrismError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_transaction_seen() {
        let waiter = Arc::new(BlockWaiter::new(0));
        let task = {
            let waiter = waiter.clone();
            tokio::spawn(async move {
                waiter
                    .wait_for_transaction("abc", Duration::from_secs(2))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.notify(3, vec!["abc".to_string()]);
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }
}
