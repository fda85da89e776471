use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tollgate_core::TransactionSource;
use tollgate_shared::{TransactionId, TransactionRecord};
use tracing::{debug, warn};

/// Finishes verified transactions against the ledger, at most once each.
///
/// Shared by the engine, the purchase coordinator and the update listener,
/// which can all see the same transaction.
///
/// The finished set holds every transaction id acknowledged in this process
/// and is never pruned: a transaction that has dropped out of the current
/// entitlements can still come back through `updates()` (a revocation, for
/// one) and must not be finished again.
#[derive(Clone)]
pub struct Acknowledger {
    source: Arc<dyn TransactionSource>,
    finished: Arc<Mutex<HashSet<TransactionId>>>,
}

impl Acknowledger {
    pub fn new(source: Arc<dyn TransactionSource>) -> Self {
        Self {
            source,
            finished: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns true if this call finished the transaction.
    ///
    /// A failed finish releases the claim so a later pass can retry it.
    pub async fn finish(&self, transaction: &TransactionRecord) -> bool {
        if !self.finished.lock().insert(transaction.id) {
            return false;
        }

        match self.source.finish(transaction).await {
            Ok(()) => {
                debug!(transaction_id = transaction.id, product_id = %transaction.product_id, "Transaction acknowledged");
                true
            }
            Err(e) => {
                warn!(transaction_id = transaction.id, error = %e, "Failed to acknowledge transaction");
                self.finished.lock().remove(&transaction.id);
                false
            }
        }
    }

    pub async fn finish_all(&self, transactions: &[TransactionRecord]) -> usize {
        let mut count = 0;
        for tx in transactions {
            if self.finish(tx).await {
                count += 1;
            }
        }
        count
    }

    pub fn is_finished(&self, id: TransactionId) -> bool {
        self.finished.lock().contains(&id)
    }
}
