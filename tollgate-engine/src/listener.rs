use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tollgate_core::TransactionSource;
use tollgate_shared::Verification;
use tracing::{debug, info, warn};

use crate::ack::Acknowledger;
use crate::engine::EntitlementHandle;

/// Drains the platform's transaction updates for the life of the process.
///
/// Renewals, revocations, family-sharing changes and purchases made on other
/// devices all arrive here, each one triggering a full refresh.
pub struct TransactionListener {
    source: Arc<dyn TransactionSource>,
    engine: EntitlementHandle,
    acks: Acknowledger,
}

impl TransactionListener {
    pub fn new(source: Arc<dyn TransactionSource>, engine: EntitlementHandle, acks: Acknowledger) -> Self {
        Self {
            source,
            engine,
            acks,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut updates = self.source.updates();
        info!("Transaction listener started");

        while let Some(update) = updates.next().await {
            match update {
                Verification::Verified(tx) => {
                    debug!(transaction_id = tx.id, product_id = %tx.product_id, "Transaction update received");
                    match self.engine.try_refresh().await {
                        Ok(state) => {
                            self.acks.finish(&tx).await;
                            debug!(revision = state.revision, subscribed = state.is_subscribed(), "Applied transaction update");
                        }
                        // Left unfinished for the next successful pass or a redelivery
                        Err(_) => warn!(transaction_id = tx.id, "Transaction update not applied, leaving it unfinished"),
                    }
                }
                Verification::Unverified { transaction, reason } => {
                    warn!(
                        transaction_id = transaction.id,
                        product_id = %transaction.product_id,
                        %reason,
                        "Dropping unverified transaction update"
                    );
                }
            }
        }

        // Reconnection is the platform layer's job
        warn!("Transaction update stream ended");
    }
}
