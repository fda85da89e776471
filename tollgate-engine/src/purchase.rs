use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tollgate_catalog::ProductCatalog;
use tollgate_core::{PurchasePlatform, PurchaseResult};
use tollgate_shared::{EntitlementState, Offer, TransactionRecord, Verification};
use tracing::{error, info, warn};

use crate::ack::Acknowledger;
use crate::engine::EntitlementHandle;

/// Classified result of one purchase attempt
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOutcome {
    /// Verified and applied; `entitlement` is the state published for it
    Completed {
        transaction: TransactionRecord,
        entitlement: EntitlementState,
    },
    Cancelled,
    /// Deferred, e.g. ask-to-buy, or verified while the ledger was
    /// unreachable. The grant arrives with a later refresh or update.
    Pending,
    VerificationFailed { reason: String },
    Failed { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("Offer not found in catalog: {0}")]
    UnknownOffer(String),
    #[error("Another purchase is already in progress")]
    InProgress,
}

pub struct PurchaseCoordinator {
    platform: Arc<dyn PurchasePlatform>,
    catalog: Arc<ProductCatalog>,
    engine: EntitlementHandle,
    acks: Acknowledger,
    in_flight: AtomicBool,
}

impl PurchaseCoordinator {
    pub fn new(
        platform: Arc<dyn PurchasePlatform>,
        catalog: Arc<ProductCatalog>,
        engine: EntitlementHandle,
        acks: Acknowledger,
    ) -> Self {
        Self {
            platform,
            catalog,
            engine,
            acks,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Purchase an offer from the cached catalog by id
    pub async fn purchase(&self, offer_id: &str) -> Result<PurchaseOutcome, PurchaseError> {
        let offer = self
            .catalog
            .find(offer_id)
            .ok_or_else(|| PurchaseError::UnknownOffer(offer_id.to_string()))?;
        self.purchase_offer(&offer).await
    }

    /// Run the platform purchase flow and classify it.
    ///
    /// A verified purchase only returns once the engine has published the
    /// state that includes it.
    pub async fn purchase_offer(&self, offer: &Offer) -> Result<PurchaseOutcome, PurchaseError> {
        let _slot = InFlight::acquire(&self.in_flight).ok_or(PurchaseError::InProgress)?;
        info!(offer_id = %offer.id, price = %offer.price, "Starting purchase");

        let outcome = match self.platform.purchase(offer).await {
            Ok(PurchaseResult::Success(Verification::Verified(transaction))) => {
                match self.engine.try_refresh().await {
                    Ok(entitlement) => {
                        self.acks.finish(&transaction).await;
                        info!(
                            offer_id = %offer.id,
                            transaction_id = transaction.id,
                            subscribed = entitlement.is_subscribed(),
                            "Purchase completed"
                        );
                        PurchaseOutcome::Completed {
                            transaction,
                            entitlement,
                        }
                    }
                    Err(e) => {
                        // Stays unfinished; the next successful pass applies it
                        warn!(
                            offer_id = %offer.id,
                            transaction_id = transaction.id,
                            error = %e,
                            "Purchase verified but not yet applied"
                        );
                        PurchaseOutcome::Pending
                    }
                }
            }
            Ok(PurchaseResult::Success(Verification::Unverified { transaction, reason })) => {
                warn!(offer_id = %offer.id, transaction_id = transaction.id, %reason, "Unverified purchase");
                PurchaseOutcome::VerificationFailed { reason }
            }
            Ok(PurchaseResult::UserCancelled) => {
                info!(offer_id = %offer.id, "Purchase cancelled by user");
                PurchaseOutcome::Cancelled
            }
            Ok(PurchaseResult::Pending) => {
                info!(offer_id = %offer.id, "Purchase pending approval");
                PurchaseOutcome::Pending
            }
            Err(e) => {
                error!(offer_id = %offer.id, error = %e, "Purchase failed");
                PurchaseOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Ok(outcome)
    }

    pub fn is_purchasing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
