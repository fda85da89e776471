use async_trait::async_trait;
use tollgate_shared::{Offer, Verification};

use crate::PlatformError;

/// Raw result of a platform purchase sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseResult {
    Success(Verification),
    UserCancelled,
    /// Deferred, e.g. waiting on a parent's approval
    Pending,
}

#[async_trait]
pub trait PurchasePlatform: Send + Sync {
    /// Run the platform purchase flow for an offer
    async fn purchase(&self, offer: &Offer) -> Result<PurchaseResult, PlatformError>;

    /// Force a re-sync of the local ledger with the platform
    async fn sync(&self) -> Result<(), PlatformError>;
}
