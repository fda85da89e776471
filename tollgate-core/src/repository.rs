use std::collections::BTreeSet;

use async_trait::async_trait;
use tollgate_shared::Offer;

use crate::{LedgerError, StoreError};

/// Source of purchasable offer metadata
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn load_offers(&self, ids: &BTreeSet<String>) -> Result<Vec<Offer>, LedgerError>;
}

/// Persistence for the external-payment override flag
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn load(&self) -> Result<bool, StoreError>;

    async fn save(&self, active: bool) -> Result<(), StoreError>;
}
