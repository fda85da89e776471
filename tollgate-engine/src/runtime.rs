use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tollgate_catalog::ProductCatalog;
use tollgate_core::{OfferSource, OverrideStore, PurchasePlatform, TransactionSource};
use tollgate_shared::products;
use tracing::info;

use crate::ack::Acknowledger;
use crate::engine::{EntitlementEngine, EntitlementHandle};
use crate::listener::TransactionListener;
use crate::purchase::PurchaseCoordinator;
use crate::restore::RestoreCoordinator;

/// External collaborators the engine is wired against
#[derive(Clone)]
pub struct ServiceDeps {
    pub offers: Arc<dyn OfferSource>,
    pub ledger: Arc<dyn TransactionSource>,
    pub platform: Arc<dyn PurchasePlatform>,
    pub overrides: Arc<dyn OverrideStore>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tracked_products: BTreeSet<String>,
    pub catalog_products: BTreeSet<String>,
    pub command_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tracked_products: products::default_product_ids(),
            catalog_products: products::default_product_ids(),
            command_buffer: 64,
        }
    }
}

/// Everything the app needs for paid-access gating, started together.
pub struct EntitlementServices {
    pub catalog: Arc<ProductCatalog>,
    pub engine: EntitlementHandle,
    pub purchases: PurchaseCoordinator,
    pub restores: RestoreCoordinator,
    catalog_products: BTreeSet<String>,
    listener: JoinHandle<()>,
}

impl EntitlementServices {
    /// Start the engine and the update listener, then load the catalog and
    /// the first entitlement snapshot concurrently.
    pub async fn start(deps: ServiceDeps, settings: EngineSettings) -> Self {
        let acks = Acknowledger::new(deps.ledger.clone());
        let (engine, _engine_task) = EntitlementEngine::spawn(
            deps.ledger.clone(),
            deps.overrides.clone(),
            acks.clone(),
            settings.tracked_products.clone(),
            settings.command_buffer,
        );

        let listener = TransactionListener::new(deps.ledger.clone(), engine.clone(), acks.clone()).spawn();

        let catalog = Arc::new(ProductCatalog::new(deps.offers.clone()));
        let (offers, state) = tokio::join!(
            catalog.fetch(&settings.catalog_products),
            engine.refresh()
        );
        info!(
            offers = offers.len(),
            status = ?state.status,
            "Entitlement services started"
        );

        Self {
            purchases: PurchaseCoordinator::new(deps.platform.clone(), catalog.clone(), engine.clone(), acks),
            restores: RestoreCoordinator::new(deps.platform, engine.clone()),
            catalog,
            engine,
            catalog_products: settings.catalog_products,
            listener,
        }
    }

    /// Re-fetch the configured catalog
    pub async fn refresh_catalog(&self) -> usize {
        self.catalog.fetch(&self.catalog_products).await.len()
    }

    /// Stop consuming transaction updates. The engine itself stops once the
    /// last handle is dropped.
    pub fn shutdown(&self) {
        self.listener.abort();
    }
}

impl Drop for EntitlementServices {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
