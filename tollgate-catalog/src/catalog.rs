use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tollgate_core::OfferSource;
use tollgate_shared::Offer;
use tracing::{info, warn};

/// Cached catalog of purchasable offers.
///
/// The offer set is replaced wholesale on every successful fetch and kept
/// as-is when a fetch fails.
pub struct ProductCatalog {
    source: Arc<dyn OfferSource>,
    offers: watch::Sender<Arc<Vec<Offer>>>,
    loading: watch::Sender<bool>,
}

impl ProductCatalog {
    pub fn new(source: Arc<dyn OfferSource>) -> Self {
        let (offers, _) = watch::channel(Arc::new(Vec::new()));
        let (loading, _) = watch::channel(false);
        Self {
            source,
            offers,
            loading,
        }
    }

    /// Fetch offers for `ids`, sorted ascending by price.
    ///
    /// Returns the catalog in effect afterwards; on failure that is the
    /// previously cached one.
    pub async fn fetch(&self, ids: &BTreeSet<String>) -> Arc<Vec<Offer>> {
        let _loading = LoadingGuard::start(&self.loading);

        match self.source.load_offers(ids).await {
            Ok(mut loaded) => {
                loaded.sort_by(|a, b| a.price.cmp(&b.price));
                info!(count = loaded.len(), "Offer catalog refreshed");
                self.offers.send_replace(Arc::new(loaded));
            }
            Err(e) => {
                warn!(error = %e, "Offer fetch failed, keeping cached catalog");
            }
        }

        self.offers()
    }

    pub fn offers(&self) -> Arc<Vec<Offer>> {
        self.offers.borrow().clone()
    }

    pub fn find(&self, offer_id: &str) -> Option<Offer> {
        self.offers.borrow().iter().find(|o| o.id == offer_id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Observe the loading flag (for spinners)
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Offer>>> {
        self.offers.subscribe()
    }
}

/// Clears the loading flag even if the fetch future is dropped mid-flight.
struct LoadingGuard<'a>(&'a watch::Sender<bool>);

impl<'a> LoadingGuard<'a> {
    fn start(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tollgate_core::LedgerError;
    use tollgate_shared::PeriodUnit;

    struct StaticSource {
        offers: Vec<Offer>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl OfferSource for StaticSource {
        async fn load_offers(&self, ids: &BTreeSet<String>) -> Result<Vec<Offer>, LedgerError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LedgerError::Transport("offline".to_string()));
            }
            Ok(self
                .offers
                .iter()
                .filter(|o| ids.contains(&o.id))
                .cloned()
                .collect())
        }
    }

    fn source() -> Arc<StaticSource> {
        Arc::new(StaticSource {
            offers: vec![
                Offer::new("yearly", Decimal::new(4499, 2), "$44.99", PeriodUnit::Year),
                Offer::new("weekly", Decimal::new(499, 2), "$4.99", PeriodUnit::Week),
            ],
            failing: AtomicBool::new(false),
        })
    }

    fn ids() -> BTreeSet<String> {
        ["weekly".to_string(), "yearly".to_string()].into()
    }

    #[tokio::test]
    async fn test_fetch_sorts_by_price() {
        let catalog = ProductCatalog::new(source());

        let offers = catalog.fetch(&ids()).await;
        let order: Vec<&str> = offers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(order, vec!["weekly", "yearly"]);
        assert!(!catalog.is_loading());
        assert_eq!(catalog.find("yearly").map(|o| o.period), Some(PeriodUnit::Year));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_cached_catalog() {
        let source = source();
        let catalog = ProductCatalog::new(source.clone());
        catalog.fetch(&ids()).await;

        source.failing.store(true, Ordering::SeqCst);
        let offers = catalog.fetch(&ids()).await;

        assert_eq!(offers.len(), 2);
        assert!(catalog.find("weekly").is_some());
        assert!(!catalog.is_loading());
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_empty() {
        let source = source();
        source.failing.store(true, Ordering::SeqCst);
        let catalog = ProductCatalog::new(source);

        assert!(catalog.fetch(&ids()).await.is_empty());
        assert!(catalog.find("weekly").is_none());
    }
}
