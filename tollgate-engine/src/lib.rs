pub mod ack;
pub mod engine;
pub mod listener;
pub mod purchase;
pub mod restore;
pub mod runtime;

pub use ack::Acknowledger;
pub use engine::{EntitlementEngine, EntitlementHandle, RefreshAborted};
pub use listener::TransactionListener;
pub use purchase::{PurchaseCoordinator, PurchaseError, PurchaseOutcome};
pub use restore::{RestoreCoordinator, RestoreError, RestoreOutcome};
pub use runtime::{EngineSettings, EntitlementServices, ServiceDeps};
