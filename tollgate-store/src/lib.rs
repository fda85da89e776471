pub mod app_config;
pub mod override_repo;
pub mod sandbox;

pub use override_repo::{FileOverrideStore, MemoryOverrideStore, WEB_SUBSCRIPTION_ACTIVE_KEY};
pub use sandbox::{SandboxLedger, ScriptedPurchase};
