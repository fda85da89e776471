pub mod models;
pub mod products;

pub use models::entitlement::{AccessStatus, EntitlementSource, EntitlementState};
pub use models::offer::{IntroductoryOffer, Offer, PeriodUnit, SubscriptionPeriod};
pub use models::transaction::{TransactionId, TransactionRecord, Verification};
