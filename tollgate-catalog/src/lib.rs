pub mod catalog;
pub mod pricing;

pub use catalog::ProductCatalog;
pub use pricing::{price_label, trial_badge};
