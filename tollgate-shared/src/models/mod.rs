pub mod entitlement;
pub mod offer;
pub mod transaction;
