//! Product identifiers shipped with the app.

use std::collections::BTreeSet;

pub const WEEKLY_SUBSCRIPTION: &str = "weeklyvibrovibe";
pub const YEARLY_SUBSCRIPTION: &str = "yearlyvibrovibe";

/// The subscription products that unlock paid access.
pub fn default_product_ids() -> BTreeSet<String> {
    [WEEKLY_SUBSCRIPTION, YEARLY_SUBSCRIPTION]
        .into_iter()
        .map(str::to_string)
        .collect()
}
