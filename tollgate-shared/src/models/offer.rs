use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billing period unit of a subscription offer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodUnit::Day => "day",
            PeriodUnit::Week => "week",
            PeriodUnit::Month => "month",
            PeriodUnit::Year => "year",
        }
    }

    /// Approximate length of one unit, used when a ledger has to stamp expirations.
    pub fn approximate_days(&self) -> i64 {
        match self {
            PeriodUnit::Day => 1,
            PeriodUnit::Week => 7,
            PeriodUnit::Month => 30,
            PeriodUnit::Year => 365,
        }
    }
}

/// A period made of `value` units, e.g. 3 days
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionPeriod {
    pub unit: PeriodUnit,
    pub value: u32,
}

impl SubscriptionPeriod {
    pub fn new(unit: PeriodUnit, value: u32) -> Self {
        Self { unit, value }
    }
}

/// Introductory pricing attached to a subscription offer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntroductoryOffer {
    pub price: Decimal,
    pub display_price: String,
    pub period: SubscriptionPeriod,
}

impl IntroductoryOffer {
    /// A zero-priced introductory offer is a free trial.
    pub fn is_free_trial(&self) -> bool {
        self.price.is_zero()
    }
}

/// A purchasable offer as reported by the store.
///
/// Offers are immutable once fetched; the catalog replaces its whole set on
/// every successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    pub id: String,
    pub price: Decimal,
    pub display_price: String,
    pub period: PeriodUnit,
    #[serde(default)]
    pub introductory_offer: Option<IntroductoryOffer>,
}

impl Offer {
    pub fn new(
        id: impl Into<String>,
        price: Decimal,
        display_price: impl Into<String>,
        period: PeriodUnit,
    ) -> Self {
        Self {
            id: id.into(),
            price,
            display_price: display_price.into(),
            period,
            introductory_offer: None,
        }
    }

    pub fn with_introductory_offer(mut self, offer: IntroductoryOffer) -> Self {
        self.introductory_offer = Some(offer);
        self
    }

    pub fn free_trial(&self) -> Option<&IntroductoryOffer> {
        self.introductory_offer.as_ref().filter(|o| o.is_free_trial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_deserialization() {
        let json = r#"
            {
                "id": "weeklyvibrovibe",
                "price": "4.99",
                "display_price": "$4.99",
                "period": "WEEK",
                "introductory_offer": {
                    "price": "0",
                    "display_price": "Free",
                    "period": { "unit": "DAY", "value": 3 }
                }
            }
        "#;
        let offer: Offer = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(offer.price, Decimal::new(499, 2));
        assert_eq!(offer.period, PeriodUnit::Week);

        let trial = offer.free_trial().expect("trial expected");
        assert_eq!(trial.period, SubscriptionPeriod::new(PeriodUnit::Day, 3));
    }

    #[test]
    fn test_paid_intro_is_not_a_trial() {
        let offer = Offer::new("yearly", Decimal::new(4499, 2), "$44.99", PeriodUnit::Year)
            .with_introductory_offer(IntroductoryOffer {
                price: Decimal::new(99, 2),
                display_price: "$0.99".to_string(),
                period: SubscriptionPeriod::new(PeriodUnit::Week, 1),
            });

        assert!(offer.introductory_offer.is_some());
        assert!(offer.free_trial().is_none());
    }
}
