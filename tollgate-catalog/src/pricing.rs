use tollgate_shared::{Offer, PeriodUnit};

/// "$4.99 / week"
pub fn price_label(offer: &Offer) -> String {
    format!("{} / {}", offer.display_price, offer.period.as_str())
}

/// Badge for a free-trial introductory offer, e.g. "3 DAYS FREE".
///
/// Paid introductory offers get no badge.
pub fn trial_badge(offer: &Offer) -> Option<String> {
    let trial = offer.free_trial()?;
    let unit = match trial.period.unit {
        PeriodUnit::Day => "DAYS",
        PeriodUnit::Week => "WEEKS",
        PeriodUnit::Month => "MONTHS",
        PeriodUnit::Year => "YEARS",
    };
    Some(format!("{} {} FREE", trial.period.value, unit))
}
