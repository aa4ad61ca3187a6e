use crate::models::plan::{PlanGrant, PlanTier};

/// Maps a paid amount (minor currency units) to the tier it buys.
///
/// Thresholds are checked from the most expensive tier down; anything under
/// the cheapest paid threshold (including zero and negative amounts) is free.
pub fn map_amount_to_plan(amount: i64) -> PlanGrant {
    PlanTier::ALL
        .iter()
        .rev()
        .find(|tier| tier.threshold().is_some_and(|min| amount >= min))
        .copied()
        .unwrap_or(PlanTier::Free)
        .into()
}

/// Picks the higher-ranked of the stored and newly purchased tier.
/// Unrecognized stored labels rank as free, so a purchase never downgrades.
pub fn reconcile_plan(current: Option<&str>, proposed: PlanTier) -> PlanTier {
    let current = PlanTier::from_label(current);
    current.max(proposed)
}
