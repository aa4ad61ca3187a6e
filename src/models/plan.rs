use serde::{Deserialize, Serialize};

/// Sentinel stored in `credits_remaining` for tiers without a usage cap.
pub const UNLIMITED_CREDITS: i64 = -1;

/// Subscription tiers sold through the landing page, in ascending order.
///
/// The derived `Ord` follows declaration order, so `Free < Plus < Pro < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Plus,
    Pro,
    Premium,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Plus,
        PlanTier::Pro,
        PlanTier::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Plus => "plus",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Plus => 1,
            PlanTier::Pro => 2,
            PlanTier::Premium => 3,
        }
    }

    /// Monthly credit allowance granted with the tier.
    pub fn credits(&self) -> i64 {
        match self {
            PlanTier::Free => 10,
            PlanTier::Plus => 50,
            PlanTier::Pro => 200,
            PlanTier::Premium => UNLIMITED_CREDITS,
        }
    }

    /// Lowest `amount_total` (minor units) that buys this tier. `None` for free.
    pub fn threshold(&self) -> Option<i64> {
        match self {
            PlanTier::Free => None,
            PlanTier::Plus => Some(999),
            PlanTier::Pro => Some(2999),
            PlanTier::Premium => Some(4999),
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }

    /// Parses a stored plan label. Anything unrecognized (including the
    /// retired `super` label) ranks as free.
    pub fn from_label(raw: Option<&str>) -> Self {
        Self::parse(raw.unwrap_or_default()).unwrap_or(PlanTier::Free)
    }

    /// Strict parse used for request payloads, where an unknown label is an error.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "plus" => Some(PlanTier::Plus),
            "pro" => Some(PlanTier::Pro),
            "premium" => Some(PlanTier::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier plus the credit allowance that comes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanGrant {
    pub plan: PlanTier,
    pub credits: i64,
}

impl From<PlanTier> for PlanGrant {
    fn from(plan: PlanTier) -> Self {
        PlanGrant {
            plan,
            credits: plan.credits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_totally_ordered_by_rank() {
        for pair in PlanTier::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn from_label_defaults_unknown_to_free() {
        assert_eq!(PlanTier::from_label(None), PlanTier::Free);
        assert_eq!(PlanTier::from_label(Some("")), PlanTier::Free);
        assert_eq!(PlanTier::from_label(Some("super")), PlanTier::Free);
        assert_eq!(PlanTier::from_label(Some("  PRO ")), PlanTier::Pro);
    }

    #[test]
    fn premium_is_unlimited() {
        assert_eq!(PlanTier::Premium.credits(), UNLIMITED_CREDITS);
        assert!(PlanTier::Premium.is_paid());
        assert!(!PlanTier::Free.is_paid());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&PlanTier::Plus).unwrap();
        assert_eq!(json, "\"plus\"");
    }
}
