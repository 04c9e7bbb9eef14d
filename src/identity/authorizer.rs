use super::principal::{PlanTier, Principal};

/// Capability name -> plan tiers that unlock it.
pub static CAPABILITY_TIERS: &[(&str, &[PlanTier])] = &[
    ("trip.create", &[PlanTier::Free, PlanTier::Explorer, PlanTier::Premium, PlanTier::Enterprise]),
    ("itinerary.generate", &[PlanTier::Free, PlanTier::Explorer, PlanTier::Premium, PlanTier::Enterprise]),
    ("itinerary.export_pdf", &[PlanTier::Explorer, PlanTier::Premium, PlanTier::Enterprise]),
    ("trip.share", &[PlanTier::Explorer, PlanTier::Premium, PlanTier::Enterprise]),
    ("trip.collaborate", &[PlanTier::Premium, PlanTier::Enterprise]),
    ("itinerary.unlimited_regenerations", &[PlanTier::Premium, PlanTier::Enterprise]),
    ("assistant.priority", &[PlanTier::Premium, PlanTier::Enterprise]),
    ("team.manage", &[PlanTier::Enterprise]),
    ("analytics.view", &[PlanTier::Enterprise]),
];

/// What `has_permission` answers for a capability missing from the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownCapabilityPolicy {
    /// Current product behaviour: unlisted capabilities are open to everyone.
    #[default]
    Allow,
    Deny,
}

pub fn required_tiers(capability: &str) -> Option<&'static [PlanTier]> {
    CAPABILITY_TIERS.iter().find(|(name, _)| *name == capability).map(|(_, tiers)| *tiers)
}

pub fn has_permission(principal: &Principal, capability: &str, unknown: UnknownCapabilityPolicy) -> bool {
    // Admin shortcut
    if principal.is_admin() {
        return true;
    }
    match required_tiers(capability) {
        Some(tiers) => tiers.contains(&principal.plan_tier),
        None => unknown == UnknownCapabilityPolicy::Allow,
    }
}
