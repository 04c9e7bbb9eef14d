use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Explorer,
    Premium,
    Enterprise,
}

/// Remaining generation quota. The wire form is a plain integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

pub const UNLIMITED_QUOTA: i64 = -1;

impl Default for Quota {
    fn default() -> Self { Quota::Limited(0) }
}

impl Quota {
    pub fn from_wire(v: i64) -> Self {
        if v == UNLIMITED_QUOTA { Quota::Unlimited } else { Quota::Limited(v.clamp(0, u32::MAX as i64) as u32) }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Quota::Limited(n) => n as i64,
            Quota::Unlimited => UNLIMITED_QUOTA,
        }
    }

    pub fn is_unlimited(self) -> bool { matches!(self, Quota::Unlimited) }

    /// True when at least `n` more units may be spent.
    pub fn allows(self, n: u32) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Limited(left) => left >= n,
        }
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.serialize_i64(self.to_wire()) }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Quota::from_wire(i64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, alias = "plan")]
    pub plan_tier: PlanTier,
    #[serde(default, alias = "quota")]
    pub quota_remaining: Quota,
}

/// Partial profile update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub plan_tier: Option<PlanTier>,
    #[serde(default)]
    pub quota_remaining: Option<Quota>,
}

impl Principal {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn merge(&mut self, upd: PrincipalUpdate) {
        if let Some(v) = upd.name { self.name = v; }
        if let Some(v) = upd.email { self.email = Some(v); }
        if let Some(v) = upd.role { self.role = v; }
        if let Some(v) = upd.plan_tier { self.plan_tier = v; }
        if let Some(v) = upd.quota_remaining { self.quota_remaining = v; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_wire_principal_with_unlimited_quota() {
        let p: Principal = serde_json::from_value(json!({
            "id": "u1", "name": "Ada", "role": "admin", "planTier": "premium", "quotaRemaining": -1
        })).unwrap();
        assert!(p.is_admin());
        assert_eq!(p.plan_tier, PlanTier::Premium);
        assert!(p.quota_remaining.is_unlimited());
        assert_eq!(serde_json::to_value(&p).unwrap()["quotaRemaining"], json!(-1));
    }

    #[test]
    fn missing_fields_default() {
        let p: Principal = serde_json::from_value(json!({"id": "u2", "plan": "explorer", "quota": 3})).unwrap();
        assert_eq!(p.role, Role::User);
        assert_eq!(p.plan_tier, PlanTier::Explorer);
        assert_eq!(p.quota_remaining, Quota::Limited(3));
    }

    #[test]
    fn merge_only_touches_given_fields() {
        let mut p = Principal { id: "u3".into(), name: "Old".into(), quota_remaining: Quota::Limited(5), ..Default::default() };
        p.merge(PrincipalUpdate { name: Some("New".into()), quota_remaining: Some(Quota::Limited(4)), ..Default::default() });
        assert_eq!(p.name, "New");
        assert_eq!(p.quota_remaining, Quota::Limited(4));
        assert_eq!(p.id, "u3");
        assert_eq!(p.plan_tier, PlanTier::Free);
    }

    #[test]
    fn quota_allows() {
        assert!(Quota::Unlimited.allows(1_000));
        assert!(Quota::Limited(2).allows(2));
        assert!(!Quota::Limited(2).allows(3));
        assert_eq!(Quota::from_wire(-7), Quota::Limited(0));
    }
}
