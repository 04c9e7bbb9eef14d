//! Identity and session management: who the client is signed in as, and how it got there.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod authorizer;
mod controller;

pub use principal::{Principal, PrincipalUpdate, Role, PlanTier, Quota, UNLIMITED_QUOTA};
pub use session::{Session, SessionEvent, SessionState, SessionStatus};
pub use authorizer::{has_permission, required_tiers, UnknownCapabilityPolicy, CAPABILITY_TIERS};
pub use controller::{AuthOutcome, SessionController};
