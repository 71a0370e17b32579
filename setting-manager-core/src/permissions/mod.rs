pub mod policy;
pub mod role_policy;

pub use policy::{can_change, AccessPolicy, AccessRule, PermissionDecision};
pub use role_policy::RoleAccessPolicy;
