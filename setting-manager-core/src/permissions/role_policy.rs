use crate::permissions::policy::{can_change, AccessPolicy, PermissionDecision};
use crate::schema::FieldDescriptor;

/// Evaluates each field's resolved [`AccessRule`](super::AccessRule) against
/// the requesting role and an optional superuser role.
#[derive(Debug, Clone, Default)]
pub struct RoleAccessPolicy {
    superuser_role: Option<String>,
}

impl RoleAccessPolicy {
    pub fn new(superuser_role: Option<String>) -> Self {
        Self {
            superuser_role: superuser_role.filter(|role| !role.trim().is_empty()),
        }
    }

    pub fn superuser_role(&self) -> Option<&str> {
        self.superuser_role.as_deref()
    }
}

impl AccessPolicy for RoleAccessPolicy {
    fn check_change(&self, field: &FieldDescriptor, role: &str) -> PermissionDecision {
        can_change(&field.access_rule, role, self.superuser_role()).into()
    }
}
