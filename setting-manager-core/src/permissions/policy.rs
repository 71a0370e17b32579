use crate::schema::{FieldDescriptor, FieldMetadata, RoleRequirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
}

impl PermissionDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<bool> for PermissionDecision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// Write rule for one field, resolved once from its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AccessRule {
    /// Nobody writes, the superuser included.
    Immutable,
    /// `allow_change = false`: superuser only.
    SuperuserOnly,
    /// Listed roles or the superuser.
    Roles(RoleRequirement),
    /// No policy metadata: superuser only, nobody when no superuser is configured.
    #[default]
    Private,
    /// `allow_change = true` with nothing stricter.
    Open,
}

impl AccessRule {
    /// First matching flag wins: immutable, allow_change=false, required_role,
    /// allow_change=true, then nothing.
    pub fn from_metadata(metadata: &FieldMetadata) -> Self {
        if metadata.immutable {
            return Self::Immutable;
        }
        if metadata.allow_change == Some(false) {
            return Self::SuperuserOnly;
        }
        if let Some(requirement) = &metadata.required_role {
            return Self::Roles(requirement.clone());
        }
        if metadata.allow_change == Some(true) {
            return Self::Open;
        }
        Self::Private
    }
}

pub fn can_change(rule: &AccessRule, role: &str, superuser_role: Option<&str>) -> bool {
    let is_superuser = superuser_role.is_some_and(|superuser| superuser == role);
    match rule {
        AccessRule::Immutable => false,
        AccessRule::SuperuserOnly | AccessRule::Private => is_superuser,
        AccessRule::Roles(requirement) => requirement.permits(role) || is_superuser,
        AccessRule::Open => true,
    }
}

pub trait AccessPolicy: Send + Sync {
    fn check_change(&self, field: &FieldDescriptor, role: &str) -> PermissionDecision;
}
