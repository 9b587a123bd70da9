//! User snapshot stored alongside the session tokens

use serde::{Deserialize, Serialize};

use crate::permissions::{Permission, PermissionSet, Role};

/// Snapshot of the signed-in user as returned by login and `/auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    #[serde(default, rename = "nombre")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Raw role name; see [`UserInfo::role`].
    #[serde(rename = "tipoUsuario")]
    pub role_name: String,
    #[serde(default, rename = "tipoUsuarioDisplayName")]
    pub role_display_name: String,
    #[serde(default, rename = "empresaId")]
    pub company_id: Option<i64>,
    #[serde(default, rename = "empresaNombre")]
    pub company_name: String,
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl UserInfo {
    /// Typed role, `None` if the backend sent a role this client does not know.
    pub fn role(&self) -> Option<Role> {
        self.role_name.parse().ok()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.allows(permission)
    }

    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        self.permissions.allows_any(permissions)
    }

    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        self.permissions.allows_all(permissions)
    }

    /// Route-style gate: an empty requirement list admits any signed-in user,
    /// otherwise one matching capability is enough.
    pub fn can_access(&self, required: &[Permission]) -> bool {
        required.is_empty() || self.has_any_permission(required)
    }

    /// Whether an entity owned by `company_id` belongs to this user's company.
    pub fn belongs_to_company(&self, company_id: i64) -> bool {
        self.company_id == Some(company_id)
    }
}
