use serde::{Deserialize, Serialize};

use crate::Permission;

/// Workshop role.
///
/// Serialized with the short codes used by the workshop (`admin`, `emp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[default]
    #[serde(rename = "emp")]
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "emp",
        }
    }

    /// Permissions granted by this role.
    ///
    /// Admins hold every permission; employees run day-to-day order handling.
    /// Catalogue reads are open to everyone.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => Permission::ALL,
            Role::Employee => &[Permission::ManageOrders],
        }
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_grants_everything() {
        for p in Permission::ALL {
            assert!(Role::Admin.grants(*p), "admin should grant {p}");
        }
    }

    #[test]
    fn employee_cannot_manage_products_or_users() {
        assert!(Role::Employee.grants(Permission::ManageOrders));
        assert!(!Role::Employee.grants(Permission::ManageProducts));
        assert!(!Role::Employee.grants(Permission::ViewUsers));
        assert!(!Role::Employee.grants(Permission::ForceWorkOrder));
        assert_eq!(Role::Employee.permissions(), &[Permission::ManageOrders]);
    }

    #[test]
    fn serializes_with_short_codes() {
        assert_eq!(serde_json::to_string(&Role::Employee).unwrap(), "\"emp\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }
}
