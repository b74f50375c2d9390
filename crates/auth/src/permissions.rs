use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions use a dotted `module.action` naming when displayed
/// (e.g. `"orders.manage"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageProducts,
    ManageOrders,
    /// Commit a work order even when stock is short.
    ForceWorkOrder,
    ViewUsers,
    ManageUsers,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::ManageProducts,
        Permission::ManageOrders,
        Permission::ForceWorkOrder,
        Permission::ViewUsers,
        Permission::ManageUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageProducts => "products.manage",
            Permission::ManageOrders => "orders.manage",
            Permission::ForceWorkOrder => "orders.force_work_order",
            Permission::ViewUsers => "users.read",
            Permission::ManageUsers => "users.manage",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
