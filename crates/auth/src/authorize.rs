use thiserror::Error;

use atelier_core::DomainError;

use crate::{Permission, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("user '{0}' is suspended")]
    Suspended(String),

    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: String, permission: Permission },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Authorize a user for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(user: &User, required: Permission) -> Result<(), AuthzError> {
    if !user.is_active() {
        return Err(AuthzError::Suspended(user.username.clone()));
    }
    if user.role.grants(required) {
        Ok(())
    } else {
        tracing::debug!(
            user = %user.username,
            role = %user.role,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: user.role.as_str().to_string(),
            permission: required,
        })
    }
}

/// Role check only; a suspended admin is still classified as admin.
pub fn is_admin(user: &User) -> bool {
    user.role == crate::Role::Admin
}

pub fn can_manage_products(user: &User) -> bool {
    authorize(user, Permission::ManageProducts).is_ok()
}

pub fn can_manage_orders(user: &User) -> bool {
    authorize(user, Permission::ManageOrders).is_ok()
}

/// Gates the user listing; non-admins never see other accounts.
pub fn can_view_users(user: &User) -> bool {
    authorize(user, Permission::ViewUsers).is_ok()
}

pub fn can_force_work_order(user: &User) -> bool {
    authorize(user, Permission::ForceWorkOrder).is_ok()
}
