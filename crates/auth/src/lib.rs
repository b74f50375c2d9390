//! `atelier-auth`: access policy for workshop users.
//!
//! Classifies the acting user (admin vs employee) and gates which operations
//! they may trigger. This crate is decoupled from authentication mechanics and
//! storage: callers pass the resolved [`User`] explicitly.

pub mod authorize;
pub mod permissions;
pub mod roles;
pub mod user;

pub use authorize::{
    authorize, can_force_work_order, can_manage_orders, can_manage_products, can_view_users,
    is_admin, AuthzError,
};
pub use permissions::Permission;
pub use roles::Role;
pub use user::{NewUser, User, UserStatus};
