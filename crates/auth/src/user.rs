//! Workshop user accounts.
//!
//! Only the data the access policy needs lives here; credentials and sessions
//! belong to the authentication layer in front of this crate.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, UserId};

use crate::Role;

const USERNAME_MAX_LEN: usize = 150;

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// User can act on the workshop.
    #[default]
    Active,
    /// User keeps their history but holds no permissions.
    Suspended,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "Active"),
            UserStatus::Suspended => write!(f, "Suspended"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// An acting user of the workshop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
}

impl User {
    /// Active user with a fresh identifier.
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            email: String::new(),
            role,
            status: UserStatus::Active,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self::new(username, Role::Admin)
    }

    pub fn employee(username: impl Into<String>) -> Self {
        Self::new(username, Role::Employee)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn suspend(&mut self) {
        self.status = UserStatus::Suspended;
    }
}

impl core::fmt::Display for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.username, self.role)
    }
}

/// Input for registering a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> DomainResult<()> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(DomainError::validation("username", "cannot be empty"));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(DomainError::validation(
                "username",
                format!("cannot exceed {USERNAME_MAX_LEN} characters"),
            ));
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(DomainError::validation("email", "must contain '@'"));
        }
        Ok(())
    }

    /// Validate and build an active user.
    pub fn into_user(self) -> DomainResult<User> {
        self.validate()?;
        Ok(User {
            id: UserId::new(),
            username: self.username.trim().to_string(),
            email: self.email,
            role: self.role,
            status: UserStatus::Active,
        })
    }
}
