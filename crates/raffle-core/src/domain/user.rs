//! Users, roles and the authenticated identity
//!
//! A [`User`] is the stored account row. An [`Identity`] is what a successful
//! login yields; it is passed explicitly into every use case so that role and
//! ownership checks never depend on ambient request state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{AllocationError, DomainError};
use super::newtypes::{UserId, Username};

/// Role of a user. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sells and reserves numbers; manages only their own records
    Seller,
    /// Oversight: dashboards, user management, audit log, export
    Superuser,
}

impl Role {
    /// Stored string form (matches the `users.role` CHECK constraint)
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seller => "seller",
            Role::Superuser => "superuser",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seller" => Ok(Role::Seller),
            "superuser" => Ok(Role::Superuser),
            other => Err(DomainError::InvalidRole(other.to_string())),
        }
    }
}

/// A stored user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    /// Argon2id PHC string; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The identity this user acts as once authenticated
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// The authenticated caller of a use case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: Username,
    pub role: Role,
}

impl Identity {
    /// Returns true for superusers
    pub fn is_superuser(&self) -> bool {
        self.role == Role::Superuser
    }

    /// Owner-or-superuser rule used by edit, void and release
    pub fn can_manage(&self, owner: UserId) -> bool {
        self.is_superuser() || self.user_id == owner
    }

    /// Gate for seller-only operations
    ///
    /// # Errors
    /// Returns `AllocationError::PermissionDenied` for superusers
    pub fn require_seller(&self) -> Result<(), AllocationError> {
        match self.role {
            Role::Seller => Ok(()),
            Role::Superuser => Err(AllocationError::PermissionDenied(
                "Seller access required.".to_string(),
            )),
        }
    }

    /// Gate for superuser-only operations
    ///
    /// # Errors
    /// Returns `AllocationError::PermissionDenied` for sellers
    pub fn require_superuser(&self) -> Result<(), AllocationError> {
        if self.is_superuser() {
            Ok(())
        } else {
            Err(AllocationError::PermissionDenied(
                "Superuser access required.".to_string(),
            ))
        }
    }
}
