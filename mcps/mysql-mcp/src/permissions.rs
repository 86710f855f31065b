//! Permission evaluator
//!
//! Maps a caller login to a role from the configured allow-lists and checks
//! it against the role an operation class requires. A login missing from
//! every list has no permissions at all, not even read.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::config::AccessConfig;
use crate::error::GateError;
use crate::identity::CallerIdentity;
use crate::validator::SqlClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved capability record for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPermission {
    pub username: String,
    pub role: Role,
    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,
}

impl UserPermission {
    fn new(username: &str, role: Role) -> Self {
        Self {
            username: username.to_string(),
            role,
            can_read: true,
            can_write: role >= Role::Writer,
            can_admin: role == Role::Admin,
        }
    }
}

/// Role required to run a statement of the given class
///
/// Procedures, transaction control and unclassified statements need a
/// writer; DDL needs an admin.
pub fn required_role(class: SqlClass) -> Role {
    match class {
        SqlClass::Read => Role::Reader,
        SqlClass::Write | SqlClass::Procedure | SqlClass::Transaction | SqlClass::Unknown => {
            Role::Writer
        }
        SqlClass::Ddl => Role::Admin,
    }
}

#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    roles: HashMap<String, Role>,
}

impl PermissionEvaluator {
    /// Build the lookup table; a user on several lists gets the highest role
    pub fn new(access: &AccessConfig) -> Self {
        let mut roles = HashMap::new();
        let lists = [
            (&access.readers, Role::Reader),
            (&access.writers, Role::Writer),
            (&access.admins, Role::Admin),
        ];
        for (users, role) in lists {
            for user in users {
                let key = user.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                let entry = roles.entry(key).or_insert(role);
                *entry = (*entry).max(role);
            }
        }
        Self { roles }
    }

    pub fn role_of(&self, login: &str) -> Option<Role> {
        self.roles.get(&login.trim().to_lowercase()).copied()
    }

    pub fn permission(&self, login: &str) -> Option<UserPermission> {
        self.role_of(login).map(|role| UserPermission::new(login, role))
    }

    /// Check that `identity` may run a statement of class `class`
    pub fn can_execute(&self, identity: &CallerIdentity, class: SqlClass) -> Result<(), GateError> {
        let needed = required_role(class);
        self.check(identity, needed, || {
            format!("{} operations require {} access", class, needed)
        })
    }

    /// Check that `identity` holds at least `needed`
    pub fn require(&self, identity: &CallerIdentity, needed: Role) -> Result<(), GateError> {
        self.check(identity, needed, || {
            format!("This operation requires {} access", needed)
        })
    }

    fn check<F>(&self, identity: &CallerIdentity, needed: Role, reason: F) -> Result<(), GateError>
    where
        F: FnOnce() -> String,
    {
        match self.role_of(&identity.login) {
            None => {
                tracing::warn!(user = %identity.login, "Unknown user denied");
                Err(GateError::PermissionDenied(
                    "User not found or no permissions".to_string(),
                ))
            }
            Some(role) if role < needed => {
                tracing::warn!(
                    user = %identity.login,
                    role = %role,
                    required = %needed,
                    "Insufficient role"
                );
                Err(GateError::PermissionDenied(reason()))
            }
            Some(_) => Ok(()),
        }
    }
}
