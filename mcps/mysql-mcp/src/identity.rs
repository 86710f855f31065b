//! Caller identity

use std::fmt;

use serde::Serialize;

use crate::config::{AccessConfig, CallerConfig};

/// An authenticated caller; immutable once constructed
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    pub login: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    credential: String,
}

impl CallerIdentity {
    pub fn new(
        login: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            name: name.into(),
            email: email.into(),
            credential: credential.into(),
        }
    }

    pub fn from_config(config: &CallerConfig) -> Self {
        Self::new(&config.login, &config.name, &config.email, &config.token)
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Writer or admin membership, checked against the current allow-lists
    pub fn has_write_access(&self, access: &AccessConfig) -> bool {
        access
            .writers
            .iter()
            .chain(access.admins.iter())
            .any(|u| u.trim().eq_ignore_ascii_case(&self.login))
    }
}

impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerIdentity")
            .field("login", &self.login)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("credential", &"***")
            .finish()
    }
}
