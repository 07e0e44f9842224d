//! User presence rows.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// One row of the user table. Created on first contact, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub identity: Identity,
    /// Display name. `None` until the user picks one; an unset name is
    /// distinct from an empty string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// True while at least one active session exists for this identity.
    pub online: bool,
    pub cursor_x: f64,
    pub cursor_y: f64,
}

impl User {
    /// Fresh row for a first-time identity: online, unnamed, cursor at the
    /// origin.
    pub(crate) fn seed(identity: Identity) -> Self {
        Self {
            identity,
            name: None,
            online: true,
            cursor_x: 0.0,
            cursor_y: 0.0,
        }
    }
}
