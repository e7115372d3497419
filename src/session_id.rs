use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Secret token identifying the one caller a [`CommandBoundary`] trusts.
///
/// [`CommandBoundary`]: crate::boundary::CommandBoundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
