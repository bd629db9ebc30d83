//! Identifier types shared by every layer.
//!
//! Users and notifications are identified by random UUIDs, which travel on the
//! wire as two raw 64-bit halves. Contexts use a dotted path from the global
//! root (`Global.Plaza.Plaza.Lobby`) so that ids stay stable across restarts
//! and readable in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Separator between the path segments of a [`ContextId`].
pub const CONTEXT_SEPARATOR: char = '.';

/// Name of the single global root context.
pub const ROOT_CONTEXT_NAME: &str = "Global";

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Rebuild the id from its big-endian (most, least) significant halves.
            pub fn from_halves(high: u64, low: u64) -> Self {
                Self(Uuid::from_u64_pair(high, low))
            }

            /// Split into (most, least) significant halves.
            pub fn halves(self) -> (u64, u64) {
                self.0.as_u64_pair()
            }

            /// First eight hex digits, good enough for log lines.
            pub fn short(self) -> String {
                let mut s = self.0.simple().to_string();
                s.truncate(8);
                s
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Immutable identity of a registered user.
    UserId
);

uuid_id!(
    /// Identity of a single notification owned by one user.
    NotificationId
);

/// Identity of a node in the context tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    /// The id of the global root context.
    pub fn root() -> Self {
        ContextId(ROOT_CONTEXT_NAME.to_string())
    }

    /// Wrap a raw path (as received on the wire or read from storage).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ContextId(raw.into())
    }

    /// Id of a child named `name` below this context.
    pub fn child(&self, name: &str) -> Self {
        ContextId(format!("{}{}{}", self.0, CONTEXT_SEPARATOR, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_CONTEXT_NAME
    }

    /// Number of path segments below the root (root = 0).
    pub fn depth(&self) -> usize {
        self.0.matches(CONTEXT_SEPARATOR).count()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
