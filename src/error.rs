use thiserror::Error;

use crate::context::Permission;

/// Failures raised by domain operations.
///
/// Every variant carries (or maps to) a message key the client can localize.
/// They are caught exactly once, at the packet dispatch boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Operation attempted while the user is offline.
    #[error("not logged in")]
    NotAuthenticated,

    /// Spatial operation attempted without a current world.
    #[error("not in a world")]
    NotInWorld,

    /// Unknown context, user or notification id.
    #[error("not found ({key}): {id}")]
    NotFound { key: &'static str, id: String },

    /// Operation conflicts with the current state (already friends, already muted, ...).
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// Rejected register/login/profile change.
    #[error("illegal account action: {0}")]
    IllegalAccountAction(&'static str),

    /// Rejected world create/join/leave/delete.
    #[error("illegal world action: {0}")]
    IllegalWorldAction(&'static str),

    /// Accept/decline on something that is not an open request.
    #[error("illegal notification action: {0}")]
    IllegalNotificationAction(&'static str),

    /// Performer lacks the named permission.
    #[error("missing permission: {0}")]
    NoPermission(Permission),

    /// Movement target rejected by the room layout.
    #[error("illegal position ({x}, {y})")]
    IllegalPosition { x: f32, y: f32 },

    /// No eligible interactable, already interacting, or menu mismatch.
    #[error("illegal interaction: {0}")]
    IllegalInteraction(&'static str),

    /// Unsupported menu option or malformed option arguments.
    #[error("illegal menu action: {0}")]
    IllegalMenuAction(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(key: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            key,
            id: id.to_string(),
        }
    }

    /// Localizable key echoed to the client in failure results.
    pub fn message_key(&self) -> &'static str {
        match self {
            CoreError::NotAuthenticated => "error.not-authenticated",
            CoreError::NotInWorld => "error.not-in-world",
            CoreError::NotFound { key, .. } => key,
            CoreError::IllegalState(key)
            | CoreError::IllegalAccountAction(key)
            | CoreError::IllegalWorldAction(key)
            | CoreError::IllegalNotificationAction(key)
            | CoreError::IllegalInteraction(key)
            | CoreError::IllegalMenuAction(key) => key,
            CoreError::NoPermission(_) => "error.no-permission",
            CoreError::IllegalPosition { .. } => "error.illegal-position",
        }
    }

    /// Arguments for the message key (the missing permission, the unknown id).
    pub fn message_args(&self) -> Vec<String> {
        match self {
            CoreError::NotFound { id, .. } => vec![id.clone()],
            CoreError::NoPermission(permission) => vec![permission.as_str().to_string()],
            _ => Vec::new(),
        }
    }
}
