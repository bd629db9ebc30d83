//! Asynchronous notifications and the requests some of them carry.

pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ContextId, NotificationId, UserId};
use crate::protocol::codec::{Decode, Encode, PacketReader, PacketWriter, ProtoError};

pub use service::{accept, add, decline, delete, mark_read, NotificationAnswer};

/// A localizable message: key plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBundle {
    pub key: String,
    pub args: Vec<String>,
}

impl MessageBundle {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(key: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            key: key.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }
}

impl From<&crate::error::CoreError> for MessageBundle {
    fn from(err: &crate::error::CoreError) -> Self {
        MessageBundle::with_args(err.message_key(), err.message_args())
    }
}

impl Encode for MessageBundle {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_str(&self.key);
        w.put(&self.args);
    }
}

impl Decode for MessageBundle {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            key: r.read_string()?,
            args: r.get()?,
        })
    }
}

/// What happens when a request notification is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Info,
    FriendRequest { requester: UserId },
    RoomInvitation { inviter: UserId, room: ContextId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub owner: UserId,
    pub context: ContextId,
    pub message: MessageBundle,
    pub timestamp: DateTime<Utc>,
    pub kind: NotificationKind,
    pub accepted: bool,
    pub declined: bool,
    pub read: bool,
}

impl Notification {
    pub fn info(
        owner: UserId,
        context: ContextId,
        message: MessageBundle,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::with_kind(owner, context, message, timestamp, NotificationKind::Info)
    }

    pub fn request(
        owner: UserId,
        context: ContextId,
        message: MessageBundle,
        timestamp: DateTime<Utc>,
        kind: NotificationKind,
    ) -> Self {
        Self::with_kind(owner, context, message, timestamp, kind)
    }

    fn with_kind(
        owner: UserId,
        context: ContextId,
        message: MessageBundle,
        timestamp: DateTime<Utc>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            owner,
            context,
            message,
            timestamp,
            kind,
            accepted: false,
            declined: false,
            read: false,
        }
    }

    pub fn is_request(&self) -> bool {
        !matches!(self.kind, NotificationKind::Info)
    }

    pub fn is_answered(&self) -> bool {
        self.accepted || self.declined
    }
}
