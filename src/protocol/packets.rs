//! Packet payloads and their field order on the wire.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::codec::{Decode, Encode, PacketReader, PacketWriter, ProtoError, WireEnum};
use crate::admin::AdministrativeAction;
use crate::context::{ContextMap, InteractableKind, Music, Role};
use crate::ids::{ContextId, NotificationId, UserId};
use crate::notification::{MessageBundle, Notification, NotificationAnswer};
use crate::user::{Avatar, Direction, Status};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl WireEnum for $name {
            const NAME: &'static str = stringify!($name);
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];
        }
    };
}

wire_enum!(ProfileActionKind {
    Register,
    Login,
    Logout,
    Delete,
    ChangePassword,
    ChangeAvatar,
    ChangeStatus,
});

wire_enum!(WorldActionKind {
    Create,
    Join,
    Leave,
    Delete,
});

wire_enum!(MoveAction { Spawn, Move, Remove });

wire_enum!(
    /// Audience of a chat line.
    ChatKind {
        Standard,
        Whisper,
        World,
        Info,
    }
);

wire_enum!(UserInfoAction { Add, Update, Remove });

/// Account operation request (client) or its result (server).
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileAction {
    pub action: ProfileActionKind,
    pub user: Option<UserId>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub avatar: Option<Avatar>,
    pub status: Option<Status>,
    pub success: bool,
    pub message: Option<MessageBundle>,
}

impl ProfileAction {
    pub fn request(action: ProfileActionKind) -> Self {
        Self {
            action,
            user: None,
            name: None,
            password: None,
            new_password: None,
            avatar: None,
            status: None,
            success: false,
            message: None,
        }
    }

    /// Result echo of a request: credentials are never sent back.
    pub fn result(&self, success: bool, message: Option<MessageBundle>) -> Self {
        Self {
            action: self.action,
            user: self.user,
            name: self.name.clone(),
            password: None,
            new_password: None,
            avatar: self.avatar,
            status: self.status,
            success,
            message,
        }
    }
}

impl Encode for ProfileAction {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_enum(self.action);
        w.put(&self.user);
        w.put(&self.name);
        w.put(&self.password);
        w.put(&self.new_password);
        w.write_optional_enum(self.avatar);
        w.write_optional_enum(self.status);
        w.write_bool(self.success);
        w.put(&self.message);
    }
}

impl Decode for ProfileAction {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            action: r.read_enum()?,
            user: r.get()?,
            name: r.get()?,
            password: r.get()?,
            new_password: r.get()?,
            avatar: r.read_optional_enum()?,
            status: r.read_optional_enum()?,
            success: r.read_bool()?,
            message: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldAction {
    pub action: WorldActionKind,
    pub context: Option<ContextId>,
    pub map: Option<ContextMap>,
    pub name: Option<String>,
    pub success: bool,
    pub message: Option<MessageBundle>,
}

impl WorldAction {
    pub fn request(action: WorldActionKind) -> Self {
        Self {
            action,
            context: None,
            map: None,
            name: None,
            success: false,
            message: None,
        }
    }

    pub fn result(&self, success: bool, message: Option<MessageBundle>) -> Self {
        Self {
            success,
            message,
            ..self.clone()
        }
    }
}

impl Encode for WorldAction {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_enum(self.action);
        w.put(&self.context);
        w.write_optional_enum(self.map);
        w.put(&self.name);
        w.write_bool(self.success);
        w.put(&self.message);
    }
}

impl Decode for WorldAction {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            action: r.read_enum()?,
            context: r.get()?,
            map: r.read_optional_enum()?,
            name: r.get()?,
            success: r.read_bool()?,
            message: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub id: ContextId,
    pub name: String,
    pub private: bool,
}

impl Encode for ContextEntry {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.id);
        w.write_str(&self.name);
        w.write_bool(self.private);
    }
}

impl Decode for ContextEntry {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            id: r.get()?,
            name: r.read_string()?,
            private: r.read_bool()?,
        })
    }
}

/// Children of `parent` (worlds when `parent` is None).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextList {
    pub parent: Option<ContextId>,
    pub entries: Vec<ContextEntry>,
}

impl Encode for ContextList {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.parent);
        w.put(&self.entries);
    }
}

impl Decode for ContextList {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            parent: r.get()?,
            entries: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub context: ContextId,
    pub name: String,
    pub private: bool,
    pub muted: bool,
}

impl Encode for ContextInfo {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
        w.write_str(&self.name);
        w.write_flags(&[self.private, self.muted]);
    }
}

impl Decode for ContextInfo {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let context = r.get()?;
        let name = r.read_string()?;
        let [private, muted] = r.read_flags::<2>()?;
        Ok(Self {
            context,
            name,
            private,
            muted,
        })
    }
}

/// Load (`map` set) or unload (`map` None) a room on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextJoin {
    pub context: ContextId,
    pub name: String,
    pub map: Option<ContextMap>,
}

impl Encode for ContextJoin {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
        w.write_str(&self.name);
        w.write_optional_enum(self.map);
    }
}

impl Decode for ContextJoin {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            context: r.get()?,
            name: r.read_string()?,
            map: r.read_optional_enum()?,
        })
    }
}

/// Effective roles a user holds at one context. An empty list means none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRoleUpdate {
    pub user: UserId,
    pub context: ContextId,
    pub roles: Vec<Role>,
}

impl Encode for ContextRoleUpdate {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.user);
        w.put(&self.context);
        w.write_enum_list(&self.roles);
    }
}

impl Decode for ContextRoleUpdate {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            user: r.get()?,
            context: r.get()?,
            roles: r.read_enum_list()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMusic {
    pub context: ContextId,
    pub track: Option<Music>,
}

impl Encode for ContextMusic {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
        w.write_optional_enum(self.track);
    }
}

impl Decode for ContextMusic {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            context: r.get()?,
            track: r.read_optional_enum()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarMove {
    pub action: MoveAction,
    pub user: Option<UserId>,
    pub x: f32,
    pub y: f32,
    pub sprinting: bool,
    pub direction: Direction,
}

impl Encode for AvatarMove {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_enum(self.action);
        w.put(&self.user);
        w.write_f32(self.x);
        w.write_f32(self.y);
        w.write_bool(self.sprinting);
        w.write_enum(self.direction);
    }
}

impl Decode for AvatarMove {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            action: r.read_enum()?,
            user: r.get()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            sprinting: r.read_bool()?,
            direction: r.read_enum()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatBody {
    Text(String),
    Bundle(MessageBundle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Option<UserId>,
    pub kind: ChatKind,
    pub body: ChatBody,
    pub timestamp: Option<DateTime<Utc>>,
    pub image: Option<Bytes>,
}

impl ChatMessage {
    /// Server-originated translatable message.
    pub fn info(message: MessageBundle, at: DateTime<Utc>) -> Self {
        Self {
            sender: None,
            kind: ChatKind::Info,
            body: ChatBody::Bundle(message),
            timestamp: Some(at),
            image: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ChatBody::Text(t) => Some(t),
            ChatBody::Bundle(_) => None,
        }
    }
}

impl Encode for ChatMessage {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.sender);
        w.write_enum(self.kind);
        match &self.body {
            ChatBody::Text(text) => {
                w.write_bool(false);
                w.write_str(text);
            }
            ChatBody::Bundle(bundle) => {
                w.write_bool(true);
                w.put(bundle);
            }
        }
        w.put(&self.timestamp);
        w.put(&self.image);
    }
}

impl Decode for ChatMessage {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let sender = r.get()?;
        let kind = r.read_enum()?;
        let body = if r.read_bool()? {
            ChatBody::Bundle(r.get()?)
        } else {
            ChatBody::Text(r.read_string()?)
        };
        Ok(Self {
            sender,
            kind,
            body,
            timestamp: r.get()?,
            image: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InContextInteract {
    pub context: ContextId,
}

impl Encode for InContextInteract {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
    }
}

impl Decode for InContextInteract {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self { context: r.get()? })
    }
}

/// Open or close an interactable's menu on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuAction {
    pub context: ContextId,
    pub kind: InteractableKind,
    pub open: bool,
}

impl Encode for MenuAction {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
        w.write_enum(self.kind);
        w.write_bool(self.open);
    }
}

impl Decode for MenuAction {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            context: r.get()?,
            kind: r.read_enum()?,
            open: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub context: ContextId,
    pub args: Vec<String>,
    pub option: u32,
    pub success: bool,
    pub message: Option<MessageBundle>,
}

impl MenuOption {
    pub fn result(&self, success: bool, message: Option<MessageBundle>) -> Self {
        Self {
            success,
            message,
            ..self.clone()
        }
    }
}

impl Encode for MenuOption {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.context);
        w.put(&self.args);
        w.write_var_u32(self.option);
        w.write_bool(self.success);
        w.put(&self.message);
    }
}

impl Decode for MenuOption {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            context: r.get()?,
            args: r.get()?,
            option: r.read_var_u32()?,
            success: r.read_bool()?,
            message: r.get()?,
        })
    }
}

/// What one user knows about another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user: UserId,
    pub name: Option<String>,
    pub status: Option<Status>,
    pub avatar: Option<Avatar>,
    pub friend: bool,
    pub ignored: bool,
    pub banned: bool,
    pub reported: bool,
    pub teleportable: bool,
}

impl UserRecord {
    /// Record carrying only the id, as used by `Remove`.
    pub fn bare(user: UserId) -> Self {
        Self {
            user,
            name: None,
            status: None,
            avatar: None,
            friend: false,
            ignored: false,
            banned: false,
            reported: false,
            teleportable: false,
        }
    }
}

impl Encode for UserRecord {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.user);
        w.put(&self.name);
        w.write_optional_enum(self.status);
        w.write_optional_enum(self.avatar);
        w.write_flags(&[self.friend, self.ignored, self.banned, self.reported]);
        w.write_bool(self.teleportable);
    }
}

impl Decode for UserRecord {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let user = r.get()?;
        let name = r.get()?;
        let status = r.read_optional_enum()?;
        let avatar = r.read_optional_enum()?;
        let [friend, ignored, banned, reported] = r.read_flags::<4>()?;
        Ok(Self {
            user,
            name,
            status,
            avatar,
            friend,
            ignored,
            banned,
            reported,
            teleportable: r.read_bool()?,
        })
    }
}

/// Add/update/remove known users; `context` None means the global scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub action: UserInfoAction,
    pub context: Option<ContextId>,
    pub records: Vec<UserRecord>,
}

impl Encode for UserInfo {
    fn encode(&self, w: &mut PacketWriter) {
        w.write_enum(self.action);
        w.put(&self.context);
        w.put(&self.records);
    }
}

impl Decode for UserInfo {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            action: r.read_enum()?,
            context: r.get()?,
            records: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserManage {
    pub target: UserId,
    pub action: AdministrativeAction,
    pub args: Vec<String>,
}

impl Encode for UserManage {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.target);
        w.write_enum(self.action);
        w.put(&self.args);
    }
}

impl Decode for UserManage {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            target: r.get()?,
            action: r.read_enum()?,
            args: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    pub notification: NotificationId,
    pub action: NotificationAnswer,
}

impl Encode for NotificationResponse {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.notification);
        w.write_enum(self.action);
    }
}

impl Decode for NotificationResponse {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            notification: r.get()?,
            action: r.read_enum()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub context: ContextId,
    pub message: MessageBundle,
    pub timestamp: DateTime<Utc>,
    pub request: bool,
    pub accepted: bool,
    pub declined: bool,
    pub read: bool,
}

impl From<&Notification> for NotificationRecord {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            context: n.context.clone(),
            message: n.message.clone(),
            timestamp: n.timestamp,
            request: n.is_request(),
            accepted: n.accepted,
            declined: n.declined,
            read: n.read,
        }
    }
}

impl Encode for NotificationRecord {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.id);
        w.put(&self.context);
        w.put(&self.message);
        w.write_timestamp(self.timestamp);
        w.write_flags(&[self.request, self.accepted, self.declined, self.read]);
    }
}

impl Decode for NotificationRecord {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        let id = r.get()?;
        let context = r.get()?;
        let message = r.get()?;
        let timestamp = r.read_timestamp()?;
        let [request, accepted, declined, read] = r.read_flags::<4>()?;
        Ok(Self {
            id,
            context,
            message,
            timestamp,
            request,
            accepted,
            declined,
            read,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPush {
    pub records: Vec<NotificationRecord>,
}

impl Encode for NotificationPush {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.records);
    }
}

impl Decode for NotificationPush {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self { records: r.get()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTyping {
    pub sender: Option<UserId>,
}

impl Encode for UserTyping {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.sender);
    }
}

impl Decode for UserTyping {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self { sender: r.get()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMessage {
    pub sender: Option<UserId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: Bytes,
}

impl Encode for VoiceMessage {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.sender);
        w.put(&self.timestamp);
        w.put(&self.data);
    }
}

impl Decode for VoiceMessage {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            sender: r.get()?,
            timestamp: r.get()?,
            data: r.get()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMessage {
    pub sender: Option<UserId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub name: String,
    pub data: Bytes,
}

impl Encode for AudioMessage {
    fn encode(&self, w: &mut PacketWriter) {
        w.put(&self.sender);
        w.put(&self.timestamp);
        w.write_str(&self.name);
        w.put(&self.data);
    }
}

impl Decode for AudioMessage {
    fn decode(r: &mut PacketReader) -> Result<Self, ProtoError> {
        Ok(Self {
            sender: r.get()?,
            timestamp: r.get()?,
            name: r.read_string()?,
            data: r.get()?,
        })
    }
}
