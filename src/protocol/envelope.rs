//! Tagged packet envelope: one type byte followed by the payload.
//!
//! A frame is decoded exactly once into [`Packet`], checked against the
//! receiving side's direction class and routed by a single `match` to the
//! typed handler trait of that side.

use bytes::Bytes;

use super::codec::{Encode, PacketReader, PacketWriter, ProtoError};
use super::packets::*;

/// Who may originate a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionClass {
    ClientToServer,
    ServerToClient,
    Either,
}

/// Side that is decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

macro_rules! packets {
    ($($variant:ident($ty:ty) = $tag:literal, $dir:ident;)+) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($ty),)+
        }

        impl Packet {
            pub fn type_byte(&self) -> u8 {
                match self {
                    $(Packet::$variant(_) => $tag,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Packet::$variant(_) => stringify!($variant),)+
                }
            }

            pub fn direction(&self) -> DirectionClass {
                match self {
                    $(Packet::$variant(_) => DirectionClass::$dir,)+
                }
            }

            fn encode_payload(&self, w: &mut PacketWriter) {
                match self {
                    $(Packet::$variant(p) => p.encode(w),)+
                }
            }

            fn decode_payload(tag: u8, r: &mut PacketReader) -> Result<Packet, ProtoError> {
                match tag {
                    $($tag => Ok(Packet::$variant(r.get::<$ty>()?)),)+
                    other => Err(ProtoError::UnknownType(other)),
                }
            }
        }

        $(
            impl From<$ty> for Packet {
                fn from(p: $ty) -> Self {
                    Packet::$variant(p)
                }
            }
        )+
    };
}

packets! {
    ProfileAction(ProfileAction) = 0x01, Either;
    WorldAction(WorldAction) = 0x02, Either;
    ContextList(ContextList) = 0x03, ServerToClient;
    ContextInfo(ContextInfo) = 0x04, ServerToClient;
    ContextJoin(ContextJoin) = 0x05, ServerToClient;
    ContextRole(ContextRoleUpdate) = 0x06, ServerToClient;
    ContextMusic(ContextMusic) = 0x07, ServerToClient;
    AvatarMove(AvatarMove) = 0x08, Either;
    ChatMessage(ChatMessage) = 0x09, Either;
    InContextInteract(InContextInteract) = 0x0A, ClientToServer;
    MenuAction(MenuAction) = 0x0B, ServerToClient;
    MenuOption(MenuOption) = 0x0C, Either;
    UserInfo(UserInfo) = 0x0D, ServerToClient;
    UserManage(UserManage) = 0x0E, ClientToServer;
    NotificationResponse(NotificationResponse) = 0x0F, ClientToServer;
    NotificationPush(NotificationPush) = 0x10, ServerToClient;
    UserTyping(UserTyping) = 0x11, Either;
    VoiceMessage(VoiceMessage) = 0x12, Either;
    AudioMessage(AudioMessage) = 0x13, Either;
}

impl Packet {
    pub fn encode(&self) -> Bytes {
        let mut w = PacketWriter::new();
        w.write_u8(self.type_byte());
        self.encode_payload(&mut w);
        w.into_bytes()
    }

    /// Decode without any direction check.
    pub fn decode(frame: Bytes) -> Result<Packet, ProtoError> {
        let mut r = PacketReader::new(frame);
        let tag = r.read_u8()?;
        let packet = Self::decode_payload(tag, &mut r)?;
        r.finish(packet.name())?;
        Ok(packet)
    }

    /// Decode a frame received by `side`, rejecting packets the peer may not send.
    pub fn decode_on(side: Side, frame: Bytes) -> Result<Packet, ProtoError> {
        let packet = Self::decode(frame)?;
        if !packet.may_arrive_at(side) {
            return Err(ProtoError::WrongDirection {
                packet: packet.name(),
                direction: match side {
                    Side::Server => "client to server",
                    Side::Client => "server to client",
                },
            });
        }
        Ok(packet)
    }

    pub fn may_arrive_at(&self, side: Side) -> bool {
        matches!(
            (self.direction(), side),
            (DirectionClass::Either, _)
                | (DirectionClass::ClientToServer, Side::Server)
                | (DirectionClass::ServerToClient, Side::Client)
        )
    }

    /// Voice and audio frames may use the larger media frame ceiling.
    pub fn is_media(&self) -> bool {
        matches!(self, Packet::VoiceMessage(_) | Packet::AudioMessage(_))
    }

    pub fn route_to_server<H: ServerHandler + ?Sized>(self, h: &mut H) -> Result<(), ProtoError> {
        match self {
            Packet::ProfileAction(p) => h.on_profile_action(p),
            Packet::WorldAction(p) => h.on_world_action(p),
            Packet::AvatarMove(p) => h.on_avatar_move(p),
            Packet::ChatMessage(p) => h.on_chat_message(p),
            Packet::MenuOption(p) => h.on_menu_option(p),
            Packet::UserTyping(p) => h.on_user_typing(p),
            Packet::VoiceMessage(p) => h.on_voice_message(p),
            Packet::AudioMessage(p) => h.on_audio_message(p),
            Packet::InContextInteract(p) => h.on_in_context_interact(p),
            Packet::UserManage(p) => h.on_user_manage(p),
            Packet::NotificationResponse(p) => h.on_notification_response(p),
            other => {
                return Err(ProtoError::WrongDirection {
                    packet: other.name(),
                    direction: "client to server",
                })
            }
        }
        Ok(())
    }

    pub fn route_to_client<H: ClientHandler + ?Sized>(self, h: &mut H) -> Result<(), ProtoError> {
        match self {
            Packet::ProfileAction(p) => h.on_profile_action(p),
            Packet::WorldAction(p) => h.on_world_action(p),
            Packet::AvatarMove(p) => h.on_avatar_move(p),
            Packet::ChatMessage(p) => h.on_chat_message(p),
            Packet::MenuOption(p) => h.on_menu_option(p),
            Packet::UserTyping(p) => h.on_user_typing(p),
            Packet::VoiceMessage(p) => h.on_voice_message(p),
            Packet::AudioMessage(p) => h.on_audio_message(p),
            Packet::ContextList(p) => h.on_context_list(p),
            Packet::ContextInfo(p) => h.on_context_info(p),
            Packet::ContextJoin(p) => h.on_context_join(p),
            Packet::ContextRole(p) => h.on_context_role(p),
            Packet::ContextMusic(p) => h.on_context_music(p),
            Packet::MenuAction(p) => h.on_menu_action(p),
            Packet::UserInfo(p) => h.on_user_info(p),
            Packet::NotificationPush(p) => h.on_notification_push(p),
            other => {
                return Err(ProtoError::WrongDirection {
                    packet: other.name(),
                    direction: "server to client",
                })
            }
        }
        Ok(())
    }

    /// Split batch packets so every encoded frame fits in `max_frame` bytes.
    ///
    /// Each page carries at least one record; a single record that is too
    /// large on its own still gets its own (oversized) page. Non-batch
    /// packets are returned unchanged.
    pub fn paginate(self, max_frame: usize) -> Vec<Packet> {
        if self.encode().len() <= max_frame {
            return vec![self];
        }
        match self {
            Packet::UserInfo(info) => {
                let UserInfo {
                    action,
                    context,
                    records,
                } = info;
                let empty = Packet::UserInfo(UserInfo {
                    action,
                    context: context.clone(),
                    records: Vec::new(),
                });
                pages(empty.encode().len(), max_frame, records)
                    .into_iter()
                    .map(|records| {
                        Packet::UserInfo(UserInfo {
                            action,
                            context: context.clone(),
                            records,
                        })
                    })
                    .collect()
            }
            Packet::NotificationPush(push) => {
                let empty = Packet::NotificationPush(NotificationPush {
                    records: Vec::new(),
                });
                pages(empty.encode().len(), max_frame, push.records)
                    .into_iter()
                    .map(|records| Packet::NotificationPush(NotificationPush { records }))
                    .collect()
            }
            Packet::ContextList(list) => {
                let ContextList { parent, entries } = list;
                let empty = Packet::ContextList(ContextList {
                    parent: parent.clone(),
                    entries: Vec::new(),
                });
                pages(empty.encode().len(), max_frame, entries)
                    .into_iter()
                    .map(|entries| {
                        Packet::ContextList(ContextList {
                            parent: parent.clone(),
                            entries,
                        })
                    })
                    .collect()
            }
            other => vec![other],
        }
    }
}

/// Greedy split of `items`; `header` is the encoded size with an empty list.
/// Growing the count varint past one byte is accounted for conservatively.
fn pages<T: Encode>(header: usize, max_frame: usize, items: Vec<T>) -> Vec<Vec<T>> {
    const COUNT_SLACK: usize = 2;
    let budget = max_frame.saturating_sub(header + COUNT_SLACK);
    let mut out = Vec::new();
    let mut current = Vec::new();
    let mut used = 0usize;
    for item in items {
        let mut w = PacketWriter::new();
        item.encode(&mut w);
        let size = w.len();
        if !current.is_empty() && used + size > budget {
            out.push(std::mem::take(&mut current));
            used = 0;
        }
        used += size;
        current.push(item);
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

/// Server side: "either" packets plus client-to-server packets.
pub trait ServerHandler {
    fn on_profile_action(&mut self, p: ProfileAction);
    fn on_world_action(&mut self, p: WorldAction);
    fn on_avatar_move(&mut self, p: AvatarMove);
    fn on_chat_message(&mut self, p: ChatMessage);
    fn on_menu_option(&mut self, p: MenuOption);
    fn on_user_typing(&mut self, p: UserTyping);
    fn on_voice_message(&mut self, p: VoiceMessage);
    fn on_audio_message(&mut self, p: AudioMessage);
    fn on_in_context_interact(&mut self, p: InContextInteract);
    fn on_user_manage(&mut self, p: UserManage);
    fn on_notification_response(&mut self, p: NotificationResponse);
}

/// Client side: "either" packets plus server-to-client packets.
///
/// Every method defaults to ignoring the packet so lightweight clients only
/// implement what they react to.
#[allow(unused_variables)]
pub trait ClientHandler {
    fn on_profile_action(&mut self, p: ProfileAction) {}
    fn on_world_action(&mut self, p: WorldAction) {}
    fn on_avatar_move(&mut self, p: AvatarMove) {}
    fn on_chat_message(&mut self, p: ChatMessage) {}
    fn on_menu_option(&mut self, p: MenuOption) {}
    fn on_user_typing(&mut self, p: UserTyping) {}
    fn on_voice_message(&mut self, p: VoiceMessage) {}
    fn on_audio_message(&mut self, p: AudioMessage) {}
    fn on_context_list(&mut self, p: ContextList) {}
    fn on_context_info(&mut self, p: ContextInfo) {}
    fn on_context_join(&mut self, p: ContextJoin) {}
    fn on_context_role(&mut self, p: ContextRoleUpdate) {}
    fn on_context_music(&mut self, p: ContextMusic) {}
    fn on_menu_action(&mut self, p: MenuAction) {}
    fn on_user_info(&mut self, p: UserInfo) {}
    fn on_notification_push(&mut self, p: NotificationPush) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ContextId, UserId};
    use crate::user::Status;

    fn record(i: usize) -> UserRecord {
        UserRecord {
            name: Some(format!("user-number-{i:04}")),
            status: Some(Status::Online),
            ..UserRecord::bare(UserId::generate())
        }
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let err = Packet::decode(Bytes::from_static(&[0xEE])).unwrap_err();
        assert_eq!(err, ProtoError::UnknownType(0xEE));
    }

    #[test]
    fn server_rejects_server_only_packets() {
        let p = Packet::ContextMusic(ContextMusic {
            context: ContextId::root(),
            track: None,
        });
        let err = Packet::decode_on(Side::Server, p.encode()).unwrap_err();
        assert!(matches!(err, ProtoError::WrongDirection { packet: "ContextMusic", .. }));
        assert!(Packet::decode_on(Side::Client, p.encode()).is_ok());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let p = Packet::UserTyping(UserTyping { sender: None });
        let mut raw = p.encode().to_vec();
        raw.push(0);
        let err = Packet::decode(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, ProtoError::TrailingBytes { packet: "UserTyping", .. }));
    }

    #[test]
    fn large_user_info_is_paginated_under_the_ceiling() {
        let records: Vec<UserRecord> = (0..50).map(record).collect();
        let packet = Packet::UserInfo(UserInfo {
            action: UserInfoAction::Add,
            context: Some(ContextId::root().child("Harbor")),
            records: records.clone(),
        });
        let pages = packet.paginate(512);
        assert!(pages.len() > 1);
        let mut seen = Vec::new();
        for page in pages {
            assert!(page.encode().len() <= 512);
            match page {
                Packet::UserInfo(info) => seen.extend(info.records),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, records);
    }

    #[test]
    fn small_packets_are_not_split() {
        let packet = Packet::NotificationPush(NotificationPush { records: vec![] });
        assert_eq!(packet.clone().paginate(512), vec![packet]);
    }
}
