//! Chat lines and the typing/voice/audio relays.

use bytes::Bytes;
use log::debug;

use super::ServerState;
use crate::context::Permission;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::logutil::escape_log;
use crate::protocol::{AudioMessage, ChatBody, ChatKind, ChatMessage, Packet, UserTyping, VoiceMessage};
use crate::validation::sanitize_chat;

impl ServerState {
    pub fn chat(&mut self, user: UserId, message: &ChatMessage) -> CoreResult<()> {
        self.begin(user)?;
        let text = message
            .text()
            .ok_or(CoreError::IllegalState("chat.bundle-from-client"))?;
        let text = sanitize_chat(text);
        if text.is_empty() {
            return Err(CoreError::IllegalState("chat.empty"));
        }
        let image = message.image.clone();
        match message.kind {
            ChatKind::Standard => self.chat_room(user, text, image),
            ChatKind::Whisper => self.whisper(user, &text, image),
            ChatKind::World => self.chat_world(user, text, image),
            ChatKind::Info => Err(CoreError::IllegalState("chat.info-from-client")),
        }
    }

    /// Stamp a line with its sender and time. The stamped packet has to fit
    /// in one control frame or no recipient could be sent it.
    fn line(
        &self,
        user: UserId,
        kind: ChatKind,
        text: String,
        image: Option<Bytes>,
    ) -> CoreResult<ChatMessage> {
        let line = ChatMessage {
            sender: Some(user),
            kind,
            body: ChatBody::Text(text),
            timestamp: Some(self.now()),
            image,
        };
        if Packet::ChatMessage(line.clone()).encode().len() > self.settings.max_frame_size {
            return Err(CoreError::IllegalState("chat.too-long"));
        }
        Ok(line)
    }

    /// Drop recipients that ignore `sender`.
    fn not_ignoring(&self, sender: UserId, recipients: Vec<UserId>) -> Vec<UserId> {
        recipients
            .into_iter()
            .filter(|r| self.users.get(*r).map_or(false, |u| !u.is_ignoring(sender)))
            .collect()
    }

    fn require_unmuted(&self, user: UserId, area: &ContextId) -> CoreResult<()> {
        if self.tree.is_muted(user, area) {
            Err(CoreError::IllegalState("chat.muted"))
        } else {
            Ok(())
        }
    }

    fn chat_room(&mut self, user: UserId, text: String, image: Option<Bytes>) -> CoreResult<()> {
        let location = self.location(user)?;
        self.require_unmuted(user, &location.area)?;
        debug!("{} @ {}: {}", user.short(), location.room, escape_log(&text));
        let packet = self.line(user, ChatKind::Standard, text, image)?;
        let recipients = self.not_ignoring(user, self.room_members(&location.room));
        self.send_to_all(&recipients, packet);
        Ok(())
    }

    /// `@name text`. Allowed between friends, within a world, or with
    /// `ContactUser` at the root.
    fn whisper(&mut self, user: UserId, text: &str, image: Option<Bytes>) -> CoreResult<()> {
        let rest = text
            .strip_prefix('@')
            .ok_or(CoreError::IllegalState("chat.whisper-needs-target"))?;
        let (name, body) = rest
            .split_once(char::is_whitespace)
            .map(|(name, body)| (name, body.trim()))
            .unwrap_or((rest, ""));
        if body.is_empty() {
            return Err(CoreError::IllegalState("chat.empty"));
        }
        let target = self
            .users
            .id_by_name(name)
            .ok_or_else(|| CoreError::not_found("user.unknown", name))?;
        if target == user {
            return Err(CoreError::IllegalState("chat.whisper-self"));
        }
        let sender = self.users.get(user)?;
        let recipient = self.users.get(target)?;
        if !recipient.is_online() {
            return Err(CoreError::IllegalState("chat.target-offline"));
        }
        let same_world = sender.current_world.is_some() && sender.current_world == recipient.current_world;
        if !sender.is_friend(target)
            && !same_world
            && !self.has_permission(user, &ContextId::root(), Permission::ContactUser)
        {
            return Err(CoreError::NoPermission(Permission::ContactUser));
        }
        let ignored = recipient.is_ignoring(user);
        let packet = self.line(user, ChatKind::Whisper, body.to_string(), image)?;
        if !ignored {
            self.send(target, packet.clone());
        }
        self.send(user, packet);
        Ok(())
    }

    fn chat_world(&mut self, user: UserId, text: String, image: Option<Bytes>) -> CoreResult<()> {
        let world = self
            .users
            .get(user)?
            .current_world
            .clone()
            .ok_or(CoreError::NotInWorld)?;
        self.require_permission(user, &world, Permission::ContactContext)?;
        debug!("{} @ {} (world): {}", user.short(), world, escape_log(&text));
        let packet = self.line(user, ChatKind::World, text, image)?;
        let recipients = self.not_ignoring(user, self.world_members(&world));
        self.send_to_all(&recipients, packet);
        Ok(())
    }

    /// Relay a packet from `user` to the other members of its room.
    fn relay_to_room(&mut self, user: UserId, packet: Packet) -> CoreResult<()> {
        let room = self.location(user)?.room;
        let peers: Vec<UserId> = self
            .room_members(&room)
            .into_iter()
            .filter(|m| *m != user)
            .collect();
        let recipients = self.not_ignoring(user, peers);
        self.send_to_all(&recipients, packet);
        Ok(())
    }

    pub fn typing(&mut self, user: UserId) -> CoreResult<()> {
        self.begin_in_world(user)?;
        self.relay_to_room(user, UserTyping { sender: Some(user) }.into())
    }

    pub fn voice(&mut self, user: UserId, data: Bytes) -> CoreResult<()> {
        self.begin_in_world(user)?;
        self.require_unmuted(user, &self.location(user)?.area)?;
        let packet = VoiceMessage {
            sender: Some(user),
            timestamp: Some(self.now()),
            data,
        };
        self.relay_to_room(user, packet.into())
    }

    pub fn audio(&mut self, user: UserId, name: &str, data: Bytes) -> CoreResult<()> {
        self.begin_in_world(user)?;
        self.require_unmuted(user, &self.location(user)?.area)?;
        let packet = AudioMessage {
            sender: Some(user),
            timestamp: Some(self.now()),
            name: sanitize_chat(name),
            data,
        };
        self.relay_to_room(user, packet.into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn say(kind: ChatKind, text: &str) -> ChatMessage {
        ChatMessage {
            sender: None,
            kind,
            body: ChatBody::Text(text.to_string()),
            timestamp: None,
            image: None,
        }
    }

    fn got_chat(state: &mut ServerState, user: UserId) -> Vec<ChatMessage> {
        state
            .outbox
            .take_for(user)
            .into_iter()
            .filter_map(|p| match p {
                Packet::ChatMessage(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn room_chat_skips_ignorers() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        let bob = in_harbor(&mut state, "bob");
        let cat = in_harbor(&mut state, "cat");
        state.users.get_mut(cat).unwrap().ignored.insert(ann);
        state.outbox.drain();
        state.chat(ann, &say(ChatKind::Standard, "hello")).unwrap();
        assert_eq!(got_chat(&mut state, bob)[0].text(), Some("hello"));
        assert_eq!(got_chat(&mut state, ann).len(), 1);
        assert!(got_chat(&mut state, cat).is_empty());
    }

    #[test]
    fn muted_user_cannot_speak() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        state.tree.add_muted_user(&harbor(), ann).unwrap();
        assert_eq!(
            state.chat(ann, &say(ChatKind::Standard, "hello")),
            Err(CoreError::IllegalState("chat.muted"))
        );
        assert_eq!(
            state.voice(ann, Bytes::from_static(b"\x01\x02")),
            Err(CoreError::IllegalState("chat.muted"))
        );
    }

    #[test]
    fn whisper_reaches_only_target() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        let bob = in_harbor(&mut state, "bob");
        let cat = in_harbor(&mut state, "cat");
        state.outbox.drain();
        state.chat(ann, &say(ChatKind::Whisper, "@Bob psst")).unwrap();
        assert_eq!(got_chat(&mut state, bob)[0].text(), Some("psst"));
        assert!(got_chat(&mut state, cat).is_empty());
        let err = state
            .chat(ann, &say(ChatKind::Whisper, "@nobody hi"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { key: "user.unknown", .. }));
    }

    #[test]
    fn whisper_to_stranger_outside_world_needs_contact_user() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        online(&mut state, "bob");
        assert_eq!(
            state.chat(ann, &say(ChatKind::Whisper, "@bob hi")),
            Err(CoreError::NoPermission(Permission::ContactUser))
        );
    }

    #[test]
    fn world_chat_needs_contact_context() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        assert_eq!(
            state.chat(ann, &say(ChatKind::World, "everyone!")),
            Err(CoreError::NoPermission(Permission::ContactContext))
        );
        let root = online(&mut state, "root");
        state.join_world(root, &harbor()).unwrap();
        state.outbox.drain();
        state.chat(root, &say(ChatKind::World, "announcement")).unwrap();
        assert_eq!(got_chat(&mut state, ann)[0].kind, ChatKind::World);
    }

    #[test]
    fn longest_line_fits_one_frame_and_is_delivered() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        let bob = in_harbor(&mut state, "bob");
        state.outbox.drain();
        let max = state.settings.max_frame_size;
        let stamped = |len: usize| {
            Packet::ChatMessage(ChatMessage {
                sender: Some(ann),
                timestamp: Some(state.now()),
                ..say(ChatKind::Standard, &"a".repeat(len))
            })
            .encode()
            .len()
        };
        let longest = (1..max).rev().find(|len| stamped(*len) <= max).unwrap();

        let text = "a".repeat(longest);
        state.chat(ann, &say(ChatKind::Standard, &text)).unwrap();
        let heard = got_chat(&mut state, bob);
        assert_eq!(heard[0].text(), Some(text.as_str()));
        let packet = Packet::ChatMessage(heard[0].clone());
        assert!(crate::protocol::encode_frame(&packet.encode(), max).is_ok());

        assert_eq!(
            state.chat(ann, &say(ChatKind::Standard, &"a".repeat(longest + 1))),
            Err(CoreError::IllegalState("chat.too-long"))
        );
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn typing_is_relayed_to_peers_only() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        let bob = in_harbor(&mut state, "bob");
        state.outbox.drain();
        state.typing(ann).unwrap();
        assert!(state.outbox.take_for(ann).is_empty());
        assert_eq!(
            state.outbox.take_for(bob),
            vec![Packet::UserTyping(UserTyping { sender: Some(ann) })]
        );
    }
}
