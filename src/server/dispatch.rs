//! Packet dispatch boundary.
//!
//! [`Dispatch`] is the server-side [`ServerHandler`]: it maps each inbound
//! packet onto one domain operation and is the only place where
//! [`CoreError`]s are caught. Packets carrying a result flag are echoed back
//! with `success` and the message key; every other rejection is answered with
//! an info chat line.

use log::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::ids::UserId;
use crate::logutil::escape_log;
use crate::metrics;
use crate::notification::{self, MessageBundle, NotificationAnswer};
use crate::protocol::*;
use crate::state::ServerState;

pub struct Dispatch<'a> {
    state: &'a mut ServerState,
    session: &'a mut Option<UserId>,
    replies: Vec<Packet>,
}

impl<'a> Dispatch<'a> {
    pub fn new(state: &'a mut ServerState, session: &'a mut Option<UserId>) -> Self {
        Self {
            state,
            session,
            replies: Vec::new(),
        }
    }

    /// Packets addressed to this connection, to be sent before the outbox.
    pub fn into_replies(self) -> Vec<Packet> {
        self.replies
    }

    fn user(&self) -> CoreResult<UserId> {
        self.session.ok_or(CoreError::NotAuthenticated)
    }

    fn rejected(&self, what: &str, err: &CoreError) {
        metrics::inc_actions_rejected();
        let who = self.session.map(|u| u.short()).unwrap_or_else(|| "-".into());
        debug!("{} from {} rejected: {}", what, who, err);
    }

    /// Report a failure as an info chat line.
    fn answer(&mut self, what: &str, result: CoreResult<()>) {
        if let Err(err) = result {
            self.rejected(what, &err);
            let line = ChatMessage::info(MessageBundle::from(&err), self.state.now());
            self.replies.push(line.into());
        }
    }

    fn outcome(&self, what: &str, result: &CoreResult<()>) -> (bool, Option<MessageBundle>) {
        match result {
            Ok(()) => (true, None),
            Err(err) => {
                self.rejected(what, err);
                (false, Some(MessageBundle::from(err)))
            }
        }
    }

    fn profile(&mut self, p: &mut ProfileAction) -> CoreResult<()> {
        let missing = CoreError::IllegalAccountAction("account.missing-field");
        match p.action {
            ProfileActionKind::Register => {
                let name = p.name.as_deref().ok_or(missing.clone())?;
                let password = p.password.as_deref().ok_or(missing)?;
                p.user = Some(self.state.register(name, password)?);
            }
            ProfileActionKind::Login => {
                if self.session.is_some() {
                    return Err(CoreError::IllegalAccountAction("account.session-bound"));
                }
                let name = p.name.as_deref().ok_or(missing.clone())?;
                let password = p.password.as_deref().ok_or(missing)?;
                let user = self.state.login(name, password)?;
                *self.session = Some(user);
                p.user = Some(user);
            }
            ProfileActionKind::Logout => {
                self.state.logout(self.user()?)?;
                *self.session = None;
            }
            ProfileActionKind::Delete => {
                let user = self.user()?;
                let password = p.password.as_deref().ok_or(missing)?;
                self.state.delete_account(user, password)?;
                *self.session = None;
            }
            ProfileActionKind::ChangePassword => {
                let user = self.user()?;
                let old = p.password.as_deref().ok_or(missing.clone())?;
                let new = p.new_password.as_deref().ok_or(missing)?;
                self.state.change_password(user, old, new)?;
            }
            ProfileActionKind::ChangeAvatar => {
                let user = self.user()?;
                self.state.change_avatar(user, p.avatar.ok_or(missing)?)?;
            }
            ProfileActionKind::ChangeStatus => {
                let user = self.user()?;
                self.state.change_status(user, p.status.ok_or(missing)?)?;
            }
        }
        Ok(())
    }

    fn world(&mut self, p: &mut WorldAction) -> CoreResult<()> {
        let user = self.user()?;
        let missing = CoreError::IllegalWorldAction("world.missing-field");
        match p.action {
            WorldActionKind::Create => {
                let name = p.name.as_deref().ok_or(missing.clone())?;
                let map = p.map.ok_or(missing)?;
                p.context = Some(self.state.create_world(user, name, map)?);
            }
            WorldActionKind::Join => {
                let world = p.context.as_ref().ok_or(missing)?;
                self.state.join_world(user, world)?;
            }
            WorldActionKind::Leave => self.state.leave_world(user)?,
            WorldActionKind::Delete => {
                let world = p.context.as_ref().ok_or(missing)?;
                self.state.delete_world(user, world)?;
            }
        }
        Ok(())
    }
}

impl ServerHandler for Dispatch<'_> {
    fn on_profile_action(&mut self, mut p: ProfileAction) {
        let result = self.profile(&mut p);
        let (success, message) = self.outcome("ProfileAction", &result);
        self.replies.push(p.result(success, message).into());
    }

    fn on_world_action(&mut self, mut p: WorldAction) {
        let result = self.world(&mut p);
        let (success, message) = self.outcome("WorldAction", &result);
        self.replies.push(p.result(success, message).into());
    }

    fn on_avatar_move(&mut self, p: AvatarMove) {
        let result = match p.action {
            MoveAction::Move => self
                .user()
                .and_then(|u| self.state.move_avatar(u, p.x, p.y, p.sprinting, p.direction)),
            MoveAction::Spawn | MoveAction::Remove => {
                Err(CoreError::IllegalState("move.server-only"))
            }
        };
        self.answer("AvatarMove", result);
    }

    fn on_chat_message(&mut self, p: ChatMessage) {
        if let (Some(user), Some(text)) = (*self.session, p.text()) {
            debug!("chat {:?} from {}: {}", p.kind, user.short(), escape_log(text));
        }
        let result = self.user().and_then(|u| self.state.chat(u, &p));
        self.answer("ChatMessage", result);
    }

    fn on_menu_option(&mut self, p: MenuOption) {
        let result = self
            .user()
            .and_then(|u| self.state.execute_option(u, &p.context, p.option, &p.args));
        let (success, message) = self.outcome("MenuOption", &result);
        self.replies.push(p.result(success, message).into());
    }

    fn on_user_typing(&mut self, _: UserTyping) {
        let result = self.user().and_then(|u| self.state.typing(u));
        self.answer("UserTyping", result);
    }

    fn on_voice_message(&mut self, p: VoiceMessage) {
        let result = self.user().and_then(|u| self.state.voice(u, p.data));
        self.answer("VoiceMessage", result);
    }

    fn on_audio_message(&mut self, p: AudioMessage) {
        let result = self
            .user()
            .and_then(|u| self.state.audio(u, &p.name, p.data));
        self.answer("AudioMessage", result);
    }

    fn on_in_context_interact(&mut self, p: InContextInteract) {
        let result = self.user().and_then(|u| self.state.interact(u, &p.context));
        self.answer("InContextInteract", result);
    }

    fn on_user_manage(&mut self, p: UserManage) {
        let result = self
            .user()
            .and_then(|u| p.action.execute(self.state, u, p.target, &p.args));
        self.answer(p.action.name(), result);
    }

    fn on_notification_response(&mut self, p: NotificationResponse) {
        let result = self.user().and_then(|u| match p.action {
            NotificationAnswer::Accept => notification::accept(self.state, u, p.notification),
            NotificationAnswer::Decline => notification::decline(self.state, u, p.notification),
            NotificationAnswer::Delete => notification::delete(self.state, u, p.notification),
            NotificationAnswer::Read => notification::mark_read(self.state, u, p.notification),
        });
        if let Err(e) = &result {
            if matches!(e, CoreError::NotFound { .. }) {
                warn!("Response to unknown notification {}", p.notification.short());
            }
        }
        self.answer("NotificationResponse", result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn run(state: &mut ServerState, session: &mut Option<UserId>, packet: impl Into<Packet>) -> Vec<Packet> {
        let mut dispatch = Dispatch::new(state, session);
        packet.into().route_to_server(&mut dispatch).unwrap();
        dispatch.into_replies()
    }

    fn credentials(kind: ProfileActionKind, name: &str) -> ProfileAction {
        let mut p = ProfileAction::request(kind);
        p.name = Some(name.into());
        p.password = Some("secret-pw".into());
        p
    }

    #[test]
    fn register_then_login_echoes_results_without_passwords() {
        let (mut state, _, _) = state();
        let mut session = None;
        let replies = run(&mut state, &mut session, credentials(ProfileActionKind::Register, "ann"));
        match &replies[..] {
            [Packet::ProfileAction(r)] => {
                assert!(r.success);
                assert!(r.user.is_some());
                assert_eq!(r.password, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(session.is_none());

        run(&mut state, &mut session, credentials(ProfileActionKind::Login, "ann"));
        assert!(session.is_some());
        assert!(state.require_online(session.unwrap()).is_ok());
    }

    #[test]
    fn failed_world_action_carries_the_key() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let mut session = Some(ann);
        let mut create = WorldAction::request(WorldActionKind::Create);
        create.name = Some("Isle".into());
        create.map = Some(crate::context::ContextMap::PublicPlaza);
        let replies = run(&mut state, &mut session, create);
        match &replies[..] {
            [Packet::WorldAction(r)] => {
                assert!(!r.success);
                let message = r.message.as_ref().unwrap();
                assert_eq!(message.key, "error.no-permission");
                assert_eq!(message.args, vec!["manage-worlds".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn anonymous_chat_is_answered_with_an_info_line() {
        let (mut state, _, _) = state();
        let mut session = None;
        let line = ChatMessage {
            sender: None,
            kind: ChatKind::Standard,
            body: ChatBody::Text("hi".into()),
            timestamp: None,
            image: None,
        };
        let replies = run(&mut state, &mut session, line);
        match &replies[..] {
            [Packet::ChatMessage(m)] => {
                assert_eq!(m.kind, ChatKind::Info);
                assert_eq!(
                    m.body,
                    ChatBody::Bundle(MessageBundle::new("error.not-authenticated"))
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clients_cannot_spawn_avatars() {
        let (mut state, _, _) = state();
        let ann = in_harbor(&mut state, "ann");
        let mut session = Some(ann);
        let spawn = AvatarMove {
            action: MoveAction::Spawn,
            user: Some(ann),
            x: 1.0,
            y: 1.0,
            sprinting: false,
            direction: Default::default(),
        };
        let replies = run(&mut state, &mut session, spawn);
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn logout_clears_the_session() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let mut session = Some(ann);
        run(
            &mut state,
            &mut session,
            ProfileAction::request(ProfileActionKind::Logout),
        );
        assert!(session.is_none());
        assert!(!state.users.get(ann).unwrap().is_online());
    }
}
