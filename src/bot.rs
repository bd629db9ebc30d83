//! # Concierge bot
//!
//! An in-process client that attaches to the world actor like any TCP
//! connection. It logs in with a generated password, settles in a world,
//! accepts every friend request and room invitation it receives and greets
//! users who spawn in its room. The actor never waits on it: the bot reads
//! its own packet channel on a separate task and answers through the same
//! [`WorldHandle`] as everyone else. Rejected requests come back as info
//! lines and are logged.

use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tokio::task::JoinHandle;

use crate::config::BotConfig;
use crate::context::Role;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, NotificationId, UserId};
use crate::logutil::{escape_log, sec_log};
use crate::notification::NotificationAnswer;
use crate::protocol::*;
use crate::server::WorldHandle;
use crate::state::ServerState;

const PASSWORD_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct BotCredentials {
    pub user: UserId,
    pub name: String,
    pub password: String,
    pub world: Option<String>,
}

/// Create the bot account (or rotate its password) and grant it the Bot role
/// at the global root. Runs before the world actor takes over the state.
pub fn provision(state: &mut ServerState, config: &BotConfig) -> CoreResult<BotCredentials> {
    let password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect();
    let user = match state.users.id_by_name(&config.name) {
        Some(id) => {
            let hash = state.passwords.hash(&password).map_err(|e| {
                warn!("Hashing bot password failed: {}", e);
                CoreError::IllegalAccountAction("account.hash-failed")
            })?;
            state.users.get_mut(id)?.password_hash = hash.clone();
            state.store.save_password(id, &hash);
            id
        }
        None => state.register(&config.name, &password)?,
    };
    if state.grant_role(user, &ContextId::root(), Role::Bot)? {
        sec_log!("Bot role granted to {}", escape_log(&config.name));
    }
    Ok(BotCredentials {
        user,
        name: config.name.clone(),
        password,
        world: config.world.clone(),
    })
}

/// Attach the bot to the world and run it until the actor goes away.
pub fn spawn(world: WorldHandle, credentials: BotCredentials) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (conn, mut inbox) = world.attach("bot");
        let mut bot = Bot::new(credentials);
        world.packet(conn, bot.login());
        while let Some(packet) = inbox.recv().await {
            let name = packet.name();
            if let Err(e) = packet.route_to_client(&mut bot) {
                warn!("Bot could not handle {}: {}", name, e);
            }
            for reply in bot.take_outgoing() {
                world.packet(conn, reply);
            }
        }
        debug!("Bot stopped");
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Away,
    /// Receiving the spawns of users already in the new room.
    Arriving,
    Settled,
}

pub struct Bot {
    credentials: BotCredentials,
    logged_in: bool,
    joining: bool,
    room: Option<ContextId>,
    phase: Phase,
    names: HashMap<UserId, String>,
    present: HashSet<UserId>,
    pending_greetings: Vec<UserId>,
    answered: HashSet<NotificationId>,
    outgoing: Vec<Packet>,
}

impl Bot {
    pub fn new(credentials: BotCredentials) -> Self {
        Self {
            credentials,
            logged_in: false,
            joining: false,
            room: None,
            phase: Phase::Away,
            names: HashMap::new(),
            present: HashSet::new(),
            pending_greetings: Vec::new(),
            answered: HashSet::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn login(&self) -> Packet {
        let mut p = ProfileAction::request(ProfileActionKind::Login);
        p.name = Some(self.credentials.name.clone());
        p.password = Some(self.credentials.password.clone());
        p.into()
    }

    pub fn take_outgoing(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn room(&self) -> Option<&ContextId> {
        self.room.as_ref()
    }

    fn me(&self) -> UserId {
        self.credentials.user
    }

    fn settle(&mut self) {
        if self.phase == Phase::Arriving {
            self.phase = Phase::Settled;
        }
    }

    fn greet(&mut self, user: UserId) {
        match self.names.get(&user) {
            Some(name) => {
                let text = format!("Welcome, {}!", name);
                self.outgoing.push(
                    ChatMessage {
                        sender: None,
                        kind: ChatKind::Standard,
                        body: ChatBody::Text(text),
                        timestamp: None,
                        image: None,
                    }
                    .into(),
                );
            }
            None => self.pending_greetings.push(user),
        }
    }

    fn greet_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending_greetings);
        for user in pending {
            if self.present.contains(&user) {
                self.greet(user);
            }
        }
    }
}

impl ClientHandler for Bot {
    fn on_profile_action(&mut self, p: ProfileAction) {
        if p.action != ProfileActionKind::Login {
            return;
        }
        if p.success {
            self.logged_in = true;
            info!("Bot {} logged in", escape_log(&self.credentials.name));
        } else {
            warn!(
                "Bot login failed: {}",
                p.message.map(|m| m.key).unwrap_or_default()
            );
        }
    }

    fn on_world_action(&mut self, p: WorldAction) {
        if p.action == WorldActionKind::Join && !p.success {
            self.joining = false;
            warn!(
                "Bot could not join {:?}: {}",
                p.context.map(|c| c.to_string()),
                p.message.map(|m| m.key).unwrap_or_default()
            );
        }
    }

    fn on_context_list(&mut self, list: ContextList) {
        if list.parent != Some(ContextId::root()) || !self.logged_in {
            return;
        }
        if self.room.is_some() || self.joining {
            return;
        }
        let target = match &self.credentials.world {
            Some(name) => list.entries.iter().find(|e| &e.name == name),
            None => list.entries.first(),
        };
        if let Some(entry) = target {
            self.joining = true;
            let mut join = WorldAction::request(WorldActionKind::Join);
            join.context = Some(entry.id.clone());
            self.outgoing.push(join.into());
        }
    }

    fn on_context_join(&mut self, join: ContextJoin) {
        if join.map.is_some() {
            self.joining = false;
            self.room = Some(join.context);
            self.phase = Phase::Arriving;
            self.present.clear();
            self.pending_greetings.clear();
        } else if self.room.as_ref() == Some(&join.context) {
            self.room = None;
            self.phase = Phase::Away;
            self.present.clear();
        }
    }

    fn on_avatar_move(&mut self, m: AvatarMove) {
        let Some(user) = m.user.filter(|u| *u != self.me()) else {
            return;
        };
        match m.action {
            MoveAction::Spawn => {
                let new = self.present.insert(user);
                if new && self.phase == Phase::Settled {
                    self.greet(user);
                }
            }
            MoveAction::Remove => {
                self.present.remove(&user);
            }
            MoveAction::Move => {}
        }
    }

    fn on_user_info(&mut self, info: UserInfo) {
        if info.action != UserInfoAction::Remove {
            for record in &info.records {
                if let Some(name) = &record.name {
                    self.names.insert(record.user, name.clone());
                }
            }
        }
        self.settle();
        self.greet_pending();
    }

    fn on_chat_message(&mut self, m: ChatMessage) {
        self.settle();
        if m.kind == ChatKind::Info {
            if let ChatBody::Bundle(bundle) = &m.body {
                warn!("Bot request rejected: {} {:?}", bundle.key, bundle.args);
            }
        }
    }

    fn on_notification_push(&mut self, push: NotificationPush) {
        for record in push.records {
            let open = record.request && !record.accepted && !record.declined;
            if open && self.answered.insert(record.id) {
                debug!("Bot accepting {}", record.message.key);
                self.outgoing.push(
                    NotificationResponse {
                        notification: record.id,
                        action: NotificationAnswer::Accept,
                    }
                    .into(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::MessageBundle;
    use crate::state::test_support::*;
    use chrono::Utc;

    fn bot() -> Bot {
        let mut bot = Bot::new(BotCredentials {
            user: UserId::generate(),
            name: "Concierge".into(),
            password: "pw".into(),
            world: None,
        });
        bot.logged_in = true;
        bot
    }

    fn spawn_of(user: UserId) -> Packet {
        AvatarMove {
            action: MoveAction::Spawn,
            user: Some(user),
            x: 0.0,
            y: 0.0,
            sprinting: false,
            direction: Default::default(),
        }
        .into()
    }

    fn roster(context: Option<ContextId>, users: &[(UserId, &str)]) -> Packet {
        UserInfo {
            action: UserInfoAction::Add,
            context,
            records: users
                .iter()
                .map(|(id, name)| UserRecord {
                    name: Some(name.to_string()),
                    ..UserRecord::bare(*id)
                })
                .collect(),
        }
        .into()
    }

    fn feed(bot: &mut Bot, packet: Packet) -> Vec<Packet> {
        packet.route_to_client(bot).unwrap();
        bot.take_outgoing()
    }

    fn greetings(packets: &[Packet]) -> Vec<String> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::ChatMessage(m) => m.text().map(str::to_string),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn joins_the_first_world_after_login() {
        let mut bot = bot();
        let harbor = harbor();
        let out = feed(
            &mut bot,
            ContextList {
                parent: Some(ContextId::root()),
                entries: vec![ContextEntry {
                    id: harbor.clone(),
                    name: "Harbor".into(),
                    private: false,
                }],
            }
            .into(),
        );
        match &out[..] {
            [Packet::WorldAction(w)] => {
                assert_eq!(w.action, WorldActionKind::Join);
                assert_eq!(w.context, Some(harbor));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn greets_newcomers_but_not_the_existing_crowd() {
        let mut bot = bot();
        let plaza = harbor().child("Plaza");
        let (old, new) = (UserId::generate(), UserId::generate());
        feed(
            &mut bot,
            ContextJoin {
                context: plaza.clone(),
                name: "Plaza".into(),
                map: Some(crate::context::ContextMap::PublicPlaza),
            }
            .into(),
        );
        assert!(feed(&mut bot, spawn_of(old)).is_empty());
        assert!(feed(&mut bot, roster(Some(harbor()), &[(old, "old")])).is_empty());

        assert!(feed(&mut bot, spawn_of(new)).is_empty());
        let out = feed(&mut bot, roster(Some(harbor()), &[(new, "newbie")]));
        assert_eq!(greetings(&out), vec!["Welcome, newbie!".to_string()]);
        assert!(feed(&mut bot, spawn_of(new)).is_empty());
        assert_eq!(bot.room(), Some(&plaza));
    }

    #[test]
    fn accepts_open_requests_once() {
        let mut bot = bot();
        let record = NotificationRecord {
            id: NotificationId::generate(),
            context: ContextId::root(),
            message: MessageBundle::new("friend.request"),
            timestamp: Utc::now(),
            request: true,
            accepted: false,
            declined: false,
            read: false,
        };
        let push = NotificationPush {
            records: vec![record.clone()],
        };
        let out = feed(&mut bot, push.clone().into());
        assert!(matches!(
            &out[..],
            [Packet::NotificationResponse(r)] if r.action == NotificationAnswer::Accept
        ));
        assert!(feed(&mut bot, push.into()).is_empty());
    }

    #[test]
    fn provision_rotates_password_and_grants_role() {
        let (mut state, _, store) = state();
        let config = BotConfig::default();
        let first = provision(&mut state, &config).unwrap();
        let second = provision(&mut state, &config).unwrap();
        assert_eq!(first.user, second.user);
        assert_ne!(first.password, second.password);
        assert!(state
            .users
            .get(first.user)
            .unwrap()
            .holds_role(&ContextId::root(), Role::Bot));
        assert!(store.snapshot().roles.contains_key(&(first.user, ContextId::root())));
        state.login(&config.name, &second.password).unwrap();
    }
}
