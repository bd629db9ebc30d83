//! # Server state
//!
//! `ServerState` is the registry every domain operation receives: the context
//! tree, the user registry, deferred timers, the outbox of packets waiting for
//! delivery, the persistence backend, the clock and the position policy.
//! It is owned by exactly one task (the world actor) and never shared.
//!
//! Operations live in `impl ServerState` blocks split by concern:
//! - `account` register/login/logout/delete and profile changes
//! - `world` world management, joining, leaving and room changes
//! - `movement` avatar movement, interactables and menus
//! - `chat` chat lines and typing/voice/audio relays
//! - `presence` activity refresh, timers and user-info fan-out

pub mod account;
pub mod chat;
pub mod movement;
pub mod outbox;
pub mod presence;
pub mod timers;
pub mod world;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{Config, ServerConfig, SessionConfig};
use crate::context::{ContextMap, ContextTree, MapBounds, Permission, PositionPolicy, Role};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::notification::MessageBundle;
use crate::protocol::{ChatMessage, ContextRoleUpdate, Packet};
use crate::storage::{Persistence, StoredState, WorldRecord};
use crate::user::{Location, PasswordService, User, UserRegistry};

pub use outbox::{Delivery, Outbox};
pub use timers::{TimerKind, TimerQueue};

/// Session timing and ownership knobs taken from the configuration.
#[derive(Debug, Clone)]
pub struct StateSettings {
    pub away_after: Duration,
    pub activity_refresh: Duration,
    pub account_retention: Duration,
    /// Account name that becomes Owner at the root when it registers.
    pub owner: Option<String>,
    /// Control frame ceiling; stamped chat lines must fit in one frame.
    pub max_frame_size: usize,
}

impl StateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner: config.owner.clone(),
            max_frame_size: config.server.max_frame_size,
            ..Self::from_session(&config.session)
        }
    }

    pub fn from_session(session: &SessionConfig) -> Self {
        Self {
            away_after: session.away_after(),
            activity_refresh: session.activity_refresh(),
            account_retention: session.account_retention(),
            owner: None,
            max_frame_size: ServerConfig::default().max_frame_size,
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self::from_session(&SessionConfig::default())
    }
}

pub struct ServerState {
    pub settings: StateSettings,
    pub tree: ContextTree,
    pub users: UserRegistry,
    pub timers: TimerQueue,
    pub outbox: Outbox,
    pub store: Box<dyn Persistence>,
    pub clock: Arc<dyn Clock>,
    pub positions: Box<dyn PositionPolicy>,
    pub passwords: PasswordService,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("contexts", &self.tree.len())
            .field("users", &self.users.len())
            .field("timers", &self.timers.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

impl ServerState {
    pub fn new(settings: StateSettings, store: Box<dyn Persistence>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            tree: ContextTree::new(),
            users: UserRegistry::new(),
            timers: TimerQueue::new(),
            outbox: Outbox::default(),
            store,
            clock,
            positions: Box::new(MapBounds),
            passwords: PasswordService::default(),
        }
    }

    pub fn with_passwords(mut self, passwords: PasswordService) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_position_policy(mut self, positions: Box<dyn PositionPolicy>) -> Self {
        self.positions = positions;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Rebuild worlds, accounts and relations from a persisted snapshot.
    ///
    /// Records pointing at contexts that no longer exist (private rooms are
    /// never persisted) are dropped from the store.
    pub fn restore(&mut self, stored: StoredState) {
        let now = self.now();
        for world in stored.worlds.values() {
            if let Err(e) = self.tree.insert_world(&world.name, world.map) {
                warn!("Skipping stored world {}: {}", world.id, e);
            }
        }
        for account in stored.accounts.values() {
            let mut user = User::new(
                account.id,
                account.name.clone(),
                account.password_hash.clone(),
                now,
            );
            user.avatar = account.avatar;
            user.last_logout = account.last_logout;
            let cleanup_at = account.last_logout.unwrap_or(now) + self.settings.account_retention;
            if let Err(e) = self.users.insert(user) {
                warn!("Skipping stored account {}: {}", account.name, e);
                continue;
            }
            self.timers
                .put(account.id, TimerKind::AccountCleanup, cleanup_at);
        }
        for (a, b) in &stored.friendships {
            if self.users.contains(*a) && self.users.contains(*b) {
                if let Ok(user) = self.users.get_mut(*a) {
                    user.friends.insert(*b);
                }
                if let Ok(user) = self.users.get_mut(*b) {
                    user.friends.insert(*a);
                }
            }
        }
        for (owner, ignored) in &stored.ignores {
            if let Ok(user) = self.users.get_mut(*owner) {
                user.ignored.insert(*ignored);
            }
        }
        for ((user_id, context), role) in &stored.roles {
            if !self.tree.contains(context) {
                self.store.remove_role(*user_id, context);
                continue;
            }
            if let Ok(user) = self.users.get_mut(*user_id) {
                user.roles.insert(context.clone(), role.clone());
            }
        }
        for notification in stored.notifications.values() {
            if let Ok(user) = self.users.get_mut(notification.owner) {
                user.notifications
                    .insert(notification.id, notification.clone());
            }
        }
        for (world, user) in &stored.bans {
            match self.tree.moderation_mut(world) {
                Ok(moderation) => {
                    moderation.banned.insert(*user);
                }
                Err(_) => self.store.remove_ban(world, *user),
            }
        }
        info!(
            "Restored {} worlds and {} accounts",
            self.tree.worlds().len(),
            self.users.len()
        );
    }

    /// Create a configured world unless it already exists.
    pub fn seed_world(&mut self, name: &str, map: ContextMap) -> CoreResult<ContextId> {
        if let Some(existing) = self.tree.find_child(&ContextId::root(), name) {
            return Ok(existing.id.clone());
        }
        let world = self.tree.insert_world(name, map)?;
        self.store.save_world(&WorldRecord {
            id: world.clone(),
            name: name.to_string(),
            map,
        });
        info!("Seeded world {}", world);
        Ok(world)
    }

    // Outbound packets

    /// Queue a packet for a user; dropped when the user is offline.
    pub fn send(&mut self, to: UserId, packet: impl Into<Packet>) {
        if self.users.get(to).map_or(false, |u| u.is_online()) {
            self.outbox.push(to, packet.into());
        }
    }

    pub fn send_info(&mut self, to: UserId, message: MessageBundle) {
        let at = self.now();
        self.send(to, ChatMessage::info(message, at));
    }

    pub fn send_to_all(&mut self, recipients: &[UserId], packet: impl Into<Packet>) {
        let packet = packet.into();
        for to in recipients {
            self.send(*to, packet.clone());
        }
    }

    /// Online users standing in `room`.
    pub fn room_members(&self, room: &ContextId) -> Vec<UserId> {
        self.users
            .online()
            .filter(|u| u.room() == Some(room))
            .map(|u| u.id)
            .collect()
    }

    /// Online users whose current world is `world`.
    pub fn world_members(&self, world: &ContextId) -> Vec<UserId> {
        self.users
            .online()
            .filter(|u| u.current_world.as_ref() == Some(world))
            .map(|u| u.id)
            .collect()
    }

    // Preconditions

    pub fn require_online(&self, user: UserId) -> CoreResult<&User> {
        let u = self.users.get(user)?;
        if !u.is_online() {
            return Err(CoreError::NotAuthenticated);
        }
        Ok(u)
    }

    /// Start of every mutating call: the user must be online; activity is refreshed.
    pub fn begin(&mut self, user: UserId) -> CoreResult<()> {
        self.require_online(user)?;
        self.touch(user);
        Ok(())
    }

    /// Like `begin`, additionally requiring a current world. Returns the world.
    pub fn begin_in_world(&mut self, user: UserId) -> CoreResult<ContextId> {
        self.begin(user)?;
        self.users
            .get(user)?
            .current_world
            .clone()
            .ok_or(CoreError::NotInWorld)
    }

    pub fn location(&self, user: UserId) -> CoreResult<Location> {
        self.users
            .get(user)?
            .location
            .clone()
            .ok_or(CoreError::NotInWorld)
    }

    // Permissions

    pub fn has_permission(&self, user: UserId, context: &ContextId, permission: Permission) -> bool {
        self.users
            .get(user)
            .map_or(false, |u| self.tree.has_permission(&u.roles, context, permission))
    }

    pub fn require_permission(
        &self,
        user: UserId,
        context: &ContextId,
        permission: Permission,
    ) -> CoreResult<()> {
        if self.has_permission(user, context, permission) {
            Ok(())
        } else {
            Err(CoreError::NoPermission(permission))
        }
    }

    /// Add a role, persist the resulting role set and tell the holder.
    /// Returns false when the role was already held.
    pub fn grant_role(&mut self, user: UserId, context: &ContextId, role: Role) -> CoreResult<bool> {
        let holder = self.users.get_mut(user)?;
        if !holder.grant_role(context, role) {
            return Ok(false);
        }
        let entry = holder.roles.get(context).cloned();
        if let Some(entry) = entry {
            self.store.save_role(&entry);
            self.send(
                user,
                ContextRoleUpdate {
                    user,
                    context: context.clone(),
                    roles: entry.role_list(),
                },
            );
        }
        Ok(true)
    }

    pub fn revoke_role(&mut self, user: UserId, context: &ContextId, role: Role) -> CoreResult<bool> {
        let holder = self.users.get_mut(user)?;
        if !holder.revoke_role(context, role) {
            return Ok(false);
        }
        let roles = match holder.roles.get(context).cloned() {
            Some(entry) => {
                self.store.save_role(&entry);
                entry.role_list()
            }
            None => {
                self.store.remove_role(user, context);
                Vec::new()
            }
        };
        self.send(
            user,
            ContextRoleUpdate {
                user,
                context: context.clone(),
                roles,
            },
        );
        Ok(true)
    }

    /// Remove a context subtree and every role held inside it.
    pub fn remove_contexts(&mut self, id: &ContextId) -> CoreResult<Vec<ContextId>> {
        let removed = self.tree.remove(id)?;
        let holders: Vec<UserId> = self
            .users
            .iter()
            .filter(|u| removed.iter().any(|c| u.roles.contains_key(c)))
            .map(|u| u.id)
            .collect();
        for user in holders {
            let dropped = self.users.get_mut(user)?.drop_roles_in(&removed);
            for context in dropped {
                self.store.remove_role(user, &context);
                self.send(
                    user,
                    ContextRoleUpdate {
                        user,
                        context,
                        roles: Vec::new(),
                    },
                );
            }
        }
        Ok(removed)
    }

    /// Every registered user holding `permission` at `context`, online or not.
    pub fn users_with_permission(&self, context: &ContextId, permission: Permission) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .users
            .iter()
            .filter(|u| self.tree.has_permission(&u.roles, context, permission))
            .map(|u| u.id)
            .collect();
        ids.sort();
        ids
    }
}
