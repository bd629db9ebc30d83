//! Accounts and per-user session state.

pub mod password;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::context::{ContextRole, Role};
use crate::ids::{ContextId, NotificationId, UserId};
use crate::notification::Notification;
use crate::protocol::codec::WireEnum;

pub use password::PasswordService;
pub use registry::UserRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Online,
    Away,
    Busy,
    Invisible,
    Offline,
}

impl WireEnum for Status {
    const NAME: &'static str = "Status";
    const VARIANTS: &'static [Self] = &[
        Status::Online,
        Status::Away,
        Status::Busy,
        Status::Invisible,
        Status::Offline,
    ];
}

impl Status {
    /// Status as seen by other users.
    pub fn visible(self) -> Status {
        match self {
            Status::Invisible => Status::Offline,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Avatar {
    #[default]
    Fox,
    Owl,
    Cat,
    Bear,
}

impl WireEnum for Avatar {
    const NAME: &'static str = "Avatar";
    const VARIANTS: &'static [Self] = &[Avatar::Fox, Avatar::Owl, Avatar::Cat, Avatar::Bear];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    #[default]
    Down,
    Left,
}

impl WireEnum for Direction {
    const NAME: &'static str = "Direction";
    const VARIANTS: &'static [Self] = &[
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];
}

/// Where an avatar stands while its user is in a world.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub room: ContextId,
    /// Deepest area containing the position (the room when none does).
    pub area: ContextId,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub password_hash: String,
    pub status: Status,
    pub avatar: Avatar,
    pub last_activity: DateTime<Utc>,
    pub last_logout: Option<DateTime<Utc>>,
    pub current_world: Option<ContextId>,
    pub location: Option<Location>,
    pub interactable: Option<ContextId>,
    pub moveable: bool,
    pub friends: HashSet<UserId>,
    pub ignored: HashSet<UserId>,
    pub roles: HashMap<ContextId, ContextRole>,
    pub notifications: BTreeMap<NotificationId, Notification>,
}

impl User {
    pub fn new(id: UserId, name: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            password_hash,
            status: Status::Offline,
            avatar: Avatar::default(),
            last_activity: now,
            last_logout: None,
            current_world: None,
            location: None,
            interactable: None,
            moveable: true,
            friends: HashSet::new(),
            ignored: HashSet::new(),
            roles: HashMap::new(),
            notifications: BTreeMap::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status != Status::Offline
    }

    pub fn is_friend(&self, other: UserId) -> bool {
        self.friends.contains(&other)
    }

    pub fn is_ignoring(&self, other: UserId) -> bool {
        self.ignored.contains(&other)
    }

    pub fn room(&self) -> Option<&ContextId> {
        self.location.as_ref().map(|l| &l.room)
    }

    pub fn area(&self) -> Option<&ContextId> {
        self.location.as_ref().map(|l| &l.area)
    }

    /// Add a role at a context. Returns false if it was already held there.
    pub fn grant_role(&mut self, context: &ContextId, role: Role) -> bool {
        match self.roles.get_mut(context) {
            Some(existing) => existing.roles.insert(role),
            None => {
                self.roles
                    .insert(context.clone(), ContextRole::new(self.id, context.clone(), role));
                true
            }
        }
    }

    /// Remove a role; the context entry disappears once no role is left.
    pub fn revoke_role(&mut self, context: &ContextId, role: Role) -> bool {
        let Some(existing) = self.roles.get_mut(context) else {
            return false;
        };
        let removed = existing.roles.remove(&role);
        if existing.is_empty() {
            self.roles.remove(context);
        }
        removed
    }

    pub fn holds_role(&self, context: &ContextId, role: Role) -> bool {
        self.roles
            .get(context)
            .map_or(false, |r| r.roles.contains(&role))
    }

    /// Drop every role held at any of `contexts`.
    pub fn drop_roles_in(&mut self, contexts: &[ContextId]) -> Vec<ContextId> {
        let mut dropped = Vec::new();
        for ctx in contexts {
            if self.roles.remove(ctx).is_some() {
                dropped.push(ctx.clone());
            }
        }
        dropped
    }

    /// Forget world-bound transient state.
    pub fn clear_location(&mut self) {
        self.current_world = None;
        self.location = None;
        self.interactable = None;
        self.moveable = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(UserId::generate(), "ann".into(), String::new(), Utc::now())
    }

    #[test]
    fn role_entry_is_dropped_when_empty() {
        let mut u = user();
        let ctx = ContextId::root();
        assert!(u.grant_role(&ctx, Role::Moderator));
        assert!(!u.grant_role(&ctx, Role::Moderator));
        assert!(u.grant_role(&ctx, Role::Bot));
        assert!(u.revoke_role(&ctx, Role::Moderator));
        assert!(u.roles.contains_key(&ctx));
        assert!(u.revoke_role(&ctx, Role::Bot));
        assert!(!u.roles.contains_key(&ctx));
        assert!(!u.revoke_role(&ctx, Role::Bot));
    }

    #[test]
    fn invisible_users_look_offline() {
        assert_eq!(Status::Invisible.visible(), Status::Offline);
        assert_eq!(Status::Busy.visible(), Status::Busy);
    }

    #[test]
    fn new_user_is_offline_and_moveable() {
        let u = user();
        assert!(!u.is_online());
        assert!(u.moveable);
        assert!(u.location.is_none());
    }
}
