//! # Persistence
//!
//! The core never reads from storage while running: every mutation is
//! reported through the fire-and-forget [`Persistence`] trait and the whole
//! state is hydrated once at startup from a [`StoredState`] snapshot.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`] keeps everything in a shared in-process snapshot (tests,
//!   `backend = "memory"`).
//! - [`SledStore`] writes bincode records into a sled database under
//!   `<data_dir>/agora`.

pub mod sled_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::context::{ContextMap, ContextRole};
use crate::ids::{ContextId, NotificationId, UserId};
use crate::notification::Notification;
use crate::user::Avatar;

pub use sled_store::SledStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: UserId,
    pub name: String,
    pub password_hash: String,
    pub avatar: Avatar,
    pub last_logout: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRecord {
    pub id: ContextId,
    pub name: String,
    pub map: ContextMap,
}

/// Order a friendship pair so both directions share one key.
pub fn friendship_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Everything the core persists, as loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub accounts: BTreeMap<UserId, AccountRecord>,
    pub friendships: BTreeSet<(UserId, UserId)>,
    /// `(user, ignored)`
    pub ignores: BTreeSet<(UserId, UserId)>,
    pub roles: BTreeMap<(UserId, ContextId), ContextRole>,
    pub notifications: BTreeMap<NotificationId, Notification>,
    pub worlds: BTreeMap<ContextId, WorldRecord>,
    /// `(world, user)`
    pub bans: BTreeSet<(ContextId, UserId)>,
}

/// Fire-and-forget store contract. Implementations log their own failures.
pub trait Persistence: Send {
    fn save_account(&self, account: &AccountRecord);
    /// Drop the account and every record owned by it.
    fn delete_account(&self, user: UserId);
    fn save_password(&self, user: UserId, hash: &str);
    fn save_avatar(&self, user: UserId, avatar: Avatar);
    fn save_last_logout(&self, user: UserId, at: DateTime<Utc>);
    fn add_friendship(&self, a: UserId, b: UserId);
    fn remove_friendship(&self, a: UserId, b: UserId);
    fn add_ignore(&self, user: UserId, ignored: UserId);
    fn remove_ignore(&self, user: UserId, ignored: UserId);
    /// Store the full role set for `(role.user, role.context)`.
    fn save_role(&self, role: &ContextRole);
    fn remove_role(&self, user: UserId, context: &ContextId);
    fn save_notification(&self, notification: &Notification);
    fn delete_notification(&self, owner: UserId, id: NotificationId);
    fn save_world(&self, world: &WorldRecord);
    /// Drop the world together with its bans.
    fn delete_world(&self, world: &ContextId);
    fn add_ban(&self, world: &ContextId, user: UserId);
    fn remove_ban(&self, world: &ContextId, user: UserId);
    /// Push buffered writes to disk.
    fn flush(&self) {}
}

impl StoredState {
    fn purge_account(&mut self, user: UserId) {
        self.accounts.remove(&user);
        self.friendships.retain(|(a, b)| *a != user && *b != user);
        self.ignores.retain(|(a, b)| *a != user && *b != user);
        self.roles.retain(|(u, _), _| *u != user);
        self.notifications.retain(|_, n| n.owner != user);
        self.bans.retain(|(_, u)| *u != user);
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Open the configured backend together with everything it already holds.
pub fn open_backend(
    config: &StorageConfig,
) -> Result<(Box<dyn Persistence>, StoredState), StorageError> {
    match config.backend {
        StorageBackend::Sled => {
            let store = SledStore::open(config.sled_path())?;
            let stored = store.snapshot()?;
            Ok((Box::new(store), stored))
        }
        StorageBackend::Memory => Ok((Box::new(MemoryStore::new()), StoredState::default())),
    }
}

/// In-process backend sharing one snapshot between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoredState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoredState {
        self.inner.lock().expect("memory store mutex poisoned").clone()
    }

    fn with<F: FnOnce(&mut StoredState)>(&self, f: F) {
        let mut guard = self.inner.lock().expect("memory store mutex poisoned");
        f(&mut guard);
    }
}

impl Persistence for MemoryStore {
    fn save_account(&self, account: &AccountRecord) {
        self.with(|s| {
            s.accounts.insert(account.id, account.clone());
        });
    }

    fn delete_account(&self, user: UserId) {
        self.with(|s| s.purge_account(user));
    }

    fn save_password(&self, user: UserId, hash: &str) {
        self.with(|s| {
            if let Some(a) = s.accounts.get_mut(&user) {
                a.password_hash = hash.to_string();
            }
        });
    }

    fn save_avatar(&self, user: UserId, avatar: Avatar) {
        self.with(|s| {
            if let Some(a) = s.accounts.get_mut(&user) {
                a.avatar = avatar;
            }
        });
    }

    fn save_last_logout(&self, user: UserId, at: DateTime<Utc>) {
        self.with(|s| {
            if let Some(a) = s.accounts.get_mut(&user) {
                a.last_logout = Some(at);
            }
        });
    }

    fn add_friendship(&self, a: UserId, b: UserId) {
        self.with(|s| {
            s.friendships.insert(friendship_key(a, b));
        });
    }

    fn remove_friendship(&self, a: UserId, b: UserId) {
        self.with(|s| {
            s.friendships.remove(&friendship_key(a, b));
        });
    }

    fn add_ignore(&self, user: UserId, ignored: UserId) {
        self.with(|s| {
            s.ignores.insert((user, ignored));
        });
    }

    fn remove_ignore(&self, user: UserId, ignored: UserId) {
        self.with(|s| {
            s.ignores.remove(&(user, ignored));
        });
    }

    fn save_role(&self, role: &ContextRole) {
        self.with(|s| {
            s.roles
                .insert((role.user, role.context.clone()), role.clone());
        });
    }

    fn remove_role(&self, user: UserId, context: &ContextId) {
        self.with(|s| {
            s.roles.remove(&(user, context.clone()));
        });
    }

    fn save_notification(&self, notification: &Notification) {
        self.with(|s| {
            s.notifications
                .insert(notification.id, notification.clone());
        });
    }

    fn delete_notification(&self, _owner: UserId, id: NotificationId) {
        self.with(|s| {
            s.notifications.remove(&id);
        });
    }

    fn save_world(&self, world: &WorldRecord) {
        self.with(|s| {
            s.worlds.insert(world.id.clone(), world.clone());
        });
    }

    fn delete_world(&self, world: &ContextId) {
        self.with(|s| {
            s.worlds.remove(world);
            s.bans.retain(|(w, _)| w != world);
        });
    }

    fn add_ban(&self, world: &ContextId, user: UserId) {
        self.with(|s| {
            s.bans.insert((world.clone(), user));
        });
    }

    fn remove_ban(&self, world: &ContextId, user: UserId) {
        self.with(|s| {
            s.bans.remove(&(world.clone(), user));
        });
    }
}
