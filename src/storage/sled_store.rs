use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::IVec;

use super::{
    friendship_key, AccountRecord, Persistence, StorageError, StoredState, WorldRecord,
};
use crate::context::ContextRole;
use crate::ids::{ContextId, NotificationId, UserId};
use crate::notification::Notification;
use crate::user::Avatar;

const TREE_PRIMARY: &str = "agora";

const PREFIX_ACCOUNT: &str = "account:";
const PREFIX_FRIEND: &str = "friend:";
const PREFIX_IGNORE: &str = "ignore:";
const PREFIX_ROLE: &str = "role:";
const PREFIX_NOTIFICATION: &str = "notification:";
const PREFIX_WORLD: &str = "world:";
const PREFIX_BAN: &str = "ban:";

/// Sled-backed persistence. All records live in one tree under string prefixes.
pub struct SledStore {
    _db: sled::Db,
    primary: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let primary = db.open_tree(TREE_PRIMARY)?;
        Ok(Self { _db: db, primary })
    }

    fn account_key(user: UserId) -> Vec<u8> {
        format!("{PREFIX_ACCOUNT}{user}").into_bytes()
    }

    fn friend_key(a: UserId, b: UserId) -> Vec<u8> {
        let (a, b) = friendship_key(a, b);
        format!("{PREFIX_FRIEND}{a}:{b}").into_bytes()
    }

    fn ignore_key(user: UserId, ignored: UserId) -> Vec<u8> {
        format!("{PREFIX_IGNORE}{user}:{ignored}").into_bytes()
    }

    fn role_key(user: UserId, context: &ContextId) -> Vec<u8> {
        format!("{PREFIX_ROLE}{user}:{context}").into_bytes()
    }

    fn notification_key(owner: UserId, id: NotificationId) -> Vec<u8> {
        format!("{PREFIX_NOTIFICATION}{owner}:{id}").into_bytes()
    }

    fn world_key(world: &ContextId) -> Vec<u8> {
        format!("{PREFIX_WORLD}{world}").into_bytes()
    }

    fn ban_key(world: &ContextId, user: UserId) -> Vec<u8> {
        format!("{PREFIX_BAN}{world}:{user}").into_bytes()
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: DeserializeOwned>(bytes: &IVec) -> Result<T, StorageError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn put<T: Serialize>(&self, key: Vec<u8>, value: &T) -> Result<(), StorageError> {
        self.primary.insert(key, Self::serialize(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(IVec, T)>, StorageError> {
        let mut out = Vec::new();
        for entry in self.primary.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            out.push((key, Self::deserialize(&value)?));
        }
        Ok(out)
    }

    /// Remove every record under `prefix` whose value matches `pred`.
    fn remove_where<T: DeserializeOwned>(
        &self,
        prefix: &str,
        pred: impl Fn(&T) -> bool,
    ) -> Result<usize, StorageError> {
        let mut removed = 0;
        for (key, value) in self.scan::<T>(prefix)? {
            if pred(&value) {
                self.primary.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn update_account(
        &self,
        user: UserId,
        f: impl FnOnce(&mut AccountRecord),
    ) -> Result<(), StorageError> {
        let key = Self::account_key(user);
        if let Some(raw) = self.primary.get(&key)? {
            let mut account: AccountRecord = Self::deserialize(&raw)?;
            f(&mut account);
            self.put(key, &account)?;
        }
        Ok(())
    }

    fn purge_account(&self, user: UserId) -> Result<(), StorageError> {
        self.primary.remove(Self::account_key(user))?;
        self.remove_where::<(UserId, UserId)>(PREFIX_FRIEND, |(a, b)| *a == user || *b == user)?;
        self.remove_where::<(UserId, UserId)>(PREFIX_IGNORE, |(a, b)| *a == user || *b == user)?;
        self.remove_where::<ContextRole>(&format!("{PREFIX_ROLE}{user}:"), |_| true)?;
        self.remove_where::<Notification>(&format!("{PREFIX_NOTIFICATION}{user}:"), |_| true)?;
        self.remove_where::<(ContextId, UserId)>(PREFIX_BAN, |(_, u)| *u == user)?;
        Ok(())
    }

    fn purge_world(&self, world: &ContextId) -> Result<(), StorageError> {
        self.primary.remove(Self::world_key(world))?;
        self.remove_where::<(ContextId, UserId)>(PREFIX_BAN, |(w, _)| w == world)?;
        Ok(())
    }

    /// Load everything persisted so far.
    pub fn snapshot(&self) -> Result<StoredState, StorageError> {
        let mut state = StoredState::default();
        for (_, a) in self.scan::<AccountRecord>(PREFIX_ACCOUNT)? {
            state.accounts.insert(a.id, a);
        }
        for (_, pair) in self.scan::<(UserId, UserId)>(PREFIX_FRIEND)? {
            state.friendships.insert(pair);
        }
        for (_, pair) in self.scan::<(UserId, UserId)>(PREFIX_IGNORE)? {
            state.ignores.insert(pair);
        }
        for (_, role) in self.scan::<ContextRole>(PREFIX_ROLE)? {
            state.roles.insert((role.user, role.context.clone()), role);
        }
        for (_, n) in self.scan::<Notification>(PREFIX_NOTIFICATION)? {
            state.notifications.insert(n.id, n);
        }
        for (_, w) in self.scan::<WorldRecord>(PREFIX_WORLD)? {
            state.worlds.insert(w.id.clone(), w);
        }
        for (_, ban) in self.scan::<(ContextId, UserId)>(PREFIX_BAN)? {
            state.bans.insert(ban);
        }
        Ok(state)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.primary.flush()?;
        Ok(())
    }
}

fn report(op: &str, result: Result<(), StorageError>) {
    if let Err(e) = result {
        log::warn!("storage {op} failed: {e}");
    }
}

impl Persistence for SledStore {
    fn save_account(&self, account: &AccountRecord) {
        report("save_account", self.put(Self::account_key(account.id), account));
    }

    fn delete_account(&self, user: UserId) {
        report("delete_account", self.purge_account(user));
    }

    fn save_password(&self, user: UserId, hash: &str) {
        report(
            "save_password",
            self.update_account(user, |a| a.password_hash = hash.to_string()),
        );
    }

    fn save_avatar(&self, user: UserId, avatar: Avatar) {
        report("save_avatar", self.update_account(user, |a| a.avatar = avatar));
    }

    fn save_last_logout(&self, user: UserId, at: DateTime<Utc>) {
        report(
            "save_last_logout",
            self.update_account(user, |a| a.last_logout = Some(at)),
        );
    }

    fn add_friendship(&self, a: UserId, b: UserId) {
        report(
            "add_friendship",
            self.put(Self::friend_key(a, b), &friendship_key(a, b)),
        );
    }

    fn remove_friendship(&self, a: UserId, b: UserId) {
        report(
            "remove_friendship",
            self.primary
                .remove(Self::friend_key(a, b))
                .map(|_| ())
                .map_err(StorageError::from),
        );
    }

    fn add_ignore(&self, user: UserId, ignored: UserId) {
        report(
            "add_ignore",
            self.put(Self::ignore_key(user, ignored), &(user, ignored)),
        );
    }

    fn remove_ignore(&self, user: UserId, ignored: UserId) {
        report(
            "remove_ignore",
            self.primary
                .remove(Self::ignore_key(user, ignored))
                .map(|_| ())
                .map_err(StorageError::from),
        );
    }

    fn save_role(&self, role: &ContextRole) {
        report("save_role", self.put(Self::role_key(role.user, &role.context), role));
    }

    fn remove_role(&self, user: UserId, context: &ContextId) {
        report(
            "remove_role",
            self.primary
                .remove(Self::role_key(user, context))
                .map(|_| ())
                .map_err(StorageError::from),
        );
    }

    fn save_notification(&self, notification: &Notification) {
        report(
            "save_notification",
            self.put(
                Self::notification_key(notification.owner, notification.id),
                notification,
            ),
        );
    }

    fn delete_notification(&self, owner: UserId, id: NotificationId) {
        report(
            "delete_notification",
            self.primary
                .remove(Self::notification_key(owner, id))
                .map(|_| ())
                .map_err(StorageError::from),
        );
    }

    fn save_world(&self, world: &WorldRecord) {
        report("save_world", self.put(Self::world_key(&world.id), world));
    }

    fn delete_world(&self, world: &ContextId) {
        report("delete_world", self.purge_world(world));
    }

    fn add_ban(&self, world: &ContextId, user: UserId) {
        report(
            "add_ban",
            self.put(Self::ban_key(world, user), &(world.clone(), user)),
        );
    }

    fn remove_ban(&self, world: &ContextId, user: UserId) {
        report(
            "remove_ban",
            self.primary
                .remove(Self::ban_key(world, user))
                .map(|_| ())
                .map_err(StorageError::from),
        );
    }

    fn flush(&self) {
        report(
            "flush",
            self.primary.flush().map(|_| ()).map_err(StorageError::from),
        );
    }
}
