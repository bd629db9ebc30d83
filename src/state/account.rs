//! Account lifecycle: register, login, logout, delete and profile changes.

use log::{info, warn};

use super::{ServerState, TimerKind};
use crate::context::Role;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::logutil::{escape_log, sec_log};
use crate::notification::NotificationKind;
use crate::protocol::{UserInfo, UserInfoAction, UserRecord};
use crate::storage::AccountRecord;
use crate::user::{Avatar, Status, User};
use crate::validation::{validate_password, validate_user_name};

const BAD_CREDENTIALS: CoreError = CoreError::IllegalAccountAction("account.bad-credentials");

impl ServerState {
    /// Create an offline account. The configured owner name receives the
    /// Owner role at the global root.
    pub fn register(&mut self, name: &str, password: &str) -> CoreResult<UserId> {
        let name = validate_user_name(name)
            .map_err(|e| CoreError::IllegalAccountAction(e.message_key()))?;
        validate_password(password)
            .map_err(|e| CoreError::IllegalAccountAction(e.message_key()))?;
        if self.users.id_by_name(&name).is_some() {
            return Err(CoreError::IllegalAccountAction("account.name-taken"));
        }
        let hash = self.passwords.hash(password).map_err(|e| {
            warn!("Hashing password for {} failed: {}", escape_log(&name), e);
            CoreError::IllegalAccountAction("account.hash-failed")
        })?;

        let now = self.now();
        let id = UserId::generate();
        let user = User::new(id, name.clone(), hash, now);
        let record = AccountRecord {
            id,
            name: name.clone(),
            password_hash: user.password_hash.clone(),
            avatar: user.avatar,
            last_logout: None,
        };
        self.users.insert(user)?;
        self.store.save_account(&record);
        self.timers.put(
            id,
            TimerKind::AccountCleanup,
            now + self.settings.account_retention,
        );

        let is_owner = self
            .settings
            .owner
            .as_deref()
            .map_or(false, |owner| owner.eq_ignore_ascii_case(&name));
        if is_owner {
            self.grant_role(id, &ContextId::root(), Role::Owner)?;
            sec_log!("Owner role granted to new account {}", escape_log(&name));
        }
        info!("Registered account {} ({})", escape_log(&name), id.short());
        Ok(id)
    }

    pub fn login(&mut self, name: &str, password: &str) -> CoreResult<UserId> {
        let Some(id) = self.users.id_by_name(name.trim()) else {
            sec_log!("Login for unknown account {}", escape_log(name));
            return Err(BAD_CREDENTIALS);
        };
        let user = self.users.get(id)?;
        if !self.passwords.verify(password, &user.password_hash) {
            sec_log!("Wrong password for {}", escape_log(&user.name));
            return Err(BAD_CREDENTIALS);
        }
        if user.is_online() {
            return Err(CoreError::IllegalAccountAction("account.already-online"));
        }

        let now = self.now();
        let user = self.users.get_mut(id)?;
        user.clear_location();
        user.status = Status::Online;
        user.last_activity = now;
        self.timers
            .put(id, TimerKind::AwayDecay, now + self.settings.away_after);
        self.timers.put(
            id,
            TimerKind::AccountCleanup,
            now + self.settings.account_retention,
        );
        self.send_login_snapshot(id);
        self.announce_presence(id);
        info!("{} logged in", id.short());
        Ok(id)
    }

    pub fn logout(&mut self, user: UserId) -> CoreResult<()> {
        self.require_online(user)?;
        self.go_offline(user);
        Ok(())
    }

    /// Connection loss. A no-op for users that already logged out.
    pub fn disconnect(&mut self, user: UserId) {
        if self.require_online(user).is_ok() {
            self.go_offline(user);
        }
    }

    fn go_offline(&mut self, user: UserId) {
        self.leave_world_inner(user);
        let now = self.now();
        let Ok(u) = self.users.get_mut(user) else {
            return;
        };
        u.status = Status::Offline;
        u.last_logout = Some(now);
        u.clear_location();
        self.store.save_last_logout(user, now);
        self.timers.cancel(user, TimerKind::AwayDecay);
        self.timers.put(
            user,
            TimerKind::AccountCleanup,
            now + self.settings.account_retention,
        );
        self.announce_presence(user);
        info!("{} went offline", user.short());
    }

    /// Delete the caller's own account after re-checking the password.
    pub fn delete_account(&mut self, user: UserId, password: &str) -> CoreResult<()> {
        self.begin(user)?;
        let stored = &self.users.get(user)?.password_hash;
        if !self.passwords.verify(password, stored) {
            return Err(CoreError::IllegalAccountAction("account.wrong-password"));
        }
        self.go_offline(user);
        self.purge_account(user);
        Ok(())
    }

    /// Drop an account and every reference other users hold to it.
    pub(crate) fn purge_account(&mut self, user: UserId) {
        let Some(removed) = self.users.remove(user) else {
            return;
        };
        self.timers.cancel_all(user);

        let mut stale_requests = Vec::new();
        for other in self.users.iter_mut() {
            other.friends.remove(&user);
            other.ignored.remove(&user);
            let owner = other.id;
            other.notifications.retain(|id, n| {
                let stale = match &n.kind {
                    NotificationKind::FriendRequest { requester } => *requester == user,
                    NotificationKind::RoomInvitation { inviter, .. } => *inviter == user,
                    NotificationKind::Info => false,
                };
                if stale {
                    stale_requests.push((owner, *id));
                }
                !stale
            });
        }
        for (owner, id) in stale_requests {
            self.store.delete_notification(owner, id);
        }
        for friend in &removed.friends {
            self.send(
                *friend,
                UserInfo {
                    action: UserInfoAction::Remove,
                    context: None,
                    records: vec![UserRecord::bare(user)],
                },
            );
        }
        self.store.delete_account(user);
        info!("Deleted account {} ({})", escape_log(&removed.name), user.short());
    }

    pub fn change_password(&mut self, user: UserId, old: &str, new: &str) -> CoreResult<()> {
        self.begin(user)?;
        let stored = &self.users.get(user)?.password_hash;
        if !self.passwords.verify(old, stored) {
            return Err(CoreError::IllegalAccountAction("account.wrong-password"));
        }
        validate_password(new).map_err(|e| CoreError::IllegalAccountAction(e.message_key()))?;
        let hash = self.passwords.hash(new).map_err(|e| {
            warn!("Hashing new password for {} failed: {}", user.short(), e);
            CoreError::IllegalAccountAction("account.hash-failed")
        })?;
        self.store.save_password(user, &hash);
        self.users.get_mut(user)?.password_hash = hash;
        sec_log!("Password changed for {}", user.short());
        Ok(())
    }

    pub fn change_avatar(&mut self, user: UserId, avatar: Avatar) -> CoreResult<()> {
        self.begin(user)?;
        self.users.get_mut(user)?.avatar = avatar;
        self.store.save_avatar(user, avatar);
        self.announce_presence(user);
        Ok(())
    }

    /// Offline is reserved for logout and disconnect.
    pub fn change_status(&mut self, user: UserId, status: Status) -> CoreResult<()> {
        if status == Status::Offline {
            return Err(CoreError::IllegalAccountAction("account.status-offline"));
        }
        self.begin(user)?;
        let u = self.users.get_mut(user)?;
        if u.status == status {
            return Ok(());
        }
        u.status = status;
        if status == Status::Online {
            // the decay timer is dropped while busy or invisible
            let at = u.last_activity + self.settings.away_after;
            self.timers.put(user, TimerKind::AwayDecay, at);
        }
        self.announce_presence(user);
        Ok(())
    }
}
