//! Activity tracking, deferred timers and user-info fan-out.

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::{ServerState, TimerKind};
use crate::ids::{ContextId, UserId};
use crate::protocol::{
    ContextEntry, ContextList, ContextRoleUpdate, NotificationPush, NotificationRecord, UserInfo,
    UserInfoAction, UserRecord,
};
use crate::user::Status;

impl ServerState {
    /// Record activity for `user`.
    ///
    /// `last_activity` moves on every call; the away-to-online flip and the
    /// timer rescheduling only run once `activity_refresh` has passed since
    /// the previous call.
    pub fn touch(&mut self, user: UserId) {
        let now = self.now();
        let refresh = self.settings.activity_refresh;
        let Ok(u) = self.users.get_mut(user) else {
            return;
        };
        let idle = now - u.last_activity;
        u.last_activity = now;
        if idle < refresh {
            return;
        }
        let was_away = u.status == Status::Away;
        if was_away {
            u.status = Status::Online;
        }
        self.timers
            .put(user, TimerKind::AwayDecay, now + self.settings.away_after);
        self.timers.put(
            user,
            TimerKind::AccountCleanup,
            now + self.settings.account_retention,
        );
        if was_away {
            debug!("{} is back from away", user.short());
            self.announce_presence(user);
        }
    }

    /// Fire every due timer. Returns how many fired.
    pub fn run_due_timers(&mut self) -> usize {
        let now = self.now();
        let due = self.timers.take_due(now);
        let fired = due.len();
        for (user, kind) in due {
            match kind {
                TimerKind::AwayDecay => self.decay_to_away(user, now),
                TimerKind::AccountCleanup => self.cleanup_account(user, now),
            }
        }
        fired
    }

    fn decay_to_away(&mut self, user: UserId, now: DateTime<Utc>) {
        let away_after = self.settings.away_after;
        let Ok(u) = self.users.get_mut(user) else {
            return;
        };
        if u.status != Status::Online {
            return;
        }
        let idle_since = u.last_activity;
        if now - idle_since < away_after {
            self.timers
                .put(user, TimerKind::AwayDecay, idle_since + away_after);
            return;
        }
        u.status = Status::Away;
        debug!("{} is now away", user.short());
        self.announce_presence(user);
    }

    fn cleanup_account(&mut self, user: UserId, now: DateTime<Utc>) {
        let retention = self.settings.account_retention;
        let Ok(u) = self.users.get(user) else {
            return;
        };
        if u.is_online() {
            return;
        }
        let since = u.last_logout.unwrap_or(u.last_activity);
        if now - since < retention {
            self.timers
                .put(user, TimerKind::AccountCleanup, since + retention);
            return;
        }
        info!(
            "Deleting account {} after {} days without login",
            user.short(),
            retention.num_days()
        );
        self.purge_account(user);
    }

    /// How `viewer` sees `subject`, with world moderation flags when `world` is given.
    pub fn user_record(
        &self,
        viewer: UserId,
        subject: UserId,
        world: Option<&ContextId>,
    ) -> Option<UserRecord> {
        let v = self.users.get(viewer).ok()?;
        let s = self.users.get(subject).ok()?;
        let moderation = world.and_then(|w| self.tree.moderation(w).ok());
        Some(UserRecord {
            user: s.id,
            name: Some(s.name.clone()),
            status: Some(s.status.visible()),
            avatar: Some(s.avatar),
            friend: v.is_friend(s.id),
            ignored: v.is_ignoring(s.id),
            banned: moderation.map_or(false, |m| m.banned.contains(&s.id)),
            reported: moderation.map_or(false, |m| m.reported.contains(&s.id)),
            teleportable: viewer != subject
                && crate::admin::social::teleport_destination(self, viewer, subject).is_ok(),
        })
    }

    /// Push a fresh record of `user` to its friends, its world and itself.
    pub fn announce_presence(&mut self, user: UserId) {
        let Ok(u) = self.users.get(user) else {
            return;
        };
        let mut global: Vec<UserId> = u.friends.iter().copied().collect();
        global.push(user);
        let world = u.current_world.clone();
        for viewer in global {
            self.send_record(viewer, user, None, UserInfoAction::Update);
        }
        if let Some(world) = world {
            for viewer in self.world_members(&world) {
                self.send_record(viewer, user, Some(&world), UserInfoAction::Update);
            }
        }
    }

    pub fn send_record(
        &mut self,
        viewer: UserId,
        subject: UserId,
        world: Option<&ContextId>,
        action: UserInfoAction,
    ) {
        if let Some(record) = self.user_record(viewer, subject, world) {
            self.send(
                viewer,
                UserInfo {
                    action,
                    context: world.cloned(),
                    records: vec![record],
                },
            );
        }
    }

    /// Exchange world rosters between a newcomer and the users already there.
    pub(crate) fn exchange_world_rosters(&mut self, user: UserId, world: &ContextId) {
        let peers: Vec<UserId> = self
            .world_members(world)
            .into_iter()
            .filter(|p| *p != user)
            .collect();
        let records: Vec<UserRecord> = peers
            .iter()
            .filter_map(|p| self.user_record(user, *p, Some(world)))
            .collect();
        self.send(
            user,
            UserInfo {
                action: UserInfoAction::Add,
                context: Some(world.clone()),
                records,
            },
        );
        for peer in peers {
            self.send_record(peer, user, Some(world), UserInfoAction::Add);
        }
    }

    pub fn world_list(&self) -> ContextList {
        ContextList {
            parent: Some(ContextId::root()),
            entries: self
                .tree
                .worlds()
                .into_iter()
                .map(|w| ContextEntry {
                    id: w.id.clone(),
                    name: w.name.clone(),
                    private: false,
                })
                .collect(),
        }
    }

    pub(crate) fn broadcast_world_list(&mut self) {
        let list = self.world_list();
        let online: Vec<UserId> = self.users.online().map(|u| u.id).collect();
        self.send_to_all(&online, list);
    }

    /// Everything a client needs right after login.
    pub(crate) fn send_login_snapshot(&mut self, user: UserId) {
        let list = self.world_list();
        self.send(user, list);

        let Ok(u) = self.users.get(user) else {
            return;
        };
        let roles: Vec<ContextRoleUpdate> = u
            .roles
            .values()
            .map(|r| ContextRoleUpdate {
                user,
                context: r.context.clone(),
                roles: r.role_list(),
            })
            .collect();
        let friends: Vec<UserId> = u.friends.iter().copied().collect();
        let notifications: Vec<NotificationRecord> =
            u.notifications.values().map(NotificationRecord::from).collect();

        for update in roles {
            self.send(user, update);
        }
        let records: Vec<UserRecord> = friends
            .iter()
            .filter_map(|f| self.user_record(user, *f, None))
            .collect();
        self.send(
            user,
            UserInfo {
                action: UserInfoAction::Add,
                context: None,
                records,
            },
        );
        if !notifications.is_empty() {
            self.send(
                user,
                NotificationPush {
                    records: notifications,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::Packet;
    use chrono::Duration;

    #[test]
    fn idle_user_decays_to_away_and_comes_back() {
        let (mut state, clock, _) = state();
        let ann = online(&mut state, "ann");
        clock.advance(Duration::seconds(299));
        state.run_due_timers();
        assert_eq!(state.users.get(ann).unwrap().status, Status::Online);

        clock.advance(Duration::seconds(2));
        state.run_due_timers();
        assert_eq!(state.users.get(ann).unwrap().status, Status::Away);

        state.begin(ann).unwrap();
        assert_eq!(state.users.get(ann).unwrap().status, Status::Online);
    }

    #[test]
    fn quick_successive_calls_do_not_reschedule() {
        let (mut state, clock, _) = state();
        let ann = online(&mut state, "ann");
        let first = state.timers.deadline(ann, TimerKind::AwayDecay).unwrap();
        clock.advance(Duration::seconds(10));
        state.begin(ann).unwrap();
        assert_eq!(state.timers.deadline(ann, TimerKind::AwayDecay), Some(first));
        clock.advance(Duration::seconds(31));
        state.begin(ann).unwrap();
        assert!(state.timers.deadline(ann, TimerKind::AwayDecay).unwrap() > first);
    }

    #[test]
    fn activity_inside_refresh_window_still_postpones_away() {
        let (mut state, clock, _) = state();
        let ann = online(&mut state, "ann");
        for _ in 0..20 {
            clock.advance(Duration::seconds(20));
            state.begin(ann).unwrap();
            state.run_due_timers();
        }
        assert_eq!(state.users.get(ann).unwrap().status, Status::Online);
    }

    #[test]
    fn stale_accounts_are_deleted() {
        let (mut state, clock, store) = state();
        let ann = online(&mut state, "ann");
        state.logout(ann).unwrap();
        clock.advance(Duration::days(179));
        state.run_due_timers();
        assert!(state.users.contains(ann));
        clock.advance(Duration::days(2));
        state.run_due_timers();
        assert!(!state.users.contains(ann));
        assert!(!store.snapshot().accounts.contains_key(&ann));
    }

    #[test]
    fn login_snapshot_lists_worlds() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let packets = state.outbox.take_for(ann);
        assert!(packets.iter().any(|p| matches!(
            p,
            Packet::ContextList(list) if list.entries.iter().any(|e| e.name == "Harbor")
        )));
    }
}
