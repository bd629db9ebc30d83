//! Accounts across time: idle decay, retention and restarts on sled.

mod common;

use std::sync::Arc;

use chrono::Duration;

use agora::admin::AdministrativeAction;
use agora::clock::ManualClock;
use agora::config::{StorageBackend, StorageConfig};
use agora::context::{ContextMap, Role};
use agora::error::CoreError;
use agora::ids::ContextId;
use agora::notification;
use agora::protocol::{Packet, UserInfoAction};
use agora::state::{ServerState, StateSettings};
use agora::storage::open_backend;
use agora::user::{Avatar, PasswordService, Status};

use common::{cheap_security, harbor, in_harbor, online, received, state, PASSWORD};

fn open(data_dir: &std::path::Path, clock: &ManualClock) -> ServerState {
    let config = StorageConfig {
        data_dir: data_dir.to_string_lossy().into_owned(),
        backend: StorageBackend::Sled,
    };
    let (store, stored) = open_backend(&config).expect("open sled");
    let settings = StateSettings {
        owner: Some("root".into()),
        ..StateSettings::default()
    };
    let mut state = ServerState::new(settings, store, Arc::new(clock.clone()))
        .with_passwords(PasswordService::from_config(Some(&cheap_security())));
    state.restore(stored);
    state
        .seed_world("Harbor", ContextMap::PublicPlaza)
        .expect("seed world");
    state
}

#[test]
fn accounts_and_relations_survive_a_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();

    let mut state = open(tmp.path(), &clock);
    let root = in_harbor(&mut state, "root");
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");
    state.change_avatar(ann, Avatar::Owl).unwrap();
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let request = *state.users.get(bob).unwrap().notifications.keys().next().unwrap();
    notification::accept(&mut state, bob, request).unwrap();
    AdministrativeAction::AssignModerator
        .execute(&mut state, root, ann, &[])
        .unwrap();
    AdministrativeAction::BanUser
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    for user in [root, ann, bob] {
        state.logout(user).unwrap();
    }
    state.store.flush();
    drop(state);

    let mut state = open(tmp.path(), &clock);
    assert_eq!(state.users.len(), 3);
    assert_eq!(state.tree.worlds().len(), 1);

    let restored = state.users.get(ann).unwrap();
    assert_eq!(restored.avatar, Avatar::Owl);
    assert!(restored.is_friend(bob));
    assert!(restored.holds_role(&harbor(), Role::Moderator));
    assert!(restored.last_logout.is_some());
    // the moderator grant and the ban notice
    assert_eq!(restored.notifications.len(), 2);
    assert!(state
        .users
        .get(root)
        .unwrap()
        .holds_role(&ContextId::root(), Role::Owner));

    assert_eq!(state.login("ann", PASSWORD).unwrap(), ann);
    state.login("bob", PASSWORD).unwrap();
    assert_eq!(
        state.join_world(bob, &harbor()),
        Err(CoreError::IllegalWorldAction("world.banned"))
    );
}

#[test]
fn idle_users_turn_away_for_everyone_in_the_world() {
    let (mut state, clock, _) = state();
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");
    state.outbox.drain();

    clock.advance(state.settings.away_after - Duration::seconds(10));
    state.touch(bob);
    clock.advance(Duration::seconds(11));
    assert_eq!(state.run_due_timers(), 1);
    assert_eq!(state.users.get(ann).unwrap().status, Status::Away);
    assert_eq!(state.users.get(bob).unwrap().status, Status::Online);

    let away_updates = received(&mut state, bob)
        .into_iter()
        .filter(|p| match p {
            Packet::UserInfo(info) => {
                info.action == UserInfoAction::Update
                    && info.context.as_ref() == Some(&harbor())
                    && info
                        .records
                        .iter()
                        .any(|r| r.user == ann && r.status == Some(Status::Away))
            }
            _ => false,
        })
        .count();
    assert_eq!(away_updates, 1);

    // any request brings the user back
    state.move_avatar(ann, 10.0, 25.0, false, Default::default()).unwrap();
    assert_eq!(state.users.get(ann).unwrap().status, Status::Online);
}

#[test]
fn busy_users_are_left_alone_by_the_away_timer() {
    let (mut state, clock, _) = state();
    let ann = online(&mut state, "ann");
    state.change_status(ann, Status::Busy).unwrap();
    clock.advance(state.settings.away_after + Duration::seconds(1));
    state.run_due_timers();
    assert_eq!(state.users.get(ann).unwrap().status, Status::Busy);
}

#[test]
fn abandoned_accounts_are_purged_with_their_links() {
    let (mut state, clock, store) = state();
    let ann = online(&mut state, "ann");
    let bob = online(&mut state, "bob");
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let request = *state.users.get(bob).unwrap().notifications.keys().next().unwrap();
    notification::accept(&mut state, bob, request).unwrap();
    state.logout(ann).unwrap();

    clock.advance(state.settings.account_retention - Duration::days(1));
    state.touch(bob);
    clock.advance(Duration::days(2));
    state.run_due_timers();

    assert!(!state.users.contains(ann));
    assert!(state.users.contains(bob));
    assert!(!state.users.get(bob).unwrap().is_friend(ann));
    let stored = store.snapshot();
    assert!(!stored.accounts.contains_key(&ann));
    assert!(stored.friendships.is_empty());
    assert_eq!(
        state.login("ann", PASSWORD),
        Err(CoreError::IllegalAccountAction("account.bad-credentials"))
    );
}

#[test]
fn coming_back_from_busy_restarts_the_away_clock() {
    let (mut state, clock, _) = state();
    let ann = online(&mut state, "ann");
    state.change_status(ann, Status::Busy).unwrap();
    let step = Duration::seconds(20);
    let mut waited = Duration::zero();
    // busy but active: every touch lands inside the refresh window
    while waited <= state.settings.away_after {
        clock.advance(step);
        waited = waited + step;
        state.touch(ann);
        state.run_due_timers();
    }
    assert_eq!(state.users.get(ann).unwrap().status, Status::Busy);

    clock.advance(Duration::seconds(5));
    state.change_status(ann, Status::Online).unwrap();
    clock.advance(state.settings.away_after - Duration::seconds(1));
    state.run_due_timers();
    assert_eq!(state.users.get(ann).unwrap().status, Status::Online);
    clock.advance(Duration::seconds(2));
    state.run_due_timers();
    assert_eq!(state.users.get(ann).unwrap().status, Status::Away);
}
