//! Moderation flows across roles: reports, bans, mutes and role grants.

mod common;

use std::collections::BTreeSet;

use agora::admin::moderation::ban_recipients;
use agora::admin::AdministrativeAction;
use agora::context::{Permission, Role};
use agora::error::CoreError;
use agora::ids::{ContextId, UserId};
use agora::protocol::{ChatBody, ChatKind, ChatMessage};
use agora::user::Direction;

use common::{harbor, in_harbor, plaza, state};

fn say(text: &str) -> ChatMessage {
    ChatMessage {
        sender: None,
        kind: ChatKind::Standard,
        body: ChatBody::Text(text.into()),
        timestamp: None,
        image: None,
    }
}

fn set(ids: &[UserId]) -> BTreeSet<UserId> {
    ids.iter().copied().collect()
}

fn keys(state: &agora::state::ServerState, user: UserId) -> Vec<String> {
    state
        .users
        .get(user)
        .unwrap()
        .notifications
        .values()
        .map(|n| n.message.key.clone())
        .collect()
}

#[test]
fn ban_notifications_follow_the_target_rank() {
    let (mut state, _, _) = state();
    let root = in_harbor(&mut state, "root");
    let mo = in_harbor(&mut state, "mo");
    let adm = in_harbor(&mut state, "adm");
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");

    AdministrativeAction::AssignModerator
        .execute(&mut state, root, mo, &[])
        .unwrap();
    AdministrativeAction::AssignAdministrator
        .execute(&mut state, root, adm, &[])
        .unwrap();

    // plain target: ban-moderator holders plus ban-user holders
    assert_eq!(
        set(&ban_recipients(&state, &harbor(), bob)),
        set(&[root, mo, adm])
    );
    // administrator target: only those who may ban moderators
    assert_eq!(set(&ban_recipients(&state, &harbor(), adm)), set(&[root]));

    AdministrativeAction::ReportUser
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    assert!(keys(&state, mo).contains(&"moderation.reported".to_string()));
    assert!(keys(&state, ann).is_empty());

    AdministrativeAction::BanUser
        .execute(&mut state, mo, bob, &[])
        .unwrap();
    for user in [root, mo, adm] {
        assert!(keys(&state, user).contains(&"moderation.banned".to_string()));
    }
    assert!(state.users.get(bob).unwrap().current_world.is_none());
    assert!(!state.world_members(&harbor()).contains(&bob));

    assert_eq!(
        AdministrativeAction::BanUser.execute(&mut state, mo, adm, &[]),
        Err(CoreError::NoPermission(Permission::BanModerator))
    );
    assert_eq!(
        AdministrativeAction::ReportUser.execute(&mut state, ann, adm, &[]),
        Err(CoreError::NoPermission(Permission::BanModerator))
    );
}

#[test]
fn unban_lets_the_user_back_in() {
    let (mut state, _, store) = state();
    let root = in_harbor(&mut state, "root");
    let bob = in_harbor(&mut state, "bob");
    AdministrativeAction::BanUser
        .execute(&mut state, root, bob, &[])
        .unwrap();
    AdministrativeAction::UnbanUser
        .execute(&mut state, root, bob, &[])
        .unwrap();
    assert!(store.snapshot().bans.is_empty());
    state.join_world(bob, &harbor()).unwrap();
    assert_eq!(
        AdministrativeAction::UnbanUser.execute(&mut state, root, bob, &[]),
        Err(CoreError::IllegalState("ban.not-banned"))
    );
}

#[test]
fn mute_lands_on_the_shared_context_and_silences_the_target() {
    let (mut state, _, _) = state();
    let root = in_harbor(&mut state, "root");
    let mo = in_harbor(&mut state, "mo");
    let bob = in_harbor(&mut state, "bob");
    AdministrativeAction::AssignModerator
        .execute(&mut state, root, mo, &[])
        .unwrap();

    // mo stays in the lobby, bob walks into the park
    state.move_avatar(bob, 30.0, 10.0, false, Direction::Up).unwrap();
    assert_eq!(state.location(bob).unwrap().area, plaza().child("Park"));

    AdministrativeAction::MuteUser
        .execute(&mut state, mo, bob, &[])
        .unwrap();
    assert!(state.tree.is_muted(bob, &plaza().child("Park")));
    assert!(state.tree.is_muted(bob, &plaza().child("Lobby")));
    assert_eq!(state.tree.highest_mute(bob, &plaza().child("Park")), Some(plaza()));
    assert_eq!(
        state.chat(bob, &say("hello?")),
        Err(CoreError::IllegalState("chat.muted"))
    );
    state.chat(mo, &say("behave")).unwrap();

    AdministrativeAction::UnmuteUser
        .execute(&mut state, mo, bob, &[])
        .unwrap();
    state.chat(bob, &say("sorry")).unwrap();
}

#[test]
fn administrators_are_appointed_at_the_root() {
    let (mut state, _, store) = state();
    let root = in_harbor(&mut state, "root");
    let adm = in_harbor(&mut state, "adm");
    AdministrativeAction::AssignAdministrator
        .execute(&mut state, root, adm, &[])
        .unwrap();

    let user = state.users.get(adm).unwrap();
    assert!(user.holds_role(&ContextId::root(), Role::Administrator));
    assert_eq!(
        user.notifications.values().next().map(|n| n.context.clone()),
        Some(ContextId::root())
    );
    assert!(store
        .snapshot()
        .roles
        .contains_key(&(adm, ContextId::root())));
    assert!(state.has_permission(adm, &plaza().child("Park"), Permission::BanModerator));

    AdministrativeAction::WithdrawAdministrator
        .execute(&mut state, root, adm, &[])
        .unwrap();
    assert!(!state.has_permission(adm, &harbor(), Permission::BanUser));
    assert!(!store
        .snapshot()
        .roles
        .contains_key(&(adm, ContextId::root())));
}

#[test]
fn teleport_between_friends_needs_no_permission() {
    let (mut state, _, _) = state();
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");
    state.move_avatar(bob, 30.0, 10.0, false, Direction::Left).unwrap();

    assert_eq!(
        AdministrativeAction::TeleportToUser.execute(&mut state, ann, bob, &[]),
        Err(CoreError::NoPermission(Permission::TeleportToUser))
    );

    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let request = *state
        .users
        .get(bob)
        .unwrap()
        .notifications
        .keys()
        .next()
        .unwrap();
    agora::notification::accept(&mut state, bob, request).unwrap();

    AdministrativeAction::TeleportToUser
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let here = state.location(ann).unwrap();
    assert_eq!(here.area, plaza().child("Park"));
    assert_eq!((here.x, here.y), (30.0, 10.0));
}
