//! Notification delivery and answers as seen by the receiving user.

mod common;

use agora::admin::AdministrativeAction;
use agora::error::CoreError;
use agora::ids::{NotificationId, UserId};
use agora::notification::{self, MessageBundle, Notification};
use agora::protocol::Packet;
use agora::state::ServerState;
use agora::user::Direction;

use common::{harbor, in_harbor, online, received, state, PASSWORD};

fn only_notification(state: &ServerState, user: UserId) -> NotificationId {
    let notes = &state.users.get(user).unwrap().notifications;
    assert_eq!(notes.len(), 1);
    *notes.keys().next().unwrap()
}

#[test]
fn requests_wait_for_offline_users_and_arrive_on_login() {
    let (mut state, _, store) = state();
    let ann = online(&mut state, "ann");
    let bob = state.register("bob", PASSWORD).unwrap();

    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    assert!(received(&mut state, bob).is_empty());
    let id = only_notification(&state, bob);
    assert!(store.snapshot().notifications.contains_key(&id));

    state.login("bob", PASSWORD).unwrap();
    let pushed: Vec<_> = received(&mut state, bob)
        .into_iter()
        .filter_map(|p| match p {
            Packet::NotificationPush(push) => Some(push.records),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].id, id);
    assert!(pushed[0].request);
    assert_eq!(pushed[0].message.key, "friend.request");
}

#[test]
fn accepting_a_friend_request_links_both_and_clears_the_record() {
    let (mut state, _, store) = state();
    let ann = online(&mut state, "ann");
    let bob = online(&mut state, "bob");
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let id = only_notification(&state, bob);
    state.outbox.drain();

    notification::accept(&mut state, bob, id).unwrap();
    assert!(state.users.get(ann).unwrap().is_friend(bob));
    assert!(state.users.get(bob).unwrap().is_friend(ann));
    assert!(state.users.get(bob).unwrap().notifications.is_empty());
    let stored = store.snapshot();
    assert!(stored.notifications.is_empty());
    assert_eq!(stored.friendships.len(), 1);

    let to_ann = received(&mut state, ann);
    assert!(to_ann.iter().any(|p| matches!(p, Packet::UserInfo(_))));
    assert!(to_ann.iter().any(|p| matches!(
        p,
        Packet::ChatMessage(m) if m.body == agora::protocol::ChatBody::Bundle(
            MessageBundle::new("friend.accepted").arg("bob")
        )
    )));

    assert_eq!(
        notification::accept(&mut state, bob, id),
        Err(CoreError::not_found("notification.unknown", id))
    );
}

#[test]
fn declining_tells_the_requester_and_allows_a_new_request() {
    let (mut state, _, _) = state();
    let ann = online(&mut state, "ann");
    let bob = online(&mut state, "bob");
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let id = only_notification(&state, bob);
    notification::decline(&mut state, bob, id).unwrap();
    assert!(!state.users.get(ann).unwrap().is_friend(bob));
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
}

#[test]
fn info_notifications_can_be_read_and_deleted_but_not_answered() {
    let (mut state, _, store) = state();
    let ann = online(&mut state, "ann");
    let note = Notification::info(ann, harbor(), MessageBundle::new("welcome"), state.now());
    let id = notification::add(&mut state, note).unwrap();

    assert_eq!(
        notification::accept(&mut state, ann, id),
        Err(CoreError::IllegalNotificationAction("notification.not-a-request"))
    );
    notification::mark_read(&mut state, ann, id).unwrap();
    assert!(store.snapshot().notifications[&id].read);
    notification::mark_read(&mut state, ann, id).unwrap();

    notification::delete(&mut state, ann, id).unwrap();
    assert!(store.snapshot().notifications.is_empty());
    assert_eq!(
        notification::delete(&mut state, ann, id),
        Err(CoreError::not_found("notification.unknown", id))
    );
}

#[test]
fn answers_need_a_logged_in_owner() {
    let (mut state, _, _) = state();
    let ann = online(&mut state, "ann");
    let bob = online(&mut state, "bob");
    AdministrativeAction::InviteFriend
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let id = only_notification(&state, bob);
    state.logout(bob).unwrap();
    assert_eq!(
        notification::accept(&mut state, bob, id),
        Err(CoreError::NotAuthenticated)
    );
    // someone else's id is simply unknown
    assert_eq!(
        notification::decline(&mut state, ann, id),
        Err(CoreError::not_found("notification.unknown", id))
    );
}

#[test]
fn room_invitation_moves_the_guest_into_the_private_room() {
    let (mut state, _, _) = state();
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");
    let reception = harbor().child("Plaza").child("Lobby").child("Reception");
    state.move_avatar(ann, 20.0, 24.0, false, Direction::Up).unwrap();
    state.interact(ann, &reception).unwrap();
    state
        .execute_option(
            ann,
            &reception,
            0,
            &["Den".into(), "door-pw".into(), "PrivateLounge".into()],
        )
        .unwrap();
    let den = harbor().child("Den");

    AdministrativeAction::RoomInvite
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let id = only_notification(&state, bob);
    assert_eq!(state.users.get(bob).unwrap().notifications[&id].context, den);

    notification::accept(&mut state, bob, id).unwrap();
    assert_eq!(state.location(bob).unwrap().room, den);
    assert!(state.tree.get(&den).unwrap().room.as_ref().unwrap().invited.contains(&bob));

    AdministrativeAction::RoomKick
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    assert_eq!(state.location(bob).unwrap().room, harbor().child("Plaza"));
    assert!(!state.tree.get(&den).unwrap().room.as_ref().unwrap().invited.contains(&bob));
}

#[test]
fn refused_room_invitation_leaves_no_trace_in_the_guest_list() {
    let (mut state, _, _) = state();
    let root = in_harbor(&mut state, "root");
    let ann = in_harbor(&mut state, "ann");
    let bob = in_harbor(&mut state, "bob");
    let reception = harbor().child("Plaza").child("Lobby").child("Reception");
    state.move_avatar(ann, 20.0, 24.0, false, Direction::Up).unwrap();
    state.interact(ann, &reception).unwrap();
    state
        .execute_option(
            ann,
            &reception,
            0,
            &["Den".into(), "door-pw".into(), "PrivateLounge".into()],
        )
        .unwrap();
    let den = harbor().child("Den");
    let invited = |state: &ServerState| {
        state.tree.get(&den).unwrap().room.as_ref().unwrap().invited.contains(&bob)
    };

    AdministrativeAction::RoomInvite
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    let id = only_notification(&state, bob);
    AdministrativeAction::BanUser
        .execute(&mut state, root, bob, &[])
        .unwrap();

    assert_eq!(
        notification::accept(&mut state, bob, id),
        Err(CoreError::IllegalWorldAction("world.banned"))
    );
    assert!(!invited(&state));
    assert!(state.users.get(bob).unwrap().notifications.contains_key(&id));

    AdministrativeAction::UnbanUser
        .execute(&mut state, root, bob, &[])
        .unwrap();
    AdministrativeAction::RoomInvite
        .execute(&mut state, ann, bob, &[])
        .unwrap();
    notification::accept(&mut state, bob, id).unwrap();
    assert_eq!(state.location(bob).unwrap().room, den);
    assert!(invited(&state));
}
