//! Friends, ignores and teleporting.

use super::display_name;
use crate::context::Permission;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::notification::{self, MessageBundle, Notification, NotificationKind};
use crate::protocol::UserInfoAction;
use crate::state::ServerState;
use crate::user::Location;

pub fn invite_friend(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let p = state.users.get(performer)?;
    let t = state.users.get(target)?;
    if p.is_friend(target) || t.is_friend(performer) {
        return Err(CoreError::IllegalState("friend.already-friends"));
    }
    if t.is_ignoring(performer) {
        return Ok(());
    }
    let pending = t.notifications.values().any(|n| {
        !n.is_answered()
            && matches!(n.kind, NotificationKind::FriendRequest { requester } if requester == performer)
    });
    if pending {
        return Err(CoreError::IllegalState("friend.request-pending"));
    }
    let request = Notification::request(
        target,
        ContextId::root(),
        MessageBundle::new("friend.request").arg(&p.name),
        state.now(),
        NotificationKind::FriendRequest {
            requester: performer,
        },
    );
    notification::add(state, request)?;
    Ok(())
}

fn unlink_friends(state: &mut ServerState, a: UserId, b: UserId) -> CoreResult<()> {
    state.users.get_mut(a)?.friends.remove(&b);
    state.users.get_mut(b)?.friends.remove(&a);
    state.store.remove_friendship(a, b);
    state.send_record(a, b, None, UserInfoAction::Update);
    state.send_record(b, a, None, UserInfoAction::Update);
    Ok(())
}

pub fn remove_friend(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    if !state.users.get(performer)?.is_friend(target) {
        return Err(CoreError::IllegalState("friend.not-friends"));
    }
    unlink_friends(state, performer, target)
}

/// Ignoring also ends a friendship.
pub fn ignore_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let p = state.users.get(performer)?;
    if p.is_ignoring(target) {
        return Err(CoreError::IllegalState("ignore.already-ignored"));
    }
    let were_friends = p.is_friend(target);
    state.users.get_mut(performer)?.ignored.insert(target);
    state.store.add_ignore(performer, target);
    if were_friends {
        unlink_friends(state, performer, target)?;
    } else {
        state.send_record(performer, target, None, UserInfoAction::Update);
    }
    Ok(())
}

pub fn unignore_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    if !state.users.get_mut(performer)?.ignored.remove(&target) {
        return Err(CoreError::IllegalState("ignore.not-ignored"));
    }
    state.store.remove_ignore(performer, target);
    state.send_record(performer, target, None, UserInfoAction::Update);
    Ok(())
}

/// Where `performer` would land when teleporting to `target`, if allowed.
///
/// Friends may always follow each other; otherwise `TeleportToUser` is needed
/// at the lowest context both share. Private rooms additionally need
/// `EnterPrivateRoom` unless the performer is invited or manages the room.
pub fn teleport_destination(state: &ServerState, performer: UserId, target: UserId) -> CoreResult<Location> {
    let p = state.users.get(performer)?;
    let t = state.users.get(target)?;
    if !t.is_online() {
        return Err(CoreError::IllegalState("teleport.target-offline"));
    }
    let destination = t
        .location
        .clone()
        .ok_or(CoreError::IllegalState("teleport.target-not-in-world"))?;
    if !p.is_friend(target) {
        let from = p
            .location
            .as_ref()
            .map(|l| l.room.clone())
            .unwrap_or_else(ContextId::root);
        let common = state.tree.last_common_ancestor(&from, &destination.room)?;
        state.require_permission(performer, &common, Permission::TeleportToUser)?;
    }
    if let Some(world) = state.tree.world_of(&destination.room) {
        if state.tree.moderation(&world)?.banned.contains(&performer) {
            return Err(CoreError::IllegalWorldAction("world.banned"));
        }
    }
    state.check_room_entry(performer, &destination.room, None)?;
    Ok(destination)
}

pub fn teleport_to_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let destination = teleport_destination(state, performer, target)?;
    state.relocate(performer, &destination.room, destination.x, destination.y)?;
    let name = display_name(state, performer);
    state.send_info(target, MessageBundle::new("teleport.arrived").arg(name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdministrativeAction;
    use crate::state::test_support::*;

    #[test]
    fn invite_friend_sends_request_once() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let bob = online(&mut state, "bob");
        AdministrativeAction::InviteFriend
            .execute(&mut state, ann, bob, &[])
            .unwrap();
        assert_eq!(state.users.get(bob).unwrap().notifications.len(), 1);
        assert_eq!(
            AdministrativeAction::InviteFriend.execute(&mut state, ann, bob, &[]),
            Err(CoreError::IllegalState("friend.request-pending"))
        );
    }

    #[test]
    fn invite_while_ignored_is_silent() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let bob = online(&mut state, "bob");
        AdministrativeAction::IgnoreUser
            .execute(&mut state, bob, ann, &[])
            .unwrap();
        AdministrativeAction::InviteFriend
            .execute(&mut state, ann, bob, &[])
            .unwrap();
        assert!(state.users.get(bob).unwrap().notifications.is_empty());
    }

    #[test]
    fn ignoring_a_friend_ends_the_friendship() {
        let (mut state, _, store) = state();
        let ann = online(&mut state, "ann");
        let bob = online(&mut state, "bob");
        state.users.get_mut(ann).unwrap().friends.insert(bob);
        state.users.get_mut(bob).unwrap().friends.insert(ann);
        AdministrativeAction::IgnoreUser
            .execute(&mut state, ann, bob, &[])
            .unwrap();
        assert!(!state.users.get(bob).unwrap().is_friend(ann));
        assert!(store.snapshot().ignores.contains(&(ann, bob)));
        assert_eq!(
            AdministrativeAction::IgnoreUser.execute(&mut state, ann, bob, &[]),
            Err(CoreError::IllegalState("ignore.already-ignored"))
        );
        AdministrativeAction::UnignoreUser
            .execute(&mut state, ann, bob, &[])
            .unwrap();
        assert_eq!(
            AdministrativeAction::UnignoreUser.execute(&mut state, ann, bob, &[]),
            Err(CoreError::IllegalState("ignore.not-ignored"))
        );
        assert_eq!(
            AdministrativeAction::RemoveFriend.execute(&mut state, ann, bob, &[]),
            Err(CoreError::IllegalState("friend.not-friends"))
        );
    }

    #[test]
    fn teleport_needs_friendship_or_permission() {
        let (mut state, _, _) = state();
        let ann = online(&mut state, "ann");
        let bob = in_harbor(&mut state, "bob");
        state.move_avatar(bob, 30.0, 10.0, false, Default::default()).unwrap();
        assert_eq!(
            AdministrativeAction::TeleportToUser.execute(&mut state, ann, bob, &[]),
            Err(CoreError::NoPermission(Permission::TeleportToUser))
        );
        state.users.get_mut(ann).unwrap().friends.insert(bob);
        state.users.get_mut(bob).unwrap().friends.insert(ann);
        AdministrativeAction::TeleportToUser
            .execute(&mut state, ann, bob, &[])
            .unwrap();
        let loc = state.location(ann).unwrap();
        assert_eq!((loc.x, loc.y), (30.0, 10.0));
        assert_eq!(state.users.get(ann).unwrap().current_world, Some(harbor()));
    }
}
