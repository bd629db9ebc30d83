//! Private room invitations and kicks.

use super::display_name;
use crate::context::Permission;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::notification::{self, MessageBundle, Notification, NotificationKind};
use crate::state::ServerState;

/// The performer's current room, which must be private.
fn private_room_of(state: &ServerState, performer: UserId) -> CoreResult<ContextId> {
    let room = state.location(performer)?.room;
    if !state.tree.get(&room)?.is_private_room() {
        return Err(CoreError::IllegalState("room.not-private"));
    }
    Ok(room)
}

pub fn room_invite(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let room = private_room_of(state, performer)?;
    let already_in = state.users.get(target)?.room() == Some(&room);
    let invited = state
        .tree
        .get(&room)?
        .room
        .as_ref()
        .map_or(false, |r| r.invited.contains(&target));
    if already_in || invited {
        return Err(CoreError::IllegalState("room.already-invited"));
    }
    state.require_permission(performer, &room, Permission::ManagePrivateRoom)?;

    let room_name = state.tree.get(&room)?.name.clone();
    let invitation = Notification::request(
        target,
        room.clone(),
        MessageBundle::new("room.invitation")
            .arg(display_name(state, performer))
            .arg(room_name),
        state.now(),
        NotificationKind::RoomInvitation {
            inviter: performer,
            room,
        },
    );
    notification::add(state, invitation)?;
    Ok(())
}

/// Send the target back to the world's public room and revoke its invitation.
pub fn room_kick(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let room = private_room_of(state, performer)?;
    if state.users.get(target)?.room() != Some(&room) {
        return Err(CoreError::IllegalState("room.target-not-present"));
    }
    state.require_permission(performer, &room, Permission::ManagePrivateRoom)?;

    let world = state
        .tree
        .world_of(&room)
        .ok_or(CoreError::IllegalState("context.not-a-room"))?;
    let lobby = state
        .tree
        .public_room(&world)
        .ok_or(CoreError::IllegalState("world.no-public-room"))?;
    let map = state
        .tree
        .get(&lobby)?
        .room
        .as_ref()
        .map(|r| r.map)
        .ok_or(CoreError::IllegalState("context.not-a-room"))?;
    let room_ctx = state.tree.get_mut(&room)?;
    let room_name = room_ctx.name.clone();
    if let Some(settings) = room_ctx.room.as_mut() {
        settings.invited.remove(&target);
    }
    let (x, y) = map.spawn();
    state.relocate(target, &lobby, x, y)?;
    state.send_info(target, MessageBundle::new("room.kicked").arg(room_name));
    Ok(())
}
