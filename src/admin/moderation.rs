//! Reports, bans and mutes.

use std::collections::BTreeSet;

use super::{display_name, notify, performer_world};
use crate::context::Permission;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::notification::MessageBundle;
use crate::state::ServerState;

/// Who hears about a report or ban of `target` in `world`: everyone with
/// `BanModerator` there, plus everyone with `BanUser` when the target itself
/// cannot ban moderators.
pub fn ban_recipients(state: &ServerState, world: &ContextId, target: UserId) -> Vec<UserId> {
    let mut recipients: BTreeSet<UserId> = state
        .users_with_permission(world, Permission::BanModerator)
        .into_iter()
        .collect();
    if !state.has_permission(target, world, Permission::BanModerator) {
        recipients.extend(state.users_with_permission(world, Permission::BanUser));
    }
    recipients.remove(&target);
    recipients.into_iter().collect()
}

/// Permission needed to ban (or report) `target`: moderators are only
/// reachable with `BanModerator`.
fn ban_permission(state: &ServerState, world: &ContextId, target: UserId) -> Permission {
    if state.has_permission(target, world, Permission::BanModerator) {
        Permission::BanModerator
    } else {
        Permission::BanUser
    }
}

fn notify_all(
    state: &mut ServerState,
    recipients: &[UserId],
    world: &ContextId,
    message: MessageBundle,
) -> CoreResult<()> {
    for recipient in recipients {
        notify(state, *recipient, world, message.clone())?;
    }
    Ok(())
}

pub fn report_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let world = performer_world(state, performer)?;
    let moderation = state.tree.moderation(&world)?;
    if moderation.banned.contains(&target) {
        return Err(CoreError::IllegalState("ban.already-banned"));
    }
    if moderation.reported.contains(&target) {
        return Err(CoreError::IllegalState("report.already-reported"));
    }
    if state.has_permission(target, &world, Permission::BanModerator)
        && !state.has_permission(performer, &world, Permission::BanModerator)
    {
        return Err(CoreError::NoPermission(Permission::BanModerator));
    }
    state.tree.moderation_mut(&world)?.reported.insert(target);

    let recipients = ban_recipients(state, &world, target);
    let message = MessageBundle::new("moderation.reported")
        .arg(display_name(state, target))
        .arg(display_name(state, performer));
    notify_all(state, &recipients, &world, message)
}

pub fn ban_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let world = performer_world(state, performer)?;
    if state.tree.moderation(&world)?.banned.contains(&target) {
        return Err(CoreError::IllegalState("ban.already-banned"));
    }
    state.require_permission(performer, &world, ban_permission(state, &world, target))?;

    let recipients = ban_recipients(state, &world, target);
    let moderation = state.tree.moderation_mut(&world)?;
    moderation.reported.remove(&target);
    moderation.banned.insert(target);
    state.store.add_ban(&world, target);

    if state.users.get(target)?.current_world.as_ref() == Some(&world) {
        state.leave_world_inner(target);
    }
    let world_name = state.tree.get(&world)?.name.clone();
    state.send_info(target, MessageBundle::new("moderation.you-were-banned").arg(&world_name));
    let message = MessageBundle::new("moderation.banned")
        .arg(display_name(state, target))
        .arg(display_name(state, performer));
    notify_all(state, &recipients, &world, message)
}

pub fn unban_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let world = performer_world(state, performer)?;
    if !state.tree.moderation(&world)?.banned.contains(&target) {
        return Err(CoreError::IllegalState("ban.not-banned"));
    }
    state.require_permission(performer, &world, ban_permission(state, &world, target))?;

    state.tree.moderation_mut(&world)?.banned.remove(&target);
    state.store.remove_ban(&world, target);
    let recipients = ban_recipients(state, &world, target);
    let message = MessageBundle::new("moderation.unbanned")
        .arg(display_name(state, target))
        .arg(display_name(state, performer));
    notify_all(state, &recipients, &world, message)
}

/// Area where performer and target meet; mutes are placed and lifted there.
fn common_context(state: &ServerState, performer: UserId, target: UserId) -> CoreResult<(ContextId, ContextId)> {
    let own = state.location(performer)?.area;
    let theirs = state
        .users
        .get(target)?
        .area()
        .cloned()
        .ok_or(CoreError::IllegalState("mute.target-not-in-world"))?;
    let common = state.tree.last_common_ancestor(&own, &theirs)?;
    Ok((common, theirs))
}

fn refresh_mute_flag(state: &mut ServerState, target: UserId, area: &ContextId) -> CoreResult<()> {
    let muted = state.tree.is_muted(target, area);
    if let Some(room) = state.users.get(target)?.room().cloned() {
        state.send_room_info(target, &room, muted)?;
    }
    Ok(())
}

pub fn mute_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let (common, target_area) = common_context(state, performer, target)?;
    if state.tree.is_muted(target, &common) {
        return Err(CoreError::IllegalState("mute.already-muted"));
    }
    state.require_permission(performer, &common, Permission::MuteUsers)?;
    state.tree.add_muted_user(&common, target)?;
    refresh_mute_flag(state, target, &target_area)?;
    let name = state.tree.get(&common)?.name.clone();
    state.send_info(target, MessageBundle::new("moderation.muted").arg(name));
    Ok(())
}

/// Lift mutes from the target's area up to and including the common context.
/// Mutes placed higher up stay in force.
pub fn unmute_user(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let (common, target_area) = common_context(state, performer, target)?;
    if !state.tree.is_muted(target, &target_area) {
        return Err(CoreError::IllegalState("mute.not-muted"));
    }
    state.require_permission(performer, &common, Permission::MuteUsers)?;
    for context in state.tree.path_to_root(&target_area)? {
        state.tree.remove_muted_user(&context, target)?;
        if context == common {
            break;
        }
    }
    refresh_mute_flag(state, target, &target_area)?;
    if !state.tree.is_muted(target, &target_area) {
        state.send_info(target, MessageBundle::new("moderation.unmuted"));
    }
    Ok(())
}
