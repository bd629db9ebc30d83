//! Creating, answering and removing notifications.

use log::debug;

use super::{MessageBundle, Notification, NotificationKind};
use crate::error::{CoreError, CoreResult};
use crate::ids::{NotificationId, UserId};
use crate::protocol::codec::WireEnum;
use crate::protocol::{NotificationPush, NotificationRecord, UserInfoAction};
use crate::state::ServerState;

/// Client answer to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationAnswer {
    Accept,
    Decline,
    Delete,
    Read,
}

impl WireEnum for NotificationAnswer {
    const NAME: &'static str = "NotificationAnswer";
    const VARIANTS: &'static [Self] = &[
        NotificationAnswer::Accept,
        NotificationAnswer::Decline,
        NotificationAnswer::Delete,
        NotificationAnswer::Read,
    ];
}

/// Store a notification and push it to its owner when online.
pub fn add(state: &mut ServerState, notification: Notification) -> CoreResult<NotificationId> {
    let owner = notification.owner;
    let id = notification.id;
    let record = NotificationRecord::from(&notification);
    state.store.save_notification(&notification);
    state
        .users
        .get_mut(owner)?
        .notifications
        .insert(id, notification);
    state.send(
        owner,
        NotificationPush {
            records: vec![record],
        },
    );
    debug!("Notification {} added for {}", id.short(), owner.short());
    Ok(id)
}

fn open_request(state: &ServerState, user: UserId, id: NotificationId) -> CoreResult<Notification> {
    let notification = state
        .users
        .get(user)?
        .notifications
        .get(&id)
        .ok_or_else(|| CoreError::not_found("notification.unknown", id))?;
    if !notification.is_request() {
        return Err(CoreError::IllegalNotificationAction(
            "notification.not-a-request",
        ));
    }
    if notification.is_answered() {
        return Err(CoreError::IllegalNotificationAction(
            "notification.already-answered",
        ));
    }
    Ok(notification.clone())
}

/// Run the request's effect, then remove the notification.
pub fn accept(state: &mut ServerState, user: UserId, id: NotificationId) -> CoreResult<()> {
    state.begin(user)?;
    let notification = open_request(state, user, id)?;
    match notification.kind {
        NotificationKind::FriendRequest { requester } => {
            befriend(state, user, requester)?;
        }
        NotificationKind::RoomInvitation { room, .. } => {
            let map = state
                .tree
                .get(&room)
                .ok()
                .and_then(|ctx| ctx.room.as_ref().map(|r| r.map))
                .ok_or_else(|| CoreError::not_found("room.unknown", &room))?;
            let (x, y) = map.spawn();
            state.relocate(user, &room, x, y)?;
            if let Some(settings) = state.tree.get_mut(&room)?.room.as_mut() {
                settings.invited.insert(user);
            }
        }
        NotificationKind::Info => {}
    }
    settle(state, user, id, NotificationAnswer::Accept)
}

pub fn decline(state: &mut ServerState, user: UserId, id: NotificationId) -> CoreResult<()> {
    state.begin(user)?;
    let notification = open_request(state, user, id)?;
    if let NotificationKind::FriendRequest { requester } = notification.kind {
        let name = state.users.get(user)?.name.clone();
        state.send_info(requester, MessageBundle::new("friend.declined").arg(name));
    }
    settle(state, user, id, NotificationAnswer::Decline)
}

pub fn mark_read(state: &mut ServerState, user: UserId, id: NotificationId) -> CoreResult<()> {
    state.begin(user)?;
    let notification = state
        .users
        .get_mut(user)?
        .notifications
        .get_mut(&id)
        .ok_or_else(|| CoreError::not_found("notification.unknown", id))?;
    if notification.read {
        return Ok(());
    }
    notification.read = true;
    let snapshot = notification.clone();
    state.store.save_notification(&snapshot);
    state.send(
        user,
        NotificationPush {
            records: vec![NotificationRecord::from(&snapshot)],
        },
    );
    Ok(())
}

pub fn delete(state: &mut ServerState, user: UserId, id: NotificationId) -> CoreResult<()> {
    state.begin(user)?;
    remove(state, user, id)
}

/// Record the answer, show it to the owner, then drop the request. The answered
/// record is stored first so a request can never be answered twice.
fn settle(
    state: &mut ServerState,
    user: UserId,
    id: NotificationId,
    answer: NotificationAnswer,
) -> CoreResult<()> {
    let notification = state
        .users
        .get_mut(user)?
        .notifications
        .get_mut(&id)
        .ok_or_else(|| CoreError::not_found("notification.unknown", id))?;
    match answer {
        NotificationAnswer::Accept => notification.accepted = true,
        _ => notification.declined = true,
    }
    let answered = notification.clone();
    state.store.save_notification(&answered);
    state.send(
        user,
        NotificationPush {
            records: vec![NotificationRecord::from(&answered)],
        },
    );
    remove(state, user, id)
}

fn remove(state: &mut ServerState, user: UserId, id: NotificationId) -> CoreResult<()> {
    state
        .users
        .get_mut(user)?
        .notifications
        .remove(&id)
        .ok_or_else(|| CoreError::not_found("notification.unknown", id))?;
    state.store.delete_notification(user, id);
    Ok(())
}

/// Make two users mutual friends and refresh both sides.
fn befriend(state: &mut ServerState, user: UserId, requester: UserId) -> CoreResult<()> {
    state.users.get(requester)?;
    if state.users.get(user)?.is_friend(requester) {
        return Ok(());
    }
    state.users.get_mut(user)?.friends.insert(requester);
    state.users.get_mut(requester)?.friends.insert(user);
    state.store.add_friendship(user, requester);
    state.send_record(user, requester, None, UserInfoAction::Add);
    state.send_record(requester, user, None, UserInfoAction::Add);
    let name = state.users.get(user)?.name.clone();
    state.send_info(requester, MessageBundle::new("friend.accepted").arg(name));
    Ok(())
}
