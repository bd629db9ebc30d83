//! # Administrative actions
//!
//! The closed set of social and moderation commands a user can run against
//! another user. Every command has one handler with the same signature; the
//! handler checks its state guard, then the permission at the relevant
//! context, then applies the effect and sends notifications.
//!
//! | Command | Context | Permission |
//! |---|---|---|
//! | invite/remove friend, ignore/unignore | none | none |
//! | room invite/kick | performer's room | `ManagePrivateRoom` |
//! | teleport | common ancestor | `TeleportToUser` unless friends |
//! | report, ban, unban | performer's world | `BanUser` / `BanModerator` |
//! | mute, unmute | common ancestor | `MuteUsers` |
//! | assign/withdraw moderator | performer's world | `AssignModerator` |
//! | assign/withdraw administrator | global root | `AssignAdministrator` |

pub mod moderation;
pub mod roles;
pub mod room;
pub mod social;

use log::debug;

use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::logutil::sec_log;
use crate::metrics;
use crate::notification::{self, MessageBundle, Notification};
use crate::protocol::codec::WireEnum;
use crate::state::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdministrativeAction {
    InviteFriend,
    RemoveFriend,
    IgnoreUser,
    UnignoreUser,
    RoomInvite,
    RoomKick,
    TeleportToUser,
    ReportUser,
    MuteUser,
    UnmuteUser,
    BanUser,
    UnbanUser,
    AssignModerator,
    WithdrawModerator,
    AssignAdministrator,
    WithdrawAdministrator,
}

impl WireEnum for AdministrativeAction {
    const NAME: &'static str = "AdministrativeAction";
    const VARIANTS: &'static [Self] = &[
        AdministrativeAction::InviteFriend,
        AdministrativeAction::RemoveFriend,
        AdministrativeAction::IgnoreUser,
        AdministrativeAction::UnignoreUser,
        AdministrativeAction::RoomInvite,
        AdministrativeAction::RoomKick,
        AdministrativeAction::TeleportToUser,
        AdministrativeAction::ReportUser,
        AdministrativeAction::MuteUser,
        AdministrativeAction::UnmuteUser,
        AdministrativeAction::BanUser,
        AdministrativeAction::UnbanUser,
        AdministrativeAction::AssignModerator,
        AdministrativeAction::WithdrawModerator,
        AdministrativeAction::AssignAdministrator,
        AdministrativeAction::WithdrawAdministrator,
    ];
}

/// `(state, performer, target, args)`
type Handler = fn(&mut ServerState, UserId, UserId, &[String]) -> CoreResult<()>;

impl AdministrativeAction {
    pub fn name(self) -> &'static str {
        use AdministrativeAction::*;
        match self {
            InviteFriend => "invite-friend",
            RemoveFriend => "remove-friend",
            IgnoreUser => "ignore-user",
            UnignoreUser => "unignore-user",
            RoomInvite => "room-invite",
            RoomKick => "room-kick",
            TeleportToUser => "teleport-to-user",
            ReportUser => "report-user",
            MuteUser => "mute-user",
            UnmuteUser => "unmute-user",
            BanUser => "ban-user",
            UnbanUser => "unban-user",
            AssignModerator => "assign-moderator",
            WithdrawModerator => "withdraw-moderator",
            AssignAdministrator => "assign-administrator",
            WithdrawAdministrator => "withdraw-administrator",
        }
    }

    fn handler(self) -> Handler {
        use AdministrativeAction::*;
        match self {
            InviteFriend => social::invite_friend,
            RemoveFriend => social::remove_friend,
            IgnoreUser => social::ignore_user,
            UnignoreUser => social::unignore_user,
            RoomInvite => room::room_invite,
            RoomKick => room::room_kick,
            TeleportToUser => social::teleport_to_user,
            ReportUser => moderation::report_user,
            MuteUser => moderation::mute_user,
            UnmuteUser => moderation::unmute_user,
            BanUser => moderation::ban_user,
            UnbanUser => moderation::unban_user,
            AssignModerator => roles::assign_moderator,
            WithdrawModerator => roles::withdraw_moderator,
            AssignAdministrator => roles::assign_administrator,
            WithdrawAdministrator => roles::withdraw_administrator,
        }
    }

    /// Run the command as `performer` against `target`.
    pub fn execute(
        self,
        state: &mut ServerState,
        performer: UserId,
        target: UserId,
        args: &[String],
    ) -> CoreResult<()> {
        state.begin(performer)?;
        if performer == target {
            return Err(CoreError::IllegalState("admin.self-target"));
        }
        state.users.get(target)?;

        let result = (self.handler())(state, performer, target, args);
        metrics::record_admin_action(self.name(), result.is_ok());
        match &result {
            Ok(()) => sec_log!(
                "{} by {} on {} executed",
                self.name(),
                performer.short(),
                target.short()
            ),
            Err(e) => debug!(
                "{} by {} on {} rejected: {}",
                self.name(),
                performer.short(),
                target.short(),
                e
            ),
        }
        result
    }
}

/// Current world of the performer, the context of world-level commands.
pub(crate) fn performer_world(state: &ServerState, performer: UserId) -> CoreResult<ContextId> {
    state
        .users
        .get(performer)?
        .current_world
        .clone()
        .ok_or(CoreError::NotInWorld)
}

/// Send an informational notification.
pub(crate) fn notify(
    state: &mut ServerState,
    to: UserId,
    context: &ContextId,
    message: MessageBundle,
) -> CoreResult<()> {
    let note = Notification::info(to, context.clone(), message, state.now());
    notification::add(state, note).map(|_| ())
}

pub(crate) fn display_name(state: &ServerState, user: UserId) -> String {
    state
        .users
        .get(user)
        .map(|u| u.name.clone())
        .unwrap_or_else(|_| user.short())
}
