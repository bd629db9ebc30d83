//! Moderator and administrator grants.

use super::{display_name, notify, performer_world};
use crate::context::{Permission, Role};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::notification::MessageBundle;
use crate::state::ServerState;

struct Grant {
    role: Role,
    permission: Permission,
    already: &'static str,
    missing: &'static str,
    granted_key: &'static str,
    withdrawn_key: &'static str,
}

const MODERATOR: Grant = Grant {
    role: Role::Moderator,
    permission: Permission::AssignModerator,
    already: "role.already-moderator",
    missing: "role.not-moderator",
    granted_key: "role.moderator-granted",
    withdrawn_key: "role.moderator-withdrawn",
};

const ADMINISTRATOR: Grant = Grant {
    role: Role::Administrator,
    permission: Permission::AssignAdministrator,
    already: "role.already-administrator",
    missing: "role.not-administrator",
    granted_key: "role.administrator-granted",
    withdrawn_key: "role.administrator-withdrawn",
};

fn assign(
    state: &mut ServerState,
    performer: UserId,
    target: UserId,
    context: &ContextId,
    grant: &Grant,
) -> CoreResult<()> {
    if state.users.get(target)?.holds_role(context, grant.role) {
        return Err(CoreError::IllegalState(grant.already));
    }
    state.require_permission(performer, context, grant.permission)?;
    state.grant_role(target, context, grant.role)?;
    let name = state.tree.get(context)?.name.clone();
    let message = MessageBundle::new(grant.granted_key)
        .arg(name)
        .arg(display_name(state, performer));
    notify(state, target, context, message)
}

fn withdraw(
    state: &mut ServerState,
    performer: UserId,
    target: UserId,
    context: &ContextId,
    grant: &Grant,
) -> CoreResult<()> {
    if !state.users.get(target)?.holds_role(context, grant.role) {
        return Err(CoreError::IllegalState(grant.missing));
    }
    state.require_permission(performer, context, grant.permission)?;
    state.revoke_role(target, context, grant.role)?;
    let name = state.tree.get(context)?.name.clone();
    let message = MessageBundle::new(grant.withdrawn_key)
        .arg(name)
        .arg(display_name(state, performer));
    notify(state, target, context, message)
}

pub fn assign_moderator(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let world = performer_world(state, performer)?;
    assign(state, performer, target, &world, &MODERATOR)
}

pub fn withdraw_moderator(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    let world = performer_world(state, performer)?;
    withdraw(state, performer, target, &world, &MODERATOR)
}

/// Administrators are appointed at the global root, so the notification
/// belongs to the global context too.
pub fn assign_administrator(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    assign(state, performer, target, &ContextId::root(), &ADMINISTRATOR)
}

pub fn withdraw_administrator(state: &mut ServerState, performer: UserId, target: UserId, _: &[String]) -> CoreResult<()> {
    withdraw(state, performer, target, &ContextId::root(), &ADMINISTRATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdministrativeAction;
    use crate::state::test_support::*;

    #[test]
    fn moderator_grant_is_scoped_to_the_world() {
        let (mut state, _, store) = state();
        let root = in_harbor(&mut state, "root");
        let ann = in_harbor(&mut state, "ann");
        AdministrativeAction::AssignModerator
            .execute(&mut state, root, ann, &[])
            .unwrap();
        assert!(state.users.get(ann).unwrap().holds_role(&harbor(), Role::Moderator));
        assert!(store.snapshot().roles.contains_key(&(ann, harbor())));
        assert_eq!(
            AdministrativeAction::AssignModerator.execute(&mut state, root, ann, &[]),
            Err(CoreError::IllegalState("role.already-moderator"))
        );
        AdministrativeAction::WithdrawModerator
            .execute(&mut state, root, ann, &[])
            .unwrap();
        assert!(state.users.get(ann).unwrap().roles.is_empty());
        assert!(!store.snapshot().roles.contains_key(&(ann, harbor())));
    }

    #[test]
    fn administrator_grant_notifies_in_global_context() {
        let (mut state, _, _) = state();
        let root = online(&mut state, "root");
        let ann = online(&mut state, "ann");
        AdministrativeAction::AssignAdministrator
            .execute(&mut state, root, ann, &[])
            .unwrap();
        let note = state
            .users
            .get(ann)
            .unwrap()
            .notifications
            .values()
            .next()
            .cloned()
            .unwrap();
        assert_eq!(note.context, ContextId::root());
        assert_eq!(note.message.key, "role.administrator-granted");
    }

    #[test]
    fn administrators_cannot_appoint_administrators() {
        let (mut state, _, _) = state();
        let admin = online(&mut state, "admin");
        let ann = online(&mut state, "ann");
        state
            .grant_role(admin, &ContextId::root(), Role::Administrator)
            .unwrap();
        assert_eq!(
            AdministrativeAction::AssignAdministrator.execute(&mut state, admin, ann, &[]),
            Err(CoreError::NoPermission(Permission::AssignAdministrator))
        );
    }

    #[test]
    fn moderator_commands_need_a_world() {
        let (mut state, _, _) = state();
        let root = online(&mut state, "root");
        let ann = online(&mut state, "ann");
        assert_eq!(
            AdministrativeAction::AssignModerator.execute(&mut state, root, ann, &[]),
            Err(CoreError::NotInWorld)
        );
    }
}
