//! Roles, permissions and the table linking them.
//!
//! A user holds a [`ContextRole`] per context. The permission check itself
//! lives on [`ContextTree`](super::ContextTree) because it needs parent links.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ids::{ContextId, UserId};
use crate::protocol::codec::WireEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    ManageWorlds,
    AssignAdministrator,
    AssignModerator,
    AssignRoomOwner,
    AssignAreaManager,
    BanModerator,
    BanUser,
    MuteUsers,
    TeleportToUser,
    EnterPrivateRoom,
    ManagePrivateRoom,
    ContactContext,
    ContactUser,
}

impl Permission {
    pub const ALL: [Permission; 13] = [
        Permission::ManageWorlds,
        Permission::AssignAdministrator,
        Permission::AssignModerator,
        Permission::AssignRoomOwner,
        Permission::AssignAreaManager,
        Permission::BanModerator,
        Permission::BanUser,
        Permission::MuteUsers,
        Permission::TeleportToUser,
        Permission::EnterPrivateRoom,
        Permission::ManagePrivateRoom,
        Permission::ContactContext,
        Permission::ContactUser,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ManageWorlds => "manage-worlds",
            Permission::AssignAdministrator => "assign-administrator",
            Permission::AssignModerator => "assign-moderator",
            Permission::AssignRoomOwner => "assign-room-owner",
            Permission::AssignAreaManager => "assign-area-manager",
            Permission::BanModerator => "ban-moderator",
            Permission::BanUser => "ban-user",
            Permission::MuteUsers => "mute-users",
            Permission::TeleportToUser => "teleport-to-user",
            Permission::EnterPrivateRoom => "enter-private-room",
            Permission::ManagePrivateRoom => "manage-private-room",
            Permission::ContactContext => "contact-context",
            Permission::ContactUser => "contact-user",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Administrator,
    Moderator,
    RoomOwner,
    AreaManager,
    Bot,
}

impl WireEnum for Role {
    const NAME: &'static str = "Role";
    const VARIANTS: &'static [Self] = &[
        Role::Owner,
        Role::Administrator,
        Role::Moderator,
        Role::RoomOwner,
        Role::AreaManager,
        Role::Bot,
    ];
}

impl Role {
    /// Permissions granted by this role at the context it is held in.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Owner => &Permission::ALL,
            Role::Administrator => &[
                ManageWorlds,
                AssignModerator,
                BanModerator,
                BanUser,
                MuteUsers,
                TeleportToUser,
                EnterPrivateRoom,
                ContactContext,
                ContactUser,
            ],
            Role::Moderator => &[
                BanUser,
                MuteUsers,
                TeleportToUser,
                EnterPrivateRoom,
                ContactContext,
            ],
            Role::RoomOwner => &[ManagePrivateRoom, MuteUsers, AssignAreaManager],
            Role::AreaManager => &[MuteUsers],
            Role::Bot => &[EnterPrivateRoom, ContactUser],
        }
    }

    pub fn grants(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Administrator => "administrator",
            Role::Moderator => "moderator",
            Role::RoomOwner => "room-owner",
            Role::AreaManager => "area-manager",
            Role::Bot => "bot",
        }
    }
}

/// The roles one user holds at one context. Never stored empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRole {
    pub user: UserId,
    pub context: ContextId,
    pub roles: BTreeSet<Role>,
}

impl ContextRole {
    pub fn new(user: UserId, context: ContextId, role: Role) -> Self {
        let mut roles = BTreeSet::new();
        roles.insert(role);
        Self {
            user,
            context,
            roles,
        }
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.roles.iter().any(|r| r.grants(permission))
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn role_list(&self) -> Vec<Role> {
        self.roles.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_has_everything() {
        for p in Permission::ALL {
            assert!(Role::Owner.grants(p), "{p}");
        }
    }

    #[test]
    fn moderator_cannot_ban_moderators() {
        assert!(Role::Moderator.grants(Permission::BanUser));
        assert!(!Role::Moderator.grants(Permission::BanModerator));
        assert!(Role::Administrator.grants(Permission::BanModerator));
        assert!(!Role::Administrator.grants(Permission::AssignAdministrator));
    }

    #[test]
    fn context_role_unions_roles() {
        let mut cr = ContextRole::new(UserId::generate(), ContextId::root(), Role::AreaManager);
        assert!(!cr.grants(Permission::ManagePrivateRoom));
        cr.roles.insert(Role::RoomOwner);
        assert!(cr.grants(Permission::ManagePrivateRoom));
        assert_eq!(cr.role_list(), vec![Role::RoomOwner, Role::AreaManager]);
    }
}
