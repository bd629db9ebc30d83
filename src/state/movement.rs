//! Avatar movement, interactables and their menus.

use log::{debug, warn};

use super::ServerState;
use crate::context::{ContextKind, ContextMap, MenuChoice, Music, Permission, Role, INTERACT_REACH};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::logutil::escape_log;
use crate::protocol::{
    AvatarMove, ContextEntry, ContextInfo, ContextList, ContextMusic, MenuAction, MoveAction,
};
use crate::user::Direction;
use crate::validation::validate_context_name;

impl ServerState {
    pub fn move_avatar(
        &mut self,
        user: UserId,
        x: f32,
        y: f32,
        sprinting: bool,
        direction: Direction,
    ) -> CoreResult<()> {
        self.begin_in_world(user)?;
        if !self.users.get(user)?.moveable {
            return Err(CoreError::IllegalState("move.locked"));
        }
        let room = self.location(user)?.room;
        if !self.positions.is_legal(&self.tree, &room, x, y) {
            return Err(CoreError::IllegalPosition { x, y });
        }
        self.place_avatar(user, x, y, sprinting, direction, false)
    }

    /// Update a position inside the current room and broadcast it.
    /// `echo` also sends the move back to the user (server-initiated moves).
    pub(crate) fn place_avatar(
        &mut self,
        user: UserId,
        x: f32,
        y: f32,
        sprinting: bool,
        direction: Direction,
        echo: bool,
    ) -> CoreResult<()> {
        let before = self.location(user)?;
        let area = self.tree.area_at(&before.room, x, y)?;
        let location = self
            .users
            .get_mut(user)?
            .location
            .as_mut()
            .ok_or(CoreError::NotInWorld)?;
        location.x = x;
        location.y = y;
        location.direction = direction;
        location.area = area.clone();

        if area != before.area {
            let track = self.tree.music_at(&area);
            if track != self.tree.music_at(&before.area) {
                self.send(user, ContextMusic { context: area.clone(), track });
            }
            let muted = self.tree.is_muted(user, &area);
            if muted != self.tree.is_muted(user, &before.area) {
                self.send_room_info(user, &before.room, muted)?;
            }
        }

        let packet = AvatarMove {
            action: MoveAction::Move,
            user: Some(user),
            x,
            y,
            sprinting,
            direction,
        };
        for member in self.room_members(&before.room) {
            if echo || member != user {
                self.send(member, packet.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn send_room_info(&mut self, user: UserId, room: &ContextId, muted: bool) -> CoreResult<()> {
        let ctx = self.tree.get(room)?;
        let info = ContextInfo {
            context: room.clone(),
            name: ctx.name.clone(),
            private: ctx.is_private_room(),
            muted,
        };
        self.send(user, info);
        Ok(())
    }

    /// Open the menu of an interactable within reach, or close it when it is
    /// the one already open.
    pub fn interact(&mut self, user: UserId, target: &ContextId) -> CoreResult<()> {
        self.begin_in_world(user)?;
        if let Some(open) = self.users.get(user)?.interactable.clone() {
            if open == *target {
                self.close_menu(user);
                return Ok(());
            }
            return Err(CoreError::IllegalInteraction("interact.busy"));
        }
        let location = self.location(user)?;
        let ctx = self
            .tree
            .get(target)
            .map_err(|_| CoreError::IllegalInteraction("interact.unknown"))?;
        let interactable = ctx
            .interactable
            .ok_or(CoreError::IllegalInteraction("interact.not-interactable"))?;
        let in_area = ctx
            .parent
            .as_ref()
            .map_or(false, |parent| self.tree.is_ancestor_of(parent, &location.area));
        let in_reach = ctx
            .bounds
            .map_or(false, |b| b.distance_to(location.x, location.y) <= INTERACT_REACH);
        if !in_area || !in_reach {
            return Err(CoreError::IllegalInteraction("interact.out-of-reach"));
        }

        let u = self.users.get_mut(user)?;
        u.interactable = Some(target.clone());
        u.moveable = false;
        self.send(
            user,
            MenuAction {
                context: target.clone(),
                kind: interactable.kind,
                open: true,
            },
        );
        debug!("{} opened {}", user.short(), target);
        Ok(())
    }

    /// Close the open menu, if any, and unlock movement.
    pub fn close_menu(&mut self, user: UserId) {
        let Ok(u) = self.users.get_mut(user) else {
            return;
        };
        u.moveable = true;
        let Some(open) = u.interactable.take() else {
            return;
        };
        if let Some(interactable) = self.tree.get(&open).ok().and_then(|c| c.interactable) {
            self.send(
                user,
                MenuAction {
                    context: open,
                    kind: interactable.kind,
                    open: false,
                },
            );
        }
    }

    /// Run a menu option on the open interactable.
    pub fn execute_option(
        &mut self,
        user: UserId,
        target: &ContextId,
        option: u32,
        args: &[String],
    ) -> CoreResult<()> {
        let world = self.begin_in_world(user)?;
        if self.users.get(user)?.interactable.as_ref() != Some(target) {
            return Err(CoreError::IllegalInteraction("menu.mismatch"));
        }
        let ctx = self.tree.get(target)?;
        let interactable = ctx
            .interactable
            .ok_or(CoreError::IllegalInteraction("menu.mismatch"))?;
        let holder = ctx.parent.clone().unwrap_or_else(ContextId::root);
        let seat = ctx.bounds;

        match interactable.kind.parse_option(option, args)? {
            MenuChoice::CreateRoom {
                name,
                password,
                map,
            } => self.create_private_room(user, &world, &name, password.as_deref(), map),
            MenuChoice::JoinRoom { name, password } => {
                self.join_private_room(user, &world, &name, password.as_deref())
            }
            MenuChoice::ListRooms => {
                let list = self.room_list(&world);
                self.send(user, list);
                Ok(())
            }
            MenuChoice::UsePortal => {
                let (x, y) = interactable
                    .destination
                    .ok_or(CoreError::IllegalMenuAction("menu.portal-unlinked"))?;
                let direction = self.location(user)?.direction;
                self.close_menu(user);
                self.place_avatar(user, x, y, false, direction, true)
            }
            MenuChoice::Sit => {
                let Some(bounds) = seat else {
                    return Err(CoreError::IllegalMenuAction("menu.unknown-option"));
                };
                let direction = self.location(user)?.direction;
                let (x, y) = (bounds.x + bounds.width / 2.0, bounds.y + bounds.height / 2.0);
                self.place_avatar(user, x, y, false, direction, true)
            }
            MenuChoice::Stand => {
                self.close_menu(user);
                Ok(())
            }
            MenuChoice::PlayMusic(track) => self.set_music(&holder, Some(track)),
            MenuChoice::StopMusic => self.set_music(&holder, None),
        }
    }

    pub fn room_list(&self, world: &ContextId) -> ContextList {
        ContextList {
            parent: Some(world.clone()),
            entries: self
                .tree
                .rooms(world)
                .into_iter()
                .map(|r| ContextEntry {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    private: r.is_private_room(),
                })
                .collect(),
        }
    }

    fn set_music(&mut self, area: &ContextId, track: Option<Music>) -> CoreResult<()> {
        self.tree.get_mut(area)?.music = track;
        let room = self
            .tree
            .room_of(area)
            .ok_or(CoreError::IllegalState("context.not-a-room"))?;
        let effective = self.tree.music_at(area);
        let listeners: Vec<UserId> = self
            .room_members(&room)
            .into_iter()
            .filter(|m| {
                self.users
                    .get(*m)
                    .ok()
                    .and_then(|u| u.area())
                    .map_or(false, |a| self.tree.is_ancestor_of(area, a))
            })
            .collect();
        self.send_to_all(
            &listeners,
            ContextMusic {
                context: area.clone(),
                track: effective,
            },
        );
        Ok(())
    }

    fn create_private_room(
        &mut self,
        user: UserId,
        world: &ContextId,
        name: &str,
        password: Option<&str>,
        map: ContextMap,
    ) -> CoreResult<()> {
        let name =
            validate_context_name(name).map_err(|e| CoreError::IllegalMenuAction(e.message_key()))?;
        let hash = match password {
            Some(password) => Some(self.passwords.hash(password).map_err(|e| {
                warn!("Hashing room password failed: {}", e);
                CoreError::IllegalMenuAction("room.hash-failed")
            })?),
            None => None,
        };
        let room = self.tree.insert_room(world, &name, map, true, hash)?;
        self.grant_role(user, &room, Role::RoomOwner)?;
        debug!("{} created private room {}", user.short(), escape_log(&name));
        let (x, y) = map.spawn();
        self.relocate(user, &room, x, y)
    }

    fn join_private_room(
        &mut self,
        user: UserId,
        world: &ContextId,
        name: &str,
        password: Option<&str>,
    ) -> CoreResult<()> {
        let room = self
            .tree
            .find_child(world, name)
            .filter(|c| c.kind == ContextKind::Room)
            .map(|c| c.id.clone())
            .ok_or_else(|| CoreError::not_found("room.unknown", name))?;
        self.check_room_entry(user, &room, password)?;
        let map = self
            .tree
            .get(&room)?
            .room
            .as_ref()
            .map(|r| r.map)
            .ok_or(CoreError::IllegalState("context.not-a-room"))?;
        let (x, y) = map.spawn();
        self.relocate(user, &room, x, y)
    }

    /// Admission to a private room: invitation, room management rights,
    /// `EnterPrivateRoom`, or the room password.
    pub(crate) fn check_room_entry(
        &self,
        user: UserId,
        room: &ContextId,
        password: Option<&str>,
    ) -> CoreResult<()> {
        let Some(settings) = self.tree.get(room)?.room.as_ref() else {
            return Err(CoreError::IllegalState("context.not-a-room"));
        };
        if !settings.private
            || settings.invited.contains(&user)
            || self.has_permission(user, room, Permission::EnterPrivateRoom)
            || self.has_permission(user, room, Permission::ManagePrivateRoom)
        {
            return Ok(());
        }
        match (&settings.password_hash, password) {
            (Some(hash), Some(password)) if self.passwords.verify(password, hash) => Ok(()),
            (Some(_), Some(_)) => Err(CoreError::IllegalMenuAction("room.wrong-password")),
            _ => Err(CoreError::NoPermission(Permission::EnterPrivateRoom)),
        }
    }
}
