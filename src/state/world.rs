//! World management, joining and leaving, and room changes.

use log::info;

use super::ServerState;
use crate::context::{ContextKind, ContextMap, Permission};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId};
use crate::logutil::{escape_log, sec_log};
use crate::notification::MessageBundle;
use crate::protocol::{
    AvatarMove, ContextInfo, ContextJoin, ContextMusic, MoveAction, UserInfo, UserInfoAction,
    UserRecord,
};
use crate::storage::WorldRecord;
use crate::user::Location;
use crate::validation::validate_context_name;

impl ServerState {
    fn require_world(&self, world: &ContextId) -> CoreResult<()> {
        match self.tree.get(world) {
            Ok(ctx) if ctx.kind == ContextKind::World => Ok(()),
            _ => Err(CoreError::not_found("world.unknown", world)),
        }
    }

    pub fn create_world(&mut self, user: UserId, name: &str, map: ContextMap) -> CoreResult<ContextId> {
        self.begin(user)?;
        self.require_permission(user, &ContextId::root(), Permission::ManageWorlds)?;
        let name = validate_context_name(name)
            .map_err(|e| CoreError::IllegalWorldAction(e.message_key()))?;
        let world = self.tree.insert_world(&name, map)?;
        self.store.save_world(&WorldRecord {
            id: world.clone(),
            name: name.clone(),
            map,
        });
        sec_log!("World {} created by {}", escape_log(&name), user.short());
        self.broadcast_world_list();
        Ok(world)
    }

    /// Remove a world, sending everybody inside it back to the world list.
    pub fn delete_world(&mut self, user: UserId, world: &ContextId) -> CoreResult<()> {
        self.begin(user)?;
        self.require_permission(user, &ContextId::root(), Permission::ManageWorlds)?;
        self.require_world(world)?;
        let name = self.tree.get(world)?.name.clone();
        for member in self.world_members(world) {
            self.leave_world_inner(member);
            self.send_info(member, MessageBundle::new("world.deleted").arg(&name));
        }
        self.remove_contexts(world)?;
        self.store.delete_world(world);
        sec_log!("World {} deleted by {}", escape_log(&name), user.short());
        self.broadcast_world_list();
        Ok(())
    }

    pub fn join_world(&mut self, user: UserId, world: &ContextId) -> CoreResult<()> {
        self.begin(user)?;
        if self.users.get(user)?.current_world.is_some() {
            return Err(CoreError::IllegalWorldAction("world.already-joined"));
        }
        self.require_world(world)?;
        let room = self
            .tree
            .public_room(world)
            .ok_or(CoreError::IllegalState("world.no-public-room"))?;
        let (x, y) = self.room_map(&room)?.spawn();
        self.relocate(user, &room, x, y)
    }

    pub fn leave_world(&mut self, user: UserId) -> CoreResult<()> {
        self.begin_in_world(user)?;
        self.leave_world_inner(user);
        Ok(())
    }

    fn room_map(&self, room: &ContextId) -> CoreResult<ContextMap> {
        self.tree
            .get(room)?
            .room
            .as_ref()
            .map(|r| r.map)
            .ok_or(CoreError::IllegalState("context.not-a-room"))
    }

    /// Put a user at `(x, y)` in `room`, switching world and room as needed.
    pub(crate) fn relocate(&mut self, user: UserId, room: &ContextId, x: f32, y: f32) -> CoreResult<()> {
        let world = self
            .tree
            .world_of(room)
            .ok_or(CoreError::IllegalState("context.not-a-room"))?;
        if self.tree.moderation(&world)?.banned.contains(&user) {
            return Err(CoreError::IllegalWorldAction("world.banned"));
        }
        let current = self.users.get(user)?.current_world.clone();
        let switching_world = current.as_ref() != Some(&world);
        if switching_world && current.is_some() {
            self.leave_world_inner(user);
        }
        let same_room = self.users.get(user)?.room() == Some(room);
        if same_room {
            let direction = self.location(user)?.direction;
            self.close_menu(user);
            return self.place_avatar(user, x, y, false, direction, true);
        }
        self.enter_room(user, &world, room, x, y)?;
        if switching_world {
            info!("{} joined world {}", user.short(), world);
            self.exchange_world_rosters(user, &world);
        }
        Ok(())
    }

    fn enter_room(
        &mut self,
        user: UserId,
        world: &ContextId,
        room: &ContextId,
        x: f32,
        y: f32,
    ) -> CoreResult<()> {
        let map = self.room_map(room)?;
        let room_ctx = self.tree.get(room)?;
        let (name, private) = (room_ctx.name.clone(), room_ctx.is_private_room());
        let area = self.tree.area_at(room, x, y)?;

        self.close_menu(user);
        let previous = self.users.get(user)?.location.clone();
        if let Some(prev) = &previous {
            self.despawn(user, prev);
        }
        let direction = previous.as_ref().map(|l| l.direction).unwrap_or_default();
        let u = self.users.get_mut(user)?;
        u.current_world = Some(world.clone());
        u.location = Some(Location {
            room: room.clone(),
            area: area.clone(),
            x,
            y,
            direction,
        });

        let muted = self.tree.is_muted(user, &area);
        let track = self.tree.music_at(&area);
        self.send(
            user,
            ContextJoin {
                context: room.clone(),
                name: name.clone(),
                map: Some(map),
            },
        );
        self.send(
            user,
            ContextInfo {
                context: room.clone(),
                name,
                private,
                muted,
            },
        );
        self.send(user, ContextMusic { context: area, track });

        let spawn = |who: UserId, loc: &Location| AvatarMove {
            action: MoveAction::Spawn,
            user: Some(who),
            x: loc.x,
            y: loc.y,
            sprinting: false,
            direction: loc.direction,
        };
        let members = self.room_members(room);
        let mut existing = Vec::new();
        for member in &members {
            if let Ok(Some(loc)) = self.users.get(*member).map(|u| u.location.as_ref()) {
                existing.push(spawn(*member, loc));
            }
        }
        for packet in existing {
            self.send(user, packet);
        }
        let own = spawn(user, &self.location(user)?);
        for member in members.into_iter().filter(|m| *m != user) {
            self.send(member, own.clone());
        }

        if let Some(prev) = previous {
            self.remove_room_if_abandoned(&prev.room);
        }
        Ok(())
    }

    /// Tell the other users in a room that `user` left it.
    fn despawn(&mut self, user: UserId, location: &Location) {
        let packet = AvatarMove {
            action: MoveAction::Remove,
            user: Some(user),
            x: location.x,
            y: location.y,
            sprinting: false,
            direction: location.direction,
        };
        for member in self.room_members(&location.room) {
            if member != user {
                self.send(member, packet.clone());
            }
        }
    }

    /// Leave the current world without precondition checks.
    pub(crate) fn leave_world_inner(&mut self, user: UserId) {
        let Ok(u) = self.users.get(user) else {
            return;
        };
        let Some(world) = u.current_world.clone() else {
            return;
        };
        let location = u.location.clone();
        if let Some(loc) = &location {
            self.despawn(user, loc);
            let name = self
                .tree
                .get(&loc.room)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            self.send(
                user,
                ContextJoin {
                    context: loc.room.clone(),
                    name,
                    map: None,
                },
            );
        }
        if let Ok(u) = self.users.get_mut(user) {
            u.clear_location();
        }
        for member in self.world_members(&world) {
            self.send(
                member,
                UserInfo {
                    action: UserInfoAction::Remove,
                    context: Some(world.clone()),
                    records: vec![UserRecord::bare(user)],
                },
            );
        }
        if let Some(loc) = location {
            self.remove_room_if_abandoned(&loc.room);
        }
        info!("{} left world {}", user.short(), world);
    }

    /// Private rooms disappear with their last occupant.
    pub(crate) fn remove_room_if_abandoned(&mut self, room: &ContextId) {
        let private = self
            .tree
            .get(room)
            .map_or(false, |ctx| ctx.is_private_room());
        if private && self.room_members(room).is_empty() {
            if let Ok(removed) = self.remove_contexts(room) {
                info!("Removed empty private room {} ({} contexts)", room, removed.len());
            }
        }
    }
}
