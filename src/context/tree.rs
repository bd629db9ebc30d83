use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::interactable::Interactable;
use super::map::{AreaTemplate, Bounds, ContextMap, Music};
use super::permission::{ContextRole, Permission};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ContextId, UserId, ROOT_CONTEXT_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKind {
    Global,
    World,
    Room,
    Area,
}

/// Ban and report bookkeeping, present on world contexts only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldModeration {
    pub banned: HashSet<UserId>,
    pub reported: HashSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub map: ContextMap,
    pub private: bool,
    pub password_hash: Option<String>,
    /// Users admitted to a private room by invitation.
    pub invited: HashSet<UserId>,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub id: ContextId,
    pub name: String,
    pub kind: ContextKind,
    pub parent: Option<ContextId>,
    pub children: BTreeSet<ContextId>,
    pub muted: HashSet<UserId>,
    pub moderation: Option<WorldModeration>,
    pub room: Option<RoomSettings>,
    pub bounds: Option<Bounds>,
    pub interactable: Option<Interactable>,
    pub music: Option<Music>,
}

impl Context {
    fn new(id: ContextId, name: &str, kind: ContextKind, parent: Option<ContextId>) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            parent,
            children: BTreeSet::new(),
            muted: HashSet::new(),
            moderation: (kind == ContextKind::World).then(WorldModeration::default),
            room: None,
            bounds: None,
            interactable: None,
            music: None,
        }
    }

    pub fn is_private_room(&self) -> bool {
        self.room.as_ref().map_or(false, |r| r.private)
    }
}

/// The containment hierarchy: one global root, worlds below it, rooms below
/// worlds and (possibly nested) areas below rooms.
#[derive(Debug, Clone)]
pub struct ContextTree {
    contexts: HashMap<ContextId, Context>,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        let root = ContextId::root();
        let mut contexts = HashMap::new();
        contexts.insert(
            root.clone(),
            Context::new(root, ROOT_CONTEXT_NAME, ContextKind::Global, None),
        );
        Self { contexts }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn contains(&self, id: &ContextId) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn get(&self, id: &ContextId) -> CoreResult<&Context> {
        self.contexts
            .get(id)
            .ok_or_else(|| CoreError::not_found("context.unknown", id))
    }

    pub fn get_mut(&mut self, id: &ContextId) -> CoreResult<&mut Context> {
        self.contexts
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("context.unknown", id))
    }

    pub fn parent(&self, id: &ContextId) -> CoreResult<Option<&ContextId>> {
        Ok(self.get(id)?.parent.as_ref())
    }

    pub fn children(&self, id: &ContextId) -> CoreResult<&BTreeSet<ContextId>> {
        Ok(&self.get(id)?.children)
    }

    fn attach(&mut self, context: Context) -> CoreResult<ContextId> {
        let id = context.id.clone();
        if self.contexts.contains_key(&id) {
            return Err(CoreError::IllegalState("context.name-taken"));
        }
        if let Some(parent) = &context.parent {
            self.get_mut(parent)?.children.insert(id.clone());
        }
        self.contexts.insert(id.clone(), context);
        Ok(id)
    }

    /// Create a world with its public room (and that room's areas).
    pub fn insert_world(&mut self, name: &str, map: ContextMap) -> CoreResult<ContextId> {
        let root = ContextId::root();
        if self.find_child(&root, name).is_some() {
            return Err(CoreError::IllegalWorldAction("world.name-taken"));
        }
        let world = self.attach(Context::new(
            root.child(name),
            name,
            ContextKind::World,
            Some(root),
        ))?;
        self.insert_room(&world, map.default_room_name(), map, false, None)?;
        Ok(world)
    }

    pub fn insert_room(
        &mut self,
        world: &ContextId,
        name: &str,
        map: ContextMap,
        private: bool,
        password_hash: Option<String>,
    ) -> CoreResult<ContextId> {
        if self.get(world)?.kind != ContextKind::World {
            return Err(CoreError::IllegalState("context.room-outside-world"));
        }
        if self.find_child(world, name).is_some() {
            return Err(CoreError::IllegalState("room.name-taken"));
        }
        let mut room = Context::new(world.child(name), name, ContextKind::Room, Some(world.clone()));
        room.bounds = Some(map.bounds());
        room.room = Some(RoomSettings {
            map,
            private,
            password_hash,
            invited: HashSet::new(),
        });
        let room = self.attach(room)?;
        self.insert_layout(&room, map.layout())?;
        Ok(room)
    }

    fn insert_layout(&mut self, parent: &ContextId, areas: &[AreaTemplate]) -> CoreResult<()> {
        for template in areas {
            let area = self.insert_area(
                parent,
                template.name,
                template.bounds,
                template.interactable(),
                template.music,
            )?;
            self.insert_layout(&area, template.children)?;
        }
        Ok(())
    }

    pub fn insert_area(
        &mut self,
        parent: &ContextId,
        name: &str,
        bounds: Bounds,
        interactable: Option<Interactable>,
        music: Option<Music>,
    ) -> CoreResult<ContextId> {
        match self.get(parent)?.kind {
            ContextKind::World | ContextKind::Room | ContextKind::Area => {}
            ContextKind::Global => {
                return Err(CoreError::IllegalState("context.area-at-root"));
            }
        }
        let mut area = Context::new(parent.child(name), name, ContextKind::Area, Some(parent.clone()));
        area.bounds = Some(bounds);
        area.interactable = interactable;
        area.music = music;
        self.attach(area)
    }

    /// Detach and drop a context with its whole subtree. Returns the removed ids.
    pub fn remove(&mut self, id: &ContextId) -> CoreResult<Vec<ContextId>> {
        if id.is_root() {
            return Err(CoreError::IllegalState("context.root-is-permanent"));
        }
        let parent = self.get(id)?.parent.clone();
        if let Some(parent) = parent {
            self.get_mut(&parent)?.children.remove(id);
        }
        let mut removed = self.descendants(id)?;
        removed.insert(0, id.clone());
        for gone in &removed {
            self.contexts.remove(gone);
        }
        Ok(removed)
    }

    /// All contexts strictly below `id`, parents before children.
    pub fn descendants(&self, id: &ContextId) -> CoreResult<Vec<ContextId>> {
        let mut out = Vec::new();
        let mut stack: Vec<ContextId> = self.get(id)?.children.iter().rev().cloned().collect();
        while let Some(next) = stack.pop() {
            if let Some(ctx) = self.contexts.get(&next) {
                stack.extend(ctx.children.iter().rev().cloned());
            }
            out.push(next);
        }
        Ok(out)
    }

    /// `id` first, root last.
    pub fn path_to_root(&self, id: &ContextId) -> CoreResult<Vec<ContextId>> {
        let mut path = vec![id.clone()];
        let mut cursor = self.get(id)?;
        while let Some(parent) = &cursor.parent {
            path.push(parent.clone());
            cursor = self.get(parent)?;
        }
        Ok(path)
    }

    /// True when `ancestor` is `id` or lies on its path to the root.
    pub fn is_ancestor_of(&self, ancestor: &ContextId, id: &ContextId) -> bool {
        self.path_to_root(id)
            .map(|path| path.contains(ancestor))
            .unwrap_or(false)
    }

    /// Deepest context containing both `a` and `b`.
    pub fn last_common_ancestor(&self, a: &ContextId, b: &ContextId) -> CoreResult<ContextId> {
        let a_path = self.path_to_root(a)?;
        let b_path: HashSet<ContextId> = self.path_to_root(b)?.into_iter().collect();
        a_path
            .into_iter()
            .find(|c| b_path.contains(c))
            .ok_or_else(|| CoreError::not_found("context.unrelated", b))
    }

    fn ancestor_of_kind(&self, id: &ContextId, kind: ContextKind) -> Option<ContextId> {
        self.path_to_root(id)
            .ok()?
            .into_iter()
            .find(|c| self.contexts.get(c).map(|ctx| ctx.kind) == Some(kind))
    }

    pub fn world_of(&self, id: &ContextId) -> Option<ContextId> {
        self.ancestor_of_kind(id, ContextKind::World)
    }

    pub fn room_of(&self, id: &ContextId) -> Option<ContextId> {
        self.ancestor_of_kind(id, ContextKind::Room)
    }

    pub fn find_child(&self, parent: &ContextId, name: &str) -> Option<&Context> {
        let parent = self.contexts.get(parent)?;
        parent
            .children
            .iter()
            .filter_map(|c| self.contexts.get(c))
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn worlds(&self) -> Vec<&Context> {
        self.children_of_kind(&ContextId::root(), ContextKind::World)
    }

    pub fn rooms(&self, world: &ContextId) -> Vec<&Context> {
        self.children_of_kind(world, ContextKind::Room)
    }

    fn children_of_kind(&self, parent: &ContextId, kind: ContextKind) -> Vec<&Context> {
        self.contexts
            .get(parent)
            .map(|p| {
                p.children
                    .iter()
                    .filter_map(|c| self.contexts.get(c))
                    .filter(|c| c.kind == kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First public room of a world; users spawn there on join.
    pub fn public_room(&self, world: &ContextId) -> Option<ContextId> {
        self.rooms(world)
            .into_iter()
            .find(|r| !r.is_private_room())
            .map(|r| r.id.clone())
    }

    /// Deepest area of `room` whose bounds contain the point, or the room itself.
    pub fn area_at(&self, room: &ContextId, x: f32, y: f32) -> CoreResult<ContextId> {
        let mut current = self.get(room)?;
        'descend: loop {
            for child in &current.children {
                if let Some(ctx) = self.contexts.get(child) {
                    if ctx.kind == ContextKind::Area
                        && ctx.bounds.map_or(false, |b| b.contains(x, y))
                    {
                        current = ctx;
                        continue 'descend;
                    }
                }
            }
            return Ok(current.id.clone());
        }
    }

    /// Music audible at a context: the nearest track on its path to the room.
    pub fn music_at(&self, id: &ContextId) -> Option<Music> {
        let path = self.path_to_root(id).ok()?;
        path.iter()
            .filter_map(|c| self.contexts.get(c))
            .take_while(|c| matches!(c.kind, ContextKind::Area | ContextKind::Room))
            .find_map(|c| c.music)
    }

    /// Returns false when the user was already muted at exactly this node.
    pub fn add_muted_user(&mut self, id: &ContextId, user: UserId) -> CoreResult<bool> {
        Ok(self.get_mut(id)?.muted.insert(user))
    }

    pub fn remove_muted_user(&mut self, id: &ContextId, user: UserId) -> CoreResult<bool> {
        Ok(self.get_mut(id)?.muted.remove(&user))
    }

    /// Muted at `id` or any of its ancestors.
    pub fn is_muted(&self, user: UserId, id: &ContextId) -> bool {
        self.path_to_root(id)
            .map(|path| {
                path.iter()
                    .filter_map(|c| self.contexts.get(c))
                    .any(|c| c.muted.contains(&user))
            })
            .unwrap_or(false)
    }

    /// Highest context on the path from `id` to the root where `user` is muted.
    pub fn highest_mute(&self, user: UserId, id: &ContextId) -> Option<ContextId> {
        self.path_to_root(id)
            .ok()?
            .into_iter()
            .rev()
            .find(|c| self.contexts.get(c).map_or(false, |ctx| ctx.muted.contains(&user)))
    }

    pub fn moderation(&self, world: &ContextId) -> CoreResult<&WorldModeration> {
        self.get(world)?
            .moderation
            .as_ref()
            .ok_or(CoreError::IllegalState("context.not-a-world"))
    }

    pub fn moderation_mut(&mut self, world: &ContextId) -> CoreResult<&mut WorldModeration> {
        self.get_mut(world)?
            .moderation
            .as_mut()
            .ok_or(CoreError::IllegalState("context.not-a-world"))
    }

    /// Role held at `id` grants `permission`, or the same holds at the parent.
    /// The root has no parent, so the recursion bottoms out with `false`.
    pub fn has_permission(
        &self,
        roles: &HashMap<ContextId, ContextRole>,
        id: &ContextId,
        permission: Permission,
    ) -> bool {
        if roles.get(id).map_or(false, |r| r.grants(permission)) {
            return true;
        }
        match self.contexts.get(id).and_then(|c| c.parent.as_ref()) {
            Some(parent) => self.has_permission(roles, parent, permission),
            None => false,
        }
    }
}
