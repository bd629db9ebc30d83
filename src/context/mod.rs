//! Spatial containment model: the context tree, its permissions and the
//! layouts that populate rooms with areas and interactables.

pub mod interactable;
pub mod map;
pub mod permission;
pub mod tree;

pub use interactable::{Interactable, InteractableKind, MenuChoice, INTERACT_REACH};
pub use map::{Bounds, ContextMap, Music};
pub use permission::{ContextRole, Permission, Role};
pub use tree::{Context, ContextKind, ContextTree, RoomSettings, WorldModeration};

/// Decides whether an avatar may stand at a position inside a room.
pub trait PositionPolicy: Send + Sync {
    fn is_legal(&self, tree: &ContextTree, room: &crate::ids::ContextId, x: f32, y: f32) -> bool;
}

/// Accepts any finite position inside the room's map bounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapBounds;

impl PositionPolicy for MapBounds {
    fn is_legal(&self, tree: &ContextTree, room: &crate::ids::ContextId, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        tree.get(room)
            .ok()
            .and_then(|ctx| ctx.bounds)
            .map_or(false, |b| b.contains(x, y))
    }
}
