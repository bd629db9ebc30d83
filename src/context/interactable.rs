//! Objects inside an area that open a menu when a user interacts with them.

use serde::{Deserialize, Serialize};

use super::map::{ContextMap, Music};
use crate::error::{CoreError, CoreResult};
use crate::protocol::codec::WireEnum;

/// How far (in room units) an avatar may stand from an interactable's bounds.
pub const INTERACT_REACH: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractableKind {
    RoomReception,
    Portal,
    Seat,
    MusicPlayer,
}

impl WireEnum for InteractableKind {
    const NAME: &'static str = "InteractableKind";
    const VARIANTS: &'static [Self] = &[
        InteractableKind::RoomReception,
        InteractableKind::Portal,
        InteractableKind::Seat,
        InteractableKind::MusicPlayer,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interactable {
    pub kind: InteractableKind,
    /// Target position for portals.
    pub destination: Option<(f32, f32)>,
}

/// A validated menu selection.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuChoice {
    CreateRoom {
        name: String,
        password: Option<String>,
        map: ContextMap,
    },
    JoinRoom {
        name: String,
        password: Option<String>,
    },
    ListRooms,
    UsePortal,
    Sit,
    Stand,
    PlayMusic(Music),
    StopMusic,
}

impl InteractableKind {
    /// Turn a raw `(option, args)` pair from a MenuOption packet into a choice.
    pub fn parse_option(self, option: u32, args: &[String]) -> CoreResult<MenuChoice> {
        use InteractableKind::*;
        match (self, option) {
            (RoomReception, 0) => match args {
                [name, password, map] => Ok(MenuChoice::CreateRoom {
                    name: name.trim().to_string(),
                    password: non_empty(password),
                    map: parse_enum::<ContextMap>(map)
                        .ok_or(CoreError::IllegalMenuAction("menu.invalid-map"))?,
                }),
                _ => Err(CoreError::IllegalMenuAction("menu.bad-arguments")),
            },
            (RoomReception, 1) => match args {
                [name] => Ok(MenuChoice::JoinRoom {
                    name: name.trim().to_string(),
                    password: None,
                }),
                [name, password] => Ok(MenuChoice::JoinRoom {
                    name: name.trim().to_string(),
                    password: non_empty(password),
                }),
                _ => Err(CoreError::IllegalMenuAction("menu.bad-arguments")),
            },
            (RoomReception, 2) => no_args(args, MenuChoice::ListRooms),
            (Portal, 0) => no_args(args, MenuChoice::UsePortal),
            (Seat, 0) => no_args(args, MenuChoice::Sit),
            (Seat, 1) => no_args(args, MenuChoice::Stand),
            (MusicPlayer, 0) => match args {
                [track] => parse_enum::<Music>(track)
                    .map(MenuChoice::PlayMusic)
                    .ok_or(CoreError::IllegalMenuAction("menu.invalid-track")),
                _ => Err(CoreError::IllegalMenuAction("menu.bad-arguments")),
            },
            (MusicPlayer, 1) => no_args(args, MenuChoice::StopMusic),
            _ => Err(CoreError::IllegalMenuAction("menu.unknown-option")),
        }
    }
}

fn no_args(args: &[String], choice: MenuChoice) -> CoreResult<MenuChoice> {
    if args.is_empty() {
        Ok(choice)
    } else {
        Err(CoreError::IllegalMenuAction("menu.bad-arguments"))
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Accept either an ordinal (`"1"`) or a variant name (`"PrivateLounge"`, any case).
fn parse_enum<E: WireEnum + std::fmt::Debug>(raw: &str) -> Option<E> {
    let raw = raw.trim();
    if let Ok(ordinal) = raw.parse::<u32>() {
        return E::from_ordinal(ordinal);
    }
    E::VARIANTS
        .iter()
        .copied()
        .find(|v| format!("{v:?}").eq_ignore_ascii_case(raw))
}
