//! Built-in room layouts.
//!
//! A [`ContextMap`] describes the size of a room, where avatars spawn and the
//! tree of areas (with their interactables and ambient music) that is
//! generated below the room when it is created.

use serde::{Deserialize, Serialize};

use super::interactable::{Interactable, InteractableKind};
use crate::protocol::codec::WireEnum;

/// Axis-aligned rectangle in room coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Euclidean distance from a point to the nearest edge (0 when inside).
    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        let dx = (self.x - x).max(0.0).max(x - (self.x + self.width));
        let dy = (self.y - y).max(0.0).max(y - (self.y + self.height));
        (dx * dx + dy * dy).sqrt()
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Music {
    Calm,
    Upbeat,
    Jazz,
    Rain,
}

impl WireEnum for Music {
    const NAME: &'static str = "Music";
    const VARIANTS: &'static [Self] = &[Music::Calm, Music::Upbeat, Music::Jazz, Music::Rain];
}

/// Static description of one generated area.
#[derive(Debug)]
pub struct AreaTemplate {
    pub name: &'static str,
    pub bounds: Bounds,
    pub interactable: Option<(InteractableKind, Option<(f32, f32)>)>,
    pub music: Option<Music>,
    pub children: &'static [AreaTemplate],
}

impl AreaTemplate {
    pub fn interactable(&self) -> Option<Interactable> {
        self.interactable
            .map(|(kind, destination)| Interactable { kind, destination })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextMap {
    PublicPlaza,
    PrivateLounge,
    PrivateGarden,
}

impl WireEnum for ContextMap {
    const NAME: &'static str = "ContextMap";
    const VARIANTS: &'static [Self] = &[
        ContextMap::PublicPlaza,
        ContextMap::PrivateLounge,
        ContextMap::PrivateGarden,
    ];
}

const PLAZA: &[AreaTemplate] = &[
    AreaTemplate {
        name: "Lobby",
        bounds: Bounds::new(0.0, 20.0, 40.0, 10.0),
        interactable: None,
        music: None,
        children: &[AreaTemplate {
            name: "Reception",
            bounds: Bounds::new(18.0, 21.0, 4.0, 2.0),
            interactable: Some((InteractableKind::RoomReception, None)),
            music: None,
            children: &[],
        }],
    },
    AreaTemplate {
        name: "Stage",
        bounds: Bounds::new(0.0, 0.0, 20.0, 20.0),
        interactable: None,
        music: Some(Music::Upbeat),
        children: &[AreaTemplate {
            name: "Jukebox",
            bounds: Bounds::new(2.0, 2.0, 2.0, 2.0),
            interactable: Some((InteractableKind::MusicPlayer, None)),
            music: None,
            children: &[],
        }],
    },
    AreaTemplate {
        name: "Park",
        bounds: Bounds::new(20.0, 0.0, 20.0, 20.0),
        interactable: None,
        music: Some(Music::Calm),
        children: &[
            AreaTemplate {
                name: "Bench",
                bounds: Bounds::new(24.0, 4.0, 3.0, 1.0),
                interactable: Some((InteractableKind::Seat, None)),
                music: None,
                children: &[],
            },
            AreaTemplate {
                name: "Fountain",
                bounds: Bounds::new(32.0, 12.0, 3.0, 3.0),
                interactable: Some((InteractableKind::Portal, Some((20.0, 26.0)))),
                music: None,
                children: &[],
            },
        ],
    },
];

const LOUNGE: &[AreaTemplate] = &[AreaTemplate {
    name: "Lounge",
    bounds: Bounds::new(0.0, 0.0, 20.0, 15.0),
    interactable: None,
    music: Some(Music::Jazz),
    children: &[
        AreaTemplate {
            name: "Sofa",
            bounds: Bounds::new(8.0, 6.0, 4.0, 2.0),
            interactable: Some((InteractableKind::Seat, None)),
            music: None,
            children: &[],
        },
        AreaTemplate {
            name: "RecordPlayer",
            bounds: Bounds::new(1.0, 1.0, 2.0, 2.0),
            interactable: Some((InteractableKind::MusicPlayer, None)),
            music: None,
            children: &[],
        },
    ],
}];

const GARDEN: &[AreaTemplate] = &[AreaTemplate {
    name: "Garden",
    bounds: Bounds::new(0.0, 0.0, 30.0, 20.0),
    interactable: None,
    music: Some(Music::Rain),
    children: &[
        AreaTemplate {
            name: "Bench",
            bounds: Bounds::new(10.0, 10.0, 3.0, 1.0),
            interactable: Some((InteractableKind::Seat, None)),
            music: None,
            children: &[],
        },
        AreaTemplate {
            name: "Gate",
            bounds: Bounds::new(27.0, 0.0, 2.0, 2.0),
            interactable: Some((InteractableKind::Portal, Some((15.0, 17.0)))),
            music: None,
            children: &[],
        },
    ],
}];

impl ContextMap {
    pub fn bounds(self) -> Bounds {
        match self {
            ContextMap::PublicPlaza => Bounds::new(0.0, 0.0, 40.0, 30.0),
            ContextMap::PrivateLounge => Bounds::new(0.0, 0.0, 20.0, 15.0),
            ContextMap::PrivateGarden => Bounds::new(0.0, 0.0, 30.0, 20.0),
        }
    }

    pub fn spawn(self) -> (f32, f32) {
        match self {
            ContextMap::PublicPlaza => (20.0, 27.0),
            ContextMap::PrivateLounge => (10.0, 13.0),
            ContextMap::PrivateGarden => (15.0, 18.0),
        }
    }

    /// Name of the public room generated when a world uses this map.
    pub fn default_room_name(self) -> &'static str {
        match self {
            ContextMap::PublicPlaza => "Plaza",
            ContextMap::PrivateLounge => "Lounge",
            ContextMap::PrivateGarden => "Garden",
        }
    }

    pub fn layout(self) -> &'static [AreaTemplate] {
        match self {
            ContextMap::PublicPlaza => PLAZA,
            ContextMap::PrivateLounge => LOUNGE,
            ContextMap::PrivateGarden => GARDEN,
        }
    }
}
