//! Level data contract.
//!
//! Levels are authored elsewhere and arrive already validated. The server
//! only reads them: interactables and puzzles are copied into a session when
//! the game starts.

use crate::types::{
    ButtonState, CameraNodeState, CrateState, DoorState, HazardState, Interactable,
    InteractableKind, LeverState, PlateThreshold, PlatformState, PressurePlateState, Role, Vec3,
    WinchState,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    #[default]
    Floor,
    Grass,
    Stone,
    Bridge,
    Wall,
    Water,
    Void,
}

impl TileKind {
    pub fn is_walkable(self) -> bool {
        !matches!(self, TileKind::Wall | TileKind::Water | TileKind::Void)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tile {
    pub kind: TileKind,
    pub elevation: i32,
}

/// The two named spawn points, one per role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spawns {
    pub strength: Vec3,
    pub scout: Vec3,
}

impl Spawns {
    pub fn for_role(&self, role: Role) -> Vec3 {
        match role {
            Role::Strength => self.strength,
            Role::Scout => self.scout,
        }
    }
}

/// Axis-aligned rectangle on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Zone {
    pub fn contains(&self, position: &Vec3) -> bool {
        position.x >= self.x
            && position.x <= self.x + self.width
            && position.y >= self.y
            && position.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectiveCondition {
    /// Every listed field of the target's state equals the given value.
    InteractableState {
        target: String,
        state: Map<String, Value>,
    },
    BothPlayersInZone {
        zone: Zone,
    },
    /// Structural marker; the puzzle aggregates its own objectives.
    AllObjectives,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub optional: bool,
    pub condition: ObjectiveCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleConfig {
    pub id: String,
    pub name: String,
    pub objectives: Vec<ObjectiveConfig>,
    /// Door opened once when the puzzle completes.
    #[serde(default)]
    pub reward_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major grid, `tiles[y][x]`.
    pub tiles: Vec<Vec<Tile>>,
    pub spawns: Spawns,
    #[serde(default)]
    pub interactables: Vec<Interactable>,
    #[serde(default)]
    pub puzzles: Vec<PuzzleConfig>,
}

impl LevelData {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn in_bounds(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32
    }

    pub fn tile_at(&self, x: f32, y: f32) -> Option<&Tile> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.tiles
            .get(y.floor() as usize)
            .and_then(|row| row.get(x.floor() as usize))
    }

    /// True when the position is inside the level on a walkable tile.
    pub fn is_walkable(&self, x: f32, y: f32) -> bool {
        self.tile_at(x, y).is_some_and(|tile| tile.kind.is_walkable())
    }
}

fn object(id: &str, x: f32, y: f32, kind: InteractableKind, linked: &[&str]) -> Interactable {
    Interactable {
        id: id.to_string(),
        position: Vec3::new(x, y, 0.0),
        kind,
        linked: linked.iter().map(|s| s.to_string()).collect(),
    }
}

fn state_condition(target: &str, pairs: &[(&str, Value)]) -> ObjectiveCondition {
    ObjectiveCondition::InteractableState {
        target: target.to_string(),
        state: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

/// Small built-in level used when no level directory is configured.
pub fn demo_level() -> LevelData {
    let width = 16;
    let height = 12;
    let mut tiles = vec![vec![Tile::default(); width]; height];
    for row in tiles.iter_mut() {
        row[0].kind = TileKind::Wall;
        row[width - 1].kind = TileKind::Wall;
    }
    for x in 0..width {
        tiles[0][x].kind = TileKind::Wall;
        tiles[height - 1][x].kind = TileKind::Wall;
    }
    for tile in tiles[6].iter_mut().take(12).skip(9) {
        tile.kind = TileKind::Water;
    }

    let interactables = vec![
        object(
            "plate_light",
            3.5,
            3.5,
            InteractableKind::PressurePlate(PressurePlateState {
                threshold: PlateThreshold::Light,
                ..Default::default()
            }),
            &["gate", "spikes"],
        ),
        object(
            "plate_heavy",
            6.5,
            3.5,
            InteractableKind::PressurePlate(PressurePlateState {
                threshold: PlateThreshold::Heavy,
                ..Default::default()
            }),
            &["gate"],
        ),
        object(
            "gate",
            8.5,
            2.5,
            InteractableKind::Door(DoorState {
                locked: true,
                ..Default::default()
            }),
            &[],
        ),
        object(
            "spikes",
            4.5,
            5.5,
            InteractableKind::Hazard(HazardState { active: true }),
            &[],
        ),
        object(
            "crate_1",
            5.5,
            7.5,
            InteractableKind::Crate(CrateState::default()),
            &[],
        ),
        object(
            "lever_power",
            2.5,
            9.5,
            InteractableKind::Lever(LeverState::default()),
            &[],
        ),
        object(
            "winch_bridge",
            8.5,
            8.5,
            InteractableKind::Winch(WinchState {
                requires_power: true,
                power_source: Some("lever_power".to_string()),
                ..Default::default()
            }),
            &["lift"],
        ),
        object(
            "lift",
            9.5,
            7.5,
            InteractableKind::Platform(PlatformState {
                waypoints: vec![Vec3::new(9.5, 7.5, 0.0), Vec3::new(9.5, 7.5, 2.0)],
                ..Default::default()
            }),
            &[],
        ),
        object(
            "call_button",
            12.5,
            4.5,
            InteractableKind::Button(ButtonState {
                momentary: true,
                ..Default::default()
            }),
            &["side_door"],
        ),
        object(
            "side_door",
            13.5,
            2.5,
            InteractableKind::Door(DoorState::default()),
            &[],
        ),
        object(
            "watchtower",
            1.5,
            1.5,
            InteractableKind::CameraNode(CameraNodeState::default()),
            &[],
        ),
        object(
            "exit_door",
            14.5,
            10.5,
            InteractableKind::Door(DoorState {
                locked: true,
                ..Default::default()
            }),
            &[],
        ),
    ];

    let puzzles = vec![
        PuzzleConfig {
            id: "open_gate".to_string(),
            name: "Open the gate".to_string(),
            objectives: vec![
                ObjectiveConfig {
                    id: "gate_open".to_string(),
                    description: "Hold both plates down".to_string(),
                    optional: false,
                    condition: state_condition("gate", &[("open", Value::Bool(true))]),
                },
                ObjectiveConfig {
                    id: "spikes_off".to_string(),
                    description: "Disarm the spikes".to_string(),
                    optional: true,
                    condition: state_condition("spikes", &[("active", Value::Bool(false))]),
                },
            ],
            reward_target: None,
        },
        PuzzleConfig {
            id: "raise_lift".to_string(),
            name: "Raise the lift".to_string(),
            objectives: vec![
                ObjectiveConfig {
                    id: "winch_wound".to_string(),
                    description: "Wind the winch all the way".to_string(),
                    optional: false,
                    condition: state_condition("winch_bridge", &[("extended", Value::from(100.0))]),
                },
                ObjectiveConfig {
                    id: "together".to_string(),
                    description: "Meet by the exit".to_string(),
                    optional: false,
                    condition: ObjectiveCondition::BothPlayersInZone {
                        zone: Zone {
                            x: 12.0,
                            y: 8.0,
                            width: 3.0,
                            height: 3.0,
                        },
                    },
                },
            ],
            reward_target: Some("exit_door".to_string()),
        },
    ];

    LevelData {
        id: "demo".to_string(),
        name: "Workshop".to_string(),
        width: width as u32,
        height: height as u32,
        tiles,
        spawns: Spawns {
            strength: Vec3::new(2.5, 2.5, 0.0),
            scout: Vec3::new(3.5, 2.5, 0.0),
        },
        interactables,
        puzzles,
    }
}
