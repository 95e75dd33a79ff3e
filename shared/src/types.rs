//! Core data model shared by the server and any client.
//!
//! Everything in here is part of the wire format: snapshots are encoded with
//! bincode, so these types avoid serde attributes that need self-describing
//! formats (`skip_serializing_if`, internally tagged enums, `flatten`).

use serde::{Deserialize, Serialize};

/// Server-assigned identity of a connected player.
pub type PlayerId = u32;

/// Planar vector, used for velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// World position. `x`/`y` span the ground plane in tile units, `z` is elevation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Linear interpolation that returns `self` at `t == 0` and `other` at
    /// `t == 1` exactly.
    pub fn lerp(&self, other: &Vec3, t: f32) -> Vec3 {
        let s = 1.0 - t;
        Vec3 {
            x: self.x * s + other.x * t,
            y: self.y * s + other.y * t,
            z: self.z * s + other.z * t,
        }
    }

    /// Distance on the ground plane, ignoring elevation.
    pub fn planar_distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One of the two asymmetric player archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Heavy character: pushes crates, operates winches.
    Strength,
    /// Light character: uses camera nodes.
    Scout,
}

impl Role {
    /// The role a room creator is bound to.
    pub const FIRST: Role = Role::Strength;
    pub const ALL: [Role; 2] = [Role::Strength, Role::Scout];

    pub fn other(self) -> Role {
        match self {
            Role::Strength => Role::Scout,
            Role::Scout => Role::Strength,
        }
    }

    pub fn is_heavy(self) -> bool {
        matches!(self, Role::Strength)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    North,
    NorthEast,
    East,
    SouthEast,
    #[default]
    South,
    SouthWest,
    West,
    NorthWest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    #[default]
    Idle,
    Walking,
    Running,
    Pushing,
    Interacting,
}

/// Simulated state of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub role: Role,
    pub position: Vec3,
    pub velocity: Vec2,
    pub facing: Facing,
    pub movement: MovementState,
}

impl EntityState {
    pub fn new(role: Role, position: Vec3) -> Self {
        Self {
            role,
            position,
            velocity: Vec2::default(),
            facing: Facing::default(),
            movement: MovementState::default(),
        }
    }
}

/// Client-reported movement state carried by an input message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputState {
    pub velocity: Vec2,
    pub facing: Facing,
    pub movement: MovementState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Ready,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverPosition {
    #[default]
    Off,
    On,
}

impl LeverPosition {
    pub fn toggled(self) -> Self {
        match self {
            LeverPosition::Off => LeverPosition::On,
            LeverPosition::On => LeverPosition::Off,
        }
    }
}

/// Weight class a pressure plate needs before it activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateThreshold {
    #[default]
    Light,
    Heavy,
}

impl PlateThreshold {
    pub fn required_weight(self) -> u32 {
        match self {
            PlateThreshold::Light => 1,
            PlateThreshold::Heavy => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DoorState {
    pub open: bool,
    pub locked: bool,
    pub requires_strength: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeverState {
    pub position: LeverPosition,
    pub requires_strength: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PressurePlateState {
    pub activated: bool,
    pub weight: u32,
    pub threshold: PlateThreshold,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrateState {
    pub being_pushed: bool,
    /// Ticks left before `being_pushed` clears.
    pub push_ticks_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WinchState {
    pub operating: bool,
    /// Extension percentage in `[0, 100]`.
    pub extended: f32,
    pub requires_power: bool,
    /// Interactable id whose state powers this winch, usually a lever.
    pub power_source: Option<String>,
    /// Whether the power source was live on the last tick.
    pub powered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformState {
    pub moving: bool,
    pub waypoints: Vec<Vec3>,
    /// Normalized position between waypoint 0 and waypoint 1.
    pub progress: f32,
    /// `1.0` towards waypoint 1, `-1.0` towards waypoint 0.
    pub direction: f32,
    pub speed: f32,
}

impl Default for PlatformState {
    fn default() -> Self {
        Self {
            moving: false,
            waypoints: Vec::new(),
            progress: 0.0,
            direction: 1.0,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ButtonState {
    pub pressed: bool,
    pub momentary: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraNodeState {
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HazardState {
    pub active: bool,
}

/// Type tag plus the strongly typed state of that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractableKind {
    Door(DoorState),
    Lever(LeverState),
    PressurePlate(PressurePlateState),
    Crate(CrateState),
    Winch(WinchState),
    Platform(PlatformState),
    Button(ButtonState),
    CameraNode(CameraNodeState),
    Hazard(HazardState),
}

impl InteractableKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            InteractableKind::Door(_) => "door",
            InteractableKind::Lever(_) => "lever",
            InteractableKind::PressurePlate(_) => "pressure_plate",
            InteractableKind::Crate(_) => "crate",
            InteractableKind::Winch(_) => "winch",
            InteractableKind::Platform(_) => "platform",
            InteractableKind::Button(_) => "button",
            InteractableKind::CameraNode(_) => "camera_node",
            InteractableKind::Hazard(_) => "hazard",
        }
    }
}

/// One mechanical object in the level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interactable {
    pub id: String,
    pub position: Vec3,
    pub kind: InteractableKind,
    /// Targets of cascading triggers. Never mutated after load.
    #[serde(default)]
    pub linked: Vec<String>,
}

/// Verbs a player can apply to an interactable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractAction {
    Toggle,
    Push,
    Press,
    Release,
    OperateStart,
    OperateStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingType {
    Look,
    Move,
    Danger,
    Interact,
}

/// Ephemeral marker placed by one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub id: u32,
    pub position: Vec3,
    pub ping_type: PingType,
    pub creator: Role,
    pub owner: PlayerId,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveState {
    pub id: String,
    pub description: String,
    pub optional: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleState {
    pub id: String,
    pub name: String,
    pub completed: bool,
    pub objectives: Vec<ObjectiveState>,
}

/// Point-in-time copy of everything a client renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub tick: u64,
    pub timestamp: u64,
    pub entities: Vec<EntityState>,
    pub interactables: Vec<Interactable>,
    pub pings: Vec<Ping>,
    pub puzzles: Vec<PuzzleState>,
}

/// Reason codes carried by `SessionError` and failed `InteractionResult` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SessionNotFound,
    SessionFull,
    RoleTaken,
    CodeExhausted,
    UnknownLevel,
    AlreadyInSession,
    NotInSession,
    NotReady,
    PermissionDenied,
    InvalidAction,
    InvalidTarget,
    Blocked,
    NotPlaying,
    MalformedMessage,
    StaleConnection,
}
