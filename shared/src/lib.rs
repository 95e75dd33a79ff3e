//! Wire protocol and data model shared between the session server and clients.

pub mod level;
pub mod room_code;
pub mod types;

pub use level::{LevelData, ObjectiveCondition, ObjectiveConfig, PuzzleConfig, Spawns, Tile, TileKind, Zone};
pub use room_code::{RoomCode, RoomCodeError, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
pub use types::*;

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Proof of a previous identity, presented when reconnecting. The token is
/// the one the server handed out in `Connected`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ResumeTicket {
    pub player_id: PlayerId,
    pub token: u64,
}

/// Every datagram exchanged between client and server, bincode encoded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    /// `resume` carries the previous identity when reconnecting within the
    /// grace window.
    Connect {
        client_version: u32,
        resume: Option<ResumeTicket>,
    },
    CreateRoom {
        level_id: String,
    },
    JoinRoom {
        code: String,
        preferred_role: Option<Role>,
    },
    LeaveRoom,
    Input {
        tick: u64,
        input: InputState,
        position: Vec3,
    },
    Interact {
        target: String,
        action: InteractAction,
        /// Actor position reported alongside the action.
        position: Option<Vec3>,
    },
    AddPing {
        position: Vec3,
        ping_type: PingType,
    },
    RemovePing {
        id: u32,
    },
    SetPaused {
        paused: bool,
    },
    Heartbeat {
        timestamp: u64,
    },
    Disconnect,

    // Server -> client
    Connected {
        client_id: PlayerId,
        resume_token: u64,
    },
    RoomCreated {
        code: String,
        role: Role,
    },
    RoomJoined {
        code: String,
        role: Role,
        snapshot: GameSnapshot,
    },
    SessionError {
        code: ErrorCode,
        message: String,
    },
    PlayerJoined {
        role: Role,
    },
    PlayerLeft {
        role: Role,
    },
    PlayerReconnected {
        role: Role,
    },
    GameStarted {
        snapshot: GameSnapshot,
    },
    StateUpdate {
        snapshot: GameSnapshot,
    },
    InteractionResult {
        target: String,
        action: InteractAction,
        success: bool,
        new_state: Option<InteractableKind>,
        reason: Option<ErrorCode>,
    },
    PingReceived {
        ping: Ping,
    },
    PingExpired {
        id: u32,
    },
    PuzzleUpdate {
        puzzle: PuzzleState,
    },
    LevelComplete {
        objectives_completed: u32,
        objectives_total: u32,
        elapsed_ms: u64,
    },
    GamePaused {
        paused: bool,
        by: Option<Role>,
    },
    HeartbeatAck {
        server_time: u64,
        timestamp: u64,
    },
    Disconnected {
        reason: String,
    },
}
