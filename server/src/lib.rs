//! # Cooperative Session Server Library
//!
//! This library provides the authoritative server for a two-player cooperative
//! puzzle game. Players create or join rooms identified by short codes, each
//! room runs its own tile-based level, and the server is the single source of
//! truth for every interactable object, puzzle and ping in it.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the life of a room from creation to cleanup:
//! - Room code generation with collision retries
//! - Role assignment (Strength and Scout) with one player per role
//! - Waiting, ready, playing and paused transitions
//! - Disconnect detection, reconnect grace and idle room reclamation
//!
//! ### Authoritative Simulation
//! Every interaction is validated against the acting role before it touches
//! shared state. Pressure plates, winches and platforms advance once per tick
//! in a fixed order, so two rooms fed the same inputs stay identical.
//!
//! ### State Broadcasting
//! Each playing room sends a full snapshot to its own players every tick,
//! followed by any puzzle, ping or level completion events the tick produced.
//!
//! ## Architecture Design
//!
//! ### Rooms Are Isolated
//! The [`registry::Registry`] owns every [`session::Session`] behind its own
//! lock. A request only ever locks the registry and then one session, in that
//! order. A panic during one room's tick, or while handling a player's
//! request, drops the rooms it poisoned and leaves the others running.
//!
//! ### UDP-Based Communication
//! Uses a single UDP socket with bincode-encoded [`shared::Packet`] datagrams.
//! Malformed datagrams are logged and dropped without affecting anyone else.
//!
//! ### Explicit Time
//! Simulation code never reads the clock. The network layer passes a
//! millisecond timestamp into every tick and request, which keeps tests
//! deterministic.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Maps socket addresses to player identities:
//! - Player ID assignment and capacity limits
//! - Heartbeat timeout detection
//! - Reconnect grace windows for dropped players
//!
//! ### Session Modules (`session`, `registry`)
//! The per-room state machine and the process-wide room table.
//!
//! ### Simulation Modules (`interaction`, `contraption`, `puzzle`, `ping`)
//! - Role-checked interaction handlers for every object kind
//! - Per-tick propagation through plates, winches, platforms and doors
//! - Objective evaluation and reward grants
//! - Rate-limited, expiring location markers
//!
//! ### Network Module (`network`)
//! Handles all networking operations and protocol routing:
//! - UDP socket management and packet processing
//! - Per-room fan-out of responses and broadcasts
//! - Heartbeat, grace and cleanup background tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::registry::{LevelCatalog, RandomCodeGenerator, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let registry = Registry::new(
//!         LevelCatalog::with_demo(),
//!         Box::new(RandomCodeGenerator::new()),
//!         config.sim.clone(),
//!         config.rules.clone(),
//!         config.timing.idle_room_timeout_ms,
//!     );
//!
//!     // Runs until a shutdown message arrives:
//!     // - Listens for connections, room requests and inputs
//!     // - Ticks every playing room at the configured rate
//!     // - Broadcasts snapshots and events to each room's players
//!     let mut server = Server::new(&config, registry).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes the outgoing queue and per-room fan-out
//! - **Timeout Checker**: Detaches silent clients and expires grace windows
//! - **Cleanup Sweep**: Reclaims rooms that stayed empty too long
//! - **Main Loop**: Routes packets and ticks every room

pub mod client_manager;
pub mod config;
pub mod contraption;
pub mod error;
pub mod interaction;
pub mod network;
pub mod ping;
pub mod puzzle;
pub mod registry;
pub mod session;
pub mod utils;
