//! Server network layer handling UDP communications and the session tick loop

use crate::client_manager::{ClientManager, Resume};
use crate::config::{ServerConfig, TimingConfig};
use crate::error::{InteractionError, ServerError, SessionError};
use crate::registry::{Registry, SharedSession};
use crate::session::{Session, SessionEvent};
use crate::utils::get_timestamp;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    GameSnapshot, InteractAction, InteractableKind, Packet, PlayerId, ResumeTicket, RoomCode,
    SessionStatus, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

const RECV_BUFFER_SIZE: usize = 4096;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    /// Heartbeat timeout. The client is already detached.
    ClientTimeout { client_id: PlayerId },
    /// Reconnect grace window closed for a detached client.
    GraceExpired { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Delivered to every listed player that currently has a live address.
    SendToPlayers {
        packet: Packet,
        players: Vec<PlayerId>,
    },
}

/// Result of ticking one session.
#[derive(Debug)]
pub enum TickOutcome {
    /// Not playing, nothing to broadcast.
    Idle,
    Ticked {
        recipients: Vec<PlayerId>,
        snapshot: GameSnapshot,
        events: Vec<SessionEvent>,
    },
    /// The tick panicked or the lock was poisoned. The session must be dropped.
    Failed { players: Vec<PlayerId> },
}

/// Ticks one session, containing any panic to that session.
pub fn tick_session(session: &SharedSession, now: u64) -> TickOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut guard = session.lock().ok()?;
        if guard.status() != SessionStatus::Playing {
            return Some(TickOutcome::Idle);
        }
        let events = guard.tick(now);
        Some(TickOutcome::Ticked {
            recipients: guard.connected_players(),
            snapshot: guard.snapshot(now),
            events,
        })
    }));

    match result {
        Ok(Some(outcome)) => outcome,
        _ => {
            let guard = session.lock().unwrap_or_else(PoisonError::into_inner);
            TickOutcome::Failed {
                players: guard.players().into_iter().map(|(_, id)| id).collect(),
            }
        }
    }
}

pub fn event_packet(event: SessionEvent) -> Packet {
    match event {
        SessionEvent::PuzzleUpdated(puzzle) => Packet::PuzzleUpdate { puzzle },
        SessionEvent::PingExpired(id) => Packet::PingExpired { id },
        SessionEvent::LevelComplete {
            objectives_completed,
            objectives_total,
            elapsed_ms,
        } => Packet::LevelComplete {
            objectives_completed,
            objectives_total,
            elapsed_ms,
        },
    }
}

pub fn session_error_packet(err: &SessionError) -> Packet {
    Packet::SessionError {
        code: err.code(),
        message: err.to_string(),
    }
}

pub fn interaction_result_packet(
    target: &str,
    action: InteractAction,
    result: &Result<InteractableKind, InteractionError>,
) -> Packet {
    match result {
        Ok(state) => Packet::InteractionResult {
            target: target.to_string(),
            action,
            success: true,
            new_state: Some(state.clone()),
            reason: None,
        },
        Err(err) => Packet::InteractionResult {
            target: target.to_string(),
            action,
            success: false,
            new_state: None,
            reason: Some(err.code()),
        },
    }
}

fn lock_session(session: &SharedSession) -> Option<MutexGuard<'_, Session>> {
    match session.lock() {
        Ok(guard) => Some(guard),
        Err(_) => {
            error!("Session lock poisoned, skipping request");
            None
        }
    }
}

fn others(players: Vec<PlayerId>, player: PlayerId) -> Vec<PlayerId> {
    players.into_iter().filter(|id| *id != player).collect()
}

/// Main server coordinating networking and session simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    registry: Arc<Registry>,
    timing: TimingConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: &ServerConfig, registry: Registry) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(config.bind_address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let clients = ClientManager::new(
            config.network.max_clients,
            config.timing.heartbeat_timeout(),
            config.timing.reconnect_grace(),
        );

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            registry: Arc::new(registry),
            timing: config.timing.clone(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Dropping malformed packet ({} bytes) from {}", len, addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToPlayers { packet, players } => {
                        let addrs: Vec<(PlayerId, SocketAddr)> = {
                            let clients_guard = clients.read().await;
                            players
                                .iter()
                                .filter_map(|id| clients_guard.addr_of(*id).map(|addr| (*id, addr)))
                                .collect()
                        };

                        for (client_id, addr) in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors heartbeat timeouts and grace windows
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let (timed_out, expired) = {
                    let mut clients_guard = clients.write().await;
                    (clients_guard.check_timeouts(), clients_guard.expire_grace())
                };

                let messages = timed_out
                    .into_iter()
                    .map(|client_id| ServerMessage::ClientTimeout { client_id })
                    .chain(
                        expired
                            .into_iter()
                            .map(|client_id| ServerMessage::GraceExpired { client_id }),
                    );
                for message in messages {
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the periodic sweep that reclaims idle empty rooms
    async fn spawn_cleanup_sweep(&self) {
        let registry = Arc::clone(&self.registry);
        let period = self.timing.cleanup_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                let removed = registry.cleanup_stale(get_timestamp());
                if !removed.is_empty() {
                    info!("Cleanup reclaimed {} idle rooms", removed.len());
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_players(&self, packet: Packet, players: Vec<PlayerId>) {
        if players.is_empty() {
            return;
        }
        if let Err(e) = self.game_tx.send(GameMessage::SendToPlayers { packet, players }) {
            error!("Failed to queue room packet: {}", e);
        }
    }

    async fn player_at(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients.read().await.find_client_by_addr(addr)
    }

    /// Processes incoming packets and routes them to sessions
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                resume,
            } => {
                self.handle_connect(client_version, resume, addr).await;
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.player_at(addr).await {
                    self.isolated(client_id, || self.leave_room(client_id));
                    self.clients.write().await.remove_client(&client_id);
                }
            }

            packet => {
                let Some(client_id) = self.player_at(addr).await else {
                    warn!("Packet from unknown address {}", addr);
                    return;
                };
                self.clients.write().await.touch(client_id);
                self.isolated(client_id, || self.handle_client_packet(client_id, packet, addr));
            }
        }
    }

    async fn handle_connect(
        &mut self,
        client_version: u32,
        resume: Option<ResumeTicket>,
        addr: SocketAddr,
    ) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!("Rejecting protocol version {} from {}", client_version, addr);
            self.send_packet(
                Packet::Disconnected {
                    reason: format!("Unsupported protocol version {}", client_version),
                },
                addr,
            );
            return;
        }

        if let Some(ticket) = resume {
            let outcome = self.clients.write().await.resume_client(ticket, addr);
            if let Resume::Resumed { displaced } = outcome {
                let client_id = ticket.player_id;
                if let Some(displaced) = displaced {
                    info!("Client {} at {} replaced by resumed player {}", displaced, addr, client_id);
                    self.isolated(displaced, || self.leave_room(displaced));
                }
                self.send_packet(
                    Packet::Connected {
                        client_id,
                        resume_token: ticket.token,
                    },
                    addr,
                );
                self.isolated(client_id, || self.rejoin_room(client_id, addr));
                return;
            }
            debug!(
                "Resume of player {} refused, assigning a new id",
                ticket.player_id
            );
        }

        // Remove existing connection if present
        if let Some(existing_id) = self.player_at(addr).await {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.isolated(existing_id, || self.leave_room(existing_id));
            self.clients.write().await.remove_client(&existing_id);
        }

        let connected = {
            let mut clients = self.clients.write().await;
            match clients.add_client(addr) {
                Some(client_id) => clients
                    .resume_token(client_id)
                    .map(|resume_token| (client_id, resume_token)),
                None => None,
            }
        };
        match connected {
            Some((client_id, resume_token)) => self.send_packet(
                Packet::Connected {
                    client_id,
                    resume_token,
                },
                addr,
            ),
            None => self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            ),
        }
    }

    /// Handles every packet that needs an identified, live client
    fn handle_client_packet(&self, client_id: PlayerId, packet: Packet, addr: SocketAddr) {
        let now = get_timestamp();
        match packet {
            Packet::CreateRoom { level_id } => {
                match self.registry.create_session(client_id, &level_id, now) {
                    Ok((code, role)) => self.send_packet(
                        Packet::RoomCreated {
                            code: code.to_string(),
                            role,
                        },
                        addr,
                    ),
                    Err(err) => {
                        warn!("Player {} could not create a room: {}", client_id, err);
                        self.send_packet(session_error_packet(&err), addr);
                    }
                }
            }

            Packet::JoinRoom {
                code,
                preferred_role,
            } => self.join_room(client_id, &code, preferred_role, addr, now),

            Packet::LeaveRoom => self.leave_room(client_id),

            Packet::Input {
                tick,
                input,
                position,
            } => {
                let Some((_, session)) = self.registry.session_for_player(client_id) else {
                    debug!("Input from player {} outside any room", client_id);
                    return;
                };
                let Some(mut guard) = lock_session(&session) else {
                    return;
                };
                if let Err(err) = guard.apply_input(client_id, tick, &input, position) {
                    debug!("Input from player {} ignored: {}", client_id, err);
                }
            }

            Packet::Interact {
                target,
                action,
                position,
            } => {
                let Some((_, session)) = self.registry.session_for_player(client_id) else {
                    self.send_packet(session_error_packet(&SessionError::NotInSession), addr);
                    return;
                };
                let (result, broadcast) = {
                    let Some(mut guard) = lock_session(&session) else {
                        return;
                    };
                    let result = guard.interact(client_id, &target, action, position);
                    let changed = matches!(&result, Ok(applied) if applied.changed);
                    let broadcast =
                        changed.then(|| (guard.connected_players(), guard.snapshot(now)));
                    (result.map(|applied| applied.state), broadcast)
                };

                if let Err(err) = &result {
                    warn!(
                        "Player {} {:?} on '{}' rejected: {}",
                        client_id, action, target, err
                    );
                }
                self.send_packet(interaction_result_packet(&target, action, &result), addr);
                if let Some((players, snapshot)) = broadcast {
                    self.send_to_players(Packet::StateUpdate { snapshot }, players);
                }
            }

            Packet::AddPing {
                position,
                ping_type,
            } => {
                let Some((_, session)) = self.registry.session_for_player(client_id) else {
                    return;
                };
                let (placed, players) = {
                    let Some(mut guard) = lock_session(&session) else {
                        return;
                    };
                    (
                        guard.add_ping(client_id, position, ping_type, now),
                        guard.connected_players(),
                    )
                };
                if let Some(placed) = placed {
                    if let Some(evicted) = placed.evicted {
                        self.send_to_players(Packet::PingExpired { id: evicted.id }, players.clone());
                    }
                    self.send_to_players(Packet::PingReceived { ping: placed.ping }, players);
                }
            }

            Packet::RemovePing { id } => {
                let Some((_, session)) = self.registry.session_for_player(client_id) else {
                    return;
                };
                let (removed, players) = {
                    let Some(mut guard) = lock_session(&session) else {
                        return;
                    };
                    (guard.remove_ping(id, client_id), guard.connected_players())
                };
                if removed {
                    self.send_to_players(Packet::PingExpired { id }, players);
                }
            }

            Packet::SetPaused { paused } => {
                let Some((_, session)) = self.registry.session_for_player(client_id) else {
                    self.send_packet(session_error_packet(&SessionError::NotInSession), addr);
                    return;
                };
                let (result, role, players) = {
                    let Some(mut guard) = lock_session(&session) else {
                        return;
                    };
                    (
                        guard.set_paused(client_id, paused),
                        guard.role_of(client_id),
                        guard.connected_players(),
                    )
                };
                match result {
                    Ok(true) => {
                        self.send_to_players(Packet::GamePaused { paused, by: role }, players)
                    }
                    Ok(false) => {}
                    Err(err) => self.send_packet(session_error_packet(&err), addr),
                }
            }

            Packet::Heartbeat { timestamp } => {
                self.send_packet(
                    Packet::HeartbeatAck {
                        server_time: now,
                        timestamp,
                    },
                    addr,
                );
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    fn join_room(
        &self,
        client_id: PlayerId,
        code: &str,
        preferred_role: Option<shared::Role>,
        addr: SocketAddr,
        now: u64,
    ) {
        let (code, role, session) = match self.registry.join_session(code, client_id, preferred_role) {
            Ok(joined) => joined,
            Err(err) => {
                warn!("Player {} could not join room {}: {}", client_id, code, err);
                self.send_packet(session_error_packet(&err), addr);
                return;
            }
        };

        let (snapshot, existing, started, resumed, everyone) = {
            let Some(mut guard) = lock_session(&session) else {
                return;
            };
            let snapshot = guard.snapshot(now);
            let existing = others(guard.connected_players(), client_id);

            let mut started = None;
            if guard.status() == SessionStatus::Ready {
                match guard.start_game(now) {
                    Ok(()) => started = Some(guard.snapshot(now)),
                    Err(err) => warn!("Room {} could not start: {}", code, err),
                }
            }
            let resumed = started.is_none() && guard.status() == SessionStatus::Playing;
            (snapshot, existing, started, resumed, guard.connected_players())
        };

        self.send_packet(
            Packet::RoomJoined {
                code: code.to_string(),
                role,
                snapshot,
            },
            addr,
        );
        self.send_to_players(Packet::PlayerJoined { role }, existing);
        if let Some(snapshot) = started {
            self.send_to_players(Packet::GameStarted { snapshot }, everyone);
        } else if resumed {
            self.send_to_players(
                Packet::GamePaused {
                    paused: false,
                    by: None,
                },
                everyone,
            );
        }
    }

    /// Frees the player's slot and tells the room
    fn leave_room(&self, client_id: PlayerId) {
        let was_playing = self
            .registry
            .session_for_player(client_id)
            .and_then(|(_, session)| {
                let status = lock_session(&session).map(|guard| guard.status());
                status
            })
            .map_or(false, |status| status == SessionStatus::Playing);

        let Some((code, role, session)) = self.registry.leave_session(client_id) else {
            return;
        };
        let Some((remaining, paused)) = lock_session(&session)
            .map(|guard| (guard.connected_players(), guard.status() == SessionStatus::Paused))
        else {
            return;
        };
        info!("Player {} ({:?}) left room {}", client_id, role, code);

        let mut recipients = remaining.clone();
        recipients.push(client_id);
        self.send_to_players(Packet::PlayerLeft { role }, recipients);
        if was_playing && paused {
            self.send_to_players(
                Packet::GamePaused {
                    paused: true,
                    by: None,
                },
                remaining,
            );
        }
    }

    /// Reattaches a resumed client to the room it was seated in
    fn rejoin_room(&self, client_id: PlayerId, addr: SocketAddr) {
        let Some((code, session)) = self.registry.session_for_player(client_id) else {
            return;
        };
        let now = get_timestamp();
        let (role, snapshot, existing, resumed, everyone) = {
            let Some(mut guard) = lock_session(&session) else {
                return;
            };
            let before = guard.status();
            let Some(role) = guard.reconnect_player(client_id) else {
                return;
            };
            let resumed = before == SessionStatus::Paused && guard.status() == SessionStatus::Playing;
            (
                role,
                guard.snapshot(now),
                others(guard.connected_players(), client_id),
                resumed,
                guard.connected_players(),
            )
        };
        info!("Player {} reconnected to room {} as {:?}", client_id, code, role);

        self.send_packet(
            Packet::RoomJoined {
                code: code.to_string(),
                role,
                snapshot,
            },
            addr,
        );
        self.send_to_players(Packet::PlayerReconnected { role }, existing);
        if resumed {
            self.send_to_players(
                Packet::GamePaused {
                    paused: false,
                    by: None,
                },
                everyone,
            );
        }
    }

    /// Heartbeat timeout: same path as a dropped connection
    fn handle_client_timeout(&self, client_id: PlayerId) {
        let Some((code, session)) = self.registry.session_for_player(client_id) else {
            return;
        };
        let (paused_now, remaining) = {
            let Some(mut guard) = lock_session(&session) else {
                return;
            };
            let before = guard.status();
            guard.disconnect_player(client_id);
            (
                before == SessionStatus::Playing && guard.status() == SessionStatus::Paused,
                guard.connected_players(),
            )
        };
        info!("Player {} timed out in room {}", client_id, code);

        if paused_now {
            self.send_to_players(
                Packet::GamePaused {
                    paused: true,
                    by: None,
                },
                remaining,
            );
        }
    }

    /// Advances every playing session and broadcasts the results
    fn tick_sessions(&self) {
        let now = get_timestamp();
        for (code, session) in self.registry.sessions() {
            match tick_session(&session, now) {
                TickOutcome::Idle => {}
                TickOutcome::Ticked {
                    recipients,
                    snapshot,
                    events,
                } => {
                    self.send_to_players(Packet::StateUpdate { snapshot }, recipients.clone());
                    for event in events {
                        self.send_to_players(event_packet(event), recipients.clone());
                    }
                }
                TickOutcome::Failed { players } => {
                    error!("Room {} failed during tick", code);
                    self.close_failed_room(&code, players);
                }
            }
        }
    }

    /// Drops a room that can no longer be trusted and tells its players
    fn close_failed_room(&self, code: &RoomCode, players: Vec<PlayerId>) {
        self.registry.remove_session(code);
        self.send_to_players(
            Packet::Disconnected {
                reason: "Room closed after an internal error".to_string(),
            },
            players,
        );
    }

    /// Runs a request handler for one player. A panic inside it closes the
    /// rooms it poisoned and leaves every other room running.
    fn isolated<F: FnOnce()>(&self, client_id: PlayerId, handler: F) {
        if panic::catch_unwind(AssertUnwindSafe(handler)).is_ok() {
            return;
        }
        error!("Handler for player {} panicked", client_id);
        for (code, players) in self.registry.poisoned_sessions() {
            error!("Room {} poisoned by the panic", code);
            self.close_failed_room(&code, players);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;
        self.spawn_cleanup_sweep().await;

        let mut tick_interval = interval(self.timing.tick_duration());
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.isolated(client_id, || self.handle_client_timeout(client_id));
                        },
                        Some(ServerMessage::GraceExpired { client_id }) => {
                            self.isolated(client_id, || self.leave_room(client_id));
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.tick_sessions();
                    ticks += 1;

                    // Periodic monitoring
                    if ticks % (self.timing.tick_rate.max(1) as u64 * 10) == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!("Tick {}: {} rooms, {} clients", ticks, self.registry.len(), client_count);
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LevelCompletionRule, SimConfig};
    use crate::registry::{LevelCatalog, SequenceCodeGenerator};
    use shared::{level::demo_level, ErrorCode, Role, RoomCode};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    fn shared_session() -> SharedSession {
        Arc::new(Mutex::new(Session::new(
            RoomCode::parse("ABCDEF").unwrap(),
            Arc::new(demo_level()),
            0,
            SimConfig::default(),
            LevelCompletionRule::Disabled,
        )))
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect {
            client_version: 1,
            resume: None,
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(p, packet);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<GameMessage>();

        let msg = GameMessage::SendToPlayers {
            packet: Packet::PlayerJoined { role: Role::Scout },
            players: vec![1, 2],
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv().unwrap() {
            GameMessage::SendToPlayers { packet, players } => {
                assert_eq!(players, vec![1, 2]);
                assert_eq!(packet, Packet::PlayerJoined { role: Role::Scout });
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_queued_room_packet_is_received() {
        let (tx, mut rx) = mpsc::unbounded_channel::<GameMessage>();
        tx.send(GameMessage::SendPacket {
            packet: Packet::Disconnect,
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000),
        })
        .unwrap();

        let received = tokio_test::block_on(async { rx.recv().await });
        assert!(matches!(
            received,
            Some(GameMessage::SendPacket {
                packet: Packet::Disconnect,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let mut config = ServerConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 0;
        let registry = Registry::new(
            crate::registry::LevelCatalog::with_demo(),
            Box::new(crate::registry::RandomCodeGenerator::seeded(1)),
            SimConfig::default(),
            config.rules.clone(),
            config.timing.idle_room_timeout_ms,
        );

        let server = Server::new(&config, registry).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.registry().is_empty());
    }

    async fn local_server(codes: &[&str]) -> Server {
        let mut config = ServerConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 0;
        let registry = Registry::new(
            LevelCatalog::with_demo(),
            Box::new(SequenceCodeGenerator::new(codes.iter().copied())),
            SimConfig::default(),
            config.rules.clone(),
            config.timing.idle_room_timeout_ms,
        );
        Server::new(&config, registry).await.unwrap()
    }

    #[tokio::test]
    async fn test_panicking_handler_closes_only_its_room() {
        let mut server = local_server(&["CRASH2", "STEADY"]).await;
        let registry = server.registry();
        let (crashed, _) = registry.create_session(1, "demo", 0).unwrap();
        registry.join_session(crashed.as_str(), 2, None).unwrap();
        let (steady, _) = registry.create_session(3, "demo", 0).unwrap();

        server.isolated(1, || {
            let (_, session) = registry.session_for_player(1).unwrap();
            let _guard = session.lock().unwrap();
            panic!("handler failure");
        });

        assert!(registry.get(&crashed).is_none());
        assert!(registry.session_for_player(2).is_none());
        assert!(registry.get(&steady).is_some());
        match server.game_rx.try_recv().unwrap() {
            GameMessage::SendToPlayers {
                packet: Packet::Disconnected { .. },
                players,
            } => assert_eq!(players, vec![1, 2]),
            other => panic!("Unexpected message {:?}", other),
        }
        assert!(server.game_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_panic_outside_any_room_closes_nothing() {
        let server = local_server(&["STEADY"]).await;
        let registry = server.registry();
        let (steady, _) = registry.create_session(1, "demo", 0).unwrap();

        server.isolated(1, || panic!("failure before touching a room"));

        assert!(registry.get(&steady).is_some());
    }

    #[test]
    fn test_tick_session_idle_until_playing() {
        let session = shared_session();
        assert!(matches!(tick_session(&session, 0), TickOutcome::Idle));

        {
            let mut guard = session.lock().unwrap();
            guard.add_player(1, Role::Strength).unwrap();
            guard.add_player(2, Role::Scout).unwrap();
            guard.start_game(0).unwrap();
        }

        match tick_session(&session, 50) {
            TickOutcome::Ticked {
                recipients,
                snapshot,
                ..
            } => {
                assert_eq!(recipients, vec![1, 2]);
                assert_eq!(snapshot.tick, 1);
                assert_eq!(snapshot.timestamp, 50);
            }
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_tick_session_reports_poisoned_lock() {
        let session = shared_session();
        session.lock().unwrap().add_player(7, Role::Strength).unwrap();

        let poisoner = Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("simulated failure");
        })
        .join();

        match tick_session(&session, 0) {
            TickOutcome::Failed { players } => assert_eq!(players, vec![7]),
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_session_error_packet() {
        match session_error_packet(&SessionError::Full) {
            Packet::SessionError { code, message } => {
                assert_eq!(code, ErrorCode::SessionFull);
                assert_eq!(message, "session is full");
            }
            _ => panic!("Unexpected packet type"),
        }
    }

    #[test]
    fn test_interaction_result_packet() {
        let failed = interaction_result_packet(
            "crate_1",
            InteractAction::Push,
            &Err(InteractionError::PermissionDenied),
        );
        assert_eq!(
            failed,
            Packet::InteractionResult {
                target: "crate_1".to_string(),
                action: InteractAction::Push,
                success: false,
                new_state: None,
                reason: Some(ErrorCode::PermissionDenied),
            }
        );
    }

    #[test]
    fn test_event_packets() {
        assert_eq!(
            event_packet(SessionEvent::PingExpired(4)),
            Packet::PingExpired { id: 4 }
        );
        assert_eq!(
            event_packet(SessionEvent::LevelComplete {
                objectives_completed: 3,
                objectives_total: 4,
                elapsed_ms: 9_000,
            }),
            Packet::LevelComplete {
                objectives_completed: 3,
                objectives_total: 4,
                elapsed_ms: 9_000,
            }
        );
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let packet = Packet::HeartbeatAck {
            server_time: get_timestamp(),
            timestamp: 42,
        };
        let bytes = serialize(&packet).unwrap();
        assert!(bytes.len() < RECV_BUFFER_SIZE);
        let decoded: Packet = deserialize(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_malformed_bytes_fail_to_decode() {
        let garbage = [0xFFu8, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(deserialize::<Packet>(&garbage).is_err());
    }
}
