//! Client connection tracking for the session server
//!
//! This module handles the server-side bookkeeping of connections, including:
//! - Connection lifecycle (connect, explicit disconnect, heartbeat timeout)
//! - Mapping between socket addresses and player identities
//! - Reconnect grace windows for players who dropped mid-game
//! - Capacity limits across live and detached players
//!
//! The manager knows nothing about rooms. It reports which players went
//! stale or ran out of grace, and the network layer decides what that means
//! for their session.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{PlayerId, ResumeTicket};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a live connection
///
/// Each client carries:
/// - The player identity the server assigned on connect
/// - The secret token that proves the identity on a later resume
/// - The address responses are routed to
/// - The time of the most recent packet, for heartbeat timeouts
#[derive(Debug)]
pub struct Client {
    /// Unique player identifier assigned by the server
    pub id: PlayerId,
    /// Token the client must present to resume this identity
    pub resume_token: u64,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client with the given ID, token and network address
    pub fn new(id: PlayerId, resume_token: u64, addr: SocketAddr) -> Self {
        Self {
            id,
            resume_token,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the heartbeat timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// A dropped player whose identity is still reserved
#[derive(Debug, Clone, Copy)]
struct Detached {
    resume_token: u64,
    deadline: Instant,
}

/// Outcome of a resume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Unknown player, wrong token, or the grace window already closed.
    Refused,
    /// The identity now lives at the new address. `displaced` is another
    /// live client that was using that address and has been removed.
    Resumed { displaced: Option<PlayerId> },
}

/// Manages all live and detached player connections
///
/// A player whose connection drops without an explicit leave becomes
/// detached: their identity stays reserved until the reconnect grace window
/// closes, so a `Connect` carrying that id and its resume token can reclaim
/// it and the role slot that goes with it.
pub struct ClientManager {
    /// Live clients indexed by player ID
    clients: HashMap<PlayerId, Client>,
    /// Detached players with their token and grace deadline
    detached: HashMap<PlayerId, Detached>,
    /// Next available player ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent players, live or detached
    max_clients: usize,
    heartbeat_timeout: Duration,
    reconnect_grace: Duration,
    tokens: StdRng,
}

impl ClientManager {
    /// Creates a new client manager with the specified limits
    ///
    /// Player IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize, heartbeat_timeout: Duration, reconnect_grace: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            detached: HashMap::new(),
            next_client_id: 1,
            max_clients,
            heartbeat_timeout,
            reconnect_grace,
            tokens: StdRng::from_entropy(),
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(player_id) if successful, None if the server is at capacity.
    /// Detached players still count towards the limit while their grace
    /// window is open.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() + self.detached.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let resume_token = self.tokens.gen();
        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, resume_token, addr));

        Some(client_id)
    }

    /// Token handed to the client in `Connected`
    pub fn resume_token(&self, client_id: PlayerId) -> Option<u64> {
        self.clients.get(&client_id).map(|client| client.resume_token)
    }

    /// Reattaches a player from a (possibly new) address
    ///
    /// The ticket's token must match the one issued for that player. A
    /// detached player must still be inside their grace window; a live one
    /// simply moves to the new address. Any other live client at `addr` is
    /// removed so that one address never maps to two players.
    pub fn resume_client(&mut self, ticket: ResumeTicket, addr: SocketAddr) -> Resume {
        let player = ticket.player_id;
        let live_token = self.clients.get(&player).map(|client| client.resume_token);
        let accepted = match (live_token, self.detached.get(&player)) {
            (Some(token), _) => token == ticket.token,
            (None, Some(detached)) => {
                detached.resume_token == ticket.token && Instant::now() < detached.deadline
            }
            (None, None) => false,
        };
        if !accepted {
            warn!("Refusing resume of player {} from {}", player, addr);
            return Resume::Refused;
        }

        let displaced = self
            .find_client_by_addr(addr)
            .filter(|existing| *existing != player);
        if let Some(existing) = displaced {
            info!("Client {} displaced from {} by resume", existing, addr);
            self.clients.remove(&existing);
        }

        if let Some(client) = self.clients.get_mut(&player) {
            client.addr = addr;
            client.touch();
        } else {
            self.detached.remove(&player);
            self.clients
                .insert(player, Client::new(player, ticket.token, addr));
        }
        info!("Client {} resumed from {}", player, addr);
        Resume::Resumed { displaced }
    }

    /// Removes a client from the server entirely
    ///
    /// Clears both live and detached state. Returns true if the player was
    /// known, false if they were already gone.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        let was_detached = self.detached.remove(client_id).is_some();
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            was_detached
        }
    }

    /// Moves a live client into the grace list
    ///
    /// Returns false if the client was not live.
    pub fn detach_client(&mut self, client_id: &PlayerId) -> bool {
        let Some(client) = self.clients.remove(client_id) else {
            return false;
        };
        let deadline = Instant::now() + self.reconnect_grace;
        self.detached.insert(
            *client_id,
            Detached {
                resume_token: client.resume_token,
                deadline,
            },
        );
        info!(
            "Client {} detached, grace window {:?}",
            client_id, self.reconnect_grace
        );
        true
    }

    /// Finds a player ID by their network address
    ///
    /// Used to associate incoming packets with existing client connections.
    /// Returns None if no live client is connected from the given address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the heartbeat clock of a client
    ///
    /// Returns false if the client ID is not live.
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    pub fn is_detached(&self, client_id: PlayerId) -> bool {
        self.detached.contains_key(&client_id)
    }

    /// Checks for and detaches timed-out clients
    ///
    /// Clients that haven't sent packets within the heartbeat timeout are
    /// moved to the grace list. Returns their IDs so the session layer can
    /// run its disconnect path.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.heartbeat_timeout;
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.detach_client(client_id);
        }

        timed_out
    }

    /// Forgets detached players whose grace window has closed
    ///
    /// Returns their IDs so their role slots can be freed.
    pub fn expire_grace(&mut self) -> Vec<PlayerId> {
        let now = Instant::now();
        let expired: Vec<PlayerId> = self
            .detached
            .iter()
            .filter(|(_, detached)| now >= detached.deadline)
            .map(|(id, _)| *id)
            .collect();

        for client_id in &expired {
            self.detached.remove(client_id);
            info!("Client {} grace window closed", client_id);
        }

        expired
    }

    /// Returns the number of live clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are live
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
