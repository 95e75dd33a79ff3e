//! Rate-limited, capacity-bounded ping markers.
//!
//! Each player may hold a fixed number of live pings. Placing another one
//! evicts that player's oldest ping; pings from other players are never
//! touched. A cooldown since the player's last successful ping silently drops
//! requests that arrive too fast.

use log::debug;
use shared::{Ping, PingType, PlayerId, Role, Vec3};
use std::collections::HashMap;

use crate::config::SimConfig;

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPing {
    pub ping: Ping,
    /// The owner's oldest ping, removed to stay under the cap.
    pub evicted: Option<Ping>,
}

#[derive(Debug, Clone)]
pub struct PingManager {
    /// Live pings in creation order.
    pings: Vec<Ping>,
    last_ping_at: HashMap<PlayerId, u64>,
    next_id: u32,
    cooldown_ms: u64,
    lifetime_ms: u64,
    max_per_player: usize,
}

impl PingManager {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            pings: Vec::new(),
            last_ping_at: HashMap::new(),
            next_id: 1,
            cooldown_ms: config.ping_cooldown_ms,
            lifetime_ms: config.ping_lifetime_ms,
            max_per_player: config.max_pings_per_player.max(1),
        }
    }

    /// Places a ping, or returns `None` while the owner is cooling down.
    pub fn add_ping(
        &mut self,
        owner: PlayerId,
        creator: Role,
        position: Vec3,
        ping_type: PingType,
        now: u64,
    ) -> Option<PlacedPing> {
        if let Some(&last) = self.last_ping_at.get(&owner) {
            if now < last.saturating_add(self.cooldown_ms) {
                debug!("Ping from player {} dropped by cooldown", owner);
                return None;
            }
        }

        let evicted = if self.count_for(owner) >= self.max_per_player {
            self.evict_oldest(owner)
        } else {
            None
        };

        let ping = Ping {
            id: self.next_id,
            position,
            ping_type,
            creator,
            owner,
            created_at: now,
            expires_at: now.saturating_add(self.lifetime_ms),
        };
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.last_ping_at.insert(owner, now);
        self.pings.push(ping.clone());

        Some(PlacedPing { ping, evicted })
    }

    fn evict_oldest(&mut self, owner: PlayerId) -> Option<Ping> {
        let index = self
            .pings
            .iter()
            .enumerate()
            .filter(|(_, ping)| ping.owner == owner)
            .min_by_key(|(_, ping)| (ping.created_at, ping.id))
            .map(|(index, _)| index)?;
        Some(self.pings.remove(index))
    }

    /// Removes a ping. Only its creator may do so.
    pub fn remove_ping(&mut self, id: u32, requester: PlayerId) -> bool {
        match self.pings.iter().position(|ping| ping.id == id) {
            Some(index) if self.pings[index].owner == requester => {
                self.pings.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Drops every ping whose expiry time has been reached.
    pub fn expire(&mut self, now: u64) -> Vec<Ping> {
        let (expired, live): (Vec<Ping>, Vec<Ping>) = std::mem::take(&mut self.pings)
            .into_iter()
            .partition(|ping| ping.expires_at <= now);
        self.pings = live;
        expired
    }

    /// Removes all pings of one player, e.g. when they leave.
    pub fn clear_player(&mut self, owner: PlayerId) -> Vec<Ping> {
        self.last_ping_at.remove(&owner);
        let (removed, live): (Vec<Ping>, Vec<Ping>) = std::mem::take(&mut self.pings)
            .into_iter()
            .partition(|ping| ping.owner == owner);
        self.pings = live;
        removed
    }

    pub fn clear(&mut self) {
        self.pings.clear();
        self.last_ping_at.clear();
    }

    pub fn count_for(&self, owner: PlayerId) -> usize {
        self.pings.iter().filter(|ping| ping.owner == owner).count()
    }

    pub fn pings(&self) -> &[Ping] {
        &self.pings
    }
}
