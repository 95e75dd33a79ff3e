//! Live sessions indexed by room code, plus the level catalog they load from.
//!
//! The registry map sits behind one mutex shared with the cleanup sweep task.
//! Each session has its own mutex. The lock order is always registry first,
//! then session; nothing takes the registry lock while holding a session.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{LevelData, PlayerId, Role, RoomCode, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{RulesConfig, SimConfig};
use crate::error::{ConfigError, SessionError};
use crate::session::Session;

pub type SharedSession = Arc<Mutex<Session>>;

/// Source of candidate room codes. A candidate that is not a valid code
/// counts as a failed attempt.
pub trait CodeGenerator: Send {
    fn generate(&mut self) -> String;
}

/// Uniformly random codes over the room-code alphabet.
pub struct RandomCodeGenerator {
    rng: StdRng,
}

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&mut self) -> String {
        let alphabet = ROOM_CODE_ALPHABET.as_bytes();
        (0..ROOM_CODE_LEN)
            .map(|_| alphabet[self.rng.gen_range(0..alphabet.len())] as char)
            .collect()
    }
}

/// Replays a fixed list of codes in a loop.
#[derive(Debug, Clone)]
pub struct SequenceCodeGenerator {
    codes: Vec<String>,
    next: usize,
}

impl SequenceCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&mut self) -> String {
        if self.codes.is_empty() {
            return String::new();
        }
        let code = self.codes[self.next % self.codes.len()].clone();
        self.next += 1;
        code
    }
}

/// Level definitions by id.
#[derive(Debug, Clone, Default)]
pub struct LevelCatalog {
    levels: HashMap<String, Arc<LevelData>>,
}

impl LevelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding only the built-in demo level.
    pub fn with_demo() -> Self {
        let mut catalog = Self::new();
        let demo = shared::level::demo_level();
        catalog.levels.insert(demo.id.clone(), Arc::new(demo));
        catalog
    }

    pub fn insert(&mut self, level: LevelData) -> Result<(), ConfigError> {
        if self.levels.contains_key(&level.id) {
            return Err(ConfigError::DuplicateLevel(level.id));
        }
        self.levels.insert(level.id.clone(), Arc::new(level));
        Ok(())
    }

    /// Loads every `*.json` file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(ConfigError::ReadError)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let contents = std::fs::read_to_string(&path).map_err(ConfigError::ReadError)?;
            let level = LevelData::from_json(&contents).map_err(ConfigError::ParseError)?;
            info!("Loaded level '{}' from {}", level.id, path.display());
            catalog.insert(level)?;
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<Arc<LevelData>> {
        self.levels.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.levels.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<RoomCode, SharedSession>,
    player_rooms: HashMap<PlayerId, RoomCode>,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
    codes: Mutex<Box<dyn CodeGenerator>>,
    catalog: LevelCatalog,
    sim: SimConfig,
    rules: RulesConfig,
    idle_timeout_ms: u64,
}

impl Registry {
    pub fn new(
        catalog: LevelCatalog,
        codes: Box<dyn CodeGenerator>,
        sim: SimConfig,
        rules: RulesConfig,
        idle_timeout_ms: u64,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            codes: Mutex::new(codes),
            catalog,
            sim,
            rules,
            idle_timeout_ms,
        }
    }

    // The maps stay consistent across every early return, so a poisoned
    // guard is still usable.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    /// Creates a room on `level_id` with `creator` seated in the first role.
    pub fn create_session(
        &self,
        creator: PlayerId,
        level_id: &str,
        now: u64,
    ) -> Result<(RoomCode, Role), SessionError> {
        let level = self
            .catalog
            .get(level_id)
            .ok_or_else(|| SessionError::UnknownLevel(level_id.to_string()))?;

        let mut inner = self.lock();
        if inner.player_rooms.contains_key(&creator) {
            return Err(SessionError::AlreadyInSession);
        }

        let attempts = self.rules.room_code_attempts.max(1);
        let code = {
            let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
            (0..attempts)
                .filter_map(|_| RoomCode::parse(&codes.generate()).ok())
                .find(|code| !inner.sessions.contains_key(code))
        };
        let Some(code) = code else {
            warn!("Room code generation exhausted after {} attempts", attempts);
            return Err(SessionError::CodeExhausted { attempts });
        };

        let mut session = Session::new(
            code.clone(),
            level,
            now,
            self.sim.clone(),
            self.rules.level_completion,
        );
        session.add_player(creator, Role::FIRST)?;

        inner
            .sessions
            .insert(code.clone(), Arc::new(Mutex::new(session)));
        inner.player_rooms.insert(creator, code.clone());
        info!("Room {} created by player {} on level '{}'", code, creator, level_id);
        Ok((code, Role::FIRST))
    }

    /// Seats `player` in the room named by `code`. The code is matched
    /// case-insensitively.
    pub fn join_session(
        &self,
        code: &str,
        player: PlayerId,
        preferred: Option<Role>,
    ) -> Result<(RoomCode, Role, SharedSession), SessionError> {
        let code = RoomCode::parse(code).map_err(|_| SessionError::NotFound)?;

        let mut inner = self.lock();
        if inner.player_rooms.contains_key(&player) {
            return Err(SessionError::AlreadyInSession);
        }
        let session = inner
            .sessions
            .get(&code)
            .cloned()
            .ok_or(SessionError::NotFound)?;

        let role = {
            let mut guard = session.lock().map_err(|_| SessionError::NotFound)?;
            guard.join(player, preferred)?
        };
        inner.player_rooms.insert(player, code.clone());
        Ok((code, role, session))
    }

    /// Frees the player's slot. The room itself stays until the cleanup
    /// sweep reclaims it.
    pub fn leave_session(&self, player: PlayerId) -> Option<(RoomCode, Role, SharedSession)> {
        let mut inner = self.lock();
        let code = inner.player_rooms.remove(&player)?;
        let session = inner.sessions.get(&code).cloned()?;
        drop(inner);

        let role = session.lock().ok()?.remove_player(player)?;
        Some((code, role, session))
    }

    pub fn session_for_player(&self, player: PlayerId) -> Option<(RoomCode, SharedSession)> {
        let inner = self.lock();
        let code = inner.player_rooms.get(&player)?;
        let session = inner.sessions.get(code)?;
        Some((code.clone(), Arc::clone(session)))
    }

    pub fn get(&self, code: &RoomCode) -> Option<SharedSession> {
        self.lock().sessions.get(code).cloned()
    }

    /// Drops a room and forgets every player seated in it.
    pub fn remove_session(&self, code: &RoomCode) -> Option<SharedSession> {
        let mut inner = self.lock();
        let session = inner.sessions.remove(code)?;
        inner.player_rooms.retain(|_, room| room != code);
        info!("Room {} removed", code);
        Some(session)
    }

    /// Rooms whose lock was poisoned by a panic, with the players seated in
    /// each. Nothing is removed here.
    pub fn poisoned_sessions(&self) -> Vec<(RoomCode, Vec<PlayerId>)> {
        let inner = self.lock();
        inner
            .sessions
            .iter()
            .filter(|(_, session)| session.is_poisoned())
            .map(|(code, session)| {
                let guard = session.lock().unwrap_or_else(PoisonError::into_inner);
                let players = guard.players().into_iter().map(|(_, id)| id).collect();
                (code.clone(), players)
            })
            .collect()
    }

    /// Removes rooms that are empty and older than the idle timeout, plus any
    /// room whose lock was poisoned.
    pub fn cleanup_stale(&self, now: u64) -> Vec<RoomCode> {
        let mut inner = self.lock();
        let stale: Vec<RoomCode> = inner
            .sessions
            .iter()
            .filter(|(_, session)| match session.lock() {
                Ok(session) => {
                    session.is_empty()
                        && now.saturating_sub(session.created_at()) >= self.idle_timeout_ms
                }
                Err(_) => true,
            })
            .map(|(code, _)| code.clone())
            .collect();

        for code in &stale {
            inner.sessions.remove(code);
            inner.player_rooms.retain(|_, room| room != code);
            info!("Room {} reclaimed by cleanup", code);
        }
        stale
    }

    /// Every live room, for the tick loop.
    pub fn sessions(&self) -> Vec<(RoomCode, SharedSession)> {
        self.lock()
            .sessions
            .iter()
            .map(|(code, session)| (code.clone(), Arc::clone(session)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}
