//! One co-op game instance: role slots, lifecycle and the fixed-step tick.

use log::{debug, info};
use shared::{
    EntityState, GameSnapshot, InputState, InteractAction, Interactable, InteractableKind,
    LevelData, PingType, PlayerId, PuzzleState, Role, RoomCode, SessionStatus, Vec3,
};
use std::sync::Arc;

use crate::config::{LevelCompletionRule, SimConfig};
use crate::contraption::{self, LinkIndex};
use crate::error::{InteractionError, SessionError};
use crate::interaction::{self, InteractionContext};
use crate::ping::{PingManager, PlacedPing};
use crate::puzzle;

/// A seated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSlot {
    pub player_id: PlayerId,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseReason {
    Requested(Role),
    /// A seated player dropped or a slot was vacated mid-game.
    Absence,
}

/// Something a tick produced that clients should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PuzzleUpdated(PuzzleState),
    PingExpired(u32),
    LevelComplete {
        objectives_completed: u32,
        objectives_total: u32,
        elapsed_ms: u64,
    },
}

/// An accepted interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedInteraction {
    /// State of the target after the action.
    pub state: InteractableKind,
    /// False when the action was valid but left every object and the actor
    /// where they were, such as releasing a latching button.
    pub changed: bool,
}

/// Keeps clamped positions strictly inside the far level edge.
const EDGE_MARGIN: f32 = 1e-3;

fn slot_index(role: Role) -> usize {
    match role {
        Role::Strength => 0,
        Role::Scout => 1,
    }
}

#[derive(Debug)]
pub struct Session {
    code: RoomCode,
    status: SessionStatus,
    level: Arc<LevelData>,
    slots: [Option<RoleSlot>; 2],
    /// Ordered by role.
    entities: Vec<EntityState>,
    interactables: Vec<Interactable>,
    links: LinkIndex,
    puzzles: Vec<PuzzleState>,
    pings: PingManager,
    tick: u64,
    started_at: Option<u64>,
    created_at: u64,
    pause_reason: Option<PauseReason>,
    sim: SimConfig,
    completion_rule: LevelCompletionRule,
    level_complete_reported: bool,
}

impl Session {
    pub fn new(
        code: RoomCode,
        level: Arc<LevelData>,
        created_at: u64,
        sim: SimConfig,
        completion_rule: LevelCompletionRule,
    ) -> Self {
        let interactables = level.interactables.clone();
        let links = LinkIndex::build(&interactables);
        let puzzles = puzzle::initial_states(&level.puzzles);
        Self {
            code,
            status: SessionStatus::Waiting,
            level,
            slots: [None, None],
            entities: Vec::new(),
            interactables,
            links,
            puzzles,
            pings: PingManager::new(&sim),
            tick: 0,
            started_at: None,
            created_at,
            pause_reason: None,
            sim,
            completion_rule,
            level_complete_reported: false,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn level_id(&self) -> &str {
        &self.level.id
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn slot(&self, role: Role) -> Option<RoleSlot> {
        self.slots[slot_index(role)]
    }

    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.slot(*role).is_some_and(|slot| slot.player_id == player))
    }

    /// Seated players in role order.
    pub fn players(&self) -> Vec<(Role, PlayerId)> {
        Role::ALL
            .into_iter()
            .filter_map(|role| self.slot(role).map(|slot| (role, slot.player_id)))
            .collect()
    }

    /// Players whose connection is currently live.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.connected)
            .map(|slot| slot.player_id)
            .collect()
    }

    fn all_connected(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.is_some_and(|slot| slot.connected))
    }

    /// Role a joiner would receive. With one seat taken the joiner gets the
    /// remaining role regardless of preference.
    pub fn resolve_role(&self, preferred: Option<Role>) -> Result<Role, SessionError> {
        if self.is_full() {
            return Err(SessionError::Full);
        }
        let role = match self.players().first() {
            Some((taken, _)) => taken.other(),
            None => preferred.unwrap_or(Role::FIRST),
        };
        if self.slot(role).is_some() {
            return Err(SessionError::RoleTaken);
        }
        Ok(role)
    }

    /// Seats `player` in `role` and spawns its entity.
    pub fn add_player(&mut self, player: PlayerId, role: Role) -> Result<(), SessionError> {
        if self.role_of(player).is_some() {
            return Err(SessionError::AlreadyInSession);
        }
        if self.is_full() {
            return Err(SessionError::Full);
        }
        if self.slot(role).is_some() {
            return Err(SessionError::RoleTaken);
        }

        self.slots[slot_index(role)] = Some(RoleSlot {
            player_id: player,
            connected: true,
        });
        self.entities
            .push(EntityState::new(role, self.level.spawns.for_role(role)));
        self.entities.sort_by_key(|entity| slot_index(entity.role));
        info!("Player {} joined room {} as {:?}", player, self.code, role);

        if self.is_full() {
            match self.status {
                SessionStatus::Waiting => self.status = SessionStatus::Ready,
                SessionStatus::Paused if self.pause_reason == Some(PauseReason::Absence) => {
                    self.resume();
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolves a role for `player` and seats them.
    pub fn join(&mut self, player: PlayerId, preferred: Option<Role>) -> Result<Role, SessionError> {
        let role = self.resolve_role(preferred)?;
        self.add_player(player, role)?;
        Ok(role)
    }

    /// Frees the player's slot. Returns the role they held.
    pub fn remove_player(&mut self, player: PlayerId) -> Option<Role> {
        let role = self.role_of(player)?;
        self.slots[slot_index(role)] = None;
        self.entities.retain(|entity| entity.role != role);
        self.pings.clear_player(player);
        info!("Player {} left room {}", player, self.code);

        if self.is_empty() {
            self.status = SessionStatus::Waiting;
            self.pause_reason = None;
        } else if self.status == SessionStatus::Playing {
            self.pause(PauseReason::Absence);
        }
        Some(role)
    }

    /// Marks the player as gone but keeps their slot for a reconnect.
    pub fn disconnect_player(&mut self, player: PlayerId) -> Option<Role> {
        let role = self.role_of(player)?;
        if let Some(slot) = self.slots[slot_index(role)].as_mut() {
            slot.connected = false;
        }
        if self.status == SessionStatus::Playing {
            self.pause(PauseReason::Absence);
        }
        debug!("Player {} disconnected from room {}", player, self.code);
        Some(role)
    }

    /// Restores a disconnected player. A game paused only by absence resumes
    /// once everyone is back.
    pub fn reconnect_player(&mut self, player: PlayerId) -> Option<Role> {
        let role = self.role_of(player)?;
        if let Some(slot) = self.slots[slot_index(role)].as_mut() {
            slot.connected = true;
        }
        if self.status == SessionStatus::Paused
            && self.pause_reason == Some(PauseReason::Absence)
            && self.all_connected()
        {
            self.resume();
        }
        Some(role)
    }

    fn pause(&mut self, reason: PauseReason) {
        self.status = SessionStatus::Paused;
        self.pause_reason = Some(reason);
    }

    fn resume(&mut self) {
        self.status = SessionStatus::Playing;
        self.pause_reason = None;
    }

    /// Loads the level into the session and starts the simulation.
    pub fn start_game(&mut self, now: u64) -> Result<(), SessionError> {
        if !self.is_full() {
            return Err(SessionError::NotReady);
        }

        self.interactables = self.level.interactables.clone();
        self.links = LinkIndex::build(&self.interactables);
        self.puzzles = puzzle::initial_states(&self.level.puzzles);
        self.pings.clear();
        for entity in self.entities.iter_mut() {
            *entity = EntityState::new(entity.role, self.level.spawns.for_role(entity.role));
        }
        self.tick = 0;
        self.started_at = Some(now);
        self.level_complete_reported = false;
        self.pause_reason = None;
        self.status = SessionStatus::Playing;

        info!("Game started in room {} on level '{}'", self.code, self.level.id);
        Ok(())
    }

    /// Advances the simulation one step. Does nothing unless playing.
    pub fn tick(&mut self, now: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.status != SessionStatus::Playing {
            return events;
        }

        self.tick += 1;
        contraption::step(&mut self.interactables, &self.entities, &self.links, &self.sim);

        let outcome = puzzle::evaluate(
            &self.level.puzzles,
            &mut self.puzzles,
            &mut self.interactables,
            &self.links,
            &self.entities,
        );
        for id in &outcome.completed {
            info!("Puzzle '{}' solved in room {} at tick {}", id, self.code, self.tick);
        }
        events.extend(outcome.updated.into_iter().map(SessionEvent::PuzzleUpdated));

        events.extend(
            self.pings
                .expire(now)
                .into_iter()
                .map(|ping| SessionEvent::PingExpired(ping.id)),
        );

        if let Some(event) = self.check_level_complete(now) {
            events.push(event);
        }
        events
    }

    fn check_level_complete(&mut self, now: u64) -> Option<SessionEvent> {
        if self.level_complete_reported {
            return None;
        }
        let complete = match self.completion_rule {
            LevelCompletionRule::Disabled => false,
            LevelCompletionRule::AllPuzzles => {
                !self.puzzles.is_empty() && self.puzzles.iter().all(|p| p.completed)
            }
        };
        if !complete {
            return None;
        }

        self.level_complete_reported = true;
        let objectives = self.puzzles.iter().flat_map(|p| p.objectives.iter());
        let objectives_total = objectives.clone().count() as u32;
        let objectives_completed = objectives.filter(|o| o.completed).count() as u32;
        let elapsed_ms = now.saturating_sub(self.started_at.unwrap_or(now));
        info!("Level '{}' complete in room {}", self.level.id, self.code);
        Some(SessionEvent::LevelComplete {
            objectives_completed,
            objectives_total,
            elapsed_ms,
        })
    }

    pub fn snapshot(&self, now: u64) -> GameSnapshot {
        GameSnapshot {
            tick: self.tick,
            timestamp: now,
            entities: self.entities.clone(),
            interactables: self.interactables.clone(),
            pings: self.pings.pings().to_vec(),
            puzzles: self.puzzles.clone(),
        }
    }

    fn clamp_to_level(&self, position: Vec3) -> Vec3 {
        let max_x = (self.level.width as f32 - EDGE_MARGIN).max(0.0);
        let max_y = (self.level.height as f32 - EDGE_MARGIN).max(0.0);
        Vec3::new(
            position.x.clamp(0.0, max_x),
            position.y.clamp(0.0, max_y),
            position.z,
        )
    }

    fn entity_mut(&mut self, role: Role) -> Option<&mut EntityState> {
        self.entities.iter_mut().find(|entity| entity.role == role)
    }

    /// Records the client-reported movement of `player`. The latest report
    /// wins. Returns `Ok(false)` when the report was ignored.
    pub fn apply_input(
        &mut self,
        player: PlayerId,
        client_tick: u64,
        input: &InputState,
        position: Vec3,
    ) -> Result<bool, SessionError> {
        let role = self.role_of(player).ok_or(SessionError::NotInSession)?;
        if self.status != SessionStatus::Playing {
            return Ok(false);
        }
        if !position.is_finite() || !input.velocity.is_finite() {
            debug!(
                "Dropping non-finite input from player {} at client tick {}",
                player, client_tick
            );
            return Ok(false);
        }

        let position = self.clamp_to_level(position);
        if let Some(entity) = self.entity_mut(role) {
            entity.position = position;
            entity.velocity = input.velocity;
            entity.facing = input.facing;
            entity.movement = input.movement;
        }
        Ok(true)
    }

    /// Validates and applies one interaction on behalf of `player`.
    ///
    /// The reported actor position is used for the checks and only written
    /// to the entity once the interaction succeeds.
    pub fn interact(
        &mut self,
        player: PlayerId,
        target: &str,
        action: InteractAction,
        position: Option<Vec3>,
    ) -> Result<AppliedInteraction, InteractionError> {
        let role = self.role_of(player).ok_or(InteractionError::PermissionDenied)?;
        if self.status != SessionStatus::Playing {
            return Err(InteractionError::NotPlaying);
        }

        let current = self
            .entities
            .iter()
            .find(|entity| entity.role == role)
            .map(|entity| entity.position)
            .unwrap_or_default();
        let actor_position = position
            .filter(Vec3::is_finite)
            .map(|position| self.clamp_to_level(position))
            .unwrap_or(current);

        let before = self.interactables.clone();
        let ctx = InteractionContext {
            role,
            actor_position,
            level: &self.level,
            config: &self.sim,
        };
        let state = match interaction::process_interaction(
            &mut self.interactables,
            &self.links,
            target,
            action,
            &ctx,
        ) {
            Ok(state) => state,
            Err(err) => {
                debug!("{:?} {:?} '{}' rejected: {}", role, action, target, err);
                return Err(err);
            }
        };

        let moved = actor_position != current;
        if moved {
            if let Some(entity) = self.entity_mut(role) {
                entity.position = actor_position;
            }
        }
        let changed = moved || self.interactables != before;
        debug!("{:?} {:?} '{}' in room {}", role, action, target, self.code);
        Ok(AppliedInteraction { state, changed })
    }

    /// Places a ping for `player`. `None` when rate limited or not seated.
    pub fn add_ping(
        &mut self,
        player: PlayerId,
        position: Vec3,
        ping_type: PingType,
        now: u64,
    ) -> Option<PlacedPing> {
        let role = self.role_of(player)?;
        if !position.is_finite() {
            return None;
        }
        self.pings.add_ping(player, role, position, ping_type, now)
    }

    pub fn remove_ping(&mut self, id: u32, player: PlayerId) -> bool {
        self.pings.remove_ping(id, player)
    }

    /// Pauses or resumes on a player's request. Returns whether the status
    /// changed. Resuming needs both players seated and connected.
    pub fn set_paused(&mut self, player: PlayerId, paused: bool) -> Result<bool, SessionError> {
        let role = self.role_of(player).ok_or(SessionError::NotInSession)?;
        match (self.status, paused) {
            (SessionStatus::Playing, true) => {
                self.pause(PauseReason::Requested(role));
                info!("Room {} paused by {:?}", self.code, role);
                Ok(true)
            }
            (SessionStatus::Paused, false) => {
                if !self.all_connected() {
                    return Err(SessionError::NotReady);
                }
                self.resume();
                info!("Room {} resumed by {:?}", self.code, role);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::level::demo_level;
    use shared::{Facing, MovementState, Vec2};

    fn session() -> Session {
        Session::new(
            RoomCode::parse("ABCDEF").unwrap(),
            Arc::new(demo_level()),
            1_000,
            SimConfig::default(),
            LevelCompletionRule::Disabled,
        )
    }

    fn playing() -> Session {
        let mut session = session();
        session.add_player(1, Role::Strength).unwrap();
        session.add_player(2, Role::Scout).unwrap();
        session.start_game(2_000).unwrap();
        session
    }

    fn move_to(session: &mut Session, player: PlayerId, x: f32, y: f32) {
        session
            .apply_input(player, 0, &InputState::default(), Vec3::new(x, y, 0.0))
            .unwrap();
    }

    fn object<'a>(session: &'a Session, id: &str) -> &'a Interactable {
        session.interactables.iter().find(|o| o.id == id).unwrap()
    }

    #[test]
    fn test_join_fills_slots_and_becomes_ready() {
        let mut session = session();
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.join(1, None), Ok(Role::Strength));
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.join(2, Some(Role::Strength)), Ok(Role::Scout));
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.join(3, None), Err(SessionError::Full));
    }

    #[test]
    fn test_preferred_role_honoured_when_first_role_free() {
        let mut session = session();
        assert_eq!(session.join(1, Some(Role::Scout)), Ok(Role::Scout));
        assert_eq!(session.resolve_role(Some(Role::Scout)), Ok(Role::Strength));
        assert_eq!(session.add_player(2, Role::Scout), Err(SessionError::RoleTaken));
        assert_eq!(session.join(2, None), Ok(Role::Strength));
    }

    #[test]
    fn test_start_game_spawns_and_resets() {
        let mut session = session();
        assert_eq!(session.start_game(0), Err(SessionError::NotReady));

        session.add_player(1, Role::Strength).unwrap();
        session.add_player(2, Role::Scout).unwrap();
        session.start_game(5_000).unwrap();

        assert_eq!(session.status(), SessionStatus::Playing);
        assert_eq!(session.tick_count(), 0);
        assert_eq!(session.started_at(), Some(5_000));
        let level = demo_level();
        let snapshot = session.snapshot(5_000);
        assert_eq!(snapshot.entities[0].position, level.spawns.strength);
        assert_eq!(snapshot.entities[1].position, level.spawns.scout);
        assert!(snapshot
            .puzzles
            .iter()
            .all(|p| !p.completed && p.objectives.iter().all(|o| !o.completed)));
    }

    #[test]
    fn test_tick_is_noop_unless_playing() {
        let mut session = session();
        assert!(session.tick(0).is_empty());
        assert_eq!(session.tick_count(), 0);

        let mut session = playing();
        session.set_paused(1, true).unwrap();
        session.tick(3_000);
        assert_eq!(session.tick_count(), 0);
        session.set_paused(2, false).unwrap();
        session.tick(3_000);
        assert_eq!(session.tick_count(), 1);
    }

    #[test]
    fn test_disconnect_pauses_and_reconnect_resumes() {
        let mut session = playing();
        assert_eq!(session.disconnect_player(2), Some(Role::Scout));
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(session.slot(Role::Scout).map(|s| s.connected), Some(false));
        assert_eq!(session.set_paused(1, false), Err(SessionError::NotReady));

        assert_eq!(session.reconnect_player(2), Some(Role::Scout));
        assert_eq!(session.status(), SessionStatus::Playing);
    }

    #[test]
    fn test_reconnect_keeps_requested_pause() {
        let mut session = playing();
        session.set_paused(1, true).unwrap();
        session.disconnect_player(2);
        session.reconnect_player(2);
        assert_eq!(session.status(), SessionStatus::Paused);
    }

    #[test]
    fn test_emptied_session_returns_to_waiting() {
        let mut session = playing();
        assert_eq!(session.remove_player(1), Some(Role::Strength));
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(session.remove_player(2), Some(Role::Scout));
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert!(session.is_empty());
        assert_eq!(session.remove_player(2), None);
    }

    #[test]
    fn test_apply_input_clamps_and_rejects_nan() {
        let mut session = playing();
        let input = InputState {
            velocity: Vec2::new(1.0, 0.0),
            facing: Facing::East,
            movement: MovementState::Walking,
        };
        assert_eq!(session.apply_input(1, 3, &input, Vec3::new(-4.0, 99.0, 0.0)), Ok(true));
        let entity = &session.snapshot(0).entities[0];
        assert_eq!(entity.position.x, 0.0);
        assert!(entity.position.y < 12.0);
        assert_eq!(entity.facing, Facing::East);

        let nan = Vec3::new(f32::NAN, 1.0, 0.0);
        assert_eq!(session.apply_input(1, 4, &input, nan), Ok(false));
        assert_eq!(session.apply_input(9, 4, &input, Vec3::default()), Err(SessionError::NotInSession));
    }

    #[test]
    fn test_interact_requires_playing() {
        let mut session = session();
        session.add_player(1, Role::Strength).unwrap();
        assert_eq!(
            session.interact(1, "lever_power", InteractAction::Toggle, None),
            Err(InteractionError::NotPlaying)
        );
    }

    #[test]
    fn test_rejected_interaction_leaves_actor_in_place() {
        let mut session = playing();
        let before = session.snapshot(0);

        assert_eq!(
            session.interact(2, "crate_1", InteractAction::Push, Some(Vec3::new(9.0, 9.0, 0.0))),
            Err(InteractionError::PermissionDenied)
        );
        // Standing on the crate leaves no push direction
        let on_crate = object(&session, "crate_1").position;
        assert_eq!(
            session.interact(1, "crate_1", InteractAction::Push, Some(on_crate)),
            Err(InteractionError::Blocked)
        );

        let after = session.snapshot(0);
        assert_eq!(after.entities, before.entities);
        assert_eq!(after.interactables, before.interactables);
    }

    #[test]
    fn test_accepted_interaction_commits_reported_position() {
        let mut session = playing();
        let applied = session
            .interact(1, "lever_power", InteractAction::Toggle, Some(Vec3::new(2.5, 9.5, 0.0)))
            .unwrap();
        assert!(applied.changed);
        assert_eq!(session.snapshot(0).entities[0].position, Vec3::new(2.5, 9.5, 0.0));
    }

    #[test]
    fn test_noop_interaction_reports_unchanged() {
        let mut level = demo_level();
        level.interactables.push(Interactable {
            id: "latch".to_string(),
            position: Vec3::new(1.5, 1.5, 0.0),
            kind: InteractableKind::Button(shared::ButtonState {
                pressed: false,
                momentary: false,
            }),
            linked: Vec::new(),
        });
        let mut session = Session::new(
            RoomCode::parse("LATCH2").unwrap(),
            Arc::new(level),
            0,
            SimConfig::default(),
            LevelCompletionRule::Disabled,
        );
        session.add_player(1, Role::Strength).unwrap();
        session.add_player(2, Role::Scout).unwrap();
        session.start_game(0).unwrap();

        let released = session
            .interact(2, "latch", InteractAction::Release, None)
            .unwrap();
        assert!(!released.changed);
        let pressed = session.interact(2, "latch", InteractAction::Press, None).unwrap();
        assert!(pressed.changed);
    }

    #[test]
    fn test_plates_open_gate_and_complete_puzzle() {
        let mut session = playing();
        move_to(&mut session, 1, 6.5, 3.5);
        move_to(&mut session, 2, 3.5, 3.5);

        let events = session.tick(2_050);
        let gate = object(&session, "gate");
        assert!(matches!(&gate.kind, InteractableKind::Door(d) if d.open && !d.locked));
        assert!(matches!(
            &object(&session, "spikes").kind,
            InteractableKind::Hazard(h) if !h.active
        ));

        let update = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::PuzzleUpdated(p) if p.id == "open_gate" => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert!(update.completed);
    }

    #[test]
    fn test_winch_needs_lever_power() {
        let mut session = playing();
        move_to(&mut session, 1, 8.0, 8.5);
        session
            .interact(1, "winch_bridge", InteractAction::OperateStart, None)
            .unwrap();
        for _ in 0..5 {
            session.tick(3_000);
        }
        assert!(matches!(
            &object(&session, "winch_bridge").kind,
            InteractableKind::Winch(w) if w.extended == 0.0 && w.operating && !w.powered
        ));

        session
            .interact(2, "lever_power", InteractAction::Toggle, None)
            .unwrap();
        session.tick(3_100);
        assert!(matches!(
            &object(&session, "winch_bridge").kind,
            InteractableKind::Winch(w) if w.extended > 0.0 && w.powered
        ));
    }

    #[test]
    fn test_ping_expiry_emits_event() {
        let mut session = playing();
        let placed = session
            .add_ping(2, Vec3::new(4.0, 4.0, 0.0), PingType::Look, 2_000)
            .unwrap();
        assert!(session.tick(2_100).is_empty());
        let events = session.tick(2_000 + SimConfig::default().ping_lifetime_ms);
        assert!(events.contains(&SessionEvent::PingExpired(placed.ping.id)));
        assert!(session.snapshot(0).pings.is_empty());
    }

    #[test]
    fn test_level_complete_reported_once_when_enabled() {
        let mut level = demo_level();
        level.puzzles.truncate(1);
        let mut session = Session::new(
            RoomCode::parse("ZZZZZZ").unwrap(),
            Arc::new(level),
            0,
            SimConfig::default(),
            LevelCompletionRule::AllPuzzles,
        );
        session.add_player(1, Role::Strength).unwrap();
        session.add_player(2, Role::Scout).unwrap();
        session.start_game(1_000).unwrap();
        move_to(&mut session, 1, 6.5, 3.5);
        move_to(&mut session, 2, 3.5, 3.5);

        let events = session.tick(4_000);
        assert!(events.contains(&SessionEvent::LevelComplete {
            objectives_completed: 2,
            objectives_total: 2,
            elapsed_ms: 3_000,
        }));
        let again = session.tick(4_050);
        assert!(!again
            .iter()
            .any(|e| matches!(e, SessionEvent::LevelComplete { .. })));
    }
}
