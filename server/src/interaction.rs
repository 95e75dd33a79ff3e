//! Permission checks and per-type state transitions for player interactions.
//!
//! Processing is all-or-nothing: every check runs before the first write, so
//! a rejected interaction leaves shared state untouched.

use shared::{InteractAction, Interactable, InteractableKind, LevelData, Role, Vec3};

use crate::config::SimConfig;
use crate::contraption::LinkIndex;
use crate::error::InteractionError;

/// Who is acting, from where, and in which level.
#[derive(Debug, Clone, Copy)]
pub struct InteractionContext<'a> {
    pub role: Role,
    pub actor_position: Vec3,
    pub level: &'a LevelData,
    pub config: &'a SimConfig,
}

/// Permission matrix keyed by interactable type.
pub fn can_interact(role: Role, object: &Interactable) -> bool {
    match &object.kind {
        InteractableKind::Crate(_) | InteractableKind::Winch(_) => role == Role::Strength,
        InteractableKind::CameraNode(_) => role == Role::Scout,
        InteractableKind::Door(door) => {
            !door.locked && (!door.requires_strength || role == Role::Strength)
        }
        InteractableKind::Lever(lever) => {
            !lever.locked && (!lever.requires_strength || role == Role::Strength)
        }
        InteractableKind::PressurePlate(_) | InteractableKind::Hazard(_) => false,
        InteractableKind::Button(_) | InteractableKind::Platform(_) => true,
    }
}

/// Applies `action` to the interactable `target` and returns its new state.
pub fn process_interaction(
    objects: &mut [Interactable],
    index: &LinkIndex,
    target: &str,
    action: InteractAction,
    ctx: &InteractionContext<'_>,
) -> Result<InteractableKind, InteractionError> {
    let target_index = index
        .index_of(target)
        .ok_or(InteractionError::InvalidTarget)?;
    if !can_interact(ctx.role, &objects[target_index]) {
        return Err(InteractionError::PermissionDenied);
    }

    let mut fire_triggers = false;
    let mut new_position = None;
    let mut next = objects[target_index].kind.clone();

    match (&mut next, action) {
        (InteractableKind::Door(door), InteractAction::Toggle) => {
            door.open = !door.open;
        }
        (InteractableKind::Lever(lever), InteractAction::Toggle) => {
            lever.position = lever.position.toggled();
            fire_triggers = true;
        }
        (InteractableKind::Button(button), InteractAction::Press) => {
            button.pressed = true;
            fire_triggers = true;
        }
        (InteractableKind::Button(button), InteractAction::Release) => {
            if button.momentary {
                button.pressed = false;
            }
        }
        (InteractableKind::Crate(crate_state), InteractAction::Push) => {
            let destination = push_destination(objects, target_index, ctx)?;
            crate_state.being_pushed = true;
            crate_state.push_ticks_remaining = ctx.config.push_flag_ticks;
            new_position = Some(destination);
        }
        (InteractableKind::Winch(winch), InteractAction::OperateStart) => {
            winch.operating = true;
        }
        (InteractableKind::Winch(winch), InteractAction::OperateStop) => {
            winch.operating = false;
        }
        _ => return Err(InteractionError::InvalidAction),
    }

    let object = &mut objects[target_index];
    object.kind = next.clone();
    if let Some(position) = new_position {
        object.position = position;
    }

    if fire_triggers {
        trigger_linked(objects, index, target_index);
    }

    Ok(next)
}

/// Cascades a lever or button activation: doors flip `open`, platforms flip
/// `moving`. Other linked types ignore the trigger.
fn trigger_linked(objects: &mut [Interactable], index: &LinkIndex, source: usize) {
    for target in index.linked_indices(objects, source) {
        match &mut objects[target].kind {
            InteractableKind::Door(door) => door.open = !door.open,
            InteractableKind::Platform(platform) => platform.moving = !platform.moving,
            _ => {}
        }
    }
}

/// Validates a push and returns where the crate ends up.
///
/// The crate moves one tile along the dominant axis of the actor -> crate
/// offset. The destination must be inside the level on a walkable tile and
/// clear of every other crate.
fn push_destination(
    objects: &[Interactable],
    crate_index: usize,
    ctx: &InteractionContext<'_>,
) -> Result<Vec3, InteractionError> {
    let origin = objects[crate_index].position;
    let dx = origin.x - ctx.actor_position.x;
    let dy = origin.y - ctx.actor_position.y;
    if dx == 0.0 && dy == 0.0 {
        return Err(InteractionError::Blocked);
    }

    let (step_x, step_y) = if dx.abs() >= dy.abs() {
        (dx.signum(), 0.0)
    } else {
        (0.0, dy.signum())
    };
    let destination = Vec3::new(origin.x + step_x, origin.y + step_y, origin.z);

    if !ctx.level.is_walkable(destination.x, destination.y) {
        return Err(InteractionError::Blocked);
    }

    let min_gap = ctx.config.crate_collision_distance;
    let collides = objects.iter().enumerate().any(|(i, other)| {
        i != crate_index
            && matches!(other.kind, InteractableKind::Crate(_))
            && (other.position.x - destination.x).abs() < min_gap
            && (other.position.y - destination.y).abs() < min_gap
    });
    if collides {
        return Err(InteractionError::Blocked);
    }

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::level::demo_level;
    use shared::{
        ButtonState, CameraNodeState, CrateState, DoorState, HazardState, LeverPosition,
        LeverState, PlatformState, PressurePlateState, TileKind, WinchState,
    };

    fn object(id: &str, x: f32, y: f32, kind: InteractableKind, linked: &[&str]) -> Interactable {
        Interactable {
            id: id.to_string(),
            position: Vec3::new(x, y, 0.0),
            kind,
            linked: linked.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn open_level() -> LevelData {
        let mut level = demo_level();
        for row in level.tiles.iter_mut() {
            for tile in row.iter_mut() {
                tile.kind = TileKind::Floor;
            }
        }
        level.tiles[5][7].kind = TileKind::Water;
        level
    }

    fn ctx<'a>(
        role: Role,
        x: f32,
        y: f32,
        level: &'a LevelData,
        config: &'a SimConfig,
    ) -> InteractionContext<'a> {
        InteractionContext {
            role,
            actor_position: Vec3::new(x, y, 0.0),
            level,
            config,
        }
    }

    #[test]
    fn test_permission_matrix() {
        let crate_obj = object("c", 0.0, 0.0, InteractableKind::Crate(CrateState::default()), &[]);
        let winch = object("w", 0.0, 0.0, InteractableKind::Winch(WinchState::default()), &[]);
        let camera = object("cam", 0.0, 0.0, InteractableKind::CameraNode(CameraNodeState::default()), &[]);
        let plate = object("p", 0.0, 0.0, InteractableKind::PressurePlate(PressurePlateState::default()), &[]);
        let hazard = object("h", 0.0, 0.0, InteractableKind::Hazard(HazardState::default()), &[]);
        let button = object("b", 0.0, 0.0, InteractableKind::Button(ButtonState::default()), &[]);
        let platform = object("pl", 0.0, 0.0, InteractableKind::Platform(PlatformState::default()), &[]);

        assert!(can_interact(Role::Strength, &crate_obj));
        assert!(!can_interact(Role::Scout, &crate_obj));
        assert!(can_interact(Role::Strength, &winch));
        assert!(!can_interact(Role::Scout, &winch));
        assert!(can_interact(Role::Scout, &camera));
        assert!(!can_interact(Role::Strength, &camera));
        for role in Role::ALL {
            assert!(!can_interact(role, &plate));
            assert!(!can_interact(role, &hazard));
            assert!(can_interact(role, &button));
            assert!(can_interact(role, &platform));
        }
    }

    #[test]
    fn test_lock_and_strength_flags() {
        let locked = object(
            "d",
            0.0,
            0.0,
            InteractableKind::Door(DoorState {
                locked: true,
                ..Default::default()
            }),
            &[],
        );
        let heavy_lever = object(
            "l",
            0.0,
            0.0,
            InteractableKind::Lever(LeverState {
                requires_strength: true,
                ..Default::default()
            }),
            &[],
        );
        assert!(!can_interact(Role::Strength, &locked));
        assert!(can_interact(Role::Strength, &heavy_lever));
        assert!(!can_interact(Role::Scout, &heavy_lever));
    }

    #[test]
    fn test_lever_toggles_and_triggers_links() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![
            object("lever", 1.0, 1.0, InteractableKind::Lever(LeverState::default()), &["door", "lift"]),
            object("door", 2.0, 1.0, InteractableKind::Door(DoorState::default()), &[]),
            object("lift", 3.0, 1.0, InteractableKind::Platform(PlatformState::default()), &[]),
        ];
        let index = LinkIndex::build(&objects);

        let state = process_interaction(
            &mut objects,
            &index,
            "lever",
            InteractAction::Toggle,
            &ctx(Role::Scout, 1.0, 2.0, &level, &config),
        )
        .unwrap();

        assert!(matches!(state, InteractableKind::Lever(ref l) if l.position == LeverPosition::On));
        assert!(matches!(&objects[1].kind, InteractableKind::Door(d) if d.open));
        assert!(matches!(&objects[2].kind, InteractableKind::Platform(p) if p.moving));
    }

    #[test]
    fn test_momentary_button_release() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![
            object(
                "momentary",
                1.0,
                1.0,
                InteractableKind::Button(ButtonState {
                    momentary: true,
                    pressed: false,
                }),
                &[],
            ),
            object("latch", 2.0, 1.0, InteractableKind::Button(ButtonState::default()), &[]),
        ];
        let index = LinkIndex::build(&objects);
        let c = ctx(Role::Scout, 1.0, 2.0, &level, &config);

        process_interaction(&mut objects, &index, "momentary", InteractAction::Press, &c).unwrap();
        process_interaction(&mut objects, &index, "latch", InteractAction::Press, &c).unwrap();
        process_interaction(&mut objects, &index, "momentary", InteractAction::Release, &c).unwrap();
        process_interaction(&mut objects, &index, "latch", InteractAction::Release, &c).unwrap();

        assert!(matches!(&objects[0].kind, InteractableKind::Button(b) if !b.pressed));
        assert!(matches!(&objects[1].kind, InteractableKind::Button(b) if b.pressed));
    }

    #[test]
    fn test_push_moves_along_dominant_axis() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![object("c", 4.5, 4.5, InteractableKind::Crate(CrateState::default()), &[])];
        let index = LinkIndex::build(&objects);

        // Actor left of and slightly below the crate: push towards +x.
        let state = process_interaction(
            &mut objects,
            &index,
            "c",
            InteractAction::Push,
            &ctx(Role::Strength, 3.6, 4.8, &level, &config),
        )
        .unwrap();

        assert_eq!(objects[0].position, Vec3::new(5.5, 4.5, 0.0));
        match state {
            InteractableKind::Crate(c) => {
                assert!(c.being_pushed);
                assert_eq!(c.push_ticks_remaining, config.push_flag_ticks);
            }
            _ => panic!("Unexpected state"),
        }
    }

    #[test]
    fn test_push_rejects_water_bounds_and_crates() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![
            object("a", 6.5, 5.5, InteractableKind::Crate(CrateState::default()), &[]),
            object("b", 0.5, 3.5, InteractableKind::Crate(CrateState::default()), &[]),
            object("c", 3.5, 8.5, InteractableKind::Crate(CrateState::default()), &[]),
            object("d", 4.5, 8.5, InteractableKind::Crate(CrateState::default()), &[]),
        ];
        let index = LinkIndex::build(&objects);
        let before = objects.clone();

        let mut push_from = |id: &str, x: f32, y: f32| {
            process_interaction(
                &mut objects,
                &index,
                id,
                InteractAction::Push,
                &ctx(Role::Strength, x, y, &level, &config),
            )
        };
        // Into the water tile at (7, 5).
        let water = push_from("a", 5.5, 5.5);
        // Off the left edge.
        let edge = push_from("b", 1.5, 3.5);
        // Into another crate.
        let blocked = push_from("c", 2.5, 8.5);

        assert_eq!(water, Err(InteractionError::Blocked));
        assert_eq!(edge, Err(InteractionError::Blocked));
        assert_eq!(blocked, Err(InteractionError::Blocked));
        assert_eq!(objects, before);
    }

    #[test]
    fn test_scout_push_is_denied_and_crate_stays() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![object("c", 4.5, 4.5, InteractableKind::Crate(CrateState::default()), &[])];
        let index = LinkIndex::build(&objects);

        let result = process_interaction(
            &mut objects,
            &index,
            "c",
            InteractAction::Push,
            &ctx(Role::Scout, 3.5, 4.5, &level, &config),
        );
        assert_eq!(result, Err(InteractionError::PermissionDenied));
        assert_eq!(objects[0].position, Vec3::new(4.5, 4.5, 0.0));
    }

    #[test]
    fn test_winch_operate_flags() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![object("w", 1.0, 1.0, InteractableKind::Winch(WinchState::default()), &[])];
        let index = LinkIndex::build(&objects);
        let c = ctx(Role::Strength, 1.0, 2.0, &level, &config);

        process_interaction(&mut objects, &index, "w", InteractAction::OperateStart, &c).unwrap();
        assert!(matches!(&objects[0].kind, InteractableKind::Winch(w) if w.operating));
        process_interaction(&mut objects, &index, "w", InteractAction::OperateStop, &c).unwrap();
        assert!(matches!(&objects[0].kind, InteractableKind::Winch(w) if !w.operating));
    }

    #[test]
    fn test_unsupported_actions_and_targets() {
        let level = open_level();
        let config = SimConfig::default();
        let mut objects = vec![
            object("d", 1.0, 1.0, InteractableKind::Door(DoorState::default()), &[]),
            object("pl", 2.0, 1.0, InteractableKind::Platform(PlatformState::default()), &[]),
            object("cam", 3.0, 1.0, InteractableKind::CameraNode(CameraNodeState::default()), &[]),
        ];
        let index = LinkIndex::build(&objects);
        let strength = ctx(Role::Strength, 0.0, 0.0, &level, &config);
        let scout = ctx(Role::Scout, 0.0, 0.0, &level, &config);

        assert_eq!(
            process_interaction(&mut objects, &index, "d", InteractAction::Push, &strength),
            Err(InteractionError::InvalidAction)
        );
        assert_eq!(
            process_interaction(&mut objects, &index, "pl", InteractAction::Toggle, &strength),
            Err(InteractionError::InvalidAction)
        );
        assert_eq!(
            process_interaction(&mut objects, &index, "cam", InteractAction::Toggle, &scout),
            Err(InteractionError::InvalidAction)
        );
        assert_eq!(
            process_interaction(&mut objects, &index, "nope", InteractAction::Toggle, &strength),
            Err(InteractionError::InvalidTarget)
        );
    }
}
