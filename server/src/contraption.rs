//! Per-tick simulation of pressure plates, winches, and moving platforms.
//!
//! The step order is fixed: crate push flags, plates, winches, platforms.
//! Plates settle before winches look at their power source, and a winch that
//! finishes winding snaps its platforms before the puzzle check of the same
//! tick runs.

use shared::{EntityState, Interactable, InteractableKind, LeverPosition};
use std::collections::HashMap;

use crate::config::SimConfig;

/// Id lookup plus the reverse plate -> door adjacency.
///
/// Linked ids never change after load, so this is built once when the game
/// starts and reused every tick.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_id: HashMap<String, usize>,
    /// Door index -> indices of every plate listing that door as a target.
    door_plates: HashMap<usize, Vec<usize>>,
}

impl LinkIndex {
    pub fn build(objects: &[Interactable]) -> Self {
        let by_id: HashMap<String, usize> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| (object.id.clone(), index))
            .collect();

        let mut door_plates: HashMap<usize, Vec<usize>> = HashMap::new();
        for (plate_index, plate) in objects.iter().enumerate() {
            if !matches!(plate.kind, InteractableKind::PressurePlate(_)) {
                continue;
            }
            for target in &plate.linked {
                if let Some(&door_index) = by_id.get(target) {
                    if matches!(objects[door_index].kind, InteractableKind::Door(_)) {
                        door_plates.entry(door_index).or_default().push(plate_index);
                    }
                }
            }
        }

        Self { by_id, door_plates }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Indices of the linked targets of `objects[index]` that exist.
    pub fn linked_indices(&self, objects: &[Interactable], index: usize) -> Vec<usize> {
        objects[index]
            .linked
            .iter()
            .filter_map(|id| self.index_of(id))
            .collect()
    }

    pub fn plates_gating(&self, door_index: usize) -> &[usize] {
        self.door_plates
            .get(&door_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Runs one simulation step over every contraption in the session.
pub fn step(
    objects: &mut [Interactable],
    entities: &[EntityState],
    index: &LinkIndex,
    config: &SimConfig,
) {
    update_crates(objects);
    update_pressure_plates(objects, entities, index, config);
    update_winches(objects, index, config);
    update_platforms(objects, config);
}

/// Counts down crate push flags. Runs only while the session ticks, so a
/// paused game keeps the flag.
fn update_crates(objects: &mut [Interactable]) {
    for object in objects.iter_mut() {
        if let InteractableKind::Crate(state) = &mut object.kind {
            if state.push_ticks_remaining > 0 {
                state.push_ticks_remaining -= 1;
            }
            if state.push_ticks_remaining == 0 {
                state.being_pushed = false;
            }
        }
    }
}

fn plate_weight(
    plate: &Interactable,
    objects: &[Interactable],
    entities: &[EntityState],
    config: &SimConfig,
) -> u32 {
    let radius = config.plate_check_radius;
    let from_entities: u32 = entities
        .iter()
        .filter(|entity| entity.position.planar_distance(&plate.position) <= radius)
        .map(|entity| {
            if entity.role.is_heavy() {
                config.heavy_weight
            } else {
                config.light_weight
            }
        })
        .sum();
    let from_crates: u32 = objects
        .iter()
        .filter(|object| matches!(object.kind, InteractableKind::Crate(_)))
        .filter(|object| object.position.planar_distance(&plate.position) <= radius)
        .map(|_| config.crate_weight)
        .sum();
    from_entities + from_crates
}

fn update_pressure_plates(
    objects: &mut [Interactable],
    entities: &[EntityState],
    index: &LinkIndex,
    config: &SimConfig,
) {
    let weights: Vec<Option<u32>> = {
        let view: &[Interactable] = objects;
        view.iter()
            .map(|object| match object.kind {
                InteractableKind::PressurePlate(_) => {
                    Some(plate_weight(object, view, entities, config))
                }
                _ => None,
            })
            .collect()
    };

    let mut transitions = Vec::new();
    for (plate_index, weight) in weights.into_iter().enumerate() {
        let Some(weight) = weight else { continue };
        if let InteractableKind::PressurePlate(state) = &mut objects[plate_index].kind {
            state.weight = weight;
            let activated = weight >= state.threshold.required_weight();
            if activated != state.activated {
                state.activated = activated;
                transitions.push((plate_index, activated));
            }
        }
    }

    for (plate_index, activated) in transitions {
        for target in index.linked_indices(objects, plate_index) {
            let is_door = match &mut objects[target].kind {
                InteractableKind::Hazard(hazard) => {
                    hazard.active = !activated;
                    false
                }
                InteractableKind::Door(_) => true,
                _ => false,
            };
            if is_door {
                apply_door_rule(objects, index, target);
            }
        }
    }
}

/// Unlocks and opens a plate-gated door iff every plate gating it is active.
/// A door with no gating plates is locked and closed.
pub fn apply_door_rule(objects: &mut [Interactable], index: &LinkIndex, door_index: usize) {
    let plates = index.plates_gating(door_index);
    let all_active = !plates.is_empty()
        && plates.iter().all(|&plate| {
            matches!(&objects[plate].kind, InteractableKind::PressurePlate(state) if state.activated)
        });
    if let InteractableKind::Door(door) = &mut objects[door_index].kind {
        door.locked = !all_active;
        door.open = all_active;
    }
}

/// Whether a power source object is live.
fn is_powered(source: &Interactable) -> bool {
    match &source.kind {
        InteractableKind::Lever(lever) => lever.position == LeverPosition::On,
        InteractableKind::Button(button) => button.pressed,
        InteractableKind::PressurePlate(plate) => plate.activated,
        _ => false,
    }
}

fn update_winches(objects: &mut [Interactable], index: &LinkIndex, config: &SimConfig) {
    for winch_index in 0..objects.len() {
        let source_live = match &objects[winch_index].kind {
            InteractableKind::Winch(winch) if winch.requires_power => winch
                .power_source
                .as_deref()
                .and_then(|id| index.index_of(id))
                .is_some_and(|source| is_powered(&objects[source])),
            InteractableKind::Winch(_) => true,
            _ => continue,
        };

        let mut reached_cap = false;
        if let InteractableKind::Winch(winch) = &mut objects[winch_index].kind {
            winch.powered = source_live;
            if !winch.operating || !source_live {
                continue;
            }
            if winch.extended >= 100.0 {
                winch.operating = false;
                continue;
            }
            winch.extended = (winch.extended + config.winch_increment).min(100.0);
            if winch.extended >= 100.0 {
                winch.operating = false;
                reached_cap = true;
            }
        }

        if reached_cap {
            for target in index.linked_indices(objects, winch_index) {
                let object = &mut objects[target];
                if let InteractableKind::Platform(platform) = &mut object.kind {
                    if let Some(raised) = platform.waypoints.get(1).copied() {
                        platform.progress = 1.0;
                        object.position = raised;
                    }
                    platform.moving = false;
                }
            }
        }
    }
}

fn update_platforms(objects: &mut [Interactable], config: &SimConfig) {
    for object in objects.iter_mut() {
        let InteractableKind::Platform(platform) = &mut object.kind else {
            continue;
        };
        if !platform.moving || platform.waypoints.len() < 2 {
            continue;
        }

        platform.progress += platform.direction * platform.speed * config.platform_tick_increment;
        if platform.progress >= 1.0 {
            platform.progress = 1.0;
            platform.direction = -1.0;
        } else if platform.progress <= 0.0 {
            platform.progress = 0.0;
            platform.direction = 1.0;
        }

        object.position = platform.waypoints[0].lerp(&platform.waypoints[1], platform.progress);
    }
}
