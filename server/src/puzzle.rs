//! Puzzle and objective evaluation.
//!
//! Objectives complete monotonically. A puzzle completes once every
//! non-optional objective has completed; optional objectives are tracked for
//! display but never block. Completing a puzzle with a reward target
//! force-opens that door once.

use log::debug;
use serde_json::Value;
use shared::{
    EntityState, Interactable, InteractableKind, ObjectiveCondition, ObjectiveState, PuzzleConfig,
    PuzzleState, Role,
};

use crate::contraption::LinkIndex;

/// Fresh puzzle states with every objective incomplete.
pub fn initial_states(configs: &[PuzzleConfig]) -> Vec<PuzzleState> {
    configs
        .iter()
        .map(|config| PuzzleState {
            id: config.id.clone(),
            name: config.name.clone(),
            completed: false,
            objectives: config
                .objectives
                .iter()
                .map(|objective| ObjectiveState {
                    id: objective.id.clone(),
                    description: objective.description.clone(),
                    optional: objective.optional,
                    completed: false,
                })
                .collect(),
        })
        .collect()
}

/// Changes produced by one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    /// Puzzles whose objectives or completion changed, in their new state.
    pub updated: Vec<PuzzleState>,
    /// Ids of puzzles that completed during this pass.
    pub completed: Vec<String>,
}

/// Re-evaluates every unresolved puzzle against the current world.
pub fn evaluate(
    configs: &[PuzzleConfig],
    states: &mut [PuzzleState],
    objects: &mut [Interactable],
    index: &LinkIndex,
    entities: &[EntityState],
) -> EvaluationOutcome {
    let mut outcome = EvaluationOutcome::default();

    for (config, state) in configs.iter().zip(states.iter_mut()) {
        if state.completed {
            continue;
        }

        let mut changed = false;
        for (objective, progress) in config.objectives.iter().zip(state.objectives.iter_mut()) {
            if progress.completed {
                continue;
            }
            if condition_holds(&objective.condition, objects, index, entities) {
                progress.completed = true;
                changed = true;
            }
        }

        let required_done = state
            .objectives
            .iter()
            .filter(|objective| !objective.optional)
            .all(|objective| objective.completed);

        if required_done {
            state.completed = true;
            changed = true;
            debug!("Puzzle '{}' requirements met", state.id);
            if let Some(target) = config.reward_target.as_deref() {
                grant_reward(objects, index, target);
            }
            outcome.completed.push(state.id.clone());
        }

        if changed {
            outcome.updated.push(state.clone());
        }
    }

    outcome
}

fn grant_reward(objects: &mut [Interactable], index: &LinkIndex, target: &str) {
    let Some(target_index) = index.index_of(target) else {
        return;
    };
    if let InteractableKind::Door(door) = &mut objects[target_index].kind {
        door.locked = false;
        door.open = true;
    }
}

pub fn condition_holds(
    condition: &ObjectiveCondition,
    objects: &[Interactable],
    index: &LinkIndex,
    entities: &[EntityState],
) -> bool {
    match condition {
        ObjectiveCondition::InteractableState { target, state } => {
            let Some(object) = index.index_of(target).map(|i| &objects[i]) else {
                return false;
            };
            let Some(fields) = state_fields(&object.kind) else {
                return false;
            };
            state
                .iter()
                .all(|(key, expected)| fields.get(key).is_some_and(|actual| values_match(actual, expected)))
        }
        ObjectiveCondition::BothPlayersInZone { zone } => Role::ALL.iter().all(|role| {
            entities
                .iter()
                .any(|entity| entity.role == *role && zone.contains(&entity.position))
        }),
        ObjectiveCondition::AllObjectives => true,
    }
}

/// The typed state of an interactable as a JSON object keyed by field name.
fn state_fields(kind: &InteractableKind) -> Option<serde_json::Map<String, Value>> {
    match serde_json::to_value(kind).ok()? {
        Value::Object(outer) => match outer.into_iter().next()?.1 {
            Value::Object(fields) => Some(fields),
            _ => None,
        },
        _ => None,
    }
}

/// Exact equality, except numbers compare by value so `100` matches `100.0`.
fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{DoorState, LeverPosition, LeverState, ObjectiveConfig, Vec3, WinchState, Zone};

    fn door(id: &str, open: bool) -> Interactable {
        Interactable {
            id: id.to_string(),
            position: Vec3::default(),
            kind: InteractableKind::Door(DoorState {
                open,
                locked: !open,
                requires_strength: false,
            }),
            linked: vec![],
        }
    }

    fn lever(id: &str, position: LeverPosition) -> Interactable {
        Interactable {
            id: id.to_string(),
            position: Vec3::default(),
            kind: InteractableKind::Lever(LeverState {
                position,
                ..Default::default()
            }),
            linked: vec![],
        }
    }

    fn state_objective(id: &str, optional: bool, target: &str, state: Value) -> ObjectiveConfig {
        ObjectiveConfig {
            id: id.to_string(),
            description: String::new(),
            optional,
            condition: ObjectiveCondition::InteractableState {
                target: target.to_string(),
                state: state.as_object().cloned().unwrap_or_default(),
            },
        }
    }

    fn puzzle(objectives: Vec<ObjectiveConfig>, reward: Option<&str>) -> PuzzleConfig {
        PuzzleConfig {
            id: "p".to_string(),
            name: "Puzzle".to_string(),
            objectives,
            reward_target: reward.map(str::to_string),
        }
    }

    #[test]
    fn test_interactable_state_matches_every_pair() {
        let objects = vec![lever("l", LeverPosition::On)];
        let index = LinkIndex::build(&objects);

        let on = ObjectiveCondition::InteractableState {
            target: "l".to_string(),
            state: json!({"position": "on"}).as_object().cloned().unwrap(),
        };
        let on_and_locked = ObjectiveCondition::InteractableState {
            target: "l".to_string(),
            state: json!({"position": "on", "locked": true}).as_object().cloned().unwrap(),
        };
        let missing = ObjectiveCondition::InteractableState {
            target: "nope".to_string(),
            state: json!({"position": "on"}).as_object().cloned().unwrap(),
        };

        assert!(condition_holds(&on, &objects, &index, &[]));
        assert!(!condition_holds(&on_and_locked, &objects, &index, &[]));
        assert!(!condition_holds(&missing, &objects, &index, &[]));
    }

    #[test]
    fn test_numeric_state_matches_integers() {
        let objects = vec![Interactable {
            id: "w".to_string(),
            position: Vec3::default(),
            kind: InteractableKind::Winch(WinchState {
                extended: 100.0,
                ..Default::default()
            }),
            linked: vec![],
        }];
        let index = LinkIndex::build(&objects);
        let condition = ObjectiveCondition::InteractableState {
            target: "w".to_string(),
            state: json!({"extended": 100}).as_object().cloned().unwrap(),
        };
        assert!(condition_holds(&condition, &objects, &index, &[]));
    }

    #[test]
    fn test_both_players_in_zone_needs_each_role() {
        let zone = Zone {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
        };
        let condition = ObjectiveCondition::BothPlayersInZone { zone };
        let inside_strength = EntityState::new(Role::Strength, Vec3::new(1.0, 1.0, 0.0));
        let inside_scout = EntityState::new(Role::Scout, Vec3::new(0.5, 1.5, 0.0));
        let outside_scout = EntityState::new(Role::Scout, Vec3::new(5.0, 1.0, 0.0));
        let index = LinkIndex::default();

        assert!(condition_holds(&condition, &[], &index, &[inside_strength.clone(), inside_scout]));
        assert!(!condition_holds(&condition, &[], &index, &[inside_strength.clone(), outside_scout]));
        assert!(!condition_holds(&condition, &[], &index, &[inside_strength]));
    }

    #[test]
    fn test_optional_objective_never_blocks() {
        let configs = vec![puzzle(
            vec![
                state_objective("required", false, "a", json!({"open": true})),
                state_objective("bonus", true, "b", json!({"open": true})),
            ],
            None,
        )];
        let mut states = initial_states(&configs);
        let mut objects = vec![door("a", false), door("b", false)];
        let index = LinkIndex::build(&objects);

        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert!(outcome.updated.is_empty());
        assert!(!states[0].completed);

        objects[0] = door("a", true);
        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert_eq!(outcome.completed, vec!["p".to_string()]);
        assert!(states[0].completed);
        assert!(states[0].objectives[0].completed);
        assert!(!states[0].objectives[1].completed);
    }

    #[test]
    fn test_objectives_are_monotonic() {
        let configs = vec![puzzle(
            vec![
                state_objective("first", false, "a", json!({"open": true})),
                state_objective("second", false, "b", json!({"open": true})),
            ],
            None,
        )];
        let mut states = initial_states(&configs);
        let mut objects = vec![door("a", true), door("b", false)];
        let index = LinkIndex::build(&objects);

        evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert!(states[0].objectives[0].completed);

        objects[0] = door("a", false);
        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert!(states[0].objectives[0].completed);
        assert!(outcome.updated.is_empty());

        objects[1] = door("b", true);
        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert_eq!(outcome.completed.len(), 1);
    }

    #[test]
    fn test_reward_door_opens_once() {
        let configs = vec![puzzle(
            vec![ObjectiveConfig {
                id: "marker".to_string(),
                description: String::new(),
                optional: false,
                condition: ObjectiveCondition::AllObjectives,
            }],
            Some("exit"),
        )];
        let mut states = initial_states(&configs);
        let mut objects = vec![door("exit", false)];
        let index = LinkIndex::build(&objects);

        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert_eq!(outcome.completed.len(), 1);
        assert!(matches!(&objects[0].kind, InteractableKind::Door(d) if d.open && !d.locked));

        // Closing the door afterwards is not undone by later passes.
        objects[0] = door("exit", false);
        let outcome = evaluate(&configs, &mut states, &mut objects, &index, &[]);
        assert!(outcome.completed.is_empty());
        assert!(matches!(&objects[0].kind, InteractableKind::Door(d) if !d.open));
    }
}
