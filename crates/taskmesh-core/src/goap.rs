use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::Level;

use taskmesh_observability::{emit_event, ObservabilityEvent, ProcessKind};
use taskmesh_types::goap::{action_catalogue, ActionName, GoapAction, GoapPlan};
use taskmesh_types::world_state::{WorldState, WorldStateKey};

/// A* search node. Ordered by `f = g + h` ascending, then by the action name
/// of the step that produced it, so two plans of equal cost resolve
/// deterministically (ties break lexically by action name).
#[derive(Debug, Clone, Eq, PartialEq)]
struct Node {
    state: WorldState,
    g: u32,
    h: u32,
    path: Vec<ActionName>,
}

impl Node {
    fn f(&self) -> u32 {
        self.g + self.h
    }

    fn last_action(&self) -> Option<ActionName> {
        self.path.last().copied()
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so lowest f (then lexical action
        // name) comes out first.
        other
            .f()
            .cmp(&self.f())
            .then_with(|| self.last_action().cmp(&other.last_action()))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Admissible heuristic: the count of goal keys not yet satisfied. Every
/// action in the catalogue sets at most the keys it declares as effects, so
/// this never overestimates the remaining cost.
fn heuristic(state: &WorldState, goal: &[(WorldStateKey, bool)]) -> u32 {
    goal.iter()
        .filter(|(key, value)| state.get(*key) != *value)
        .count() as u32
}

/// A* search from `start` to the first state subsuming `goal`, over the
/// static action catalogue. Returns `GoapPlan::dead_end = true` when no
/// sequence of actions reaches the goal, so an unreachable goal yields a
/// distinguishable dead-end result rather than an error.
///
/// `cost_overrides` multiplies an action's `base_cost` by the matching
/// entry when present, so a caller can steer the search away from (or
/// toward) a specific action without touching the static catalogue —
/// search stays deterministic since the override map is part of the input.
pub fn plan(
    start: &WorldState,
    goal: &[(WorldStateKey, bool)],
    cost_overrides: Option<&HashMap<ActionName, f64>>,
) -> GoapPlan {
    let actions = action_catalogue();
    plan_with_catalogue(start, goal, &actions, cost_overrides)
}

fn edge_cost(action: &GoapAction, cost_overrides: Option<&HashMap<ActionName, f64>>) -> u32 {
    let multiplier = cost_overrides
        .and_then(|overrides| overrides.get(&action.name))
        .copied()
        .unwrap_or(1.0);
    ((action.base_cost as f64) * multiplier).round() as u32
}

fn plan_with_catalogue(
    start: &WorldState,
    goal: &[(WorldStateKey, bool)],
    actions: &[GoapAction],
    cost_overrides: Option<&HashMap<ActionName, f64>>,
) -> GoapPlan {
    if start.subsumes(goal) {
        emit_goap_decision(0, false);
        return GoapPlan {
            actions: Vec::new(),
            dead_end: false,
        };
    }

    let mut open = BinaryHeap::new();
    let mut best_g: HashMap<Vec<bool>, u32> = HashMap::new();

    let fingerprint = |s: &WorldState| -> Vec<bool> {
        WorldStateKey::ALL.iter().map(|k| s.get(*k)).collect()
    };

    open.push(Node {
        state: start.clone(),
        g: 0,
        h: heuristic(start, goal),
        path: Vec::new(),
    });
    best_g.insert(fingerprint(start), 0);

    // Bound expansion so a pathological catalogue cannot spin forever; the
    // real catalogue reaches any goal in well under this many steps.
    const MAX_EXPANSIONS: usize = 10_000;
    let mut expansions = 0usize;

    while let Some(node) = open.pop() {
        expansions += 1;
        if expansions > MAX_EXPANSIONS {
            break;
        }

        if node.state.subsumes(goal) {
            emit_goap_decision(node.path.len(), false);
            return GoapPlan {
                actions: node.path,
                dead_end: false,
            };
        }

        for action in actions {
            if !node.state.subsumes(&action.preconditions) {
                continue;
            }

            let next_state = node.state.overlay(&action.effects);
            let next_g = node.g + edge_cost(action, cost_overrides);
            let key = fingerprint(&next_state);

            if let Some(&existing) = best_g.get(&key) {
                if existing <= next_g {
                    continue;
                }
            }
            best_g.insert(key, next_g);

            let mut next_path = node.path.clone();
            next_path.push(action.name);

            let next_h = heuristic(&next_state, goal);
            open.push(Node {
                state: next_state,
                g: next_g,
                h: next_h,
                path: next_path,
            });
        }
    }

    emit_goap_decision(0, true);
    GoapPlan {
        actions: Vec::new(),
        dead_end: true,
    }
}

fn emit_goap_decision(plan_length: usize, dead_end: bool) {
    emit_event(
        if dead_end { Level::WARN } else { Level::INFO },
        ProcessKind::Coordinator,
        ObservabilityEvent {
            event: "goap.decision",
            component: "goap",
            correlation_id: None,
            task_id: None,
            role: None,
            adapter_id: None,
            status: Some(if dead_end { "dead_end" } else { "planned" }),
            error_code: None,
            detail: Some(&plan_length.to_string()),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorldStateKey::*;

    #[test]
    fn finds_plan_from_scratch_to_done() {
        let start = WorldState::from_true([TaskExists, AdapterAvailable]);
        let goal = [(Done, true)];
        let result = plan(&start, &goal, None);
        assert!(!result.dead_end);
        assert_eq!(
            result.actions,
            vec![
                ActionName::Plan,
                ActionName::Build,
                ActionName::Review,
                ActionName::Finalize,
            ]
        );
    }

    #[test]
    fn already_satisfied_goal_yields_empty_plan() {
        let start = WorldState::from_true([Done]);
        let result = plan(&start, &[(Done, true)], None);
        assert!(!result.dead_end);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn rejected_review_routes_through_rework() {
        let start = WorldState::from_true([TaskExists, AdapterAvailable, BuildExists, ReviewRejected]);
        let result = plan(&start, &[(Done, true)], None);
        assert!(!result.dead_end);
        assert!(result.actions.contains(&ActionName::Rework));
        assert_eq!(result.actions.last(), Some(&ActionName::Finalize));
    }

    #[test]
    fn retry_limit_reached_with_rejected_review_escalates() {
        let start = WorldState::from_true([
            TaskExists,
            AdapterAvailable,
            PlanExists,
            BuildExists,
            ReviewRejected,
            RetryLimitReached,
        ]);
        let result = plan(&start, &[(Done, true)], None);
        assert!(!result.dead_end);
        assert_eq!(result.actions, vec![ActionName::Escalate]);
    }

    #[test]
    fn unreachable_goal_is_a_dead_end_not_a_panic() {
        let start = WorldState::new();
        // AdapterAvailable is never an effect of any action, so a goal
        // requiring it from an empty start is unreachable.
        let result = plan(&start, &[(AdapterAvailable, true)], None);
        assert!(result.dead_end);
    }

    #[test]
    fn cost_override_switches_the_chosen_action() {
        use taskmesh_types::goap::GoapAction;

        let cheap = GoapAction {
            name: ActionName::Build,
            preconditions: vec![(TaskExists, true)],
            effects: vec![(Done, true)],
            base_cost: 1,
        };
        let expensive = GoapAction {
            name: ActionName::Rework,
            preconditions: vec![(TaskExists, true)],
            effects: vec![(Done, true)],
            base_cost: 1,
        };
        let actions = vec![cheap, expensive];

        let start = WorldState::from_true([TaskExists]);
        let goal = [(Done, true)];

        let unbiased = plan_with_catalogue(&start, &goal, &actions, None);
        assert_eq!(unbiased.actions, vec![ActionName::Build]);

        let mut overrides = HashMap::new();
        overrides.insert(ActionName::Build, 10.0);
        let biased = plan_with_catalogue(&start, &goal, &actions, Some(&overrides));
        assert_eq!(biased.actions, vec![ActionName::Rework]);
    }
}
