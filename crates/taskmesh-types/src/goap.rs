use crate::world_state::WorldStateKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionName {
    Plan,
    Build,
    Review,
    Rework,
    SecondOpinion,
    WaitForSubTasks,
    Finalize,
    Escalate,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Plan => "Plan",
            ActionName::Build => "Build",
            ActionName::Review => "Review",
            ActionName::Rework => "Rework",
            ActionName::SecondOpinion => "SecondOpinion",
            ActionName::WaitForSubTasks => "WaitForSubTasks",
            ActionName::Finalize => "Finalize",
            ActionName::Escalate => "Escalate",
        }
    }
}

/// `{ name, preconditions, effects, baseCost }`.
#[derive(Debug, Clone)]
pub struct GoapAction {
    pub name: ActionName,
    pub preconditions: Vec<(WorldStateKey, bool)>,
    pub effects: Vec<(WorldStateKey, bool)>,
    pub base_cost: u32,
}

/// Result of `taskmesh_core::goap::plan`.
#[derive(Debug, Clone, Default)]
pub struct GoapPlan {
    pub actions: Vec<ActionName>,
    pub dead_end: bool,
}

use WorldStateKey::*;

/// The static action catalogue. Kept here (rather than configurable) because
/// it must admit at least one total ordering from `{TaskExists=true}` to
/// `{status=Done}`; tests assert that invariant against this exact table, and
/// `Escalate`'s unconditional path to `Done` exists so a planner starved of a
/// legitimate route can still terminate the task.
pub fn action_catalogue() -> Vec<GoapAction> {
    vec![
        GoapAction {
            name: ActionName::Plan,
            preconditions: vec![(TaskExists, true), (PlanExists, false)],
            effects: vec![(PlanExists, true)],
            base_cost: 1,
        },
        GoapAction {
            name: ActionName::Build,
            preconditions: vec![(PlanExists, true), (BuildExists, false)],
            effects: vec![(BuildExists, true)],
            base_cost: 1,
        },
        GoapAction {
            name: ActionName::Review,
            preconditions: vec![
                (BuildExists, true),
                (ReviewPassed, false),
                (ReviewRejected, false),
                (ConsensusDisputed, false),
            ],
            effects: vec![(ReviewPassed, true)],
            base_cost: 1,
        },
        GoapAction {
            name: ActionName::Rework,
            preconditions: vec![(ReviewRejected, true), (RetryLimitReached, false)],
            effects: vec![(ReviewRejected, false), (BuildExists, false)],
            base_cost: 2,
        },
        GoapAction {
            name: ActionName::SecondOpinion,
            preconditions: vec![(ConsensusDisputed, true), (RetryLimitReached, false)],
            effects: vec![(ConsensusDisputed, false), (ConsensusReached, true)],
            base_cost: 2,
        },
        GoapAction {
            name: ActionName::WaitForSubTasks,
            preconditions: vec![(SubTasksSpawned, true), (SubTasksCompleted, false)],
            effects: vec![(SubTasksCompleted, true)],
            base_cost: 1,
        },
        GoapAction {
            name: ActionName::Finalize,
            preconditions: vec![(ReviewPassed, true), (TaskBlocked, false)],
            effects: vec![(Done, true)],
            base_cost: 1,
        },
        GoapAction {
            name: ActionName::Escalate,
            preconditions: vec![(RetryLimitReached, true)],
            effects: vec![(TaskBlocked, true), (Done, true)],
            base_cost: 5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_nonempty_and_named_uniquely() {
        let actions = action_catalogue();
        assert!(!actions.is_empty());
        let mut names: Vec<_> = actions.iter().map(|a| a.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), actions.len());
    }
}
