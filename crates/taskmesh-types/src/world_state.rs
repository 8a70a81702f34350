use std::collections::BTreeSet;

/// Boolean keys over which the GOAP planner and the coordinator reason.
///
/// The set is closed: no component may introduce a key outside this enum,
/// which keeps `WorldState` representable as a bit vector and keeps GOAP's
/// heuristic admissible (see `taskmesh-core::goap`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorldStateKey {
    TaskExists,
    AdapterAvailable,
    PlanExists,
    BuildExists,
    ReviewPassed,
    ReviewRejected,
    RetryLimitReached,
    TaskBlocked,
    SubTasksSpawned,
    SubTasksCompleted,
    ConsensusReached,
    ConsensusDisputed,
    HighFailureRateDetected,
    SimilarTaskSucceeded,
    Done,
}

impl WorldStateKey {
    pub const ALL: [WorldStateKey; 15] = [
        WorldStateKey::TaskExists,
        WorldStateKey::AdapterAvailable,
        WorldStateKey::PlanExists,
        WorldStateKey::BuildExists,
        WorldStateKey::ReviewPassed,
        WorldStateKey::ReviewRejected,
        WorldStateKey::RetryLimitReached,
        WorldStateKey::TaskBlocked,
        WorldStateKey::SubTasksSpawned,
        WorldStateKey::SubTasksCompleted,
        WorldStateKey::ConsensusReached,
        WorldStateKey::ConsensusDisputed,
        WorldStateKey::HighFailureRateDetected,
        WorldStateKey::SimilarTaskSucceeded,
        WorldStateKey::Done,
    ];
}

/// A valuation of the closed world-state key set. Only keys present in the
/// set are considered `true`; absence means `false`. Every mutation
/// (`with`/`without`) produces a new value rather than mutating in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    set: BTreeSet<WorldStateKey>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_true(keys: impl IntoIterator<Item = WorldStateKey>) -> Self {
        Self {
            set: keys.into_iter().collect(),
        }
    }

    pub fn get(&self, key: WorldStateKey) -> bool {
        self.set.contains(&key)
    }

    pub fn with(&self, key: WorldStateKey, value: bool) -> Self {
        let mut next = self.clone();
        if value {
            next.set.insert(key);
        } else {
            next.set.remove(&key);
        }
        next
    }

    /// Overlay a partial assignment (an action's effects) atop this state.
    pub fn overlay(&self, effects: &[(WorldStateKey, bool)]) -> Self {
        let mut next = self.clone();
        for (key, value) in effects {
            if *value {
                next.set.insert(*key);
            } else {
                next.set.remove(key);
            }
        }
        next
    }

    /// True if every `(key, value)` pair in `partial` matches this state.
    pub fn subsumes(&self, partial: &[(WorldStateKey, bool)]) -> bool {
        partial.iter().all(|(key, value)| self.get(*key) == *value)
    }

    pub fn iter_true(&self) -> impl Iterator<Item = WorldStateKey> + '_ {
        self.set.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_is_immutable() {
        let a = WorldState::from_true([WorldStateKey::TaskExists]);
        let b = a.with(WorldStateKey::PlanExists, true);
        assert!(!a.get(WorldStateKey::PlanExists));
        assert!(b.get(WorldStateKey::PlanExists));
        assert!(b.get(WorldStateKey::TaskExists));
    }

    #[test]
    fn subsumes_checks_every_pair() {
        let s = WorldState::from_true([WorldStateKey::TaskExists, WorldStateKey::PlanExists]);
        assert!(s.subsumes(&[(WorldStateKey::TaskExists, true)]));
        assert!(!s.subsumes(&[(WorldStateKey::BuildExists, true)]));
        assert!(s.subsumes(&[(WorldStateKey::BuildExists, false)]));
    }
}
