use serde::{Deserialize, Serialize};

use super::table::{Dir, Next, StateId, Symbol, Transition, TransitionTable};

/// A candidate machine plus the bookkeeping the TNF enumeration needs.
///
/// Jobs are values: a child never aliases mutable state of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub table: TransitionTable,
    /// Largest state index used so far (state A = 0 counts as used).
    pub max_state_seen: StateId,
    /// Largest symbol written so far (the blank 0 counts as used).
    pub max_symbol_seen: Symbol,
    pub num_defined_transitions: usize,
    pub num_empty_cells: usize,
    /// Cells that may be defined before the next one must be the halt.
    pub max_transitions: usize,
}

impl Job {
    /// The empty root table. `max_transitions` defaults to every cell.
    pub fn root(num_states: usize, num_symbols: usize, max_transitions: Option<usize>) -> Self {
        let table = TransitionTable::empty(num_states, num_symbols);
        let cells = table.num_cells();
        Self {
            table,
            max_state_seen: 0,
            max_symbol_seen: 0,
            num_defined_transitions: 0,
            num_empty_cells: cells,
            max_transitions: max_transitions.unwrap_or(cells).clamp(1, cells),
        }
    }

    /// Seeds the conventional first transition `A0 -> 1RB`.
    pub fn with_first_transition(self) -> Self {
        let first = if self.table.num_states() > 1 {
            Transition::new(1, Dir::Right, 1)
        } else {
            Transition::HALT
        };
        self.child(0, 0, first)
    }

    /// A new job with one more cell defined; the counters follow the cell.
    pub fn child(&self, state: StateId, symbol: Symbol, transition: Transition) -> Self {
        let max_state_seen = match transition.next {
            Next::State(s) => self.max_state_seen.max(s),
            Next::Halt => self.max_state_seen,
        };
        Self {
            table: self.table.with(state, symbol, transition),
            max_state_seen,
            max_symbol_seen: self.max_symbol_seen.max(transition.symbol),
            num_defined_transitions: self.num_defined_transitions + 1,
            num_empty_cells: self.num_empty_cells - 1,
            max_transitions: self.max_transitions,
        }
    }

    /// True when the next cell to resolve must be the halt transition.
    pub fn at_transition_cap(&self) -> bool {
        self.num_defined_transitions + 1 >= self.max_transitions
    }

    pub fn num_states(&self) -> usize {
        self.table.num_states()
    }

    pub fn num_symbols(&self) -> usize {
        self.table.num_symbols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_defaults() {
        let job = Job::root(3, 2, None);
        assert_eq!(job.num_defined_transitions, 0);
        assert_eq!(job.num_empty_cells, 6);
        assert_eq!(job.max_transitions, 6);
        assert_eq!(job.max_state_seen, 0);
        assert_eq!(job.max_symbol_seen, 0);
        assert!(!job.at_transition_cap());
    }

    #[test]
    fn max_transitions_is_clamped_to_cell_count() {
        assert_eq!(Job::root(2, 2, Some(99)).max_transitions, 4);
        assert_eq!(Job::root(2, 2, Some(0)).max_transitions, 1);
        assert!(Job::root(2, 2, Some(1)).at_transition_cap());
    }

    #[test]
    fn first_transition_is_1rb() {
        let job = Job::root(2, 2, None).with_first_transition();
        assert_eq!(job.table.to_string(), "1RB---_------");
        assert_eq!(job.max_state_seen, 1);
        assert_eq!(job.max_symbol_seen, 1);
        assert_eq!(job.num_defined_transitions, 1);
        assert_eq!(job.num_empty_cells, 3);
    }

    #[test]
    fn child_leaves_parent_untouched() {
        let parent = Job::root(2, 2, None);
        let child = parent.child(0, 0, Transition::new(0, Dir::Right, 0));
        assert_eq!(parent.num_defined_transitions, 0);
        assert_eq!(child.num_defined_transitions, 1);
        assert_eq!(child.max_state_seen, 0);
        assert_eq!(parent.table.get(0, 0), None);
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = Job::root(2, 3, None).with_first_transition();
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
