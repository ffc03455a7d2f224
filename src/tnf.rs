//! Tree-normal-form child generation.
//!
//! Given the first undefined cell a job ran into, [`enumerate_children`]
//! yields every admissible way to fill it. New states and symbols may be at
//! most one above the largest already in use, and the very first transition
//! of a table always moves right, so tables that differ only by relabeling
//! states, symbols or mirroring the tape are generated once.

use crate::machine::{Dir, Job, StateId, Symbol, Transition};

/// Direction allowed while the table has no transition yet.
pub const CANONICAL_FIRST_DIR: Dir = Dir::Right;

pub fn enumerate_children(job: &Job, state_in: StateId, symbol_in: Symbol) -> Vec<Job> {
    if job.at_transition_cap() {
        return vec![job.child(state_in, symbol_in, Transition::HALT)];
    }

    let state_bound = job.num_states().min(job.max_state_seen as usize + 2);
    let symbol_bound = job.num_symbols().min(job.max_symbol_seen as usize + 2);
    let dirs: &[Dir] = if job.num_defined_transitions == 0 {
        &[CANONICAL_FIRST_DIR]
    } else {
        &[Dir::Left, Dir::Right]
    };

    let mut children = Vec::with_capacity(state_bound * symbol_bound * dirs.len());
    for state_out in 0..state_bound as StateId {
        for symbol_out in 0..symbol_bound as Symbol {
            for &dir in dirs {
                let transition = Transition::new(symbol_out, dir, state_out);
                children.push(job.child(state_in, symbol_in, transition));
            }
        }
    }
    children
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::machine::{Next, TransitionTable};

    #[test]
    fn root_children_all_move_right() {
        let root = Job::root(2, 2, None);
        let children = enumerate_children(&root, 0, 0);
        let tables: Vec<String> = children.iter().map(|c| c.table.to_string()).collect();
        assert_eq!(
            tables,
            vec!["0RA---_------", "1RA---_------", "0RB---_------", "1RB---_------"]
        );
    }

    #[test]
    fn both_directions_after_first_transition() {
        let job = Job::root(3, 2, None).with_first_transition();
        let children = enumerate_children(&job, 1, 0);
        // states A..C (B seen, so C is the one new state), symbols 0..1, L and R
        assert_eq!(children.len(), 3 * 2 * 2);
        assert!(children.iter().any(|c| c.table.get(1, 0).map(|t| t.dir) == Some(Dir::Left)));
        assert!(children.iter().all(|c| c.num_defined_transitions == 2));
    }

    #[test]
    fn new_state_bound_is_one_above_max_seen() {
        let job = Job::root(5, 2, None).with_first_transition();
        let children = enumerate_children(&job, 1, 0);
        let max_next = children
            .iter()
            .filter_map(|c| match c.table.get(1, 0)?.next {
                Next::State(s) => Some(s),
                Next::Halt => None,
            })
            .max();
        assert_eq!(max_next, Some(2));
    }

    #[test]
    fn last_definable_cell_gets_halt() {
        let table: TransitionTable = "1RB1LB_1LA---".parse().unwrap();
        let job = Job {
            table,
            max_state_seen: 1,
            max_symbol_seen: 1,
            num_defined_transitions: 3,
            num_empty_cells: 1,
            max_transitions: 4,
        };
        let children = enumerate_children(&job, 1, 1);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].table.to_string(), "1RB1LB_1LA1RZ");
    }

    #[test]
    fn children_are_distinct() {
        let job = Job::root(3, 3, None).with_first_transition();
        let children = enumerate_children(&job, 1, 0);
        let unique: HashSet<_> = children.iter().map(|c| c.table.clone()).collect();
        assert_eq!(unique.len(), children.len());
    }
}
