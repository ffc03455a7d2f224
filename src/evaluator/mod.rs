//! Machine evaluation as seen by the enumerator.
//!
//! The enumerator only needs a [`Classification`] per table; how it is
//! obtained (plain simulation, macro machines, proof systems) is the
//! evaluator's business. [`DirectSimulator`] is the bundled reference.

mod simulator;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::machine::{StateId, Symbol, TransitionTable};

pub use simulator::DirectSimulator;

/// Budgets handed to the evaluator for one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub step_limit: u64,
    pub tape_limit: usize,
    /// Exact configuration repeats are only looked for during these steps.
    pub cycle_check_steps: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_limit: 10_000,
            tape_limit: 100_000,
            cycle_check_steps: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfiniteReason {
    /// Fully defined table without any halt transition.
    NoHaltTransition,
    /// Runs off into blank tape in a single state forever.
    SpinOut,
    /// Revisited an exact earlier configuration.
    Cycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnknownReason {
    StepLimit,
    TapeLimit,
    /// Left in the queue when an enumeration budget ran out.
    NotRun,
}

/// Counters at the moment evaluation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialStats {
    pub steps: u64,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Halt {
        steps: u64,
        score: u64,
    },
    Infinite {
        reason: InfiniteReason,
    },
    UndefinedCell {
        state: StateId,
        symbol: Symbol,
        partial: PartialStats,
    },
    Unknown {
        reason: UnknownReason,
        detail: String,
    },
}

pub trait Evaluator {
    /// Classifies one table. An `Err` is an internal evaluator failure and
    /// aborts the whole run; running out of budget is `Unknown`, not an error.
    fn evaluate(
        &mut self,
        table: &TransitionTable,
        limits: &Limits,
    ) -> Result<Classification, EvalError>;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(
        &mut self,
        table: &TransitionTable,
        limits: &Limits,
    ) -> Result<Classification, EvalError> {
        (**self).evaluate(table, limits)
    }
}
