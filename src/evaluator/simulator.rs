use std::collections::{HashSet, VecDeque};

use super::{Classification, Evaluator, InfiniteReason, Limits, PartialStats, UnknownReason};
use crate::error::EvalError;
use crate::machine::{Dir, Next, StateId, Symbol, Transition, TransitionTable};

/// Step-by-step simulation on an explicit tape with two cheap non-halting
/// checks (spin-out and exact cycles).
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSimulator;

struct Tape {
    cells: VecDeque<Symbol>,
    head: usize,
    /// Absolute position of `cells[0]`.
    origin: i64,
}

impl Tape {
    fn new() -> Self {
        Self {
            cells: VecDeque::from([0]),
            head: 0,
            origin: 0,
        }
    }

    fn read(&self) -> Symbol {
        self.cells[self.head]
    }

    fn write(&mut self, symbol: Symbol) {
        self.cells[self.head] = symbol;
    }

    fn step(&mut self, dir: Dir) {
        match dir {
            Dir::Left if self.head == 0 => {
                self.cells.push_front(0);
                self.origin -= 1;
            }
            Dir::Left => self.head -= 1,
            Dir::Right => {
                self.head += 1;
                if self.head == self.cells.len() {
                    self.cells.push_back(0);
                }
            }
        }
    }

    /// True when every visited cell strictly beyond the head in `dir` is blank.
    fn blank_beyond(&self, dir: Dir) -> bool {
        match dir {
            Dir::Left => self.cells.range(..self.head).all(|&s| s == 0),
            Dir::Right => self.cells.range(self.head + 1..).all(|&s| s == 0),
        }
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn score(&self) -> u64 {
        self.cells.iter().filter(|&&s| s != 0).count() as u64
    }

    /// Identifies the full configuration: head position and non-blank span.
    fn config_key(&self, state: StateId) -> (StateId, i64, i64, Vec<Symbol>) {
        let first = self.cells.iter().position(|&s| s != 0);
        let last = self.cells.iter().rposition(|&s| s != 0);
        let head = self.origin + self.head as i64;
        match (first, last) {
            (Some(first), Some(last)) => (
                state,
                head,
                self.origin + first as i64,
                self.cells.range(first..=last).copied().collect(),
            ),
            _ => (state, head, 0, Vec::new()),
        }
    }
}

impl Evaluator for DirectSimulator {
    fn evaluate(
        &mut self,
        table: &TransitionTable,
        limits: &Limits,
    ) -> Result<Classification, EvalError> {
        let cells = table.to_dense();
        let num_symbols = table.num_symbols();

        let fully_defined = cells.iter().all(Option::is_some);
        let has_halt = cells.iter().flatten().any(Transition::is_halt);
        if fully_defined && !has_halt {
            return Ok(Classification::Infinite {
                reason: InfiniteReason::NoHaltTransition,
            });
        }

        let mut tape = Tape::new();
        let mut state: StateId = 0;
        let mut steps: u64 = 0;
        let mut seen = HashSet::new();

        loop {
            if steps >= limits.step_limit {
                return Ok(Classification::Unknown {
                    reason: UnknownReason::StepLimit,
                    detail: format!("still running after {steps} steps"),
                });
            }

            let symbol = tape.read();
            let transition = match cells[state as usize * num_symbols + symbol as usize] {
                Some(t) => t,
                None => {
                    return Ok(Classification::UndefinedCell {
                        state,
                        symbol,
                        partial: PartialStats {
                            steps,
                            score: tape.score(),
                        },
                    });
                }
            };

            if symbol == 0
                && transition.next == Next::State(state)
                && tape.blank_beyond(transition.dir)
            {
                return Ok(Classification::Infinite {
                    reason: InfiniteReason::SpinOut,
                });
            }
            if steps < limits.cycle_check_steps && !seen.insert(tape.config_key(state)) {
                return Ok(Classification::Infinite {
                    reason: InfiniteReason::Cycle,
                });
            }

            tape.write(transition.symbol);
            tape.step(transition.dir);
            steps += 1;

            if tape.len() > limits.tape_limit {
                return Ok(Classification::Unknown {
                    reason: UnknownReason::TapeLimit,
                    detail: format!(
                        "tape grew past {} cells after {steps} steps",
                        limits.tape_limit
                    ),
                });
            }

            match transition.next {
                Next::Halt => {
                    return Ok(Classification::Halt {
                        steps,
                        score: tape.score(),
                    });
                }
                Next::State(next) if (next as usize) < table.num_states() => state = next,
                Next::State(next) => {
                    return Err(EvalError(format!(
                        "transition into state {next} of a {}-state table",
                        table.num_states()
                    )));
                }
            }
        }
    }
}
