mod job;
mod table;

pub use job::Job;
pub use table::{
    Dir, MAX_STATES, MAX_SYMBOLS, Next, StateId, Symbol, Transition, TransitionTable,
};
