//! Exhaustive Busy Beaver search over Turing machines in tree normal form.
//!
//! The [`enumerator`] pops jobs from a [`queue`], classifies them with an
//! [`evaluator`] and branches on undefined cells via [`tnf`]. The queue can be
//! local or spread over a master and many workers through a [`transport`].

pub mod checkpoint;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod evaluator;
pub mod machine;
pub mod protocol;
pub mod queue;
pub mod record;
pub mod rng;
pub mod runner;
pub mod tnf;
pub mod transport;
pub mod ui;

pub use enumerator::{
    EnumSettings, EnumStats, Enumerator, EnumeratorContext, SearchParams, StepOutcome,
};
pub use error::SearchError;
