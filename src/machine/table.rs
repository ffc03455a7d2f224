//! Transition tables stored as persistent assignment lists.
//!
//! A child table is its parent plus one assignment, so creating a child costs
//! a single allocation and siblings share every unchanged cell. Lookups walk
//! the list, which is at most `num_states * num_symbols` long; the evaluator
//! materializes a dense view once per run with [`TransitionTable::to_dense`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TableParseError;

pub type StateId = u8;
pub type Symbol = u8;

/// Largest supported state count; `Z` is reserved for halt.
pub const MAX_STATES: usize = 25;
/// Largest supported alphabet; symbols are written as single digits.
pub const MAX_SYMBOLS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dir {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Next {
    State(StateId),
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub symbol: Symbol,
    pub dir: Dir,
    pub next: Next,
}

impl Transition {
    /// The canonical halt transition `1RZ`.
    pub const HALT: Transition = Transition {
        symbol: 1,
        dir: Dir::Right,
        next: Next::Halt,
    };

    pub fn new(symbol: Symbol, dir: Dir, next: StateId) -> Self {
        Self {
            symbol,
            dir,
            next: Next::State(next),
        }
    }

    pub fn is_halt(&self) -> bool {
        self.next == Next::Halt
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.dir {
            Dir::Left => 'L',
            Dir::Right => 'R',
        };
        let next = match self.next {
            Next::State(s) => (b'A' + s) as char,
            Next::Halt => 'Z',
        };
        write!(f, "{}{dir}{next}", self.symbol)
    }
}

#[derive(Debug)]
struct Assignment {
    cell: usize,
    transition: Transition,
    parent: Option<Arc<Assignment>>,
}

/// An N-state, M-symbol transition table with possibly undefined cells.
#[derive(Clone)]
pub struct TransitionTable {
    num_states: u8,
    num_symbols: u8,
    head: Option<Arc<Assignment>>,
}

impl TransitionTable {
    pub fn empty(num_states: usize, num_symbols: usize) -> Self {
        debug_assert!((1..=MAX_STATES).contains(&num_states));
        debug_assert!((2..=MAX_SYMBOLS).contains(&num_symbols));
        Self {
            num_states: num_states as u8,
            num_symbols: num_symbols as u8,
            head: None,
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states as usize
    }

    pub fn num_symbols(&self) -> usize {
        self.num_symbols as usize
    }

    pub fn num_cells(&self) -> usize {
        self.num_states() * self.num_symbols()
    }

    fn index(&self, state: StateId, symbol: Symbol) -> usize {
        state as usize * self.num_symbols() + symbol as usize
    }

    fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        std::iter::successors(self.head.as_deref(), |a| a.parent.as_deref())
    }

    pub fn get(&self, state: StateId, symbol: Symbol) -> Option<Transition> {
        let cell = self.index(state, symbol);
        self.assignments()
            .find(|a| a.cell == cell)
            .map(|a| a.transition)
    }

    /// Returns a copy of this table with one more cell defined.
    ///
    /// Cells are never redefined: the enumeration only ever fills cells that
    /// the evaluator reported as undefined.
    pub fn with(&self, state: StateId, symbol: Symbol, transition: Transition) -> Self {
        debug_assert!(self.get(state, symbol).is_none(), "cell redefined");
        Self {
            num_states: self.num_states,
            num_symbols: self.num_symbols,
            head: Some(Arc::new(Assignment {
                cell: self.index(state, symbol),
                transition,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn num_defined(&self) -> usize {
        self.assignments().count()
    }

    /// Row-major dense view: `cells[state * num_symbols + symbol]`.
    pub fn to_dense(&self) -> Vec<Option<Transition>> {
        let mut cells = vec![None; self.num_cells()];
        for a in self.assignments() {
            cells[a.cell] = Some(a.transition);
        }
        cells
    }

    pub fn from_dense(num_states: usize, num_symbols: usize, cells: &[Option<Transition>]) -> Self {
        let mut table = Self::empty(num_states, num_symbols);
        for (i, cell) in cells.iter().enumerate() {
            if let Some(t) = cell {
                let state = (i / num_symbols) as StateId;
                let symbol = (i % num_symbols) as Symbol;
                table = table.with(state, symbol, *t);
            }
        }
        table
    }
}

impl PartialEq for TransitionTable {
    fn eq(&self, other: &Self) -> bool {
        self.num_states == other.num_states
            && self.num_symbols == other.num_symbols
            && self.to_dense() == other.to_dense()
    }
}

impl Eq for TransitionTable {}

impl Hash for TransitionTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.num_states.hash(state);
        self.num_symbols.hash(state);
        self.to_dense().hash(state);
    }
}

impl fmt::Debug for TransitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransitionTable({self})")
    }
}

/// Standard text notation, e.g. `1RB1LB_1LA1RZ`; undefined cells are `---`.
impl fmt::Display for TransitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self.to_dense();
        for (state, row) in cells.chunks(self.num_symbols()).enumerate() {
            if state > 0 {
                f.write_str("_")?;
            }
            for cell in row {
                match cell {
                    Some(t) => write!(f, "{t}")?,
                    None => f.write_str("---")?,
                }
            }
        }
        Ok(())
    }
}

fn parse_cell(
    row: usize,
    text: &str,
    num_states: usize,
    num_symbols: usize,
) -> Result<Option<Transition>, TableParseError> {
    let bad = || TableParseError::Cell {
        row,
        cell: text.to_string(),
    };
    if text == "---" {
        return Ok(None);
    }
    let bytes = text.as_bytes();
    let symbol = (bytes[0] as char).to_digit(10).ok_or_else(bad)? as usize;
    if symbol >= num_symbols {
        return Err(bad());
    }
    let dir = match bytes[1] {
        b'L' => Dir::Left,
        b'R' => Dir::Right,
        _ => return Err(bad()),
    };
    let next = match bytes[2] {
        b'Z' => Next::Halt,
        c @ b'A'..=b'Y' if ((c - b'A') as usize) < num_states => Next::State(c - b'A'),
        _ => return Err(bad()),
    };
    Ok(Some(Transition {
        symbol: symbol as Symbol,
        dir,
        next,
    }))
}

impl FromStr for TransitionTable {
    type Err = TableParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows: Vec<&str> = s.trim().split('_').collect();
        let first = rows.first().filter(|r| !r.is_empty()).ok_or(TableParseError::Empty)?;
        let num_states = rows.len();
        if num_states > MAX_STATES {
            return Err(TableParseError::TooManyStates(num_states));
        }
        if !first.is_ascii() || first.len() % 3 != 0 {
            return Err(TableParseError::RowLength {
                row: 0,
                len: first.len(),
                expected: 3 * (first.len() / 3).max(2),
            });
        }
        let num_symbols = first.len() / 3;
        if !(2..=MAX_SYMBOLS).contains(&num_symbols) {
            return Err(TableParseError::UnsupportedSymbols(num_symbols));
        }

        let mut cells = Vec::with_capacity(num_states * num_symbols);
        for (row, text) in rows.iter().enumerate() {
            if !text.is_ascii() || text.len() != 3 * num_symbols {
                return Err(TableParseError::RowLength {
                    row,
                    len: text.len(),
                    expected: 3 * num_symbols,
                });
            }
            for chunk in text.as_bytes().chunks(3) {
                // Row is ASCII, so every 3-byte chunk is valid UTF-8.
                let cell = std::str::from_utf8(chunk).unwrap_or_default();
                cells.push(parse_cell(row, cell, num_states, num_symbols)?);
            }
        }
        Ok(Self::from_dense(num_states, num_symbols, &cells))
    }
}

impl Serialize for TransitionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransitionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
