//! Durable access counters for issued passwords.
//!
//! # Lifecycle
//!
//! 1. At startup, [`CounterStore::open`] connects to the SQLite file named by
//!    the configured DSN, ensures the `counter` table exists with one row per
//!    [`Kind`], and loads every count into memory.
//! 2. Reads ([`CounterStore::count`]) are served from the in-memory mirror and
//!    never touch the database.
//! 3. Writes ([`CounterStore::increment`]) go through a single-writer section
//!    that commits the database row before advancing the mirror.
//! 4. At teardown, [`CounterStore::close`] checkpoints the WAL and releases the
//!    connection pool.
//!
//! Generation handlers write through a [`Recorder`] and never await the store.

pub mod counter;
pub mod recorder;

pub use counter::CounterStore;
pub use recorder::Recorder;

use std::fmt;

/// The category of generated password a counter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Random,
    Diceware,
    Pin,
}

impl Kind {
    /// Every kind, in mirror order.
    pub const ALL: [Kind; 3] = [Kind::Random, Kind::Diceware, Kind::Pin];

    /// Value of the `type` column for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Random => "Random",
            Kind::Diceware => "Diceware",
            Kind::Pin => "PIN",
        }
    }

    /// Parse a `type` column value. Unknown values yield `None`.
    pub fn from_column(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    fn index(self) -> usize {
        match self {
            Kind::Random => 0,
            Kind::Diceware => 1,
            Kind::Pin => 2,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_values_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_column(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::from_column("Passphrase"), None);
    }

    #[test]
    fn indices_are_distinct() {
        let mut seen = [false; 3];
        for kind in Kind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }
}
