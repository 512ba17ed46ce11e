//! Custom error types for the civ4save-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum SaveError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file could not be recognized as a .CivBeyondSwordSave file.
    #[error("Not a .CivBeyondSwordSave file: {0}")]
    NotASaveFile(&'static str),

    /// The save was written by a build this crate does not understand.
    /// Every offset past the version field depends on this one value.
    #[error("Unsupported save version: {0}. Only version 302 (BTS 3.19) is supported.")]
    UnsupportedVersion(i32),

    /// A fixed-width or length-prefixed field ran past the end of the buffer.
    #[error("Truncated data reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    /// A length prefix held a value that cannot describe a real array.
    #[error("Invalid length {len} for {field} at offset {offset}")]
    InvalidLength {
        field: &'static str,
        len: i64,
        offset: usize,
    },

    /// A supplied type table could not be understood.
    #[error("Invalid type table: {0}")]
    TypeTable(String),

    /// The parser was driven into a state it cannot service.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The replay log named a city that is not in the expected owner state.
    #[error("Replay references unknown city {0:?}")]
    UnknownCity(String),

    /// A city was expected in a specific player's list but was not there.
    #[error("Player {player} has no city named {name:?}")]
    CityNotOwned { player: i32, name: String },

    /// A wonder-completion message pointed at coordinates with no city.
    #[error("Player {player} has no city at ({x}, {y})")]
    NoCityAt { player: i32, x: i32, y: i32 },

    /// The revolt heuristic could not map an empire adjective to a player.
    #[error("Could not match empire {0:?} to a player")]
    UnknownEmpire(String),

    /// The replay log referenced a player slot with no active civilization.
    #[error("Replay references inactive player slot {0}")]
    MissingPlayer(i32),

    /// Display text decoded to a type name the ruleset does not define.
    #[error("Unknown {category} member {name:?}")]
    UnknownTypeName {
        category: &'static str,
        name: String,
    },
}

/// A convenience `Result` type alias using the crate's `SaveError` type.
pub type Result<T> = std::result::Result<T, SaveError>;
