//! # civ4save-reader
//!
//! A reader for Civilization IV: Beyond the Sword save files
//! (.CivBeyondSwordSave), format version 302 (BTS 3.19).
//!
//! **Note:** Saves are read-only; writing save files is not supported.
pub mod civ4save;

// Re-export the main types for convenience
pub use civ4save::{
    Context, FileLayout, GameState, GameTypes, ParseState, Player, Plot, PlotDiagnostics,
    PlotRecord, Result, SaveError, SaveFile, Settings, TypeCategory, TypeTable,
};
