//! Decode context and the game-type lookup service.
//!
//! Most arrays in a save are sized either by `max_players`/`max_teams`
//! (the engine is compiled with a fixed slot count, 19 in the stock DLL)
//! or by the number of members of some game-type category (units, civics,
//! religions, ...). Those member tables are generated from the game's XML
//! and differ between rulesets, so the decoder never hard-codes a count:
//! it asks a [`GameTypes`] implementation supplied at construction.
//! Swapping rulesets means swapping the injected table, nothing else.

use std::collections::HashMap;
use std::fmt;

use super::error::{Result, SaveError};

/// Per-decode parameters. Immutable for the duration of one decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub max_players: usize,
    pub max_teams: usize,
}

impl Context {
    /// Context with `max_teams` equal to `max_players`.
    pub fn new(max_players: usize) -> Self {
        Self {
            max_players,
            max_teams: max_players,
        }
    }

    pub fn with_teams(max_players: usize, max_teams: usize) -> Self {
        Self {
            max_players,
            max_teams,
        }
    }
}

impl Default for Context {
    /// The stock Beyond the Sword DLL is compiled with MAX_PLAYERS = 19.
    fn default() -> Self {
        Self::new(19)
    }
}

/// Every game-type category the layout or the domain projection touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    GameType,
    GameSpeed,
    WorldSize,
    Climate,
    SeaLevel,
    Era,
    GameOption,
    MultiplayerOption,
    Victory,
    Handicap,
    Civilization,
    Leader,
    Unit,
    UnitClass,
    SpecialUnit,
    Building,
    BuildingClass,
    SpecialBuilding,
    Project,
    Civic,
    Religion,
    Corporation,
    Vote,
    VoteSource,
    Bonus,
    Improvement,
    Terrain,
    Feature,
    Plot,
    CultureLevel,
    GameState,
    TradeableItem,
}

impl TypeCategory {
    pub const ALL: &'static [TypeCategory] = &[
        TypeCategory::GameType,
        TypeCategory::GameSpeed,
        TypeCategory::WorldSize,
        TypeCategory::Climate,
        TypeCategory::SeaLevel,
        TypeCategory::Era,
        TypeCategory::GameOption,
        TypeCategory::MultiplayerOption,
        TypeCategory::Victory,
        TypeCategory::Handicap,
        TypeCategory::Civilization,
        TypeCategory::Leader,
        TypeCategory::Unit,
        TypeCategory::UnitClass,
        TypeCategory::SpecialUnit,
        TypeCategory::Building,
        TypeCategory::BuildingClass,
        TypeCategory::SpecialBuilding,
        TypeCategory::Project,
        TypeCategory::Civic,
        TypeCategory::Religion,
        TypeCategory::Corporation,
        TypeCategory::Vote,
        TypeCategory::VoteSource,
        TypeCategory::Bonus,
        TypeCategory::Improvement,
        TypeCategory::Terrain,
        TypeCategory::Feature,
        TypeCategory::Plot,
        TypeCategory::CultureLevel,
        TypeCategory::GameState,
        TypeCategory::TradeableItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::GameType => "GameType",
            TypeCategory::GameSpeed => "GameSpeed",
            TypeCategory::WorldSize => "WorldSize",
            TypeCategory::Climate => "Climate",
            TypeCategory::SeaLevel => "SeaLevel",
            TypeCategory::Era => "Era",
            TypeCategory::GameOption => "GameOption",
            TypeCategory::MultiplayerOption => "MultiplayerOption",
            TypeCategory::Victory => "Victory",
            TypeCategory::Handicap => "Handicap",
            TypeCategory::Civilization => "Civilization",
            TypeCategory::Leader => "Leader",
            TypeCategory::Unit => "Unit",
            TypeCategory::UnitClass => "UnitClass",
            TypeCategory::SpecialUnit => "SpecialUnit",
            TypeCategory::Building => "Building",
            TypeCategory::BuildingClass => "BuildingClass",
            TypeCategory::SpecialBuilding => "SpecialBuilding",
            TypeCategory::Project => "Project",
            TypeCategory::Civic => "Civic",
            TypeCategory::Religion => "Religion",
            TypeCategory::Corporation => "Corporation",
            TypeCategory::Vote => "Vote",
            TypeCategory::VoteSource => "VoteSource",
            TypeCategory::Bonus => "Bonus",
            TypeCategory::Improvement => "Improvement",
            TypeCategory::Terrain => "Terrain",
            TypeCategory::Feature => "Feature",
            TypeCategory::Plot => "Plot",
            TypeCategory::CultureLevel => "CultureLevel",
            TypeCategory::GameState => "GameState",
            TypeCategory::TradeableItem => "TradeableItem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup service for game-type members.
///
/// Members are the non-negative entries of a category, ordered by their
/// stable code starting at zero. The `NO_X = -1` sentinel is never listed
/// and never counted.
pub trait GameTypes {
    /// Ordered member names of a category. Index equals the member's code.
    fn members(&self, category: TypeCategory) -> &[String];

    /// Count of non-sentinel members, used to size context-dependent arrays.
    fn member_count(&self, category: TypeCategory) -> usize {
        self.members(category).len()
    }

    fn name_of(&self, category: TypeCategory, code: i32) -> Option<&str> {
        if code < 0 {
            return None;
        }
        self.members(category).get(code as usize).map(String::as_str)
    }

    fn code_of(&self, category: TypeCategory, name: &str) -> Option<i32> {
        self.members(category)
            .iter()
            .position(|m| m == name)
            .map(|i| i as i32)
    }
}

/// A [`GameTypes`] implementation backed by plain member lists.
///
/// Tables are supplied by the caller, either built in code or loaded from a
/// JSON document of the shape `{"Civic": ["CIVIC_DESPOTISM", ...], ...}`.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    members: HashMap<TypeCategory, Vec<String>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the member list of one category.
    pub fn set<I, S>(&mut self, category: TypeCategory, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members
            .insert(category, members.into_iter().map(Into::into).collect());
        self
    }

    /// Load a table from a JSON object mapping category names to member
    /// lists. Unknown category names are rejected so that typos do not
    /// silently produce zero-length arrays during decoding.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| SaveError::TypeTable(e.to_string()))?;
        let mut table = Self::new();
        for (name, members) in raw {
            let category = TypeCategory::from_name(&name)
                .ok_or_else(|| SaveError::TypeTable(format!("unknown category {:?}", name)))?;
            table.set(category, members);
        }
        Ok(table)
    }
}

impl GameTypes for TypeTable {
    fn members(&self, category: TypeCategory) -> &[String] {
        self.members.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_based_member_indices() {
        let mut table = TypeTable::new();
        table.set(
            TypeCategory::Religion,
            ["RELIGION_JUDAISM", "RELIGION_BUDDHISM"],
        );
        assert_eq!(table.member_count(TypeCategory::Religion), 2);
        assert_eq!(
            table.name_of(TypeCategory::Religion, 1),
            Some("RELIGION_BUDDHISM")
        );
        assert_eq!(table.code_of(TypeCategory::Religion, "RELIGION_JUDAISM"), Some(0));
        // Sentinel never resolves.
        assert_eq!(table.name_of(TypeCategory::Religion, -1), None);
        // Unlisted categories size their arrays to zero.
        assert_eq!(table.member_count(TypeCategory::Bonus), 0);
    }

    #[test]
    fn json_tables_reject_unknown_categories() {
        let table = TypeTable::from_json(r#"{"Civic": ["CIVIC_DESPOTISM"]}"#).unwrap();
        assert_eq!(table.member_count(TypeCategory::Civic), 1);

        assert!(matches!(
            TypeTable::from_json(r#"{"Civics": []}"#),
            Err(SaveError::TypeTable(_))
        ));
    }

    #[test]
    fn teams_default_to_players() {
        assert_eq!(Context::new(19).max_teams, 19);
        assert_eq!(Context::with_teams(19, 7).max_teams, 7);
        assert_eq!(Context::default().max_players, 19);
    }
}
