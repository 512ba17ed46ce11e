//! Domain model projected from the decoded records.
//!
//! Pure functions from decoded layout structs to presentation-ready
//! objects: nothing in here touches bytes, cursors, or parser state.

use std::collections::BTreeMap;

use serde::Serialize;

use super::context::{Context, GameTypes, TypeCategory};
use super::error::{Result, SaveError};
use super::game_block::{GameBlock, TradeRecord};
use super::init_core::InitCore;
use super::map::{MapHeader, PlotRecord};
use super::NUM_YIELD_TYPES;

/// A game-type code paired with its resolved name, when the injected table
/// knows it. The sentinel `-1` and out-of-table codes keep `name: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeRef {
    pub code: i32,
    pub name: Option<String>,
}

impl TypeRef {
    pub fn resolve(types: &dyn GameTypes, category: TypeCategory, code: i32) -> Self {
        Self {
            code,
            name: types.name_of(category, code).map(str::to_owned),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

fn named_flags(
    types: &dyn GameTypes,
    category: TypeCategory,
    flags: &[bool],
) -> Vec<(String, bool)> {
    flags
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let name = types
                .name_of(category, i as i32)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("{}_{}", category, i));
            (name, v)
        })
        .collect()
}

/// Everything the host chose on the setup screen, plus the handful of
/// derived values a summary screen wants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub game_type: TypeRef,
    pub game_name: String,
    pub map_script: String,
    pub world_size: TypeRef,
    pub climate: TypeRef,
    pub sea_level: TypeRef,
    pub start_era: TypeRef,
    pub game_speed: TypeRef,
    pub game_options: Vec<(String, bool)>,
    pub max_turns: i32,
    /// Zero unless the advanced-start option is enabled.
    pub advanced_start_points: i32,
    pub victories: Vec<(String, bool)>,
    /// Active civ slots, not counting the last slot (the barbarians).
    pub num_civs: usize,
    pub start_turn: i32,
    pub start_year: i32,
    pub handicap: TypeRef,
    pub map_random_seed: u32,
    pub soren_random_seed: u32,
    pub culture_victory_cities: i32,
    pub culture_victory_level: TypeRef,
    pub grid_width: i32,
    pub grid_height: i32,
    pub wrap_x: bool,
    pub wrap_y: bool,
}

impl Settings {
    pub fn project(
        core: &InitCore,
        game: &GameBlock,
        map: &MapHeader,
        types: &dyn GameTypes,
    ) -> Self {
        let game_options = named_flags(types, TypeCategory::GameOption, &core.game_options);

        let advanced_start_points = match types
            .code_of(TypeCategory::GameOption, "GAMEOPTION_ADVANCED_START")
            .and_then(|code| core.game_options.get(code as usize).copied())
        {
            Some(true) => core.advanced_start_points,
            _ => 0,
        };

        let num_civs = match core.civs.split_last() {
            Some((_barbarian, rest)) => rest.iter().filter(|&&c| c >= 0).count(),
            None => 0,
        };

        Self {
            game_type: TypeRef::resolve(types, TypeCategory::GameType, core.game_type),
            game_name: core.game_name.clone(),
            map_script: core.map_script_name.clone(),
            world_size: TypeRef::resolve(types, TypeCategory::WorldSize, core.world_size),
            climate: TypeRef::resolve(types, TypeCategory::Climate, core.climate),
            sea_level: TypeRef::resolve(types, TypeCategory::SeaLevel, core.sea_level),
            start_era: TypeRef::resolve(types, TypeCategory::Era, core.start_era),
            game_speed: TypeRef::resolve(types, TypeCategory::GameSpeed, core.game_speed),
            game_options,
            max_turns: core.max_turns,
            advanced_start_points,
            victories: named_flags(types, TypeCategory::Victory, &core.victories),
            num_civs,
            start_turn: game.start_turn,
            start_year: game.start_year,
            handicap: TypeRef::resolve(types, TypeCategory::Handicap, game.handicap),
            map_random_seed: game.map_random_seed,
            soren_random_seed: game.soren_random_seed,
            culture_victory_cities: game.num_culture_victory_cities,
            culture_victory_level: TypeRef::resolve(
                types,
                TypeCategory::CultureLevel,
                game.culture_victory_level,
            ),
            grid_width: map.grid_width,
            grid_height: map.grid_height,
            wrap_x: map.wrap_x,
            wrap_y: map.wrap_y,
        }
    }
}

/// State a player at the keyboard is not supposed to see yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    pub total_cities: i32,
    pub total_population: i32,
    pub nukes_exploded: i32,
    pub circumnavigated: bool,
    pub nukes_buildable: bool,
    pub best_land_unit: TypeRef,
    pub winner: i32,
    pub victory: TypeRef,
    pub state: TypeRef,
    /// Positive scores only; zero slots are empty or eliminated.
    pub scores: Vec<i32>,
    pub cities_destroyed: Vec<String>,
    pub great_people_born: Vec<String>,
    pub land_plots: i32,
    pub owned_plots: i32,
}

impl GameState {
    pub fn project(game: &GameBlock, map: &MapHeader, types: &dyn GameTypes) -> Self {
        Self {
            total_cities: game.total_cities,
            total_population: game.total_population,
            nukes_exploded: game.nukes_exploded,
            circumnavigated: game.circumnavigated,
            nukes_buildable: game.nukes_valid,
            best_land_unit: TypeRef::resolve(types, TypeCategory::Unit, game.best_land_unit),
            winner: game.winner,
            victory: TypeRef::resolve(types, TypeCategory::Victory, game.victory),
            state: TypeRef::resolve(types, TypeCategory::GameState, game.game_state),
            scores: game
                .ai_player_score
                .iter()
                .copied()
                .filter(|&s| s > 0)
                .collect(),
            cities_destroyed: game.cities_destroyed.clone(),
            great_people_born: game.great_people_born.clone(),
            land_plots: map.land_plots,
            owned_plots: map.owned_plots,
        }
    }
}

/// A plot as presented to callers: the summary fields of the decoded
/// record, with the enum-tagged type codes resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plot {
    pub x: i16,
    pub y: i16,
    pub ownership_duration: i16,
    pub improvement_duration: i16,
    pub starting_plot: bool,
    pub hills: bool,
    pub can_be_worked: bool,
    pub irrigated: bool,
    pub owner: i8,
    pub plot_type: TypeRef,
    pub terrain_type: TypeRef,
    pub feature_type: TypeRef,
    pub bonus_type: TypeRef,
    pub improvement_type: TypeRef,
    pub yields: [i16; NUM_YIELD_TYPES],
}

impl Plot {
    pub fn project(record: &PlotRecord, types: &dyn GameTypes) -> Self {
        let head = &record.head;
        Self {
            x: head.x,
            y: head.y,
            ownership_duration: head.ownership_duration,
            improvement_duration: head.improvement_duration,
            starting_plot: head.starting_plot,
            hills: head.hills,
            can_be_worked: head.potential_city_work,
            irrigated: head.irrigated,
            owner: head.owner,
            plot_type: TypeRef::resolve(types, TypeCategory::Plot, head.plot_type as i32),
            terrain_type: TypeRef::resolve(types, TypeCategory::Terrain, head.terrain_type as i32),
            feature_type: TypeRef::resolve(types, TypeCategory::Feature, head.feature_type as i32),
            bonus_type: TypeRef::resolve(types, TypeCategory::Bonus, head.bonus_type as i32),
            improvement_type: TypeRef::resolve(
                types,
                TypeCategory::Improvement,
                head.improvement_type as i32,
            ),
            yields: head.yields,
        }
    }
}

/// A city as reconstructed from the replay log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct City {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub turn_founded: i32,
    pub wonders: Vec<String>,
}

impl City {
    pub fn new(name: String, x: i32, y: i32, turn_founded: i32) -> Self {
        Self {
            name,
            x,
            y,
            turn_founded,
            wonders: Vec::new(),
        }
    }
}

/// A player's five civic slots. Codes 0-4 are government civics, 5-9 legal,
/// 10-14 labor, 15-19 economy, 20 and up religion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Civics {
    pub government: TypeRef,
    pub legal: TypeRef,
    pub labor: TypeRef,
    pub economy: TypeRef,
    pub religion: TypeRef,
}

impl Civics {
    /// The starting civics every player begins with: the first member of
    /// each band.
    pub fn defaults(types: &dyn GameTypes) -> Self {
        let civic = |code| TypeRef::resolve(types, TypeCategory::Civic, code);
        Self {
            government: civic(0),
            legal: civic(5),
            labor: civic(10),
            economy: civic(15),
            religion: civic(20),
        }
    }

    pub fn adopt(&mut self, civic: TypeRef) {
        let slot = match civic.code {
            c if c < 5 => &mut self.government,
            c if c < 10 => &mut self.legal,
            c if c < 15 => &mut self.labor,
            c if c < 20 => &mut self.economy,
            _ => &mut self.religion,
        };
        *slot = civic;
    }
}

/// One line item of a trade deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    /// A TradeableItem, except for resource trades where it is the specific
    /// Bonus being traded.
    pub item: TypeRef,
    pub amount: i32,
}

impl Trade {
    /// Amount defaults to 1; the two gold-flow items carry their quantity in
    /// the record's auxiliary field, and resource trades use that field to
    /// name the bonus instead.
    pub fn project(record: &TradeRecord, types: &dyn GameTypes) -> Self {
        let item = TypeRef::resolve(types, TypeCategory::TradeableItem, record.item);
        match item.name.as_deref() {
            Some("TRADE_GOLD") | Some("TRADE_GOLD_PER_TURN") => Self {
                item,
                amount: record.extra,
            },
            Some("TRADE_RESOURCES") => Self {
                item: TypeRef::resolve(types, TypeCategory::Bonus, record.extra),
                amount: 1,
            },
            _ => Self { item, amount: 1 },
        }
    }
}

/// A diplomacy deal between two players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeDeal {
    pub first_player: i32,
    pub second_player: i32,
    pub initial_turn: i32,
    pub first_trades: Vec<Trade>,
    pub second_trades: Vec<Trade>,
}

/// Full per-player state: setup-screen identity plus everything the replay
/// reconstruction derives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub idx: i32,
    pub name: String,
    pub desc: String,
    pub short_desc: String,
    pub adjective: String,
    pub team: i32,
    pub handicap: TypeRef,
    pub leader: TypeRef,
    pub civ: TypeRef,
    pub score: i32,
    pub rank: i32,
    pub owned_plots: i32,
    pub great_people: Vec<String>,
    pub cities: Vec<City>,
    pub religion: TypeRef,
    pub civics: Civics,
    pub trades: Vec<TradeDeal>,
    pub projects: Vec<String>,
}

impl Player {
    /// Remove and return the named city.
    pub fn pop_city(&mut self, name: &str) -> Result<City> {
        match self.cities.iter().position(|c| c.name == name) {
            Some(i) => Ok(self.cities.remove(i)),
            None => Err(SaveError::CityNotOwned {
                player: self.idx,
                name: name.to_owned(),
            }),
        }
    }

    pub fn city_at_mut(&mut self, x: i32, y: i32) -> Result<&mut City> {
        let idx = self.idx;
        self.cities
            .iter_mut()
            .find(|c| (c.x, c.y) == (x, y))
            .ok_or(SaveError::NoCityAt { player: idx, x, y })
    }
}

/// Build the player roster from the setup record: one entry per slot whose
/// civilization code is not the `-1` sentinel.
pub fn initial_players(
    core: &InitCore,
    game: &GameBlock,
    ctx: &Context,
    types: &dyn GameTypes,
) -> BTreeMap<i32, Player> {
    let mut players = BTreeMap::new();
    for idx in 0..ctx.max_players {
        let civ = core.civs.get(idx).copied().unwrap_or(-1);
        if civ < 0 {
            continue;
        }
        let get = |v: &[String]| v.get(idx).cloned().unwrap_or_default();
        let geti = |v: &[i32]| v.get(idx).copied().unwrap_or(-1);
        players.insert(
            idx as i32,
            Player {
                idx: idx as i32,
                name: get(&core.leader_names),
                desc: get(&core.civ_descriptions),
                short_desc: get(&core.civ_short_descriptions),
                adjective: get(&core.civ_adjectives),
                team: geti(&core.teams),
                handicap: TypeRef::resolve(types, TypeCategory::Handicap, geti(&core.handicaps)),
                leader: TypeRef::resolve(types, TypeCategory::Leader, geti(&core.leaders)),
                civ: TypeRef::resolve(types, TypeCategory::Civilization, civ),
                score: geti(&game.ai_player_score),
                rank: geti(&game.ai_player_rank),
                owned_plots: 0,
                great_people: Vec::new(),
                cities: Vec::new(),
                religion: TypeRef::resolve(types, TypeCategory::Religion, -1),
                civics: Civics::defaults(types),
                trades: Vec::new(),
                projects: Vec::new(),
            },
        );
    }
    players
}

/// Convert each decoded deal and append it to the first participant's list.
pub fn apply_trade_deals(
    deals: &[super::game_block::DealRecord],
    players: &mut BTreeMap<i32, Player>,
    types: &dyn GameTypes,
) {
    for deal in deals {
        let trade_deal = TradeDeal {
            first_player: deal.first_player,
            second_player: deal.second_player,
            initial_turn: deal.initial_game_turn,
            first_trades: deal
                .first_trades
                .iter()
                .map(|t| Trade::project(t, types))
                .collect(),
            second_trades: deal
                .second_trades
                .iter()
                .map(|t| Trade::project(t, types))
                .collect(),
        };
        if let Some(player) = players.get_mut(&deal.first_player) {
            player.trades.push(trade_deal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civ4save::context::TypeTable;

    fn civic_table() -> TypeTable {
        let mut types = TypeTable::new();
        types.set(
            TypeCategory::Civic,
            (0..25).map(|i| match i {
                0 => "CIVIC_DESPOTISM".to_owned(),
                5 => "CIVIC_BARBARISM".to_owned(),
                10 => "CIVIC_TRIBALISM".to_owned(),
                15 => "CIVIC_DECENTRALIZATION".to_owned(),
                16 => "CIVIC_MERCANTILISM".to_owned(),
                20 => "CIVIC_PAGANISM".to_owned(),
                n => format!("CIVIC_{}", n),
            }),
        );
        types
    }

    #[test]
    fn default_civics_take_the_first_member_of_each_band() {
        let types = civic_table();
        let civics = Civics::defaults(&types);
        assert!(civics.government.is("CIVIC_DESPOTISM"));
        assert!(civics.legal.is("CIVIC_BARBARISM"));
        assert!(civics.labor.is("CIVIC_TRIBALISM"));
        assert!(civics.economy.is("CIVIC_DECENTRALIZATION"));
        assert!(civics.religion.is("CIVIC_PAGANISM"));
    }

    #[test]
    fn adopting_a_civic_replaces_only_its_band() {
        let types = civic_table();
        let mut civics = Civics::defaults(&types);
        civics.adopt(TypeRef::resolve(&types, TypeCategory::Civic, 16));
        assert!(civics.economy.is("CIVIC_MERCANTILISM"));
        assert!(civics.government.is("CIVIC_DESPOTISM"));
        assert!(civics.religion.is("CIVIC_PAGANISM"));
    }

    #[test]
    fn gold_trades_carry_their_amount() {
        let mut types = TypeTable::new();
        types.set(
            TypeCategory::TradeableItem,
            [
                "TRADE_GOLD",
                "TRADE_GOLD_PER_TURN",
                "TRADE_MAPS",
                "TRADE_RESOURCES",
            ],
        );
        types.set(TypeCategory::Bonus, ["BONUS_COW", "BONUS_WHEAT"]);

        let gold = Trade::project(
            &TradeRecord {
                item: 0,
                extra: 240,
                offering: false,
                hidden: false,
            },
            &types,
        );
        assert!(gold.item.is("TRADE_GOLD"));
        assert_eq!(gold.amount, 240);

        let maps = Trade::project(
            &TradeRecord {
                item: 2,
                extra: 0,
                offering: false,
                hidden: false,
            },
            &types,
        );
        assert!(maps.item.is("TRADE_MAPS"));
        assert_eq!(maps.amount, 1);

        let resource = Trade::project(
            &TradeRecord {
                item: 3,
                extra: 1,
                offering: false,
                hidden: false,
            },
            &types,
        );
        assert!(resource.item.is("BONUS_WHEAT"));
        assert_eq!(resource.amount, 1);
    }

    #[test]
    fn plot_projection_resolves_type_codes() {
        use crate::civ4save::map::PlotHead;

        let record = PlotRecord {
            head: PlotHead {
                ui_flag: 1,
                x: 3,
                y: 4,
                area_id: 0,
                feature_variety: 0,
                ownership_duration: 12,
                improvement_duration: 5,
                upgrade_progress: 0,
                force_unowned_timer: 0,
                city_radius_count: 1,
                river_id: -1,
                min_original_start_distance: 0,
                recon_count: 0,
                river_crossing_count: 0,
                starting_plot: true,
                hills: true,
                north_of_river: false,
                west_of_river: false,
                irrigated: false,
                potential_city_work: true,
                owner: 2,
                plot_type: 1,
                terrain_type: 0,
                feature_type: -1,
                bonus_type: -1,
                improvement_type: 0,
                route_type: -1,
                river_north_south: -1,
                river_east_west: -1,
                plot_city_owner: -1,
                plot_city_id: -1,
                working_city_owner: -1,
                working_city_id: -1,
                working_city_override_owner: -1,
                working_city_override_id: -1,
                yields: [2, 1, 0],
            },
            culture: Vec::new(),
            found_value: Vec::new(),
            player_city_radius: Vec::new(),
            plot_group: Vec::new(),
            visibility: Vec::new(),
            stolen_visibility: Vec::new(),
            blockaded: Vec::new(),
            revealed_owner: Vec::new(),
            river_crossings: Vec::new(),
            revealed: Vec::new(),
            revealed_improvement_type: Vec::new(),
            revealed_route_type: Vec::new(),
            script_data: String::new(),
            build_progress: Vec::new(),
            culture_range_cities: Vec::new(),
            invisible_visibility: Vec::new(),
            units: Vec::new(),
        };

        let mut types = TypeTable::new();
        types.set(
            TypeCategory::Plot,
            ["PLOT_PEAK", "PLOT_HILLS", "PLOT_LAND", "PLOT_OCEAN"],
        );
        types.set(TypeCategory::Terrain, ["TERRAIN_GRASS"]);
        types.set(TypeCategory::Improvement, ["IMPROVEMENT_FARM"]);

        let plot = Plot::project(&record, &types);
        assert_eq!((plot.x, plot.y), (3, 4));
        assert!(plot.plot_type.is("PLOT_HILLS"));
        assert!(plot.terrain_type.is("TERRAIN_GRASS"));
        assert!(plot.improvement_type.is("IMPROVEMENT_FARM"));
        // Sentinel codes stay unresolved.
        assert_eq!(plot.feature_type.code, -1);
        assert!(plot.feature_type.name.is_none());
        assert!(plot.starting_plot);
        assert!(plot.can_be_worked);
        assert_eq!(plot.owner, 2);
        assert_eq!(plot.ownership_duration, 12);
        assert_eq!(plot.yields, [2, 1, 0]);
    }

    #[test]
    fn pop_city_errors_when_missing() {
        let types = TypeTable::new();
        let mut player = Player {
            idx: 0,
            name: String::new(),
            desc: String::new(),
            short_desc: String::new(),
            adjective: String::new(),
            team: 0,
            handicap: TypeRef::resolve(&types, TypeCategory::Handicap, -1),
            leader: TypeRef::resolve(&types, TypeCategory::Leader, -1),
            civ: TypeRef::resolve(&types, TypeCategory::Civilization, -1),
            score: 0,
            rank: 0,
            owned_plots: 0,
            great_people: Vec::new(),
            cities: vec![City::new("Rome".into(), 3, 4, 10)],
            religion: TypeRef::resolve(&types, TypeCategory::Religion, -1),
            civics: Civics::defaults(&types),
            trades: Vec::new(),
            projects: Vec::new(),
        };

        let rome = player.pop_city("Rome").unwrap();
        assert_eq!(rome.turn_founded, 10);
        assert!(matches!(
            player.pop_city("Rome"),
            Err(SaveError::CityNotOwned { player: 0, .. })
        ));
    }
}
