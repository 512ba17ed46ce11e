//! Decoder for the game record (`CvGameAI` + `CvGame`), the first group
//! inside the compressed region.
//!
//! This is where the replay message log lives, along with global counters,
//! diplomacy deals, and the UN/AP voting state. Container lengths come from
//! three places: explicit `i32` prefixes, `max_players` from the context,
//! and game-type member counts from the injected [`GameTypes`] table.

use log::debug;

use super::context::{Context, GameTypes, TypeCategory};
use super::cursor::SaveCursor;
use super::error::Result;
use super::NUM_YIELD_TYPES;

/// One side's entry in a diplomacy deal. 12 bytes on the wire: two words,
/// then two flags each followed by a padding byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeRecord {
    /// TradeableItem code.
    pub item: i32,
    /// Item-dependent payload: gold amount, a Bonus code for resource
    /// trades, a city id for city trades.
    pub extra: i32,
    pub offering: bool,
    pub hidden: bool,
}

fn read_trade(cur: &mut SaveCursor<'_>) -> Result<TradeRecord> {
    let item = cur.read_i32("trade_item")?;
    let extra = cur.read_i32("trade_extra")?;
    let offering = cur.read_flag("trade_offering")?;
    cur.read_u8("trade_pad")?;
    let hidden = cur.read_flag("trade_hidden")?;
    cur.read_u8("trade_pad")?;
    Ok(TradeRecord {
        item,
        extra,
        offering,
        hidden,
    })
}

/// A diplomacy deal between two player slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealRecord {
    pub ui_flag: u32,
    pub id: i32,
    pub initial_game_turn: i32,
    pub first_player: i32,
    pub second_player: i32,
    pub first_trades: Vec<TradeRecord>,
    pub second_trades: Vec<TradeRecord>,
}

fn read_deal(cur: &mut SaveCursor<'_>) -> Result<DealRecord> {
    let ui_flag = cur.read_u32("deal_ui_flag")?;
    let id = cur.read_i32("deal_id")?;
    let initial_game_turn = cur.read_i32("deal_initial_game_turn")?;
    let first_player = cur.read_i32("deal_first_player")?;
    let second_player = cur.read_i32("deal_second_player")?;
    let n_first = cur.read_len_i32("sz_first_trades")?;
    let first_trades = (0..n_first).map(|_| read_trade(cur)).collect::<Result<_>>()?;
    let n_second = cur.read_len_i32("sz_second_trades")?;
    let second_trades = (0..n_second).map(|_| read_trade(cur)).collect::<Result<_>>()?;
    Ok(DealRecord {
        ui_flag,
        id,
        initial_game_turn,
        first_player,
        second_player,
        first_trades,
        second_trades,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOptionRecord {
    pub kind: i32,
    pub player: i32,
    pub city_id: i32,
    pub other_player: i32,
    pub text: String,
}

fn read_vote_option(cur: &mut SaveCursor<'_>) -> Result<VoteOptionRecord> {
    Ok(VoteOptionRecord {
        kind: cur.read_i32("vote_option_type")?,
        player: cur.read_i32("vote_option_player")?,
        city_id: cur.read_i32("vote_option_city_id")?,
        other_player: cur.read_i32("vote_option_other_player")?,
        text: cur.read_wide_string("vote_option_text")?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSelectionRecord {
    pub vote_id: i32,
    pub vote_source: i32,
    pub options: Vec<VoteOptionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTriggeredRecord {
    pub vote_id: i32,
    pub vote_source: i32,
    pub option: VoteOptionRecord,
}

/// Allocator bookkeeping the engine writes in front of each
/// `FFreeListTrashArray`. Decoded and kept only so the cursor stays aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeListHeader {
    pub num_slots: i32,
    pub last_index: i32,
    pub free_list_head: i32,
    pub free_list_count: i32,
    pub current_id: i32,
    pub next_free_index: Vec<i32>,
}

/// Read a free-list header. `slots_override` substitutes a different length
/// for the index array; the engine sizes the votes-triggered index array by
/// the vote-selections slot count, so that caller passes the earlier value.
fn read_free_list_header(
    cur: &mut SaveCursor<'_>,
    field: &'static str,
    slots_override: Option<usize>,
) -> Result<FreeListHeader> {
    let offset = cur.position();
    let num_slots = cur.read_i32(field)?;
    let last_index = cur.read_i32(field)?;
    let free_list_head = cur.read_i32(field)?;
    let free_list_count = cur.read_i32(field)?;
    let current_id = cur.read_i32(field)?;
    let count = match slots_override {
        Some(n) => n,
        None if num_slots < 0 => {
            return Err(super::error::SaveError::InvalidLength {
                field,
                len: num_slots as i64,
                offset,
            })
        }
        None => num_slots as usize,
    };
    let next_free_index = cur.read_i32_array(count, field)?;
    Ok(FreeListHeader {
        num_slots,
        last_index,
        free_list_head,
        free_list_count,
        current_id,
        next_free_index,
    })
}

/// Discriminant of a replay log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    /// Free-text event: founding, capture, razing, wonder, religion, war...
    MajorEvent,
    CityFounded,
    PlotOwnerChange,
    Other(i32),
}

impl ReplayKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ReplayKind::MajorEvent,
            1 => ReplayKind::CityFounded,
            2 => ReplayKind::PlotOwnerChange,
            other => ReplayKind::Other(other),
        }
    }
}

/// One entry of the replay message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMessage {
    pub turn: i32,
    pub kind: ReplayKind,
    pub plot_x: i32,
    pub plot_y: i32,
    pub player: i32,
    pub text: String,
    pub color: i32,
}

fn read_replay_message(cur: &mut SaveCursor<'_>) -> Result<ReplayMessage> {
    Ok(ReplayMessage {
        turn: cur.read_i32("replay_turn")?,
        kind: ReplayKind::from_code(cur.read_i32("replay_type")?),
        plot_x: cur.read_i32("replay_plot_x")?,
        plot_y: cur.read_i32("replay_plot_y")?,
        player: cur.read_i32("replay_player")?,
        text: cur.read_wide_string("replay_text")?,
        color: cur.read_i32("replay_color")?,
    })
}

/// Owner/city-id pair used for holy cities and corporation headquarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolyCity {
    pub owner: i32,
    pub city_id: i32,
}

/// Scripted per-plot yield or cost override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotExtra {
    pub x: i32,
    pub y: i32,
    pub values: [i32; NUM_YIELD_TYPES],
}

fn read_plot_extras(cur: &mut SaveCursor<'_>, field: &'static str) -> Result<Vec<PlotExtra>> {
    let count = cur.read_len_i32(field)?;
    (0..count)
        .map(|_| {
            let x = cur.read_i32(field)?;
            let y = cur.read_i32(field)?;
            let mut values = [0i32; NUM_YIELD_TYPES];
            for v in &mut values {
                *v = cur.read_i32(field)?;
            }
            Ok(PlotExtra { x, y, values })
        })
        .collect()
}

fn read_wide_string_list(cur: &mut SaveCursor<'_>, field: &'static str) -> Result<Vec<String>> {
    let count = cur.read_len_i32(field)?;
    (0..count).map(|_| cur.read_wide_string(field)).collect()
}

/// The decoded game record.
#[derive(Debug, Clone, PartialEq)]
pub struct GameBlock {
    pub game_ai_ui_flag: u32,
    pub game_ai_pad: i32,
    pub game_ui_flag: u32,
    pub elapsed_game_turns: i32,
    pub start_turn: i32,
    pub start_year: i32,
    pub estimated_end_turn: i32,
    pub turn_slice: i32,
    pub cutoff_slice: i32,
    pub num_game_turn_active: i32,
    pub total_cities: i32,
    pub total_population: i32,
    pub trade_routes: i32,
    pub free_trade_count: i32,
    pub no_nukes_count: i32,
    pub nukes_exploded: i32,
    pub max_population: i32,
    pub max_land: i32,
    pub max_tech: i32,
    pub max_wonders: i32,
    pub init_population: i32,
    pub init_land: i32,
    pub init_tech: i32,
    pub init_wonders: i32,
    pub ai_autoplay: i32,
    pub score_dirty: bool,
    pub circumnavigated: bool,
    pub final_initialized: bool,
    pub hot_pbem_between_turns: bool,
    pub nukes_valid: bool,
    pub handicap: i32,
    pub pause_player: i32,
    pub best_land_unit: i32,
    pub winner: i32,
    pub victory: i32,
    pub game_state: i32,
    pub script_data: String,
    pub ai_rank_player: Vec<i32>,
    pub ai_player_rank: Vec<i32>,
    pub ai_player_score: Vec<i32>,
    pub ai_rank_team: Vec<i32>,
    pub ai_team_rank: Vec<i32>,
    pub ai_team_score: Vec<i32>,
    pub unit_created_counts: Vec<i32>,
    pub unit_class_created_counts: Vec<i32>,
    pub building_class_created_counts: Vec<i32>,
    pub project_created_counts: Vec<i32>,
    pub force_civic_counts: Vec<i32>,
    pub vote_outcomes: Vec<i32>,
    pub religion_game_turn_founded: Vec<i32>,
    pub corporation_game_turn_founded: Vec<i32>,
    pub secretary_general_timer: Vec<i32>,
    pub vote_timer: Vec<i32>,
    pub diplo_vote: Vec<i32>,
    pub special_unit_valid: Vec<bool>,
    pub special_building_valid: Vec<bool>,
    pub religion_slot_taken: Vec<bool>,
    pub holy_cities: Vec<HolyCity>,
    pub corporation_headquarters: Vec<HolyCity>,
    pub cities_destroyed: Vec<String>,
    pub great_people_born: Vec<String>,
    pub deals_header: FreeListHeader,
    pub deals: Vec<DealRecord>,
    pub vote_selections_header: FreeListHeader,
    pub vote_selections: Vec<VoteSelectionRecord>,
    pub votes_triggered_header: FreeListHeader,
    pub votes_triggered: Vec<VoteTriggeredRecord>,
    pub map_random_seed: u32,
    pub soren_random_seed: u32,
    pub replay_messages: Vec<ReplayMessage>,
    pub num_sessions: i32,
    pub plot_extra_yields: Vec<PlotExtra>,
    pub plot_extra_costs: Vec<PlotExtra>,
    pub vote_source_religions: Vec<(i32, i32)>,
    pub inactive_triggers: Vec<i32>,
    pub shrine_building_count: i32,
    pub shrine_buildings: Vec<i32>,
    pub shrine_religion: Vec<i32>,
    pub num_culture_victory_cities: i32,
    pub culture_victory_level: i32,
}

pub fn read_game_block(
    cur: &mut SaveCursor<'_>,
    ctx: &Context,
    types: &dyn GameTypes,
) -> Result<GameBlock> {
    let mp = ctx.max_players;
    let n = |c: TypeCategory| types.member_count(c);

    let game_ai_ui_flag = cur.read_u32("game_ai_ui_flag")?;
    let game_ai_pad = cur.read_i32("game_ai_pad")?;
    let game_ui_flag = cur.read_u32("game_ui_flag")?;
    let elapsed_game_turns = cur.read_i32("elapsed_game_turns")?;
    let start_turn = cur.read_i32("start_turn")?;
    let start_year = cur.read_i32("start_year")?;
    let estimated_end_turn = cur.read_i32("estimated_end_turn")?;
    let turn_slice = cur.read_i32("turn_slice")?;
    let cutoff_slice = cur.read_i32("cutoff_slice")?;
    let num_game_turn_active = cur.read_i32("num_game_turn_active")?;
    let total_cities = cur.read_i32("total_cities")?;
    let total_population = cur.read_i32("total_population")?;
    let trade_routes = cur.read_i32("trade_routes")?;
    let free_trade_count = cur.read_i32("free_trade_count")?;
    let no_nukes_count = cur.read_i32("no_nukes_count")?;
    let nukes_exploded = cur.read_i32("nukes_exploded")?;
    let max_population = cur.read_i32("max_population")?;
    let max_land = cur.read_i32("max_land")?;
    let max_tech = cur.read_i32("max_tech")?;
    let max_wonders = cur.read_i32("max_wonders")?;
    let init_population = cur.read_i32("init_population")?;
    let init_land = cur.read_i32("init_land")?;
    let init_tech = cur.read_i32("init_tech")?;
    let init_wonders = cur.read_i32("init_wonders")?;
    let ai_autoplay = cur.read_i32("ai_autoplay")?;
    let score_dirty = cur.read_flag("score_dirty")?;
    let circumnavigated = cur.read_flag("circumnavigated")?;
    let final_initialized = cur.read_flag("final_initialized")?;
    let hot_pbem_between_turns = cur.read_flag("hot_pbem_between_turns")?;
    let nukes_valid = cur.read_flag("nukes_valid")?;
    let handicap = cur.read_i32("handicap")?;
    let pause_player = cur.read_i32("pause_player")?;
    let best_land_unit = cur.read_i32("best_land_unit")?;
    let winner = cur.read_i32("winner")?;
    let victory = cur.read_i32("victory")?;
    let game_state = cur.read_i32("game_state")?;
    let script_data = cur.read_narrow_string("game_script_data")?;

    let ai_rank_player = cur.read_i32_array(mp, "ai_rank_player")?;
    let ai_player_rank = cur.read_i32_array(mp, "ai_player_rank")?;
    let ai_player_score = cur.read_i32_array(mp, "ai_player_score")?;
    let ai_rank_team = cur.read_i32_array(mp, "ai_rank_team")?;
    let ai_team_rank = cur.read_i32_array(mp, "ai_team_rank")?;
    let ai_team_score = cur.read_i32_array(mp, "ai_team_score")?;

    let unit_created_counts = cur.read_i32_array(n(TypeCategory::Unit), "unit_created_counts")?;
    let unit_class_created_counts =
        cur.read_i32_array(n(TypeCategory::UnitClass), "unit_class_created_counts")?;
    let building_class_created_counts = cur.read_i32_array(
        n(TypeCategory::BuildingClass),
        "building_class_created_counts",
    )?;
    let project_created_counts =
        cur.read_i32_array(n(TypeCategory::Project), "project_created_counts")?;
    let force_civic_counts = cur.read_i32_array(n(TypeCategory::Civic), "force_civic_counts")?;
    let vote_outcomes = cur.read_i32_array(n(TypeCategory::Vote), "vote_outcomes")?;
    let religion_game_turn_founded =
        cur.read_i32_array(n(TypeCategory::Religion), "religion_game_turn_founded")?;
    let corporation_game_turn_founded = cur.read_i32_array(
        n(TypeCategory::Corporation),
        "corporation_game_turn_founded",
    )?;
    let secretary_general_timer =
        cur.read_i32_array(n(TypeCategory::VoteSource), "secretary_general_timer")?;
    let vote_timer = cur.read_i32_array(n(TypeCategory::VoteSource), "vote_timer")?;
    let diplo_vote = cur.read_i32_array(n(TypeCategory::VoteSource), "diplo_vote")?;
    let special_unit_valid =
        cur.read_flag_array(n(TypeCategory::SpecialUnit), "special_unit_valid")?;
    let special_building_valid =
        cur.read_flag_array(n(TypeCategory::SpecialBuilding), "special_building_valid")?;
    let religion_slot_taken =
        cur.read_flag_array(n(TypeCategory::Religion), "religion_slot_taken")?;

    let read_city_refs = |cur: &mut SaveCursor<'_>, count: usize, field: &'static str| {
        (0..count)
            .map(|_| {
                Ok(HolyCity {
                    owner: cur.read_i32(field)?,
                    city_id: cur.read_i32(field)?,
                })
            })
            .collect::<Result<Vec<_>>>()
    };
    let holy_cities = read_city_refs(cur, n(TypeCategory::Religion), "holy_cities")?;
    let corporation_headquarters =
        read_city_refs(cur, n(TypeCategory::Corporation), "corporation_headquarters")?;

    let cities_destroyed = read_wide_string_list(cur, "cities_destroyed")?;
    let great_people_born = read_wide_string_list(cur, "great_people_born")?;

    let deals_header = read_free_list_header(cur, "deals_free_list", None)?;
    let n_deals = cur.read_len_i32("sz_deals")?;
    let deals = (0..n_deals).map(|_| read_deal(cur)).collect::<Result<Vec<_>>>()?;

    let vote_selections_header = read_free_list_header(cur, "vote_selections_free_list", None)?;
    let n_selections = cur.read_len_i32("sz_vote_selections")?;
    let vote_selections = (0..n_selections)
        .map(|_| {
            let vote_id = cur.read_i32("vote_selection_id")?;
            let vote_source = cur.read_i32("vote_selection_source")?;
            let n_options = cur.read_len_i32("sz_vote_options")?;
            let options = (0..n_options)
                .map(|_| read_vote_option(cur))
                .collect::<Result<_>>()?;
            Ok(VoteSelectionRecord {
                vote_id,
                vote_source,
                options,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // The engine sizes this index array by the vote-selections slot count.
    let votes_triggered_header = read_free_list_header(
        cur,
        "votes_triggered_free_list",
        Some(vote_selections_header.num_slots.max(0) as usize),
    )?;
    let n_triggered = cur.read_len_i32("sz_votes_triggered")?;
    let votes_triggered = (0..n_triggered)
        .map(|_| {
            Ok(VoteTriggeredRecord {
                vote_id: cur.read_i32("vote_triggered_id")?,
                vote_source: cur.read_i32("vote_triggered_source")?,
                option: read_vote_option(cur)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let map_random_seed = cur.read_u32("map_random_seed")?;
    let soren_random_seed = cur.read_u32("soren_random_seed")?;

    let n_messages = cur.read_len_i32("sz_replay_messages")?;
    let replay_messages = (0..n_messages)
        .map(|_| read_replay_message(cur))
        .collect::<Result<Vec<_>>>()?;
    debug!("game block: {} replay messages", replay_messages.len());

    let num_sessions = cur.read_i32("num_sessions")?;
    let plot_extra_yields = read_plot_extras(cur, "plot_extra_yields")?;
    let plot_extra_costs = read_plot_extras(cur, "plot_extra_costs")?;

    let n_vsr = cur.read_len_i32("sz_vote_source_religions")?;
    let vote_source_religions = (0..n_vsr)
        .map(|_| {
            Ok((
                cur.read_i32("vote_source_religion_source")?,
                cur.read_i32("vote_source_religion_religion")?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let n_inactive = cur.read_len_i32("sz_inactive_triggers")?;
    let inactive_triggers = cur.read_i32_array(n_inactive, "inactive_triggers")?;

    let shrine_building_count = cur.read_i32("shrine_building_count")?;
    let shrine_buildings = cur.read_i32_array(n(TypeCategory::Building), "shrine_buildings")?;
    let shrine_religion = cur.read_i32_array(n(TypeCategory::Building), "shrine_religion")?;

    let num_culture_victory_cities = cur.read_i32("num_culture_victory_cities")?;
    let culture_victory_level = cur.read_i32("culture_victory_level")?;

    Ok(GameBlock {
        game_ai_ui_flag,
        game_ai_pad,
        game_ui_flag,
        elapsed_game_turns,
        start_turn,
        start_year,
        estimated_end_turn,
        turn_slice,
        cutoff_slice,
        num_game_turn_active,
        total_cities,
        total_population,
        trade_routes,
        free_trade_count,
        no_nukes_count,
        nukes_exploded,
        max_population,
        max_land,
        max_tech,
        max_wonders,
        init_population,
        init_land,
        init_tech,
        init_wonders,
        ai_autoplay,
        score_dirty,
        circumnavigated,
        final_initialized,
        hot_pbem_between_turns,
        nukes_valid,
        handicap,
        pause_player,
        best_land_unit,
        winner,
        victory,
        game_state,
        script_data,
        ai_rank_player,
        ai_player_rank,
        ai_player_score,
        ai_rank_team,
        ai_team_rank,
        ai_team_score,
        unit_created_counts,
        unit_class_created_counts,
        building_class_created_counts,
        project_created_counts,
        force_civic_counts,
        vote_outcomes,
        religion_game_turn_founded,
        corporation_game_turn_founded,
        secretary_general_timer,
        vote_timer,
        diplo_vote,
        special_unit_valid,
        special_building_valid,
        religion_slot_taken,
        holy_cities,
        corporation_headquarters,
        cities_destroyed,
        great_people_born,
        deals_header,
        deals,
        vote_selections_header,
        vote_selections,
        votes_triggered_header,
        votes_triggered,
        map_random_seed,
        soren_random_seed,
        replay_messages,
        num_sessions,
        plot_extra_yields,
        plot_extra_costs,
        vote_source_religions,
        inactive_triggers,
        shrine_building_count,
        shrine_buildings,
        shrine_religion,
        num_culture_victory_cities,
        culture_victory_level,
    })
}
