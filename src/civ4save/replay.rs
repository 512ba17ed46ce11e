//! Reconstruction of per-player state from the replay message log.
//!
//! The save stores cities, plot ownership, religion, and civics inside
//! opaque engine objects this crate does not decode. The replay log records
//! every founding, capture, razing, conversion, and border change as it
//! happened, so replaying it in order against the initial player roster
//! rebuilds that state. Unknown event text is skipped; a lookup miss on a
//! known event means the log and the roster disagree and is fatal.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;

use super::context::{GameTypes, TypeCategory};
use super::error::{Result, SaveError};
use super::game_block::{ReplayKind, ReplayMessage};
use super::objects::{City, Player, TypeRef};

static COLOR_MARKUP: OnceLock<Regex> = OnceLock::new();

/// Returns the cached pattern matching everything up to the end of a
/// `<color=r,g,b,a>` wrapper.
fn color_markup() -> &'static Regex {
    COLOR_MARKUP.get_or_init(|| {
        Regex::new(r".*color=[0-9]+,[0-9]+,[0-9]+,[0-9]+>").expect("Invalid color markup pattern")
    })
}

/// Reduce decorated display text to a canonical type-name fragment:
/// strip the color wrapper, drop the closing tag, underscore the spaces,
/// uppercase the rest. "…<color=180,0,30,255>Hinduism</color>!" becomes
/// "HINDUISM".
fn canonical_fragment(text: &str) -> String {
    let stripped = color_markup().replace(text, "");
    stripped.replace("</color>!", "").replace(' ', "_").to_uppercase()
}

/// A classified MAJOR_EVENT log entry. Patterns are checked in a fixed
/// priority order; text matching none of them is `Unrecognized`.
#[derive(Debug, PartialEq, Eq)]
enum MajorEvent {
    Captured { city: String },
    Razed { city: String },
    Completed { wonder: String },
    GreatPersonBorn { name: String },
    Converts { religion: String },
    Adopts { civic: String },
    Revolts { city: String, empire: String },
    Unrecognized,
}

fn classify(text: &str) -> MajorEvent {
    if text.contains(" was captured") {
        // The prefix carries the previous owner in parentheses.
        let prefix = text.split(" was captured").next().unwrap_or(text);
        let city = prefix.split('(').next().unwrap_or(prefix).trim().to_owned();
        return MajorEvent::Captured { city };
    }
    if text.contains(" is razed") {
        let city = text.split(" is razed").next().unwrap_or(text).to_owned();
        return MajorEvent::Razed { city };
    }
    if text.contains(" completes ") {
        let wonder = text.rsplit(" completes ").next().unwrap_or(text).to_owned();
        return MajorEvent::Completed { wonder };
    }
    if text.contains(" has been born") {
        let name = text.split(" has been born").next().unwrap_or(text).to_owned();
        return MajorEvent::GreatPersonBorn { name };
    }
    if text.contains("converts") {
        return MajorEvent::Converts {
            religion: canonical_fragment(text),
        };
    }
    if text.contains("adopts") {
        return MajorEvent::Adopts {
            civic: canonical_fragment(text),
        };
    }
    if text.contains(" revolts") {
        let city = text.split(" revolts").next().unwrap_or(text).to_owned();
        let empire = match text.split("joins the ").nth(1) {
            Some(rest) => rest.replace(" Empire!", ""),
            None => String::new(),
        };
        return MajorEvent::Revolts { city, empire };
    }
    MajorEvent::Unrecognized
}

/// Match an empire adjective from revolt text ("Indian", "Roman") to the
/// player whose civilization name shares its 3-letter stem
/// (IND ~ CIVILIZATION_INDIA).
fn match_empire_to_player(
    empire: &str,
    players: &BTreeMap<i32, Player>,
    types: &dyn GameTypes,
) -> Result<i32> {
    let stem: String = empire.to_uppercase().chars().take(3).collect();
    let civs = types.members(TypeCategory::Civilization);
    let matched = civs.iter().find(|civ| {
        civ.strip_prefix("CIVILIZATION_")
            .map(|tail| tail.chars().take(3).collect::<String>() == stem)
            .unwrap_or(false)
    });
    let matched = match matched {
        Some(name) => name,
        None => return Err(SaveError::UnknownEmpire(empire.to_owned())),
    };
    players
        .iter()
        .find(|(_, p)| p.civ.name.as_deref() == Some(matched))
        .map(|(&idx, _)| idx)
        .ok_or_else(|| SaveError::UnknownEmpire(empire.to_owned()))
}

/// Tracks current ownership while the log replays.
struct ReplaySession<'a> {
    types: &'a dyn GameTypes,
    city_owner: HashMap<String, i32>,
    plot_owner: HashMap<(i32, i32), i32>,
}

impl<'a> ReplaySession<'a> {
    fn new(types: &'a dyn GameTypes) -> Self {
        Self {
            types,
            city_owner: HashMap::new(),
            plot_owner: HashMap::new(),
        }
    }

    fn owner_of(&self, city: &str) -> Result<i32> {
        self.city_owner
            .get(city)
            .copied()
            .ok_or_else(|| SaveError::UnknownCity(city.to_owned()))
    }

    fn apply(
        &mut self,
        msg: &ReplayMessage,
        players: &mut BTreeMap<i32, Player>,
    ) -> Result<()> {
        match msg.kind {
            ReplayKind::CityFounded => self.found_city(msg, players),
            ReplayKind::MajorEvent => self.major_event(msg, players),
            ReplayKind::PlotOwnerChange => self.plot_owner_change(msg, players),
            ReplayKind::Other(code) => {
                trace!("turn {}: ignoring replay kind {}", msg.turn, code);
                Ok(())
            }
        }
    }

    fn found_city(
        &mut self,
        msg: &ReplayMessage,
        players: &mut BTreeMap<i32, Player>,
    ) -> Result<()> {
        let name = msg.text.split(" is founded").next().unwrap_or(&msg.text);
        let city = City::new(name.to_owned(), msg.plot_x, msg.plot_y, msg.turn);
        player_mut(players, msg.player)?.cities.push(city);
        self.city_owner.insert(name.to_owned(), msg.player);
        Ok(())
    }

    fn major_event(
        &mut self,
        msg: &ReplayMessage,
        players: &mut BTreeMap<i32, Player>,
    ) -> Result<()> {
        match classify(&msg.text) {
            MajorEvent::Captured { city } => {
                let prev = self.owner_of(&city)?;
                let taken = player_mut(players, prev)?.pop_city(&city)?;
                player_mut(players, msg.player)?.cities.push(taken);
                self.city_owner.insert(city, msg.player);
            }
            MajorEvent::Razed { city } => {
                let prev = self.owner_of(&city)?;
                player_mut(players, prev)?.pop_city(&city)?;
                self.city_owner.remove(&city);
            }
            MajorEvent::Completed { wonder } => {
                let player = player_mut(players, msg.player)?;
                if (msg.plot_x, msg.plot_y) == (-1, -1) {
                    // Global project, not tied to a city.
                    player.projects.push(wonder);
                } else {
                    player.city_at_mut(msg.plot_x, msg.plot_y)?.wonders.push(wonder);
                }
            }
            MajorEvent::GreatPersonBorn { name } => {
                player_mut(players, msg.player)?.great_people.push(name);
            }
            MajorEvent::Converts { religion } => {
                let name = format!("RELIGION_{}", religion);
                let code = self
                    .types
                    .code_of(TypeCategory::Religion, &name)
                    .ok_or(SaveError::UnknownTypeName {
                        category: "Religion",
                        name,
                    })?;
                player_mut(players, msg.player)?.religion =
                    TypeRef::resolve(self.types, TypeCategory::Religion, code);
            }
            MajorEvent::Adopts { civic } => {
                let name = format!("CIVIC_{}", civic);
                let code = self
                    .types
                    .code_of(TypeCategory::Civic, &name)
                    .ok_or(SaveError::UnknownTypeName {
                        category: "Civic",
                        name,
                    })?;
                let civic = TypeRef::resolve(self.types, TypeCategory::Civic, code);
                player_mut(players, msg.player)?.civics.adopt(civic);
            }
            MajorEvent::Revolts { city, empire } => {
                let prev = self.owner_of(&city)?;
                let taken = player_mut(players, prev)?.pop_city(&city)?;
                let dest = match_empire_to_player(&empire, players, self.types)?;
                player_mut(players, dest)?.cities.push(taken);
            }
            MajorEvent::Unrecognized => {
                trace!("turn {}: unrecognized event {:?}", msg.turn, msg.text);
            }
        }
        Ok(())
    }

    fn plot_owner_change(
        &mut self,
        msg: &ReplayMessage,
        players: &mut BTreeMap<i32, Player>,
    ) -> Result<()> {
        let key = (msg.plot_x, msg.plot_y);
        let new_owner = msg.player;
        match self.plot_owner.get(&key).copied() {
            None => {
                if new_owner >= 0 {
                    player_mut(players, new_owner)?.owned_plots += 1;
                }
            }
            Some(prev) => {
                if new_owner >= 0 {
                    player_mut(players, new_owner)?.owned_plots += 1;
                    if prev >= 0 {
                        player_mut(players, prev)?.owned_plots -= 1;
                    }
                } else if prev >= 0 {
                    player_mut(players, prev)?.owned_plots -= 1;
                }
            }
        }
        self.plot_owner.insert(key, new_owner);
        Ok(())
    }
}

fn player_mut(players: &mut BTreeMap<i32, Player>, idx: i32) -> Result<&mut Player> {
    players.get_mut(&idx).ok_or(SaveError::MissingPlayer(idx))
}

/// A capital founded before a turn-0/1 map regeneration leaves a duplicate
/// founding run at the front of the city list. Keep only the run starting
/// at the last repeated name.
fn drop_refounded_prefix(players: &mut BTreeMap<i32, Player>) {
    for player in players.values_mut() {
        let mut seen: Vec<&str> = Vec::new();
        let mut start = 0;
        for (i, city) in player.cities.iter().enumerate() {
            if seen.iter().any(|&n| n == city.name) {
                start = i;
            } else {
                seen.push(&city.name);
            }
        }
        if start > 0 {
            player.cities.drain(..start);
        }
    }
}

/// Replay the full message log against the initial roster, then apply the
/// duplicate-capital correction.
pub fn apply_replay(
    messages: &[ReplayMessage],
    players: &mut BTreeMap<i32, Player>,
    types: &dyn GameTypes,
) -> Result<()> {
    let mut session = ReplaySession::new(types);
    for msg in messages {
        session.apply(msg, players)?;
    }
    drop_refounded_prefix(players);
    debug!(
        "replay applied: {} messages, {} tracked cities",
        messages.len(),
        session.city_owner.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civ4save::context::TypeTable;
    use crate::civ4save::objects::Civics;

    fn test_types() -> TypeTable {
        let mut types = TypeTable::new();
        types.set(
            TypeCategory::Civilization,
            ["CIVILIZATION_ROME", "CIVILIZATION_INDIA"],
        );
        types.set(
            TypeCategory::Religion,
            ["RELIGION_JUDAISM", "RELIGION_BUDDHISM", "RELIGION_HINDUISM"],
        );
        types.set(
            TypeCategory::Civic,
            (0..25).map(|i| match i {
                16 => "CIVIC_MERCANTILISM".to_owned(),
                n => format!("CIVIC_{}", n),
            }),
        );
        types
    }

    fn test_player(idx: i32, civ_code: i32, types: &TypeTable) -> Player {
        Player {
            idx,
            name: format!("Leader {}", idx),
            desc: String::new(),
            short_desc: String::new(),
            adjective: String::new(),
            team: idx,
            handicap: TypeRef::resolve(types, TypeCategory::Handicap, -1),
            leader: TypeRef::resolve(types, TypeCategory::Leader, -1),
            civ: TypeRef::resolve(types, TypeCategory::Civilization, civ_code),
            score: 0,
            rank: 0,
            owned_plots: 0,
            great_people: Vec::new(),
            cities: Vec::new(),
            religion: TypeRef::resolve(types, TypeCategory::Religion, -1),
            civics: Civics::defaults(types),
            trades: Vec::new(),
            projects: Vec::new(),
        }
    }

    fn roster(types: &TypeTable) -> BTreeMap<i32, Player> {
        let mut players = BTreeMap::new();
        players.insert(0, test_player(0, 0, types));
        players.insert(1, test_player(1, 1, types));
        players
    }

    fn msg(kind: ReplayKind, player: i32, turn: i32, x: i32, y: i32, text: &str) -> ReplayMessage {
        ReplayMessage {
            turn,
            kind,
            plot_x: x,
            plot_y: y,
            player,
            text: text.to_owned(),
            color: -1,
        }
    }

    #[test]
    fn empty_log_leaves_roster_untouched() {
        let types = test_types();
        let mut players = roster(&types);
        let before = players.clone();
        apply_replay(&[], &mut players, &types).unwrap();
        assert_eq!(players, before);
    }

    #[test]
    fn founding_capture_and_razing_move_cities() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 5, 10, 10, "Rome is founded"),
            msg(ReplayKind::CityFounded, 1, 8, 20, 20, "Delhi is founded"),
            msg(
                ReplayKind::MajorEvent,
                1,
                40,
                10,
                10,
                "Rome (Leader 0) was captured by the Indian army",
            ),
            msg(ReplayKind::MajorEvent, 1, 60, 20, 20, "Delhi is razed by Leader 1"),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert!(players[&0].cities.is_empty());
        assert_eq!(players[&1].cities.len(), 1);
        assert_eq!(players[&1].cities[0].name, "Rome");
        assert_eq!(players[&1].cities[0].turn_founded, 5);
    }

    #[test]
    fn capturing_an_unknown_city_is_fatal() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![msg(
            ReplayKind::MajorEvent,
            1,
            40,
            3,
            3,
            "Atlantis was captured by the Indian army",
        )];
        assert!(matches!(
            apply_replay(&log, &mut players, &types),
            Err(SaveError::UnknownCity(name)) if name == "Atlantis"
        ));
    }

    #[test]
    fn wonders_attach_to_the_city_at_the_coordinates() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 5, 10, 10, "Rome is founded"),
            msg(
                ReplayKind::MajorEvent,
                0,
                80,
                10,
                10,
                "Rome completes The Pyramids",
            ),
            // Sentinel coordinates mean a team project.
            msg(
                ReplayKind::MajorEvent,
                0,
                200,
                -1,
                -1,
                "Leader 0 completes The Apollo Program",
            ),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert_eq!(players[&0].cities[0].wonders, vec!["The Pyramids"]);
        assert_eq!(players[&0].projects, vec!["The Apollo Program"]);
    }

    #[test]
    fn conversion_and_adoption_parse_decorated_text() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(
                ReplayKind::MajorEvent,
                0,
                30,
                -1,
                -1,
                "Leader 0 converts to <color=180,0,30,255>Hinduism</color>!",
            ),
            msg(
                ReplayKind::MajorEvent,
                0,
                45,
                -1,
                -1,
                "Leader 0 adopts <color=255,255,0,255>Mercantilism</color>!",
            ),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert!(players[&0].religion.is("RELIGION_HINDUISM"));
        assert!(players[&0].civics.economy.is("CIVIC_MERCANTILISM"));
        // Other civic slots keep their defaults.
        assert!(players[&0].civics.government.is("CIVIC_0"));
    }

    #[test]
    fn revolt_moves_city_by_empire_stem() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 5, 10, 10, "Antium is founded"),
            msg(
                ReplayKind::MajorEvent,
                -1,
                90,
                10,
                10,
                "Antium revolts and joins the Indian Empire!",
            ),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert!(players[&0].cities.is_empty());
        assert_eq!(players[&1].cities[0].name, "Antium");
    }

    #[test]
    fn unresolvable_empire_stem_is_fatal() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 5, 10, 10, "Antium is founded"),
            msg(
                ReplayKind::MajorEvent,
                -1,
                90,
                10,
                10,
                "Antium revolts and joins the Zulu Empire!",
            ),
        ];
        assert!(matches!(
            apply_replay(&log, &mut players, &types),
            Err(SaveError::UnknownEmpire(e)) if e == "Zulu"
        ));
    }

    #[test]
    fn plot_ownership_nets_out() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::PlotOwnerChange, 0, 10, 4, 4, ""),
            msg(ReplayKind::PlotOwnerChange, 0, 10, 5, 4, ""),
            // Plot changes hands: player 1 up, player 0 down.
            msg(ReplayKind::PlotOwnerChange, 1, 50, 4, 4, ""),
            // Plot goes unowned: player 1 down, no one up.
            msg(ReplayKind::PlotOwnerChange, -1, 70, 4, 4, ""),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert_eq!(players[&0].owned_plots, 1);
        assert_eq!(players[&1].owned_plots, 0);
    }

    #[test]
    fn refounded_capital_keeps_only_the_later_run() {
        let types = test_types();
        let mut players = roster(&types);
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 0, 10, 10, "Rome is founded"),
            // Map regenerated, capital refounded elsewhere.
            msg(ReplayKind::CityFounded, 0, 1, 30, 30, "Rome is founded"),
            msg(ReplayKind::CityFounded, 0, 20, 31, 30, "Antium is founded"),
        ];
        apply_replay(&log, &mut players, &types).unwrap();

        assert_eq!(players[&0].cities.len(), 2);
        assert_eq!(players[&0].cities[0].x, 30);
        assert_eq!(players[&0].cities[1].name, "Antium");
    }

    #[test]
    fn replaying_the_same_log_twice_yields_equal_rosters() {
        let types = test_types();
        let log = vec![
            msg(ReplayKind::CityFounded, 0, 5, 10, 10, "Rome is founded"),
            msg(ReplayKind::CityFounded, 1, 8, 20, 20, "Delhi is founded"),
            msg(ReplayKind::PlotOwnerChange, 0, 5, 10, 10, ""),
            msg(
                ReplayKind::MajorEvent,
                1,
                40,
                10,
                10,
                "Rome (Leader 0) was captured by the Indian army",
            ),
            msg(ReplayKind::PlotOwnerChange, 1, 40, 10, 10, ""),
            msg(
                ReplayKind::MajorEvent,
                1,
                55,
                -1,
                -1,
                "Leader 1 converts to <color=180,0,30,255>Hinduism</color>!",
            ),
        ];

        let mut first = roster(&types);
        let mut second = roster(&types);
        apply_replay(&log, &mut first, &types).unwrap();
        apply_replay(&log, &mut second, &types).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unrecognized_events_are_ignored() {
        let types = test_types();
        let mut players = roster(&types);
        let before = players.clone();
        let log = vec![msg(
            ReplayKind::MajorEvent,
            0,
            12,
            -1,
            -1,
            "Leader 0 declares war on Leader 1",
        )];
        apply_replay(&log, &mut players, &types).unwrap();
        assert_eq!(players, before);
    }

    #[test]
    fn classification_priority_is_stable() {
        assert_eq!(
            classify("Rome (Caesar) was captured by the Indian army"),
            MajorEvent::Captured {
                city: "Rome".into()
            }
        );
        assert_eq!(
            classify("Cuzco is razed by Gandhi"),
            MajorEvent::Razed {
                city: "Cuzco".into()
            }
        );
        assert_eq!(classify("Something entirely new"), MajorEvent::Unrecognized);
    }
}
