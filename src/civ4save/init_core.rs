//! Decoders for the uncompressed file prefix: the metadata header and the
//! game setup record (`CvInitCore`).
//!
//! Field order follows the engine's serializer exactly. Per-player arrays
//! are always `max_players` long regardless of how many slots are active;
//! inactive slots carry empty strings and `-1` codes.

use log::debug;

use super::context::{Context, GameTypes, TypeCategory};
use super::cursor::SaveCursor;
use super::error::Result;

/// The fixed-size header at the very start of the file, before compression.
///
/// Layout:
/// - `version` (i32): save format version, 302 for BTS 3.19
/// - `save_bits` (i32 x 8): engine feature bit words
/// - `bytes_to_zlib_magic` (i32): distance from this field to the zlib
///   signature, useful for cross-checking the located stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub version: i32,
    pub save_bits: [i32; 8],
    pub bytes_to_zlib_magic: i32,
}

pub fn read_metadata(cur: &mut SaveCursor<'_>) -> Result<Metadata> {
    let version = cur.read_i32("version")?;
    let mut save_bits = [0i32; 8];
    for bits in &mut save_bits {
        *bits = cur.read_i32("save_bits")?;
    }
    let bytes_to_zlib_magic = cur.read_i32("bytes_to_zlib_magic")?;
    debug!(
        "metadata: version={} bytes_to_zlib_magic={}",
        version, bytes_to_zlib_magic
    );
    Ok(Metadata {
        version,
        save_bits,
        bytes_to_zlib_magic,
    })
}

/// The game setup record. Everything the host chose on the setup screen,
/// plus one slot of every per-player field for each of the `max_players`
/// engine slots.
#[derive(Debug, Clone, PartialEq)]
pub struct InitCore {
    pub save_flag: u32,
    pub game_type: i32,
    pub game_name: String,
    pub game_password: String,
    pub admin_password: String,
    pub map_script_name: String,
    pub wb_map_no_players: bool,
    pub world_size: i32,
    pub climate: i32,
    pub sea_level: i32,
    pub start_era: i32,
    pub game_speed: i32,
    pub turn_timer: i32,
    pub calendar: i32,
    pub num_custom_map_options: i32,
    pub num_hidden_custom_map_options: i32,
    pub custom_map_options: Vec<i32>,
    pub victories: Vec<bool>,
    pub game_options: Vec<bool>,
    pub mp_game_options: Vec<bool>,
    pub stat_reporting: bool,
    pub game_turn: i32,
    pub max_turns: i32,
    pub pitboss_turn_time: i32,
    pub target_score: i32,
    pub max_city_eliminations: i32,
    pub advanced_start_points: i32,
    pub leader_names: Vec<String>,
    pub civ_descriptions: Vec<String>,
    pub civ_short_descriptions: Vec<String>,
    pub civ_adjectives: Vec<String>,
    pub emails: Vec<String>,
    pub smtp_hosts: Vec<String>,
    pub white_flags: Vec<bool>,
    /// Unidentified per-player words between the white flags and the flag
    /// decals. Kept raw until someone pins down what the engine stores here.
    pub unknown: Vec<i32>,
    pub flag_decals: Vec<String>,
    pub civs: Vec<i32>,
    pub leaders: Vec<i32>,
    pub teams: Vec<i32>,
    pub handicaps: Vec<i32>,
    pub colors: Vec<i32>,
    pub art_styles: Vec<i32>,
    pub slot_statuses: Vec<i32>,
    pub slot_claims: Vec<i32>,
    pub playable_civs: Vec<bool>,
    pub minor_nation_civs: Vec<bool>,
}

fn read_wide_strings(
    cur: &mut SaveCursor<'_>,
    count: usize,
    field: &'static str,
) -> Result<Vec<String>> {
    (0..count).map(|_| cur.read_wide_string(field)).collect()
}

fn read_narrow_strings(
    cur: &mut SaveCursor<'_>,
    count: usize,
    field: &'static str,
) -> Result<Vec<String>> {
    (0..count).map(|_| cur.read_narrow_string(field)).collect()
}

pub fn read_init_core(
    cur: &mut SaveCursor<'_>,
    ctx: &Context,
    types: &dyn GameTypes,
) -> Result<InitCore> {
    let mp = ctx.max_players;

    let save_flag = cur.read_u32("save_flag")?;
    let game_type = cur.read_i32("game_type")?;
    let game_name = cur.read_wide_string("game_name")?;
    let game_password = cur.read_wide_string("game_password")?;
    let admin_password = cur.read_wide_string("admin_password")?;
    let map_script_name = cur.read_wide_string("map_script_name")?;
    let wb_map_no_players = cur.read_flag("wb_map_no_players")?;
    let world_size = cur.read_i32("world_size")?;
    let climate = cur.read_i32("climate")?;
    let sea_level = cur.read_i32("sea_level")?;
    let start_era = cur.read_i32("start_era")?;
    let game_speed = cur.read_i32("game_speed")?;
    let turn_timer = cur.read_i32("turn_timer")?;
    let calendar = cur.read_i32("calendar")?;

    let num_custom_map_options = cur.read_i32("num_custom_map_options")?;
    let num_hidden_custom_map_options = cur.read_i32("num_hidden_custom_map_options")?;
    let custom_map_options =
        cur.read_i32_array(num_custom_map_options.max(0) as usize, "custom_map_options")?;
    let num_victories = cur.read_len_i32("num_victories")?;
    let victories = cur.read_flag_array(num_victories, "victories")?;
    let game_options = cur.read_flag_array(
        types.member_count(TypeCategory::GameOption),
        "game_options",
    )?;
    let mp_game_options = cur.read_flag_array(
        types.member_count(TypeCategory::MultiplayerOption),
        "mp_game_options",
    )?;
    let stat_reporting = cur.read_flag("stat_reporting")?;

    let game_turn = cur.read_i32("game_turn")?;
    let max_turns = cur.read_i32("max_turns")?;
    let pitboss_turn_time = cur.read_i32("pitboss_turn_time")?;
    let target_score = cur.read_i32("target_score")?;
    let max_city_eliminations = cur.read_i32("max_city_eliminations")?;
    let advanced_start_points = cur.read_i32("advanced_start_points")?;

    let leader_names = read_wide_strings(cur, mp, "leader_names")?;
    let civ_descriptions = read_wide_strings(cur, mp, "civ_descriptions")?;
    let civ_short_descriptions = read_wide_strings(cur, mp, "civ_short_descriptions")?;
    let civ_adjectives = read_wide_strings(cur, mp, "civ_adjectives")?;
    let emails = read_narrow_strings(cur, mp, "emails")?;
    let smtp_hosts = read_narrow_strings(cur, mp, "smtp_hosts")?;
    let white_flags = cur.read_flag_array(mp, "white_flags")?;
    let unknown = cur.read_i32_array(mp, "init_core_unknown")?;
    let flag_decals = read_wide_strings(cur, mp, "flag_decals")?;

    let civs = cur.read_i32_array(mp, "civs")?;
    let leaders = cur.read_i32_array(mp, "leaders")?;
    let teams = cur.read_i32_array(mp, "teams")?;
    let handicaps = cur.read_i32_array(mp, "handicaps")?;
    let colors = cur.read_i32_array(mp, "colors")?;
    let art_styles = cur.read_i32_array(mp, "art_styles")?;
    let slot_statuses = cur.read_i32_array(mp, "slot_statuses")?;
    let slot_claims = cur.read_i32_array(mp, "slot_claims")?;
    let playable_civs = cur.read_flag_array(mp, "playable_civs")?;
    let minor_nation_civs = cur.read_flag_array(mp, "minor_nation_civs")?;

    debug!(
        "init core: {:?} on {:?}, turn {}",
        game_name, map_script_name, game_turn
    );

    Ok(InitCore {
        save_flag,
        game_type,
        game_name,
        game_password,
        admin_password,
        map_script_name,
        wb_map_no_players,
        world_size,
        climate,
        sea_level,
        start_era,
        game_speed,
        turn_timer,
        calendar,
        num_custom_map_options,
        num_hidden_custom_map_options,
        custom_map_options,
        victories,
        game_options,
        mp_game_options,
        stat_reporting,
        game_turn,
        max_turns,
        pitboss_turn_time,
        target_score,
        max_city_eliminations,
        advanced_start_points,
        leader_names,
        civ_descriptions,
        civ_short_descriptions,
        civ_adjectives,
        emails,
        smtp_hosts,
        white_flags,
        unknown,
        flag_decals,
        civs,
        leaders,
        teams,
        handicaps,
        colors,
        art_styles,
        slot_statuses,
        slot_claims,
        playable_civs,
        minor_nation_civs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civ4save::context::TypeTable;

    fn push_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_wide(buf: &mut Vec<u8>, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        push_i32(buf, units.len() as i32);
        for u in units {
            buf.extend_from_slice(&u.to_le_bytes());
        }
    }

    fn push_narrow(buf: &mut Vec<u8>, s: &str) {
        push_i32(buf, s.len() as i32);
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn metadata_is_eleven_words() {
        let mut buf = Vec::new();
        push_i32(&mut buf, 302);
        for i in 0..8 {
            push_i32(&mut buf, i);
        }
        push_i32(&mut buf, 4096);

        let mut cur = SaveCursor::new(&buf);
        let meta = read_metadata(&mut cur).unwrap();
        assert_eq!(meta.version, 302);
        assert_eq!(meta.save_bits[7], 7);
        assert_eq!(meta.bytes_to_zlib_magic, 4096);
        assert_eq!(cur.position(), 40);
    }

    #[test]
    fn init_core_sizes_arrays_from_context_and_types() {
        let ctx = Context::new(2);
        let mut types = TypeTable::new();
        types.set(TypeCategory::GameOption, ["GAMEOPTION_NO_CITY_RAZING"]);
        types.set(
            TypeCategory::MultiplayerOption,
            ["MPOPTION_SIMULTANEOUS_TURNS", "MPOPTION_TAKEOVER_AI"],
        );

        let mut buf = Vec::new();
        push_i32(&mut buf, 7); // save_flag
        push_i32(&mut buf, 0); // game_type
        push_wide(&mut buf, "Test Game");
        push_wide(&mut buf, ""); // game_password
        push_wide(&mut buf, ""); // admin_password
        push_wide(&mut buf, "Pangaea");
        buf.push(0); // wb_map_no_players
        for _ in 0..7 {
            // world_size..calendar
            push_i32(&mut buf, 1);
        }
        push_i32(&mut buf, 0); // num_custom_map_options
        push_i32(&mut buf, 0); // num_hidden_custom_map_options
        push_i32(&mut buf, 2); // num_victories
        buf.extend_from_slice(&[1, 0]); // victories
        buf.push(1); // game_options (1 member)
        buf.extend_from_slice(&[0, 1]); // mp_game_options (2 members)
        buf.push(0); // stat_reporting
        for v in [120, 500, 0, 0, 0, 600] {
            // game_turn..advanced_start_points
            push_i32(&mut buf, v);
        }
        for name in ["Caesar", "Gandhi"] {
            push_wide(&mut buf, name);
        }
        for d in ["Roman Empire", "Indian Empire"] {
            push_wide(&mut buf, d);
        }
        for s in ["Rome", "India"] {
            push_wide(&mut buf, s);
        }
        for a in ["Roman", "Indian"] {
            push_wide(&mut buf, a);
        }
        for _ in 0..2 {
            push_narrow(&mut buf, ""); // emails
        }
        for _ in 0..2 {
            push_narrow(&mut buf, ""); // smtp_hosts
        }
        buf.extend_from_slice(&[0, 0]); // white_flags
        push_i32(&mut buf, 0); // unknown
        push_i32(&mut buf, 0);
        for _ in 0..2 {
            push_wide(&mut buf, ""); // flag_decals
        }
        for arr in 0..8 {
            // civs, leaders, teams, handicaps, colors, art, statuses, claims
            push_i32(&mut buf, arr);
            push_i32(&mut buf, arr + 10);
        }
        buf.extend_from_slice(&[1, 1]); // playable_civs
        buf.extend_from_slice(&[0, 0]); // minor_nation_civs

        let mut cur = SaveCursor::new(&buf);
        let core = read_init_core(&mut cur, &ctx, &types).unwrap();

        assert_eq!(core.game_name, "Test Game");
        assert_eq!(core.map_script_name, "Pangaea");
        assert_eq!(core.game_turn, 120);
        assert_eq!(core.advanced_start_points, 600);
        assert_eq!(core.victories, vec![true, false]);
        assert_eq!(core.game_options, vec![true]);
        assert_eq!(core.mp_game_options, vec![false, true]);
        assert_eq!(core.leader_names, vec!["Caesar", "Gandhi"]);
        assert_eq!(core.civ_short_descriptions, vec!["Rome", "India"]);
        assert_eq!(core.civs, vec![0, 10]);
        assert_eq!(core.slot_claims, vec![7, 17]);
        assert_eq!(cur.remaining(), 0);
    }
}
