//! Decoders for the map record (`CvMap`) and the per-plot records that
//! follow it.
//!
//! The plot array is the one part of a save this crate does not trust: the
//! engine's plot serializer has an alignment bug that shows up in a fraction
//! of real files, so each decoded plot is verified against its expected
//! row-major coordinates and the scan stops at the first plot that fails.
//! Everything decoded before the bad plot is still returned, together with
//! diagnostics pinpointing where the stream went wrong.

use log::{debug, warn};

use super::context::{GameTypes, TypeCategory};
use super::cursor::SaveCursor;
use super::error::Result;
use super::NUM_YIELD_TYPES;

/// The map record: grid geometry and global bonus counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapHeader {
    pub ui_flag: u32,
    pub unknown: [i8; 8],
    pub grid_width: i32,
    pub grid_height: i32,
    pub land_plots: i32,
    pub owned_plots: i32,
    pub top_latitude: i32,
    pub bottom_latitude: i32,
    pub next_river_id: i32,
    pub wrap_x: bool,
    pub wrap_y: bool,
    pub bonus_counts: Vec<i32>,
    pub bonus_counts_on_land: Vec<i32>,
}

pub fn read_map_header(cur: &mut SaveCursor<'_>, types: &dyn GameTypes) -> Result<MapHeader> {
    let ui_flag = cur.read_u32("map_ui_flag")?;
    let mut unknown = [0i8; 8];
    for b in &mut unknown {
        *b = cur.read_i8("map_unknown")?;
    }
    let grid_width = cur.read_i32("grid_width")?;
    let grid_height = cur.read_i32("grid_height")?;
    let land_plots = cur.read_i32("land_plots")?;
    let owned_plots = cur.read_i32("owned_plots")?;
    let top_latitude = cur.read_i32("top_latitude")?;
    let bottom_latitude = cur.read_i32("bottom_latitude")?;
    let next_river_id = cur.read_i32("next_river_id")?;
    let wrap_x = cur.read_flag("wrap_x")?;
    let wrap_y = cur.read_flag("wrap_y")?;
    let n_bonus = types.member_count(TypeCategory::Bonus);
    let bonus_counts = cur.read_i32_array(n_bonus, "bonus_counts")?;
    let bonus_counts_on_land = cur.read_i32_array(n_bonus, "bonus_counts_on_land")?;
    debug!("map header: {}x{} grid", grid_width, grid_height);
    Ok(MapHeader {
        ui_flag,
        unknown,
        grid_width,
        grid_height,
        land_plots,
        owned_plots,
        top_latitude,
        bottom_latitude,
        next_river_id,
        wrap_x,
        wrap_y,
        bonus_counts,
        bonus_counts_on_land,
    })
}

/// The fixed-width front of a plot record, through the yield triple.
/// Decodable even when the variable tail is misaligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotHead {
    pub ui_flag: u32,
    pub x: i16,
    pub y: i16,
    pub area_id: i32,
    pub feature_variety: i16,
    pub ownership_duration: i16,
    pub improvement_duration: i16,
    pub upgrade_progress: i16,
    pub force_unowned_timer: i16,
    pub city_radius_count: i16,
    pub river_id: i32,
    pub min_original_start_distance: i16,
    pub recon_count: i16,
    pub river_crossing_count: i16,
    pub starting_plot: bool,
    pub hills: bool,
    pub north_of_river: bool,
    pub west_of_river: bool,
    pub irrigated: bool,
    pub potential_city_work: bool,
    pub owner: i8,
    pub plot_type: i16,
    pub terrain_type: i16,
    pub feature_type: i16,
    pub bonus_type: i16,
    pub improvement_type: i16,
    pub route_type: i16,
    pub river_north_south: i8,
    pub river_east_west: i8,
    pub plot_city_owner: i32,
    pub plot_city_id: i32,
    pub working_city_owner: i32,
    pub working_city_id: i32,
    pub working_city_override_owner: i32,
    pub working_city_override_id: i32,
    pub yields: [i16; NUM_YIELD_TYPES],
}

fn read_plot_head(cur: &mut SaveCursor<'_>) -> Result<PlotHead> {
    let ui_flag = cur.read_u32("plot_ui_flag")?;
    let x = cur.read_i16("plot_x")?;
    let y = cur.read_i16("plot_y")?;
    let area_id = cur.read_i32("plot_area_id")?;
    let feature_variety = cur.read_i16("feature_variety")?;
    let ownership_duration = cur.read_i16("ownership_duration")?;
    let improvement_duration = cur.read_i16("improvement_duration")?;
    let upgrade_progress = cur.read_i16("upgrade_progress")?;
    let force_unowned_timer = cur.read_i16("force_unowned_timer")?;
    let city_radius_count = cur.read_i16("city_radius_count")?;
    let river_id = cur.read_i32("river_id")?;
    let min_original_start_distance = cur.read_i16("min_original_start_distance")?;
    let recon_count = cur.read_i16("recon_count")?;
    let river_crossing_count = cur.read_i16("river_crossing_count")?;
    let starting_plot = cur.read_flag("starting_plot")?;
    let hills = cur.read_flag("hills")?;
    let north_of_river = cur.read_flag("north_of_river")?;
    let west_of_river = cur.read_flag("west_of_river")?;
    let irrigated = cur.read_flag("irrigated")?;
    let potential_city_work = cur.read_flag("potential_city_work")?;
    let owner = cur.read_i8("plot_owner")?;
    let plot_type = cur.read_i16("plot_type")?;
    let terrain_type = cur.read_i16("terrain_type")?;
    let feature_type = cur.read_i16("feature_type")?;
    let bonus_type = cur.read_i16("bonus_type")?;
    let improvement_type = cur.read_i16("improvement_type")?;
    let route_type = cur.read_i16("route_type")?;
    let river_north_south = cur.read_i8("river_north_south")?;
    let river_east_west = cur.read_i8("river_east_west")?;
    let plot_city_owner = cur.read_i32("plot_city_owner")?;
    let plot_city_id = cur.read_i32("plot_city_id")?;
    let working_city_owner = cur.read_i32("working_city_owner")?;
    let working_city_id = cur.read_i32("working_city_id")?;
    let working_city_override_owner = cur.read_i32("working_city_override_owner")?;
    let working_city_override_id = cur.read_i32("working_city_override_id")?;
    let mut yields = [0i16; NUM_YIELD_TYPES];
    for y in &mut yields {
        *y = cur.read_i16("plot_yields")?;
    }
    Ok(PlotHead {
        ui_flag,
        x,
        y,
        area_id,
        feature_variety,
        ownership_duration,
        improvement_duration,
        upgrade_progress,
        force_unowned_timer,
        city_radius_count,
        river_id,
        min_original_start_distance,
        recon_count,
        river_crossing_count,
        starting_plot,
        hills,
        north_of_river,
        west_of_river,
        irrigated,
        potential_city_work,
        owner,
        plot_type,
        terrain_type,
        feature_type,
        bonus_type,
        improvement_type,
        route_type,
        river_north_south,
        river_east_west,
        plot_city_owner,
        plot_city_id,
        working_city_owner,
        working_city_id,
        working_city_override_owner,
        working_city_override_id,
        yields,
    })
}

/// Owner/id pair for a unit standing on a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRef {
    pub owner: i32,
    pub id: i32,
}

/// One fully decoded plot record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotRecord {
    pub head: PlotHead,
    pub culture: Vec<i32>,
    pub found_value: Vec<i16>,
    pub player_city_radius: Vec<i8>,
    pub plot_group: Vec<i32>,
    pub visibility: Vec<i16>,
    pub stolen_visibility: Vec<i16>,
    pub blockaded: Vec<i16>,
    pub revealed_owner: Vec<i8>,
    pub river_crossings: Vec<bool>,
    pub revealed: Vec<bool>,
    pub revealed_improvement_type: Vec<i16>,
    pub revealed_route_type: Vec<i16>,
    pub script_data: String,
    pub build_progress: Vec<i16>,
    pub culture_range_cities: Vec<Vec<i8>>,
    pub invisible_visibility: Vec<Vec<i16>>,
    pub units: Vec<UnitRef>,
}

impl PlotRecord {
    pub fn x(&self) -> i16 {
        self.head.x
    }

    pub fn y(&self) -> i16 {
        self.head.y
    }
}

pub fn read_plot(cur: &mut SaveCursor<'_>) -> Result<PlotRecord> {
    let head = read_plot_head(cur)?;

    let n = cur.read_len_i8("sz_culture")?;
    let culture = cur.read_i32_array(n, "culture")?;
    let n = cur.read_len_i8("sz_found_value")?;
    let found_value = cur.read_i16_array(n, "found_value")?;
    let n = cur.read_len_i8("sz_player_city_radius")?;
    let player_city_radius = cur.read_i8_array(n, "player_city_radius")?;
    let n = cur.read_len_i8("sz_plot_group")?;
    let plot_group = cur.read_i32_array(n, "plot_group")?;
    let n = cur.read_len_i8("sz_visibility")?;
    let visibility = cur.read_i16_array(n, "visibility")?;
    let n = cur.read_len_i8("sz_stolen_visibility")?;
    let stolen_visibility = cur.read_i16_array(n, "stolen_visibility")?;
    let n = cur.read_len_i8("sz_blockaded")?;
    let blockaded = cur.read_i16_array(n, "blockaded")?;
    let n = cur.read_len_i8("sz_revealed_owner")?;
    let revealed_owner = cur.read_i8_array(n, "revealed_owner")?;
    let n = cur.read_len_i8("sz_direction_types")?;
    let river_crossings = cur.read_flag_array(n, "river_crossings")?;
    let n = cur.read_len_i8("sz_revealed")?;
    let revealed = cur.read_flag_array(n, "revealed")?;
    let n = cur.read_len_i8("sz_revealed_improvement_type")?;
    let revealed_improvement_type = cur.read_i16_array(n, "revealed_improvement_type")?;
    let n = cur.read_len_i8("sz_revealed_route_type")?;
    let revealed_route_type = cur.read_i16_array(n, "revealed_route_type")?;

    let script_data = cur.read_narrow_string("plot_script_data")?;

    let n = cur.read_len_i32("sz_build_progress")?;
    let build_progress = cur.read_i16_array(n, "build_progress")?;

    let n = cur.read_len_i8("sz_culture_range_cities")?;
    let culture_range_cities = (0..n)
        .map(|_| {
            let inner = cur.read_len_i32("culture_range_cities")?;
            cur.read_i8_array(inner, "culture_range_cities")
        })
        .collect::<Result<Vec<_>>>()?;

    let n = cur.read_len_i8("sz_invisible_visibility")?;
    let invisible_visibility = (0..n)
        .map(|_| {
            let inner = cur.read_len_i32("invisible_visibility")?;
            cur.read_i16_array(inner, "invisible_visibility")
        })
        .collect::<Result<Vec<_>>>()?;

    let n = cur.read_len_i32("sz_units")?;
    let units = (0..n)
        .map(|_| {
            Ok(UnitRef {
                owner: cur.read_i32("plot_units")?,
                id: cur.read_i32("plot_units")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PlotRecord {
        head,
        culture,
        found_value,
        player_city_radius,
        plot_group,
        visibility,
        stolen_visibility,
        blockaded,
        revealed_owner,
        river_crossings,
        revealed,
        revealed_improvement_type,
        revealed_route_type,
        script_data,
        build_progress,
        culture_range_cities,
        invisible_visibility,
        units,
    })
}

/// Tolerant prefix decode of a plot record: the fixed head plus the culture
/// array, stopping before the fields most often hit by the misalignment.
/// Used only for diagnostics on a plot the strict decoder rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugPlot {
    pub head: PlotHead,
    pub culture: Vec<i32>,
    pub found_value_len: i8,
}

fn read_debug_plot(cur: &mut SaveCursor<'_>) -> Result<DebugPlot> {
    let head = read_plot_head(cur)?;
    let n = cur.read_len_i8("sz_culture")?;
    let culture = cur.read_i32_array(n, "culture")?;
    let found_value_len = cur.read_i8("sz_found_value")?;
    Ok(DebugPlot {
        head,
        culture,
        found_value_len,
    })
}

/// Where and how a plot scan went off the rails.
#[derive(Debug, Clone)]
pub struct PlotDiagnostics {
    /// Absolute offset of the first byte of the failing plot record.
    pub offset: usize,
    pub plots_decoded: usize,
    pub plots_expected: usize,
    /// Coordinates of the last plot that verified correctly.
    pub last_good: Option<(i16, i16)>,
    /// Best-effort prefix decode of the failing record.
    pub failing: Option<DebugPlot>,
    pub error: String,
}

/// Result of scanning the plot array: every verified plot plus diagnostics
/// when the scan stopped early.
#[derive(Debug, Clone)]
pub struct PlotScan {
    pub plots: Vec<PlotRecord>,
    pub diagnostics: Option<PlotDiagnostics>,
    /// Absolute offset one past the last verified plot.
    pub end: usize,
}

impl PlotScan {
    /// True when every expected plot decoded and verified.
    pub fn complete(&self) -> bool {
        self.diagnostics.is_none()
    }
}

/// Decode `width * height` plots starting at `start`, verifying each against
/// its expected row-major coordinates. Stops at the first bad plot.
pub fn read_plots(buf: &[u8], start: usize, width: i32, height: i32) -> PlotScan {
    let expected = (width.max(0) as usize) * (height.max(0) as usize);
    let mut plots: Vec<PlotRecord> = Vec::with_capacity(expected);
    let mut cur = SaveCursor::at(buf, start);

    for i in 0..expected {
        let record_start = cur.position();
        let want_x = (i % width.max(1) as usize) as i16;
        let want_y = (i / width.max(1) as usize) as i16;

        let outcome = match read_plot(&mut cur) {
            Ok(plot) if plot.x() == want_x && plot.y() == want_y => {
                plots.push(plot);
                continue;
            }
            Ok(plot) => format!(
                "plot {} decoded as ({}, {}), expected ({}, {})",
                i,
                plot.x(),
                plot.y(),
                want_x,
                want_y
            ),
            Err(e) => format!("plot {} failed to decode: {}", i, e),
        };
        warn!("{} at offset {}", outcome, record_start);

        let failing = read_debug_plot(&mut SaveCursor::at(buf, record_start)).ok();
        let last_good = plots.last().map(|p| (p.x(), p.y()));
        return PlotScan {
            end: record_start,
            diagnostics: Some(PlotDiagnostics {
                offset: record_start,
                plots_decoded: plots.len(),
                plots_expected: expected,
                last_good,
                failing,
                error: outcome,
            }),
            plots,
        };
    }

    debug!("plot scan complete: {} plots", plots.len());
    PlotScan {
        end: cur.position(),
        plots,
        diagnostics: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i16(buf: &mut Vec<u8>, v: i16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Minimal valid plot record at (x, y) with all variable arrays empty.
    fn push_plot(buf: &mut Vec<u8>, x: i16, y: i16) {
        push_i32(buf, 1); // ui_flag
        push_i16(buf, x);
        push_i16(buf, y);
        push_i32(buf, 0); // area_id
        for _ in 0..6 {
            push_i16(buf, 0); // feature_variety..city_radius_count
        }
        push_i32(buf, -1); // river_id
        for _ in 0..3 {
            push_i16(buf, 0); // min_original_start_distance..river_crossing_count
        }
        buf.extend_from_slice(&[0; 6]); // six flags
        buf.push(0xff); // owner -1
        for t in [1i16, 2, -1, -1, -1, -1] {
            push_i16(buf, t); // plot_type..route_type
        }
        buf.extend_from_slice(&[0xff, 0xff]); // river direction chars
        for _ in 0..6 {
            push_i32(buf, -1); // city owner/id triples
        }
        for yld in [2i16, 1, 0] {
            push_i16(buf, yld);
        }
        for _ in 0..12 {
            buf.push(0); // twelve empty i8-prefixed arrays
        }
        push_i32(buf, 0); // sz_plot_script_data
        push_i32(buf, 0); // sz_build_progress
        buf.push(0); // sz_culture_range_cities
        buf.push(0); // sz_invisible_visibility
        push_i32(buf, 0); // sz_units
    }

    #[test]
    fn scans_a_complete_grid() {
        let mut buf = Vec::new();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            push_plot(&mut buf, x, y);
        }
        let scan = read_plots(&buf, 0, 2, 2);
        assert!(scan.complete());
        assert_eq!(scan.plots.len(), 4);
        assert_eq!((scan.plots[2].x(), scan.plots[2].y()), (0, 1));
        assert_eq!(scan.end, buf.len());
    }

    #[test]
    fn coordinate_mismatch_stops_with_diagnostics() {
        let mut buf = Vec::new();
        push_plot(&mut buf, 0, 0);
        push_plot(&mut buf, 1, 0);
        let third_start = buf.len();
        push_plot(&mut buf, 5, 5); // wrong coordinates
        push_plot(&mut buf, 1, 1);

        let scan = read_plots(&buf, 0, 2, 2);
        assert!(!scan.complete());
        assert_eq!(scan.plots.len(), 2);
        let diag = scan.diagnostics.unwrap();
        assert_eq!(diag.offset, third_start);
        assert_eq!(diag.plots_decoded, 2);
        assert_eq!(diag.plots_expected, 4);
        assert_eq!(diag.last_good, Some((1, 0)));
        let failing = diag.failing.unwrap();
        assert_eq!((failing.head.x, failing.head.y), (5, 5));
    }

    #[test]
    fn truncated_plot_reports_decode_error() {
        let mut buf = Vec::new();
        push_plot(&mut buf, 0, 0);
        buf.extend_from_slice(&[1, 0, 0, 0]); // fragment of a second plot

        let scan = read_plots(&buf, 0, 2, 1);
        assert_eq!(scan.plots.len(), 1);
        let diag = scan.diagnostics.unwrap();
        assert!(diag.error.contains("failed to decode"));
        assert!(diag.failing.is_none());
    }

    #[test]
    fn map_header_sizes_bonus_arrays() {
        use crate::civ4save::context::TypeTable;
        let mut types = TypeTable::new();
        types.set(TypeCategory::Bonus, ["BONUS_COW", "BONUS_WHEAT"]);

        let mut buf = Vec::new();
        push_i32(&mut buf, 3); // ui_flag
        buf.extend_from_slice(&[0; 8]); // unknown
        push_i32(&mut buf, 84); // grid_width
        push_i32(&mut buf, 52); // grid_height
        push_i32(&mut buf, 1800); // land_plots
        push_i32(&mut buf, 400); // owned_plots
        push_i32(&mut buf, 90);
        push_i32(&mut buf, -90);
        push_i32(&mut buf, 17); // next_river_id
        buf.extend_from_slice(&[1, 0]); // wrap_x, wrap_y
        push_i32(&mut buf, 12);
        push_i32(&mut buf, 9);
        push_i32(&mut buf, 10);
        push_i32(&mut buf, 9);

        let mut cur = SaveCursor::new(&buf);
        let header = read_map_header(&mut cur, &types).unwrap();
        assert_eq!((header.grid_width, header.grid_height), (84, 52));
        assert!(header.wrap_x);
        assert!(!header.wrap_y);
        assert_eq!(header.bonus_counts, vec![12, 9]);
        assert_eq!(header.bonus_counts_on_land, vec![10, 9]);
        assert_eq!(cur.remaining(), 0);
    }
}
