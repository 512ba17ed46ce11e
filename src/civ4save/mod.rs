//! Reader for Civilization IV: Beyond the Sword save files
//! (`.CivBeyondSwordSave`).
//!
//! A save is a little-endian binary file with a zlib-compressed middle
//! section whose end offset is not recorded anywhere and has to be found by
//! bisection. Once reassembled, the logical buffer is decoded pass by pass:
//!
//! - metadata: format version, fail-fast gate
//! - settings: the `CvInitCore` setup record
//! - game: the `CvGame` record, including the replay message log
//! - map header: grid geometry
//! - plots: the per-plot array, verified record by record
//!
//! Passes run lazily: each public accessor advances the parse just far
//! enough and memoizes the result. The plot array is allowed to be broken
//! in real saves, so that pass never fails; it stops and keeps diagnostics
//! instead, leaving the parse in a partial but usable state.
//!
//! Cities, plot ownership, civics, and religion per player are not decoded
//! from engine objects; they are reconstructed by replaying the embedded
//! event log (see [`replay`]).

pub mod context;
pub mod cursor;
pub mod error;
pub mod game_block;
pub mod init_core;
pub mod map;
pub mod objects;
pub mod replay;
pub mod stream;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

pub use context::{Context, GameTypes, TypeCategory, TypeTable};
pub use error::{Result, SaveError};
pub use game_block::{GameBlock, ReplayKind, ReplayMessage};
pub use init_core::{InitCore, Metadata};
pub use map::{MapHeader, PlotDiagnostics, PlotRecord, PlotScan};
pub use objects::{City, Civics, GameState, Player, Plot, Settings, Trade, TradeDeal, TypeRef};

use cursor::SaveCursor;
use stream::SaveStream;

/// The only accepted save format version, written by BTS 3.19.
pub const SUPPORTED_VERSION: i32 = 302;

/// Food, production, commerce.
pub const NUM_YIELD_TYPES: usize = 3;

/// Progress of the pass sequence. Strictly forward except for the explicit
/// plots reset, which moves `Partial`/`Complete` back to `MapPlotsAttempted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseState {
    Ready,
    MetadataDone,
    SettingsDone,
    GameDone,
    MapHeaderDone,
    /// A plot scan is pending after an explicit reset.
    MapPlotsAttempted,
    /// Terminal: the plot scan stopped early; everything else is decoded.
    Partial,
    /// Terminal: every expected plot decoded and verified.
    Complete,
}

/// Byte counts of the physical file regions and of the logical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLayout {
    pub raw_len: usize,
    pub header_len: usize,
    pub compressed_len: usize,
    pub inflated_len: usize,
    pub tail_len: usize,
    pub logical_len: usize,
}

impl FileLayout {
    /// Inflated-to-compressed size ratio of the zlib region.
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_len == 0 {
            return 0.0;
        }
        self.inflated_len as f64 / self.compressed_len as f64
    }
}

/// A lazily parsed save file.
///
/// Constructing one locates and inflates the compressed region but decodes
/// nothing. Accessors drive the parse forward on demand and memoize their
/// results; a `SaveFile` is therefore cheap to build and pays only for what
/// is asked of it.
pub struct SaveFile<T: GameTypes> {
    ctx: Context,
    types: T,
    stream: SaveStream,
    state: ParseState,
    pos: usize,
    plots_start: usize,
    metadata: Option<Metadata>,
    init_core: Option<InitCore>,
    game: Option<GameBlock>,
    map: Option<MapHeader>,
    plot_scan: Option<PlotScan>,
    projected_plots: Option<Vec<Plot>>,
    settings: Option<Settings>,
    game_state: Option<GameState>,
    players: Option<BTreeMap<i32, Player>>,
}

impl<T: GameTypes> SaveFile<T> {
    /// Build a save from raw file bytes. Locates the compressed region and
    /// reassembles the logical buffer; no record decoding happens yet.
    pub fn from_bytes(raw: &[u8], ctx: Context, types: T) -> Result<Self> {
        let stream = stream::locate(raw)?;
        info!(
            "save stream located: {} raw bytes, {} logical bytes",
            stream.raw_len,
            stream.buffer.len()
        );
        Ok(Self {
            ctx,
            types,
            stream,
            state: ParseState::Ready,
            pos: 0,
            plots_start: 0,
            metadata: None,
            init_core: None,
            game: None,
            map: None,
            plot_scan: None,
            projected_plots: None,
            settings: None,
            game_state: None,
            players: None,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, ctx: Context, types: T) -> Result<Self> {
        let raw = fs::read(path)?;
        Self::from_bytes(&raw, ctx, types)
    }

    pub fn parse_state(&self) -> ParseState {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Physical layout of the file as discovered by the stream locator.
    pub fn file_layout(&self) -> FileLayout {
        FileLayout {
            raw_len: self.stream.raw_len,
            header_len: self.stream.header_len,
            compressed_len: self.stream.compressed_len,
            inflated_len: self.stream.inflated_len,
            tail_len: self.stream.tail_len,
            logical_len: self.stream.buffer.len(),
        }
    }

    /// Run exactly the next undone pass and return the new state. Calling
    /// this in a terminal state is a no-op.
    pub fn advance(&mut self) -> Result<ParseState> {
        match self.state {
            ParseState::Ready => {
                let mut cur = SaveCursor::new(&self.stream.buffer);
                let meta = init_core::read_metadata(&mut cur)?;
                if meta.version != SUPPORTED_VERSION {
                    return Err(SaveError::UnsupportedVersion(meta.version));
                }
                self.pos = cur.position();
                self.metadata = Some(meta);
                self.state = ParseState::MetadataDone;
            }
            ParseState::MetadataDone => {
                let mut cur = SaveCursor::at(&self.stream.buffer, self.pos);
                let core = init_core::read_init_core(&mut cur, &self.ctx, &self.types)?;
                self.pos = cur.position();
                self.init_core = Some(core);
                self.state = ParseState::SettingsDone;
            }
            ParseState::SettingsDone => {
                let mut cur = SaveCursor::at(&self.stream.buffer, self.pos);
                let game = game_block::read_game_block(&mut cur, &self.ctx, &self.types)?;
                self.pos = cur.position();
                self.game = Some(game);
                self.state = ParseState::GameDone;
            }
            ParseState::GameDone => {
                let mut cur = SaveCursor::at(&self.stream.buffer, self.pos);
                let map = map::read_map_header(&mut cur, &self.types)?;
                self.pos = cur.position();
                self.plots_start = self.pos;
                self.map = Some(map);
                self.state = ParseState::MapHeaderDone;
            }
            ParseState::MapHeaderDone | ParseState::MapPlotsAttempted => {
                let (width, height) = match &self.map {
                    Some(m) => (m.grid_width, m.grid_height),
                    None => {
                        return Err(SaveError::Parse(
                            "plot pass requested before map header".to_owned(),
                        ))
                    }
                };
                let scan = map::read_plots(&self.stream.buffer, self.plots_start, width, height);
                self.pos = scan.end;
                self.state = if scan.complete() {
                    ParseState::Complete
                } else {
                    ParseState::Partial
                };
                debug!(
                    "plot pass: {}/{} plots, state {:?}",
                    scan.plots.len(),
                    (width.max(0) as usize) * (height.max(0) as usize),
                    self.state
                );
                self.plot_scan = Some(scan);
            }
            ParseState::Partial | ParseState::Complete => {}
        }
        Ok(self.state)
    }

    fn ensure(&mut self, target: ParseState) -> Result<()> {
        while self.state < target {
            let before = self.state;
            self.advance()?;
            if self.state == before {
                return Err(SaveError::Parse(format!(
                    "parse cannot reach {:?} from {:?}",
                    target, before
                )));
            }
        }
        Ok(())
    }

    pub fn metadata(&mut self) -> Result<&Metadata> {
        self.ensure(ParseState::MetadataDone)?;
        match self.metadata.as_ref() {
            Some(m) => Ok(m),
            None => Err(SaveError::Parse("metadata pass left no record".to_owned())),
        }
    }

    /// Save format version. Always [`SUPPORTED_VERSION`] on success.
    pub fn version(&mut self) -> Result<i32> {
        Ok(self.metadata()?.version)
    }

    pub fn current_turn(&mut self) -> Result<i32> {
        self.ensure(ParseState::SettingsDone)?;
        match self.init_core.as_ref() {
            Some(core) => Ok(core.game_turn),
            None => Err(SaveError::Parse("settings pass left no record".to_owned())),
        }
    }

    /// Grid dimensions `(width, height)` in plots.
    pub fn map_size(&mut self) -> Result<(i32, i32)> {
        self.ensure(ParseState::MapHeaderDone)?;
        match self.map.as_ref() {
            Some(m) => Ok((m.grid_width, m.grid_height)),
            None => Err(SaveError::Parse("map pass left no record".to_owned())),
        }
    }

    pub fn settings(&mut self) -> Result<&Settings> {
        self.ensure(ParseState::MapHeaderDone)?;
        if self.settings.is_none() {
            let (core, game, map) = self.decoded_records()?;
            self.settings = Some(Settings::project(core, game, map, &self.types));
        }
        match self.settings.as_ref() {
            Some(s) => Ok(s),
            None => Err(SaveError::Parse("settings projection failed".to_owned())),
        }
    }

    pub fn game_state(&mut self) -> Result<&GameState> {
        self.ensure(ParseState::MapHeaderDone)?;
        if self.game_state.is_none() {
            let (_, game, map) = self.decoded_records()?;
            self.game_state = Some(GameState::project(game, map, &self.types));
        }
        match self.game_state.as_ref() {
            Some(s) => Ok(s),
            None => Err(SaveError::Parse("game state projection failed".to_owned())),
        }
    }

    /// The fully reconstructed player roster, keyed by slot index. Runs the
    /// replay log the first time it is called.
    pub fn players(&mut self) -> Result<&BTreeMap<i32, Player>> {
        self.ensure(ParseState::GameDone)?;
        if self.players.is_none() {
            let core = match self.init_core.as_ref() {
                Some(c) => c,
                None => return Err(SaveError::Parse("settings pass left no record".to_owned())),
            };
            let game = match self.game.as_ref() {
                Some(g) => g,
                None => return Err(SaveError::Parse("game pass left no record".to_owned())),
            };
            let mut players = objects::initial_players(core, game, &self.ctx, &self.types);
            replay::apply_replay(&game.replay_messages, &mut players, &self.types)?;
            objects::apply_trade_deals(&game.deals, &mut players, &self.types);
            self.players = Some(players);
        }
        match self.players.as_ref() {
            Some(p) => Ok(p),
            None => Err(SaveError::Parse("player reconstruction failed".to_owned())),
        }
    }

    pub fn get_player(&mut self, idx: i32) -> Result<Option<&Player>> {
        Ok(self.players()?.get(&idx))
    }

    /// The verified plots in row-major order. Shorter than
    /// `width * height` when the parse is [`ParseState::Partial`].
    pub fn plots(&mut self) -> Result<&[PlotRecord]> {
        self.ensure(ParseState::Partial)?;
        match self.plot_scan.as_ref() {
            Some(scan) => Ok(&scan.plots),
            None => Err(SaveError::Parse("plot pass left no record".to_owned())),
        }
    }

    /// Domain view of the verified plots: the decoded records reduced to
    /// their summary fields, with type codes resolved to names.
    pub fn projected_plots(&mut self) -> Result<&[Plot]> {
        self.ensure(ParseState::Partial)?;
        if self.projected_plots.is_none() {
            let scan = match self.plot_scan.as_ref() {
                Some(scan) => scan,
                None => return Err(SaveError::Parse("plot pass left no record".to_owned())),
            };
            let projected = scan
                .plots
                .iter()
                .map(|p| Plot::project(p, &self.types))
                .collect();
            self.projected_plots = Some(projected);
        }
        match self.projected_plots.as_ref() {
            Some(p) => Ok(p),
            None => Err(SaveError::Parse("plot projection failed".to_owned())),
        }
    }

    /// Plot at grid coordinates, or `None` when out of range or past the
    /// point where a partial scan stopped.
    pub fn get_plot(&mut self, x: i32, y: i32) -> Result<Option<&PlotRecord>> {
        let (width, height) = self.map_size()?;
        if x < 0 || y < 0 || x >= width || y >= height {
            return Ok(None);
        }
        let idx = (y * width + x) as usize;
        Ok(self.plots()?.get(idx))
    }

    /// Diagnostics from a plot scan that stopped early.
    pub fn plot_diagnostics(&self) -> Option<&PlotDiagnostics> {
        self.plot_scan.as_ref().and_then(|s| s.diagnostics.as_ref())
    }

    /// Discard the plot scan so the next plot access re-runs it. All other
    /// decoded passes are kept.
    pub fn reset_plots(&mut self) {
        if self.state > ParseState::MapHeaderDone {
            self.plot_scan = None;
            self.projected_plots = None;
            self.state = ParseState::MapPlotsAttempted;
        }
    }

    fn decoded_records(&self) -> Result<(&InitCore, &GameBlock, &MapHeader)> {
        match (
            self.init_core.as_ref(),
            self.game.as_ref(),
            self.map.as_ref(),
        ) {
            (Some(core), Some(game), Some(map)) => Ok((core, game, map)),
            _ => Err(SaveError::Parse(
                "projection requested before decode passes".to_owned(),
            )),
        }
    }
}
