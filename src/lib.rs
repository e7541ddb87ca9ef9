pub mod bit;
pub mod clock;
pub mod entity;
pub mod error;
pub mod frag;
pub mod game_event;
pub mod header;
pub mod message;
pub mod player;
pub mod settings;
pub mod string_table;
pub mod weapon;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use log::{debug, info};

use crate::bit::BitStream;
use crate::clock::TickClock;
use crate::entity::list::EntityList;
use crate::entity::sendtable::SendTables;
use crate::error::{ParseFailure, WarningLog, invalid_data};
use crate::frag::Frag;
use crate::game_event::derive::GameEventDescriptor;
use crate::header::{DemoHeader, HEADER_SIZE, HeaderError};
use crate::message::ServerInfo;
use crate::player::{Player, PostCheck};
use crate::settings::Settings;
use crate::string_table::StringTable;

pub const DEM_SIGNON: u8 = 1;
pub const DEM_PACKET: u8 = 2;
pub const DEM_SYNCTICK: u8 = 3;
pub const DEM_CONSOLECMD: u8 = 4;
pub const DEM_USERCMD: u8 = 5;
pub const DEM_DATATABLES: u8 = 6;
pub const DEM_STOP: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Completed,
    /// stopped through the abort flag, the frags found so far are kept
    Aborted,
}

/// what is known about the recording client
#[derive(Debug, Clone, Default)]
pub struct PovState {
    /// false for SourceTV demos
    pub is_pov: bool,
    /// userinfo entry of the recorder
    pub slot: i32,
    pub user_id: Option<i32>,
    /// the recorder is dead and may be spectating
    pub dead: bool,
}

pub struct CssDemoParser {
    name: String,
    pub header: DemoHeader,

    /// the whole demo after the header
    stream: BitStream,
    /// the packet being read
    reader: BitStream,

    settings: Arc<Settings>,
    abort: Option<Arc<AtomicBool>>,

    pub clock: TickClock,
    server_info: Option<ServerInfo>,
    pub pov: PovState,

    game_events: Option<Vec<GameEventDescriptor>>,

    string_tables: Vec<StringTable>,
    string_table_index_bits: u32,

    send_tables: SendTables,
    pub entities: EntityList,
    max_clients: usize,

    players: Vec<Player>,
    /// players that left, removed at the next round start
    expired_user_ids: Vec<i32>,
    post_checks: Vec<PostCheck>,

    frags: Vec<Frag>,
    warnings: WarningLog,
}

impl CssDemoParser {
    /// reads a demo file and validates its header
    pub fn open(path: impl AsRef<Path>, settings: Arc<Settings>) -> Result<Self, HeaderError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let data = std::fs::read(path).map_err(|source| HeaderError::Open {
            name: name.clone(),
            source,
        })?;

        Self::new(name, Bytes::from(data), settings)
    }

    pub fn new(
        name: impl Into<String>,
        data: Bytes,
        settings: Arc<Settings>,
    ) -> Result<Self, HeaderError> {
        let header = DemoHeader::parse(&data)?;

        let mut stream = BitStream::new(data);
        stream.skip_bytes(HEADER_SIZE);

        let clock = TickClock::new(header.playback_ticks);

        Ok(CssDemoParser {
            name: name.into(),
            header,
            stream,
            reader: BitStream::new(Bytes::new()),
            settings,
            abort: None,
            clock,
            server_info: None,
            pov: PovState::default(),
            game_events: None,
            string_tables: Vec::with_capacity(16),
            string_table_index_bits: 5,
            send_tables: SendTables::default(),
            entities: EntityList::new(),
            max_clients: 0,
            players: Vec::with_capacity(32),
            expired_user_ids: Vec::new(),
            post_checks: Vec::new(),
            frags: Vec::new(),
            warnings: WarningLog::default(),
        })
    }

    /// the parse stops before the next command once `abort` is set
    pub fn set_abort_flag(&mut self, abort: Arc<AtomicBool>) {
        self.abort = Some(abort);
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    #[inline]
    pub fn tick(&self) -> i32 {
        self.clock.tick
    }

    #[inline]
    pub fn tick_rate(&self) -> i32 {
        self.clock.tick_rate()
    }

    #[inline]
    pub fn total_ticks(&self) -> i32 {
        self.clock.total_ticks
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn frags(&self) -> &[Frag] {
        &self.frags
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    fn is_aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|abort| abort.load(Ordering::Relaxed))
    }

    /// parses the whole demo, the frags of the round in progress are
    /// collected even if the parse fails
    pub fn parse(&mut self) -> Result<ParseStatus, ParseFailure> {
        let result = self.read_commands();

        // the demo may end mid-round
        let frags = self.find_round_frags();

        let status = result.map_err(|err| self.failure(err))?;
        frags.map_err(|err| self.failure(err))?;

        info!(
            "{}: {} frag(s) found, {} warning(s)",
            self.name,
            self.frags.len(),
            self.warnings.len()
        );

        Ok(status)
    }

    fn failure(&self, err: std::io::Error) -> ParseFailure {
        ParseFailure::new(err, self.clock.tick, self.clock.total_ticks)
    }

    fn read_commands(&mut self) -> Result<ParseStatus, std::io::Error> {
        while self.read_command()? {
            if self.is_aborted() {
                info!("{}: parsing aborted on tick {}", self.name, self.clock.tick);
                return Ok(ParseStatus::Aborted);
            }
        }

        Ok(ParseStatus::Completed)
    }

    #[cold]
    fn handle_sync_tick(&mut self) -> Result<(), std::io::Error> {
        if self.server_info.is_none() {
            return Err(invalid_data("SVC_ServerInfo not encountered by sync tick"));
        }

        debug!("synced on tick {}", self.clock.tick);

        Ok(())
    }

    fn handle_console_cmd(&mut self) -> Result<(), std::io::Error> {
        let size = self.stream.read_i32().max(0) as usize;
        self.stream.skip_bytes(size);

        Ok(())
    }

    fn handle_user_cmd(&mut self) -> Result<(), std::io::Error> {
        let _outgoing_sequence = self.stream.read_i32();
        let size = self.stream.read_i32().max(0) as usize;
        self.stream.skip_bytes(size);

        Ok(())
    }

    /// reads one top-level command, returns false once the demo stopped
    pub fn read_command(&mut self) -> Result<bool, std::io::Error> {
        let cmd = self.stream.read_u8();

        if !(DEM_SIGNON..=DEM_STOP).contains(&cmd) || self.stream.is_overflowed() {
            return Err(invalid_data("invalid cmd number"));
        }

        if cmd == DEM_STOP {
            return Ok(false);
        }

        self.clock.tick = self.stream.read_i32();

        macro_rules! handle_command {
            ($(($cmd:expr, $handler:ident)),*) => {
                $(
                    if cmd == $cmd {
                        self.$handler()?;

                        return Ok(true);
                    }
                )*
            };
        }

        handle_command!(
            (DEM_PACKET, handle_demo_packet),
            (DEM_SIGNON, handle_demo_packet),
            (DEM_SYNCTICK, handle_sync_tick),
            (DEM_CONSOLECMD, handle_console_cmd),
            (DEM_USERCMD, handle_user_cmd),
            (DEM_DATATABLES, handle_data_tables)
        );

        Ok(true)
    }
}
