use log::debug;

use crate::CssDemoParser;
use crate::bit::BitStream;
use crate::entity::sendtable::int_log2;
use crate::error::{WarningKind, invalid_data};

pub const NET_NOP: u32 = 0;
pub const NET_DISCONNECT: u32 = 1;
pub const NET_FILE: u32 = 2;
pub const NET_TICK: u32 = 3;
pub const NET_STRING_CMD: u32 = 4;
pub const NET_SET_CONVAR: u32 = 5;
pub const NET_SIGNON_STATE: u32 = 6;

pub const SVC_PRINT: u32 = 7;
pub const SVC_SERVER_INFO: u32 = 8;
pub const SVC_SEND_TABLE: u32 = 9;
pub const SVC_CLASS_INFO: u32 = 10;
pub const SVC_SET_PAUSE: u32 = 11;
pub const SVC_CREATE_STRING_TABLE: u32 = 12;
pub const SVC_UPDATE_STRING_TABLE: u32 = 13;
pub const SVC_VOICE_INIT: u32 = 14;
pub const SVC_VOICE_DATA: u32 = 15;
pub const SVC_SOUNDS: u32 = 17;
pub const SVC_SET_VIEW: u32 = 18;
pub const SVC_FIX_ANGLE: u32 = 19;
pub const SVC_CROSSHAIR_ANGLE: u32 = 20;
pub const SVC_BSP_DECAL: u32 = 21;
pub const SVC_USER_MESSAGE: u32 = 23;
pub const SVC_ENTITY_MESSAGE: u32 = 24;
pub const SVC_GAME_EVENT: u32 = 25;
pub const SVC_PACKET_ENTITIES: u32 = 26;
pub const SVC_TEMP_ENTITIES: u32 = 27;
pub const SVC_PREFETCH: u32 = 28;
pub const SVC_MENU: u32 = 29;
pub const SVC_GAME_EVENT_LIST: u32 = 30;
pub const SVC_GET_CVAR_VALUE: u32 = 31;

const MESSAGE_TYPE_BITS: u32 = 5;

/// size of the democmdinfo_t preceding every packet
pub const CMD_INFO_SIZE: usize = 76;

/// string table ids are one bit shorter on servers of unknown platform
const STRING_TABLE_INDEX_BITS: u32 = 5;
const STRING_TABLE_INDEX_BITS_OLD: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub protocol: i16,
    pub server_count: i32,
    pub is_hltv: bool,
    pub is_dedicated: bool,
    pub client_crc: i32,
    pub max_classes: i16,
    pub map_crc: i32,
    pub player_slot: u8,
    pub max_clients: u8,
    pub tick_interval: f32,
    /// 'w' or 'l', anything else is an older server
    pub platform: u8,
    pub game_directory: String,
    pub map_name: String,
    pub sky_name: String,
    pub host_name: String,
}

impl ServerInfo {
    pub fn read(r: &mut BitStream) -> ServerInfo {
        ServerInfo {
            protocol: r.read_i16(),
            server_count: r.read_i32(),
            is_hltv: r.read_bit(),
            is_dedicated: r.read_bit(),
            client_crc: r.read_i32(),
            max_classes: r.read_i16(),
            map_crc: r.read_i32(),
            player_slot: r.read_u8(),
            max_clients: r.read_u8(),
            tick_interval: r.read_f32(),
            platform: r.read_i8() as u8,
            game_directory: r.read_string_lossy(256),
            map_name: r.read_string_lossy(256),
            sky_name: r.read_string_lossy(256),
            host_name: r.read_string_lossy(256),
        }
    }

    #[inline]
    pub fn string_table_index_bits(&self) -> u32 {
        if self.platform == b'w' || self.platform == b'l' {
            STRING_TABLE_INDEX_BITS
        } else {
            STRING_TABLE_INDEX_BITS_OLD
        }
    }
}

/// advances past a message that carries nothing of interest,
/// returns false if `msg` is not such a message
fn skip_message(r: &mut BitStream, msg: u32) -> bool {
    match msg {
        NET_NOP => {}
        NET_DISCONNECT => {
            r.read_string_lossy(1024);
        }
        NET_FILE => {
            let _transfer_id = r.read_i32();
            r.read_string_lossy(1024);
            let _requested = r.read_bit();
        }
        NET_TICK => {
            let _tick = r.read_i32();
        }
        NET_STRING_CMD | SVC_PRINT => {
            r.read_string_lossy(1024);
        }
        NET_SET_CONVAR => {
            let count = r.read_u8();
            for _ in 0..count {
                r.read_string_lossy(256);
                r.read_string_lossy(256);
            }
        }
        NET_SIGNON_STATE => {
            let _state = r.read_u8();
            let _spawn_count = r.read_i32();
        }
        SVC_SEND_TABLE => {
            let _needs_decoder = r.read_bit();
            let bits = r.read_i16();
            r.skip_bits(bits.max(0) as u64);
        }
        SVC_CLASS_INFO => {
            let mut count = r.read_i16() as i32;
            let create_on_client = r.read_bit();

            if !create_on_client {
                while count > 0 {
                    count -= 1;
                    // the id width shrinks with the classes left
                    let _class_id = r.read_ubits(int_log2(count as u32) + 1);
                    r.read_string_lossy(256);
                    r.read_string_lossy(256);
                }
            }
        }
        SVC_SET_PAUSE => {
            let _paused = r.read_bit();
        }
        SVC_VOICE_INIT => {
            r.read_string_lossy(256);
            let _quality = r.read_u8();
        }
        SVC_VOICE_DATA => {
            let _client = r.read_u8();
            let bits = r.read_u16();
            r.skip_bits(bits as u64);
        }
        SVC_SOUNDS => {
            let reliable = r.read_bit();
            let bits = if reliable {
                r.read_u8() as u64
            } else {
                let _count = r.read_u8();
                r.read_u16() as u64
            };
            r.skip_bits(bits);
        }
        SVC_SET_VIEW => {
            let _entity = r.read_ubits(11);
        }
        SVC_FIX_ANGLE => {
            let _relative = r.read_bit();
            for _ in 0..3 {
                r.read_bit_angle(16);
            }
        }
        SVC_CROSSHAIR_ANGLE => {
            for _ in 0..3 {
                r.read_bit_angle(16);
            }
        }
        SVC_BSP_DECAL => {
            let _position = r.read_bit_vec3_coord();
            let _texture = r.read_ubits(9);
            if r.read_bit() {
                let _entity = r.read_ubits(11);
                let _model = r.read_ubits(11);
            }
            let _low_priority = r.read_bit();
        }
        SVC_USER_MESSAGE => {
            let _msg_type = r.read_u8();
            let bits = r.read_ubits(11);
            r.skip_bits(bits as u64);
        }
        SVC_ENTITY_MESSAGE => {
            let _entity = r.read_ubits(11);
            let _class_id = r.read_ubits(9);
            let bits = r.read_ubits(11);
            r.skip_bits(bits as u64);
        }
        SVC_TEMP_ENTITIES => {
            let _entries = r.read_u8();
            let bits = r.read_ubits(17);
            r.skip_bits(bits as u64);
        }
        SVC_PREFETCH => {
            let _sound = r.read_ubits(13);
        }
        SVC_MENU => {
            let _menu_type = r.read_i16();
            let bytes = r.read_u16();
            r.skip_bytes(bytes as usize);
        }
        SVC_GET_CVAR_VALUE => {
            let _cookie = r.read_i32();
            r.read_string_lossy(512);
        }
        _ => return false,
    }

    true
}

impl CssDemoParser {
    #[cold]
    fn handle_server_info(&mut self) -> Result<(), std::io::Error> {
        if self.server_info.is_some() {
            return Err(invalid_data("SVC_ServerInfo second encounter"));
        }

        let info = ServerInfo::read(&mut self.reader);

        self.max_clients = info.max_clients as usize;
        self.clock.set_tick_interval(info.tick_interval);
        self.pov.is_pov = !info.is_hltv;
        self.pov.slot = info.player_slot as i32;
        self.string_table_index_bits = info.string_table_index_bits();

        debug!(
            "{} demo of protocol {} on {}, {} tick, {} max clients, {} server \"{}\"",
            if info.is_hltv { "STV" } else { "POV" },
            info.protocol,
            info.map_name,
            self.clock.tick_rate(),
            info.max_clients,
            if info.is_dedicated { "dedicated" } else { "listen" },
            info.host_name
        );
        if !info.is_hltv {
            debug!("recorded from player slot {}", info.player_slot);
        }

        self.server_info = Some(info);

        Ok(())
    }

    /// reads one signon or packet command, the messages of the packet are
    /// read from their own stream so a faulty message can't desync the demo
    pub(super) fn handle_demo_packet(&mut self) -> Result<(), std::io::Error> {
        let s = &mut self.stream;

        s.skip_bytes(CMD_INFO_SIZE);
        let _seq_in = s.read_i32();
        let _seq_out = s.read_i32();
        let size = s.read_i32().max(0) as usize;

        self.reader = s.fork_bytes(size);

        while self.reader.bytes_read() < size {
            let msg = self.reader.read_ubits(MESSAGE_TYPE_BITS);
            if self.reader.is_overflowed() {
                return Err(invalid_data("invalid NET/SVC message type encountered"));
            }

            if skip_message(&mut self.reader, msg) {
                continue;
            }

            macro_rules! handle_message {
                ($(($mt:expr, $handler:ident)),*) => {
                    $(
                        if msg == $mt {
                            self.$handler()?;

                            continue;
                        }
                    )*
                };
            }

            handle_message!(
                (SVC_PACKET_ENTITIES, handle_packet_entities),
                (SVC_GAME_EVENT, handle_game_event),
                (SVC_UPDATE_STRING_TABLE, handle_update_string_table),
                (SVC_CREATE_STRING_TABLE, handle_create_string_table),
                (SVC_GAME_EVENT_LIST, handle_game_event_list),
                (SVC_SERVER_INFO, handle_server_info)
            );

            return Err(invalid_data("invalid NET/SVC message type encountered"));
        }

        // mid-air and flick state is settled once all entity updates are in
        self.run_post_checks()?;

        if self.reader.bytes_read() != size {
            self.warnings
                .add(WarningKind::ByteMismatch, self.clock.tick);
        }

        Ok(())
    }
}
