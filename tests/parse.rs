use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bytes::{BufMut, Bytes};
use cssff::frag::MultiKillType;
use cssff::header::{DEMO_HEADER_ID, HEADER_SIZE, HeaderError};
use cssff::message::{
    SVC_CREATE_STRING_TABLE, SVC_GAME_EVENT, SVC_GAME_EVENT_LIST, SVC_PACKET_ENTITIES,
    SVC_SERVER_INFO,
};
use cssff::settings::Settings;
use cssff::{
    CssDemoParser, DEM_DATATABLES, DEM_PACKET, DEM_SIGNON, DEM_STOP, DEM_SYNCTICK, ParseStatus,
};

const ATTACKER_USER_ID: i32 = 10;
const KILL_TICK: i32 = 100;

/// little-endian bit buffer that keeps track of its exact length
#[derive(Default)]
struct Bits {
    data: Vec<u8>,
    len: u64,
}

impl Bits {
    fn push(&mut self, value: u64, bits: u32) -> &mut Self {
        for i in 0..bits {
            if self.len % 8 == 0 {
                self.data.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = self.data.len() - 1;
                self.data[last] |= 1 << (self.len % 8);
            }
            self.len += 1;
        }
        self
    }

    fn bit(&mut self, v: bool) -> &mut Self {
        self.push(v as u64, 1)
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.push(v as u64, 8)
    }

    fn i16(&mut self, v: i16) -> &mut Self {
        self.push(v as u16 as u64, 16)
    }

    fn i32(&mut self, v: i32) -> &mut Self {
        self.push(v as u32 as u64, 32)
    }

    fn f32(&mut self, v: f32) -> &mut Self {
        self.push(v.to_bits() as u64, 32)
    }

    fn bytes(&mut self, v: &[u8]) -> &mut Self {
        for &b in v {
            self.u8(b);
        }
        self
    }

    fn string(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    fn append(&mut self, other: &Bits) -> &mut Self {
        for i in 0..other.len {
            let bit = (other.data[(i / 8) as usize] >> (i % 8)) & 1;
            self.push(bit as u64, 1);
        }
        self
    }

    fn message(&mut self, msg: u32) -> &mut Self {
        self.push(msg as u64, 5)
    }
}

fn header() -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    buf.put_slice(DEMO_HEADER_ID);
    buf.put_i32_le(3);
    buf.put_i32_le(7);
    for name in ["server", "SourceTV", "de_dust2", "cstrike"] {
        let mut field = [0u8; 260];
        field[..name.len()].copy_from_slice(name.as_bytes());
        buf.put_slice(&field);
    }
    buf.put_f32_le(60.0);
    buf.put_i32_le(4000);
    buf.put_i32_le(3900);
    buf.put_i32_le(0);
    assert_eq!(buf.len(), HEADER_SIZE);
    buf
}

fn put_packet(demo: &mut Vec<u8>, cmd: u8, tick: i32, messages: &Bits) {
    demo.put_u8(cmd);
    demo.put_i32_le(tick);
    demo.put_slice(&[0u8; 76]);
    demo.put_i32_le(0);
    demo.put_i32_le(0);
    demo.put_i32_le(messages.data.len() as i32);
    demo.put_slice(&messages.data);
}

fn server_info(m: &mut Bits) {
    m.message(SVC_SERVER_INFO)
        .i16(7)
        .i32(1)
        .bit(true)
        .bit(true)
        .i32(0)
        .i16(1)
        .i32(0)
        .u8(0)
        .u8(8)
        .f32(0.015)
        .u8(b'l')
        .string("cstrike")
        .string("de_dust2")
        .string("sky_dust")
        .string("SourceTV");
}

fn player_info(name: &str, user_id: i32) -> Vec<u8> {
    let mut blob = vec![0u8; 129];
    blob[..name.len()].copy_from_slice(name.as_bytes());
    blob[32..36].copy_from_slice(&user_id.to_le_bytes());
    blob
}

/// the shooter in slot 0 and five victims after it
fn user_info_table(m: &mut Bits) {
    let players = std::iter::once(("shooter", ATTACKER_USER_ID))
        .chain((1..=5).map(|i| ("victim", ATTACKER_USER_ID + i)))
        .collect::<Vec<_>>();

    let mut entries = Bits::default();
    for (name, user_id) in &players {
        let blob = player_info(name, *user_id);
        entries
            .bit(true)
            .bit(true)
            .bit(false)
            .string(&user_id.to_string())
            .bit(true)
            .push(blob.len() as u64, 12)
            .bytes(&blob);
    }

    m.message(SVC_CREATE_STRING_TABLE)
        .string("userinfo")
        .i16(32)
        .push(players.len() as u64, 6)
        .push(entries.len, 20)
        .bit(false)
        .append(&entries);
}

fn game_event_list(m: &mut Bits) {
    let mut events = Bits::default();
    events
        .push(0, 9)
        .string("player_death")
        .push(4, 3)
        .string("userid")
        .push(4, 3)
        .string("attacker")
        .push(1, 3)
        .string("weapon")
        .push(6, 3)
        .string("headshot")
        .push(0, 3);
    events.push(1, 9).string("round_start").push(0, 3);

    m.message(SVC_GAME_EVENT_LIST)
        .push(2, 9)
        .push(events.len, 20)
        .append(&events);
}

/// one player class with a team and a plain float origin
fn data_tables() -> Bits {
    let mut t = Bits::default();
    t.bit(true).bit(false).string("DT_CSPlayer").push(2, 9);

    // m_iTeamNum, signed 6 bits
    t.push(0, 5).string("m_iTeamNum").push(0, 13);
    t.f32(0.0).f32(0.0).push(6, 6);

    // m_vecOrigin, unscaled floats
    t.push(2, 5).string("m_vecOrigin").push(1 << 2, 13);
    t.f32(0.0).f32(0.0).push(0, 6);

    t.bit(false);
    t.i16(1).i16(0).string("CCSPlayer").string("DT_CSPlayer");
    t
}

fn put_data_tables(demo: &mut Vec<u8>) {
    let tables = data_tables();
    demo.put_u8(DEM_DATATABLES);
    demo.put_i32_le(0);
    demo.put_i32_le(tables.data.len() as i32);
    demo.put_slice(&tables.data);
}

fn shooter_enters(m: &mut Bits) {
    let mut data = Bits::default();
    // index delta 1 in a 4 bit ubitvar, then enter PVS
    data.push(0, 2).push(1, 4);
    data.bit(false).bit(true);
    data.push(0, 1).push(1, 10);

    // prop 0, team 2
    data.bit(true).push(0, 2).push(0, 4).push(2, 6);
    // prop 1, origin
    data.bit(true).push(0, 2).push(0, 4);
    data.f32(100.0).f32(200.0).f32(64.0);
    data.bit(false);

    m.message(SVC_PACKET_ENTITIES)
        .push(64, 11)
        .bit(false)
        .push(0, 1)
        .push(1, 11)
        .push(data.len, 20)
        .bit(false)
        .append(&data);
}

fn death(m: &mut Bits, victim: i32, headshot: bool) {
    let mut data = Bits::default();
    data.push(0, 9)
        .i16(victim as i16)
        .i16(ATTACKER_USER_ID as i16)
        .string("ak47")
        .bit(headshot);

    m.message(SVC_GAME_EVENT).push(data.len, 11).append(&data);
}

fn signon(demo: &mut Vec<u8>) {
    let mut m = Bits::default();
    server_info(&mut m);
    user_info_table(&mut m);
    game_event_list(&mut m);
    put_packet(demo, DEM_SIGNON, 0, &m);

    put_data_tables(demo);

    demo.put_u8(DEM_SYNCTICK);
    demo.put_i32_le(0);
}

fn parser(demo: Vec<u8>) -> CssDemoParser {
    CssDemoParser::new("test.dem", Bytes::from(demo), Arc::new(Settings::default())).unwrap()
}

#[test]
fn empty_demo_completes() {
    let mut demo = header();
    signon(&mut demo);
    demo.put_u8(DEM_STOP);

    let mut p = parser(demo);
    assert_eq!(p.parse().unwrap(), ParseStatus::Completed);

    assert!(!p.pov.is_pov);
    assert_eq!(p.tick_rate(), 66);
    assert_eq!(p.players().len(), 6);
    assert_eq!(p.players()[0].info.name, "shooter");
    assert_eq!(p.players()[0].entity_index, Some(1));
    assert!(p.frags().is_empty());
    assert!(p.warnings().is_empty());
}

#[test]
fn data_tables_only_demo_completes() {
    let mut t = Bits::default();
    t.bit(true).bit(false).string("DT_Empty").push(0, 9);
    t.bit(false);
    t.i16(1).i16(0).string("CEmpty").string("DT_Empty");

    let mut demo = header();
    demo.put_u8(DEM_DATATABLES);
    demo.put_i32_le(0);
    demo.put_i32_le(t.data.len() as i32);
    demo.put_slice(&t.data);
    demo.put_u8(DEM_STOP);

    let mut p = parser(demo);
    assert_eq!(p.parse().unwrap(), ParseStatus::Completed);
    assert!(p.players().is_empty());
    assert!(p.frags().is_empty());
    assert!(p.warnings().is_empty());
}

#[test]
fn five_kills_on_one_tick() {
    let mut demo = header();
    signon(&mut demo);

    let mut m = Bits::default();
    shooter_enters(&mut m);
    for victim in 1..=5 {
        death(&mut m, ATTACKER_USER_ID + victim, victim % 2 == 0);
    }
    put_packet(&mut demo, DEM_PACKET, KILL_TICK, &m);
    demo.put_u8(DEM_STOP);

    let mut p = parser(demo);
    assert_eq!(p.parse().unwrap(), ParseStatus::Completed);

    let entity = p.entities.get(1).unwrap();
    assert_eq!(entity.prop_int("m_iTeamNum"), Some(2));
    assert_eq!(entity.prop_vector("m_vecOrigin").map(|v| v.z), Some(64.0));

    assert_eq!(p.frags().len(), 1);
    let frag = &p.frags()[0];
    assert_eq!(frag.player_name, "shooter");
    assert_eq!(frag.total_kills, 5);
    assert_eq!(frag.team, 2);
    assert!(!frag.spectated);
    assert_eq!(frag.multi_kill_type(), Some(MultiKillType::FiveK));
    assert_eq!(frag.multi_kill.as_ref().unwrap().headshots, 2);
    assert_eq!(frag.start_tick, Some(KILL_TICK));
    assert!(frag.to_string().contains("shooter"));
}

#[test]
fn kills_are_collected_per_round() {
    let mut demo = header();
    signon(&mut demo);

    let mut m = Bits::default();
    shooter_enters(&mut m);
    for victim in 1..=3 {
        death(&mut m, ATTACKER_USER_ID + victim, true);
    }
    put_packet(&mut demo, DEM_PACKET, KILL_TICK, &m);

    // the round ends before the last kill
    let mut m = Bits::default();
    m.message(SVC_GAME_EVENT).push(9, 11).push(1, 9);
    death(&mut m, ATTACKER_USER_ID + 4, true);
    put_packet(&mut demo, DEM_PACKET, KILL_TICK + 10, &m);
    demo.put_u8(DEM_STOP);

    let mut p = parser(demo);
    assert_eq!(p.parse().unwrap(), ParseStatus::Completed);

    // a lone plain kill is no frag
    assert_eq!(p.frags().len(), 1);
    assert_eq!(p.frags()[0].total_kills, 3);
    assert_eq!(p.frags()[0].multi_kill_type(), Some(MultiKillType::ThreeK));
    assert_eq!(p.players()[0].kills.len(), 1);
}

#[test]
fn abort_stops_after_the_current_command() {
    let mut demo = header();
    signon(&mut demo);
    demo.put_u8(DEM_STOP);

    let mut p = parser(demo);
    p.set_abort_flag(Arc::new(AtomicBool::new(true)));

    assert_eq!(p.parse().unwrap(), ParseStatus::Aborted);
    // the signon packet was read in full
    assert!(p.server_info().is_some());
    assert_eq!(p.players().len(), 6);
    assert!(p.frags().is_empty());
}

#[test]
fn sync_tick_needs_server_info() {
    let mut demo = header();
    demo.put_u8(DEM_SYNCTICK);
    demo.put_i32_le(0);
    demo.put_u8(DEM_STOP);

    let failure = parser(demo).parse().unwrap_err();
    assert_eq!(failure.message, "SVC_ServerInfo not encountered by sync tick");
    assert_eq!(failure.tick, 0);
    assert!(!failure.at_end_of_demo);
}

#[test]
fn unknown_command_is_fatal() {
    let mut demo = header();
    demo.put_u8(9);
    demo.put_i32_le(0);

    let failure = parser(demo).parse().unwrap_err();
    assert_eq!(failure.to_string(), "invalid cmd number on tick 0");
}

#[test]
fn truncated_demo_is_fatal() {
    let mut demo = header();
    signon(&mut demo);

    let failure = parser(demo).parse().unwrap_err();
    assert_eq!(failure.message, "invalid cmd number");
}

#[test]
fn bad_header_is_rejected() {
    let mut demo = header();
    demo[8] = 2;

    let err = CssDemoParser::new("bad.dem", Bytes::from(demo), Arc::new(Settings::default()))
        .err()
        .unwrap();
    assert!(matches!(err, HeaderError::DemoProtocol(2)));
}
