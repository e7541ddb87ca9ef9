use std::collections::VecDeque;

use bytes::Buf;

use crate::CssDemoParser;
use crate::bit::Vector3;
use crate::settings::Settings;
use crate::weapon::{WeaponCategory, WeaponId};

pub const MAX_PLAYER_NAME_LENGTH: usize = 32;
const SIGNED_GUID_LEN: usize = 32;
const MAX_CUSTOM_FILES: usize = 4;

pub const FL_ONGROUND: i32 = 1;
pub const MOVETYPE_LADDER: i32 = 9;

/// identity of a connected client as sent in the userinfo string table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub user_id: i32,
    pub guid: String,
    pub friends_id: u32,
    pub friends_name: String,
    pub fake_player: bool,
    pub is_hltv: bool,
    pub custom_files: [u32; MAX_CUSTOM_FILES],
    pub files_downloaded: u8,
}

fn read_c_string(buf: &mut &[u8], len: usize) -> String {
    let len = len.min(buf.len());
    let raw = &buf[..len];
    let end = raw.iter().position(|&c| c == 0).unwrap_or(len);
    let s = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(len);
    s
}

fn skip(buf: &mut &[u8], len: usize) {
    buf.advance(len.min(buf.len()));
}

impl PlayerInfo {
    /// decodes a player_info_t, fields past the end of a short blob stay zeroed
    pub fn parse(data: &[u8]) -> PlayerInfo {
        let mut buf = data;
        let mut info = PlayerInfo {
            name: read_c_string(&mut buf, MAX_PLAYER_NAME_LENGTH),
            ..Default::default()
        };

        if buf.remaining() >= 4 {
            info.user_id = buf.get_i32_le();
        }
        info.guid = read_c_string(&mut buf, SIGNED_GUID_LEN + 1);
        // aligned to 4 bytes
        skip(&mut buf, 3);

        if buf.remaining() >= 4 {
            info.friends_id = buf.get_u32_le();
        }
        info.friends_name = read_c_string(&mut buf, MAX_PLAYER_NAME_LENGTH);

        if buf.remaining() >= 2 {
            info.fake_player = buf.get_u8() != 0;
            info.is_hltv = buf.get_u8() != 0;
        }
        skip(&mut buf, 2);

        for file in info.custom_files.iter_mut() {
            if buf.remaining() >= 4 {
                *file = buf.get_u32_le();
            }
        }

        if buf.has_remaining() {
            info.files_downloaded = buf.get_u8();
        }

        info
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AirStatus {
    #[default]
    OnGround,
    /// the ground flag was dropped
    InAirStarted,
    /// the origin rose while the ground flag was dropped
    WentUp,
}

/// how the shooter stood when a kill was made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MidAir {
    #[default]
    Ground,
    InAir,
    Ladder,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewAngles {
    pub tick: i32,
    /// `None` if the axis was not updated on this tick
    pub pitch: Option<f32>,
    pub yaw: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashInfo {
    pub tick: i32,
    /// seconds
    pub duration: f32,
}

impl Default for FlashInfo {
    fn default() -> Self {
        Self {
            tick: -9999,
            duration: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillRecord {
    pub tick: i32,
    pub team: i32,
    pub weapon: WeaponId,
    pub teamkill: bool,
    pub headshot: bool,
    pub noscope: bool,
    pub midair: MidAir,
    pub penetrated: bool,
    pub flickshot: bool,
    pub distance: f32,
    pub flick_angle: f32,
    pub position: Vector3,
    /// seen by the recorder while spectating the attacker
    pub spectated: bool,
    pub blind: bool,
}

impl KillRecord {
    pub fn is_special(&self) -> bool {
        self.flickshot || self.midair != MidAir::Ground || self.noscope || self.penetrated || self.blind
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub info: PlayerInfo,
    /// entity slot, the string table entry + 1, `None` once disconnected
    pub entity_index: Option<usize>,
    pub air_status: AirStatus,
    pub last_z: f32,
    pub flash: FlashInfo,
    /// newest first
    pub view_angles: VecDeque<ViewAngles>,
    /// kills of the current round in tick order
    pub kills: Vec<KillRecord>,
}

impl Player {
    pub fn new(info: PlayerInfo, entity_index: usize) -> Self {
        Self {
            info,
            entity_index: Some(entity_index),
            air_status: AirStatus::OnGround,
            last_z: 0.0,
            flash: FlashInfo::default(),
            view_angles: VecDeque::new(),
            kills: Vec::new(),
        }
    }

    #[inline]
    pub fn user_id(&self) -> i32 {
        self.info.user_id
    }

    /// the angle sample for `tick`, dropping samples older than `flick_ticks`
    ///
    /// one sample past the window is kept, angles are not sent every tick
    /// so the start of a flick may lie between it and the next one
    pub fn angles_at(&mut self, tick: i32, flick_ticks: i32) -> &mut ViewAngles {
        if let Some(i) = self.view_angles.iter().position(|a| a.tick == tick) {
            return &mut self.view_angles[i];
        }

        if let Some(i) = self
            .view_angles
            .iter()
            .position(|a| tick - a.tick >= flick_ticks)
        {
            self.view_angles.truncate(i + 1);
        }

        self.view_angles.push_front(ViewAngles {
            tick,
            pitch: None,
            yaw: None,
        });
        &mut self.view_angles[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Pitch,
    Yaw,
}

struct AxisLimits {
    /// the threshold never goes below this
    min_angle: f32,
    /// nor above this
    max_angle: f32,
    base_angle: f32,
    log2_multiplier: f32,
}

impl Axis {
    fn limits(self) -> AxisLimits {
        match self {
            Axis::Pitch => AxisLimits {
                min_angle: 25.0,
                max_angle: 110.0,
                base_angle: 90.0,
                log2_multiplier: 6.0,
            },
            Axis::Yaw => AxisLimits {
                min_angle: 35.0,
                max_angle: 180.0,
                base_angle: 180.0,
                log2_multiplier: 17.0,
            },
        }
    }

    fn value(self, angles: &ViewAngles) -> Option<f32> {
        match self {
            Axis::Pitch => angles.pitch,
            Axis::Yaw => angles.yaw,
        }
    }

    /// the pitch axis moves in a smaller range, so its window is shorter
    fn window(self, flick_ticks: i32) -> i32 {
        match self {
            Axis::Pitch => (flick_ticks as f64 * 0.65).ceil() as i32,
            Axis::Yaw => flick_ticks,
        }
    }
}

/// smallest turn on `axis` that counts as a flick at `distance` units,
/// far targets need less turning
pub fn min_flick_angle(axis: Axis, distance: f32) -> f32 {
    let limits = axis.limits();
    let angle = limits.base_angle - (distance / 10.0).log2() * limits.log2_multiplier;

    if angle.is_nan() {
        return limits.max_angle;
    }
    angle.clamp(limits.min_angle, limits.max_angle)
}

/// sums the view turn on `axis` over the last `flick_ticks` ticks of `angles`
///
/// returns whether it is a flick and the signed amount turned
pub fn flick_on_axis(
    axis: Axis,
    flick_ticks: i32,
    distance: f32,
    angles: &VecDeque<ViewAngles>,
) -> (bool, f32) {
    // an axis that was not updated since keeps its last value
    let Some(mut prev) = angles.iter().find_map(|a| axis.value(a)) else {
        return (false, 0.0);
    };

    let max_ticks = axis.window(flick_ticks);
    let min_angle = min_flick_angle(axis, distance);

    let mut iter = angles.iter();
    let Some(newest) = iter.next() else {
        return (false, 0.0);
    };

    let mut total = 0.0f32;
    let mut last_tick = newest.tick;
    let mut ticks_checked = 0;

    for sample in iter {
        let tick_delta = last_tick - sample.tick;

        let Some(value) = axis.value(sample) else {
            ticks_checked += tick_delta;
            last_tick = sample.tick;
            continue;
        };

        let mut delta = prev - value;
        if delta > 180.0 {
            delta -= 360.0;
        } else if delta < -180.0 {
            delta += 360.0;
        }

        // only the part of the step inside the window counts
        if ticks_checked + tick_delta > max_ticks {
            let valid = max_ticks - ticks_checked;
            delta *= valid as f32 / tick_delta as f32;
        }

        total += delta;
        prev = value;
        ticks_checked += tick_delta;
        last_tick = sample.tick;

        if ticks_checked >= max_ticks {
            break;
        }
    }

    (total.abs() >= min_angle, total)
}

/// checks `kill` against the view angle history of its attacker
///
/// returns whether it is a flickshot and the amount turned on the last checked axis
pub fn kill_is_flickshot(
    angles: &VecDeque<ViewAngles>,
    kill: &KillRecord,
    settings: &Settings,
    tick_rate: i32,
) -> (bool, f32) {
    let category = kill.weapon.category();
    if category == WeaponCategory::Grenade {
        return (false, 0.0);
    }

    let duration_ms = settings.flickshot_duration(category);
    if duration_ms <= 0 {
        return (false, 0.0);
    }

    let flick_ticks = ticks_for_duration(tick_rate, duration_ms);

    let (flick, amount) = flick_on_axis(Axis::Yaw, flick_ticks, kill.distance, angles);
    if flick {
        return (true, amount);
    }

    flick_on_axis(Axis::Pitch, flick_ticks, kill.distance, angles)
}

#[inline]
pub fn ticks_for_duration(tick_rate: i32, duration_ms: i32) -> i32 {
    (tick_rate as f32 * (duration_ms as f32 / 1000.0)).ceil() as i32
}

/// a kill tick of a player whose classification needs the entity
/// updates that follow the death event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCheck {
    pub user_id: i32,
    pub kill_tick: i32,
    pub flick_checked: bool,
}

impl CssDemoParser {
    pub fn find_player_by_user_id(&self, user_id: i32) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id() == user_id)
    }

    pub(crate) fn player_index_by_user_id(&self, user_id: i32) -> Option<usize> {
        self.players.iter().position(|p| p.user_id() == user_id)
    }

    pub fn find_player_by_entity_index(&self, entity_index: usize) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.entity_index == Some(entity_index))
    }

    pub(crate) fn player_index_by_entity_index(&self, entity_index: usize) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.entity_index == Some(entity_index))
    }

    /// marks a player for removal at the next round start, after its frags were collected
    pub(crate) fn expire_player(&mut self, index: usize) {
        let player = &mut self.players[index];
        self.expired_user_ids.push(player.user_id());
        player.entity_index = None;
    }

    /// settles mid-air and flick state of recent kills once the entity
    /// updates of the kill tick have been read
    pub(crate) fn run_post_checks(&mut self) -> Result<(), std::io::Error> {
        let mut checks = std::mem::take(&mut self.post_checks);
        let mut result = Ok(());

        checks.retain_mut(|check| match self.post_check(check) {
            Ok(keep) => keep,
            Err(err) => {
                result = Err(err);
                false
            }
        });

        self.post_checks = checks;
        result
    }

    /// returns false once the check is settled
    fn post_check(&mut self, check: &mut PostCheck) -> Result<bool, std::io::Error> {
        let delta_time = self
            .clock
            .time_between_ticks(check.kill_tick, self.clock.tick)?
            .max(0.0);

        let Some(index) = self.player_index_by_user_id(check.user_id) else {
            return Ok(false);
        };

        let on_ground = {
            let entity_index = self.players[index].entity_index;
            let Some(entity) = entity_index.and_then(|i| self.entities.get(i)) else {
                return Ok(false);
            };

            entity
                .prop_int("m_fFlags")
                .is_none_or(|flags| flags & FL_ONGROUND != 0)
        };

        let tick_rate = self.clock.tick_rate();
        let settings = &self.settings;
        let player = &mut self.players[index];

        let mut midair_status = MidAir::Ground;
        let mut checked_midair = false;
        let mut flick: Option<(bool, f32)> = None;
        let mut min_air_time = -1.0f32;

        for k in (0..player.kills.len()).rev() {
            let kill = &player.kills[k];

            if kill.tick < check.kill_tick {
                break;
            }
            if kill.tick != check.kill_tick {
                continue;
            }

            let category = kill.weapon.category();
            if category == WeaponCategory::Grenade || category == WeaponCategory::Knife {
                continue;
            }

            if kill.midair != MidAir::Ground {
                min_air_time = settings.min_post_kill_air_time(category).max(0.0);
            }

            if checked_midair {
                player.kills[k].midair = midair_status;
            } else if kill.midair != MidAir::Ground && !kill.spectated {
                // a jumpshot never turns into a laddershot or back
                if !on_ground {
                    midair_status = kill.midair;
                }

                player.kills[k].midair = midair_status;
                checked_midair = true;
            }

            if check.flick_checked {
                continue;
            }

            match flick {
                Some((true, angle)) => {
                    let kill = &mut player.kills[k];
                    kill.flickshot = true;
                    kill.flick_angle = angle;
                }
                Some((false, _)) => {}
                None => {
                    let result =
                        kill_is_flickshot(&player.view_angles, &player.kills[k], settings, tick_rate);

                    let kill = &mut player.kills[k];
                    kill.flickshot = result.0;
                    kill.flick_angle = result.1;
                    flick = Some(result);
                }
            }
        }

        check.flick_checked = true;

        Ok(midair_status != MidAir::Ground && delta_time < min_air_time)
    }
}
