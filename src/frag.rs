use std::fmt::{self, Write};

use crate::CssDemoParser;
use crate::clock::TickClock;
use crate::player::{KillRecord, MidAir, Player};
use crate::settings::Settings;
use crate::weapon::{WeaponCategory, WeaponId};

pub const FL_KILL_DOUBLE: u16 = 1 << 0;
pub const FL_KILL_TRIPLE: u16 = 1 << 1;
pub const FL_KILL_QUADRO: u16 = 1 << 2;
pub const FL_KILL_PENTA: u16 = 1 << 3;
pub const FL_KILL_FLASHKILL: u16 = 1 << 4;
pub const FL_KILL_SMOKEKILL: u16 = 1 << 5;
pub const FL_KILL_MIDAIR: u16 = 1 << 6;
pub const FL_KILL_FLICKSHOT: u16 = 1 << 7;
pub const FL_KILL_NOSCOPE: u16 = 1 << 8;
pub const FL_KILL_WALLBANG: u16 = 1 << 9;
/// never ticked on its own
pub const FL_KILL_BLIND: u16 = 1 << 10;
pub const FL_KILL_LADDERSHOT: u16 = 1 << 11;

pub const MASK_COLLATS: u16 = 0xF;
pub const MASK_PROJECTILE_KILLS: u16 = 0x30;

const TEAM_T: i32 = 2;
const TEAM_CT: i32 = 3;

const NO_KILL_TICK: i32 = 999_999_999;

#[inline]
pub fn is_collat(type_flags: u16) -> bool {
    type_flags & MASK_COLLATS != 0
}

/// kills on one tick and weapon implied by the collat flag
fn collat_size(type_flags: u16) -> i32 {
    if type_flags & FL_KILL_DOUBLE != 0 {
        2
    } else if type_flags & FL_KILL_TRIPLE != 0 {
        3
    } else if type_flags & FL_KILL_QUADRO != 0 {
        4
    } else if type_flags & FL_KILL_PENTA != 0 {
        5
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MultiKillType {
    ThreeK = 3,
    FourK = 4,
    FiveK = 5,
}

impl MultiKillType {
    #[inline]
    pub fn kills(self) -> usize {
        self as usize
    }
}

/// a 1k or collat frag type, possibly done several times
#[derive(Debug, Clone, PartialEq)]
pub struct FragDescriptor {
    pub type_flags: u16,
    pub headshots: i32,
    pub teamkills: i32,
    /// how many times this frag type was done, "2 doubles"
    pub count: i32,
    pub weapon: WeaponId,
    /// only set for a single flickshot
    pub flick_angle: f32,
}

impl FragDescriptor {
    /// snaps to multiples of 180 within 20 degrees, otherwise to the nearest 10
    fn rounded_flick_angle(&self) -> i32 {
        const LEEWAY: f32 = 20.0;

        let mut angle = 180.0f32;
        while self.flick_angle >= angle - LEEWAY {
            if (self.flick_angle - angle).abs() <= LEEWAY {
                return (angle + 0.1) as i32;
            }
            angle += 180.0;
        }

        ((self.flick_angle.abs() + 5.0) as i32 / 10) * 10
    }

    pub fn describe(&self, write_hs: bool, write_weapon: bool) -> String {
        let mut s = String::new();
        if self.type_flags == 0 {
            return s;
        }

        // other fields don't matter for projectile kills
        for (flag, name) in [
            (FL_KILL_FLASHKILL, "flashkill"),
            (FL_KILL_SMOKEKILL, "smokekill"),
        ] {
            if self.type_flags & flag != 0 {
                if self.count > 1 {
                    let _ = write!(s, "{} {name}s", self.count);
                } else {
                    s.push_str(name);
                }
                return s;
            }
        }

        let collat = is_collat(self.type_flags);
        let all_headshots = self.headshots == self.count;

        if self.count > 1 {
            let _ = write!(s, "{} ", self.count);
        }

        if self.type_flags & FL_KILL_BLIND != 0 {
            s.push_str("flashed ");
        }

        if write_weapon && self.weapon != WeaponId::HeGrenade {
            let _ = write!(s, "{} ", self.weapon);
        }

        if !collat && self.teamkills == self.count {
            s.push_str("teamkill ");
        }

        if self.type_flags & FL_KILL_NOSCOPE != 0 {
            s.push_str("noscope ");
        }

        if self.type_flags & FL_KILL_FLICKSHOT != 0 {
            if self.count == 1 && self.flick_angle != 0.0 {
                let _ = write!(s, "{}° ", self.rounded_flick_angle());
            }

            // "headshot" follows
            if write_hs && !collat && all_headshots {
                s.push_str("flick ");
            } else {
                s.push_str("flickshot ");
            }
        }

        if self.type_flags & FL_KILL_MIDAIR != 0 {
            if self.type_flags & FL_KILL_WALLBANG == 0 && !collat && (!write_hs || !all_headshots) {
                s.push_str("mid-air kill ");
            } else {
                s.push_str("mid-air ");
            }
        } else if self.type_flags & FL_KILL_LADDERSHOT != 0 {
            s.push_str("laddershot ");
        }

        if self.type_flags & FL_KILL_WALLBANG != 0 {
            s.push_str("wallbang ");
        }

        // the last modifier ends the description unless "headshots" follows
        if self.count > 1 && !collat && (!write_hs || !all_headshots) {
            s.pop();
            s.push_str("s ");
        }

        if collat {
            let size = collat_size(self.type_flags);

            if self.weapon == WeaponId::HeGrenade {
                let _ = write!(s, "{size}k HE");
                s.push_str(if self.count > 1 { "'s " } else { " " });
            } else {
                s.push_str(match size {
                    2 => "double",
                    3 => "triple",
                    4 => "quadro",
                    _ => "penta",
                });
                s.push_str(if self.count > 1 { "s " } else { " " });
            }
        }

        if write_hs {
            if !collat && all_headshots {
                s.push_str(if self.count > 1 {
                    "headshots "
                } else {
                    "headshot "
                });
            } else if self.headshots > 0 {
                let _ = write!(s, "({}hs) ", self.headshots);
            }
        }

        if self.teamkills > 0 && (collat || self.teamkills != self.count) {
            let _ = write!(s, "({}tk) ", self.teamkills);
        }

        s.pop();
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadshotPrintMode {
    Sub,
    Main,
    Both,
}

/// a 3k, 4k or 5k, a frag holds at most one
#[derive(Debug, Clone, PartialEq)]
pub struct MultiKillDescriptor {
    pub kind: MultiKillType,
    pub headshots: i32,
    pub start_tick: i32,
    pub end_tick: i32,
    /// seconds
    pub length: f32,
    /// distinct weapons in kill order, flashes and smokes left out
    pub weapons: Vec<WeaponId>,
    /// collats and 1k frags done inside the multi-kill window
    pub sub_descriptors: Vec<FragDescriptor>,
}

impl MultiKillDescriptor {
    pub const MAX_WEAPONS: usize = 5;

    fn add_weapons(&mut self, weapons: &[WeaponId]) {
        for &weapon in weapons {
            if self.weapons.len() >= Self::MAX_WEAPONS {
                return;
            }

            if weapon == WeaponId::Flashbang || weapon == WeaponId::SmokeGrenade {
                continue;
            }

            if !self.weapons.contains(&weapon) {
                self.weapons.push(weapon);
            }
        }
    }

    fn headshot_print_mode(&self) -> HeadshotPrintMode {
        if self.headshots <= 0 || self.headshots == self.kind as i32 {
            return HeadshotPrintMode::Main;
        }

        let mut sub_headshots = 0;
        for sub in &self.sub_descriptors {
            // the enemy headshot count of a collat with teamkills is unknown
            if sub.teamkills > 0 && sub.headshots > 0 {
                if sub.teamkills == 1 && sub.headshots == 1 {
                    continue;
                }

                sub_headshots = -1;
                break;
            }

            sub_headshots += sub.headshots;
        }

        if sub_headshots == self.headshots {
            HeadshotPrintMode::Sub
        } else {
            HeadshotPrintMode::Both
        }
    }

    pub fn describe(&self) -> String {
        let mut s = format!("{}k ", self.kind as i32);

        let mode = self.headshot_print_mode();
        if self.headshots > 0 && mode != HeadshotPrintMode::Sub {
            let _ = write!(s, "({}hs) ", self.headshots);
        }

        let weapons = self
            .weapons
            .iter()
            .map(|w| w.display_name())
            .collect::<Vec<_>>();
        s.push_str(&weapons.join("/"));
        s.push(' ');

        if !self.sub_descriptors.is_empty() {
            s.push_str("with ");

            // descriptors were collected newest first
            let subs = self
                .sub_descriptors
                .iter()
                .rev()
                .map(|d| d.describe(mode != HeadshotPrintMode::Main, false))
                .collect::<Vec<_>>();
            s.push_str(&join_with_ampersand(&subs));
            s.push(' ');
        }

        let _ = write!(s, "in {:.2} seconds", self.length);
        s
    }
}

/// "a, b & c"
fn join_with_ampersand(parts: &[String]) -> String {
    let mut s = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            s.push_str(if i + 1 == parts.len() { " & " } else { ", " });
        }
        s.push_str(part);
    }
    s
}

/// kills of one tick and weapon that are described together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KillGroup {
    pub tick: i32,
    pub type_flags: u16,
    pub teamkills: i32,
    pub headshots: i32,
    pub weapon: WeaponId,
    pub distance: f32,
    pub flick_angle: f32,
    pub time_to_closest_kill: f32,
}

/// everything worth mentioning that one player did in a round
#[derive(Debug, Clone, PartialEq)]
pub struct Frag {
    pub player_name: String,
    pub multi_kill: Option<MultiKillDescriptor>,
    /// newest first
    pub descriptors: Vec<FragDescriptor>,
    pub start_tick: Option<i32>,
    /// enemy kills of the round
    pub total_kills: i32,
    pub team: i32,
    /// recorded while spectating the player
    pub spectated: bool,
    pub tick_rate: i32,
}

impl Frag {
    pub fn new(player_name: &str, total_kills: i32, team: i32, spectated: bool, tick_rate: i32) -> Self {
        Self {
            player_name: player_name.to_string(),
            multi_kill: None,
            descriptors: Vec::new(),
            start_tick: None,
            total_kills,
            team,
            spectated,
            tick_rate,
        }
    }

    #[inline]
    pub fn multi_kill_type(&self) -> Option<MultiKillType> {
        self.multi_kill.as_ref().map(|m| m.kind)
    }

    fn update_start_tick(&mut self, tick: i32) {
        self.start_tick = Some(self.start_tick.map_or(tick, |t| t.min(tick)));
    }

    /// records a multi-kill unless a better one is already held
    ///
    /// a bigger multi-kill replaces a smaller one, one of the same size
    /// only if it was done faster
    pub fn add_multi_kill(
        &mut self,
        kind: MultiKillType,
        weapons: &[WeaponId],
        start_tick: i32,
        end_tick: i32,
        length: f32,
        headshots: i32,
    ) -> bool {
        // all kills on one tick last no time at all
        let length = length.max(0.0);

        if let Some(existing) = &self.multi_kill {
            if existing.kind > kind || (existing.kind == kind && existing.length <= length) {
                return false;
            }
        }

        let mut descriptor = MultiKillDescriptor {
            kind,
            headshots,
            start_tick,
            end_tick,
            length,
            weapons: Vec::new(),
            sub_descriptors: Vec::new(),
        };
        descriptor.add_weapons(weapons);
        self.multi_kill = Some(descriptor);

        self.update_start_tick(start_tick);
        true
    }

    /// adds a collat or 1k frag, merging it with an earlier one of the same kind
    pub fn add_descriptor(&mut self, settings: &Settings, group: &KillGroup) {
        self.update_start_tick(group.tick);

        let in_multi_kill = self
            .multi_kill
            .as_ref()
            .is_some_and(|m| m.start_tick <= group.tick && group.tick <= m.end_tick);

        // everything inside a multi-kill window is part of the frag anyway
        if !in_multi_kill
            && !settings.should_tick_frag(
                group.type_flags,
                group.weapon.category(),
                group.distance,
                group.headshots,
                group.time_to_closest_kill,
            )
        {
            return;
        }

        let flags = group.type_flags;
        let search_flags = [
            MASK_COLLATS,
            MASK_PROJECTILE_KILLS,
            FL_KILL_MIDAIR,
            FL_KILL_LADDERSHOT,
            FL_KILL_FLICKSHOT,
            FL_KILL_WALLBANG,
            FL_KILL_NOSCOPE,
        ]
        .into_iter()
        .map(|mask| flags & mask)
        .find(|&f| f != 0)
        .unwrap_or(0);

        let descriptors = match self.multi_kill.as_mut() {
            Some(multi_kill) if in_multi_kill => &mut multi_kill.sub_descriptors,
            _ => &mut self.descriptors,
        };

        for existing in descriptors.iter_mut() {
            if existing.type_flags & search_flags == 0 {
                continue;
            }

            // 1k frags never strip collat flags
            if is_collat(existing.type_flags) && !is_collat(flags) {
                continue;
            }

            // weapons don't matter inside a multi-kill, apart from HE collats
            let same_kind = in_multi_kill
                && ((existing.weapon == WeaponId::HeGrenade) == (group.weapon == WeaponId::HeGrenade));

            if same_kind || existing.weapon == group.weapon {
                existing.count += 1;

                if is_collat(flags) {
                    existing.headshots = 0;
                } else {
                    existing.headshots += group.headshots;
                }

                existing.teamkills += group.teamkills;
                existing.flick_angle = 0.0;

                // keep only what all instances have in common
                if existing.type_flags != flags {
                    existing.type_flags &= search_flags;
                }
                return;
            }
        }

        descriptors.push(FragDescriptor {
            type_flags: flags,
            headshots: group.headshots,
            teamkills: group.teamkills,
            count: 1,
            weapon: group.weapon,
            flick_angle: group.flick_angle,
        });
    }

    pub fn is_valid(&self) -> bool {
        self.multi_kill.is_some() || !self.descriptors.is_empty()
    }

    /// enemy kills the descriptors account for
    fn implied_kill_count(&self) -> i32 {
        let mut kills = self.multi_kill_type().map_or(0, |k| k as i32);

        for d in &self.descriptors {
            let n = if is_collat(d.type_flags) {
                collat_size(d.type_flags)
            } else {
                1
            };
            kills += n - d.teamkills;
        }

        kills
    }

    fn team_name(&self) -> &'static str {
        match self.team {
            TEAM_T => "T",
            TEAM_CT => "CT",
            _ => "??",
        }
    }

    /// a tick a few seconds before the frag, on a round boundary
    pub fn rounded_tick(&self) -> i32 {
        let rate = self.tick_rate;
        let start = self.start_tick.unwrap_or(0);

        let seg_size = ((rate * 5 + 25) / 50) * 50;
        if seg_size <= 0 {
            return start.max(0);
        }

        let mut rounded = (start / seg_size) * seg_size;
        if start % seg_size < rate * 3 {
            rounded -= seg_size;
        }

        if rate > 100 && rounded % 100 != 0 {
            rounded += 100 - rounded % 100;
        }

        if rate >= 100 {
            if rounded % 1000 >= 900 {
                rounded += 1000 - rounded % 1000;
            } else if rounded % 1000 <= 100 {
                rounded -= rounded % 1000;
            }
        }

        rounded.max(0)
    }
}

impl fmt::Display for Frag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }

        write!(
            f,
            "Tick: {}    Player: {} ({}){}\nFrag: ",
            self.rounded_tick(),
            self.player_name,
            self.team_name(),
            if self.spectated { " (*SPEC*)" } else { "" }
        )?;

        let implied_kills = self.implied_kill_count();
        if self.total_kills > implied_kills {
            let word = if self.multi_kill.is_some() {
                "including"
            } else {
                "with"
            };
            write!(f, "{}k {word} ", self.total_kills)?;
        }

        if let Some(multi_kill) = &self.multi_kill {
            f.write_str(&multi_kill.describe())?;
            if !self.descriptors.is_empty() {
                f.write_str(" and ")?;
            }
        }

        let mut descriptions = self
            .descriptors
            .iter()
            .rev()
            .map(|d| d.describe(true, true))
            .collect::<Vec<_>>();

        if let Some(first) = descriptions.first_mut() {
            let capitalize = self.total_kills == implied_kills
                && self.multi_kill.is_none()
                && self.descriptors.last().is_some_and(|d| d.count == 1);

            if capitalize {
                if let Some(c) = first.chars().next() {
                    let upper = c.to_uppercase().collect::<String>();
                    first.replace_range(..c.len_utf8(), &upper);
                }
            }
        }

        f.write_str(&join_with_ampersand(&descriptions))?;
        f.write_str("\n\n\n")
    }
}

/// tries to record the multi-kill made of `kills[end - kind.kills()..end]`
fn try_add_multi_kill(
    frag: &mut Frag,
    kind: MultiKillType,
    kills: &[&KillRecord],
    end: usize,
    settings: &Settings,
    clock: &TickClock,
) -> Result<bool, std::io::Error> {
    if let Some(existing) = frag.multi_kill_type() {
        if existing == MultiKillType::FiveK && kind != MultiKillType::FiveK {
            return Ok(false);
        }
        if existing != MultiKillType::ThreeK && kind == MultiKillType::ThreeK {
            return Ok(false);
        }
    }

    let window = &kills[end - kind.kills()..end];
    let first = window[0];
    let start_tick = first.tick;
    let end_tick = window[window.len() - 1].tick;

    let frag_time = clock.time_between_ticks(start_tick, end_tick)?;

    let weapons = window
        .iter()
        .take(MultiKillDescriptor::MAX_WEAPONS)
        .map(|k| k.weapon)
        .collect::<Vec<_>>();
    let headshots = window.iter().filter(|k| k.headshot).count() as i32;
    let contains_special_kill = window.iter().any(|k| k.is_special());
    let farthest_distance = window
        .iter()
        .map(|k| k.position.distance(&first.position))
        .fold(-1.0f32, f32::max);

    if !settings.should_tick_multi_kill(
        kind,
        WeaponCategory::of_kills(&weapons),
        frag_time,
        farthest_distance,
        headshots,
        contains_special_kill,
    ) {
        return Ok(false);
    }

    Ok(frag.add_multi_kill(kind, &weapons, start_tick, end_tick, frag_time, headshots))
}

/// seconds to the nearest other enemy kill of the player, ignoring the rest of a collat
fn time_to_closest_kill(
    kills: &[KillRecord],
    index: usize,
    clock: &TickClock,
) -> Result<f32, std::io::Error> {
    let kill = &kills[index];
    let other =
        |k: &&KillRecord| !k.teamkill && !(k.tick == kill.tick && k.weapon == kill.weapon);

    let before = kills[..index].iter().rev().find(other).map(|k| k.tick);
    let after = kills[index + 1..].iter().find(other).map(|k| k.tick);

    let delta = |t: Option<i32>| t.map_or(NO_KILL_TICK, |t| (kill.tick - t).abs());

    let closest = if delta(before) < delta(after) {
        before
    } else {
        after
    };

    clock.time_between_ticks(kill.tick, closest.unwrap_or(NO_KILL_TICK))
}

/// collects the frag of one player's round, `None` if nothing qualified
pub fn find_player_frag(
    player: &Player,
    settings: &Settings,
    clock: &TickClock,
) -> Result<Option<Frag>, std::io::Error> {
    let kills = &player.kills;
    let Some(first) = kills.first() else {
        return Ok(None);
    };

    let enemy_kills = kills.iter().filter(|k| !k.teamkill).collect::<Vec<_>>();
    let spectated = kills.last().is_some_and(|k| k.spectated);

    let mut frag = Frag::new(
        &player.info.name,
        enemy_kills.len() as i32,
        first.team,
        spectated,
        clock.tick_rate(),
    );

    // multi-kills first, so 1k frags inside them end up as their sub descriptors
    for k in (3..=enemy_kills.len()).rev() {
        let mut added = false;

        if k >= 5 {
            added = try_add_multi_kill(&mut frag, MultiKillType::FiveK, &enemy_kills, k, settings, clock)?;
        }
        if k >= 4 && !added {
            added = try_add_multi_kill(&mut frag, MultiKillType::FourK, &enemy_kills, k, settings, clock)?;
        }
        if !added {
            try_add_multi_kill(&mut frag, MultiKillType::ThreeK, &enemy_kills, k, settings, clock)?;
        }
    }

    let mut k = kills.len();
    while k > 0 {
        k -= 1;

        let last = &kills[k];
        let time_to_closest = if last.penetrated {
            time_to_closest_kill(kills, k, clock)?
        } else {
            0.0
        };

        let mut kills_on_tick = 1;
        let mut teamkills = last.teamkill as i32;
        let mut headshots = last.headshot as i32;
        let mut longest_distance = last.distance;

        while k >= 1 && kills[k - 1].tick == last.tick && kills[k - 1].weapon == last.weapon {
            k -= 1;
            kills_on_tick += 1;

            let kill = &kills[k];
            teamkills += kill.teamkill as i32;
            headshots += kill.headshot as i32;
            longest_distance = longest_distance.max(kill.distance);
        }

        // every later kill of a collat has the penetrated flag, so the earliest one describes it
        let kill = &kills[k];
        let mut flags = match kills_on_tick {
            1 => 0,
            2 => FL_KILL_DOUBLE,
            3 => FL_KILL_TRIPLE,
            4 => FL_KILL_QUADRO,
            _ => FL_KILL_PENTA,
        };

        if kill.flickshot {
            flags |= FL_KILL_FLICKSHOT;
        }
        match kill.midair {
            MidAir::InAir => flags |= FL_KILL_MIDAIR,
            MidAir::Ladder => flags |= FL_KILL_LADDERSHOT,
            MidAir::Ground => {}
        }
        if kill.noscope {
            flags |= FL_KILL_NOSCOPE;
        }
        if kill.penetrated {
            flags |= FL_KILL_WALLBANG;
        }
        match kill.weapon {
            WeaponId::Flashbang => flags |= FL_KILL_FLASHKILL,
            WeaponId::SmokeGrenade => flags |= FL_KILL_SMOKEKILL,
            _ => {}
        }

        if flags == 0 {
            continue;
        }

        if kill.blind {
            flags |= FL_KILL_BLIND;
        }

        frag.add_descriptor(
            settings,
            &KillGroup {
                tick: kill.tick,
                type_flags: flags,
                teamkills,
                headshots,
                weapon: kill.weapon,
                distance: longest_distance,
                flick_angle: kill.flick_angle,
                time_to_closest_kill: time_to_closest,
            },
        );
    }

    Ok(frag.is_valid().then_some(frag))
}

impl CssDemoParser {
    /// turns the kills of the finished round into frags
    pub(crate) fn find_round_frags(&mut self) -> Result<(), std::io::Error> {
        for player in &self.players {
            if player.info.is_hltv || player.kills.is_empty() {
                continue;
            }

            if let Some(frag) = find_player_frag(player, &self.settings, &self.clock)? {
                self.frags.push(frag);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit::Vector3;
    use crate::player::PlayerInfo;

    fn kill(tick: i32, weapon: WeaponId) -> KillRecord {
        KillRecord {
            tick,
            team: TEAM_T,
            weapon,
            teamkill: false,
            headshot: false,
            noscope: false,
            midair: MidAir::Ground,
            penetrated: false,
            flickshot: false,
            distance: 500.0,
            flick_angle: 0.0,
            position: Vector3::default(),
            spectated: false,
            blind: false,
        }
    }

    fn player(kills: Vec<KillRecord>) -> Player {
        let mut player = Player::new(
            PlayerInfo {
                name: "fragga".into(),
                user_id: 2,
                ..Default::default()
            },
            1,
        );
        player.kills = kills;
        player
    }

    fn descriptor(type_flags: u16, count: i32, headshots: i32, weapon: WeaponId) -> FragDescriptor {
        FragDescriptor {
            type_flags,
            headshots,
            teamkills: 0,
            count,
            weapon,
            flick_angle: 0.0,
        }
    }

    fn clock() -> TickClock {
        TickClock::with_tick_interval(0.01)
    }

    #[test]
    fn descriptor_text() {
        use WeaponId::*;

        let cases = [
            (descriptor(FL_KILL_DOUBLE, 1, 0, Ak47), "AK47 double"),
            (descriptor(FL_KILL_DOUBLE, 2, 0, Awp), "2 AWP doubles"),
            (descriptor(FL_KILL_TRIPLE, 1, 0, HeGrenade), "3k HE"),
            (descriptor(FL_KILL_DOUBLE, 2, 0, HeGrenade), "2 2k HE's"),
            (descriptor(FL_KILL_WALLBANG, 1, 1, Deagle), "deagle wallbang headshot"),
            (descriptor(FL_KILL_WALLBANG, 2, 1, Deagle), "2 deagle wallbangs (1hs)"),
            (descriptor(FL_KILL_MIDAIR, 1, 0, Usp), "USP mid-air kill"),
            (descriptor(FL_KILL_MIDAIR, 1, 1, Usp), "USP mid-air headshot"),
            (descriptor(FL_KILL_LADDERSHOT, 1, 0, Mp5Navy), "MP5 laddershot"),
            (descriptor(FL_KILL_NOSCOPE, 3, 0, Awp), "3 AWP noscopes"),
            (descriptor(FL_KILL_FLASHKILL, 1, 0, Flashbang), "flashkill"),
            (descriptor(FL_KILL_SMOKEKILL, 2, 0, SmokeGrenade), "2 smokekills"),
            (
                descriptor(FL_KILL_DOUBLE | FL_KILL_WALLBANG | FL_KILL_BLIND, 1, 2, Scout),
                "flashed scout wallbang double (2hs)",
            ),
        ];

        for (d, text) in cases {
            assert_eq!(d.describe(true, true), text);
        }

        let mut teamkill = descriptor(FL_KILL_WALLBANG, 1, 0, Ak47);
        teamkill.teamkills = 1;
        assert_eq!(teamkill.describe(true, true), "AK47 teamkill wallbang");

        let mut collat_tk = descriptor(FL_KILL_DOUBLE, 1, 0, Ak47);
        collat_tk.teamkills = 1;
        assert_eq!(collat_tk.describe(true, true), "AK47 double (1tk)");

        // without weapon or headshot info inside multi-kills
        assert_eq!(
            descriptor(FL_KILL_WALLBANG, 1, 1, Deagle).describe(false, false),
            "wallbang"
        );
    }

    #[test]
    fn flick_text_and_angle() {
        let mut d = descriptor(FL_KILL_FLICKSHOT, 1, 1, WeaponId::Ak47);
        d.flick_angle = 172.0;
        assert_eq!(d.describe(true, true), "AK47 180° flick headshot");

        d.headshots = 0;
        d.flick_angle = 74.0;
        assert_eq!(d.describe(true, true), "AK47 70° flickshot");

        d.flick_angle = -76.0;
        assert_eq!(d.rounded_flick_angle(), 80);

        d.flick_angle = 345.0;
        assert_eq!(d.rounded_flick_angle(), 360);

        // no angle on repeated flicks
        d.count = 2;
        d.flick_angle = 0.0;
        assert_eq!(d.describe(true, true), "2 AK47 flickshots");
    }

    #[test]
    fn multi_kill_ranking() {
        let mut frag = Frag::new("a", 5, TEAM_CT, false, 100);
        let weapons = [WeaponId::Ak47; 4];

        assert!(frag.add_multi_kill(MultiKillType::FourK, &weapons, 100, 400, 3.0, 0));
        assert!(!frag.add_multi_kill(MultiKillType::ThreeK, &weapons[..3], 100, 200, 1.0, 0));
        assert!(!frag.add_multi_kill(MultiKillType::FourK, &weapons, 100, 500, 4.0, 0));
        assert!(frag.add_multi_kill(MultiKillType::FourK, &weapons, 200, 400, 2.0, 0));
        assert!(frag.add_multi_kill(
            MultiKillType::FiveK,
            &[WeaponId::Ak47; 5],
            100,
            600,
            5.0,
            0
        ));
        assert!(!frag.add_multi_kill(MultiKillType::FourK, &weapons, 100, 200, 1.0, 0));

        assert_eq!(frag.multi_kill_type(), Some(MultiKillType::FiveK));
        assert_eq!(frag.start_tick, Some(100));
        assert_eq!(frag.multi_kill.as_ref().map(|m| m.weapons.len()), Some(1));
    }

    #[test]
    fn multi_kill_weapons_are_distinct() {
        use WeaponId::*;

        let mut frag = Frag::new("a", 5, TEAM_CT, false, 100);
        frag.add_multi_kill(
            MultiKillType::FiveK,
            &[Deagle, Flashbang, Ak47, Deagle, HeGrenade],
            0,
            100,
            1.0,
            0,
        );

        let multi_kill = frag.multi_kill.unwrap();
        assert_eq!(multi_kill.weapons, vec![Deagle, Ak47, HeGrenade]);
        assert_eq!(multi_kill.describe(), "5k deagle/AK47/hegrenade in 1.00 seconds");
    }

    #[test]
    fn multi_kill_with_sub_descriptors() {
        let mut multi_kill = MultiKillDescriptor {
            kind: MultiKillType::FourK,
            headshots: 3,
            start_tick: 0,
            end_tick: 300,
            length: 3.0,
            weapons: vec![WeaponId::Ak47],
            sub_descriptors: vec![
                descriptor(FL_KILL_WALLBANG, 1, 1, WeaponId::Ak47),
                descriptor(FL_KILL_DOUBLE, 1, 2, WeaponId::Ak47),
            ],
        };

        // headshots are all inside the sub descriptors
        assert_eq!(
            multi_kill.describe(),
            "4k AK47 with double (2hs) & wallbang headshot in 3.00 seconds"
        );

        multi_kill.headshots = 4;
        assert_eq!(
            multi_kill.describe(),
            "4k (4hs) AK47 with double & wallbang in 3.00 seconds"
        );
    }

    #[test]
    fn rounded_ticks() {
        let mut frag = Frag::new("a", 1, TEAM_T, false, 66);

        // 66 tick: segments of 350, at least 198 ticks of lead in
        frag.start_tick = Some(1000);
        assert_eq!(frag.rounded_tick(), 700);
        frag.start_tick = Some(1300);
        assert_eq!(frag.rounded_tick(), 1050);
        frag.start_tick = Some(100);
        assert_eq!(frag.rounded_tick(), 0);

        // 100 tick: segments of 500, snapped to thousands near them
        frag.tick_rate = 100;
        frag.start_tick = Some(10_450);
        assert_eq!(frag.rounded_tick(), 10_000);
        frag.start_tick = Some(10_200);
        assert_eq!(frag.rounded_tick(), 9500);
        frag.start_tick = Some(11_600);
        assert_eq!(frag.rounded_tick(), 11_000);
    }

    #[test]
    fn collats_merge_into_descriptors() {
        let mut first = kill(200, WeaponId::Awp);
        first.headshot = true;
        let mut second = kill(200, WeaponId::Awp);
        second.penetrated = true;
        let lone = kill(900, WeaponId::Deagle);

        let frag = find_player_frag(&player(vec![first, second, lone]), &Settings::default(), &clock())
            .unwrap()
            .unwrap();

        assert!(frag.multi_kill.is_none());
        assert_eq!(frag.descriptors, vec![descriptor(FL_KILL_DOUBLE, 1, 1, WeaponId::Awp)]);
        assert_eq!(frag.start_tick, Some(200));
        assert_eq!(
            frag.to_string(),
            "Tick: 0    Player: fragga (T)\nFrag: 3k with AWP double (1hs)\n\n\n"
        );
    }

    #[test]
    fn closest_kill_skips_same_collat_and_teamkills() {
        let mut tk = kill(150, WeaponId::Ak47);
        tk.teamkill = true;
        let kills = vec![
            kill(100, WeaponId::Ak47),
            tk,
            kill(300, WeaponId::Ak47),
            kill(300, WeaponId::Ak47),
            kill(350, WeaponId::Ak47),
        ];

        let t = time_to_closest_kill(&kills, 2, &clock()).unwrap();
        assert!((t - 0.5).abs() < 1e-5);

        let t = time_to_closest_kill(&kills, 0, &clock()).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn nothing_special_is_no_frag() {
        let kills = vec![kill(100, WeaponId::Ak47), kill(5000, WeaponId::Ak47)];
        assert!(
            find_player_frag(&player(kills), &Settings::default(), &clock())
                .unwrap()
                .is_none()
        );
        assert!(
            find_player_frag(&player(Vec::new()), &Settings::default(), &clock())
                .unwrap()
                .is_none()
        );
    }
}
