pub mod derive;

use log::{debug, trace};

use crate::CssDemoParser;
use crate::bit::BitStream;
use crate::entity::list::index_from_handle;
use crate::error::{WarningKind, invalid_data};
use crate::game_event::derive::{GameEvent, GameEventDescriptor, GameEventKey};
use crate::player::{AirStatus, FL_ONGROUND, KillRecord, MOVETYPE_LADDER, MidAir, PostCheck};
use crate::weapon::WeaponId;

const MAX_EVENT_NAME_LENGTH: usize = 32;

const STATE_OBSERVER_MODE: i32 = 6;
/// freezecam did not exist yet, later builds use 4
const OBS_MODE_IN_EYE: i32 = 3;
const NOSCOPE_FOV: i32 = 0;

/// time left on a flash at the moment of a kill for it to count as blind
const MIN_REMAINING_FLASH_TIME: f32 = 2.5;

#[derive(Debug, Default, GameEvent)]
#[game_event(name = "player_death")]
pub struct PlayerDeath {
    pub userid: Option<i32>,
    pub attacker: Option<i32>,
    pub weapon: Option<String>,
    pub headshot: bool,
    /// clientmod only
    pub penetrated: u8,
    /// clientmod only
    pub noscope: bool,
}

#[derive(Debug, Default, GameEvent)]
#[game_event(name = "player_disconnect")]
pub struct PlayerDisconnect {
    pub userid: Option<i32>,
}

#[derive(Debug, Default, GameEvent)]
#[game_event(name = "player_spawn")]
pub struct PlayerSpawn {
    pub userid: Option<i32>,
}

const ROUND_START: &str = "round_start";

fn read_event_descriptor(r: &mut BitStream) -> Result<GameEventDescriptor, std::io::Error> {
    let id = r.read_ubits(9);
    let Some(name) = r.read_string(MAX_EVENT_NAME_LENGTH) else {
        return Err(invalid_data("invalid event name in SVC_GameEventList"));
    };

    let mut keys = Vec::new();
    loop {
        let value_type = r.read_ubits(3) as u8;
        if value_type == 0 {
            break;
        }

        let Some(key) = r.read_string(MAX_EVENT_NAME_LENGTH) else {
            return Err(invalid_data("invalid event field name in SVC_GameEventList"));
        };

        keys.push(GameEventKey {
            name: key,
            value_type,
        });
    }

    Ok(GameEventDescriptor { id, name, keys })
}

impl CssDemoParser {
    #[cold]
    pub(super) fn handle_game_event_list(&mut self) -> Result<(), std::io::Error> {
        if self.game_events.is_some() {
            return Err(invalid_data("SVC_GameEventList second encounter"));
        }

        let r = &mut self.reader;
        let count = r.read_ubits(9) as usize;
        let bits = r.read_ubits(20) as u64;
        let mut data = r.fork_bits(bits);

        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(read_event_descriptor(&mut data)?);
        }

        debug!("{} game events announced", events.len());
        self.game_events = Some(events);

        Ok(())
    }

    pub(super) fn handle_game_event(&mut self) -> Result<(), std::io::Error> {
        let bits = self.reader.read_ubits(11) as u64;
        let mut data = self.reader.fork_bits(bits);

        let id = data.read_ubits(9);

        // an event id is its index in the event list
        let Some(descriptor) = self
            .game_events
            .as_ref()
            .and_then(|events| events.get(id as usize))
            .filter(|d| d.id == id)
        else {
            return Err(invalid_data("invalid game event ID"));
        };

        let values = descriptor.read_values(&mut data)?;
        let name = descriptor.name.as_str();

        trace!("game event {name} on tick {}", self.clock.tick);

        if name == PlayerDeath::NAME {
            // the roster may still be incomplete right at the start
            if self.clock.tick > (self.clock.tick_rate() as f32 * 0.5) as i32 {
                let event = PlayerDeath::from_values(descriptor, &values)?;
                self.handle_player_death(event)?;
            }
        } else if name == ROUND_START {
            self.handle_round_start()?;
        } else if name == PlayerDisconnect::NAME {
            let event = PlayerDisconnect::from_values(descriptor, &values)?;
            self.handle_player_disconnect(event);
        } else if name == PlayerSpawn::NAME && self.pov.is_pov {
            let event = PlayerSpawn::from_values(descriptor, &values)?;
            self.handle_player_spawn(event);
        }

        Ok(())
    }

    /// collects the frags of the round that just ended and resets the round state
    fn handle_round_start(&mut self) -> Result<(), std::io::Error> {
        self.find_round_frags()?;

        // players that left are only dropped once their frags were collected
        for user_id in std::mem::take(&mut self.expired_user_ids).into_iter().rev() {
            if let Some(i) = self.player_index_by_user_id(user_id) {
                self.players.remove(i);
            }
        }

        self.post_checks.clear();

        for player in &mut self.players {
            player.kills.clear();
        }

        Ok(())
    }

    fn handle_player_disconnect(&mut self, event: PlayerDisconnect) {
        // the roster may not know the player yet
        if let Some(i) = event.userid.and_then(|id| self.player_index_by_user_id(id)) {
            self.expire_player(i);
        }
    }

    fn handle_player_spawn(&mut self, event: PlayerSpawn) {
        if event.userid.is_some() && event.userid == self.pov.user_id {
            self.pov.dead = false;
        }
    }

    /// whether the dead recorder watches `attacker_user_id` in first person
    fn pov_spectates(&self, attacker_user_id: i32) -> Result<bool, std::io::Error> {
        let Some(pov_player) = self
            .pov
            .user_id
            .and_then(|id| self.find_player_by_user_id(id))
        else {
            return Err(invalid_data("POV player info not found in player death event"));
        };

        let Some(entity) = pov_player.entity_index.and_then(|i| self.entities.get(i)) else {
            return Err(invalid_data("POV player entity not found in player death event"));
        };

        if entity
            .prop_int("m_iPlayerState")
            .is_some_and(|state| state != STATE_OBSERVER_MODE)
        {
            return Ok(false);
        }

        let mode = entity
            .prop_int("m_iObserverMode")
            .unwrap_or(OBS_MODE_IN_EYE);

        let Some(target) = entity.prop_int("m_hObserverTarget") else {
            return Ok(false);
        };

        if mode != OBS_MODE_IN_EYE {
            return Ok(false);
        }

        Ok(index_from_handle(target)
            .and_then(|i| self.find_player_by_entity_index(i))
            .is_some_and(|p| p.user_id() == attacker_user_id))
    }

    fn handle_player_death(&mut self, event: PlayerDeath) -> Result<(), std::io::Error> {
        let tick = self.clock.tick;

        if self.pov.is_pov && self.pov.user_id.is_none() {
            self.warnings.add(WarningKind::PovPlayerNotFound, tick);
        }

        let weapon = WeaponId::from_alias(event.weapon.as_deref().unwrap_or("unknown"));

        let Some(victim) = event.userid.and_then(|id| self.player_index_by_user_id(id)) else {
            return Err(invalid_data("victim info not found in player death event"));
        };

        if self.pov.is_pov && Some(self.players[victim].user_id()) == self.pov.user_id {
            self.pov.dead = true;
        }

        // world kills and suicides are never frags
        let attacker = match event.attacker.and_then(|id| self.player_index_by_user_id(id)) {
            Some(attacker) if attacker != victim => attacker,
            _ => return Ok(()),
        };

        let attacker_user_id = self.players[attacker].user_id();
        let attacker_is_pov = Some(attacker_user_id) == self.pov.user_id;

        let spectating = if self.pov.dead && self.pov.is_pov && !attacker_is_pov {
            self.pov_spectates(attacker_user_id)?
        } else {
            false
        };

        // kills on POV demos count only if the recorder saw them
        if self.pov.is_pov && !attacker_is_pov && !spectating {
            return Ok(());
        }

        if self.players[victim].info.fake_player && !self.settings.tick_frags_vs_bots() {
            return Ok(());
        }

        let Some(attacker_entity) = self.players[attacker]
            .entity_index
            .and_then(|i| self.entities.get(i))
        else {
            return Err(invalid_data("Attacker entity not found in player death event"));
        };

        // the victim may have died before ever entering the PVS
        let victim_entity = self.players[victim]
            .entity_index
            .and_then(|i| self.entities.get(i));

        let Some(team) = attacker_entity.prop_int("m_iTeamNum") else {
            if !spectating {
                return Err(invalid_data(
                    "Attacker team prop not found in player death event",
                ));
            }

            // props of spectated players are not always complete
            self.warnings.add(WarningKind::SpecAttackerTeamNotFound, tick);
            return Ok(());
        };

        let mut teamkill = false;
        if let Some(victim_entity) = victim_entity {
            match victim_entity.prop_int("m_iTeamNum") {
                Some(victim_team) => teamkill = victim_team == team,
                None => self.warnings.add(WarningKind::VictimTeamNotFound, tick),
            }
        }

        let bullet_kill = weapon.uses_bullets();

        if bullet_kill
            && !self
                .post_checks
                .iter()
                .any(|c| c.user_id == attacker_user_id && c.kill_tick == tick)
        {
            self.post_checks.push(PostCheck {
                user_id: attacker_user_id,
                kill_tick: tick,
                flick_checked: false,
            });
        }

        let blind = if bullet_kill {
            let flash = self.players[attacker].flash;
            let since_flashed = self.clock.time_between_ticks(tick, flash.tick)?;
            flash.duration - since_flashed >= MIN_REMAINING_FLASH_TIME
        } else {
            false
        };

        // checked again once the following entity updates are read,
        // props of spectated players lag behind
        let mut midair = MidAir::Ground;
        if bullet_kill && !spectating {
            let flags = attacker_entity.prop_int("m_fFlags");

            if flags.is_some_and(|f| f & FL_ONGROUND == 0) {
                let went_up = self.players[attacker].air_status == AirStatus::WentUp;

                midair = if attacker_entity.prop_int("movetype") == Some(MOVETYPE_LADDER) {
                    MidAir::Ladder
                } else if went_up {
                    MidAir::InAir
                } else {
                    MidAir::Ground
                };
            }
        }

        let mut noscope = event.noscope;
        if !noscope && weapon.is_sniper() {
            // a sniper that never zoomed has no fov update yet
            noscope = attacker_entity
                .prop_int("m_iFOV")
                .is_none_or(|fov| fov == NOSCOPE_FOV);
        }

        let Some(origin) = attacker_entity.prop_vector("m_vecOrigin") else {
            return Err(invalid_data(
                "Attacker origin prop not found in player death event",
            ));
        };

        let mut distance = 0.0;
        if bullet_kill {
            if let Some(victim_entity) = victim_entity {
                let Some(victim_origin) = victim_entity.prop_vector("m_vecOrigin") else {
                    return Err(invalid_data("Victim origin prop not found in player death event"));
                };
                distance = origin.distance(&victim_origin);
            }
        }

        trace!(
            "kill by \"{}\" with {weapon} on tick {tick}",
            self.players[attacker].info.name
        );

        self.players[attacker].kills.push(KillRecord {
            tick,
            team,
            weapon,
            teamkill,
            headshot: event.headshot,
            noscope,
            midair,
            penetrated: event.penetrated != 0,
            flickshot: false,
            distance,
            flick_angle: 0.0,
            position: origin,
            spectated: spectating,
            blind,
        });

        Ok(())
    }
}
