pub mod decoder;
pub mod list;
pub mod sendtable;

use log::{debug, trace};
use phf::phf_map;

use crate::{
    CssDemoParser,
    bit::BitStream,
    entity::{
        decoder::{PropValue, decode_prop},
        list::{EntityItem, SERIAL_NUMBER_BITS},
        sendtable::SendTables,
    },
    error::{WarningKind, invalid_data},
    player::{AirStatus, FL_ONGROUND, Player},
};

/// height gained after leaving the ground that counts as a jump,
/// POV demos have exact origins so the bar is lower
const POV_JUMP_HEIGHT: f32 = 2.5;
const HLTV_JUMP_HEIGHT: f32 = 7.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateType {
    EnterPvs,
    LeavePvs { delete: bool },
    Delta,
}

/// player props that feed state the frag finder keeps outside the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropIntercept {
    Pitch,
    Yaw,
    FlashDuration,
    Flags,
    Origin,
}

static PROP_INTERCEPTS: phf::Map<&'static str, PropIntercept> = phf_map! {
    "m_angEyeAngles[0]" => PropIntercept::Pitch,
    "m_angEyeAngles[1]" => PropIntercept::Yaw,
    "m_flFlashDuration" => PropIntercept::FlashDuration,
    "m_fFlags" => PropIntercept::Flags,
    "m_vecOrigin" => PropIntercept::Origin,
};

impl UpdateType {
    /// leave PVS flag, then either the enter PVS or the delete flag
    fn read(r: &mut BitStream) -> UpdateType {
        if !r.read_bit() {
            if r.read_bit() {
                UpdateType::EnterPvs
            } else {
                UpdateType::Delta
            }
        } else {
            UpdateType::LeavePvs {
                delete: r.read_bit(),
            }
        }
    }
}

struct InterceptContext {
    tick: i32,
    /// how many ticks of view angles a flick check may look back
    flick_ticks: i32,
    is_pov: bool,
}

fn apply_intercept(
    player: &mut Player,
    intercept: PropIntercept,
    value: &PropValue,
    ctx: &InterceptContext,
) {
    match intercept {
        PropIntercept::Pitch => {
            player.angles_at(ctx.tick, ctx.flick_ticks).pitch = value.as_float();
        }
        PropIntercept::Yaw => {
            player.angles_at(ctx.tick, ctx.flick_ticks).yaw = value.as_float();
        }
        PropIntercept::FlashDuration => {
            player.flash.tick = ctx.tick;
            player.flash.duration = value.as_float().unwrap_or_default();
        }
        PropIntercept::Flags => {
            let flags = value.as_int().unwrap_or_default();

            if flags & FL_ONGROUND == 0 {
                if player.air_status == AirStatus::OnGround {
                    player.air_status = AirStatus::InAirStarted;
                }
            } else {
                player.air_status = AirStatus::OnGround;
            }
        }
        PropIntercept::Origin => {
            let Some(origin) = value.as_vector() else {
                return;
            };

            let jump_height = if ctx.is_pov {
                POV_JUMP_HEIGHT
            } else {
                HLTV_JUMP_HEIGHT
            };

            if player.air_status == AirStatus::InAirStarted && origin.z > player.last_z + jump_height
            {
                player.air_status = AirStatus::WentUp;
            }

            player.last_z = origin.z;
        }
    }
}

impl CssDemoParser {
    #[cold]
    pub(super) fn handle_data_tables(&mut self) -> Result<(), std::io::Error> {
        let size = self.stream.read_i32().max(0) as usize;
        let mut data = self.stream.fork_bytes(size);

        let send_tables = SendTables::parse(&mut data)?;

        debug!(
            "{} send tables, {} server classes",
            send_tables.tables.len(),
            send_tables.classes.len()
        );

        self.send_tables = send_tables;

        Ok(())
    }

    pub(super) fn handle_packet_entities(&mut self) -> Result<(), std::io::Error> {
        let r = &mut self.reader;

        let _max_entries = r.read_ubits(11);
        let is_delta = r.read_bit();
        if is_delta {
            let _delta_from = r.read_i32();
        }
        let _baseline = r.read_ubits(1);
        let updated_entries = r.read_ubits(11);
        let bits = r.read_ubits(20) as u64;
        let _update_baseline = r.read_bit();

        let mut data = r.fork_bits(bits);

        self.read_packet_entities(&mut data, updated_entries, is_delta)
    }

    fn read_packet_entities(
        &mut self,
        r: &mut BitStream,
        updated_entries: u32,
        is_delta: bool,
    ) -> Result<(), std::io::Error> {
        let mut header_base: i64 = -1;

        for _ in 0..updated_entries {
            let index = header_base + 1 + r.read_ubit_var() as i64;
            header_base = index;

            // indices ascend, nothing past the players is of interest
            if index > self.max_clients as i64 {
                return Ok(());
            }

            let index = index as usize;

            match UpdateType::read(r) {
                UpdateType::EnterPvs => {
                    let class_id = r.read_ubits(self.send_tables.class_bits);
                    let serial = r.read_ubits(SERIAL_NUMBER_BITS);

                    if self.send_tables.class(class_id as usize).is_none() {
                        return Err(invalid_data("invalid server class id"));
                    }

                    match self.entities.get_mut(index) {
                        Some(entity) => {
                            // a new serial is a different entity in the same slot
                            if entity.serial != serial || entity.class_id != class_id {
                                entity.props.clear();
                            }
                            entity.class_id = class_id;
                            entity.serial = serial;
                        }
                        None => {
                            self.entities
                                .insert(EntityItem::new(index as u32, class_id, serial));
                        }
                    }

                    trace!("entity {index} entered with class {class_id}");

                    self.read_entity_props(r, index)?;
                }
                UpdateType::LeavePvs { delete } => {
                    if !is_delta {
                        return Err(invalid_data("leave PVS on full update"));
                    }

                    if delete {
                        self.entities.delete(index);
                    }
                }
                UpdateType::Delta => {
                    if self.entities.get(index).is_none() {
                        return Err(invalid_data("entity not found on delta entity"));
                    }

                    self.read_entity_props(r, index)?;
                }
            }
        }

        Ok(())
    }

    /// applies the changed props of one entity, announced as ascending index deltas
    fn read_entity_props(
        &mut self,
        r: &mut BitStream,
        entity_index: usize,
    ) -> Result<(), std::io::Error> {
        let Some(class_id) = self.entities.get(entity_index).map(|e| e.class_id) else {
            return Err(invalid_data("error reading entity"));
        };

        let send_tables = &self.send_tables;
        let Some(class) = send_tables.class(class_id as usize) else {
            return Err(invalid_data("invalid server class id"));
        };

        let ctx = InterceptContext {
            tick: self.clock.tick,
            flick_ticks: self
                .clock
                .ticks_for_duration(self.settings.max_flickshot_duration()),
            is_pov: self.pov.is_pov,
        };

        let mut prop_index: i64 = -1;

        while r.read_bit() {
            prop_index += r.read_ubit_var() as i64 + 1;

            let Some(fp) = class.props.get(prop_index as usize) else {
                return Err(invalid_data("error reading entity"));
            };

            let prop = send_tables.flattened(fp);
            let element = fp.element.map(|e| send_tables.prop(fp.table, e));

            let decoded = decode_prop(r, prop, element)?;
            if decoded.truncated {
                self.warnings.add(WarningKind::InvalidStringLength, ctx.tick);
            }

            if let Some(&intercept) = PROP_INTERCEPTS.get(&*prop.name) {
                // props of an entity no player claims yet are only stored
                if let Some(player) = self
                    .players
                    .iter_mut()
                    .find(|p| p.entity_index == Some(entity_index))
                {
                    apply_intercept(player, intercept, &decoded.value, &ctx);
                }
            }

            if let Some(entity) = self.entities.get_mut(entity_index) {
                entity.props.insert(prop.name.clone(), decoded.value);
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

    fn player() -> Player {
        Player::new(
            PlayerInfo {
                name: "jumper".into(),
                user_id: 2,
                ..Default::default()
            },
            1,
        )
    }

    fn ctx(tick: i32, is_pov: bool) -> InterceptContext {
        InterceptContext {
            tick,
            flick_ticks: 10,
            is_pov,
        }
    }

    fn origin(z: f32) -> PropValue {
        PropValue::Vector(Vector3::new(0.0, 0.0, z))
    }

    #[test]
    fn jump_needs_height_gain() {
        let mut p = player();
        apply_intercept(&mut p, PropIntercept::Origin, &origin(64.0), &ctx(1, false));
        apply_intercept(&mut p, PropIntercept::Flags, &PropValue::Int(0), &ctx(2, false));
        assert_eq!(p.air_status, AirStatus::InAirStarted);

        // falling off a ledge
        apply_intercept(&mut p, PropIntercept::Origin, &origin(60.0), &ctx(3, false));
        assert_eq!(p.air_status, AirStatus::InAirStarted);

        apply_intercept(&mut p, PropIntercept::Origin, &origin(70.0), &ctx(4, false));
        assert_eq!(p.air_status, AirStatus::WentUp);

        // still airborne, the jump is remembered
        apply_intercept(&mut p, PropIntercept::Flags, &PropValue::Int(0), &ctx(5, false));
        assert_eq!(p.air_status, AirStatus::WentUp);

        apply_intercept(&mut p, PropIntercept::Flags, &PropValue::Int(FL_ONGROUND), &ctx(6, false));
        assert_eq!(p.air_status, AirStatus::OnGround);
    }

    #[test]
    fn pov_jump_threshold_is_lower() {
        let mut hltv = player();
        let mut pov = player();

        for (p, is_pov) in [(&mut hltv, false), (&mut pov, true)] {
            apply_intercept(p, PropIntercept::Origin, &origin(0.0), &ctx(1, is_pov));
            apply_intercept(p, PropIntercept::Flags, &PropValue::Int(0), &ctx(2, is_pov));
            apply_intercept(p, PropIntercept::Origin, &origin(5.0), &ctx(3, is_pov));
        }

        assert_eq!(hltv.air_status, AirStatus::InAirStarted);
        assert_eq!(pov.air_status, AirStatus::WentUp);
    }

    #[test]
    fn angles_share_a_tick_sample() {
        let mut p = player();
        apply_intercept(&mut p, PropIntercept::Pitch, &PropValue::Float(10.0), &ctx(5, true));
        apply_intercept(&mut p, PropIntercept::Yaw, &PropValue::Float(90.0), &ctx(5, true));
        apply_intercept(&mut p, PropIntercept::Yaw, &PropValue::Float(95.0), &ctx(6, true));

        assert_eq!(p.view_angles.len(), 2);
        assert_eq!(p.view_angles[0].tick, 6);
        assert_eq!(p.view_angles[0].pitch, None);
        assert_eq!(p.view_angles[0].yaw, Some(95.0));
        assert_eq!(p.view_angles[1].pitch, Some(10.0));
        assert_eq!(p.view_angles[1].yaw, Some(90.0));
    }

    #[test]
    fn flash_is_stamped_with_the_tick() {
        let mut p = player();
        apply_intercept(
            &mut p,
            PropIntercept::FlashDuration,
            &PropValue::Float(3.4),
            &ctx(321, false),
        );

        assert_eq!(p.flash.tick, 321);
        assert_eq!(p.flash.duration, 3.4);
    }

    #[test]
    fn every_header_is_an_update_type() {
        use bitstream_io::{BitWrite, BitWriter, LittleEndian};
        use bytes::Bytes;

        let mut data = Vec::new();
        {
            let mut w = BitWriter::endian(&mut data, LittleEndian);
            for bits in [[false, false], [false, true], [true, false], [true, true]] {
                w.write_bit(bits[0]).unwrap();
                w.write_bit(bits[1]).unwrap();
            }
            w.byte_align().unwrap();
        }
        let mut r = BitStream::new(Bytes::from(data));

        assert_eq!(UpdateType::read(&mut r), UpdateType::Delta);
        assert_eq!(UpdateType::read(&mut r), UpdateType::EnterPvs);
        assert_eq!(UpdateType::read(&mut r), UpdateType::LeavePvs { delete: false });
        assert_eq!(UpdateType::read(&mut r), UpdateType::LeavePvs { delete: true });
        assert!(!r.is_overflowed());
    }

    #[test]
    fn intercepts_are_keyed_by_prop_name() {
        assert_eq!(
            PROP_INTERCEPTS.get("m_angEyeAngles[1]"),
            Some(&PropIntercept::Yaw)
        );
        assert_eq!(PROP_INTERCEPTS.get("m_vecVelocity[0]"), None);
    }
}
