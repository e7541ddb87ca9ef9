use log::{debug, trace};

use crate::bit::BitStream;
use crate::entity::sendtable::int_log2;
use crate::error::invalid_data;
use crate::player::{Player, PlayerInfo};
use crate::CssDemoParser;

pub const STRING_TABLE_USER_INFO: &str = "userinfo";
pub const MAX_STRING_TABLES: usize = 64;

const SUBSTRING_BITS: u32 = 5;
const MAX_USERDATA_BITS: u32 = 12;
const MAX_USERDATA_SIZE: usize = 1 << MAX_USERDATA_BITS;
const MAX_ENTRY_LENGTH: usize = 1024;
const MAX_TABLE_NAME_LENGTH: usize = 512;

/// prior entries an update may reference by index
const STRING_HISTORY_SIZE: usize = 1 << SUBSTRING_BITS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    pub name: String,
    pub max_entries: i32,
    pub user_data_fixed_size: bool,
    /// bytes, only for fixed size user data
    pub user_data_size: usize,
    pub user_data_size_bits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTableEntry {
    pub index: usize,
    pub string: String,
    pub user_data: Option<Vec<u8>>,
}

/// cuts `s` to at most `len` bytes without splitting a character
fn truncate_str(s: &str, len: usize) -> &str {
    if s.len() <= len {
        return s;
    }

    let mut end = len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl StringTable {
    #[inline]
    pub fn is_user_info(&self) -> bool {
        self.name == STRING_TABLE_USER_INFO
    }

    /// reads `entries` changed entries of this table
    pub fn parse_update(
        &self,
        r: &mut BitStream,
        entries: i32,
    ) -> Result<Vec<StringTableEntry>, std::io::Error> {
        let max_entries = self.max_entries.max(0) as u32;
        let entry_bits = int_log2(max_entries);

        if 1u32 << entry_bits != max_entries {
            return Err(invalid_data("string table size not a power of two"));
        }

        let mut history: Vec<String> = Vec::with_capacity(STRING_HISTORY_SIZE);
        let mut updated = Vec::with_capacity(entries.max(0) as usize);
        let mut last_entry: i64 = -1;

        for _ in 0..entries {
            let index = if r.read_bit() {
                last_entry + 1
            } else {
                r.read_ubits(entry_bits) as i64
            };
            last_entry = index;

            if index < 0 || index >= max_entries as i64 {
                return Err(invalid_data("bogus string index"));
            }

            let string = if r.read_bit() {
                if r.read_bit() {
                    let history_index = r.read_ubits(5) as usize;
                    let Some(prior) = history.get(history_index) else {
                        return Err(invalid_data("invalid string history index"));
                    };

                    let prefix_len = r.read_ubits(SUBSTRING_BITS) as usize;
                    let mut s = truncate_str(prior, prefix_len).to_string();
                    s.push_str(&r.read_string_lossy(MAX_ENTRY_LENGTH));
                    s
                } else {
                    r.read_string_lossy(MAX_ENTRY_LENGTH)
                }
            } else {
                String::new()
            };

            let user_data = if r.read_bit() {
                Some(self.read_user_data(r)?)
            } else {
                None
            };

            if history.len() >= STRING_HISTORY_SIZE {
                history.remove(0);
            }
            history.push(truncate_str(&string, STRING_HISTORY_SIZE - 1).to_string());

            updated.push(StringTableEntry {
                index: index as usize,
                string,
                user_data,
            });
        }

        Ok(updated)
    }

    fn read_user_data(&self, r: &mut BitStream) -> Result<Vec<u8>, std::io::Error> {
        if !self.user_data_fixed_size {
            let size = r.read_ubits(MAX_USERDATA_BITS) as usize;
            if size > MAX_USERDATA_SIZE {
                return Err(invalid_data("invalid user data size"));
            }

            let mut buf = vec![0u8; size];
            r.read_bytes(&mut buf);
            return Ok(buf);
        }

        if self.user_data_size == 0 || self.user_data_size > MAX_USERDATA_SIZE {
            return Err(invalid_data("invalid user data size"));
        }

        let mut buf = vec![0u8; self.user_data_size];
        let bits = self.user_data_size_bits as usize;
        let bytes = (bits / 8).min(buf.len());

        r.read_bytes(&mut buf[..bytes]);
        if bits % 8 > 0 && bytes < buf.len() {
            buf[bytes] = r.read_ubits((bits % 8) as u32) as u8;
        }

        Ok(buf)
    }
}

impl CssDemoParser {
    #[cold]
    pub(super) fn handle_create_string_table(&mut self) -> Result<(), std::io::Error> {
        let r = &mut self.reader;

        let name = r.read_string_lossy(MAX_TABLE_NAME_LENGTH);
        let max_entries = r.read_i16() as i32;
        let entries = r.read_ubits(int_log2(max_entries.max(0) as u32) + 1) as i32;
        let bits = r.read_ubits(20) as u64;

        let user_data_fixed_size = r.read_bit();
        let (user_data_size, user_data_size_bits) = if user_data_fixed_size {
            (r.read_ubits(12) as usize, r.read_ubits(4))
        } else {
            (0, 0)
        };

        if name.is_empty() {
            return Err(invalid_data("tried to create bogus string table"));
        }

        if self.string_tables.len() >= MAX_STRING_TABLES {
            return Err(invalid_data("too many string tables"));
        }

        let mut data = r.fork_bits(bits);

        debug!("string table \"{name}\" created with {entries}/{max_entries} entries");

        let table = StringTable {
            name,
            max_entries,
            user_data_fixed_size,
            user_data_size,
            user_data_size_bits,
        };

        let updated = table.parse_update(&mut data, entries)?;
        let is_user_info = table.is_user_info();
        self.string_tables.push(table);

        if is_user_info {
            self.apply_user_info(updated)?;
        }

        Ok(())
    }

    #[cold]
    pub(super) fn handle_update_string_table(&mut self) -> Result<(), std::io::Error> {
        let r = &mut self.reader;

        let table_id = r.read_ubits(self.string_table_index_bits) as usize;
        let entries = if r.read_bit() {
            r.read_i16() as i32
        } else {
            1
        };
        let bits = r.read_u16() as u64;

        let Some(table) = self
            .string_tables
            .get(table_id)
            .filter(|t| t.max_entries > entries)
        else {
            return Err(invalid_data("bad string table update"));
        };

        let mut data = r.fork_bits(bits);
        let updated = table.parse_update(&mut data, entries)?;

        if table.is_user_info() {
            self.apply_user_info(updated)?;
        }

        Ok(())
    }

    /// merges decoded userinfo entries into the roster, the entity slot
    /// of a player is its entry index + 1
    fn apply_user_info(&mut self, entries: Vec<StringTableEntry>) -> Result<(), std::io::Error> {
        for entry in entries {
            let Some(data) = entry.user_data else {
                continue;
            };

            let info = PlayerInfo::parse(&data);
            let entity_index = entry.index + 1;

            if self.pov.is_pov && self.pov.user_id.is_none() {
                if self.server_info.is_none() {
                    return Err(invalid_data(
                        "SVC_ServerInfo not encountered by user info update",
                    ));
                }

                // the recorder's entry sits at the slot announced in the server info
                if entry.index as i32 == self.pov.slot {
                    debug!("POV player is \"{}\" with user id {}", info.name, info.user_id);
                    self.pov.user_id = Some(info.user_id);
                }
            }

            trace!(
                "user info {}: \"{}\" user id {}",
                entry.index, info.name, info.user_id
            );

            match self.player_index_by_entity_index(entity_index) {
                None => self.players.push(Player::new(info, entity_index)),
                Some(i) if self.players[i].user_id() != info.user_id => {
                    // slot taken over by someone else, the old player keeps
                    // its kills until the round ends
                    self.expire_player(i);
                    self.players.push(Player::new(info, entity_index));
                }
                Some(i) => {
                    // identity refresh, air status and height stay
                    let existing = &mut self.players[i];
                    existing.info = info;
                    existing.entity_index = Some(entity_index);
                }
            }
        }

        Ok(())
    }
}
