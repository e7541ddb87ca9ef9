use crate::bit::BitStream;
use crate::error::invalid_data;

pub use macro_derive::GameEvent;

const MAX_EVENT_STRING_LENGTH: usize = 128;

/// wire type tags of event keys
pub const VALUE_STRING: u8 = 1;
pub const VALUE_FLOAT: u8 = 2;
pub const VALUE_LONG: u8 = 3;
pub const VALUE_SHORT: u8 = 4;
pub const VALUE_BYTE: u8 = 5;
pub const VALUE_BOOL: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum GameEventValue {
    String(String),
    Float(f32),
    Long(i32),
    Short(i16),
    Byte(u8),
    Bool(bool),
}

impl GameEventValue {
    pub fn read(r: &mut BitStream, value_type: u8) -> Result<GameEventValue, std::io::Error> {
        Ok(match value_type {
            VALUE_STRING => GameEventValue::String(r.read_string_lossy(MAX_EVENT_STRING_LENGTH)),
            VALUE_FLOAT => GameEventValue::Float(r.read_f32()),
            VALUE_LONG => GameEventValue::Long(r.read_i32()),
            VALUE_SHORT => GameEventValue::Short(r.read_i16()),
            VALUE_BYTE => GameEventValue::Byte(r.read_u8()),
            VALUE_BOOL => GameEventValue::Bool(r.read_bit()),
            _ => return Err(invalid_data("unknown field type in game event")),
        })
    }

    fn as_long(&self) -> Option<i32> {
        match *self {
            GameEventValue::Long(v) => Some(v),
            GameEventValue::Short(v) => Some(v as i32),
            GameEventValue::Byte(v) => Some(v as i32),
            GameEventValue::Bool(v) => Some(v as i32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEventKey {
    pub name: String,
    pub value_type: u8,
}

/// layout of one event as announced by the game event list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEventDescriptor {
    pub id: u32,
    pub name: String,
    pub keys: Vec<GameEventKey>,
}

impl GameEventDescriptor {
    /// reads the values of one event in key order
    pub fn read_values(&self, r: &mut BitStream) -> Result<Vec<GameEventValue>, std::io::Error> {
        self.keys
            .iter()
            .map(|key| GameEventValue::read(r, key.value_type))
            .collect()
    }
}

/// an event record whose fields are bound to event keys by name,
/// keys without a field are skipped and fields without a key keep their default
pub trait GameEvent: Sized + Default {
    const NAME: &'static str;

    fn from_values(
        descriptor: &GameEventDescriptor,
        values: &[GameEventValue],
    ) -> Result<Self, std::io::Error>;
}

/// conversion of a wire value into a record field, integer widths are
/// interchangeable since mods resize keys
pub trait FromGameEventValue: Sized {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self>;
}

impl FromGameEventValue for bool {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        value.as_long().map(|v| v != 0)
    }
}

impl FromGameEventValue for u8 {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        value.as_long().map(|v| v as u8)
    }
}

impl FromGameEventValue for i16 {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        value.as_long().map(|v| v as i16)
    }
}

impl FromGameEventValue for i32 {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        value.as_long()
    }
}

impl FromGameEventValue for f32 {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        match *value {
            GameEventValue::Float(v) => Some(v),
            _ => value.as_long().map(|v| v as f32),
        }
    }
}

impl FromGameEventValue for String {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        match value {
            GameEventValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl<T: FromGameEventValue> FromGameEventValue for Option<T> {
    fn from_game_event_value(value: &GameEventValue) -> Option<Self> {
        T::from_game_event_value(value).map(Some)
    }
}
