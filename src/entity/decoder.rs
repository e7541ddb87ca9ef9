use log::warn;

use crate::bit::{BitStream, Vector3};
use crate::entity::sendtable::{
    PROP_COORD, PROP_NORMAL, PROP_NOSCALE, PROP_UNSIGNED, SendProp, SendPropType, int_log2,
};
use crate::error::invalid_data;

const MAX_STRING_BITS: u32 = 9;
const MAX_STRING_BUFFER_SIZE: usize = 1 << MAX_STRING_BITS;

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Int(i32),
    Float(f32),
    Vector(Vector3),
    String(String),
    Array(Vec<ArrayElement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElement {
    pub value: PropValue,
    /// elements left in the array including this one
    pub remaining: u32,
}

impl PropValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            PropValue::Float(v) => Some(*v),
            PropValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector3> {
        match self {
            PropValue::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// outcome of decoding one prop, a repaired string length is reported
/// back so the caller can count it
pub struct Decoded {
    pub value: PropValue,
    pub truncated: bool,
}

fn decode_int(r: &mut BitStream, prop: &SendProp) -> i32 {
    if prop.has_flag(PROP_UNSIGNED) {
        r.read_ubits(prop.bits) as i32
    } else {
        r.read_sbits(prop.bits)
    }
}

fn decode_float(r: &mut BitStream, prop: &SendProp) -> f32 {
    if prop.has_flag(PROP_COORD) {
        return r.read_bit_coord();
    }
    if prop.has_flag(PROP_NOSCALE) {
        return r.read_f32();
    }
    if prop.has_flag(PROP_NORMAL) {
        return r.read_bit_normal();
    }

    if prop.bits == 0 {
        return prop.low_value;
    }

    let interp = r.read_ubits(prop.bits) as f32 / ((1u64 << prop.bits) - 1) as f32;
    prop.low_value + (prop.high_value - prop.low_value) * interp
}

fn decode_vector(r: &mut BitStream, prop: &SendProp) -> Vector3 {
    let x = decode_float(r, prop);
    let y = decode_float(r, prop);

    // normals only carry the sign of the third component
    let z = if prop.has_flag(PROP_NORMAL) {
        let negative = r.read_bit();
        let sum = x * x + y * y;
        let z = if sum < 1.0 { (1.0 - sum).sqrt() } else { 0.0 };
        if negative { -z } else { z }
    } else {
        decode_float(r, prop)
    };

    Vector3 { x, y, z }
}

fn decode_string(r: &mut BitStream) -> (String, bool) {
    let mut len = r.read_ubits(MAX_STRING_BITS) as usize;
    let mut truncated = false;

    if len >= MAX_STRING_BUFFER_SIZE {
        warn!("string prop length {len} exceeds the string buffer, truncating");
        len = MAX_STRING_BUFFER_SIZE - 1;
        truncated = true;
    }

    let available = (r.remaining_bits() >> 3) as usize;
    if len > available {
        warn!("string prop length {len} exceeds the remaining {available} bytes, truncating");
        len = available;
        truncated = true;
    }

    let mut buf = vec![0u8; len];
    r.read_bytes(&mut buf);

    // the wire string may carry its own terminator
    if let Some(end) = buf.iter().position(|&c| c == 0) {
        buf.truncate(end);
    }

    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}

/// decodes one value of `prop`, `element` is the element prop of an array
pub fn decode_prop(
    r: &mut BitStream,
    prop: &SendProp,
    element: Option<&SendProp>,
) -> Result<Decoded, std::io::Error> {
    let mut truncated = false;

    let value = match prop.prop_type {
        SendPropType::Int => PropValue::Int(decode_int(r, prop)),
        SendPropType::Float => PropValue::Float(decode_float(r, prop)),
        SendPropType::Vector => PropValue::Vector(decode_vector(r, prop)),
        SendPropType::String => {
            let (s, t) = decode_string(r);
            truncated = t;
            PropValue::String(s)
        }
        SendPropType::Array => {
            let Some(element) = element else {
                return Err(invalid_data("array prop without element prop"));
            };

            let count_bits = int_log2(prop.elements) + 1;
            let count = r.read_ubits(count_bits);

            let mut elements = Vec::with_capacity(count as usize);
            for i in 0..count {
                // arrays of arrays are never sent
                let decoded = decode_prop(r, element, None)?;
                truncated |= decoded.truncated;
                elements.push(ArrayElement {
                    value: decoded.value,
                    remaining: count - i,
                });
            }

            PropValue::Array(elements)
        }
        SendPropType::DataTable => {
            return Err(invalid_data("data table prop in flattened prop list"));
        }
    };

    Ok(Decoded { value, truncated })
}
