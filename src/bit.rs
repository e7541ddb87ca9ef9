use std::io::Cursor;

use bitstream_io::{BitRead, BitReader, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

const COORD_INTEGER_BITS: u32 = 14;
const COORD_FRACTIONAL_BITS: u32 = 5;
const COORD_RESOLUTION: f32 = 1.0 / ((1 << COORD_FRACTIONAL_BITS) as f32);

const NORMAL_FRACTIONAL_BITS: u32 = 11;
const NORMAL_RESOLUTION: f32 = 1.0 / (((1 << NORMAL_FRACTIONAL_BITS) - 1) as f32);

type Reader = BitReader<Cursor<Bytes>, LittleEndian>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z).length()
    }
}

/// a bounded little-endian bit reader in the manner of bf_read
///
/// reading past the end never fails: the cursor is moved to the end,
/// the overflow flag is set and zero is returned.
/// callers check [`BitStream::is_overflowed`] at message boundaries
pub struct BitStream {
    reader: Reader,
    data: Bytes,
    pos: u64,
    len: u64,
    overflowed: bool,
}

impl BitStream {
    pub fn new(data: Bytes) -> Self {
        let len = (data.len() as u64) << 3;

        Self {
            reader: BitReader::endian(Cursor::new(data.clone()), LittleEndian),
            data,
            pos: 0,
            len,
            overflowed: false,
        }
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn remaining_bits(&self) -> u64 {
        self.len - self.pos
    }

    /// bytes consumed so far, rounded up
    #[inline]
    pub fn bytes_read(&self) -> usize {
        self.pos.div_ceil(8) as usize
    }

    #[inline]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    fn overflow(&mut self) {
        self.overflowed = true;
        self.pos = self.len;
    }

    /// claims `bits` from the stream, returns false on overflow
    #[inline]
    fn reserve(&mut self, bits: u64) -> bool {
        if self.overflowed {
            return false;
        }

        if self.len - self.pos < bits {
            self.overflow();
            return false;
        }

        self.pos += bits;
        true
    }

    #[inline(always)]
    fn checked<V: Default>(
        &mut self,
        bits: u64,
        read: impl FnOnce(&mut Reader) -> Result<V, std::io::Error>,
    ) -> V {
        if !self.reserve(bits) {
            return V::default();
        }

        match read(&mut self.reader) {
            Ok(v) => v,
            Err(_) => {
                self.overflow();
                V::default()
            }
        }
    }

    #[inline]
    pub fn read_bit(&mut self) -> bool {
        self.checked(1, |r| r.read_bit())
    }

    /// reads up to 32 bits as an unsigned integer
    #[inline]
    pub fn read_ubits(&mut self, bits: u32) -> u32 {
        if bits == 0 {
            return 0;
        }

        self.checked(bits as u64, |r| r.read_var::<u32>(bits))
    }

    /// reads up to 32 bits as a sign-extended integer
    pub fn read_sbits(&mut self, bits: u32) -> i32 {
        let v = self.read_ubits(bits);
        if bits == 0 || bits >= 32 {
            return v as i32;
        }

        let shift = 32 - bits;
        ((v << shift) as i32) >> shift
    }

    /// 2-bit width selector followed by a 4, 8, 12 or 32 bit value
    pub fn read_ubit_var(&mut self) -> u32 {
        match self.read_ubits(2) {
            0 => self.read_ubits(4),
            1 => self.read_ubits(8),
            2 => self.read_ubits(12),
            _ => self.read_ubits(32),
        }
    }

    #[inline(always)]
    pub fn read_u8(&mut self) -> u8 {
        self.checked(8, |r| r.read_unsigned::<8, u8>())
    }

    #[inline]
    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    #[inline]
    pub fn read_u16(&mut self) -> u16 {
        self.checked(16, |r| r.read_unsigned::<16, u16>())
    }

    #[inline]
    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        self.checked(32, |r| r.read_unsigned::<32, u32>())
    }

    #[inline]
    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// world coordinate: integer and fraction presence bits, sign,
    /// 14-bit integer part biased by one and a 5-bit fraction
    pub fn read_bit_coord(&mut self) -> f32 {
        let has_int = self.read_bit();
        let has_fract = self.read_bit();

        if !has_int && !has_fract {
            return 0.0;
        }

        let negative = self.read_bit();
        let intval = if has_int {
            self.read_ubits(COORD_INTEGER_BITS) + 1
        } else {
            0
        };
        let fractval = if has_fract {
            self.read_ubits(COORD_FRACTIONAL_BITS)
        } else {
            0
        };

        let value = intval as f32 + fractval as f32 * COORD_RESOLUTION;
        if negative { -value } else { value }
    }

    pub fn read_bit_vec3_coord(&mut self) -> Vector3 {
        let has_x = self.read_bit();
        let has_y = self.read_bit();
        let has_z = self.read_bit();

        let mut v = Vector3::default();
        if has_x {
            v.x = self.read_bit_coord();
        }
        if has_y {
            v.y = self.read_bit_coord();
        }
        if has_z {
            v.z = self.read_bit_coord();
        }
        v
    }

    pub fn read_bit_normal(&mut self) -> f32 {
        let negative = self.read_bit();
        let value = self.read_ubits(NORMAL_FRACTIONAL_BITS) as f32 * NORMAL_RESOLUTION;

        if negative { -value } else { value }
    }

    /// angle in degrees quantized to `bits`
    pub fn read_bit_angle(&mut self, bits: u32) -> f32 {
        let shift = (1u64 << bits) as f32;
        self.read_ubits(bits) as f32 * (360.0 / shift)
    }

    fn read_raw_string(&mut self, max_len: usize) -> (Vec<u8>, bool) {
        let mut s = Vec::new();
        let mut too_long = false;

        loop {
            let c = self.read_u8();
            if c == 0 {
                break;
            }

            if s.len() + 1 < max_len {
                s.push(c);
            } else {
                too_long = true;
            }
        }

        (s, !too_long && !self.overflowed)
    }

    /// reads a null-terminated string keeping at most `max_len - 1` bytes
    ///
    /// returns `None` if the string was truncated or the stream overflowed
    pub fn read_string(&mut self, max_len: usize) -> Option<String> {
        let (s, ok) = self.read_raw_string(max_len);
        ok.then(|| String::from_utf8_lossy(&s).into_owned())
    }

    /// same as [`BitStream::read_string`] but keeps whatever was read
    pub fn read_string_lossy(&mut self, max_len: usize) -> String {
        let (s, _) = self.read_raw_string(max_len);
        String::from_utf8_lossy(&s).into_owned()
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) {
        let bits = (buf.len() as u64) << 3;
        if !self.reserve(bits) {
            buf.fill(0);
            return;
        }

        if self.reader.read_bytes(buf).is_err() {
            buf.fill(0);
            self.overflow();
        }
    }

    pub fn skip_bits(&mut self, bits: u64) {
        if bits == 0 || !self.reserve(bits) {
            return;
        }

        let mut left = bits;
        while left > 0 {
            let step = left.min(u32::MAX as u64) as u32;
            if self.reader.skip(step).is_err() {
                self.overflow();
                return;
            }
            left -= step as u64;
        }
    }

    #[inline]
    pub fn skip_bytes(&mut self, bytes: usize) {
        self.skip_bits((bytes as u64) << 3);
    }

    /// splits the next `bits` off into their own stream
    ///
    /// the sub-stream is padded with zeroes to a whole byte, so reads
    /// inside it can never desynchronize the outer stream
    pub fn fork_bits(&mut self, bits: u64) -> BitStream {
        let size = bits.div_ceil(8) as usize;

        if bits & 7 == 0 && self.pos & 7 == 0 && self.remaining_bits() >= bits && !self.overflowed
        {
            // zero-copy when aligned
            let start = (self.pos >> 3) as usize;
            let data = self.data.slice(start..start + size);
            self.skip_bits(bits);
            return BitStream::new(data);
        }

        let available = bits.min(self.remaining_bits());
        let mut buf = BytesMut::with_capacity(size);

        let mut left = available;
        while left >= 8 {
            buf.put_u8(self.read_u8());
            left -= 8;
        }
        if left > 0 {
            buf.put_u8(self.read_ubits(left as u32) as u8);
        }
        buf.resize(size, 0);

        if available < bits {
            self.overflow();
        }

        BitStream::new(buf.freeze())
    }

    #[inline]
    pub fn fork_bytes(&mut self, bytes: usize) -> BitStream {
        self.fork_bits((bytes as u64) << 3)
    }
}

#[cfg(test)]
mod tests {
    use bitstream_io::{BitWrite, BitWriter};

    use super::*;

    fn stream(write: impl FnOnce(&mut BitWriter<&mut Vec<u8>, LittleEndian>)) -> BitStream {
        let mut data = Vec::new();
        {
            let mut w = BitWriter::endian(&mut data, LittleEndian);
            write(&mut w);
            w.byte_align().unwrap();
        }
        BitStream::new(Bytes::from(data))
    }

    #[test]
    fn overflow_is_sticky() {
        let mut r = BitStream::new(Bytes::from_static(&[0xff]));

        assert_eq!(r.read_ubits(4), 0xf);
        assert_eq!(r.read_ubits(8), 0);
        assert!(r.is_overflowed());
        assert_eq!(r.remaining_bits(), 0);
        assert!(!r.read_bit());
        assert!(r.is_overflowed());
    }

    #[test]
    fn signed_bits_are_sign_extended() {
        let mut r = stream(|w| {
            w.write_var::<u32>(5, 0b11110).unwrap();
            w.write_var::<u32>(5, 0b00011).unwrap();
        });

        assert_eq!(r.read_sbits(5), -2);
        assert_eq!(r.read_sbits(5), 3);
    }

    #[test]
    fn ubit_var_widths() {
        let mut r = stream(|w| {
            w.write_var::<u32>(2, 0).unwrap();
            w.write_var::<u32>(4, 9).unwrap();
            w.write_var::<u32>(2, 2).unwrap();
            w.write_var::<u32>(12, 3000).unwrap();
            w.write_var::<u32>(2, 3).unwrap();
            w.write_var::<u32>(32, 70000).unwrap();
        });

        assert_eq!(r.read_ubit_var(), 9);
        assert_eq!(r.read_ubit_var(), 3000);
        assert_eq!(r.read_ubit_var(), 70000);
    }

    #[test]
    fn bit_coord() {
        let mut r = stream(|w| {
            // 12.5
            w.write_bit(true).unwrap();
            w.write_bit(true).unwrap();
            w.write_bit(false).unwrap();
            w.write_var::<u32>(14, 11).unwrap();
            w.write_var::<u32>(5, 16).unwrap();
            // -0.25
            w.write_bit(false).unwrap();
            w.write_bit(true).unwrap();
            w.write_bit(true).unwrap();
            w.write_var::<u32>(5, 8).unwrap();
            // zero
            w.write_bit(false).unwrap();
            w.write_bit(false).unwrap();
        });

        assert_eq!(r.read_bit_coord(), 12.5);
        assert_eq!(r.read_bit_coord(), -0.25);
        assert_eq!(r.read_bit_coord(), 0.0);
        assert!(!r.is_overflowed());
    }

    #[test]
    fn bit_coord_on_exhausted_stream() {
        let mut r = BitStream::new(Bytes::from_static(&[0b0000_0011]));

        assert_eq!(r.read_bit_coord(), 0.0);
        assert!(r.is_overflowed());
    }

    #[test]
    fn bit_angle_and_normal() {
        let mut r = stream(|w| {
            w.write_var::<u32>(16, 1 << 14).unwrap();
            w.write_bit(true).unwrap();
            w.write_var::<u32>(11, 2047).unwrap();
        });

        assert_eq!(r.read_bit_angle(16), 90.0);
        assert_eq!(r.read_bit_normal(), -1.0);
    }

    #[test]
    fn strings_are_truncated() {
        let mut r = stream(|w| {
            w.write_bytes(b"hello\0").unwrap();
            w.write_bytes(b"hello\0").unwrap();
        });

        assert_eq!(r.read_string(16).as_deref(), Some("hello"));
        assert_eq!(r.read_string(4), None);
        assert!(!r.is_overflowed());
    }

    #[test]
    fn truncated_string_keeps_prefix() {
        let mut r = stream(|w| w.write_bytes(b"abcdef\0").unwrap());

        assert_eq!(r.read_string_lossy(4), "abc");
        assert_eq!(r.bytes_read(), 7);
    }

    #[test]
    fn fork_unaligned() {
        let mut r = stream(|w| {
            w.write_bit(true).unwrap();
            w.write_var::<u32>(12, 0xabc).unwrap();
            w.write_var::<u32>(3, 0b101).unwrap();
        });

        assert!(r.read_bit());
        let mut sub = r.fork_bits(12);
        assert_eq!(sub.read_ubits(12), 0xabc);
        assert_eq!(sub.remaining_bits(), 4);
        assert_eq!(r.read_ubits(3), 0b101);
        assert!(!r.is_overflowed());
    }

    #[test]
    fn fork_past_end_overflows_outer() {
        let mut r = BitStream::new(Bytes::from_static(&[1, 2]));

        let mut sub = r.fork_bytes(4);
        assert!(r.is_overflowed());
        assert_eq!(sub.read_u8(), 1);
        assert_eq!(sub.read_u8(), 2);
        assert_eq!(sub.read_u16(), 0);
        assert!(!sub.is_overflowed());
    }
}
