//! Typed value variants with precision-aware change detection and binary read/write (spec §3,
//! §4.3). Modeled as an algebraic sum type rather than the visitor-based double dispatch of
//! `original_source`'s `deNetworkValue*` hierarchy — matching expands to straightforward pattern
//! matching instead of a cast-identify helper.

use crate::error::{NetworkError, NetworkResult};
use crate::wire::{read_length_prefixed, write_length_prefixed};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;
use std::io::{Read, Write};

/// Lower clamp for the float/vector/quaternion change-detection epsilon. `f32::EPSILON` is used
/// regardless of the variant's wire width, since every float payload narrows through `f32` or
/// `f64` on the wire and a clamp tighter than `f32`'s own precision would be meaningless.
pub const MIN_EPSILON: f64 = f32::EPSILON as f64;
pub const DEFAULT_EPSILON: f64 = 0.001;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    fn index(self) -> u8 {
        match self {
            IntWidth::W8 => 0,
            IntWidth::W16 => 1,
            IntWidth::W32 => 2,
            IntWidth::W64 => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FloatWidth {
    F16,
    F32,
    F64,
}

impl FloatWidth {
    fn index(self) -> u8 {
        match self {
            FloatWidth::F16 => 0,
            FloatWidth::F32 => 1,
            FloatWidth::F64 => 2,
        }
    }
}

/// A replicated field. Holds the wire tag (implicit in the variant + width/signedness), the
/// current value, a last-sent snapshot used for change detection, and — for floating/vector/
/// quaternion variants — the precision epsilon below which changes are suppressed.
#[derive(Debug, Clone)]
pub enum Value {
    Integer { width: IntWidth, signedness: Signedness, current: i64, last_sent: i64 },
    Float { width: FloatWidth, current: f64, last_sent: f64, epsilon: f64 },
    String { current: String, last_sent: String },
    Data { current: Vec<u8>, last_sent: Vec<u8> },
    Point2 { width: IntWidth, signedness: Signedness, current: [i64; 2], last_sent: [i64; 2] },
    Point3 { width: IntWidth, signedness: Signedness, current: [i64; 3], last_sent: [i64; 3] },
    Vector2 { width: FloatWidth, current: [f64; 2], last_sent: [f64; 2], epsilon: f64 },
    Vector3 { width: FloatWidth, current: [f64; 3], last_sent: [f64; 3], epsilon: f64 },
    Quaternion { width: FloatWidth, current: [f64; 4], last_sent: [f64; 4], epsilon: f64 },
}

fn clamp_epsilon(epsilon: f64) -> f64 {
    epsilon.max(MIN_EPSILON)
}

impl Value {
    pub fn new_integer(width: IntWidth, signedness: Signedness, initial: i64) -> Value {
        Value::Integer { width, signedness, current: initial, last_sent: initial }
    }

    pub fn new_float(width: FloatWidth, initial: f64, epsilon: f64) -> Value {
        Value::Float { width, current: initial, last_sent: initial, epsilon: clamp_epsilon(epsilon) }
    }

    pub fn new_string(initial: impl Into<String>) -> Value {
        let initial = initial.into();
        Value::String { current: initial.clone(), last_sent: initial }
    }

    pub fn new_data(initial: Vec<u8>) -> Value {
        Value::Data { current: initial.clone(), last_sent: initial }
    }

    pub fn new_point2(width: IntWidth, signedness: Signedness, initial: [i64; 2]) -> Value {
        Value::Point2 { width, signedness, current: initial, last_sent: initial }
    }

    pub fn new_point3(width: IntWidth, signedness: Signedness, initial: [i64; 3]) -> Value {
        Value::Point3 { width, signedness, current: initial, last_sent: initial }
    }

    pub fn new_vector2(width: FloatWidth, initial: [f64; 2], epsilon: f64) -> Value {
        Value::Vector2 { width, current: initial, last_sent: initial, epsilon: clamp_epsilon(epsilon) }
    }

    pub fn new_vector3(width: FloatWidth, initial: [f64; 3], epsilon: f64) -> Value {
        Value::Vector3 { width, current: initial, last_sent: initial, epsilon: clamp_epsilon(epsilon) }
    }

    pub fn new_quaternion(width: FloatWidth, initial: [f64; 4], epsilon: f64) -> Value {
        Value::Quaternion { width, current: initial, last_sent: initial, epsilon: clamp_epsilon(epsilon) }
    }

    /// The wire-format tag for this value's current type/width/signedness combination.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Integer { width, signedness, .. } => int_tag(*width, *signedness),
            Value::Float { width, .. } => 8 + width.index(),
            Value::String { .. } => 12,
            Value::Data { .. } => 13,
            Value::Point2 { width, signedness, .. } => 14 + width.index() * 2 + unsigned_bit(*signedness),
            Value::Point3 { width, signedness, .. } => 22 + width.index() * 2 + unsigned_bit(*signedness),
            Value::Vector2 { width, .. } => 30 + width.index(),
            Value::Vector3 { width, .. } => 33 + width.index(),
            Value::Quaternion { width, .. } => 36 + width.index(),
        }
    }

    /// Compares `current` with `last_sent`; if the change is significant (exact for integer/
    /// string/data, component-wise `|a-b| <= epsilon` otherwise), promotes `current` into
    /// `last_sent` and returns `true`.
    pub fn update(&mut self) -> bool {
        match self {
            Value::Integer { current, last_sent, .. } => {
                if current != last_sent {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::String { current, last_sent } => {
                if current != last_sent {
                    last_sent.clone_from(current);
                    true
                } else {
                    false
                }
            }
            Value::Data { current, last_sent } => {
                if current != last_sent {
                    last_sent.clone_from(current);
                    true
                } else {
                    false
                }
            }
            Value::Point2 { current, last_sent, .. } => {
                if current != last_sent {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::Point3 { current, last_sent, .. } => {
                if current != last_sent {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::Float { current, last_sent, epsilon, .. } => {
                if (*current - *last_sent).abs() > *epsilon {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::Vector2 { current, last_sent, epsilon, .. } => {
                if changed_within(current, last_sent, *epsilon) {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::Vector3 { current, last_sent, epsilon, .. } => {
                if changed_within(current, last_sent, *epsilon) {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
            Value::Quaternion { current, last_sent, epsilon, .. } => {
                if changed_within(current, last_sent, *epsilon) {
                    *last_sent = *current;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Decodes into `current`, leaving `last_sent` untouched — change detection is local-only,
    /// a value freshly populated from the wire never counts as "dirty" for its own retransmission.
    pub fn read(&mut self, reader: &mut impl Read) -> NetworkResult<()> {
        match self {
            Value::Integer { width, signedness, current, .. } => {
                *current = read_int(reader, *width, *signedness)?;
            }
            Value::Float { width, current, .. } => {
                *current = read_float(reader, *width)?;
            }
            Value::String { current, .. } => {
                let bytes = read_length_prefixed(reader)?;
                *current = String::from_utf8(bytes)
                    .map_err(|_| NetworkError::InvalidProtocolFrame("string value is not valid utf-8"))?;
            }
            Value::Data { current, .. } => {
                *current = read_length_prefixed(reader)?;
            }
            Value::Point2 { width, signedness, current, .. } => {
                for slot in current.iter_mut() {
                    *slot = read_int(reader, *width, *signedness)?;
                }
            }
            Value::Point3 { width, signedness, current, .. } => {
                for slot in current.iter_mut() {
                    *slot = read_int(reader, *width, *signedness)?;
                }
            }
            Value::Vector2 { width, current, .. } => {
                for slot in current.iter_mut() {
                    *slot = read_float(reader, *width)?;
                }
            }
            Value::Vector3 { width, current, .. } => {
                for slot in current.iter_mut() {
                    *slot = read_float(reader, *width)?;
                }
            }
            Value::Quaternion { width, current, .. } => {
                for slot in current.iter_mut() {
                    *slot = read_float(reader, *width)?;
                }
            }
        }
        Ok(())
    }

    /// Encodes `current`, applying the narrowing cast implied by this value's width explicitly.
    pub fn write(&self, writer: &mut impl Write) -> NetworkResult<()> {
        match self {
            Value::Integer { width, signedness, current, .. } => write_int(writer, *width, *signedness, *current)?,
            Value::Float { width, current, .. } => write_float(writer, *width, *current)?,
            Value::String { current, .. } => write_length_prefixed(writer, current.as_bytes())?,
            Value::Data { current, .. } => write_length_prefixed(writer, current)?,
            Value::Point2 { width, signedness, current, .. } => {
                for slot in current {
                    write_int(writer, *width, *signedness, *slot)?;
                }
            }
            Value::Point3 { width, signedness, current, .. } => {
                for slot in current {
                    write_int(writer, *width, *signedness, *slot)?;
                }
            }
            Value::Vector2 { width, current, .. } => {
                for slot in current {
                    write_float(writer, *width, *slot)?;
                }
            }
            Value::Vector3 { width, current, .. } => {
                for slot in current {
                    write_float(writer, *width, *slot)?;
                }
            }
            Value::Quaternion { width, current, .. } => {
                for slot in current {
                    write_float(writer, *width, *slot)?;
                }
            }
        }
        Ok(())
    }
}

fn unsigned_bit(signedness: Signedness) -> u8 {
    match signedness {
        Signedness::Signed => 0,
        Signedness::Unsigned => 1,
    }
}

fn int_tag(width: IntWidth, signedness: Signedness) -> u8 {
    width.index() * 2 + unsigned_bit(signedness)
}

fn changed_within<const N: usize>(current: &[f64; N], last_sent: &[f64; N], epsilon: f64) -> bool {
    current.iter().zip(last_sent.iter()).any(|(a, b)| (a - b).abs() > epsilon)
}

fn read_int(reader: &mut impl Read, width: IntWidth, signedness: Signedness) -> NetworkResult<i64> {
    Ok(match (width, signedness) {
        (IntWidth::W8, Signedness::Signed) => reader.read_i8()? as i64,
        (IntWidth::W8, Signedness::Unsigned) => reader.read_u8()? as i64,
        (IntWidth::W16, Signedness::Signed) => reader.read_i16::<LittleEndian>()? as i64,
        (IntWidth::W16, Signedness::Unsigned) => reader.read_u16::<LittleEndian>()? as i64,
        (IntWidth::W32, Signedness::Signed) => reader.read_i32::<LittleEndian>()? as i64,
        (IntWidth::W32, Signedness::Unsigned) => reader.read_u32::<LittleEndian>()? as i64,
        (IntWidth::W64, Signedness::Signed) => reader.read_i64::<LittleEndian>()?,
        (IntWidth::W64, Signedness::Unsigned) => reader.read_u64::<LittleEndian>()? as i64,
    })
}

fn write_int(writer: &mut impl Write, width: IntWidth, signedness: Signedness, value: i64) -> NetworkResult<()> {
    match (width, signedness) {
        (IntWidth::W8, Signedness::Signed) => writer.write_i8(value as i8)?,
        (IntWidth::W8, Signedness::Unsigned) => writer.write_u8(value as u8)?,
        (IntWidth::W16, Signedness::Signed) => writer.write_i16::<LittleEndian>(value as i16)?,
        (IntWidth::W16, Signedness::Unsigned) => writer.write_u16::<LittleEndian>(value as u16)?,
        (IntWidth::W32, Signedness::Signed) => writer.write_i32::<LittleEndian>(value as i32)?,
        (IntWidth::W32, Signedness::Unsigned) => writer.write_u32::<LittleEndian>(value as u32)?,
        (IntWidth::W64, Signedness::Signed) => writer.write_i64::<LittleEndian>(value)?,
        (IntWidth::W64, Signedness::Unsigned) => writer.write_u64::<LittleEndian>(value as u64)?,
    }
    Ok(())
}

fn read_float(reader: &mut impl Read, width: FloatWidth) -> NetworkResult<f64> {
    Ok(match width {
        FloatWidth::F16 => f16::from_bits(reader.read_u16::<LittleEndian>()?).to_f64(),
        FloatWidth::F32 => reader.read_f32::<LittleEndian>()? as f64,
        FloatWidth::F64 => reader.read_f64::<LittleEndian>()?,
    })
}

fn write_float(writer: &mut impl Write, width: FloatWidth, value: f64) -> NetworkResult<()> {
    match width {
        FloatWidth::F16 => writer.write_u16::<LittleEndian>(f16::from_f64(value).to_bits())?,
        FloatWidth::F32 => writer.write_f32::<LittleEndian>(value as f32)?,
        FloatWidth::F64 => writer.write_f64::<LittleEndian>(value)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(value: &Value) -> Value {
        let mut bytes = Vec::new();
        value.write(&mut bytes).unwrap();
        let mut clone = value.clone();
        let mut reader = Cursor::new(bytes.as_slice());
        clone.read(&mut reader).unwrap();
        clone
    }

    #[test]
    fn integer_roundtrips_exactly() {
        let value = Value::new_integer(IntWidth::W32, Signedness::Signed, -12345);
        let decoded = roundtrip(&value);
        match decoded {
            Value::Integer { current, .. } => assert_eq!(current, -12345),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn string_roundtrips_exactly() {
        let value = Value::new_string("hello world");
        let decoded = roundtrip(&value);
        match decoded {
            Value::String { current, .. } => assert_eq!(current, "hello world"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn float_roundtrips_within_epsilon() {
        let value = Value::new_float(FloatWidth::F32, 1.23456, DEFAULT_EPSILON);
        let decoded = roundtrip(&value);
        match decoded {
            Value::Float { current, .. } => assert!((current - 1.23456).abs() < 0.001),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn float16_roundtrips_within_coarser_epsilon() {
        let value = Value::new_float(FloatWidth::F16, 1.5, DEFAULT_EPSILON);
        let decoded = roundtrip(&value);
        match decoded {
            Value::Float { current, .. } => assert!((current - 1.5).abs() < 0.01),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn update_suppresses_change_below_epsilon() {
        let mut value = Value::new_float(FloatWidth::F32, 1.0, 0.01);
        if let Value::Float { current, .. } = &mut value {
            *current = 1.001;
        }
        assert!(!value.update());
    }

    #[test]
    fn update_reports_change_above_epsilon() {
        let mut value = Value::new_float(FloatWidth::F32, 1.0, 0.01);
        if let Value::Float { current, .. } = &mut value {
            *current = 1.5;
        }
        assert!(value.update());
        assert!(!value.update());
    }

    #[test]
    fn epsilon_is_clamped_to_minimum() {
        let value = Value::new_float(FloatWidth::F32, 0.0, 0.0);
        match value {
            Value::Float { epsilon, .. } => assert_eq!(epsilon, MIN_EPSILON),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn vector3_change_detection_is_component_wise() {
        let mut value = Value::new_vector3(FloatWidth::F32, [0.0, 0.0, 0.0], 0.01);
        if let Value::Vector3 { current, .. } = &mut value {
            current[2] = 1.0;
        }
        assert!(value.update());
    }

    #[test]
    fn tags_match_protocol_table() {
        assert_eq!(Value::new_integer(IntWidth::W8, Signedness::Signed, 0).tag(), 0);
        assert_eq!(Value::new_integer(IntWidth::W8, Signedness::Unsigned, 0).tag(), 1);
        assert_eq!(Value::new_integer(IntWidth::W64, Signedness::Unsigned, 0).tag(), 7);
        assert_eq!(Value::new_float(FloatWidth::F16, 0.0, DEFAULT_EPSILON).tag(), 8);
        assert_eq!(Value::new_float(FloatWidth::F64, 0.0, DEFAULT_EPSILON).tag(), 10);
        assert_eq!(Value::new_string("").tag(), 12);
        assert_eq!(Value::new_data(vec![]).tag(), 13);
        assert_eq!(Value::new_point2(IntWidth::W8, Signedness::Signed, [0, 0]).tag(), 14);
        assert_eq!(Value::new_point2(IntWidth::W64, Signedness::Unsigned, [0, 0]).tag(), 21);
        assert_eq!(Value::new_point3(IntWidth::W8, Signedness::Signed, [0, 0, 0]).tag(), 22);
        assert_eq!(Value::new_point3(IntWidth::W64, Signedness::Unsigned, [0, 0, 0]).tag(), 29);
        assert_eq!(Value::new_vector2(FloatWidth::F16, [0.0, 0.0], DEFAULT_EPSILON).tag(), 30);
        assert_eq!(Value::new_vector3(FloatWidth::F16, [0.0, 0.0, 0.0], DEFAULT_EPSILON).tag(), 33);
        assert_eq!(
            Value::new_quaternion(FloatWidth::F16, [0.0, 0.0, 0.0, 0.0], DEFAULT_EPSILON).tag(),
            36
        );
    }
}
