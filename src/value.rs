//! # Dynamic Value Type
//!
//! A single tagged union used everywhere a value needs to cross a boundary
//! that erases static typing: message params on the wire, option storage,
//! and collected results. Keeping one `Value` type for all three avoids
//! three separate ad-hoc dynamic representations and lets a receiver
//! reconstruct the exact concrete [`crate::units::Quantity`] type a
//! `Value::Unit` was built from.

use crate::units::{BitRate, Byte, ByteRate, Packet, Percentage, Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A unit-tagged numeric value, carrying enough information to reconstruct
/// the original `Quantity<K>` on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnitValue {
    Time(f64),
    BitRate(f64),
    ByteRate(f64),
    Byte(f64),
    Percentage(f64),
    Packet(f64),
}

impl From<Time> for UnitValue {
    fn from(v: Time) -> Self {
        UnitValue::Time(v.raw_value())
    }
}
impl From<BitRate> for UnitValue {
    fn from(v: BitRate) -> Self {
        UnitValue::BitRate(v.raw_value())
    }
}
impl From<ByteRate> for UnitValue {
    fn from(v: ByteRate) -> Self {
        UnitValue::ByteRate(v.raw_value())
    }
}
impl From<Byte> for UnitValue {
    fn from(v: Byte) -> Self {
        UnitValue::Byte(v.raw_value())
    }
}
impl From<Percentage> for UnitValue {
    fn from(v: Percentage) -> Self {
        UnitValue::Percentage(v.raw_value())
    }
}
impl From<Packet> for UnitValue {
    fn from(v: Packet) -> Self {
        UnitValue::Packet(v.raw_value())
    }
}

impl UnitValue {
    /// Name of the concrete unit kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            UnitValue::Time(_) => "Time",
            UnitValue::BitRate(_) => "BitRate",
            UnitValue::ByteRate(_) => "ByteRate",
            UnitValue::Byte(_) => "Byte",
            UnitValue::Percentage(_) => "Percentage",
            UnitValue::Packet(_) => "Packet",
        }
    }

    pub fn as_time(&self) -> Option<Time> {
        match self {
            UnitValue::Time(v) => Some(Time::from_base(*v)),
            _ => None,
        }
    }
    pub fn as_bit_rate(&self) -> Option<BitRate> {
        match self {
            UnitValue::BitRate(v) => Some(BitRate::from_base(*v)),
            _ => None,
        }
    }
    pub fn as_byte_rate(&self) -> Option<ByteRate> {
        match self {
            UnitValue::ByteRate(v) => Some(ByteRate::from_base(*v)),
            _ => None,
        }
    }
    pub fn as_byte(&self) -> Option<Byte> {
        match self {
            UnitValue::Byte(v) => Some(Byte::from_base(*v)),
            _ => None,
        }
    }
    pub fn as_percentage(&self) -> Option<Percentage> {
        match self {
            UnitValue::Percentage(v) => Some(Percentage::from_base(*v)),
            _ => None,
        }
    }
    pub fn as_packet(&self) -> Option<Packet> {
        match self {
            UnitValue::Packet(v) => Some(Packet::from_base(*v)),
            _ => None,
        }
    }
}

/// A dynamically-typed value, used for option storage, result storage, and
/// message params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Unit(UnitValue),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Unit(u) => u.kind_name(),
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_unit(&self) -> Option<&UnitValue> {
        match self {
            Value::Unit(u) => Some(u),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<Time> for Value {
    fn from(v: Time) -> Self {
        Value::Unit(v.into())
    }
}
impl From<BitRate> for Value {
    fn from(v: BitRate) -> Self {
        Value::Unit(v.into())
    }
}
impl From<ByteRate> for Value {
    fn from(v: ByteRate) -> Self {
        Value::Unit(v.into())
    }
}
impl From<Byte> for Value {
    fn from(v: Byte) -> Self {
        Value::Unit(v.into())
    }
}
impl From<Percentage> for Value {
    fn from(v: Percentage) -> Self {
        Value::Unit(v.into())
    }
}
impl From<Packet> for Value {
    fn from(v: Packet) -> Self {
        Value::Unit(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Time;

    #[test]
    fn unit_value_round_trips_through_quantity() {
        let t = Time::from_base(12.5);
        let uv: UnitValue = t.into();
        assert_eq!(uv.as_time(), Some(t));
    }

    #[test]
    fn value_serializes_with_bincode() {
        let v = Value::Unit(UnitValue::BitRate(1_000_000.0));
        let bytes = bincode::serialize(&v).unwrap();
        let back: Value = bincode::deserialize(&bytes).unwrap();
        assert_eq!(v, back);
    }
}
