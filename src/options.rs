//! # Options System
//!
//! Profiles and suites declare the options they accept through an
//! [`OptionsDescriptor`]: an ordered set of [`OptionDescriptor`]s, each
//! naming a type and a default. An [`Options`] instance is bound to one
//! descriptor, starts every value at its default, and accepts overrides
//! that are coerced (and validated) against the declared type — the same
//! shape as the Python original's `OptionsDescriptor`/`Options` pair, with
//! the coercion made explicit instead of relying on `__setitem__` duck
//! typing.

use crate::error::OptionError;
use crate::units::{BitRate, Byte, ByteRate, Packet, Percentage, Time};
use crate::value::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// The declared type of an option, used to coerce incoming strings/values
/// into the right [`Value`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Bool,
    Int,
    Str,
    Time,
    BitRate,
    ByteRate,
    Byte,
    Percentage,
    Packet,
}

impl OptionType {
    fn name(self) -> &'static str {
        match self {
            OptionType::Bool => "bool",
            OptionType::Int => "int",
            OptionType::Str => "str",
            OptionType::Time => "Time",
            OptionType::BitRate => "BitRate",
            OptionType::ByteRate => "ByteRate",
            OptionType::Byte => "Byte",
            OptionType::Percentage => "Percentage",
            OptionType::Packet => "Packet",
        }
    }

    /// Coerce an already-typed `Value` (e.g. one decoded off the wire) into
    /// this option's declared type, or reject it if the tags don't match.
    pub fn coerce_value(self, name: &str, value: Value) -> Result<Value, OptionError> {
        let matches = matches!(
            (self, &value),
            (OptionType::Bool, Value::Bool(_))
                | (OptionType::Int, Value::Int(_))
                | (OptionType::Str, Value::Str(_))
                | (OptionType::Time, Value::Unit(crate::value::UnitValue::Time(_)))
                | (
                    OptionType::BitRate,
                    Value::Unit(crate::value::UnitValue::BitRate(_))
                )
                | (
                    OptionType::ByteRate,
                    Value::Unit(crate::value::UnitValue::ByteRate(_))
                )
                | (OptionType::Byte, Value::Unit(crate::value::UnitValue::Byte(_)))
                | (
                    OptionType::Percentage,
                    Value::Unit(crate::value::UnitValue::Percentage(_))
                )
                | (OptionType::Packet, Value::Unit(crate::value::UnitValue::Packet(_)))
        );
        if matches {
            Ok(value)
        } else {
            Err(OptionError::TypeMismatch {
                name: name.to_string(),
                expected: self.name(),
                got: value.type_name(),
            })
        }
    }

    /// Coerce a raw string (as found in a suite file or short-form CLI
    /// list) into this option's declared type.
    pub fn coerce_str(self, name: &str, raw: &str) -> Result<Value, OptionError> {
        match self {
            OptionType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(OptionError::TypeMismatch {
                    name: name.to_string(),
                    expected: "bool",
                    got: format!("\"{raw}\""),
                }),
            },
            OptionType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| OptionError::TypeMismatch {
                    name: name.to_string(),
                    expected: "int",
                    got: format!("\"{raw}\""),
                }),
            OptionType::Str => Ok(Value::Str(raw.to_string())),
            OptionType::Time => Time::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
            OptionType::BitRate => BitRate::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
            OptionType::ByteRate => ByteRate::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
            OptionType::Byte => Byte::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
            OptionType::Percentage => Percentage::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
            OptionType::Packet => Packet::from_str(raw)
                .map(Value::from)
                .map_err(|source| OptionError::InvalidValue {
                    name: name.to_string(),
                    source,
                }),
        }
    }
}

/// Declares one option a profile or suite accepts.
#[derive(Debug, Clone)]
pub struct OptionDescriptor {
    pub id: String,
    pub help: String,
    pub option_type: OptionType,
    pub default: Value,
}

/// An ordered set of [`OptionDescriptor`]s. Order is preserved for help
/// output and for deterministic suite-file round-tripping.
#[derive(Debug, Clone, Default)]
pub struct OptionsDescriptor {
    descriptors: Vec<OptionDescriptor>,
}

impl OptionsDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_option(
        &mut self,
        id: impl Into<String>,
        help: impl Into<String>,
        option_type: OptionType,
        default: Value,
    ) -> &mut Self {
        self.descriptors.push(OptionDescriptor {
            id: id.into(),
            help: help.into(),
            option_type,
            default,
        });
        self
    }

    pub fn get(&self, id: &str) -> Option<&OptionDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.descriptors.iter()
    }

    /// Build a fresh [`Options`] instance, every value at its declared
    /// default.
    pub fn instantiate(&self) -> Options {
        let values = self
            .descriptors
            .iter()
            .map(|d| (d.id.clone(), d.default.clone()))
            .collect();
        Options {
            descriptor: self.clone(),
            values,
        }
    }
}

/// A concrete set of option values, bound to the [`OptionsDescriptor`] it
/// was instantiated from.
#[derive(Debug, Clone)]
pub struct Options {
    descriptor: OptionsDescriptor,
    values: BTreeMap<String, Value>,
}

impl Options {
    /// Override one value, coercing `raw` against the option's declared
    /// type. Fails if `id` is not a known option.
    pub fn set_str(&mut self, id: &str, raw: &str) -> Result<(), OptionError> {
        let d = self
            .descriptor
            .get(id)
            .ok_or_else(|| OptionError::UnknownOption(id.to_string()))?;
        let value = d.option_type.coerce_str(id, raw)?;
        self.values.insert(id.to_string(), value);
        Ok(())
    }

    /// Override one value with an already-typed [`Value`] (e.g. one
    /// received off the wire). Fails if `id` is unknown or the value's tag
    /// doesn't match the descriptor's declared type.
    pub fn set_value(&mut self, id: &str, value: Value) -> Result<(), OptionError> {
        let d = self
            .descriptor
            .get(id)
            .ok_or_else(|| OptionError::UnknownOption(id.to_string()))?;
        let value = d.option_type.coerce_value(id, value)?;
        self.values.insert(id.to_string(), value);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Value, OptionError> {
        self.values
            .get(id)
            .ok_or_else(|| OptionError::UnknownOption(id.to_string()))
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn descriptor(&self) -> &OptionsDescriptor {
        &self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor() -> OptionsDescriptor {
        let mut d = OptionsDescriptor::new();
        d.add_option("time", "time to transmit for", OptionType::Time, Value::from(Time::from_base(10.0)));
        d.add_option("rate", "rate to send at", OptionType::BitRate, Value::from(BitRate::from_base(1e6)));
        d
    }

    #[test]
    fn instantiate_uses_declared_defaults() {
        let opts = sample_descriptor().instantiate();
        assert_eq!(opts.get("time").unwrap(), &Value::from(Time::from_base(10.0)));
    }

    #[test]
    fn set_str_coerces_into_declared_type() {
        let mut opts = sample_descriptor().instantiate();
        opts.set_str("time", "5m").unwrap();
        let t = opts.get("time").unwrap().as_unit().unwrap().as_time().unwrap();
        assert_eq!(t.raw_value(), 300.0);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut opts = sample_descriptor().instantiate();
        assert!(opts.set_str("bogus", "1").is_err());
    }

    #[test]
    fn type_mismatch_on_wire_value_is_rejected() {
        let mut opts = sample_descriptor().instantiate();
        assert!(opts.set_value("time", Value::Int(5)).is_err());
    }
}
