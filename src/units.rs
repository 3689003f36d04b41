//! # Typed Unit System
//!
//! Every quantity exchanged between profiles, stored as a result, or declared
//! as an option is tagged with a concrete unit type: [`Time`], [`BitRate`],
//! [`ByteRate`], [`Byte`], [`Percentage`], [`Packet`]. Each is a thin newtype
//! over `f64` storing the value in a fixed base magnitude, generic over a
//! zero-sized marker implementing [`UnitKind`].
//!
//! The Python implementation this is modeled on asserted
//! `type(self) == type(other)` at runtime before allowing arithmetic or
//! comparison between two unit values. Here that invariant is upheld by the
//! type system instead: `Quantity<TimeKind>` and `Quantity<BitRateKind>` are
//! different types, so `impl Add for Quantity<K>` simply cannot be called
//! across kinds. See `DESIGN.md` for the rationale.

use crate::error::UnitError;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// One named scale a unit kind can be expressed in, e.g. `"Mbps"` at
/// `1_000_000.0` for [`BitRateKind`]. `aliases[0]` is the canonical name used
/// for display and wire encoding; the remaining aliases are accepted on
/// parse only.
#[derive(Debug, Clone, Copy)]
pub struct Magnitude {
    pub aliases: &'static [&'static str],
    pub factor: f64,
    /// Marks the order-1 magnitude: the one a bare, suffix-less number is
    /// interpreted in, and the one reported for a value of exactly zero.
    /// Exactly one magnitude per kind must set this to `true`.
    pub is_default: bool,
}

impl Magnitude {
    pub const fn canonical(&self) -> &'static str {
        self.aliases[0]
    }
}

/// A concrete family of magnitudes sharing a base unit. Implemented by the
/// zero-sized marker types below; never implemented for anything carrying
/// state of its own.
pub trait UnitKind: Copy + Clone + fmt::Debug + 'static {
    /// Name used in error messages and the wire `Value::Unit` tag.
    const NAME: &'static str;

    /// All magnitudes, ordered from largest factor to smallest. Must be
    /// non-empty.
    const MAGNITUDES: &'static [Magnitude];

    /// The order-1 magnitude: used for a bare, suffix-less number on parse
    /// and for displaying a value of exactly zero.
    fn default_magnitude() -> &'static Magnitude {
        Self::MAGNITUDES
            .iter()
            .find(|m| m.is_default)
            .expect("exactly one magnitude must be marked is_default")
    }

    /// Aliases are matched verbatim, case-sensitively, as listed in
    /// [`Self::MAGNITUDES`].
    fn find_magnitude(alias: &str) -> Option<&'static Magnitude> {
        Self::MAGNITUDES
            .iter()
            .find(|m| m.aliases.iter().any(|a| *a == alias))
    }
}

/// A value of a specific unit kind, stored internally in base units (the
/// kind's smallest magnitude of factor `1.0`).
#[derive(Clone, Copy)]
pub struct Quantity<K: UnitKind> {
    base: f64,
    _kind: PhantomData<K>,
}

impl<K: UnitKind> Quantity<K> {
    /// Construct directly from a base-unit magnitude.
    pub const fn from_base(base: f64) -> Self {
        Self {
            base,
            _kind: PhantomData,
        }
    }

    /// The raw base-unit value, e.g. seconds for [`Time`], bits/s for
    /// [`BitRate`].
    pub fn raw_value(&self) -> f64 {
        self.base
    }

    /// Construct from a value expressed in a named magnitude (case
    /// insensitive, accepts any alias).
    pub fn from_scaled(value: f64, magnitude: &str) -> Result<Self, UnitError> {
        let m = K::find_magnitude(magnitude).ok_or_else(|| UnitError::UnknownMagnitude {
            suffix: magnitude.to_string(),
            kind: K::NAME,
        })?;
        Ok(Self::from_base(value * m.factor))
    }

    /// The value expressed in the given magnitude, e.g. `scale("ms")` for a
    /// [`Time`] returns milliseconds.
    pub fn scale(&self, magnitude: &str) -> Result<f64, UnitError> {
        let m = K::find_magnitude(magnitude).ok_or_else(|| UnitError::UnknownMagnitude {
            suffix: magnitude.to_string(),
            kind: K::NAME,
        })?;
        Ok(self.base / m.factor)
    }

    /// The largest magnitude whose scaled value is at least `1.0`, paired
    /// with that scaled value. A value of exactly zero is reported in the
    /// kind's default (order-1) magnitude.
    pub fn optimal_scale(&self) -> (f64, &'static str) {
        if self.base == 0.0 {
            let m = K::default_magnitude();
            return (0.0, m.canonical());
        }
        for m in K::MAGNITUDES {
            let scaled = self.base / m.factor;
            if scaled.abs() >= 1.0 {
                return (scaled, m.canonical());
            }
        }
        let m = K::default_magnitude();
        (self.base / m.factor, m.canonical())
    }

    /// Greedy decomposition across every magnitude in descending order, e.g.
    /// a [`Time`] of 3665 seconds decomposes to `[(1.0, "hour"), (1.0,
    /// "min"), (5.0, "sec")]`. Residuals below `1e-10` base units are
    /// dropped. If the value is exactly zero, returns a single zero
    /// component in the default magnitude.
    pub fn optimal_combined_scale(&self) -> Vec<(f64, &'static str)> {
        const EPSILON: f64 = 1e-10;
        if self.base.abs() < EPSILON {
            let m = K::default_magnitude();
            return vec![(0.0, m.canonical())];
        }

        let mut remaining = self.base.abs();
        let sign = if self.base < 0.0 { -1.0 } else { 1.0 };
        let mut parts = Vec::new();
        for m in K::MAGNITUDES {
            if remaining < EPSILON {
                break;
            }
            let count = (remaining / m.factor).floor();
            if count >= 1.0 {
                parts.push((sign * count, m.canonical()));
                remaining -= count * m.factor;
            }
        }
        if parts.is_empty() {
            let m = K::default_magnitude();
            parts.push((sign * remaining / m.factor, m.canonical()));
        }
        parts
    }
}

impl<K: UnitKind> FromStr for Quantity<K> {
    type Err = UnitError;

    /// Parses `"<number> <magnitude>"`, with or without intervening
    /// whitespace (`"10ms"`, `"10 ms"`, `"1.5Mbps"` are all accepted). A
    /// bare number with no suffix is interpreted as the kind's default
    /// (order-1) magnitude.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split_at = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (num_part, unit_part) = s.split_at(split_at);
        let num_part = num_part.trim();
        let unit_part = unit_part.trim();

        if num_part.is_empty() {
            return Err(UnitError::Parse {
                input: s.to_string(),
                kind: K::NAME,
            });
        }
        let value: f64 = num_part.parse().map_err(|_| UnitError::Parse {
            input: s.to_string(),
            kind: K::NAME,
        })?;

        if unit_part.is_empty() {
            let m = K::default_magnitude();
            return Ok(Self::from_base(value * m.factor));
        }

        Self::from_scaled(value, unit_part)
    }
}

impl<K: UnitKind> fmt::Display for Quantity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (value, unit) = self.optimal_scale();
        write!(f, "{} {}", value, unit)
    }
}

impl<K: UnitKind> fmt::Debug for Quantity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME).field("base", &self.base).finish()
    }
}

impl<K: UnitKind> Add for Quantity<K> {
    type Output = Quantity<K>;
    fn add(self, rhs: Self) -> Self::Output {
        Self::from_base(self.base + rhs.base)
    }
}

impl<K: UnitKind> Sub for Quantity<K> {
    type Output = Quantity<K>;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::from_base(self.base - rhs.base)
    }
}

impl<K: UnitKind> PartialEq for Quantity<K> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<K: UnitKind> PartialOrd for Quantity<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.base.partial_cmp(&other.base)
    }
}

// --- Concrete unit kinds -----------------------------------------------

/// Marker for elapsed-time quantities, base unit seconds.
#[derive(Debug, Clone, Copy)]
pub struct TimeKind;

impl UnitKind for TimeKind {
    const NAME: &'static str = "Time";
    const MAGNITUDES: &'static [Magnitude] = &[
        Magnitude {
            aliases: &["week", "weeks", "w"],
            factor: 604_800.0,
            is_default: false,
        },
        Magnitude {
            aliases: &["day", "days", "d"],
            factor: 86_400.0,
            is_default: false,
        },
        Magnitude {
            aliases: &["hour", "hours", "h"],
            factor: 3_600.0,
            is_default: false,
        },
        Magnitude {
            aliases: &["min", "minute", "minutes", "m"],
            factor: 60.0,
            is_default: false,
        },
        Magnitude {
            aliases: &["sec", "second", "seconds", "s"],
            factor: 1.0,
            is_default: true,
        },
        Magnitude {
            aliases: &["ms", "millisecond", "milliseconds"],
            factor: 1e-3,
            is_default: false,
        },
        Magnitude {
            aliases: &["us", "microsecond", "microseconds"],
            factor: 1e-6,
            is_default: false,
        },
        Magnitude {
            aliases: &["ns", "nanosecond", "nanoseconds"],
            factor: 1e-9,
            is_default: false,
        },
    ];
}

/// An elapsed time, stored internally in seconds.
pub type Time = Quantity<TimeKind>;

/// Marker for bit-rate quantities, base unit bits per second.
#[derive(Debug, Clone, Copy)]
pub struct BitRateKind;

impl UnitKind for BitRateKind {
    const NAME: &'static str = "BitRate";
    const MAGNITUDES: &'static [Magnitude] = &[
        Magnitude {
            aliases: &["Tbps", "Tbit/s"],
            factor: 1e12,
            is_default: false,
        },
        Magnitude {
            aliases: &["Gbps", "Gbit/s"],
            factor: 1e9,
            is_default: false,
        },
        Magnitude {
            aliases: &["Mbps", "Mbit/s"],
            factor: 1e6,
            is_default: false,
        },
        Magnitude {
            aliases: &["kbps", "kbit/s"],
            factor: 1e3,
            is_default: false,
        },
        Magnitude {
            aliases: &["bps", "bit/s", "b/s"],
            factor: 1.0,
            is_default: true,
        },
    ];
}

/// A bit rate, stored internally in bits per second.
pub type BitRate = Quantity<BitRateKind>;

/// Marker for byte-rate quantities, base unit bytes per second.
#[derive(Debug, Clone, Copy)]
pub struct ByteRateKind;

impl UnitKind for ByteRateKind {
    const NAME: &'static str = "ByteRate";
    const MAGNITUDES: &'static [Magnitude] = &[
        Magnitude {
            aliases: &["TBps", "TB/s"],
            factor: 1e12,
            is_default: false,
        },
        Magnitude {
            aliases: &["GBps", "GB/s"],
            factor: 1e9,
            is_default: false,
        },
        Magnitude {
            aliases: &["MBps", "MB/s"],
            factor: 1e6,
            is_default: false,
        },
        Magnitude {
            aliases: &["KBps", "KB/s"],
            factor: 1e3,
            is_default: false,
        },
        Magnitude {
            aliases: &["Bps", "B/s"],
            factor: 1.0,
            is_default: true,
        },
    ];
}

/// A byte rate, stored internally in bytes per second.
pub type ByteRate = Quantity<ByteRateKind>;

/// Marker for quantity-of-bytes values (transfer totals), base unit bytes,
/// using decimal (10³-based) magnitude steps, same as [`ByteRateKind`].
#[derive(Debug, Clone, Copy)]
pub struct ByteKind;

impl UnitKind for ByteKind {
    const NAME: &'static str = "Byte";
    const MAGNITUDES: &'static [Magnitude] = &[
        Magnitude {
            aliases: &["TBytes", "TB"],
            factor: 1e12,
            is_default: false,
        },
        Magnitude {
            aliases: &["GBytes", "GB"],
            factor: 1e9,
            is_default: false,
        },
        Magnitude {
            aliases: &["MBytes", "MB"],
            factor: 1e6,
            is_default: false,
        },
        Magnitude {
            aliases: &["KBytes", "KB"],
            factor: 1e3,
            is_default: false,
        },
        Magnitude {
            aliases: &["Bytes", "B"],
            factor: 1.0,
            is_default: true,
        },
    ];
}

/// A quantity of bytes, stored internally as a raw byte count.
pub type Byte = Quantity<ByteKind>;

/// Marker for percentage values; single magnitude.
#[derive(Debug, Clone, Copy)]
pub struct PercentageKind;

impl UnitKind for PercentageKind {
    const NAME: &'static str = "Percentage";
    const MAGNITUDES: &'static [Magnitude] = &[Magnitude {
        aliases: &["%"],
        factor: 1.0,
        is_default: true,
    }];
}

/// A percentage value, e.g. packet loss percentage.
pub type Percentage = Quantity<PercentageKind>;

/// Marker for packet-count values; single magnitude.
#[derive(Debug, Clone, Copy)]
pub struct PacketKind;

impl UnitKind for PacketKind {
    const NAME: &'static str = "Packet";
    const MAGNITUDES: &'static [Magnitude] = &[Magnitude {
        aliases: &["p", "packets"],
        factor: 1.0,
        is_default: true,
    }];
}

/// A packet count.
pub type Packet = Quantity<PacketKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_whitespace() {
        assert_eq!(Time::from_str("10ms").unwrap(), Time::from_base(0.01));
        assert_eq!(Time::from_str("10 ms").unwrap(), Time::from_base(0.01));
        assert_eq!(Time::from_str("1.5h").unwrap(), Time::from_base(5400.0));
    }

    #[test]
    fn bare_number_uses_default_magnitude() {
        // Time's default (order-1) magnitude is seconds.
        assert_eq!(Time::from_str("10").unwrap(), Time::from_base(10.0));
    }

    #[test]
    fn unknown_magnitude_is_an_error() {
        assert!(Time::from_str("10 fortnights").is_err());
    }

    #[test]
    fn optimal_scale_picks_largest_fitting_magnitude() {
        let t = Time::from_base(3_661.0);
        let (value, unit) = t.optimal_scale();
        assert_eq!(unit, "hour");
        assert!((value - 1.0172).abs() < 1e-3);
    }

    #[test]
    fn optimal_scale_of_zero_uses_default_magnitude() {
        let t = Time::from_base(0.0);
        assert_eq!(t.optimal_scale(), (0.0, "sec"));
    }

    #[test]
    fn optimal_combined_scale_decomposes_greedily() {
        let t = Time::from_base(3_665.0);
        let parts = t.optimal_combined_scale();
        assert_eq!(parts, vec![(1.0, "hour"), (1.0, "min"), (5.0, "sec")]);
    }

    #[test]
    fn addition_is_only_defined_within_a_kind() {
        let a = Time::from_base(1.0);
        let b = Time::from_base(2.0);
        assert_eq!((a + b).raw_value(), 3.0);
        // `a + BitRate::from_base(1.0)` does not compile: different `K`.
    }

    #[test]
    fn display_uses_optimal_scale() {
        let br = BitRate::from_base(1_500_000.0);
        assert_eq!(br.to_string(), "1.5 Mbps");
    }

    #[test]
    fn display_matches_spec_example() {
        let t = Time::from_str("1500 ms").unwrap();
        assert_eq!(t.to_string(), "1.5 sec");
    }

    #[test]
    fn byte_uses_decimal_tiers_like_byte_rate() {
        let b = Byte::from_str("1 KB").unwrap();
        assert_eq!(b.raw_value(), 1000.0);
    }

    #[test]
    fn alias_matching_is_case_sensitive() {
        assert!(Time::from_str("10 MS").is_err());
        assert!(Time::from_str("10 ms").is_ok());
    }
}
