//! # Speed Tests and Suites
//!
//! A [`SpeedTest`] binds one profile and direction to a set of profile
//! options and accumulates one [`ProfileExecution`] per sample taken
//! against it. [`SpeedTest::statistics`] reduces the raw per-sample
//! results into mean/min/max/population-stddev per declared result,
//! mirroring the original's `UnitsStatisticsArray` (the in-house,
//! non-numpy variant, since there is no numpy equivalent pulled into this
//! crate's dependency stack). A [`SpeedTestSuite`] is an ordered list of
//! `SpeedTest`s sharing one set of suite-level defaults.

use crate::error::{NstsError, OptionError};
use crate::options::{OptionType, Options, OptionsDescriptor};
use crate::profiles::{Profile, ProfileExecution};
use crate::units::Time;
use crate::value::{UnitValue, Value};
use std::collections::BTreeMap;

/// Options every speed test accepts regardless of profile: how many
/// samples to take, how far apart, and an optional display name.
pub fn speed_test_options_descriptor() -> OptionsDescriptor {
    let mut d = OptionsDescriptor::new();
    d.add_option("interval", "time to wait between samples", OptionType::Time, Value::from(Time::from_base(1.0)));
    d.add_option("samples", "number of samples to take", OptionType::Int, Value::Int(1));
    d.add_option("name", "display name for this test", OptionType::Str, Value::Str(String::new()));
    d
}

/// Mean, min, max, and population standard deviation of one declared
/// result across every sample taken so far, still unit-tagged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultStatistics {
    pub mean: UnitValue,
    pub min: UnitValue,
    pub max: UnitValue,
    pub std: UnitValue,
}

fn reduce_raw(values: &[f64]) -> (f64, f64, f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, min, max, variance.sqrt())
}

fn rebuild(template: &UnitValue, raw: f64) -> UnitValue {
    match template {
        UnitValue::Time(_) => UnitValue::Time(raw),
        UnitValue::BitRate(_) => UnitValue::BitRate(raw),
        UnitValue::ByteRate(_) => UnitValue::ByteRate(raw),
        UnitValue::Byte(_) => UnitValue::Byte(raw),
        UnitValue::Percentage(_) => UnitValue::Percentage(raw),
        UnitValue::Packet(_) => UnitValue::Packet(raw),
    }
}

/// One profile run in one direction, accumulating samples and reducing
/// them to summary statistics.
pub struct SpeedTest {
    pub profile: &'static Profile,
    pub direction: crate::profiles::ExecutionDirection,
    pub options: Options,
    pub profile_options: Options,
    pub samples: Vec<ProfileExecution>,
}

impl SpeedTest {
    pub fn new(
        profile: &'static Profile,
        direction: crate::profiles::ExecutionDirection,
        profile_options: Options,
    ) -> Self {
        Self {
            profile,
            direction,
            options: speed_test_options_descriptor().instantiate(),
            profile_options,
            samples: Vec::new(),
        }
    }

    /// Display name: the user-supplied `name` option if set, otherwise
    /// `"<profile name> (<direction>)"`.
    pub fn name(&self) -> String {
        let configured = self.options.get("name").ok().and_then(Value::as_str);
        match configured {
            Some(name) if !name.is_empty() => {
                format!("{} ({:?})", name, self.direction)
            }
            _ => format!("{} ({:?})", self.profile.name, self.direction),
        }
    }

    pub fn push_sample(&mut self, sample: ProfileExecution) {
        self.samples.push(sample);
    }

    /// Total wall-clock time spent across every sample taken so far.
    pub fn execution_time(&self) -> Time {
        self.samples
            .iter()
            .fold(Time::from_base(0.0), |acc, s| acc + s.execution_time())
    }

    /// Reduce every declared result across all samples into summary
    /// statistics. Fails if a sample is missing a declared result, or if
    /// no samples have been taken yet.
    pub fn statistics(&self) -> Result<BTreeMap<String, ResultStatistics>, NstsError> {
        let mut reduced = BTreeMap::new();
        for result in &self.profile.supported_results {
            let mut raw = Vec::with_capacity(self.samples.len());
            let mut template = None;
            for sample in &self.samples {
                let value = sample
                    .results()
                    .get(&result.id)
                    .and_then(Value::as_unit)
                    .ok_or_else(|| OptionError::UnknownOption(result.id.clone()))?;
                raw.push(match value {
                    UnitValue::Time(v)
                    | UnitValue::BitRate(v)
                    | UnitValue::ByteRate(v)
                    | UnitValue::Byte(v)
                    | UnitValue::Percentage(v)
                    | UnitValue::Packet(v) => *v,
                });
                template.get_or_insert(*value);
            }
            let Some(template) = template else {
                continue;
            };
            let (mean, min, max, std) = reduce_raw(&raw);
            reduced.insert(
                result.id.clone(),
                ResultStatistics {
                    mean: rebuild(&template, mean),
                    min: rebuild(&template, min),
                    max: rebuild(&template, max),
                    std: rebuild(&template, std),
                },
            );
        }
        Ok(reduced)
    }
}

/// An ordered collection of [`SpeedTest`]s sharing one set of
/// suite-level defaults (samples/interval), as parsed from a suite file
/// or assembled from the short command-line form.
#[derive(Default)]
pub struct SpeedTestSuite {
    pub tests: Vec<SpeedTest>,
    pub options: Option<Options>,
}

impl SpeedTestSuite {
    pub fn new() -> Self {
        Self {
            tests: Vec::new(),
            options: None,
        }
    }

    pub fn add_test(&mut self, test: SpeedTest) {
        self.tests.push(test);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsDescriptor;
    use crate::profiles;

    #[test]
    fn name_falls_back_to_profile_name_when_unset() {
        let profile = profiles::get_profile("dummy").unwrap();
        let test = SpeedTest::new(
            profile,
            profiles::ExecutionDirection::Send,
            OptionsDescriptor::new().instantiate(),
        );
        assert!(test.name().starts_with("Dummy"));
    }

    #[test]
    fn name_uses_configured_name_when_set() {
        let profile = profiles::get_profile("dummy").unwrap();
        let mut test = SpeedTest::new(
            profile,
            profiles::ExecutionDirection::Send,
            OptionsDescriptor::new().instantiate(),
        );
        test.options.set_str("name", "custom").unwrap();
        assert!(test.name().starts_with("custom"));
    }

    #[test]
    fn reduce_raw_computes_population_stddev() {
        let (mean, min, max, std) = reduce_raw(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert_eq!(min, 2.0);
        assert_eq!(max, 9.0);
        assert!((std - 2.0).abs() < 1e-9);
    }
}
