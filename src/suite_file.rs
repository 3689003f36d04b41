//! # Suite File Parsing
//!
//! Two ways to build a [`SpeedTestSuite`]: [`load_file`] parses the
//! INI-like sectioned format (a `[global]` section for suite-level
//! defaults, then one section per test), and [`parse_command_line`]
//! parses the comma-separated short form accepted by the CLI's
//! `--profiles` flag. Grounded on the original's `io/suite.py`
//! (`load_file`, `parse_command_line`), with a hand-rolled INI reader in
//! place of `ConfigParser` since nothing else in this crate needs a
//! general-purpose INI dependency.

use crate::error::{NstsError, SuiteParseError};
use crate::options::Options;
use crate::profiles::{self, ExecutionDirection};
use crate::speedtest::{speed_test_options_descriptor, SpeedTest, SpeedTestSuite};
use std::str::FromStr;

/// One `[section]` block: its name and its `key = value` lines in file
/// order. Keys may repeat the order in which they were written; later
/// duplicate keys overwrite earlier ones, same as `ConfigParser`.
struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

fn parse_ini(content: &str) -> Result<Vec<IniSection>, SuiteParseError> {
    let mut sections = Vec::new();
    let mut current: Option<IniSection> = None;

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            let name = line
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(|| SuiteParseError::Malformed {
                    context: format!("line {}", lineno + 1),
                    detail: format!("malformed section header: {line}"),
                })?;
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some(IniSection {
                name: name.trim().to_string(),
                entries: Vec::new(),
            });
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| SuiteParseError::Malformed {
            context: format!("line {}", lineno + 1),
            detail: format!("expected 'key = value', got: {line}"),
        })?;
        let key = key.trim().to_string();
        let value = value.trim().to_string();
        let section = current.as_mut().ok_or_else(|| SuiteParseError::Malformed {
            context: format!("line {}", lineno + 1),
            detail: "option outside any section".to_string(),
        })?;
        if let Some(existing) = section.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            section.entries.push((key, value));
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }
    Ok(sections)
}

fn apply_suite_options(options: &mut Options, entries: &[(String, String)]) -> Result<(), SuiteParseError> {
    for (key, value) in entries {
        options
            .set_str(key, value)
            .map_err(|source| SuiteParseError::InvalidOption {
                context: "global".to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Parse a suite file's full text into a [`SpeedTestSuite`].
pub fn load_file(content: &str) -> Result<SpeedTestSuite, NstsError> {
    let sections = parse_ini(content)?;
    let mut suite = SpeedTestSuite::new();
    let mut suite_options = speed_test_options_descriptor().instantiate();

    for section in &sections {
        if section.name == "global" {
            apply_suite_options(&mut suite_options, &section.entries)?;
            continue;
        }

        let profile_id = section
            .entries
            .iter()
            .find(|(k, _)| k == "profile")
            .map(|(_, v)| v.clone())
            .ok_or_else(|| SuiteParseError::MissingProfile {
                context: section.name.clone(),
            })?;
        let profile = profiles::get_profile(&profile_id).ok_or_else(|| SuiteParseError::Malformed {
            context: section.name.clone(),
            detail: format!("unknown profile '{profile_id}'"),
        })?;

        let directions: Vec<ExecutionDirection> = match section.entries.iter().find(|(k, _)| k == "direction") {
            Some((_, v)) => vec![ExecutionDirection::from_str(v).map_err(|e| SuiteParseError::Malformed {
                context: section.name.clone(),
                detail: e.to_string(),
            })?],
            None => vec![ExecutionDirection::Send, ExecutionDirection::Receive],
        };

        let prefix = format!("{profile_id}.");
        let profile_option_entries: Vec<(String, String)> = section
            .entries
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix.as_str()).map(|stripped| (stripped.to_string(), v.clone())))
            .collect();
        let test_option_entries: Vec<(String, String)> = section
            .entries
            .iter()
            .filter(|(k, _)| k != "profile" && k != "direction" && !k.starts_with(prefix.as_str()))
            .cloned()
            .collect();

        for direction in directions {
            let mut profile_options = profile.supported_options.instantiate();
            for (k, v) in &profile_option_entries {
                profile_options
                    .set_str(k, v)
                    .map_err(|source| SuiteParseError::InvalidOption {
                        context: section.name.clone(),
                        source,
                    })?;
            }

            let mut test = SpeedTest::new(profile, direction, profile_options);
            test.options = suite_options.clone();
            for (k, v) in &test_option_entries {
                test.options
                    .set_str(k, v)
                    .map_err(|source| SuiteParseError::InvalidOption {
                        context: section.name.clone(),
                        source,
                    })?;
            }
            suite.add_test(test);
        }
    }

    suite.options = Some(suite_options);
    Ok(suite)
}

/// Parse the short comma-separated `--profiles` form, e.g.
/// `"dummy,iperf_tcp-s,ping-r"`.
pub fn parse_command_line(spec: &str) -> Result<SpeedTestSuite, NstsError> {
    let mut suite = SpeedTestSuite::new();

    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (profile_id, directions) = match entry.rsplit_once('-') {
            Some((id, dir)) if matches!(dir, "s" | "r" | "send" | "receive") => {
                let direction = ExecutionDirection::from_str(dir).map_err(|e| SuiteParseError::Malformed {
                    context: entry.to_string(),
                    detail: e.to_string(),
                })?;
                (id, vec![direction])
            }
            _ => (entry, vec![ExecutionDirection::Send, ExecutionDirection::Receive]),
        };

        let profile = profiles::get_profile(profile_id).ok_or_else(|| SuiteParseError::Malformed {
            context: entry.to_string(),
            detail: format!("unknown profile '{profile_id}'"),
        })?;

        for direction in directions {
            let profile_options = profile.supported_options.instantiate();
            suite.add_test(SpeedTest::new(profile, direction, profile_options));
        }
    }
    suite.options = Some(speed_test_options_descriptor().instantiate());
    Ok(suite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_example() {
        let content = "\
[global]
samples = 4
interval = 1 sec
[tcp]
profile = iperf_tcp
direction = send
iperf_tcp.time = 5 sec
";
        let suite = load_file(content).unwrap();
        assert_eq!(suite.tests.len(), 1);
        let test = &suite.tests[0];
        assert_eq!(test.profile.id, "iperf_tcp");
        assert!(test.direction.is_send());
        let time = test
            .profile_options
            .get("time")
            .unwrap()
            .as_unit()
            .unwrap()
            .as_time()
            .unwrap();
        assert_eq!(time.raw_value(), 5.0);

        let suite_opts = suite.options.unwrap();
        assert_eq!(suite_opts.get("samples").unwrap().as_int(), Some(4));
        let interval = suite_opts.get("interval").unwrap().as_unit().unwrap().as_time().unwrap();
        assert_eq!(interval.raw_value(), 1.0);
    }

    #[test]
    fn section_without_profile_key_is_rejected() {
        let content = "[tcp]\ndirection = send\n";
        assert!(load_file(content).is_err());
    }

    #[test]
    fn bare_section_without_direction_expands_to_both() {
        let content = "[x]\nprofile = dummy\n";
        let suite = load_file(content).unwrap();
        assert_eq!(suite.tests.len(), 2);
    }

    #[test]
    fn short_form_bidirectional_and_unidirectional() {
        let suite = parse_command_line("dummy,ping-r").unwrap();
        assert_eq!(suite.tests.len(), 3);
        assert!(suite.tests[0].direction.is_send());
        assert!(suite.tests[1].direction.is_receive());
        assert!(suite.tests[2].direction.is_receive());
    }
}
