//! Spin state and temperature probing. Both commands are read-only queries
//! that never spin up a standby disk themselves — `hdparm -C` asks the
//! drive for its current state without issuing a reset, and `smartctl -A`
//! on a sleeping disk either fails fast or reports the cached value.

use std::path::Path;

use pool_api::error::{PoolError, PoolResultExt};
use regex::Regex;

use crate::dependencies::Dependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinState {
    Active,
    Standby,
    Unknown,
}

/// The three actions `controlDisk` can issue. Unlike [`spin_state`] and
/// [`temperature_celsius`], these are deliberate writes a caller asked for,
/// not a passive status probe, so issuing I/O to spin the disk up is fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Wake,
    Standby,
    Sleep,
}

/// `hdparm -y` (standby) and `-Y` (sleep, deeper power-down) put the drive
/// down immediately; waking one back up isn't a distinct hdparm verb, so a
/// single-sector direct read is used to force the drive to spin back up.
pub fn control(device: impl AsRef<Path>, action: PowerAction) -> Result<(), PoolError> {
    let device = device.as_ref();
    match action {
        PowerAction::Standby => {
            Dependency::Hdparm
                .cmd()
                .arg("-y")
                .arg(device)
                .run_and_check()
                .message(format!("while putting '{}' into standby", device.display()))
        }
        PowerAction::Sleep => {
            Dependency::Hdparm
                .cmd()
                .arg("-Y")
                .arg(device)
                .run_and_check()
                .message(format!("while putting '{}' to sleep", device.display()))
        }
        PowerAction::Wake => Dependency::Dd
            .cmd()
            .arg(format!("if={}", device.display()))
            .arg("of=/dev/null")
            .arg("bs=512")
            .arg("count=1")
            .arg("iflag=direct")
            .run_and_check()
            .message(format!("while waking '{}'", device.display())),
    }
}

/// `hdparm -C <device>` prints a line like `drive state is:  standby`.
pub fn spin_state(device: impl AsRef<Path>) -> Result<SpinState, PoolError> {
    let output = Dependency::Hdparm
        .cmd()
        .arg("-C")
        .arg(device.as_ref())
        .output_and_check()
        .message(format!("while querying spin state of '{}'", device.as_ref().display()))?;

    let state = output.lines().find_map(|line| line.split_once("drive state is:").map(|(_, s)| s.trim().to_lowercase()));
    Ok(match state.as_deref() {
        Some("active/idle") => SpinState::Active,
        Some("standby") => SpinState::Standby,
        _ => SpinState::Unknown,
    })
}

/// Reads the reported temperature from SMART attribute 194 (or 190 as a
/// fallback on drives that only populate that one). `None` when the device
/// doesn't report one, is asleep, or lacks SMART support entirely.
pub fn temperature_celsius(device: impl AsRef<Path>) -> Option<i32> {
    let output = Dependency::Smartctl.cmd().arg("-A").arg(device.as_ref()).output_and_check().ok()?;
    parse_temperature(&output)
}

fn parse_temperature(output: &str) -> Option<i32> {
    let re = Regex::new(r"(?m)^\s*(?:194|190)\s+\S.*?\s(-?\d+)\s*(?:\(.*\))?\s*$").ok()?;
    output.lines().find_map(|line| re.captures(line).and_then(|c| c[1].parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_temperature_from_attribute_194() {
        let sample = "194 Temperature_Celsius     0x0022   118   108   000    Old_age   Always       -       32";
        assert_eq!(parse_temperature(sample), Some(32));
    }

    #[test]
    fn missing_temperature_attribute_is_none() {
        assert_eq!(parse_temperature("no matching lines here"), None);
    }
}
