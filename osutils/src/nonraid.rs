use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::Path,
};

use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};

use crate::dependencies::Dependency;

pub const NMDCMD_PATH: &str = "/proc/nmdcmd";
pub const NMDSTAT_PATH: &str = "/proc/nmdstat";

/// Writes a single command line to the kernel module's command channel.
pub fn write_command(command: &str) -> Result<(), PoolError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .open(NMDCMD_PATH)
        .structured(SubsystemError {
            command: "nmdcmd".into(),
            detail: format!("failed to open '{NMDCMD_PATH}'"),
        })?;
    file.write_all(command.as_bytes()).structured(SubsystemError {
        command: "nmdcmd".into(),
        detail: format!("failed to write command '{command}'"),
    })
}

pub fn is_module_loaded() -> Result<bool, PoolError> {
    let output = Dependency::Lsmod.cmd().output_and_check()?;
    Ok(output.lines().any(|line| line.starts_with("md_nonraid") || line.starts_with("md-nonraid")))
}

pub fn load_module(superblock_path: impl AsRef<Path>) -> Result<(), PoolError> {
    Dependency::Modprobe
        .cmd()
        .arg("md-nonraid")
        .arg(format!("super={}", superblock_path.as_ref().display()))
        .run_and_check()
        .message("while loading md-nonraid")
}

pub fn unload_module() -> Result<(), PoolError> {
    Dependency::Modprobe
        .cmd()
        .arg("-r")
        .arg("md-nonraid")
        .run_and_check()
        .message("while unloading md-nonraid")
}

/// Parsed `key=value` snapshot of `/proc/nmdstat`.
#[derive(Debug, Clone, Default)]
pub struct NmdStatus {
    fields: HashMap<String, String>,
}

impl NmdStatus {
    pub fn read() -> Result<Self, PoolError> {
        let contents = fs::read_to_string(NMDSTAT_PATH).structured(SubsystemError {
            command: "nmdstat".into(),
            detail: format!("failed to read '{NMDSTAT_PATH}'"),
        })?;
        Ok(Self::parse(&contents))
    }

    fn parse(contents: &str) -> Self {
        let fields = contents
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn get_u64(&self, key: &str) -> u64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// A parity run is in progress iff `mdResyncAction` is non-empty and any
    /// of position/elapsed-time/bytes-done is nonzero.
    pub fn is_running(&self) -> bool {
        let action_present = self.get("mdResyncAction").map(|a| !a.is_empty()).unwrap_or(false);
        action_present
            && (self.get_u64("mdResyncPos") > 0
                || self.get_u64("mdResyncDt") > 0
                || self.get_u64("mdResyncDb") > 0)
    }

    pub fn is_paused(&self) -> bool {
        self.get_i64("sbSyncExit") == -4 && self.get_u64("mdResyncPos") > 0
    }

    pub fn is_cancelled(&self) -> bool {
        self.get_i64("sbSyncExit") == -4 && self.get_u64("mdResyncPos") == 0
    }

    /// Whole-percent progress, `mdResyncPos / mdResyncSize * 100`, floored.
    pub fn percent(&self) -> u8 {
        let size = self.get_u64("mdResyncSize");
        if size == 0 {
            return 0;
        }
        ((self.get_u64("mdResyncPos") as f64 / size as f64) * 100.0).floor() as u8
    }

    /// Bytes per second, derived from `mdResyncDb / mdResyncDt` (KiB/s) scaled to bytes/s.
    pub fn speed_bytes_per_sec(&self) -> f64 {
        let dt = self.get_u64("mdResyncDt");
        if dt == 0 {
            return 0.0;
        }
        (self.get_u64("mdResyncDb") as f64 / dt as f64) * 1024.0
    }

    /// Estimated remaining seconds, or `None` if speed is zero.
    pub fn eta_seconds(&self) -> Option<u64> {
        let speed = self.speed_bytes_per_sec();
        if speed <= 0.0 {
            return None;
        }
        let remaining_kib = self.get_u64("mdResyncSize").saturating_sub(self.get_u64("mdResyncPos"));
        Some((remaining_kib as f64 * 1024.0 / speed) as u64)
    }

    /// A data or parity slot is unhealthy unless its `rdevStatus.N` reads
    /// `DISK_OK` or `DISK_NP` (not present, i.e. intentionally empty).
    pub fn parity_valid(&self) -> bool {
        self.fields
            .iter()
            .filter(|(k, _)| k.starts_with("rdevStatus."))
            .all(|(_, v)| v == "DISK_OK" || v == "DISK_NP")
    }
}

/// Formats a duration as `M:SS` under an hour, `H:MM:SS` otherwise.
pub fn format_eta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Human description of a resync action code.
pub fn decode_action(action: &str) -> String {
    match action {
        "P" => "recon P".to_string(),
        "Q" => "recon Q".to_string(),
        "P Q" => "recon P Q".to_string(),
        a if a.starts_with('D') => format!("recon D{}", &a[1..]),
        "check P" => "check P".to_string(),
        "check Q" => "check Q".to_string(),
        "check P Q" => "check P Q".to_string(),
        "clear" => "clear".to_string(),
        "check" => "check".to_string(),
        _ => "idle".to_string(),
    }
}

/// Data slot (1..=28) to import line for `/proc/nmdcmd`.
pub fn import_data_line(slot: u8, device_basename: &str, size_kb: u64, uuid: &str) -> String {
    format!("import {slot} {device_basename} 0 {size_kb} 0 {uuid}")
}

/// Parity JSON-slot (1 or 2) maps to array slot (0 or 29 respectively).
pub fn parity_array_slot(json_slot: u8) -> u8 {
    match json_slot {
        1 => 0,
        2 => 29,
        other => other,
    }
}

pub fn import_parity_line(json_slot: u8, device_basename: &str, size_kb: u64, by_id_path: &str) -> String {
    format!(
        "import {} {device_basename} 0 {size_kb} 0 {by_id_path}",
        parity_array_slot(json_slot)
    )
}

/// Import line for a missing device during a degraded mount.
pub fn import_missing_line(slot: u8) -> String {
    format!("import {slot} '' 0 0 0 ''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status(action: &str, pos: u64, dt: u64, db: u64, size: u64) -> NmdStatus {
        let text = format!(
            "mdResyncAction={action}\nmdResyncPos={pos}\nmdResyncDt={dt}\nmdResyncDb={db}\nmdResyncSize={size}\nsbSyncExit=0\n"
        );
        NmdStatus::parse(&text)
    }

    #[test]
    fn detects_running_sync() {
        let status = sample_status("P", 1000, 5, 500, 10000);
        assert!(status.is_running());
        assert_eq!(status.percent(), 10);
    }

    #[test]
    fn idle_when_action_empty() {
        let status = sample_status("", 0, 0, 0, 0);
        assert!(!status.is_running());
    }

    #[test]
    fn parity_array_slots_map_to_ends() {
        assert_eq!(parity_array_slot(1), 0);
        assert_eq!(parity_array_slot(2), 29);
    }

    #[test]
    fn parity_valid_requires_ok_or_not_present() {
        let text = "rdevStatus.0=DISK_OK\nrdevStatus.1=DISK_NP\n";
        assert!(NmdStatus::parse(text).parity_valid());

        let text = "rdevStatus.0=DISK_OK\nrdevStatus.1=DISK_DSBL\n";
        assert!(!NmdStatus::parse(text).parity_valid());
    }

    #[test]
    fn formats_eta_under_and_over_an_hour() {
        assert_eq!(format_eta(125), "2:05");
        assert_eq!(format_eta(3725), "1:02:05");
    }

    #[test]
    fn pause_and_cancel_are_distinguished_by_position() {
        let text = "sbSyncExit=-4\nmdResyncPos=100\n";
        assert!(NmdStatus::parse(text).is_paused());

        let text = "sbSyncExit=-4\nmdResyncPos=0\n";
        assert!(NmdStatus::parse(text).is_cancelled());
    }
}
