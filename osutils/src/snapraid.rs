use std::{
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};
use regex::Regex;

use crate::dependencies::Dependency;

/// Tail window read from a pool's progress socket when parsing status.
const PROGRESS_TAIL_BYTES: u64 = 1024;

pub fn socket_path(pool_name: &str) -> PathBuf {
    PathBuf::from(format!("/run/snapraid/{pool_name}.socket"))
}

pub fn is_running(pool_name: &str) -> bool {
    socket_path(pool_name).exists()
}

/// One data branch entry (`data dN <path>`) in config generation order.
pub struct DataBranch {
    pub identifier: String,
    pub path: PathBuf,
}

/// Generates the SnapRAID config content for `pool_name`. Parity and
/// 2-parity naming is uniform across create and update: `parity`/`2-parity`,
/// never the legacy single/dual-specific naming some deployments carry.
pub fn render_config(pool_name: &str, data_branches: &[DataBranch], parity_slots: &[String]) -> String {
    let mut out = String::new();

    for (index, slot) in parity_slots.iter().enumerate() {
        let label = if index == 0 { "parity".to_string() } else { format!("{}-parity", index + 1) };
        let mount = pool_api::constants::snapraid_parity_mount_point(pool_name, slot);
        out.push_str(&format!("{label} {mount}/.snapraid.{label}\n"));
    }

    for branch in data_branches {
        out.push_str(&format!("content  {}/.snapraid\n", branch.path.display()));
    }
    for (index, slot) in parity_slots.iter().enumerate() {
        let label = if index == 0 { "parity".to_string() } else { format!("{}-parity", index + 1) };
        let mount = pool_api::constants::snapraid_parity_mount_point(pool_name, slot);
        out.push_str(&format!("content  {mount}/.snapraid.content\n"));
    }

    for branch in data_branches {
        out.push_str(&format!("data {}  {}\n", branch.identifier, branch.path.display()));
    }

    out.push_str("exclude *.bak\n");
    out.push_str("exclude *.tmp\n");
    out.push_str("exclude .snapraid*\n");
    out.push_str("exclude lost+found/\n");

    out
}

pub fn write_config(pool_name: &str, contents: &str) -> Result<(), PoolError> {
    let path = pool_api::constants::snapraid_config_path(pool_name);
    if let Some(parent) = Path::new(&path).parent() {
        fs::create_dir_all(parent).structured(SubsystemError {
            command: "snapraid config".into(),
            detail: format!("failed to create '{}'", parent.display()),
        })?;
    }
    fs::write(&path, contents).structured(SubsystemError {
        command: "snapraid config".into(),
        detail: format!("failed to write '{path}'"),
    })
}

/// Resolves the `dN` identifier for `mount_point` by scanning the config's
/// `data dN <path>` lines. Fails hard: `fix` must never guess a branch.
pub fn branch_identifier_for_mount(pool_name: &str, mount_point: &Path) -> Result<String, PoolError> {
    let config_path = pool_api::constants::snapraid_config_path(pool_name);
    let contents = fs::read_to_string(&config_path).structured(SubsystemError {
        command: "snapraid config".into(),
        detail: format!("failed to read '{config_path}'"),
    })?;

    contents
        .lines()
        .filter_map(|line| line.strip_prefix("data "))
        .find_map(|rest| {
            let mut parts = rest.split_whitespace();
            let identifier = parts.next()?;
            let path = parts.next()?;
            (Path::new(path) == mount_point).then(|| identifier.to_string())
        })
        .ok_or_else(|| {
            PoolError::new(pool_api::error::IntegrityError::UnknownSnapraidBranch {
                mount_point: mount_point.display().to_string(),
            })
        })
}

/// Runs the out-of-process vendor helper, e.g.
/// `mos-snapraid media sync` or `mos-snapraid media fix d1,d2`.
/// The helper detaches and manages its own socket; this call returns as
/// soon as it has been launched, not when the operation completes.
pub fn launch(pool_name: &str, operation: &str, branch_identifiers: &[String]) -> Result<(), PoolError> {
    let mut cmd = Dependency::MosSnapraid.cmd();
    cmd.arg(pool_name).arg(operation);
    if !branch_identifiers.is_empty() {
        cmd.arg(branch_identifiers.join(","));
    }
    cmd.run_and_check()
        .message(format!("while launching snapraid {operation} for pool '{pool_name}'"))
}

#[derive(Debug, PartialEq)]
pub enum ProgressStatus {
    Preparing,
    Running { percent: f32, speed: String, eta: String },
}

/// Parses the last ~1KB of the pool's progress socket file for a line like
/// `12.3%, 45 GB, 67 MB/s, 12 stripe/s, ..., 01:23 ETA`. If the socket
/// exists but carries no progress line yet, the operation is `preparing`.
pub fn read_progress(pool_name: &str) -> Result<ProgressStatus, PoolError> {
    let path = socket_path(pool_name);
    let mut file = fs::File::open(&path).structured(SubsystemError {
        command: "snapraid progress".into(),
        detail: format!("failed to open '{}'", path.display()),
    })?;

    let len = file
        .metadata()
        .structured(SubsystemError {
            command: "snapraid progress".into(),
            detail: format!("failed to stat '{}'", path.display()),
        })?
        .len();
    let start = len.saturating_sub(PROGRESS_TAIL_BYTES);
    file.seek(SeekFrom::Start(start)).structured(SubsystemError {
        command: "snapraid progress".into(),
        detail: format!("failed to seek '{}'", path.display()),
    })?;

    let mut tail = String::new();
    file.read_to_string(&mut tail).structured(SubsystemError {
        command: "snapraid progress".into(),
        detail: format!("failed to read '{}'", path.display()),
    })?;

    Ok(parse_progress(&tail))
}

fn parse_progress(tail: &str) -> ProgressStatus {
    let re = Regex::new(
        r"(?P<percent>\d+(?:\.\d+)?)%,\s*[\d.]+\s*(?:MB|GB|TB),\s*(?P<speed>[\d.]+\s*(?:MB|GB|TB)/s),\s*[\d.]+\s*stripe/s.*?(?P<eta>\d{1,2}:\d{2}(?::\d{2})?)\s*ETA",
    )
    .unwrap();

    match tail.lines().rev().find_map(|line| re.captures(line)) {
        Some(caps) => ProgressStatus::Running {
            percent: caps["percent"].parse().unwrap_or(0.0),
            speed: caps["speed"].to_string(),
            eta: caps["eta"].to_string(),
        },
        None => ProgressStatus::Preparing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_config_with_uniform_parity_naming() {
        let branches = vec![
            DataBranch { identifier: "d1".into(), path: PathBuf::from("/var/mergerfs/media/disk1") },
            DataBranch { identifier: "d2".into(), path: PathBuf::from("/var/mergerfs/media/disk2") },
        ];
        let config = render_config("media", &branches, &["1".into(), "2".into()]);
        assert!(config.contains("parity /var/snapraid/media/parity1/.snapraid.parity"));
        assert!(config.contains("2-parity /var/snapraid/media/parity2/.snapraid.2-parity"));
        assert!(config.contains("data d1  /var/mergerfs/media/disk1"));
    }

    #[test]
    fn parses_progress_line_from_tail() {
        let tail = "some noise\n12.3%, 45 GB, 67 MB/s, 12 stripe/s, blah blah, 01:23 ETA\n";
        assert_eq!(
            parse_progress(tail),
            ProgressStatus::Running { percent: 12.3, speed: "67 MB/s".into(), eta: "01:23".into() }
        );
    }

    #[test]
    fn no_progress_line_means_preparing() {
        assert_eq!(parse_progress("starting up\n"), ProgressStatus::Preparing);
    }
}
