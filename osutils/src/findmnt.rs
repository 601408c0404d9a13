use std::path::Path;

use pool_api::error::PoolError;

use crate::dependencies::Dependency;

/// Every mount point found at or below `root`, excluding `root` itself.
/// Used by the safety guard to block destructive operations when something
/// other than the pool manager has mounted something under the pool root.
pub fn sub_mounts(root: impl AsRef<Path>) -> Result<Vec<String>, PoolError> {
    let root = root.as_ref();
    let output = Dependency::Findmnt
        .cmd()
        .arg("-R")
        .arg("-o")
        .arg("TARGET")
        .arg("-n")
        .arg(root)
        .output();

    let output = match output {
        Ok(out) => match out.check_output() {
            Ok(s) => s,
            // findmnt exits 1 when the root itself isn't a mountpoint; that's
            // not a sub-mount, just "nothing is mounted here yet".
            Err(_) => return Ok(Vec::new()),
        },
        Err(e) => return Err(e),
    };

    Ok(output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && Path::new(line) != root)
        .map(str::to_owned)
        .collect())
}

pub fn is_mounted(path: impl AsRef<Path>) -> Result<bool, PoolError> {
    Ok(Dependency::Findmnt.cmd().arg(path.as_ref()).output()?.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_the_root_itself_from_sub_mounts() {
        let lines = "/mnt/media\n/mnt/media/disk1\n";
        let filtered: Vec<&str> = lines
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != "/mnt/media")
            .collect();
        assert_eq!(filtered, vec!["/mnt/media/disk1"]);
    }
}
