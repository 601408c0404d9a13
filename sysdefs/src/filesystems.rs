use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Filesystems this pool manager knows how to create and mount directly.
///
/// This is narrower than the general-purpose filesystem enums found in OS
/// deployment tooling: the pool manager only ever formats and mounts the
/// filesystems a storage pool can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Ext4,
    Xfs,
    Btrfs,
}

impl Filesystem {
    pub fn name(self) -> &'static str {
        match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Xfs => "xfs",
            Filesystem::Btrfs => "btrfs",
        }
    }
}

impl Display for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Filesystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(Filesystem::Ext4),
            "xfs" => Ok(Filesystem::Xfs),
            "btrfs" => Ok(Filesystem::Btrfs),
            other => Err(format!("Unsupported filesystem '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_name() {
        for fs in [Filesystem::Ext4, Filesystem::Xfs, Filesystem::Btrfs] {
            assert_eq!(fs.name().parse::<Filesystem>().unwrap(), fs);
        }
    }

    #[test]
    fn rejects_unknown_filesystem() {
        assert!("zfs".parse::<Filesystem>().is_err());
    }
}
