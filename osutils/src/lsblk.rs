use std::path::{Path, PathBuf};

use pool_api::{error::PoolError, primitives::bytes::ByteCount};
use serde::{Deserialize, Serialize};

use crate::dependencies::Dependency;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
struct LsBlkOutput {
    blockdevices: Vec<BlockDevice>,
}

/// A block device as reported by `lsblk --json`, trimmed to the fields this
/// crate actually reads.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    pub name: String,
    pub fstype: Option<String>,
    pub fssize: Option<ByteCount>,
    pub size: u64,
    #[serde(rename = "pkname")]
    pub parent_kernel_name: Option<PathBuf>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,
    #[serde(rename = "pttype")]
    pub partition_table_type: Option<String>,
    #[serde(default, rename = "type")]
    pub blkdev_type: BlockDeviceType,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockDeviceType {
    #[serde(alias = "part")]
    Partition,
    Crypt,
    Disk,
    Loop,
    #[default]
    #[serde(other)]
    Unknown,
}

pub fn list() -> Result<Vec<BlockDevice>, PoolError> {
    let result = Dependency::Lsblk
        .cmd()
        .arg("--json")
        .arg("--output-all")
        .arg("--bytes")
        .output_and_check()?;
    parse(result.as_str())
}

/// Direct children (partitions) of the given disk.
pub fn partitions_of(disk: impl AsRef<Path>) -> Result<Vec<BlockDevice>, PoolError> {
    Ok(get(disk)?.children)
}

pub fn get(device_path: impl AsRef<Path>) -> Result<BlockDevice, PoolError> {
    let result = Dependency::Lsblk
        .cmd()
        .arg("--json")
        .arg("--path")
        .arg(device_path.as_ref())
        .arg("--output-all")
        .arg("--bytes")
        .output_and_check()?;

    let mut parsed = parse(result.as_str())?;
    parsed
        .pop()
        .ok_or_else(|| PoolError::new(pool_api::error::SubsystemError {
            command: Dependency::Lsblk.name().into(),
            detail: format!("no block device found at '{}'", device_path.as_ref().display()),
        }))
}

fn parse(output: &str) -> Result<Vec<BlockDevice>, PoolError> {
    let parsed: LsBlkOutput = serde_json::from_str(output).map_err(|e| {
        PoolError::with_source(
            pool_api::error::SubsystemError {
                command: Dependency::Lsblk.name().into(),
                detail: "failed to parse lsblk JSON output".into(),
            },
            e.into(),
        )
    })?;
    Ok(parsed.blockdevices)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = indoc::indoc! {
        r#"
            {
                "blockdevices": [
                    {
                        "name": "/dev/sdb",
                        "fstype": null,
                        "fssize": null,
                        "size": 17179869184,
                        "pkname": null,
                        "pttype": "gpt",
                        "type": "disk",
                        "children": [
                            {
                                "name": "/dev/sdb1",
                                "fstype": "xfs",
                                "fssize": 17178820608,
                                "size": 17179344896,
                                "pkname": "/dev/sdb",
                                "pttype": null,
                                "type": "part",
                                "mountpoint": "/mnt/media"
                            }
                        ]
                    }
                ]
            }
        "#
    };

    #[test]
    fn parses_disk_with_one_partition() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].blkdev_type, BlockDeviceType::Disk);
        assert_eq!(parsed[0].children.len(), 1);
        assert_eq!(parsed[0].children[0].fstype.as_deref(), Some("xfs"));
        assert_eq!(
            parsed[0].children[0].mountpoint,
            Some(PathBuf::from("/mnt/media"))
        );
    }
}
