use std::path::Path;

use pool_api::error::PoolError;

use crate::dependencies::Dependency;

fn tag(device_path: impl AsRef<Path>, tag: &str) -> Result<String, PoolError> {
    Dependency::Blkid
        .cmd()
        .arg("-o")
        .arg("value")
        .arg("-s")
        .arg(tag)
        .arg(device_path.as_ref())
        .output_and_check()
        .map(|s| s.trim().to_owned())
}

pub fn filesystem_uuid(device_path: impl AsRef<Path>) -> Result<String, PoolError> {
    tag(device_path, "UUID")
}

pub fn partition_uuid(device_path: impl AsRef<Path>) -> Result<String, PoolError> {
    tag(device_path, "PARTUUID")
}

/// The filesystem or partition-table type `blkid` recognizes on the device,
/// if any. A bare partition table (`dos`/`gpt`) is not a filesystem.
pub fn probe_type(device_path: impl AsRef<Path>) -> Result<Option<String>, PoolError> {
    let value = tag(device_path, "TYPE").unwrap_or_default();
    Ok(if value.is_empty() { None } else { Some(value) })
}

pub fn partition_table_type(device_path: impl AsRef<Path>) -> Result<Option<String>, PoolError> {
    let value = tag(device_path, "PTTYPE").unwrap_or_default();
    Ok(if value.is_empty() { None } else { Some(value) })
}
