//! Fixed filesystem layout. These paths are the contract between this
//! crate and the rest of the host: changing any of them is a breaking
//! change for whatever reads `pools.json` or the generated unit/config
//! files directly.

pub const MANIFEST_PATH: &str = "/boot/config/pools.json";

pub const DEFAULT_OWNER_UID: u32 = 500;
pub const DEFAULT_OWNER_GID: u32 = 500;

pub fn pool_mount_point(name: &str) -> String {
    format!("/mnt/{name}")
}

pub fn mergerfs_branch_path(name: &str, slot: &str) -> String {
    format!("/var/mergerfs/{name}/disk{slot}")
}

pub fn snapraid_parity_mount_point(name: &str, slot: &str) -> String {
    format!("/var/snapraid/{name}/parity{slot}")
}

pub fn luks_keyfile_path(name: &str) -> String {
    format!("/boot/config/system/luks/{name}.key")
}

pub fn snapraid_config_path(name: &str) -> String {
    format!("/boot/config/snapraid/{name}.conf")
}

pub const NONRAID_SUPERBLOCK_PATH: &str = "/boot/config/system/nonraid.dat";

pub fn data_mapper_name(pool: &str, slot: &str) -> String {
    format!("{pool}_{slot}")
}

pub fn parity_mapper_name(pool: &str, slot: &str) -> String {
    format!("parity_{pool}_{slot}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_names_are_deterministic_from_pool_and_slot() {
        assert_eq!(data_mapper_name("media", "1"), "media_1");
        assert_eq!(parity_mapper_name("media", "1"), "parity_media_1");
    }
}
