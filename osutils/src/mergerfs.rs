use std::path::{Path, PathBuf};

use pool_api::error::{PoolError, PoolResultExt};

use crate::dependencies::Dependency;

/// Mount options always present on a mergerfs union, regardless of the
/// pool's configured create/search policies.
pub const BASELINE_OPTIONS: &str =
    "defaults,allow_other,use_ino,cache.files=partial,dropcacheonclose=true";

/// Assembles the full `-o` option string from the pool's configured create
/// and search policies plus the fixed baseline.
pub fn build_options(create_policy: &str, search_policy: &str) -> String {
    format!("category.create={create_policy},category.search={search_policy},{BASELINE_OPTIONS}")
}

/// Mounts the union of `branches` at `target` via
/// `mergerfs -o <opts> <b1>:<b2>:... <target>`.
pub fn mount_union(
    branches: &[impl AsRef<Path>],
    target: impl AsRef<Path>,
    options: &str,
) -> Result<(), PoolError> {
    let branch_list = branches
        .iter()
        .map(|b| b.as_ref().display().to_string())
        .collect::<Vec<_>>()
        .join(":");

    Dependency::Mergerfs
        .cmd()
        .arg("-o")
        .arg(options)
        .arg(&branch_list)
        .arg(target.as_ref())
        .run_and_check()
        .message(format!("while mounting mergerfs union at '{}'", target.as_ref().display()))
}

pub fn unmount_union(target: impl AsRef<Path>) -> Result<(), PoolError> {
    crate::mount::unmount_device(target, false, false, 3)
}

/// Lowest slot number in `0..`, expressed as a string (mergerfs branch
/// slots are string-typed the same way pool device slots are), not present
/// in `taken`.
pub fn next_free_branch_slot(taken: &[String]) -> String {
    let mut n = 1u32;
    loop {
        let candidate = n.to_string();
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

pub fn branch_path(pool_name: &str, slot: &str) -> PathBuf {
    PathBuf::from(pool_api::constants::mergerfs_branch_path(pool_name, slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_combine_policies_with_baseline() {
        let opts = build_options("mfs", "ff");
        assert!(opts.starts_with("category.create=mfs,category.search=ff,"));
        assert!(opts.contains(BASELINE_OPTIONS));
    }

    #[test]
    fn next_free_branch_slot_fills_gap() {
        let taken = vec!["1".to_string(), "3".to_string()];
        assert_eq!(next_free_branch_slot(&taken), "2");
    }
}
