use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use log::warn;
use pool_api::error::{PoolError, PoolResultExt, ReportError, SubsystemError};
use rand::RngCore;
use regex::Regex;

use crate::dependencies::Dependency;

/// LUKS2 cipher for every volume this crate formats.
pub const CIPHER: &str = "aes-xts-plain64";
pub const KEY_SIZE: &str = "512";

/// Normalizes a passphrase sourced from an API call, a keyfile, or a
/// generated random value: trailing CR/LF are never part of the secret.
pub fn normalize_passphrase(raw: &str) -> String {
    raw.trim_end_matches(['\r', '\n']).to_string()
}

/// A random 32-character base64 passphrase, used when `create_keyfile` is
/// set and the caller didn't supply one.
fn generate_passphrase() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64_encode(&bytes)
}

fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

/// Ensures a keyfile exists for `pool`, generating a random passphrase and
/// writing it with mode 0600 if `create_keyfile` is set and none exists yet.
/// Returns the passphrase to use for `luksFormat`: keyfile contents take
/// priority over a caller-supplied passphrase when both exist.
pub fn setup_encryption(
    devices: &[PathBuf],
    keyfile_path: impl AsRef<Path>,
    passphrase: Option<&str>,
    create_keyfile: bool,
) -> Result<String, PoolError> {
    let keyfile_path = keyfile_path.as_ref();

    let passphrase = if keyfile_path.exists() {
        normalize_passphrase(&fs::read_to_string(keyfile_path).structured(SubsystemError {
            command: "luksFormat".into(),
            detail: format!("failed to read keyfile '{}'", keyfile_path.display()),
        })?)
    } else if create_keyfile && passphrase.unwrap_or("").is_empty() {
        let generated = generate_passphrase();
        write_keyfile(keyfile_path, &generated)?;
        generated
    } else {
        let passphrase = passphrase.unwrap_or("");
        if create_keyfile {
            write_keyfile(keyfile_path, passphrase)?;
        }
        normalize_passphrase(passphrase)
    };

    for device in devices {
        luks_format(device, &passphrase)?;
    }

    Ok(passphrase)
}

fn write_keyfile(path: &Path, contents: &str) -> Result<(), PoolError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).structured(SubsystemError {
            command: "luksFormat".into(),
            detail: format!("failed to create keyfile directory '{}'", parent.display()),
        })?;
    }
    fs::write(path, contents).structured(SubsystemError {
        command: "luksFormat".into(),
        detail: format!("failed to write keyfile '{}'", path.display()),
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).structured(SubsystemError {
        command: "luksFormat".into(),
        detail: format!("failed to chmod keyfile '{}'", path.display()),
    })
}

pub fn luks_format(device_path: impl AsRef<Path>, passphrase: &str) -> Result<(), PoolError> {
    Dependency::Cryptsetup
        .cmd()
        .arg("luksFormat")
        .arg("--type")
        .arg("luks2")
        .arg("--cipher")
        .arg(CIPHER)
        .arg("--key-size")
        .arg(KEY_SIZE)
        .arg("--batch-mode")
        .arg(device_path.as_ref())
        .stdin(normalize_passphrase(passphrase).into_bytes())
        .run_and_check()
        .message(format!(
            "while luksFormat'ing '{}'",
            device_path.as_ref().display()
        ))
}

/// Opens a LUKS2 device at mapper name `<pool>_<slot>` (or
/// `parity_<pool>_<slot>` when `is_parity`), returning `/dev/mapper/<name>`.
/// Idempotent: if the mapper already exists, its path is returned unchanged.
pub fn luks_open(
    device_path: impl AsRef<Path>,
    mapper_name: &str,
    passphrase: &str,
) -> Result<PathBuf, PoolError> {
    let mapper_path = PathBuf::from(format!("/dev/mapper/{mapper_name}"));
    if mapper_path.exists() {
        return Ok(mapper_path);
    }

    Dependency::Cryptsetup
        .cmd()
        .arg("luksOpen")
        .arg(device_path.as_ref())
        .arg(mapper_name)
        .stdin(normalize_passphrase(passphrase).into_bytes())
        .run_and_check()
        .message(format!(
            "while opening '{}' as '{mapper_name}'",
            device_path.as_ref().display()
        ))?;

    Ok(mapper_path)
}

/// Closes `<mapper_name>p1` first if present, then `<mapper_name>`. Falls
/// back to `dmsetup remove` on cryptsetup failure and only warns: a stuck
/// mapper at pool-teardown time must not abort the whole operation.
pub fn luks_close(mapper_name: &str) -> Result<(), PoolError> {
    let partition_mapper = format!("{mapper_name}p1");
    if PathBuf::from(format!("/dev/mapper/{partition_mapper}")).exists() {
        close_one(&partition_mapper);
    }

    if PathBuf::from(format!("/dev/mapper/{mapper_name}")).exists() {
        close_one(mapper_name);
    }

    Ok(())
}

fn close_one(name: &str) {
    let closed = Dependency::Cryptsetup.cmd().arg("luksClose").arg(name).run_and_check();
    if closed.is_err() {
        if let Err(e) = Dependency::Dmsetup.cmd().arg("remove").arg(name).run_and_check() {
            warn!("failed to remove stuck mapper '{name}' via dmsetup: {e}");
        }
    }
}

/// Recovers from a crashed prior run by closing any `/dev/mapper/` entry
/// whose name matches this pool's data or parity mapper naming scheme.
pub fn cleanup_existing_luks_mappers(pool: &str) -> Result<(), PoolError> {
    let pattern = format!(
        r"^({pool}_\d+|{pool}p\d+|parity_{pool}_\d+|parity_{pool}_\d+p\d+)$",
        pool = regex::escape(pool)
    );
    let re = Regex::new(&pattern).structured(SubsystemError {
        command: "cleanupExistingLuksMappers".into(),
        detail: "failed to compile mapper-name pattern".into(),
    })?;

    let entries = fs::read_dir("/dev/mapper").structured(SubsystemError {
        command: "cleanupExistingLuksMappers".into(),
        detail: "failed to read /dev/mapper".into(),
    })?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if re.is_match(&name) {
            close_one(&name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_newlines() {
        assert_eq!(normalize_passphrase("hunter2\r\n"), "hunter2");
        assert_eq!(normalize_passphrase("hunter2"), "hunter2");
    }

    #[test]
    fn generated_passphrase_is_32_characters() {
        assert_eq!(generate_passphrase().len(), 32);
    }

    #[test]
    fn mapper_cleanup_pattern_matches_data_and_parity_names() {
        let re = Regex::new(&format!(
            r"^({pool}_\d+|{pool}p\d+|parity_{pool}_\d+|parity_{pool}_\d+p\d+)$",
            pool = regex::escape("media")
        ))
        .unwrap();
        assert!(re.is_match("media_1"));
        assert!(re.is_match("media_1p1"));
        assert!(re.is_match("parity_media_1"));
        assert!(re.is_match("parity_media_1p1"));
        assert!(!re.is_match("other_1"));
        assert!(!re.is_match("media_1_extra"));
    }
}
