use std::{
    borrow::Cow,
    fmt::Debug,
    panic::Location,
};

/// User input was rejected before any device was touched: bad name, wrong
/// filesystem, slot exhaustion, size violation, conflict with an existing
/// pool, missing passphrase for encryption.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Pool name '{name}' is already in use")]
    NameInUse { name: String },
    #[error("Pool name '{name}' is not filesystem-safe")]
    InvalidName { name: String },
    #[error("No pool named '{name}' exists")]
    NoSuchPool { name: String },
    #[error("Filesystem '{filesystem}' is not valid for a {pool_type} pool")]
    UnsupportedFilesystem {
        filesystem: String,
        pool_type: String,
    },
    #[error("raid_level '{raid_level}' requires at least {minimum} devices, got {actual}")]
    NotEnoughDevices {
        raid_level: String,
        minimum: usize,
        actual: usize,
    },
    #[error("No free slot available in pool '{pool}'")]
    SlotExhausted { pool: String },
    #[error(
        "Parity device must be at least as large as the largest data device ({largest_data_bytes} bytes), got {parity_bytes} bytes"
    )]
    ParityTooSmall {
        parity_bytes: u64,
        largest_data_bytes: u64,
    },
    #[error("Encryption requires a passphrase or create_keyfile: true")]
    MissingPassphrase,
    #[error("{0}")]
    Other(String),
}

/// The live system state does not satisfy a precondition of the requested
/// operation: pool already/not mounted, sub-mounts present, a dependent
/// service still has paths open under the pool.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Pool '{name}' is not mounted")]
    NotMounted { name: String },
    #[error("Pool '{name}' is already mounted")]
    AlreadyMounted { name: String },
    #[error("Device '{path}' is already mounted at '{at}'")]
    DeviceAlreadyMountedElsewhere { path: String, at: String },
    #[error("Pool '{name}' has sub-mounts under its root: {mounts:?}")]
    BusySubMounts { name: String, mounts: Vec<String> },
    #[error("Pool '{name}' has dependent services using paths under it: {paths:?}")]
    DependentServices { name: String, paths: Vec<String> },
    #[error("Missing data devices ({missing}) exceed available parity ({parity}) for degraded mount of pool '{name}'")]
    DegradedMountNotPossible {
        name: String,
        missing: usize,
        parity: usize,
    },
    #[error("Pool '{name}' is missing {missing} data device(s); retry with mount_missing to start degraded")]
    MissingDevicesRequireFlag { name: String, missing: usize },
    #[error("Only one NonRAID pool may exist per host; '{existing}' already has that role")]
    NonRaidAlreadyExists { existing: String },
    #[error("RAID level change refused: 50% free space required, {available_pct}% available")]
    InsufficientFreeSpaceForConvert { available_pct: u8 },
}

/// An external tool exited with a nonzero status; stderr is carried in the message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("'{command}' failed: {detail}")]
pub struct SubsystemError {
    pub command: String,
    pub detail: String,
}

/// Persisted state could not be trusted: manifest parse failure, missing
/// expected companion file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Failed to parse manifest at '{path}'")]
    ManifestParse { path: String },
    #[error("Expected SnapRAID config at '{path}' but it is missing")]
    MissingSnapraidConfig { path: String },
    #[error("Mapping from mount point '{mount_point}' to SnapRAID data identifier failed")]
    UnknownSnapraidBranch { mount_point: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Precondition(#[from] PreconditionError),
    #[error("{0}")]
    Subsystem(#[from] SubsystemError),
    #[error("{0}")]
    Integrity(#[from] IntegrityError),
}

/// The pool manager's top-level error type.
///
/// Carries the call site that raised it and a chain of human-readable
/// context messages, mirroring an `anyhow::Error` but keeping the original
/// [`ErrorKind`] available for callers that want to match on category (for
/// example, to decide whether `force: true` should downgrade the error).
pub struct PoolError {
    kind: ErrorKind,
    location: &'static Location<'static>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
    source: Option<anyhow::Error>,
}

impl PoolError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            location: Location::caller(),
            context: Vec::new(),
            source: None,
        }
    }

    #[track_caller]
    pub fn with_source(kind: impl Into<ErrorKind>, source: anyhow::Error) -> Self {
        Self {
            kind: kind.into(),
            location: Location::caller(),
            context: Vec::new(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// `force: true` downgrades precondition errors in the unmount/remove
    /// path per the propagation policy; this lets callers check that
    /// without string-matching the message.
    pub fn is_precondition(&self) -> bool {
        matches!(self.kind, ErrorKind::Precondition(_))
    }
}

/// Converts any `Result<T, E>` into a `Result<T, PoolError>` by attaching a
/// structured [`ErrorKind`], keeping the original error as the source chain.
pub trait ReportError<T, K> {
    fn structured(self, kind: K) -> Result<T, PoolError>;
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, PoolError> {
        self.map_err(|e| PoolError::with_source(kind, e.into()))
    }
}

/// Attaches an additional context message to an existing [`PoolError`]
/// without discarding its [`ErrorKind`] or source chain.
pub trait PoolResultExt<T> {
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, PoolError>;
}

impl<T> PoolResultExt<T> for Result<T, PoolError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, PoolError> {
        if let Err(ref mut e) = self {
            e.context.push((context.into(), Location::caller()));
        }
        self
    }
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Debug for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.kind,
            self.location.file(),
            self.location.line()
        )?;

        if !self.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.context.iter().enumerate() {
                write!(f, "{i: >5}: {context} at {}:{}", location.file(), location.line())?;
                writeln!(f)?;
            }
        }

        if let Some(ref source) = self.source {
            writeln!(f, "\nCaused by:")?;
            for (i, cause) in source.chain().enumerate() {
                writeln!(f, "{i: >5}: {cause}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_preserves_kind_and_source() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("blkid exited 1"));
        let err = result
            .structured(SubsystemError {
                command: "blkid".into(),
                detail: "device not found".into(),
            })
            .unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Subsystem(_)));
        assert!(format!("{err:?}").contains("Caused by"));
    }

    #[test]
    fn message_appends_context_without_losing_kind() {
        let err: Result<(), PoolError> =
            Err(PoolError::new(ValidationError::MissingPassphrase));
        let err = err.message("while creating pool 'vault'").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
        assert!(format!("{err:?}").contains("while creating pool 'vault'"));
    }

    #[test]
    fn force_downgrades_only_precondition_errors() {
        let precondition = PoolError::new(PreconditionError::AlreadyMounted {
            name: "vault".into(),
        });
        assert!(precondition.is_precondition());

        let validation = PoolError::new(ValidationError::MissingPassphrase);
        assert!(!validation.is_precondition());
    }
}
