//! `executeNonRaidParityOperation`: drives the array's parity check/resync
//! state machine through `/proc/nmdcmd`.

use osutils::nonraid;
use pool_api::{
    config::pool::{Pool, PoolType},
    error::{PoolError, ValidationError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonraidParityOperation {
    Check,
    Scrub,
    Pause,
    Resume,
    Cancel,
    /// Toggles between `check NOCORRECT` (when idle) and `cancel` (when a
    /// sync is already running), so a caller never has to track array state
    /// itself just to know which of the two to send.
    Auto,
}

impl NonraidParityOperation {
    fn command(self, status: &nonraid::NmdStatus) -> &'static str {
        match self {
            NonraidParityOperation::Check => "check NOCORRECT",
            NonraidParityOperation::Scrub => "check CORRECT",
            NonraidParityOperation::Pause => "pause",
            NonraidParityOperation::Resume => "resume",
            NonraidParityOperation::Cancel => "cancel",
            NonraidParityOperation::Auto => {
                if status.is_running() {
                    "cancel"
                } else {
                    "check NOCORRECT"
                }
            }
        }
    }
}

pub fn execute(pool: &Pool, operation: NonraidParityOperation) -> Result<(), PoolError> {
    if pool.pool_type != PoolType::Nonraid {
        return Err(PoolError::new(ValidationError::Other(format!("pool '{}' is not a NonRAID array", pool.name))));
    }

    let status = nonraid::NmdStatus::read()?;
    match operation {
        NonraidParityOperation::Check | NonraidParityOperation::Scrub => {
            if status.is_running() {
                return Err(PoolError::new(pool_api::error::PreconditionError::AlreadyMounted { name: pool.name.clone() }));
            }
        }
        NonraidParityOperation::Pause | NonraidParityOperation::Resume | NonraidParityOperation::Cancel => {
            if !status.is_running() && !status.is_paused() {
                return Err(PoolError::new(pool_api::error::PreconditionError::NotMounted { name: pool.name.clone() }));
            }
        }
        NonraidParityOperation::Auto => {}
    }

    nonraid::write_command(operation.command(&status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_api::config::{options::PoolConfig, pool::PoolType as PT};

    fn nonraid_pool() -> Pool {
        Pool {
            id: "1".into(),
            name: "array".into(),
            index: 0,
            comment: String::new(),
            automount: true,
            pool_type: PT::Nonraid,
            data_devices: vec![],
            parity_devices: vec![],
            config: PoolConfig::default(),
            devices: vec![],
        }
    }

    #[test]
    fn refuses_non_nonraid_pool() {
        let mut pool = nonraid_pool();
        pool.pool_type = PT::Btrfs;
        let err = execute(&pool, NonraidParityOperation::Check).unwrap_err();
        assert!(matches!(err.kind(), pool_api::error::ErrorKind::Validation(_)));
    }

    #[test]
    fn auto_picks_check_when_idle_and_cancel_when_running() {
        let idle = nonraid::NmdStatus::default();
        assert_eq!(NonraidParityOperation::Auto.command(&idle), "check NOCORRECT");
    }
}
