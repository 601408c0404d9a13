use std::{path::Path, time::Duration};

use pool_api::error::{PoolError, ReportError, SubsystemError};

use crate::dependencies::Dependency;

/// `df` enrichment is best-effort status reporting, not a correctness
/// dependency, so it carries a mandatory timeout rather than blocking a
/// status query indefinitely on a wedged filesystem.
const DF_TIMEOUT: Duration = Duration::from_secs(5);

pub fn available_bytes(path: impl AsRef<Path>) -> Result<u64, PoolError> {
    let output = Dependency::Df
        .cmd()
        .args(["-B", "1", "--output=avail", "--exclude-type=cifs", "--exclude-type=nfs"])
        .arg(path.as_ref())
        .timeout(DF_TIMEOUT)
        .output_and_check()?;
    parse_available(&output)
}

pub fn used_bytes(path: impl AsRef<Path>) -> Result<u64, PoolError> {
    let output = Dependency::Df
        .cmd()
        .args(["-B", "1", "--output=used", "--exclude-type=cifs", "--exclude-type=nfs"])
        .arg(path.as_ref())
        .timeout(DF_TIMEOUT)
        .output_and_check()?;
    parse_available(&output)
}

fn parse_available(output: &str) -> Result<u64, PoolError> {
    output
        .lines()
        .nth(1)
        .ok_or_else(|| {
            PoolError::new(SubsystemError {
                command: Dependency::Df.name().into(),
                detail: "missing value line in df output".into(),
            })
        })?
        .trim()
        .parse()
        .structured(SubsystemError {
            command: Dependency::Df.name().into(),
            detail: "failed to parse df output as an integer".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_second_line_as_the_value() {
        assert_eq!(parse_available("Avail\n107074944").unwrap(), 107074944);
    }

    #[test]
    fn rejects_output_missing_the_value_line() {
        assert!(parse_available("1").is_err());
    }
}
