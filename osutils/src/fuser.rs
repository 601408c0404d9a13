use std::path::Path;

use pool_api::error::PoolError;

use crate::dependencies::Dependency;

/// PIDs of processes holding `path` open, via `fuser -m`. Best-effort: used
/// only to enrich an unmount-failure error message, never to gate the
/// unmount decision itself.
pub fn run(path: impl AsRef<Path>) -> Result<Vec<u32>, PoolError> {
    let output = Dependency::Fuser.cmd().arg("-m").arg(path.as_ref()).output()?;
    Ok(parse_pids(&output.output()))
}

fn parse_pids(output: &str) -> Vec<u32> {
    output
        .split_whitespace()
        .filter_map(|tok| tok.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pids_from_fuser_output() {
        assert_eq!(parse_pids("1234 5678c 910e"), vec![1234, 5678, 910]);
        assert_eq!(parse_pids(""), Vec::<u32>::new());
    }
}
