//! Read command implementation.

use std::io::Read as _;
use strata_core::{Config, Profile, Reader};
use tracing::debug;

/// Runs the read command.
///
/// The payload is printed even when the query fails, since it carries the
/// error state; the failure is then returned as well.
pub fn run(workload: &str, profile: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workload = load_workload(workload)?;
    let mut reader = Reader::new(Config::default())?;
    let mut laps = if profile {
        Profile::new()
    } else {
        Profile::disabled()
    };

    let outcome = reader.run_from_workload_profiled(&workload, &mut laps);
    if let Some(metadata) = reader.metadata() {
        debug!("Query finished with status {:?}", metadata.status);
    }
    println!("{}", reader.response_payload()?);
    if profile {
        eprint!("{}", laps.report());
    }
    outcome?;
    Ok(())
}

/// Resolves `@path` and `-` (stdin) to their contents.
pub fn load_workload(arg: &str) -> Result<String, Box<dyn std::error::Error>> {
    if arg == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else if let Some(path) = arg.strip_prefix('@') {
        Ok(std::fs::read_to_string(path)?)
    } else {
        Ok(arg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_workload() {
        assert_eq!(load_workload("{}").unwrap(), "{}");
    }

    #[test]
    fn test_workload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.json");
        std::fs::write(&path, "{\"date\":\"2024-03-01\"}").unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(load_workload(&arg).unwrap(), "{\"date\":\"2024-03-01\"}");
    }

    #[test]
    fn test_missing_workload_file() {
        assert!(load_workload("@/definitely/not/here.json").is_err());
    }
}
