//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;
use strata_storage::{FsResources, StorageResult};

/// Configuration shared by the writer, reader and combiner.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for staging temp files (system temp dir if unset).
    pub tmp_dir: Option<PathBuf>,

    /// Minimum savings, in percent, for a column to be stored run-length compressed.
    pub rle_threshold_percent: u8,

    /// Maximum number of sources merged in one combine step.
    pub combine_chunk_size: usize,

    /// Delay before the reader's single retry of an apparently empty file.
    pub empty_file_retry_delay: Duration,

    /// Value reported as `host` in query responses (machine hostname if unset).
    pub host_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmp_dir: None,
            rle_threshold_percent: 30,
            combine_chunk_size: 100,
            empty_file_retry_delay: Duration::from_millis(50),
            host_id: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the staging directory.
    #[must_use]
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    /// Sets the run-length savings threshold.
    #[must_use]
    pub const fn rle_threshold_percent(mut self, percent: u8) -> Self {
        self.rle_threshold_percent = percent;
        self
    }

    /// Sets the combine fan-in.
    #[must_use]
    pub const fn combine_chunk_size(mut self, size: usize) -> Self {
        self.combine_chunk_size = size;
        self
    }

    /// Sets the empty-file retry delay.
    #[must_use]
    pub const fn empty_file_retry_delay(mut self, delay: Duration) -> Self {
        self.empty_file_retry_delay = delay;
        self
    }

    /// Sets the reported host name.
    #[must_use]
    pub fn host_id(mut self, host: impl Into<String>) -> Self {
        self.host_id = Some(host.into());
        self
    }

    /// Returns the configured host name, falling back to the machine's.
    #[must_use]
    pub fn resolve_host(&self) -> String {
        self.host_id.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        })
    }

    /// Filesystem resources staging temp files in `tmp_dir`.
    ///
    /// # Errors
    ///
    /// Fails if `tmp_dir` is set but is not a writable directory.
    pub fn resources(&self) -> StorageResult<FsResources> {
        match &self.tmp_dir {
            Some(dir) => FsResources::with_tmp_dir(dir.clone()),
            None => Ok(FsResources::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.rle_threshold_percent, 30);
        assert_eq!(config.combine_chunk_size, 100);
        assert_eq!(config.empty_file_retry_delay, Duration::from_millis(50));
        assert!(config.tmp_dir.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .rle_threshold_percent(50)
            .combine_chunk_size(4)
            .host_id("reader-01");

        assert_eq!(config.rle_threshold_percent, 50);
        assert_eq!(config.combine_chunk_size, 4);
        assert_eq!(config.resolve_host(), "reader-01");
    }

    #[test]
    fn resources_use_tmp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Config::new().tmp_dir(dir.path()).resources().unwrap();
        assert_eq!(resources.tmp_dir(), dir.path());

        let missing = Config::new().tmp_dir(dir.path().join("missing"));
        assert!(missing.resources().is_err());
    }

    #[test]
    fn host_falls_back_to_machine() {
        assert!(!Config::default().resolve_host().is_empty());
    }
}
