//! Consumer configuration, loadable from TOML
//!
//! ```toml
//! cacheMode = "disk"
//! cacheDirectory = "/tmp/swath-cache"
//! cachePrefix = "run01"
//! toleranceAbs = 1e-5
//! usePreScan = true
//! peakEncoding = "high_res"
//! threads = 4
//! windowsFile = "swath_windows.tsv"
//! sortSwathMaps = true
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SwathError;
use crate::model::{PeakEncoding, DEFAULT_WINDOW_TOLERANCE};
use crate::sink::SinkKind;

/// Where the spectra of each map are kept while consuming
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CacheMode {
    /// Every map in memory
    #[default]
    Memory,
    /// Every map in a disk cache under `cache_directory`
    Disk,
    /// One input file per window; cached if `cache_directory` is set
    SplitFiles,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwathConfig {
    pub cache_mode: CacheMode,
    pub cache_directory: Option<PathBuf>,
    pub cache_prefix: String,
    /// Absolute m/z tolerance for isolation window identity
    pub tolerance_abs: f64,
    /// Run a metadata-only pass before consuming
    pub use_pre_scan: bool,
    pub peak_encoding: PeakEncoding,
    /// Reload threads at finalize, all cores when unset
    pub threads: Option<usize>,
    /// Window bounds overriding the ones found in the data
    pub windows_file: Option<PathBuf>,
    /// Sort the windows file entries by lower bound before annotating
    pub sort_swath_maps: bool,
}

impl Default for SwathConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            cache_directory: None,
            cache_prefix: "swath".to_string(),
            tolerance_abs: DEFAULT_WINDOW_TOLERANCE,
            use_pre_scan: false,
            peak_encoding: PeakEncoding::default(),
            threads: None,
            windows_file: None,
            sort_swath_maps: false,
        }
    }
}

impl SwathConfig {
    /// In-memory configuration
    pub fn memory() -> Self {
        Self::default()
    }

    /// Disk cache configuration writing to `directory`
    pub fn disk(directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_mode: CacheMode::Disk,
            cache_directory: Some(directory.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SwathConfig =
            toml::from_str(content).map_err(|e| SwathError::Config(format!("failed to parse TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SwathError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance_abs.is_finite() || self.tolerance_abs < 0.0 {
            return Err(SwathError::Config(format!(
                "toleranceAbs must be finite and non-negative, got {}",
                self.tolerance_abs
            ))
            .into());
        }

        if self.cache_mode == CacheMode::Disk && self.cache_directory.is_none() {
            return Err(SwathError::Config("cacheMode 'disk' requires a cacheDirectory".to_string()).into());
        }

        if self.cache_prefix.is_empty() && self.cache_directory.is_some() {
            return Err(SwathError::Config("cachePrefix must not be empty".to_string()).into());
        }

        if self.threads == Some(0) {
            return Err(SwathError::Config("threads must be at least 1".to_string()).into());
        }

        Ok(())
    }

    /// Storage used by every sink
    pub fn sink_kind(&self) -> SinkKind {
        match (self.cache_mode, &self.cache_directory) {
            (CacheMode::Memory, _) | (CacheMode::SplitFiles, None) => SinkKind::Memory,
            (CacheMode::Disk, Some(directory)) | (CacheMode::SplitFiles, Some(directory)) => SinkKind::Disk {
                directory: directory.clone(),
                prefix: self.cache_prefix.clone(),
                peak_encoding: self.peak_encoding,
            },
            // rejected by validate()
            (CacheMode::Disk, None) => SinkKind::Memory,
        }
    }
}
