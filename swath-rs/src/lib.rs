//! swath-rs: splitting SWATH/DIA acquisitions into per-window maps
//!
//! A streaming reader pushes the spectra of a data-independent acquisition
//! into a [`SwathFileConsumer`], which sorts them into one map for the MS1
//! spectra and one map per MS2 isolation window. Maps live either in memory
//! or in a disk cache (binary payload + SQLite index) to bound memory use.
//!
//! # Features
//!
//! - **Window discovery**: windows are detected on the fly, or taken from a metadata-only pre-scan
//! - **Disk caching**: peaks are streamed to disk, headers are indexed in a SQLite sidecar
//! - **Parallel reload**: cached maps are reopened on a rayon pool at finalize
//! - **SWATH windows file**: window bounds can be overridden from a text file
//! - **Split files**: one input file per window
//!
//! # Quick Start
//!
//! ```
//! use swath::{MsDataConsumer, SwathConfig, SwathFileLoader};
//! use swath::model::{Precursor, Spectrum, SpectrumHeader};
//!
//! let loader = SwathFileLoader::new(SwathConfig::memory()).unwrap();
//! let maps = loader.load(|consumer: &mut dyn MsDataConsumer| {
//!     for cycle in 0..3 {
//!         let id = cycle * 3;
//!         consumer.consume_spectrum(Spectrum::new(SpectrumHeader::new(id, "", 1, id as f32), Default::default()))?;
//!         for (i, target) in [412.5, 437.5].into_iter().enumerate() {
//!             let header = SpectrumHeader::new(id + 1 + i as i64, "", 2, id as f32)
//!                 .with_precursor(Precursor::new(target, 12.5, 12.5));
//!             consumer.consume_spectrum(Spectrum::new(header, Default::default()))?;
//!         }
//!     }
//!     Ok(())
//! }).unwrap();
//!
//! assert_eq!(maps.len(), 3);
//! assert!(maps[0].ms1);
//! assert_eq!((maps[1].lower, maps[1].upper), (400.0, 425.0));
//! ```
//!
//! # Module Organization
//!
//! - [`model`]: Core data structures (Spectrum, Precursor, IsolationWindow, ...)
//! - [`registry`] and [`router`]: window identity and spectrum routing
//! - [`sink`], [`swath_map`]: per-map storage during and after consumption
//! - [`consumer`], [`prescan`]: reader callbacks
//! - [`writer`], [`cache`], [`queries`], [`iterator`]: disk cache format
//! - [`config`], [`windows`], [`error`]

pub mod cache;
pub mod config;
pub mod consumer;
pub mod error;
pub mod iterator;
pub mod model;
pub mod prescan;
pub mod queries;
pub mod registry;
pub mod router;
pub mod sink;
pub mod swath_map;
pub mod windows;
pub mod writer;
pub mod xml;

pub use model::{
    Chromatogram, IsolationWindow, PeakEncoding, Precursor, Spectrum, SpectrumData, SpectrumHeader,
    DEFAULT_WINDOW_TOLERANCE, MS1_SENTINEL_MZ,
};

pub use cache::{CacheFilePaths, CachedSpectra};
pub use config::{CacheMode, SwathConfig};
pub use consumer::{ConsumerState, MsDataConsumer, SwathFileConsumer};
pub use error::{swath_error, SwathError};
pub use prescan::{PreScanCounter, PreScanResult};
pub use registry::IsolationWindowRegistry;
pub use router::{RouteTarget, WindowRouter};
pub use sink::{SinkKind, SwathMapSink};
pub use swath_map::{SpectrumAccessor, SwathMap};
pub use windows::{annotate_swath_maps, read_swath_windows};

use anyhow_ext::{Context, Result};
use log::info;

/// Runs the whole consumption of an acquisition with one configuration
///
/// A reader is a closure streaming the spectra of one input, in file order,
/// into the consumer it is given. With `usePreScan` it is called twice.
pub struct SwathFileLoader {
    config: SwathConfig,
}

impl SwathFileLoader {
    pub fn new(config: SwathConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SwathConfig {
        &self.config
    }

    /// Load an interleaved acquisition
    pub fn load<R>(&self, read: R) -> Result<Vec<SwathMap>>
    where
        R: FnMut(&mut dyn MsDataConsumer) -> Result<()>,
    {
        let mut maps = Self::consume(&self.config, read)?;
        self.apply_windows_file(&mut maps)?;
        Ok(maps)
    }

    /// Load an acquisition split in one file per window (plus an optional MS1 file)
    ///
    /// Each file must yield exactly one map. The MS1 map comes first, the
    /// windows follow in the order of the readers.
    pub fn load_split<I, R>(&self, readers: I) -> Result<Vec<SwathMap>>
    where
        I: IntoIterator<Item = R>,
        R: FnMut(&mut dyn MsDataConsumer) -> Result<()>,
    {
        let mut maps = Vec::new();

        for (file_idx, read) in readers.into_iter().enumerate() {
            let mut file_config = self.config.clone();
            file_config.cache_prefix = format!("{}_{}", self.config.cache_prefix, file_idx);
            file_config.windows_file = None;

            let mut file_maps = Self::consume(&file_config, read).dot()?;
            if file_maps.len() != 1 {
                return Err(SwathError::RoutingInconsistency(format!(
                    "split file #{} yielded {} maps, expected exactly one",
                    file_idx,
                    file_maps.len()
                ))
                .into());
            }
            maps.append(&mut file_maps);
        }

        if maps.iter().filter(|m| m.ms1).count() > 1 {
            return Err(SwathError::RoutingInconsistency("more than one split file holds MS1 spectra".to_string()).into());
        }
        // stable: windows keep the reader order
        maps.sort_by_key(|m| !m.ms1);

        info!("loaded {} SWATH maps from split files", maps.len());

        self.apply_windows_file(&mut maps)?;
        Ok(maps)
    }

    fn consume<R>(config: &SwathConfig, mut read: R) -> Result<Vec<SwathMap>>
    where
        R: FnMut(&mut dyn MsDataConsumer) -> Result<()>,
    {
        let mut consumer = if config.use_pre_scan {
            let mut counter = PreScanCounter::new(config.tolerance_abs);
            read(&mut counter).dot()?;
            SwathFileConsumer::with_pre_scan(config, &counter.finish())?
        } else {
            SwathFileConsumer::new(config)?
        };

        read(&mut consumer)?;
        consumer.retrieve_swath_maps()
    }

    fn apply_windows_file(&self, maps: &mut [SwathMap]) -> Result<()> {
        if let Some(windows_file) = self.config.windows_file.as_ref() {
            let windows = read_swath_windows(windows_file)?;
            annotate_swath_maps(maps, &windows, self.config.sort_swath_maps)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_cycles(consumer: &mut dyn MsDataConsumer, cycles: i64, targets: &[f64]) -> Result<()> {
        consumer.set_expected_size((cycles as usize) * (targets.len() + 1), 0);
        let mut id = 0;
        for cycle in 0..cycles {
            consumer.consume_spectrum(Spectrum::new(SpectrumHeader::new(id, "", 1, cycle as f32), Default::default()))?;
            id += 1;
            for &target in targets {
                let header = SpectrumHeader::new(id, "", 2, cycle as f32).with_precursor(Precursor::new(target, 12.5, 12.5));
                consumer.consume_spectrum(Spectrum::new(header, Default::default()))?;
                id += 1;
            }
        }
        Ok(())
    }

    #[test]
    fn test_load_with_pre_scan() {
        let mut config = SwathConfig::memory();
        config.use_pre_scan = true;
        let loader = SwathFileLoader::new(config).unwrap();

        let mut passes = 0;
        let maps = loader
            .load(|consumer: &mut dyn MsDataConsumer| {
                passes += 1;
                read_cycles(consumer, 4, &[412.5, 437.5, 462.5])
            })
            .unwrap();

        assert_eq!(passes, 2);
        assert_eq!(maps.len(), 4);
        assert!(maps.iter().all(|m| m.len() == 4));
    }

    #[test]
    fn test_reader_error_is_propagated() {
        let loader = SwathFileLoader::new(SwathConfig::memory()).unwrap();
        let res = loader.load(|_: &mut dyn MsDataConsumer| Err(anyhow::anyhow!("truncated input")));
        assert!(res.unwrap_err().to_string().contains("truncated input"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SwathConfig::memory();
        config.cache_mode = CacheMode::Disk;
        assert!(SwathFileLoader::new(config).is_err());
    }
}
