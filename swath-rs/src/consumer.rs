//! Consumer splitting an interleaved SWATH acquisition into per-window maps
//!
//! A reader pushes spectra in file order through [`MsDataConsumer`]. Each
//! spectrum is routed to the MS1 map or to the map of its isolation window,
//! and appended to that map's sink. [`SwathFileConsumer::retrieve_swath_maps`]
//! closes every sink and returns the maps, MS1 first, then windows by index.
//!
//! # Example
//!
//! ```
//! use swath::config::SwathConfig;
//! use swath::consumer::{MsDataConsumer, SwathFileConsumer};
//! use swath::model::{Precursor, Spectrum, SpectrumHeader};
//!
//! let mut consumer = SwathFileConsumer::new(&SwathConfig::memory())?;
//! consumer.consume_spectrum(Spectrum::new(SpectrumHeader::new(0, "scan=1", 1, 0.0), Default::default()))?;
//! consumer.consume_spectrum(Spectrum::new(
//!     SpectrumHeader::new(1, "scan=2", 2, 0.1).with_precursor(Precursor::new(412.5, 12.5, 12.5)),
//!     Default::default(),
//! ))?;
//!
//! let maps = consumer.retrieve_swath_maps()?;
//! assert_eq!(maps.len(), 2);
//! assert!(maps[0].ms1);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Result;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::SwathConfig;
use crate::error::SwathError;
use crate::model::{Chromatogram, Spectrum};
use crate::prescan::PreScanResult;
use crate::router::{RouteTarget, WindowRouter};
use crate::sink::{ClosedSink, MapSlot, SinkKind, SwathMapSink};
use crate::swath_map::SwathMap;

/// Callbacks invoked by a streaming reader
pub trait MsDataConsumer {
    /// Announced number of spectra and chromatograms, if the reader knows them
    fn set_expected_size(&mut self, spectra: usize, chromatograms: usize);

    fn consume_spectrum(&mut self, spectrum: Spectrum) -> Result<()>;

    fn consume_chromatogram(&mut self, chromatogram: Chromatogram) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConsumerState {
    Open,
    Closed,
    /// A fatal error occurred; the consumer must be discarded
    Failed,
}

pub struct SwathFileConsumer {
    sink_kind: SinkKind,
    threads: Option<usize>,
    router: WindowRouter,
    ms1_sink: Option<SwathMapSink>,
    ms2_sinks: Vec<SwathMapSink>,
    state: ConsumerState,
    ms1_count: usize,
    consumed_count: usize,
    expected_spectra: usize,
    reported_decile: usize,
}

impl SwathFileConsumer {
    /// Consumer discovering the windows from the data
    pub fn new(config: &SwathConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            sink_kind: config.sink_kind(),
            threads: config.threads,
            router: WindowRouter::new(config.tolerance_abs),
            ms1_sink: None,
            ms2_sinks: Vec::new(),
            state: ConsumerState::Open,
            ms1_count: 0,
            consumed_count: 0,
            expected_spectra: 0,
            reported_decile: 0,
        })
    }

    /// Consumer using the windows and counts of a pre-scan
    ///
    /// Every sink is created up front. An empty pre-scan result falls back
    /// to discovery.
    pub fn with_pre_scan(config: &SwathConfig, pre_scan: &PreScanResult) -> Result<Self> {
        let mut consumer = Self::new(config)?;
        if pre_scan.is_unknown() {
            debug!("pre-scan found nothing, discovering windows from the data");
            return Ok(consumer);
        }

        consumer.router = WindowRouter::with_known_windows(&pre_scan.windows, config.tolerance_abs);

        if pre_scan.ms1_count > 0 {
            consumer.ms1_sink = Some(SwathMapSink::create(
                &consumer.sink_kind,
                MapSlot::ms1(),
                pre_scan.ms1_count,
            )?);
        }

        for (index, window) in pre_scan.windows.iter().enumerate() {
            // precursor-less spectra are spread over the windows
            let expected = pre_scan.window_counts.get(index).copied().unwrap_or(0)
                + pre_scan.unassigned_ms2 / pre_scan.windows.len();
            let sink = SwathMapSink::create(&consumer.sink_kind, MapSlot::window(index, *window), expected)?;
            consumer.ms2_sinks.push(sink);
        }

        Ok(consumer)
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Number of distinct isolation windows known so far
    pub fn window_count(&self) -> usize {
        self.router.registry().len()
    }

    pub fn ms1_count(&self) -> usize {
        self.ms1_count
    }

    /// MS1 and MS2 spectra appended to a map
    pub fn consumed_count(&self) -> usize {
        self.consumed_count
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConsumerState::Open => Ok(()),
            ConsumerState::Closed => Err(SwathError::Usage("the consumer is already finalized".to_string()).into()),
            ConsumerState::Failed => {
                Err(SwathError::Usage("the consumer failed earlier and cannot be used anymore".to_string()).into())
            }
        }
    }

    /// Move to FAILED when `result` is an error
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = ConsumerState::Failed;
        }
        result
    }

    fn route_and_append(&mut self, spectrum: Spectrum) -> Result<()> {
        match self.router.classify(&spectrum.header)? {
            RouteTarget::Ms1 => {
                if self.ms1_sink.is_none() {
                    self.ms1_sink = Some(SwathMapSink::create(&self.sink_kind, MapSlot::ms1(), 0)?);
                }
                if let Some(sink) = self.ms1_sink.as_mut() {
                    sink.append(spectrum)?;
                }
                self.ms1_count += 1;
            }
            RouteTarget::Ms2 { index, is_new } => {
                if is_new {
                    debug!("discovered isolation window #{} in spectrum '{}'", index, spectrum.header.title);
                }
                self.ensure_ms2_sinks(index)?;
                self.ms2_sinks[index].append(spectrum)?;
            }
            RouteTarget::Unsupported => return Ok(()),
        }

        self.consumed_count += 1;
        self.report_progress();
        Ok(())
    }

    /// Create the sinks of every window up to `index`
    fn ensure_ms2_sinks(&mut self, index: usize) -> Result<()> {
        while self.ms2_sinks.len() <= index {
            let next = self.ms2_sinks.len();
            let window = *self.router.registry().get(next).ok_or_else(|| {
                SwathError::RoutingInconsistency(format!("no isolation window registered at index {}", next))
            })?;
            let sink = SwathMapSink::create(&self.sink_kind, MapSlot::window(next, window), 0)?;
            self.ms2_sinks.push(sink);
        }
        Ok(())
    }

    fn report_progress(&mut self) {
        if self.expected_spectra == 0 {
            return;
        }
        let decile = (self.consumed_count * 10 / self.expected_spectra).min(10);
        if decile > self.reported_decile {
            self.reported_decile = decile;
            info!(
                "consumed {}% of the spectra ({}/{})",
                decile * 10,
                self.consumed_count,
                self.expected_spectra
            );
        }
    }

    /// Close every sink and return the maps, MS1 first
    ///
    /// Cached maps are reloaded in parallel, on a dedicated pool when a
    /// thread count is configured.
    pub fn retrieve_swath_maps(&mut self) -> Result<Vec<SwathMap>> {
        self.ensure_open()?;
        self.state = ConsumerState::Closed;

        let maps = self.finalize();
        let maps = self.track(maps)?;

        info!(
            "retrieved {} SWATH maps ({} MS1 spectra, {} windows, {} spectra in total)",
            maps.len(),
            self.ms1_count,
            self.window_count(),
            self.consumed_count
        );
        Ok(maps)
    }

    fn finalize(&mut self) -> Result<Vec<SwathMap>> {
        let sinks: Vec<SwathMapSink> = self.ms1_sink.take().into_iter().chain(self.ms2_sinks.drain(..)).collect();

        let mut closed = Vec::with_capacity(sinks.len());
        for sink in sinks {
            closed.push(sink.close()?);
        }

        let reload = move || closed.into_par_iter().map(ClosedSink::into_map).collect::<Result<Vec<_>>>();

        match self.threads {
            Some(num_threads) => rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?.install(reload),
            None => reload(),
        }
    }
}

impl MsDataConsumer for SwathFileConsumer {
    fn set_expected_size(&mut self, spectra: usize, chromatograms: usize) {
        self.expected_spectra = spectra;
        if chromatograms > 0 {
            debug!("reader announced {} chromatograms, they will be ignored", chromatograms);
        }
    }

    fn consume_spectrum(&mut self, spectrum: Spectrum) -> Result<()> {
        self.ensure_open()?;
        let result = self.route_and_append(spectrum);
        self.track(result)
    }

    fn consume_chromatogram(&mut self, chromatogram: Chromatogram) -> Result<()> {
        self.ensure_open()?;
        warn!(
            "ignoring chromatogram '{}': SWATH acquisitions are not expected to contain chromatograms",
            chromatogram.native_id
        );
        Ok(())
    }
}
