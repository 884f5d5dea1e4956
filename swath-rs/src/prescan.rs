//! Metadata-only first pass over an acquisition
//!
//! Counts the MS1 spectra and the spectra of each isolation window so that
//! the consumer can pre-create and pre-size its sinks, and route spectra
//! without precursor information against the complete window list.

use anyhow::Result;
use log::{debug, info, warn};

use crate::consumer::MsDataConsumer;
use crate::model::{Chromatogram, IsolationWindow, Spectrum, DEFAULT_WINDOW_TOLERANCE};
use crate::registry::IsolationWindowRegistry;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreScanResult {
    pub ms1_count: usize,
    /// Windows in order of first appearance
    pub windows: Vec<IsolationWindow>,
    /// Spectrum count of each window, aligned with `windows`
    pub window_counts: Vec<usize>,
    /// MS2 spectra without precursor
    pub unassigned_ms2: usize,
}

impl PreScanResult {
    /// Nothing was learnt: the consumer falls back to window discovery
    pub fn is_unknown(&self) -> bool {
        self.ms1_count == 0 && self.windows.is_empty()
    }

    pub fn total_spectra(&self) -> usize {
        self.ms1_count + self.window_counts.iter().sum::<usize>() + self.unassigned_ms2
    }
}

#[derive(Debug)]
pub struct PreScanCounter {
    registry: IsolationWindowRegistry,
    ms1_count: usize,
    window_counts: Vec<usize>,
    unassigned_ms2: usize,
}

impl Default for PreScanCounter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TOLERANCE)
    }
}

impl PreScanCounter {
    pub fn new(tolerance: f64) -> Self {
        Self {
            registry: IsolationWindowRegistry::new(tolerance),
            ms1_count: 0,
            window_counts: Vec::new(),
            unassigned_ms2: 0,
        }
    }

    pub fn finish(self) -> PreScanResult {
        let result = PreScanResult {
            ms1_count: self.ms1_count,
            windows: self.registry.windows().to_vec(),
            window_counts: self.window_counts,
            unassigned_ms2: self.unassigned_ms2,
        };
        info!(
            "pre-scan found {} spectra: {} MS1, {} isolation windows",
            result.total_spectra(),
            result.ms1_count,
            result.windows.len()
        );
        result
    }
}

impl MsDataConsumer for PreScanCounter {
    fn set_expected_size(&mut self, _spectra: usize, _chromatograms: usize) {}

    fn consume_spectrum(&mut self, spectrum: Spectrum) -> Result<()> {
        let header = &spectrum.header;
        match header.ms_level {
            1 => self.ms1_count += 1,
            2 => match header.isolation_window() {
                Some(window) => {
                    let (index, is_new) = self.registry.find_or_register(window);
                    if is_new {
                        debug!("pre-scan: new window #{} in spectrum '{}'", index, header.title);
                        self.window_counts.push(0);
                    }
                    self.window_counts[index] += 1;
                }
                None => self.unassigned_ms2 += 1,
            },
            level => warn!("pre-scan: ignoring spectrum '{}' with MS level {}", header.title, level),
        }
        Ok(())
    }

    fn consume_chromatogram(&mut self, _chromatogram: Chromatogram) -> Result<()> {
        Ok(())
    }
}
