//! Cache writer
//!
//! Streams the peaks of one SWATH map into a payload file and keeps only the
//! spectrum headers in memory. Closing the writer flushes and syncs the
//! payload, then writes the SQLite sidecar indexing every record.
//!
//! # Example
//!
//! ```no_run
//! use swath::model::{IsolationWindow, PeakEncoding, Spectrum};
//! use swath::writer::SpectrumCacheWriterBuilder;
//!
//! let mut writer = SpectrumCacheWriterBuilder::new("/tmp/cache", "run01", "0")
//!     .map_name("window 0")
//!     .peak_encoding(PeakEncoding::HighRes)
//!     .expected_spectra(1200)
//!     .build()?;
//!
//! writer.insert_spectrum(Spectrum::default())?;
//!
//! let paths = writer.close(IsolationWindow::from_bounds(400.0, 425.0), false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod data_encoding;
mod metadata;

use anyhow::Result;
use bytes::BytesMut;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cache::{sidecar_error, CacheFilePaths, CacheInfo, CachedSpectrumEntry, CACHE_FORMAT_VERSION};
use crate::error::SwathError;
use crate::model::*;

use data_encoding::{encode_header, encode_peaks, HEADER_SIZE};

const WRITE_BUFFER_SIZE: usize = 1 << 20;

/// Append-only writer of one cached map
pub struct SpectrumCacheWriter {
    map_name: String,
    paths: CacheFilePaths,
    encoding: PeakEncoding,

    /// Open payload handle, `None` once closed
    file: Option<BufWriter<File>>,

    /// Headers of the spectra written so far, in arrival order
    entries: Vec<CachedSpectrumEntry>,

    /// Byte offset of the next record
    offset: u64,

    /// Reused encoding buffer
    buffer: BytesMut,
}

impl SpectrumCacheWriter {
    /// Create the payload file (truncating any previous one) and write its header
    pub fn create(
        map_name: impl Into<String>,
        paths: CacheFilePaths,
        encoding: PeakEncoding,
        expected_spectra: usize,
    ) -> Result<Self> {
        let map_name = map_name.into();

        let file = File::create(&paths.payload).map_err(|e| SwathError::resource(&map_name, &paths.payload, e))?;
        let mut file = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        file.write_all(&encode_header(encoding))
            .map_err(|e| SwathError::resource(&map_name, &paths.payload, e))?;

        debug!("opened cache file {} for {}", paths.payload.display(), map_name);

        Ok(Self {
            map_name,
            paths,
            encoding,
            file: Some(file),
            entries: Vec::with_capacity(expected_spectra),
            offset: HEADER_SIZE as u64,
            buffer: BytesMut::new(),
        })
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn paths(&self) -> &CacheFilePaths {
        &self.paths
    }

    pub fn spectra_count(&self) -> usize {
        self.entries.len()
    }

    /// Write the peaks of `spectrum` and keep its header
    pub fn insert_spectrum(&mut self, spectrum: Spectrum) -> Result<()> {
        let Spectrum { header, data } = spectrum;

        data.check_lengths(&header.title)?;

        let file = self.file.as_mut().ok_or_else(|| {
            SwathError::Usage(format!("cache writer of {} is already closed", self.map_name))
        })?;

        self.buffer.clear();
        encode_peaks(&mut self.buffer, &data, self.encoding);
        file.write_all(&self.buffer)
            .map_err(|e| SwathError::resource(&self.map_name, &self.paths.payload, e))?;

        self.entries.push(CachedSpectrumEntry {
            header,
            peaks_count: data.peaks_count(),
            data_offset: self.offset,
        });
        self.offset += self.buffer.len() as u64;

        Ok(())
    }

    /// Flush, sync and close the payload, then write the sidecar
    ///
    /// Returns the paths of the finalized cache.
    pub fn close(mut self, window: IsolationWindow, is_ms1: bool) -> Result<CacheFilePaths> {
        let map_name = self.map_name.clone();
        let payload = self.paths.payload.clone();
        let resource_err = |e: std::io::Error| SwathError::resource(&map_name, &payload, e);

        let file = self.file.take().ok_or_else(|| {
            SwathError::Usage(format!("cache writer of {} is already closed", map_name))
        })?;
        let file = file.into_inner().map_err(|e| resource_err(e.into_error()))?;
        file.sync_all().map_err(resource_err)?;
        drop(file);

        let info = CacheInfo {
            format_version: CACHE_FORMAT_VERSION,
            peak_encoding: self.encoding.to_string(),
            spectrum_count: self.entries.len() as i64,
            payload_size: self.offset as i64,
            map_name: map_name.clone(),
            is_ms1: is_ms1 as i64,
            lower_mz: window.lower,
            upper_mz: window.upper,
            center_mz: window.center,
        };

        metadata::write_sidecar(&self.paths.sidecar, &info, &self.entries)
            .map_err(|e| sidecar_error(e, &map_name, &self.paths.sidecar))?;

        debug!(
            "closed cache of {}: {} spectra, {} bytes",
            map_name,
            self.entries.len(),
            self.offset
        );

        Ok(self.paths)
    }
}

/// Builder for [`SpectrumCacheWriter`]
pub struct SpectrumCacheWriterBuilder {
    directory: PathBuf,
    prefix: String,
    map_label: String,
    map_name: Option<String>,
    encoding: PeakEncoding,
    expected_spectra: usize,
}

impl SpectrumCacheWriterBuilder {
    pub fn new(directory: impl AsRef<Path>, prefix: &str, map_label: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            map_label: map_label.to_string(),
            map_name: None,
            encoding: PeakEncoding::default(),
            expected_spectra: 0,
        }
    }

    /// Name used in log lines and error messages (defaults to the label)
    pub fn map_name(mut self, map_name: impl Into<String>) -> Self {
        self.map_name = Some(map_name.into());
        self
    }

    pub fn peak_encoding(mut self, encoding: PeakEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Number of spectra announced by a pre-scan, used to pre-size the header list
    pub fn expected_spectra(mut self, count: usize) -> Self {
        self.expected_spectra = count;
        self
    }

    pub fn build(self) -> Result<SpectrumCacheWriter> {
        let paths = CacheFilePaths::new(&self.directory, &self.prefix, &self.map_label);
        let map_name = self.map_name.unwrap_or(self.map_label);
        SpectrumCacheWriter::create(map_name, paths, self.encoding, self.expected_spectra)
    }
}
