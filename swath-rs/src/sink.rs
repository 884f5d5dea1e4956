//! Output targets collecting the spectra of one map during consumption
//!
//! A sink is either in memory or backed by a disk cache. Closing a sink is a
//! two-phase operation for the cached variant: [`SwathMapSink::close`] releases
//! the write handle and writes the sidecar (sequential), then
//! [`PendingReload::reload`] reopens the cache (safe to run in parallel).

use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheFilePaths, CachedSpectra};
use crate::model::*;
use crate::swath_map::{SpectrumAccessor, SwathMap};
use crate::writer::{SpectrumCacheWriter, SpectrumCacheWriterBuilder};

/// Storage selected for every sink of a consumer
#[derive(Clone, Debug, PartialEq)]
pub enum SinkKind {
    Memory,
    Disk {
        directory: PathBuf,
        prefix: String,
        peak_encoding: PeakEncoding,
    },
}

/// Where a sink stands in the acquisition: the MS1 map or a window index
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MapSlot {
    pub window: IsolationWindow,
    pub ms1: bool,
    pub index: Option<usize>,
}

impl MapSlot {
    pub fn ms1() -> Self {
        Self {
            window: IsolationWindow::ms1(),
            ms1: true,
            index: None,
        }
    }

    pub fn window(index: usize, window: IsolationWindow) -> Self {
        Self {
            window,
            ms1: false,
            index: Some(index),
        }
    }

    /// Human readable name used in logs and errors
    pub fn name(&self) -> String {
        match self.index {
            Some(index) => format!("window #{} [{}, {}]", index, self.window.lower, self.window.upper),
            None => "MS1".to_string(),
        }
    }

    /// Suffix of the cache file names
    pub fn label(&self) -> String {
        match self.index {
            Some(index) => index.to_string(),
            None => "ms1".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct InMemorySink {
    slot: MapSlot,
    spectra: Vec<Spectrum>,
}

pub struct CachedSink {
    slot: MapSlot,
    writer: SpectrumCacheWriter,
}

pub enum SwathMapSink {
    InMemory(InMemorySink),
    Cached(CachedSink),
}

impl SwathMapSink {
    /// Create the sink of `slot`; disk sinks open their payload file immediately
    pub fn create(kind: &SinkKind, slot: MapSlot, expected_spectra: usize) -> Result<Self> {
        let sink = match kind {
            SinkKind::Memory => SwathMapSink::InMemory(InMemorySink {
                slot,
                spectra: Vec::with_capacity(expected_spectra),
            }),
            SinkKind::Disk {
                directory,
                prefix,
                peak_encoding,
            } => {
                let writer = SpectrumCacheWriterBuilder::new(directory, prefix, &slot.label())
                    .map_name(slot.name())
                    .peak_encoding(*peak_encoding)
                    .expected_spectra(expected_spectra)
                    .build()?;
                SwathMapSink::Cached(CachedSink { slot, writer })
            }
        };

        debug!("created {} sink for {}", sink.kind_name(), slot.name());
        Ok(sink)
    }

    fn kind_name(&self) -> &'static str {
        match self {
            SwathMapSink::InMemory(_) => "in-memory",
            SwathMapSink::Cached(_) => "cached",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SwathMapSink::InMemory(sink) => sink.spectra.len(),
            SwathMapSink::Cached(sink) => sink.writer.spectra_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, spectrum: Spectrum) -> Result<()> {
        match self {
            SwathMapSink::InMemory(sink) => {
                spectrum.data.check_lengths(&spectrum.header.title)?;
                sink.spectra.push(spectrum);
                Ok(())
            }
            SwathMapSink::Cached(sink) => sink.writer.insert_spectrum(spectrum),
        }
    }

    /// First finalization phase: release write handles
    pub fn close(self) -> Result<ClosedSink> {
        match self {
            SwathMapSink::InMemory(sink) => Ok(ClosedSink::Ready(SwathMap::new(
                sink.slot.window,
                sink.slot.ms1,
                SpectrumAccessor::InMemory(Arc::new(sink.spectra)),
            ))),
            SwathMapSink::Cached(sink) => {
                let slot = sink.slot;
                let paths = sink.writer.close(slot.window, slot.ms1)?;
                Ok(ClosedSink::PendingReload(PendingReload { slot, paths }))
            }
        }
    }
}

/// A closed sink
pub enum ClosedSink {
    Ready(SwathMap),
    PendingReload(PendingReload),
}

impl ClosedSink {
    /// Second finalization phase
    pub fn into_map(self) -> Result<SwathMap> {
        match self {
            ClosedSink::Ready(map) => Ok(map),
            ClosedSink::PendingReload(pending) => pending.reload(),
        }
    }
}

/// A cache whose files are complete but not reopened yet
#[derive(Debug)]
pub struct PendingReload {
    slot: MapSlot,
    paths: CacheFilePaths,
}

impl PendingReload {
    pub fn paths(&self) -> &CacheFilePaths {
        &self.paths
    }

    pub fn reload(self) -> Result<SwathMap> {
        let cached = CachedSpectra::open(self.paths)?;
        debug!("reloaded {} cached spectra for {}", cached.len(), self.slot.name());
        Ok(SwathMap::new(
            self.slot.window,
            self.slot.ms1,
            SpectrumAccessor::Cached(Arc::new(cached)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(id: i64) -> Spectrum {
        Spectrum::new(
            SpectrumHeader::new(id, format!("scan={}", id), 1, id as f32),
            SpectrumData::new(vec![300.0, 301.0], vec![5.0, 6.0]),
        )
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = SwathMapSink::create(&SinkKind::Memory, MapSlot::ms1(), 2).unwrap();
        sink.append(spectrum(0)).unwrap();
        sink.append(spectrum(1)).unwrap();
        assert_eq!(sink.len(), 2);

        let map = sink.close().unwrap().into_map().unwrap();
        assert!(map.ms1);
        assert_eq!(map.lower, MS1_SENTINEL_MZ);
        assert_eq!(map.spectra.retention_times(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_memory_sink_rejects_mismatched_arrays() {
        let mut sink = SwathMapSink::create(&SinkKind::Memory, MapSlot::ms1(), 0).unwrap();
        let mut s = spectrum(0);
        s.data.mz_array.push(302.0);
        let err = sink.append(s).unwrap_err();
        assert!(matches!(
            crate::error::swath_error(&err),
            Some(crate::error::SwathError::Usage(_))
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_disk_sink_matches_memory_sink() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let kind = SinkKind::Disk {
            directory: dir.path().to_path_buf(),
            prefix: "sink".to_string(),
            peak_encoding: PeakEncoding::HighRes,
        };
        let slot = MapSlot::window(3, IsolationWindow::from_bounds(475.0, 500.0));

        let mut disk = SwathMapSink::create(&kind, slot, 0).unwrap();
        let mut memory = SwathMapSink::create(&SinkKind::Memory, slot, 0).unwrap();
        for i in 0..5 {
            disk.append(spectrum(i)).unwrap();
            memory.append(spectrum(i)).unwrap();
        }

        let closed = disk.close().unwrap();
        match &closed {
            ClosedSink::PendingReload(pending) => {
                assert!(pending.paths().payload.ends_with("sink_3.cached"));
            }
            ClosedSink::Ready(_) => panic!("disk sink should need a reload"),
        }
        let disk_map = closed.into_map().unwrap();
        let memory_map = memory.close().unwrap().into_map().unwrap();

        assert_eq!(disk_map.window(), memory_map.window());
        assert_eq!(disk_map.ms1, memory_map.ms1);
        for i in 0..5 {
            assert_eq!(
                disk_map.spectra.get_spectrum(i).unwrap(),
                memory_map.spectra.get_spectrum(i).unwrap()
            );
        }
    }

    #[test]
    fn test_slot_names() {
        let slot = MapSlot::window(2, IsolationWindow::from_bounds(450.0, 475.0));
        assert_eq!(slot.name(), "window #2 [450, 475]");
        assert_eq!(slot.label(), "2");
        assert_eq!(MapSlot::ms1().label(), "ms1");
    }
}
