//! Finalized SWATH maps and their spectrum accessors

use anyhow::Result;
use fallible_iterator::FallibleIterator;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheFilePaths, CachedSpectra};
use crate::error::SwathError;
use crate::model::*;

/// Read access to the spectra of one map
///
/// Cloning is cheap: both variants share their storage.
#[derive(Clone, Debug)]
pub enum SpectrumAccessor {
    InMemory(Arc<Vec<Spectrum>>),
    Cached(Arc<CachedSpectra>),
}

impl SpectrumAccessor {
    pub fn len(&self) -> usize {
        match self {
            SpectrumAccessor::InMemory(spectra) => spectra.len(),
            SpectrumAccessor::Cached(cached) => cached.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SpectrumAccessor::Cached(_))
    }

    pub fn header(&self, index: usize) -> Option<&SpectrumHeader> {
        match self {
            SpectrumAccessor::InMemory(spectra) => spectra.get(index).map(|s| &s.header),
            SpectrumAccessor::Cached(cached) => cached.header(index),
        }
    }

    pub fn get_spectrum(&self, index: usize) -> Result<Spectrum> {
        match self {
            SpectrumAccessor::InMemory(spectra) => spectra.get(index).cloned().ok_or_else(|| {
                SwathError::Usage(format!("spectrum index {} out of range ({} spectra)", index, spectra.len())).into()
            }),
            SpectrumAccessor::Cached(cached) => cached.get_spectrum(index),
        }
    }

    pub fn retention_times(&self) -> Vec<f32> {
        (0..self.len())
            .filter_map(|i| self.header(i).map(|h| h.time))
            .collect()
    }

    pub fn iter(&self) -> SpectrumIter<'_> {
        SpectrumIter {
            accessor: self,
            position: 0,
        }
    }

    pub fn for_each<F>(&self, mut on_each_spectrum: F) -> Result<()>
    where
        F: FnMut(&Spectrum) -> Result<()>,
    {
        match self {
            SpectrumAccessor::InMemory(spectra) => spectra.iter().try_for_each(on_each_spectrum),
            SpectrumAccessor::Cached(_) => self.iter().for_each(|s| on_each_spectrum(&s)),
        }
    }

    /// Accessor holding every spectrum in memory
    pub fn into_memory(self) -> Result<SpectrumAccessor> {
        match self {
            SpectrumAccessor::InMemory(_) => Ok(self),
            SpectrumAccessor::Cached(cached) => Ok(SpectrumAccessor::InMemory(Arc::new(cached.load_all()?))),
        }
    }
}

/// Iterator over the spectra of an accessor, in arrival order
pub struct SpectrumIter<'a> {
    accessor: &'a SpectrumAccessor,
    position: usize,
}

impl FallibleIterator for SpectrumIter<'_> {
    type Item = Spectrum;
    type Error = anyhow::Error;

    fn next(&mut self) -> Result<Option<Spectrum>> {
        if self.position >= self.accessor.len() {
            return Ok(None);
        }
        let spectrum = self.accessor.get_spectrum(self.position)?;
        self.position += 1;
        Ok(Some(spectrum))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.accessor.len() - self.position;
        (remaining, Some(remaining))
    }
}

/// Spectra acquired with one isolation window, or the MS1 spectra
#[derive(Clone, Debug)]
pub struct SwathMap {
    pub lower: f64,
    pub upper: f64,
    pub center: f64,
    pub ms1: bool,
    pub spectra: SpectrumAccessor,
}

impl SwathMap {
    pub fn new(window: IsolationWindow, ms1: bool, spectra: SpectrumAccessor) -> Self {
        Self {
            lower: window.lower,
            upper: window.upper,
            center: window.center,
            ms1,
            spectra,
        }
    }

    /// Reopen a map cached by an earlier run, given its payload file
    pub fn open_cached(payload: impl Into<PathBuf>) -> Result<Self> {
        let cached = CachedSpectra::open(CacheFilePaths::from_payload(payload))?;
        let window = cached.info().window();
        let ms1 = cached.info().ms1();
        Ok(Self::new(window, ms1, SpectrumAccessor::Cached(Arc::new(cached))))
    }

    pub fn window(&self) -> IsolationWindow {
        IsolationWindow::new(self.lower, self.upper, self.center)
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Replace a cached accessor by an in-memory copy of its spectra
    pub fn load_into_memory(&mut self) -> Result<()> {
        if self.spectra.is_cached() {
            self.spectra = self.spectra.clone().into_memory()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SpectrumCacheWriterBuilder;

    fn spectra(n: usize) -> Vec<Spectrum> {
        (0..n)
            .map(|i| {
                let header = SpectrumHeader::new(i as i64, format!("scan={}", i), 2, i as f32 * 3.0)
                    .with_precursor(Precursor::new(412.5, 12.5, 12.5));
                Spectrum::new(header, SpectrumData::new(vec![100.0 + i as f64], vec![i as f32]))
            })
            .collect()
    }

    #[test]
    fn test_in_memory_accessor() {
        let accessor = SpectrumAccessor::InMemory(Arc::new(spectra(3)));
        assert_eq!(accessor.len(), 3);
        assert_eq!(accessor.retention_times(), vec![0.0, 3.0, 6.0]);
        assert_eq!(accessor.header(2).unwrap().title, "scan=2");
        assert!(accessor.get_spectrum(3).is_err());
        assert_eq!(accessor.iter().count().unwrap(), 3);
    }

    #[test]
    fn test_cached_map_round_trip() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut writer = SpectrumCacheWriterBuilder::new(dir.path(), "map", "0").build().unwrap();
        for s in spectra(4) {
            writer.insert_spectrum(s).unwrap();
        }
        let window = IsolationWindow::from_bounds(400.0, 425.0);
        let paths = writer.close(window, false).unwrap();

        let mut map = SwathMap::open_cached(&paths.payload).expect("failed to reopen cache");
        assert_eq!(map.window(), window);
        assert!(!map.ms1);
        assert!(map.spectra.is_cached());

        // repeated reads are identical
        assert_eq!(map.spectra.get_spectrum(1).unwrap(), map.spectra.get_spectrum(1).unwrap());

        let mut seen = Vec::new();
        map.spectra
            .for_each(|s| {
                seen.push(s.header.id);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);

        map.load_into_memory().unwrap();
        assert!(!map.spectra.is_cached());
        assert_eq!(map.spectra.iter().collect::<Vec<_>>().unwrap(), spectra(4));
    }
}
