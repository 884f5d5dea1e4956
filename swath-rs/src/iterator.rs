//! Sequential iteration over cache payload files
//!
//! Reads spectrum records in file order without consulting the sidecar, which
//! is the fastest way to load a whole cached map.
//!
//! # Example
//! ```no_run
//! use swath::iterator::for_each_payload_spectrum;
//!
//! let count = for_each_payload_spectrum("window 0", "/tmp/cache/run01_0.cached", |data| {
//!     println!("{} peaks", data.peaks_count());
//!     Ok(())
//! }).unwrap();
//! ```

use anyhow::Result;
use anyhow_ext::Context;
use bytes::Buf;
use fallible_iterator::FallibleIterator;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::SwathError;
use crate::model::{PeakEncoding, SpectrumData};
use crate::writer::data_encoding::{decode_header, decode_peaks, peaks_len, HEADER_SIZE, PEAK_COUNT_SIZE};

/// Iterator over the spectrum records of a payload file
pub struct PayloadIterator {
    map_name: String,
    path: PathBuf,
    reader: BufReader<File>,
    encoding: PeakEncoding,
    position: usize,
    file_len: u64,
    /// Bytes read so far, header included
    consumed: u64,
    raw: Vec<u8>,
}

impl PayloadIterator {
    /// Open a payload file and check its header
    pub fn open(map_name: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SwathError::resource(map_name, &path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| SwathError::resource(map_name, &path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header)
            .map_err(|e| SwathError::resource(map_name, &path, e))?;
        let encoding = decode_header(&header)
            .ok_or_else(|| SwathError::corrupt(map_name, &path, "bad payload header"))?;

        Ok(Self {
            map_name: map_name.to_string(),
            path,
            reader,
            encoding,
            position: 0,
            file_len,
            consumed: HEADER_SIZE as u64,
            raw: Vec::new(),
        })
    }

    pub fn peak_encoding(&self) -> PeakEncoding {
        self.encoding
    }

    /// Number of records read so far
    pub fn position(&self) -> usize {
        self.position
    }

    fn at_eof(&mut self) -> Result<bool> {
        let buf = self
            .reader
            .fill_buf()
            .map_err(|e| SwathError::resource(&self.map_name, &self.path, e))?;
        Ok(buf.is_empty())
    }
}

impl FallibleIterator for PayloadIterator {
    type Item = SpectrumData;
    type Error = anyhow::Error;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.at_eof()? {
            return Ok(None);
        }

        let mut count_bytes = [0u8; PEAK_COUNT_SIZE];
        self.reader
            .read_exact(&mut count_bytes)
            .map_err(|e| SwathError::resource(&self.map_name, &self.path, e))?;
        self.consumed += PEAK_COUNT_SIZE as u64;
        let raw_count = (&count_bytes[..]).get_u64_le();

        let remaining = self.file_len.saturating_sub(self.consumed);
        let (peaks_count, record_len) = usize::try_from(raw_count)
            .ok()
            .and_then(|n| peaks_len(n, self.encoding).map(|len| (n, len)))
            .filter(|&(_, len)| len as u64 <= remaining)
            .ok_or_else(|| {
                SwathError::corrupt(
                    &self.map_name,
                    &self.path,
                    format!(
                        "record #{} announces {} peaks but only {} bytes remain",
                        self.position, raw_count, remaining
                    ),
                )
            })?;

        self.raw.resize(record_len, 0);
        self.reader
            .read_exact(&mut self.raw)
            .map_err(|e| SwathError::resource(&self.map_name, &self.path, e))?;
        self.consumed += record_len as u64;

        let data = decode_peaks(&mut &self.raw[..], peaks_count, self.encoding).ok_or_else(|| {
            SwathError::corrupt(
                &self.map_name,
                &self.path,
                format!("truncated record #{}", self.position),
            )
        })?;

        self.position += 1;
        Ok(Some(data))
    }
}

/// Call `on_each_spectrum` for every record of a payload file, returns the record count
pub fn for_each_payload_spectrum<F>(map_name: &str, path: impl AsRef<Path>, mut on_each_spectrum: F) -> Result<usize>
where
    F: FnMut(SpectrumData) -> Result<()>,
{
    let mut iter = PayloadIterator::open(map_name, path).dot()?;
    while let Some(data) = iter.next()? {
        on_each_spectrum(data).dot()?;
    }
    Ok(iter.position())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IsolationWindow, Spectrum, SpectrumHeader};
    use crate::writer::SpectrumCacheWriterBuilder;

    #[test]
    fn test_iterate_payload() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut writer = SpectrumCacheWriterBuilder::new(dir.path(), "iter", "ms1")
            .peak_encoding(PeakEncoding::NoLoss)
            .build()
            .unwrap();
        for i in 0..4 {
            let data = SpectrumData::new(vec![500.0; i], vec![1.5; i]);
            writer
                .insert_spectrum(Spectrum::new(SpectrumHeader::new(i as i64, "", 1, i as f32), data))
                .unwrap();
        }
        let paths = writer.close(IsolationWindow::ms1(), true).unwrap();

        let mut counts = Vec::new();
        let n = for_each_payload_spectrum("MS1", &paths.payload, |data| {
            counts.push(data.peaks_count());
            Ok(())
        })
        .expect("iteration failed");
        assert_eq!(n, 4);
        assert_eq!(counts, vec![0, 1, 2, 3]);

        let mut iter = PayloadIterator::open("MS1", &paths.payload).unwrap();
        assert_eq!(iter.peak_encoding(), PeakEncoding::NoLoss);
        assert_eq!(iter.nth(3).unwrap().unwrap().intensity_array, vec![1.5; 3]);
        assert!(iter.next().unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cached");
        let mut bytes = crate::writer::data_encoding::encode_header(PeakEncoding::HighRes).to_vec();
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, bytes).unwrap();

        let mut iter = PayloadIterator::open("window 1", &path).unwrap();
        let err = iter.next().unwrap_err();
        assert!(matches!(
            crate::error::swath_error(&err),
            Some(SwathError::CorruptCache { .. })
        ));
    }

    #[test]
    fn test_oversized_peak_count() {
        let dir = tempfile::tempdir().unwrap();
        for (name, count) in [("overflow", 1u64 << 62), ("huge", 1u64 << 40), ("max", u64::MAX)] {
            let path = dir.path().join(format!("{}.cached", name));
            let mut bytes = crate::writer::data_encoding::encode_header(PeakEncoding::HighRes).to_vec();
            bytes.extend_from_slice(&count.to_le_bytes());
            bytes.extend_from_slice(&[0u8; 24]);
            std::fs::write(&path, bytes).unwrap();

            let mut iter = PayloadIterator::open("window 2", &path).unwrap();
            let err = iter.next().unwrap_err();
            assert!(
                matches!(crate::error::swath_error(&err), Some(SwathError::CorruptCache { .. })),
                "{}: {:#}",
                name,
                err
            );
            assert!(format!("{:#}", err).contains("24 bytes remain"));
        }
    }
}
