//! Disk cache of one SWATH map: payload file + SQLite sidecar
//!
//! The payload holds the peaks of every spectrum in arrival order; the sidecar
//! holds the headers and the byte offset of each record so that spectra can
//! be read back by position without scanning the payload.
//!
//! Cache files are immutable once written. Every read opens its own file
//! handle, so a [`CachedSpectra`] can be shared between threads.

use bytes::Buf;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::SwathError;
use crate::iterator::PayloadIterator;
use crate::model::*;
use crate::queries::{get_cache_info, list_cached_entries};
use crate::writer::data_encoding::{decode_header, decode_peaks, encoded_len, HEADER_SIZE};

pub const CACHE_FORMAT_VERSION: i64 = 1;

/// SQL used to create and read sidecar files
pub mod sql {
    pub const SIDECAR_SCHEMA: &str = "CREATE TABLE cache_info (
        format_version INTEGER NOT NULL,
        peak_encoding TEXT NOT NULL,
        spectrum_count INTEGER NOT NULL,
        payload_size INTEGER NOT NULL,
        map_name TEXT NOT NULL,
        is_ms1 INTEGER NOT NULL,
        lower_mz REAL NOT NULL,
        upper_mz REAL NOT NULL,
        center_mz REAL NOT NULL
    );
    CREATE TABLE spectrum (
        id INTEGER PRIMARY KEY,
        initial_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        time REAL NOT NULL,
        ms_level INTEGER NOT NULL,
        main_precursor_mz REAL,
        precursor_list TEXT,
        data_points_count INTEGER NOT NULL,
        data_offset INTEGER NOT NULL
    );";

    pub const INSERT_CACHE_INFO: &str = "INSERT INTO cache_info VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const INSERT_SPECTRUM: &str = "INSERT INTO spectrum VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const GET_CACHE_INFO: &str = "SELECT * FROM cache_info LIMIT 1";

    pub const GET_ALL_SPECTRA: &str = "SELECT * FROM spectrum ORDER BY id";

    pub const COUNT_SPECTRA: &str = "SELECT count(id) FROM spectrum";
}

/// Content of the `cache_info` table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub format_version: i64,
    pub peak_encoding: String,
    pub spectrum_count: i64,
    pub payload_size: i64,
    pub map_name: String,
    pub is_ms1: i64,
    pub lower_mz: f64,
    pub upper_mz: f64,
    pub center_mz: f64,
}

impl CacheInfo {
    pub fn window(&self) -> IsolationWindow {
        IsolationWindow::new(self.lower_mz, self.upper_mz, self.center_mz)
    }

    pub fn ms1(&self) -> bool {
        self.is_ms1 != 0
    }
}

/// Header of a cached spectrum and the location of its peaks in the payload
#[derive(Clone, Debug, PartialEq)]
pub struct CachedSpectrumEntry {
    pub header: SpectrumHeader,
    pub peaks_count: usize,
    pub data_offset: u64,
}

/// Locations of the two files backing a cached map
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheFilePaths {
    pub payload: PathBuf,
    pub sidecar: PathBuf,
}

impl CacheFilePaths {
    /// `<dir>/<prefix>_<map_label>.cached` and its `.sqlite` sidecar
    pub fn new(directory: impl AsRef<Path>, prefix: &str, map_label: &str) -> Self {
        Self::from_payload(directory.as_ref().join(format!("{}_{}.cached", prefix, map_label)))
    }

    /// Paths of an existing cache, given its payload file
    pub fn from_payload(payload: impl Into<PathBuf>) -> Self {
        let payload = payload.into();
        let mut sidecar = payload.clone().into_os_string();
        sidecar.push(".sqlite");

        Self {
            payload,
            sidecar: PathBuf::from(sidecar),
        }
    }
}

pub(crate) fn sidecar_error(err: anyhow::Error, map_name: &str, path: &Path) -> anyhow::Error {
    err.context(SwathError::Sidecar {
        map: map_name.to_string(),
        path: path.to_path_buf(),
    })
}

/// Read-only view over a finalized cache
#[derive(Debug)]
pub struct CachedSpectra {
    info: CacheInfo,
    paths: CacheFilePaths,
    encoding: PeakEncoding,
    entries: Vec<CachedSpectrumEntry>,
}

impl CachedSpectra {
    /// Reload the sidecar index and check it against the payload file
    pub fn open(paths: CacheFilePaths) -> anyhow::Result<Self> {
        // names the map until the sidecar is read
        let label = paths
            .payload
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| paths.payload.display().to_string());

        let (conn, info) = Self::read_cache_info(&paths.sidecar).map_err(|e| sidecar_error(e, &label, &paths.sidecar))?;
        let map_name = info.map_name.clone();

        // unreadable spectrum rows mean a corrupt cache
        let entries = list_cached_entries(&conn)
            .map_err(|e| SwathError::corrupt(&map_name, &paths.sidecar, format!("{:#}", e)))?;
        drop(conn);

        let encoding = PeakEncoding::from_name(&info.peak_encoding).ok_or_else(|| {
            SwathError::corrupt(&map_name, &paths.sidecar, format!("unknown peak encoding '{}'", info.peak_encoding))
        })?;

        if info.format_version != CACHE_FORMAT_VERSION {
            return Err(SwathError::corrupt(
                &map_name,
                &paths.sidecar,
                format!("unsupported cache format version {}", info.format_version),
            )
            .into());
        }

        if entries.len() as i64 != info.spectrum_count {
            return Err(SwathError::corrupt(
                &map_name,
                &paths.sidecar,
                format!("{} spectrum rows but {} announced", entries.len(), info.spectrum_count),
            )
            .into());
        }

        let mut expected_size = HEADER_SIZE as u64;
        for (position, entry) in entries.iter().enumerate() {
            if entry.data_offset != expected_size {
                return Err(SwathError::corrupt(
                    &map_name,
                    &paths.sidecar,
                    format!("spectrum #{} starts at offset {}, expected {}", position, entry.data_offset, expected_size),
                )
                .into());
            }
            expected_size = encoded_len(entry.peaks_count, encoding)
                .and_then(|len| expected_size.checked_add(len as u64))
                .ok_or_else(|| {
                    SwathError::corrupt(
                        &map_name,
                        &paths.sidecar,
                        format!("spectrum #{} announces {} peaks", position, entry.peaks_count),
                    )
                })?;
        }

        let actual_size = std::fs::metadata(&paths.payload)
            .map_err(|e| SwathError::resource(&map_name, &paths.payload, e))?
            .len();
        if actual_size != expected_size || actual_size as i64 != info.payload_size {
            return Err(SwathError::corrupt(
                &map_name,
                &paths.payload,
                format!("payload holds {} bytes, index expects {}", actual_size, expected_size),
            )
            .into());
        }

        let mut header = [0u8; HEADER_SIZE];
        File::open(&paths.payload)
            .and_then(|mut f| f.read_exact(&mut header))
            .map_err(|e| SwathError::resource(&map_name, &paths.payload, e))?;
        if decode_header(&header) != Some(encoding) {
            return Err(SwathError::corrupt(&map_name, &paths.payload, "bad payload header").into());
        }

        Ok(Self {
            info,
            paths,
            encoding,
            entries,
        })
    }

    fn read_cache_info(path: &Path) -> anyhow::Result<(Connection, CacheInfo)> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let info = get_cache_info(&conn)?;
        Ok((conn, info))
    }

    pub fn info(&self) -> &CacheInfo {
        &self.info
    }

    pub fn map_name(&self) -> &str {
        &self.info.map_name
    }

    pub fn paths(&self) -> &CacheFilePaths {
        &self.paths
    }

    pub fn peak_encoding(&self) -> PeakEncoding {
        self.encoding
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CachedSpectrumEntry] {
        &self.entries
    }

    pub fn header(&self, index: usize) -> Option<&SpectrumHeader> {
        self.entries.get(index).map(|e| &e.header)
    }

    /// Read the peaks of the spectrum at `index` from the payload file
    pub fn read_data(&self, index: usize) -> anyhow::Result<SpectrumData> {
        let entry = self.entries.get(index).ok_or_else(|| {
            SwathError::Usage(format!(
                "spectrum index {} out of range for {} ({} spectra)",
                index,
                self.map_name(),
                self.len()
            ))
        })?;

        let map_name = self.map_name();
        let payload = &self.paths.payload;

        let record_len = encoded_len(entry.peaks_count, self.encoding)
            .ok_or_else(|| SwathError::corrupt(map_name, payload, "oversized spectrum record"))?;
        let mut raw = vec![0u8; record_len];
        let mut file = File::open(payload).map_err(|e| SwathError::resource(map_name, payload, e))?;
        file.seek(SeekFrom::Start(entry.data_offset))
            .and_then(|_| file.read_exact(&mut raw))
            .map_err(|e| SwathError::resource(map_name, payload, e))?;

        let mut buf = &raw[..];
        let peaks_count = buf.get_u64_le() as usize;
        if peaks_count != entry.peaks_count {
            return Err(SwathError::corrupt(
                map_name,
                payload,
                format!("record at offset {} holds {} peaks, index says {}", entry.data_offset, peaks_count, entry.peaks_count),
            )
            .into());
        }

        let data = decode_peaks(&mut buf, peaks_count, self.encoding)
            .ok_or_else(|| SwathError::corrupt(map_name, payload, "truncated spectrum record"))?;
        Ok(data)
    }

    pub fn get_spectrum(&self, index: usize) -> anyhow::Result<Spectrum> {
        let data = self.read_data(index)?;
        Ok(Spectrum::new(self.entries[index].header.clone(), data))
    }

    /// Read every spectrum with a single sequential pass over the payload
    pub fn load_all(&self) -> anyhow::Result<Vec<Spectrum>> {
        use fallible_iterator::FallibleIterator;

        let mut spectra = Vec::with_capacity(self.len());
        let mut payload_iter = PayloadIterator::open(self.map_name(), &self.paths.payload)?;

        for entry in self.entries.iter() {
            let data = payload_iter.next()?.ok_or_else(|| {
                SwathError::corrupt(self.map_name(), &self.paths.payload, "payload ended before the index")
            })?;
            if data.peaks_count() != entry.peaks_count {
                return Err(SwathError::corrupt(
                    self.map_name(),
                    &self.paths.payload,
                    format!("spectrum '{}' has {} peaks, index says {}", entry.header.title, data.peaks_count(), entry.peaks_count),
                )
                .into());
            }
            spectra.push(Spectrum::new(entry.header.clone(), data));
        }

        Ok(spectra)
    }
}
