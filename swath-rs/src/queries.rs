//! Queries over cache sidecar databases

use anyhow_ext::{anyhow, Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use serde_rusqlite::from_rows;

use crate::cache::{sql, CacheInfo, CachedSpectrumEntry};
use crate::model::SpectrumHeader;
use crate::xml::parse_precursor_list;

#[derive(Debug, Deserialize)]
struct CachedSpectrumRecord {
    id: i64,
    initial_id: i64,
    title: String,
    time: f32,
    ms_level: i64,
    #[allow(dead_code)]
    main_precursor_mz: Option<f64>,
    precursor_list: Option<String>,
    data_points_count: i64,
    data_offset: i64,
}

pub fn get_cache_info(db: &Connection) -> Result<CacheInfo> {
    let mut stmt = db.prepare(sql::GET_CACHE_INFO).dot()?;
    let mut records = from_rows::<CacheInfo>(stmt.query([]).dot()?);

    match records.next() {
        Some(record) => Ok(record.dot()?),
        None => Err(anyhow!("cache_info table is empty")),
    }
}

pub fn get_spectrum_count(db: &Connection) -> Result<usize> {
    let count: i64 = db.query_row(sql::COUNT_SPECTRA, [], |row| row.get(0)).dot()?;
    usize::try_from(count).map_err(|_| anyhow!("invalid spectrum count {}", count))
}

/// Load every cached spectrum header, ordered by position
pub fn list_cached_entries(db: &Connection) -> Result<Vec<CachedSpectrumEntry>> {
    let mut stmt = db.prepare(sql::GET_ALL_SPECTRA).dot()?;
    let records = from_rows::<CachedSpectrumRecord>(stmt.query([]).dot()?);

    let mut entries = Vec::with_capacity(get_spectrum_count(db)?);
    for (position, record_res) in records.enumerate() {
        let record = record_res.dot()?;
        if record.id != position as i64 {
            return Err(anyhow!("spectrum rows are not contiguous: expected id {}, found {}", position, record.id));
        }

        let precursors = match record.precursor_list.as_deref() {
            Some(xml) => parse_precursor_list(xml).dot()?,
            None => Vec::new(),
        };

        let peaks_count = usize::try_from(record.data_points_count)
            .map_err(|_| anyhow!("spectrum #{} has an invalid peak count {}", position, record.data_points_count))?;
        let data_offset = u64::try_from(record.data_offset)
            .map_err(|_| anyhow!("spectrum #{} has an invalid data offset {}", position, record.data_offset))?;

        entries.push(CachedSpectrumEntry {
            header: SpectrumHeader {
                id: record.initial_id,
                title: record.title,
                ms_level: record.ms_level,
                time: record.time,
                precursors,
            },
            peaks_count,
            data_offset,
        });
    }

    Ok(entries)
}
