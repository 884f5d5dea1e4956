//! Sidecar writer
//!
//! Stores the headers of a cached map and the offsets of their peak records.

use anyhow_ext::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::cache::{sql, CacheInfo, CachedSpectrumEntry};
use crate::xml::write_precursor_list;

/// Create (or replace) the sidecar database at `path`
pub(crate) fn write_sidecar(path: &Path, info: &CacheInfo, entries: &[CachedSpectrumEntry]) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).dot()?;
    }

    let conn = Connection::open(path).dot()?;

    conn.execute_batch(
        "PRAGMA encoding='UTF-8';
         PRAGMA synchronous=OFF;
         PRAGMA journal_mode=OFF;
         PRAGMA temp_store=2;
         PRAGMA cache_size=-100000;
         PRAGMA page_size=4096;
         PRAGMA automatic_index=OFF;
         PRAGMA locking_mode=EXCLUSIVE;
         PRAGMA foreign_keys=OFF;
         BEGIN TRANSACTION;",
    )
    .dot()?;

    conn.execute_batch(sql::SIDECAR_SCHEMA).dot()?;

    insert_cache_info(&conn, info).dot()?;
    insert_spectra(&conn, entries).dot()?;

    conn.execute_batch("CREATE INDEX spectrum_ms_level_idx ON spectrum (ms_level ASC);
         COMMIT TRANSACTION;")
        .dot()?;

    conn.close().map_err(|(_, e)| e).dot()?;

    Ok(())
}

fn insert_cache_info(conn: &Connection, info: &CacheInfo) -> Result<()> {
    conn.execute(
        sql::INSERT_CACHE_INFO,
        rusqlite::params![
            info.format_version,
            &info.peak_encoding,
            info.spectrum_count,
            info.payload_size,
            &info.map_name,
            info.is_ms1,
            info.lower_mz,
            info.upper_mz,
            info.center_mz,
        ],
    )
    .dot()?;

    Ok(())
}

fn insert_spectra(conn: &Connection, entries: &[CachedSpectrumEntry]) -> Result<()> {
    let mut stmt = conn.prepare(sql::INSERT_SPECTRUM).dot()?;

    for (position, entry) in entries.iter().enumerate() {
        let header = &entry.header;
        let precursor_list = if header.precursors.is_empty() {
            None
        } else {
            Some(write_precursor_list(&header.precursors).dot()?)
        };

        stmt.execute(rusqlite::params![
            position as i64,
            header.id,
            &header.title,
            header.time as f64,
            header.ms_level,
            header.main_precursor().map(|p| p.target_mz),
            precursor_list,
            entry.peaks_count as i64,
            entry.data_offset as i64,
        ])
        .dot()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Precursor, SpectrumHeader};
    use crate::queries::{get_cache_info, get_spectrum_count, list_cached_entries};

    fn sample_info(count: i64) -> CacheInfo {
        CacheInfo {
            format_version: 1,
            peak_encoding: "high_res".to_string(),
            spectrum_count: count,
            payload_size: 8,
            map_name: "window 0".to_string(),
            is_ms1: 0,
            lower_mz: 400.0,
            upper_mz: 425.0,
            center_mz: 412.5,
        }
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("test.cached.sqlite");

        let entries: Vec<CachedSpectrumEntry> = (0..3)
            .map(|i| CachedSpectrumEntry {
                header: SpectrumHeader::new(10 + i, format!("scan={}", 11 + i), 2, 0.5 * i as f32)
                    .with_precursor(Precursor::new(412.5, 12.5, 12.5)),
                peaks_count: i as usize,
                data_offset: 8 + 8 * i as u64,
            })
            .collect();

        write_sidecar(&path, &sample_info(3), &entries).expect("failed to write sidecar");
        // a second write replaces the first one
        write_sidecar(&path, &sample_info(3), &entries).expect("failed to rewrite sidecar");

        let conn = Connection::open(&path).unwrap();
        assert_eq!(get_cache_info(&conn).unwrap(), sample_info(3));
        assert_eq!(get_spectrum_count(&conn).unwrap(), 3);
        assert_eq!(list_cached_entries(&conn).unwrap(), entries);
    }
}
