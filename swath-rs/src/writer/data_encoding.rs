//! Binary encoding of cached peaks
//!
//! A payload file starts with an 8-byte header (`SWCACHE` + peak encoding code)
//! followed by one record per spectrum: `u64` peak count, all m/z values, then
//! all intensities, little endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::model::{PeakEncoding, SpectrumData};

pub const CACHE_MAGIC: &[u8; 7] = b"SWCACHE";
pub const HEADER_SIZE: usize = 8;
pub const PEAK_COUNT_SIZE: usize = 8;

pub fn encode_header(encoding: PeakEncoding) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..7].copy_from_slice(CACHE_MAGIC);
    header[7] = encoding.code();
    header
}

/// Returns the peak encoding stored in a payload header, `None` if the magic is wrong
pub fn decode_header(header: &[u8]) -> Option<PeakEncoding> {
    if header.len() < HEADER_SIZE || &header[..7] != CACHE_MAGIC {
        return None;
    }
    PeakEncoding::from_code(header[7])
}

/// Bytes taken by the peaks of one record, `None` on overflow
pub fn peaks_len(peaks_count: usize, encoding: PeakEncoding) -> Option<usize> {
    peaks_count.checked_mul(encoding.peak_size())
}

/// Number of bytes one spectrum record occupies, `None` on overflow
pub fn encoded_len(peaks_count: usize, encoding: PeakEncoding) -> Option<usize> {
    peaks_len(peaks_count, encoding)?.checked_add(PEAK_COUNT_SIZE)
}

/// Append one spectrum record to `buf`
///
/// The caller guarantees both arrays have the same length.
pub fn encode_peaks(buf: &mut BytesMut, data: &SpectrumData, encoding: PeakEncoding) {
    let n = data.peaks_count();
    if let Some(len) = encoded_len(n, encoding) {
        buf.reserve(len);
    }
    buf.put_u64_le(n as u64);

    match encoding {
        PeakEncoding::LowRes => {
            data.mz_array.iter().for_each(|&mz| buf.put_f32_le(mz as f32));
            data.intensity_array.iter().for_each(|&int| buf.put_f32_le(int));
        }
        PeakEncoding::HighRes => {
            data.mz_array.iter().for_each(|&mz| buf.put_f64_le(mz));
            data.intensity_array.iter().for_each(|&int| buf.put_f32_le(int));
        }
        PeakEncoding::NoLoss => {
            data.mz_array.iter().for_each(|&mz| buf.put_f64_le(mz));
            data.intensity_array.iter().for_each(|&int| buf.put_f64_le(int as f64));
        }
    }
}

/// Decode the peaks of one record whose count prefix was already consumed
///
/// Returns `None` when `buf` holds fewer bytes than the record needs.
pub fn decode_peaks<B: Buf>(buf: &mut B, peaks_count: usize, encoding: PeakEncoding) -> Option<SpectrumData> {
    if buf.remaining() < peaks_len(peaks_count, encoding)? {
        return None;
    }

    let mut mz_array = Vec::with_capacity(peaks_count);
    let mut intensity_array = Vec::with_capacity(peaks_count);

    match encoding {
        PeakEncoding::LowRes => {
            (0..peaks_count).for_each(|_| mz_array.push(buf.get_f32_le() as f64));
            (0..peaks_count).for_each(|_| intensity_array.push(buf.get_f32_le()));
        }
        PeakEncoding::HighRes => {
            (0..peaks_count).for_each(|_| mz_array.push(buf.get_f64_le()));
            (0..peaks_count).for_each(|_| intensity_array.push(buf.get_f32_le()));
        }
        PeakEncoding::NoLoss => {
            (0..peaks_count).for_each(|_| mz_array.push(buf.get_f64_le()));
            (0..peaks_count).for_each(|_| intensity_array.push(buf.get_f64_le() as f32));
        }
    }

    Some(SpectrumData::new(mz_array, intensity_array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> SpectrumData {
        SpectrumData::new(vec![400.123456789, 401.5, 1200.000001], vec![10.5, 0.0, 1.0e6])
    }

    #[test]
    fn test_header() {
        let header = encode_header(PeakEncoding::NoLoss);
        assert_eq!(&header[..7], b"SWCACHE");
        assert_eq!(decode_header(&header), Some(PeakEncoding::NoLoss));
        assert_eq!(decode_header(b"SQLite f"), None);
        assert_eq!(decode_header(b"SWC"), None);
    }

    #[test]
    fn test_high_res_is_lossless() {
        let data = sample_data();
        let mut buf = BytesMut::new();
        encode_peaks(&mut buf, &data, PeakEncoding::HighRes);
        assert_eq!(Some(buf.len()), encoded_len(3, PeakEncoding::HighRes));

        let mut bytes = buf.freeze();
        let n = bytes.get_u64_le() as usize;
        let decoded = decode_peaks(&mut bytes, n, PeakEncoding::HighRes).unwrap();
        assert_eq!(decoded, data);
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn test_low_res_truncates_mz() {
        let data = sample_data();
        let mut buf = BytesMut::new();
        encode_peaks(&mut buf, &data, PeakEncoding::LowRes);
        assert_eq!(buf.len(), 8 + 3 * 8);

        let mut bytes = buf.freeze();
        let n = bytes.get_u64_le() as usize;
        let decoded = decode_peaks(&mut bytes, n, PeakEncoding::LowRes).unwrap();
        assert_eq!(decoded.mz_array[1], 401.5);
        assert!((decoded.mz_array[0] - 400.123456789).abs() < 1e-4);
        assert_eq!(decoded.intensity_array, data.intensity_array);
    }

    #[test]
    fn test_short_buffer() {
        let mut buf = BytesMut::new();
        encode_peaks(&mut buf, &sample_data(), PeakEncoding::NoLoss);
        let mut truncated = buf.freeze().slice(..20);
        let n = truncated.get_u64_le() as usize;
        assert!(decode_peaks(&mut truncated, n, PeakEncoding::NoLoss).is_none());
    }

    #[test]
    fn test_oversized_peak_count() {
        assert_eq!(peaks_len(usize::MAX / 8, PeakEncoding::NoLoss), None);
        assert_eq!(encoded_len(usize::MAX / 12, PeakEncoding::HighRes), None);
        assert_eq!(encoded_len(2, PeakEncoding::LowRes), Some(24));

        let mut bytes = &[0u8; 64][..];
        assert!(decode_peaks(&mut bytes, 1 << 62, PeakEncoding::HighRes).is_none());
        assert_eq!(bytes.len(), 64);
    }
}
