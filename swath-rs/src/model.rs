//! Core data structures: spectra, precursors and isolation windows

use serde::{Deserialize, Serialize};

use crate::error::SwathError;

/// Bounds reported by the MS1 map, which has no isolation window
pub const MS1_SENTINEL_MZ: f64 = -1.0;

/// Default absolute tolerance (m/z) used to decide whether two isolation windows are identical
pub const DEFAULT_WINDOW_TOLERANCE: f64 = 1e-5;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolationWindow {
    pub lower: f64,
    pub upper: f64,
    pub center: f64,
}

impl IsolationWindow {
    pub fn new(lower: f64, upper: f64, center: f64) -> Self {
        Self { lower, upper, center }
    }

    /// Window with its center placed halfway between the bounds
    pub fn from_bounds(lower: f64, upper: f64) -> Self {
        Self::new(lower, upper, (lower + upper) / 2.0)
    }

    /// Placeholder identity of the MS1 map
    pub fn ms1() -> Self {
        Self::new(MS1_SENTINEL_MZ, MS1_SENTINEL_MZ, MS1_SENTINEL_MZ)
    }

    /// Both bounds agree within `tolerance` (absolute, inclusive)
    pub fn matches(&self, other: &IsolationWindow, tolerance: f64) -> bool {
        (self.lower - other.lower).abs() <= tolerance && (self.upper - other.upper).abs() <= tolerance
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, mz: f64) -> bool {
        mz >= self.lower && mz <= self.upper
    }
}

/// Precursor ion description of an MSn spectrum
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    /// Isolation window target m/z (MS:1000827)
    pub target_mz: f64,
    /// Isolation window lower offset (MS:1000828)
    pub lower_offset: f64,
    /// Isolation window upper offset (MS:1000829)
    pub upper_offset: f64,
    /// Selected ion m/z (MS:1000744)
    pub selected_ion_mz: Option<f64>,
    /// Charge state (MS:1000041)
    pub charge: Option<i32>,
    /// Collision energy (MS:1000045)
    pub collision_energy: Option<f64>,
    /// Activation method name (e.g. "beam-type collision-induced dissociation")
    pub activation_type: Option<String>,
}

impl Precursor {
    pub fn new(target_mz: f64, lower_offset: f64, upper_offset: f64) -> Self {
        Self {
            target_mz,
            lower_offset,
            upper_offset,
            ..Default::default()
        }
    }

    pub fn isolation_window(&self) -> IsolationWindow {
        IsolationWindow::new(
            self.target_mz - self.lower_offset,
            self.target_mz + self.upper_offset,
            self.target_mz,
        )
    }
}

/// Scalar metadata of a spectrum
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumHeader {
    /// Index of the spectrum in its source stream
    pub id: i64,
    /// Native identifier (e.g. "controllerType=0 controllerNumber=1 scan=42")
    pub title: String,
    pub ms_level: i64,
    /// Retention time in seconds
    pub time: f32,
    pub precursors: Vec<Precursor>,
}

impl SpectrumHeader {
    pub fn new(id: i64, title: impl Into<String>, ms_level: i64, time: f32) -> Self {
        Self {
            id,
            title: title.into(),
            ms_level,
            time,
            precursors: Vec::new(),
        }
    }

    pub fn with_precursor(mut self, precursor: Precursor) -> Self {
        self.precursors.push(precursor);
        self
    }

    /// First precursor; the only one taken into account for window identity
    pub fn main_precursor(&self) -> Option<&Precursor> {
        self.precursors.first()
    }

    pub fn isolation_window(&self) -> Option<IsolationWindow> {
        self.main_precursor().map(Precursor::isolation_window)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrumData {
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f32>,
}

impl SpectrumData {
    pub fn new(mz_array: Vec<f64>, intensity_array: Vec<f32>) -> Self {
        Self { mz_array, intensity_array }
    }

    pub fn peaks_count(&self) -> usize {
        self.mz_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_array.is_empty()
    }

    /// Fails when the m/z and intensity arrays differ in length
    pub fn check_lengths(&self, title: &str) -> anyhow::Result<()> {
        if self.mz_array.len() != self.intensity_array.len() {
            return Err(SwathError::Usage(format!(
                "spectrum '{}' has {} m/z values but {} intensities",
                title,
                self.mz_array.len(),
                self.intensity_array.len()
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    pub header: SpectrumHeader,
    pub data: SpectrumData,
}

impl Spectrum {
    pub fn new(header: SpectrumHeader, data: SpectrumData) -> Self {
        Self { header, data }
    }

    pub fn ms_level(&self) -> i64 {
        self.header.ms_level
    }

    pub fn time(&self) -> f32 {
        self.header.time
    }
}

/// Chromatogram block; not expected in SWATH acquisitions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chromatogram {
    pub id: i64,
    pub native_id: String,
    pub time_array: Vec<f32>,
    pub intensity_array: Vec<f32>,
}

/// Binary layout of one peak in a cache payload file
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeakEncoding {
    /// 32-bit m/z, 32-bit intensity
    LowRes,
    /// 64-bit m/z, 32-bit intensity
    #[default]
    HighRes,
    /// 64-bit m/z, 64-bit intensity
    NoLoss,
}

impl PeakEncoding {
    /// Size of one encoded peak in bytes
    pub fn peak_size(&self) -> usize {
        match self {
            PeakEncoding::LowRes => 8,
            PeakEncoding::HighRes => 12,
            PeakEncoding::NoLoss => 16,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PeakEncoding::LowRes => 1,
            PeakEncoding::HighRes => 2,
            PeakEncoding::NoLoss => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PeakEncoding::LowRes),
            2 => Some(PeakEncoding::HighRes),
            3 => Some(PeakEncoding::NoLoss),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [PeakEncoding::LowRes, PeakEncoding::HighRes, PeakEncoding::NoLoss]
            .into_iter()
            .find(|pe| pe.to_string() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precursor_isolation_window() {
        let prec = Precursor::new(412.5, 12.5, 12.5);
        let iw = prec.isolation_window();
        assert_eq!(iw.lower, 400.0);
        assert_eq!(iw.upper, 425.0);
        assert_eq!(iw.center, 412.5);
        assert_eq!(iw.width(), 25.0);
        assert!(iw.contains(400.0) && iw.contains(425.0));
    }

    #[test]
    fn test_asymmetric_offsets() {
        let iw = Precursor::new(500.0, 1.0, 3.0).isolation_window();
        assert_eq!((iw.lower, iw.upper), (499.0, 503.0));
    }

    #[test]
    fn test_window_matching_is_inclusive() {
        let a = IsolationWindow::from_bounds(400.0, 425.0);
        let b = IsolationWindow::from_bounds(400.5, 425.0);
        assert!(a.matches(&b, 0.5));
        assert!(!a.matches(&b, 0.25));
    }

    #[test]
    fn test_peak_encoding_names() {
        assert_eq!(PeakEncoding::HighRes.to_string(), "high_res");
        for pe in [PeakEncoding::LowRes, PeakEncoding::HighRes, PeakEncoding::NoLoss] {
            assert_eq!(PeakEncoding::from_name(&pe.to_string()), Some(pe));
            assert_eq!(PeakEncoding::from_code(pe.code()), Some(pe));
        }
        assert_eq!(PeakEncoding::from_code(0), None);
    }

    #[test]
    fn test_header_main_precursor() {
        let header = SpectrumHeader::new(3, "scan=4", 2, 1.5)
            .with_precursor(Precursor::new(412.5, 12.5, 12.5))
            .with_precursor(Precursor::new(800.0, 1.0, 1.0));
        assert_eq!(header.main_precursor().unwrap().target_mz, 412.5);
        assert_eq!(header.isolation_window().unwrap().lower, 400.0);
    }

    #[test]
    fn test_check_lengths() {
        assert!(SpectrumData::new(vec![400.0, 401.0], vec![1.0, 2.0]).check_lengths("scan=1").is_ok());

        let err = SpectrumData::new(vec![400.0, 401.0], vec![1.0]).check_lengths("scan=2").unwrap_err();
        assert!(matches!(crate::error::swath_error(&err), Some(SwathError::Usage(_))));
        assert!(err.to_string().contains("'scan=2' has 2 m/z values but 1 intensities"));
    }
}
