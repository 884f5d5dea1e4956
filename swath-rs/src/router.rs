//! Classification of incoming spectra into the MS1 map or an isolation window
//!
//! MS2 spectra are expected to cycle through the windows in a fixed order
//! between two MS1 scans. The router counts MS2 spectra since the last MS1 and
//! uses that counter both to validate newly discovered windows and to place
//! spectra that carry no precursor information.

use anyhow::Result;
use log::{debug, warn};

use crate::error::SwathError;
use crate::model::{IsolationWindow, SpectrumHeader};
use crate::registry::IsolationWindowRegistry;

/// Destination of a spectrum
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    Ms1,
    Ms2 { index: usize, is_new: bool },
    /// MS level other than 1 or 2; the spectrum is skipped
    Unsupported,
}

#[derive(Clone, Debug)]
pub struct WindowRouter {
    registry: IsolationWindowRegistry,
    ms2_counter: usize,
    /// Windows come from a pre-scan; discovery is disabled
    known_windows: bool,
}

impl WindowRouter {
    /// Router discovering windows as they appear
    pub fn new(tolerance: f64) -> Self {
        Self {
            registry: IsolationWindowRegistry::new(tolerance),
            ms2_counter: 0,
            known_windows: false,
        }
    }

    /// Router restricted to a known window list
    pub fn with_known_windows(windows: &[IsolationWindow], tolerance: f64) -> Self {
        Self {
            registry: IsolationWindowRegistry::from_windows(windows, tolerance),
            ms2_counter: 0,
            known_windows: true,
        }
    }

    pub fn registry(&self) -> &IsolationWindowRegistry {
        &self.registry
    }

    /// MS2 spectra routed since the last MS1 spectrum
    pub fn ms2_counter(&self) -> usize {
        self.ms2_counter
    }

    pub fn classify(&mut self, header: &SpectrumHeader) -> Result<RouteTarget> {
        match header.ms_level {
            1 => {
                self.ms2_counter = 0;
                Ok(RouteTarget::Ms1)
            }
            2 => {
                let target = match header.isolation_window() {
                    Some(window) => {
                        if header.precursors.len() > 1 {
                            debug!(
                                "spectrum '{}' has {} precursors, only the first one is used",
                                header.title,
                                header.precursors.len()
                            );
                        }
                        self.route_window(header, window)?
                    }
                    None => self.route_without_precursor(header)?,
                };
                self.ms2_counter += 1;
                Ok(target)
            }
            level => {
                warn!("skipping spectrum '{}' with unsupported MS level {}", header.title, level);
                Ok(RouteTarget::Unsupported)
            }
        }
    }

    fn route_window(&mut self, header: &SpectrumHeader, window: IsolationWindow) -> Result<RouteTarget> {
        if let Some(index) = self.registry.find(&window) {
            return Ok(RouteTarget::Ms2 { index, is_new: false });
        }

        if self.known_windows {
            return Err(SwathError::RoutingInconsistency(format!(
                "spectrum '{}' has isolation window [{}, {}] which is absent from the pre-scan",
                header.title, window.lower, window.upper
            ))
            .into());
        }

        if self.ms2_counter != self.registry.len() {
            return Err(SwathError::RoutingInconsistency(format!(
                "new isolation window [{}, {}] found in spectrum '{}' at cycle position {} while {} windows are known",
                window.lower,
                window.upper,
                header.title,
                self.ms2_counter,
                self.registry.len()
            ))
            .into());
        }

        let index = self.registry.register(window);
        Ok(RouteTarget::Ms2 { index, is_new: true })
    }

    fn route_without_precursor(&self, header: &SpectrumHeader) -> Result<RouteTarget> {
        let n = self.registry.len();
        if n == 0 {
            return Err(SwathError::RoutingInconsistency(format!(
                "spectrum '{}' has no precursor and no isolation window is known yet",
                header.title
            ))
            .into());
        }

        let index = self.ms2_counter % n;
        warn!(
            "spectrum '{}' has no precursor, assigning it to window #{} by cycle position",
            header.title, index
        );
        Ok(RouteTarget::Ms2 { index, is_new: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Precursor;

    fn ms1(id: i64) -> SpectrumHeader {
        SpectrumHeader::new(id, format!("scan={}", id), 1, id as f32)
    }

    fn ms2(id: i64, lower: f64, upper: f64) -> SpectrumHeader {
        let center = (lower + upper) / 2.0;
        SpectrumHeader::new(id, format!("scan={}", id), 2, id as f32)
            .with_precursor(Precursor::new(center, center - lower, upper - center))
    }

    fn ms2_no_precursor(id: i64) -> SpectrumHeader {
        SpectrumHeader::new(id, format!("scan={}", id), 2, id as f32)
    }

    fn index_of(target: RouteTarget) -> usize {
        match target {
            RouteTarget::Ms2 { index, .. } => index,
            other => panic!("expected an MS2 target, got {:?}", other),
        }
    }

    #[test]
    fn test_discovery() {
        let mut router = WindowRouter::new(1e-5);
        assert_eq!(router.classify(&ms1(0)).unwrap(), RouteTarget::Ms1);
        assert_eq!(router.classify(&ms2(1, 400.0, 425.0)).unwrap(), RouteTarget::Ms2 { index: 0, is_new: true });
        assert_eq!(router.classify(&ms2(2, 425.0, 450.0)).unwrap(), RouteTarget::Ms2 { index: 1, is_new: true });
        assert_eq!(router.classify(&ms1(3)).unwrap(), RouteTarget::Ms1);
        assert_eq!(router.ms2_counter(), 0);
        assert_eq!(router.classify(&ms2(4, 400.0, 425.0)).unwrap(), RouteTarget::Ms2 { index: 0, is_new: false });
        assert_eq!(router.classify(&ms2(5, 425.0, 450.0)).unwrap(), RouteTarget::Ms2 { index: 1, is_new: false });
        assert_eq!(router.registry().len(), 2);
    }

    #[test]
    fn test_new_window_out_of_cycle() {
        let mut router = WindowRouter::new(1e-5);
        router.classify(&ms1(0)).unwrap();
        router.classify(&ms2(1, 400.0, 425.0)).unwrap();
        router.classify(&ms2(2, 425.0, 450.0)).unwrap();
        router.classify(&ms1(3)).unwrap();
        router.classify(&ms2(4, 400.0, 425.0)).unwrap();

        let err = router.classify(&ms2(5, 450.0, 475.0)).unwrap_err();
        assert!(matches!(
            crate::error::swath_error(&err),
            Some(SwathError::RoutingInconsistency(_))
        ));
    }

    #[test]
    fn test_missing_precursor_uses_cycle_position() {
        let mut router = WindowRouter::new(1e-5);
        router.classify(&ms1(0)).unwrap();
        router.classify(&ms2(1, 400.0, 425.0)).unwrap();
        router.classify(&ms2(2, 425.0, 450.0)).unwrap();
        router.classify(&ms2(3, 450.0, 475.0)).unwrap();
        router.classify(&ms1(4)).unwrap();

        assert_eq!(index_of(router.classify(&ms2_no_precursor(5)).unwrap()), 0);
        assert_eq!(index_of(router.classify(&ms2_no_precursor(6)).unwrap()), 1);
        assert_eq!(index_of(router.classify(&ms2(7, 450.0, 475.0)).unwrap()), 2);
        assert_eq!(index_of(router.classify(&ms2_no_precursor(8)).unwrap()), 0);
    }

    #[test]
    fn test_missing_precursor_without_windows() {
        let mut router = WindowRouter::new(1e-5);
        let err = router.classify(&ms2_no_precursor(0)).unwrap_err();
        assert!(err.to_string().contains("no precursor"));
    }

    #[test]
    fn test_known_windows() {
        let windows = [
            IsolationWindow::from_bounds(400.0, 425.0),
            IsolationWindow::from_bounds(425.0, 450.0),
        ];
        let mut router = WindowRouter::with_known_windows(&windows, 1e-5);

        // no MS1 before: precursor-less spectra use the known list length
        assert_eq!(index_of(router.classify(&ms2_no_precursor(0)).unwrap()), 0);
        assert_eq!(router.classify(&ms2(1, 425.0, 450.0)).unwrap(), RouteTarget::Ms2 { index: 1, is_new: false });
        assert_eq!(index_of(router.classify(&ms2_no_precursor(2)).unwrap()), 0);

        let err = router.classify(&ms2(3, 450.0, 475.0)).unwrap_err();
        assert!(err.to_string().contains("absent from the pre-scan"));
    }

    #[test]
    fn test_unsupported_level() {
        let mut router = WindowRouter::new(1e-5);
        let header = SpectrumHeader::new(0, "scan=1", 3, 0.0);
        assert_eq!(router.classify(&header).unwrap(), RouteTarget::Unsupported);
        assert_eq!(router.ms2_counter(), 0);
    }
}
