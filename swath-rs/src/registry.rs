//! Registry of the distinct MS2 isolation windows of an acquisition

use log::debug;

use crate::model::{IsolationWindow, DEFAULT_WINDOW_TOLERANCE};

/// Distinct isolation windows with stable, dense indices
///
/// Indices are assigned in order of registration and never change. Two
/// windows are the same when both bounds agree within the absolute tolerance
/// (inclusive).
#[derive(Clone, Debug)]
pub struct IsolationWindowRegistry {
    windows: Vec<IsolationWindow>,
    tolerance: f64,
}

impl Default for IsolationWindowRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TOLERANCE)
    }
}

impl IsolationWindowRegistry {
    pub fn new(tolerance: f64) -> Self {
        Self {
            windows: Vec::new(),
            tolerance,
        }
    }

    /// Registry pre-filled with a known window list, in order
    pub fn from_windows(windows: &[IsolationWindow], tolerance: f64) -> Self {
        let mut registry = Self::new(tolerance);
        for window in windows {
            registry.register(*window);
        }
        registry
    }

    /// Index of the first registered window matching `window`
    pub fn find(&self, window: &IsolationWindow) -> Option<usize> {
        self.windows.iter().position(|w| w.matches(window, self.tolerance))
    }

    /// Append `window` unconditionally and return its index
    pub fn register(&mut self, window: IsolationWindow) -> usize {
        self.windows.push(window);
        let index = self.windows.len() - 1;
        debug!(
            "registered isolation window #{} [{:.4}, {:.4}]",
            index, window.lower, window.upper
        );
        index
    }

    /// Existing index of `window`, or a new one; the flag tells whether it was added
    pub fn find_or_register(&mut self, window: IsolationWindow) -> (usize, bool) {
        match self.find(&window) {
            Some(index) => (index, false),
            None => (self.register(window), true),
        }
    }

    pub fn get(&self, index: usize) -> Option<&IsolationWindow> {
        self.windows.get(index)
    }

    pub fn windows(&self) -> &[IsolationWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
