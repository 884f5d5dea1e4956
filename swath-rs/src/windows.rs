//! SWATH windows file
//!
//! Tab or space separated text file; the first line is a header, every other
//! non-empty line holds the `lower upper` bounds of one window:
//!
//! ```text
//! lower_offset upper_offset
//! 400 425
//! 424 450
//! ```

use anyhow::Result;
use itertools::Itertools;
use log::info;
use std::path::Path;

use crate::error::SwathError;
use crate::model::IsolationWindow;
use crate::swath_map::SwathMap;

fn windows_file_error(path: &Path, message: impl Into<String>) -> anyhow::Error {
    SwathError::WindowsFile {
        path: path.to_path_buf(),
        message: message.into(),
    }
    .into()
}

pub fn parse_swath_windows(path: &Path, content: &str) -> Result<Vec<IsolationWindow>> {
    let mut windows = Vec::new();

    for (line_idx, line) in content.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((lower, upper)) = line.split_whitespace().collect_tuple::<(&str, &str)>() else {
            return Err(windows_file_error(
                path,
                format!("line {}: expected two columns, found '{}'", line_idx + 1, line),
            ));
        };

        let parse = |value: &str| {
            value.parse::<f64>().map_err(|_| {
                windows_file_error(path, format!("line {}: '{}' is not a number", line_idx + 1, value))
            })
        };
        let (lower, upper) = (parse(lower)?, parse(upper)?);

        if lower >= upper {
            return Err(windows_file_error(
                path,
                format!("line {}: lower bound {} is not below upper bound {}", line_idx + 1, lower, upper),
            ));
        }

        windows.push(IsolationWindow::from_bounds(lower, upper));
    }

    Ok(windows)
}

/// Read the window bounds listed in a SWATH windows file
pub fn read_swath_windows(path: impl AsRef<Path>) -> Result<Vec<IsolationWindow>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| windows_file_error(path, e.to_string()))?;
    let windows = parse_swath_windows(path, &content)?;
    info!("read {} SWATH windows from {}", windows.len(), path.display());
    Ok(windows)
}

/// Overwrite the bounds of the MS2 maps with `windows`, in order
///
/// With `sort`, the windows are sorted by lower bound first. The MS1 map is
/// left untouched.
pub fn annotate_swath_maps(maps: &mut [SwathMap], windows: &[IsolationWindow], sort: bool) -> Result<()> {
    let ms2_count = maps.iter().filter(|m| !m.ms1).count();
    if ms2_count != windows.len() {
        return Err(SwathError::Usage(format!(
            "{} SWATH windows were given but the data holds {} MS2 maps",
            windows.len(),
            ms2_count
        ))
        .into());
    }

    let windows: Vec<IsolationWindow> = if sort {
        windows
            .iter()
            .copied()
            .sorted_by(|a, b| a.lower.total_cmp(&b.lower))
            .collect()
    } else {
        windows.to_vec()
    };

    for (map, window) in maps.iter_mut().filter(|m| !m.ms1).zip(windows) {
        map.lower = window.lower;
        map.upper = window.upper;
        map.center = window.center;
    }

    Ok(())
}
