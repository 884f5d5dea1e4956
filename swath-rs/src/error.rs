//! Error taxonomy of the SWATH consumer
//!
//! Every public operation returns an [`anyhow::Result`]; the fatal error kinds
//! below travel inside it and can be recovered with
//! `err.downcast_ref::<SwathError>()`. Non-fatal anomalies are only logged.

use std::path::PathBuf;

/// Fatal errors raised while consuming or finalizing a SWATH acquisition
#[derive(Debug, thiserror::Error)]
pub enum SwathError {
    /// Programmer error: wrong call order on the consumer
    #[error("usage error: {0}")]
    Usage(String),

    /// The acquisition windows do not cycle the way the router expects
    #[error("routing inconsistency: {0}")]
    RoutingInconsistency(String),

    /// A cache payload file could not be opened, written, closed or read
    #[error("cache I/O failed for {map} ({}): {source}", path.display())]
    Resource {
        map: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The SQLite sidecar of a cached map could not be written or reloaded
    #[error("cache sidecar failed for {map} ({})", path.display())]
    Sidecar { map: String, path: PathBuf },

    /// Payload and sidecar of a cached map disagree
    #[error("corrupt cache for {map} ({}): {message}", path.display())]
    CorruptCache {
        map: String,
        path: PathBuf,
        message: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unreadable or malformed SWATH windows file
    #[error("invalid SWATH windows file {}: {message}", path.display())]
    WindowsFile { path: PathBuf, message: String },
}

impl SwathError {
    pub(crate) fn resource(map: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SwathError::Resource {
            map: map.to_string(),
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(map: &str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SwathError::CorruptCache {
            map: map.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Find the [`SwathError`] carried by an error chain, if any
pub fn swath_error(err: &anyhow::Error) -> Option<&SwathError> {
    err.downcast_ref::<SwathError>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<SwathError>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_resource_error_names_path_and_cause() {
        let err = SwathError::resource(
            "window 3",
            "/tmp/cache/swath_3.cached",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("window 3"));
        assert!(msg.contains("/tmp/cache/swath_3.cached"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_swath_error_found_through_context() {
        let res: anyhow::Result<()> = Err(std::io::Error::other("disk full"))
            .context(SwathError::Sidecar {
                map: "MS1".to_string(),
                path: PathBuf::from("x.sqlite"),
            });
        let err = res.unwrap_err();
        assert!(matches!(swath_error(&err), Some(SwathError::Sidecar { .. })));
    }
}
