use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while mirroring a single resource.
///
/// Only the filesystem variants are fatal for a crawl; the orchestrator logs
/// the rest against the URL that produced them and carries on.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("couldn't parse URL {url:?}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL {0:?} has no host")]
    MissingHost(String),

    #[error("request for {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("couldn't process HTML of {url}")]
    Html {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("couldn't make directory {}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write file {}", path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "pending link counter of {url} would drop below zero \
         ({remaining} left, {requested} settled), this is a bug"
    )]
    CounterUnderflow {
        url: String,
        remaining: usize,
        requested: usize,
    },
}

impl MirrorError {
    /// Output-side failures invalidate the whole mirror.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::CreateDirectory { .. } | MirrorError::WriteFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_filesystem_errors_are_fatal() {
        let write = MirrorError::WriteFile {
            path: PathBuf::from("out/a.html"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(write.is_fatal());
        assert_eq!(write.to_string(), "couldn't write file out/a.html");
        assert_eq!(std::error::Error::source(&write).map(ToString::to_string).as_deref(), Some("denied"));

        let status = MirrorError::Status {
            url: "http://example.com/".to_string(),
            status: 404,
        };
        assert!(!status.is_fatal());
        assert_eq!(status.to_string(), "http://example.com/ answered with HTTP 404");
    }
}
