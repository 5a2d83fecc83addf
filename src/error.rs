//! Error types for issue2epub.
//!
//! The library reports failures through [`Error`]; the binary wraps it with
//! `anyhow` for the final diagnostic.

use std::path::PathBuf;

use url::Url;

/// Every way a run can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An issue identifier that is neither `YYYY/NN` nor `YYYY.NN`.
    #[error("invalid issue identifier {input:?}, expected YYYY/NN or YYYY.NN")]
    InvalidIssue { input: String },

    /// A URL that could not be built or parsed.
    #[error("invalid URL {input:?}: {source}")]
    Url {
        input: String,
        source: url::ParseError,
    },

    /// Connection or transport failure.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The URL is not cached and network access is disabled.
    #[error("{url} is not cached and fetching is disabled")]
    Offline { url: String },

    /// Expected markup is missing from a page.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The EPUB container could not be assembled.
    #[error("failed to package e-book: {0}")]
    Package(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn invalid_issue(input: impl Into<String>) -> Self {
        Self::InvalidIssue {
            input: input.into(),
        }
    }

    pub fn fetch(url: &Url, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = Error::invalid_issue("2017-05");
        assert_eq!(
            err.to_string(),
            "invalid issue identifier \"2017-05\", expected YYYY/NN or YYYY.NN"
        );

        let err = Error::Status {
            url: "https://jungle.world/inhalt/2017/05".into(),
            status: 404,
        };
        assert!(err.to_string().ends_with("HTTP 404"));
    }
}
