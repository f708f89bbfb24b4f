use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced while decoding or merging source maps.
///
/// Producer mistakes (out-of-order mappings, configuring a store that
/// already holds mappings, index maps on formats without them) are bugs in
/// the calling pipeline and panic instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid source map: {0}")]
    InvalidSourceMap(String),
}

impl Error {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidSourceMap(msg.into())
    }
}
