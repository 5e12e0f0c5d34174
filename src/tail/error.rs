// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("IO error while reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The reader was closed and can no longer be used.
    #[error("reader for {0:?} has been closed")]
    Closed(PathBuf),
}

impl TailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TailError::Io {
            path: path.into(),
            source,
        }
    }

    /// Lifecycle errors are programming errors and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TailError::Closed(_))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingWindowError {
    #[error("ring window is empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, TailError>;
