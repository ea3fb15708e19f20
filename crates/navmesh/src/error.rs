// Error types for the navigation library.

use std::path::PathBuf;

use thiserror::Error;

use crate::area::AreaId;
use crate::ladder::LadderId;

pub type NavResult<T> = Result<T, NavError>;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("cannot access navigation file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid navigation file magic {0:#010x}")]
    BadMagic(u32),

    #[error("navigation file version {0} is newer than supported version {1}")]
    BadVersion(u32, u32),

    #[error("navigation file truncated while reading {0}")]
    Truncated(&'static str),

    #[error("navigation area #{0} does not exist")]
    UnknownArea(AreaId),

    #[error("navigation ladder #{0} does not exist")]
    UnknownLadder(LadderId),

    #[error("degenerate area: {0}")]
    DegenerateArea(String),

    #[error("cannot split area #{0}: {1}")]
    InvalidSplit(AreaId, &'static str),

    #[error("cannot merge area #{0} with #{1}: {2}")]
    InvalidMerge(AreaId, AreaId, &'static str),

    #[error("navigation mesh generation is already in progress")]
    GenerationInProgress,
}

impl NavError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NavError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a load that did not fail outright.
///
/// `CorruptData` means dangling references were dropped while resolving the
/// file; whatever could be resolved is in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavLoadStatus {
    Ok,
    CorruptData,
}
