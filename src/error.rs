use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Failures raised while reading, merging, or writing combined log archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("portion metadata is malformed: {0}")]
    Format(String),
    #[error("unrecognized date `{0}`: expected YYYYMMDD or YYYY-MM-DD")]
    InvalidDate(String),
    #[error("missing combined log header in {}", path.display())]
    MissingHeader { path: PathBuf },
    #[error("malformed archive at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("archive ended inside portion `{name}` (begun at line {line})")]
    Truncated { name: String, line: usize },
    #[error("portion `{source_name}` has channel `{found}` but archive has channel `{archive}`")]
    ChannelMismatch {
        archive: String,
        found: String,
        source_name: String,
    },
    #[error("portion `{source_name}` has network `{found}` but archive has network `{archive}`")]
    NetworkMismatch {
        archive: String,
        found: String,
        source_name: String,
    },
    #[error("line {line} of `{name}` starts with an archive portion marker")]
    ReservedMarker { name: String, line: usize },
    #[error("archive has no portions")]
    EmptyArchive,
    #[error("log name `{0}` does not match [<network>_]<channel>_<YYYYMMDD>.log")]
    UnrecognizedLogName(String),
    #[error("portion name `{0}` is not a plain file name")]
    UnsafePortionName(String),
    #[error("failed to move temp file into {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}
