use crate::measurement::MeasurementType;

/// Failure classes of the core. Most of them never reach a client: the read
/// path degrades to partial results and the write path drops the offending
/// measurement (see the per-call sites for the policy).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{name} is registered as {existing}, refusing a {requested} measurement")]
    TypeMismatch {
        name: String,
        existing: MeasurementType,
        requested: MeasurementType,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid time range: start {start} is after end {end}")]
    RangeInvalid { start: i64, end: i64 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Error::TypeMismatch { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
