use crate::ClientId;

/// Errors raised by the tPSI-AD protocol.
///
/// Expected protocol outcomes (a voucher that does not match, a client below
/// threshold) are not errors; they are reported through
/// [`MatchOutcome`](crate::MatchOutcome) and
/// [`ThresholdOutcome`](crate::ThresholdOutcome).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The protocol parameters are unusable.
    #[error("invalid protocol parameters: {0}")]
    InvalidParameters(String),
    /// Two parties (or a snapshot) disagree on the protocol parameters.
    #[error("protocol parameter mismatch: expected {expected}, found {found}")]
    ParameterMismatch {
        /// What the local party was configured with.
        expected: String,
        /// What the peer or snapshot carried.
        found: String,
    },
    /// The published table does not have the advertised shape.
    #[error("malformed public table: {0}")]
    MalformedTable(String),
    /// The client is not registered with the server.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
    /// The client identifier cannot be used as a storage namespace.
    #[error("invalid client identifier {0:?}")]
    InvalidClientId(String),
    /// A canonical wire encoding could not be decoded.
    #[error("malformed encoding: {0}")]
    Decode(String),
    /// A snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),
    /// The snapshot was written by a newer version of this crate.
    #[error("unsupported snapshot version {0}")]
    UnsupportedSnapshotVersion(u32),
    /// The snapshot decoded but violates a protocol invariant.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    /// The storage collaborator failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn decode(err: borsh::io::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
