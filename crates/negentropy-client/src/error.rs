use std::fmt;

/// Errors raised by the reconciliation core (§7) and the session layer.
#[derive(Debug)]
pub enum Error {
    /// Wire bytes could not be parsed: varint overrun, an id-prefix longer
    /// than 32 bytes, a truncated bound/fingerprint/id-list, or similar.
    Malformed(&'static str),
    /// `reconcile` called before `initiate`, or `initiate` called twice.
    InvalidState(&'static str),
    /// A caller-supplied id was not 32 bytes, or a hex id was not 64 hex
    /// characters.
    InvalidRecord(String),
    /// The relay's leading version byte did not match the one this client
    /// speaks.
    UnsupportedVersion(u8),
    /// The relay closed the session via `NEG-ERR`, or a `NOTICE` mentioning
    /// negentropy closed every open session.
    PeerError { code: String, detail: Option<String> },
    /// Reconciliation did not converge within the configured window.
    Timeout,
    /// The underlying transport failed.
    TransportDown(String),
    HexDecodeFailed,
    Json(serde_json::Error),
    Generic(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed negentropy message: {reason}"),
            Self::InvalidState(reason) => write!(f, "invalid reconciliation state: {reason}"),
            Self::InvalidRecord(reason) => write!(f, "invalid record: {reason}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported protocol version: 0x{v:02x}"),
            Self::PeerError { code, detail: None } => write!(f, "peer error: {code}"),
            Self::PeerError {
                code,
                detail: Some(d),
            } => write!(f, "peer error: {code}: {d}"),
            Self::Timeout => write!(f, "reconciliation timed out"),
            Self::TransportDown(reason) => write!(f, "transport down: {reason}"),
            Self::HexDecodeFailed => write!(f, "hex decoding failed"),
            Self::Json(e) => write!(f, "{e}"),
            Self::Generic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(_e: hex::FromHexError) -> Self {
        Error::HexDecodeFailed
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(_e: std::array::TryFromSliceError) -> Self {
        Error::InvalidRecord("id must be exactly 32 bytes".to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

/// Split a `NEG-ERR` reason string (`"code[: details]"`) into its code and
/// optional detail, per §6.2.
pub fn split_peer_reason(reason: &str) -> Error {
    match reason.split_once(':') {
        Some((code, detail)) => Error::PeerError {
            code: code.trim().to_string(),
            detail: Some(detail.trim().to_string()),
        },
        None => Error::PeerError {
            code: reason.trim().to_string(),
            detail: None,
        },
    }
}
