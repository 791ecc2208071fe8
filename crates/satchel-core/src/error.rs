#![forbid(unsafe_code)]

/// Errors produced by the satchel PKCS#12 codec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or truncated encoding, or an unexpected type at a position.
    #[error("malformed {layer}: {detail}")]
    Structural { layer: &'static str, detail: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Padding or content check failed after decryption, almost always a
    /// wrong password.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The container MAC is missing or does not match.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("iteration count {requested} exceeds the configured limit of {limit}")]
    IterationLimit { requested: u64, limit: u32 },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),
}

/// Coarse classification of an [`Error`], for callers that present
/// "wrong password" and "tampered file" differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Unsupported,
    Decryption,
    Integrity,
    Encoding,
    Crypto,
}

impl Error {
    pub fn structural(layer: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Structural {
            layer,
            detail: detail.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Structural { .. } => ErrorKind::Structural,
            // An absurd iteration count is a property of the input, not of
            // the password.
            Self::IterationLimit { .. } | Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Crypto(_) => ErrorKind::Crypto,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
