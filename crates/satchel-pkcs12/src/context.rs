#![forbid(unsafe_code)]

//! Decode and encode contexts: policy and tuning knobs.

use crate::kdf::DigestAlgorithm;
use crate::pbe::PbeAlgorithm;

/// How a missing or mismatched MAC is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacPolicy {
    /// Missing or mismatched MAC is an error.
    Strict,
    /// Mismatch is an error; a missing MAC is logged and reported.
    #[default]
    Standard,
    /// Both are logged; the result carries the integrity verdict.
    Lenient,
}

/// Private key representation in decoded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    /// PKCS#8 PrivateKeyInfo, as stored.
    #[default]
    Pkcs8,
    /// RSA keys as PKCS#1, EC keys as SEC1; other algorithms stay PKCS#8.
    Traditional,
}

/// Context for decoding a container.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub mac_policy: MacPolicy,
    pub key_format: KeyFormat,
    /// Upper bound on any KDF iteration count read from the input.
    pub max_iterations: u32,
}

impl DecodeContext {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 1_000_000;

    pub fn new() -> Self {
        Self {
            mac_policy: MacPolicy::default(),
            key_format: KeyFormat::default(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Context for encoding a container.
#[derive(Debug, Clone)]
pub struct EncodeContext {
    /// Cipher for shrouded key bags; `None` writes plain key bags.
    pub key_encryption: Option<PbeAlgorithm>,
    /// Cipher for blocks holding certificates, CRLs and secrets; `None`
    /// writes them as plain data.
    pub content_encryption: Option<PbeAlgorithm>,
    pub iterations: u32,
    /// MAC digest; `None` omits the MAC.
    pub mac: Option<DigestAlgorithm>,
    pub mac_iterations: u32,
    pub salt_len: usize,
}

impl EncodeContext {
    pub const DEFAULT_ITERATIONS: u32 = 2048;
    pub const DEFAULT_SALT_LEN: usize = 8;

    pub fn new() -> Self {
        Self {
            key_encryption: Some(PbeAlgorithm::Sha1And3KeyTripleDesCbc),
            content_encryption: Some(PbeAlgorithm::Sha1And3KeyTripleDesCbc),
            iterations: Self::DEFAULT_ITERATIONS,
            mac: Some(DigestAlgorithm::Sha1),
            mac_iterations: Self::DEFAULT_ITERATIONS,
            salt_len: Self::DEFAULT_SALT_LEN,
        }
    }

    /// No encryption and no MAC. Only useful for tests and inspection.
    pub fn plain() -> Self {
        Self {
            key_encryption: None,
            content_encryption: None,
            mac: None,
            ..Self::new()
        }
    }
}

impl Default for EncodeContext {
    fn default() -> Self {
        Self::new()
    }
}
