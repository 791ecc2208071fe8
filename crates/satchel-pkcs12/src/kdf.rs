#![forbid(unsafe_code)]

//! PKCS#12 key derivation (RFC 7292 Appendix B).
//!
//! The same derivation produces cipher keys (purpose 1), IVs (purpose 2) and
//! MAC keys (purpose 3). Each purpose is a separate derivation over the same
//! password and salt, not a split of one output.

use digest::core_api::BlockSizeUser;
use digest::{Digest, FixedOutputReset};
use satchel_core::oid;
use yasna::models::ObjectIdentifier;
use zeroize::{Zeroize, Zeroizing};

/// Diversifier selecting what a derivation produces (RFC 7292 B.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Purpose {
    Key = 1,
    Iv = 2,
    Mac = 3,
}

/// Hash functions usable with the PKCS#12 KDF, for MACs and PBES2 PRFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Digest OID as it appears in `MacData.mac.digestAlgorithm`.
    pub fn oid(&self) -> &'static [u64] {
        match self {
            Self::Sha1 => oid::SHA1,
            Self::Sha224 => oid::SHA224,
            Self::Sha256 => oid::SHA256,
            Self::Sha384 => oid::SHA384,
            Self::Sha512 => oid::SHA512,
        }
    }

    pub fn from_oid(id: &ObjectIdentifier) -> Option<Self> {
        let arcs = id.components().as_slice();
        [
            Self::Sha1,
            Self::Sha224,
            Self::Sha256,
            Self::Sha384,
            Self::Sha512,
        ]
        .into_iter()
        .find(|d| d.oid() == arcs)
    }

    /// OID of HMAC with this digest, as used for the PBKDF2 PRF.
    pub fn hmac_oid(&self) -> &'static [u64] {
        match self {
            Self::Sha1 => oid::HMAC_SHA1,
            Self::Sha224 => oid::HMAC_SHA224,
            Self::Sha256 => oid::HMAC_SHA256,
            Self::Sha384 => oid::HMAC_SHA384,
            Self::Sha512 => oid::HMAC_SHA512,
        }
    }

    pub fn from_hmac_oid(id: &ObjectIdentifier) -> Option<Self> {
        let arcs = id.components().as_slice();
        [
            Self::Sha1,
            Self::Sha224,
            Self::Sha256,
            Self::Sha384,
            Self::Sha512,
        ]
        .into_iter()
        .find(|d| d.hmac_oid() == arcs)
    }

    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Run the PKCS#12 KDF with this digest.
    pub fn derive(
        &self,
        purpose: Purpose,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        output_len: usize,
    ) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Sha1 => pkcs12_kdf::<sha1::Sha1>(purpose, password, salt, iterations, output_len),
            Self::Sha224 => {
                pkcs12_kdf::<sha2::Sha224>(purpose, password, salt, iterations, output_len)
            }
            Self::Sha256 => {
                pkcs12_kdf::<sha2::Sha256>(purpose, password, salt, iterations, output_len)
            }
            Self::Sha384 => {
                pkcs12_kdf::<sha2::Sha384>(purpose, password, salt, iterations, output_len)
            }
            Self::Sha512 => {
                pkcs12_kdf::<sha2::Sha512>(purpose, password, salt, iterations, output_len)
            }
        }
    }
}

// ── Password encoding ────────────────────────────────────────────────

/// A password prepared for both PKCS#12 (BMPString) and PBES2 (UTF-8) use.
///
/// The empty password encodes as a lone `00 00` terminator; the absent
/// password encodes as no bytes at all. The two derive different keys.
pub struct Password {
    bmp: Zeroizing<Vec<u8>>,
    utf8: Zeroizing<Vec<u8>>,
}

impl Password {
    pub fn new(password: &str) -> Self {
        Self {
            bmp: password_to_bmp(password),
            utf8: Zeroizing::new(password.as_bytes().to_vec()),
        }
    }

    pub fn absent() -> Self {
        Self {
            bmp: Zeroizing::new(Vec::new()),
            utf8: Zeroizing::new(Vec::new()),
        }
    }

    /// UTF-16BE code units followed by a two-byte terminator.
    pub fn bmp(&self) -> &[u8] {
        &self.bmp
    }

    pub fn utf8(&self) -> &[u8] {
        &self.utf8
    }

    /// True for the empty password (not the absent one).
    pub fn is_empty(&self) -> bool {
        self.bmp.as_slice() == [0, 0]
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}

/// Encode a password as BMP (UTF-16BE) with two trailing zero bytes.
pub fn password_to_bmp(password: &str) -> Zeroizing<Vec<u8>> {
    let mut bmp = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
    for c in password.encode_utf16() {
        bmp.push((c >> 8) as u8);
        bmp.push(c as u8);
    }
    bmp.push(0);
    bmp.push(0);
    bmp
}

// ── Derivation ───────────────────────────────────────────────────────

/// PKCS#12 KDF with SHA-1, the digest every legacy PBE suite uses.
pub fn pkcs12_kdf_sha1(
    purpose: Purpose,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>> {
    pkcs12_kdf::<sha1::Sha1>(purpose, password, salt, iterations, output_len)
}

/// PKCS#12 KDF (RFC 7292 Appendix B.2) over digest `D`.
///
/// `password` is already BMP-encoded. `u` is the digest output size and `v`
/// the digest block size.
pub fn pkcs12_kdf<D>(
    purpose: Purpose,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>>
where
    D: Digest + FixedOutputReset + BlockSizeUser,
{
    let u = <D as Digest>::output_size();
    let v = <D as BlockSizeUser>::block_size();

    // Step 1: D = id repeated v times
    let d_block = vec![purpose as u8; v];

    // Steps 2-4: I = S || P, each a multiple of v
    let mut i_block = extend_to_multiple(salt, v);
    i_block.extend_from_slice(&extend_to_multiple(password, v));

    let num_blocks = output_len.div_ceil(u);
    let mut result = Zeroizing::new(Vec::with_capacity(num_blocks * u));

    for block_idx in 0..num_blocks {
        // Step 6a: A = H^c(D || I)
        let mut hasher = D::new();
        Digest::update(&mut hasher, &d_block);
        Digest::update(&mut hasher, i_block.as_slice());
        let mut a = hasher.finalize_reset();

        for _ in 1..iterations {
            Digest::update(&mut hasher, &a);
            a = hasher.finalize_reset();
        }

        result.extend_from_slice(&a);

        // Step 6b/6c: I_j = (I_j + B + 1) mod 2^(v*8)
        if block_idx + 1 < num_blocks {
            let b = extend_to_multiple(&a, v);
            for chunk in i_block.chunks_mut(v) {
                add_one_plus_b(chunk, &b);
            }
        }
        a.as_mut_slice().zeroize();
    }

    result.truncate(output_len);
    result
}

/// Repeat `data` to fill a whole number of `v`-byte blocks. Empty stays empty.
fn extend_to_multiple(data: &[u8], v: usize) -> Zeroizing<Vec<u8>> {
    if data.is_empty() {
        return Zeroizing::new(Vec::new());
    }
    let len = data.len().div_ceil(v) * v;
    let mut out = Zeroizing::new(Vec::with_capacity(len));
    while out.len() < len {
        let take = (len - out.len()).min(data.len());
        out.extend_from_slice(&data[..take]);
    }
    out
}

/// `block = (block + b + 1) mod 2^(8 * len)`, big-endian.
fn add_one_plus_b(block: &mut [u8], b: &[u8]) {
    let mut carry: u16 = 1;
    for k in (0..block.len()).rev() {
        let sum = block[k] as u16 + b[k] as u16 + carry;
        block[k] = sum as u8;
        carry = sum >> 8;
    }
}
