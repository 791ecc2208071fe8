#![forbid(unsafe_code)]

//! Object identifier constants for PKCS#12.
//!
//! Values are taken from RFC 7292 (PKCS#12), RFC 8018 (PKCS#5), RFC 2985
//! (PKCS#9) and RFC 5652 (CMS). Each constant is the arc list of the OID.

// ── Content types (PKCS#7 / CMS) ─────────────────────────────────────

pub const DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
pub const SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
pub const ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

// ── Bag types (RFC 7292 §4.2) ────────────────────────────────────────

pub const KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 1];
pub const PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
pub const CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
pub const CRL_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 4];
pub const SECRET_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 5];
pub const SAFE_CONTENTS_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 6];

// ── Certificate and CRL types (PKCS#9) ───────────────────────────────

pub const X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];
pub const SDSI_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 2];
pub const X509_CRL: &[u64] = &[1, 2, 840, 113549, 1, 9, 23, 1];

// ── Attributes (PKCS#9) ──────────────────────────────────────────────

pub const FRIENDLY_NAME: &[u64] = &[1, 2, 840, 113549, 1, 9, 20];
pub const LOCAL_KEY_ID: &[u64] = &[1, 2, 840, 113549, 1, 9, 21];

// ── PKCS#12 PBE suites (RFC 7292 Appendix C) ─────────────────────────

pub const PBE_SHA1_RC4_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 1];
pub const PBE_SHA1_RC4_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 2];
pub const PBE_SHA1_3DES_3KEY: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
pub const PBE_SHA1_3DES_2KEY: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 4];
pub const PBE_SHA1_RC2_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 5];
pub const PBE_SHA1_RC2_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 6];

// ── PKCS#5 v2 ────────────────────────────────────────────────────────

pub const PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
pub const PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];

pub const HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
pub const HMAC_SHA224: &[u64] = &[1, 2, 840, 113549, 2, 8];
pub const HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];
pub const HMAC_SHA384: &[u64] = &[1, 2, 840, 113549, 2, 10];
pub const HMAC_SHA512: &[u64] = &[1, 2, 840, 113549, 2, 11];

pub const AES128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
pub const AES192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
pub const AES256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];

// ── Digests (MAC) ────────────────────────────────────────────────────

pub const SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
pub const SHA224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 4];
pub const SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
pub const SHA384: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 2];
pub const SHA512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 3];

// ── Private key algorithms ───────────────────────────────────────────

pub const RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];
pub const EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];

/// Render an arc list in dotted form.
pub fn dotted(arcs: &[u64]) -> String {
    arcs.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
