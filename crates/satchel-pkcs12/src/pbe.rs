#![forbid(unsafe_code)]

//! Password-based encryption for PKCS#12 content and shrouded keys.
//!
//! Two families:
//! 1. PKCS#12 PBE (RFC 7292 Appendix C): SHA-1 KDF + 3DES-CBC or RC2-CBC.
//!    These are the only suites used for encryption.
//! 2. PBES2 (RFC 8018): PBKDF2 + AES-CBC, as written by OpenSSL 3.x.
//!    Decryption only.

use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use rand::RngCore;
use satchel_core::{oid, Error};
use yasna::models::ObjectIdentifier;
use zeroize::Zeroizing;

use crate::kdf::{self, DigestAlgorithm, Password, Purpose};
use crate::model::{is_oid, AlgorithmIdentifier, PbeParams};

/// CBC block size shared by DES and RC2.
const LEGACY_BLOCK: usize = 8;
const AES_BLOCK: usize = 16;

// ── PKCS#12 PBE suites ───────────────────────────────────────────────

/// PKCS#12 password-based encryption suites (all SHA-1 based, CBC mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbeAlgorithm {
    /// pbeWithSHAAnd3-KeyTripleDES-CBC
    Sha1And3KeyTripleDesCbc,
    /// pbeWithSHAAnd2-KeyTripleDES-CBC
    Sha1And2KeyTripleDesCbc,
    /// pbeWithSHAAnd128BitRC2-CBC
    Sha1And128BitRc2Cbc,
    /// pbewithSHAAnd40BitRC2-CBC
    Sha1And40BitRc2Cbc,
}

static PBE_SUITES: &[(&[u64], PbeAlgorithm)] = &[
    (oid::PBE_SHA1_3DES_3KEY, PbeAlgorithm::Sha1And3KeyTripleDesCbc),
    (oid::PBE_SHA1_3DES_2KEY, PbeAlgorithm::Sha1And2KeyTripleDesCbc),
    (oid::PBE_SHA1_RC2_128, PbeAlgorithm::Sha1And128BitRc2Cbc),
    (oid::PBE_SHA1_RC2_40, PbeAlgorithm::Sha1And40BitRc2Cbc),
];

impl PbeAlgorithm {
    pub fn oid(&self) -> &'static [u64] {
        match self {
            Self::Sha1And3KeyTripleDesCbc => oid::PBE_SHA1_3DES_3KEY,
            Self::Sha1And2KeyTripleDesCbc => oid::PBE_SHA1_3DES_2KEY,
            Self::Sha1And128BitRc2Cbc => oid::PBE_SHA1_RC2_128,
            Self::Sha1And40BitRc2Cbc => oid::PBE_SHA1_RC2_40,
        }
    }

    pub fn from_oid(id: &ObjectIdentifier) -> Option<Self> {
        PBE_SUITES
            .iter()
            .find(|(arcs, _)| is_oid(id, arcs))
            .map(|(_, suite)| *suite)
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::Sha1And3KeyTripleDesCbc => 24,
            Self::Sha1And2KeyTripleDesCbc => 16,
            Self::Sha1And128BitRc2Cbc => 16,
            Self::Sha1And40BitRc2Cbc => 5,
        }
    }

    pub fn iv_len(&self) -> usize {
        LEGACY_BLOCK
    }

    fn decrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        match self {
            Self::Sha1And3KeyTripleDesCbc => cbc_decrypt(new_cipher::<des::TdesEde3>(key)?, iv, buf),
            Self::Sha1And2KeyTripleDesCbc => cbc_decrypt(new_cipher::<des::TdesEde2>(key)?, iv, buf),
            Self::Sha1And128BitRc2Cbc | Self::Sha1And40BitRc2Cbc => {
                cbc_decrypt(rc2_cipher(key), iv, buf)
            }
        }
    }

    fn encrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        match self {
            Self::Sha1And3KeyTripleDesCbc => cbc_encrypt(new_cipher::<des::TdesEde3>(key)?, iv, buf),
            Self::Sha1And2KeyTripleDesCbc => cbc_encrypt(new_cipher::<des::TdesEde2>(key)?, iv, buf),
            Self::Sha1And128BitRc2Cbc | Self::Sha1And40BitRc2Cbc => {
                cbc_encrypt(rc2_cipher(key), iv, buf)
            }
        }
    }
}

/// RC2 with the effective key length equal to the key length, as PKCS#12 uses it.
fn rc2_cipher(key: &[u8]) -> rc2::Rc2 {
    rc2::Rc2::new_with_eff_key_len(key, key.len() * 8)
}

fn new_cipher<C: KeyInit>(key: &[u8]) -> Result<C, Error> {
    C::new_from_slice(key).map_err(|e| Error::Crypto(format!("cipher init: {e}")))
}

// ── PBES2 ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AesKeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl AesKeySize {
    fn from_oid(id: &ObjectIdentifier) -> Option<Self> {
        if is_oid(id, oid::AES128_CBC) {
            Some(Self::Aes128)
        } else if is_oid(id, oid::AES192_CBC) {
            Some(Self::Aes192)
        } else if is_oid(id, oid::AES256_CBC) {
            Some(Self::Aes256)
        } else {
            None
        }
    }

    fn key_len(&self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

// ── Scheme parsing ───────────────────────────────────────────────────

/// A parsed `AlgorithmIdentifier` for one encrypted block or key.
enum Scheme {
    Pkcs12 {
        suite: PbeAlgorithm,
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        prf: DigestAlgorithm,
        cipher: AesKeySize,
        iv: Vec<u8>,
    },
}

impl Scheme {
    fn parse(algorithm: &AlgorithmIdentifier, max_iterations: u32) -> Result<Self, Error> {
        let params = algorithm.parameters.as_deref().ok_or_else(|| {
            Error::structural("PBE parameters", format!("{} has no parameters", algorithm.oid))
        })?;

        if let Some(suite) = PbeAlgorithm::from_oid(&algorithm.oid) {
            let params = PbeParams::from_ber(params)?;
            return Ok(Self::Pkcs12 {
                suite,
                iterations: check_iterations(params.iterations, max_iterations)?,
                salt: params.salt,
            });
        }

        if is_oid(&algorithm.oid, oid::PBES2) {
            return Self::parse_pbes2(params, max_iterations);
        }

        if is_oid(&algorithm.oid, oid::PBE_SHA1_RC4_128) || is_oid(&algorithm.oid, oid::PBE_SHA1_RC4_40) {
            return Err(Error::Unsupported(format!(
                "RC4 encryption ({}) is not supported",
                algorithm.oid
            )));
        }

        Err(Error::Unsupported(format!(
            "encryption algorithm {}",
            algorithm.oid
        )))
    }

    /// PBES2-params ::= SEQUENCE { keyDerivationFunc AlgorithmIdentifier, encryptionScheme AlgorithmIdentifier }
    fn parse_pbes2(params: &[u8], max_iterations: u32) -> Result<Self, Error> {
        let (kdf, enc) = yasna::parse_ber(params, |r| {
            r.read_sequence(|r| {
                let kdf = AlgorithmIdentifier::read(r.next())?;
                let enc = AlgorithmIdentifier::read(r.next())?;
                Ok((kdf, enc))
            })
        })
        .map_err(|e| Error::structural("PBES2 parameters", e))?;

        if !is_oid(&kdf.oid, oid::PBKDF2) {
            return Err(Error::Unsupported(format!("PBES2 key derivation {}", kdf.oid)));
        }
        let kdf_params = kdf
            .parameters
            .as_deref()
            .ok_or_else(|| Error::structural("PBKDF2 parameters", "missing"))?;

        // PBKDF2-params ::= SEQUENCE { salt OCTET STRING, iterationCount INTEGER,
        //                              keyLength INTEGER OPTIONAL, prf AlgorithmIdentifier DEFAULT hmacWithSHA1 }
        let (salt, iterations, key_length, prf) = yasna::parse_ber(kdf_params, |r| {
            r.read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u64()?;
                let key_length = r.read_optional(|r| r.read_u64())?;
                let prf = r.read_optional(AlgorithmIdentifier::read)?;
                Ok((salt, iterations, key_length, prf))
            })
        })
        .map_err(|e| Error::structural("PBKDF2 parameters", e))?;

        let prf = match prf {
            None => DigestAlgorithm::Sha1,
            Some(prf) => DigestAlgorithm::from_hmac_oid(&prf.oid)
                .ok_or_else(|| Error::Unsupported(format!("PBKDF2 PRF {}", prf.oid)))?,
        };

        let cipher = AesKeySize::from_oid(&enc.oid)
            .ok_or_else(|| Error::Unsupported(format!("PBES2 encryption scheme {}", enc.oid)))?;
        if let Some(len) = key_length {
            if len != cipher.key_len() as u64 {
                return Err(Error::structural(
                    "PBKDF2 parameters",
                    format!("key length {len} does not match {:?}", cipher),
                ));
            }
        }
        let iv = enc
            .parameters
            .as_deref()
            .ok_or_else(|| Error::structural("PBES2 parameters", "missing IV"))
            .and_then(|p| {
                yasna::parse_ber(p, |r| r.read_bytes())
                    .map_err(|e| Error::structural("PBES2 parameters", e))
            })?;
        if iv.len() != AES_BLOCK {
            return Err(Error::structural(
                "PBES2 parameters",
                format!("IV must be {AES_BLOCK} bytes, got {}", iv.len()),
            ));
        }

        Ok(Self::Pbes2 {
            salt,
            iterations: check_iterations(iterations, max_iterations)?,
            prf,
            cipher,
            iv,
        })
    }
}

/// Validate an iteration count read from attacker-controlled input.
pub(crate) fn check_iterations(requested: u64, limit: u32) -> Result<u32, Error> {
    if requested == 0 {
        return Err(Error::structural("PBE parameters", "iteration count is zero"));
    }
    if requested > u64::from(limit) {
        return Err(Error::IterationLimit { requested, limit });
    }
    Ok(requested as u32)
}

// ── Decrypt / encrypt ────────────────────────────────────────────────

/// Decrypt `ciphertext` as described by `algorithm`.
///
/// Any padding failure is reported as [`Error::Decryption`]; with a wrong
/// password this is the usual outcome.
pub fn decrypt(
    algorithm: &AlgorithmIdentifier,
    ciphertext: &[u8],
    password: &Password,
    max_iterations: u32,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    match Scheme::parse(algorithm, max_iterations)? {
        Scheme::Pkcs12 {
            suite,
            salt,
            iterations,
        } => {
            tracing::debug!(?suite, iterations, "decrypting PKCS#12 PBE content");
            check_ciphertext_len(ciphertext, LEGACY_BLOCK)?;
            let key = kdf::pkcs12_kdf_sha1(Purpose::Key, password.bmp(), &salt, iterations, suite.key_len());
            let iv = kdf::pkcs12_kdf_sha1(Purpose::Iv, password.bmp(), &salt, iterations, suite.iv_len());

            let mut buf = Zeroizing::new(ciphertext.to_vec());
            suite.decrypt_in_place(&key, &iv, &mut buf)?;
            let len = pkcs7_unpad(&buf, LEGACY_BLOCK)?;
            buf.truncate(len);
            Ok(buf)
        }
        Scheme::Pbes2 {
            salt,
            iterations,
            prf,
            cipher,
            iv,
        } => {
            tracing::debug!(?prf, ?cipher, iterations, "decrypting PBES2 content");
            check_ciphertext_len(ciphertext, AES_BLOCK)?;
            let key = pbkdf2_derive(prf, password.utf8(), &salt, iterations, cipher.key_len());

            let mut buf = Zeroizing::new(ciphertext.to_vec());
            match cipher {
                AesKeySize::Aes128 => cbc_decrypt(new_cipher::<aes::Aes128>(&key)?, &iv, &mut buf)?,
                AesKeySize::Aes192 => cbc_decrypt(new_cipher::<aes::Aes192>(&key)?, &iv, &mut buf)?,
                AesKeySize::Aes256 => cbc_decrypt(new_cipher::<aes::Aes256>(&key)?, &iv, &mut buf)?,
            }
            let len = pkcs7_unpad(&buf, AES_BLOCK)?;
            buf.truncate(len);
            Ok(buf)
        }
    }
}

/// Encrypt `plaintext` with a PKCS#12 PBE suite under a fresh random salt.
///
/// Returns the `AlgorithmIdentifier` (with its `pbeParams`) and the ciphertext.
pub fn encrypt(
    suite: PbeAlgorithm,
    plaintext: &[u8],
    password: &Password,
    iterations: u32,
    salt_len: usize,
) -> Result<(AlgorithmIdentifier, Vec<u8>), Error> {
    if iterations == 0 {
        return Err(Error::Encoding("iteration count must be positive".into()));
    }
    let mut salt = vec![0u8; salt_len];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = kdf::pkcs12_kdf_sha1(Purpose::Key, password.bmp(), &salt, iterations, suite.key_len());
    let iv = kdf::pkcs12_kdf_sha1(Purpose::Iv, password.bmp(), &salt, iterations, suite.iv_len());

    let mut buf = pkcs7_pad(plaintext, LEGACY_BLOCK);
    suite.encrypt_in_place(&key, &iv, &mut buf)?;

    let params = PbeParams {
        salt,
        iterations: u64::from(iterations),
    };
    let algorithm = AlgorithmIdentifier::new(suite.oid(), Some(params.to_der()));
    Ok((algorithm, buf.to_vec()))
}

fn pbkdf2_derive(
    prf: DigestAlgorithm,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; key_len]);
    match prf {
        DigestAlgorithm::Sha1 => pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, salt, iterations, &mut key),
        DigestAlgorithm::Sha224 => pbkdf2::pbkdf2_hmac::<sha2::Sha224>(password, salt, iterations, &mut key),
        DigestAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, salt, iterations, &mut key),
        DigestAlgorithm::Sha384 => pbkdf2::pbkdf2_hmac::<sha2::Sha384>(password, salt, iterations, &mut key),
        DigestAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<sha2::Sha512>(password, salt, iterations, &mut key),
    }
    key
}

// ── CBC and padding ──────────────────────────────────────────────────

fn check_ciphertext_len(ciphertext: &[u8], block_size: usize) -> Result<(), Error> {
    if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
        return Err(Error::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {block_size}",
            ciphertext.len()
        )));
    }
    Ok(())
}

fn cbc_decrypt<C>(cipher: C, iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: BlockDecryptMut + BlockCipher,
{
    let dec = cbc::Decryptor::<C>::inner_iv_slice_init(cipher, iv)
        .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
    dec.decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::Decryption("ciphertext is not block aligned".into()))?;
    Ok(())
}

fn cbc_encrypt<C>(cipher: C, iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: BlockEncryptMut + BlockCipher,
{
    let len = buf.len();
    let enc = cbc::Encryptor::<C>::inner_iv_slice_init(cipher, iv)
        .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
    enc.encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::Crypto("plaintext is not block aligned".into()))?;
    Ok(())
}

fn pkcs7_pad(data: &[u8], block_size: usize) -> Zeroizing<Vec<u8>> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Zeroizing::new(Vec::with_capacity(data.len() + pad_len));
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Validate PKCS#7 padding and return the unpadded length.
///
/// Every pad byte must equal the pad length, which must lie in
/// `[1, block_size]`. The scan covers the whole final block regardless of
/// where the first bad byte is.
fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<usize, Error> {
    if data.len() < block_size {
        return Err(Error::Decryption("invalid padding".into()));
    }
    let pad = data[data.len() - 1];
    let pad_len = pad as usize;
    let mut bad = u8::from(pad_len == 0 || pad_len > block_size);
    for i in 0..block_size {
        let byte = data[data.len() - 1 - i];
        let in_pad = u8::from(i < pad_len);
        bad |= in_pad & u8::from(byte != pad);
    }
    if bad != 0 {
        return Err(Error::Decryption(
            "invalid padding (wrong password?)".into(),
        ));
    }
    Ok(data.len() - pad_len)
}
