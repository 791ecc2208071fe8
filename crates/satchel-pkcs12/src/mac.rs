#![forbid(unsafe_code)]

//! Password integrity MAC over the authenticated safe (RFC 7292 §5.1).
//!
//! The HMAC key is derived with the PKCS#12 KDF (purpose 3) using the
//! MAC's own digest, with length equal to that digest's output.

use hmac::{Hmac, Mac};
use satchel_core::Error;

use crate::kdf::{DigestAlgorithm, Password, Purpose};
use crate::model::{AlgorithmIdentifier, MacData};
use crate::pbe::check_iterations;

macro_rules! hmac_dispatch {
    ($alg:expr, $key:expr, |$mac:ident| $body:expr) => {
        match $alg {
            DigestAlgorithm::Sha1 => hmac_dispatch!(@run sha1::Sha1, $key, $mac, $body),
            DigestAlgorithm::Sha224 => hmac_dispatch!(@run sha2::Sha224, $key, $mac, $body),
            DigestAlgorithm::Sha256 => hmac_dispatch!(@run sha2::Sha256, $key, $mac, $body),
            DigestAlgorithm::Sha384 => hmac_dispatch!(@run sha2::Sha384, $key, $mac, $body),
            DigestAlgorithm::Sha512 => hmac_dispatch!(@run sha2::Sha512, $key, $mac, $body),
        }
    };
    (@run $d:ty, $key:expr, $mac:ident, $body:expr) => {{
        #[allow(unused_mut)]
        let mut $mac = <Hmac<$d> as Mac>::new_from_slice($key)
            .map_err(|e| Error::Crypto(format!("HMAC init: {e}")))?;
        $body
    }};
}

/// Outcome of checking a PFX MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacVerdict {
    Valid,
    Invalid,
}

/// Check `mac_data` against the authenticated safe bytes.
///
/// Unsupported digests and iteration counts over `max_iterations` are
/// errors; a digest mismatch is reported as [`MacVerdict::Invalid`].
pub fn verify(
    mac_data: &MacData,
    auth_safe: &[u8],
    password: &Password,
    max_iterations: u32,
) -> Result<MacVerdict, Error> {
    let digest = DigestAlgorithm::from_oid(&mac_data.digest_algorithm.oid).ok_or_else(|| {
        Error::Unsupported(format!(
            "MAC digest algorithm {}",
            mac_data.digest_algorithm.oid
        ))
    })?;
    let iterations = check_iterations(mac_data.iterations, max_iterations)?;

    if mac_data.digest.len() != digest.output_len() {
        tracing::debug!(
            expected = digest.output_len(),
            actual = mac_data.digest.len(),
            "MAC digest has the wrong length"
        );
        return Ok(MacVerdict::Invalid);
    }

    let key = digest.derive(Purpose::Mac, password.bmp(), &mac_data.salt, iterations, digest.output_len());
    let ok = hmac_dispatch!(digest, &key, |mac| {
        mac.update(auth_safe);
        mac.verify_slice(&mac_data.digest).is_ok()
    });

    Ok(if ok { MacVerdict::Valid } else { MacVerdict::Invalid })
}

/// Compute fresh `MacData` for `auth_safe` with the given digest.
pub fn compute(
    digest: DigestAlgorithm,
    auth_safe: &[u8],
    password: &Password,
    salt: Vec<u8>,
    iterations: u32,
) -> Result<MacData, Error> {
    if iterations == 0 {
        return Err(Error::Encoding("MAC iteration count must be positive".into()));
    }
    let key = digest.derive(Purpose::Mac, password.bmp(), &salt, iterations, digest.output_len());
    let tag = hmac_dispatch!(digest, &key, |mac| {
        mac.update(auth_safe);
        mac.finalize().into_bytes().to_vec()
    });

    Ok(MacData {
        // NULL parameters, as OpenSSL writes them
        digest_algorithm: AlgorithmIdentifier::new(digest.oid(), Some(vec![0x05, 0x00])),
        digest: tag,
        salt,
        iterations: u64::from(iterations),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_core::ErrorKind;

    #[test]
    fn test_compute_then_verify() {
        let password = Password::new("changeit");
        for digest in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
        ] {
            let mac = compute(digest, b"auth safe", &password, vec![3; 8], 2048).unwrap();
            assert_eq!(mac.digest.len(), digest.output_len());
            assert_eq!(
                verify(&mac, b"auth safe", &password, 100_000).unwrap(),
                MacVerdict::Valid
            );
        }
    }

    #[test]
    fn test_tampered_content_or_password_invalid() {
        let password = Password::new("changeit");
        let mac = compute(DigestAlgorithm::Sha1, b"auth safe", &password, vec![3; 8], 1).unwrap();
        assert_eq!(
            verify(&mac, b"auth safE", &password, 10).unwrap(),
            MacVerdict::Invalid
        );
        assert_eq!(
            verify(&mac, b"auth safe", &Password::new("changeIt"), 10).unwrap(),
            MacVerdict::Invalid
        );
    }

    #[test]
    fn test_empty_and_absent_passwords_differ() {
        let mac = compute(DigestAlgorithm::Sha1, b"x", &Password::new(""), vec![1; 8], 1).unwrap();
        assert_eq!(verify(&mac, b"x", &Password::new(""), 10).unwrap(), MacVerdict::Valid);
        assert_eq!(verify(&mac, b"x", &Password::absent(), 10).unwrap(), MacVerdict::Invalid);
    }

    #[test]
    fn test_truncated_digest_invalid() {
        let password = Password::new("pw");
        let mut mac = compute(DigestAlgorithm::Sha256, b"x", &password, vec![1; 8], 1).unwrap();
        mac.digest.truncate(20);
        assert_eq!(verify(&mac, b"x", &password, 10).unwrap(), MacVerdict::Invalid);
    }

    #[test]
    fn test_unknown_digest_unsupported() {
        let password = Password::new("pw");
        let mut mac = compute(DigestAlgorithm::Sha1, b"x", &password, vec![1; 8], 1).unwrap();
        mac.digest_algorithm = AlgorithmIdentifier::new(&[1, 2, 840, 113549, 2, 5], None);
        let err = verify(&mac, b"x", &password, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_iteration_limit() {
        let password = Password::new("pw");
        let mut mac = compute(DigestAlgorithm::Sha1, b"x", &password, vec![1; 8], 1).unwrap();
        mac.iterations = 2_000_000;
        assert!(matches!(
            verify(&mac, b"x", &password, 1_000_000),
            Err(Error::IterationLimit { .. })
        ));
    }
}
