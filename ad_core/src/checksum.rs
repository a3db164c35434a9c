//! Digest algorithms selected by the length of the expected hash.

use std::io::Read;

use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Infer the algorithm from a hex digest's length.
    pub fn from_expected(hash: &str) -> Option<Self> {
        match hash.trim().len() {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            96 => Some(Self::Sha384),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Hash everything `reader` yields and return lowercase hex.
    pub fn digest_reader<R: Read>(&self, reader: &mut R) -> std::io::Result<String> {
        match self {
            Self::Md5 => md5_reader(reader),
            Self::Sha1 => digest_with::<Sha1, _>(reader),
            Self::Sha256 => digest_with::<Sha256, _>(reader),
            Self::Sha384 => digest_with::<Sha384, _>(reader),
            Self::Sha512 => digest_with::<Sha512, _>(reader),
        }
    }

    pub fn digest_bytes(&self, bytes: &[u8]) -> String {
        let mut cursor = std::io::Cursor::new(bytes);
        // reading from memory cannot fail
        self.digest_reader(&mut cursor).unwrap_or_default()
    }
}

fn digest_with<D: sha2::Digest, R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn md5_reader<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut context = md5::Context::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Outcome of comparing a file against its expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch { actual: String },
    /// No algorithm has a digest of the expected hash's length; treated as a pass
    Unverifiable,
}

impl Verdict {
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, Verdict::Mismatch { .. })
    }
}

/// Compare the digest of `reader` against `expected` (case-insensitive hex).
pub fn verify_reader<R: Read>(expected: &str, reader: &mut R) -> std::io::Result<Verdict> {
    let Some(algorithm) = HashAlgorithm::from_expected(expected) else {
        return Ok(Verdict::Unverifiable);
    };
    let actual = algorithm.digest_reader(reader)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Verdict::Match)
    } else {
        Ok(Verdict::Mismatch { actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"hello world";

    #[test]
    fn algorithm_is_chosen_by_length() {
        assert_eq!(HashAlgorithm::from_expected(&"0".repeat(32)), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::from_expected(&"0".repeat(40)), Some(HashAlgorithm::Sha1));
        assert_eq!(HashAlgorithm::from_expected(&"0".repeat(64)), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_expected(&"0".repeat(96)), Some(HashAlgorithm::Sha384));
        assert_eq!(HashAlgorithm::from_expected(&"0".repeat(128)), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::from_expected(""), None);
        assert_eq!(HashAlgorithm::from_expected("abc"), None);
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            HashAlgorithm::Md5.digest_bytes(DATA),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            HashAlgorithm::Sha1.digest_bytes(DATA),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest_bytes(DATA),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn verify_accepts_uppercase_expected() {
        let expected = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let verdict = verify_reader(expected, &mut &DATA[..]).unwrap();
        assert_eq!(verdict, Verdict::Match);
    }

    #[test]
    fn verify_reports_actual_digest_on_mismatch() {
        let expected = "0".repeat(64);
        let verdict = verify_reader(&expected, &mut &DATA[..]).unwrap();
        assert_eq!(
            verdict,
            Verdict::Mismatch {
                actual: "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
                    .to_string()
            }
        );
        assert!(!verdict.is_acceptable());
    }

    #[test]
    fn unrecognized_length_is_unverifiable() {
        let verdict = verify_reader("abc123", &mut &DATA[..]).unwrap();
        assert_eq!(verdict, Verdict::Unverifiable);
        assert!(verdict.is_acceptable());
    }
}
