// ABOUTME: Host key fingerprint digests and comparison.
// ABOUTME: The expected fingerprint's length picks MD5 or SHA-1.

use md5::Md5;
use sha1::{Digest, Sha1};
use std::fmt;

/// Length in hex characters of an MD5 fingerprint.
const MD5_HEX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintAlgorithm {
    Md5,
    Sha1,
}

impl FingerprintAlgorithm {
    /// Pick the digest an expected fingerprint was written in.
    ///
    /// Exactly 32 characters means MD5; anything else, including no
    /// expectation at all, means SHA-1.
    pub fn for_expected(expected: Option<&str>) -> Self {
        match expected {
            Some(fp) if fp.chars().count() == MD5_HEX_LEN => FingerprintAlgorithm::Md5,
            _ => FingerprintAlgorithm::Sha1,
        }
    }

    /// Lowercase hex digest of a host key blob (SSH wire encoding).
    pub fn digest_hex(self, key_blob: &[u8]) -> String {
        match self {
            FingerprintAlgorithm::Md5 => hex::encode(Md5::digest(key_blob)),
            FingerprintAlgorithm::Sha1 => hex::encode(Sha1::digest(key_blob)),
        }
    }
}

impl fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintAlgorithm::Md5 => write!(f, "MD5"),
            FingerprintAlgorithm::Sha1 => write!(f, "SHA1"),
        }
    }
}

/// Whether `fp` is written as bare hex digits, the only form compared.
pub fn is_hex(fp: &str) -> bool {
    !fp.is_empty() && fp.chars().all(|c| c.is_ascii_hexdigit())
}

/// Case-insensitive fingerprint comparison.
pub fn matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
