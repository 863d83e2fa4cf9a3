// SPDX-License-Identifier: Apache-2.0

//! Streaming digests over files and byte slices.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt::{Display, Formatter};
use std::io::Read;

#[derive(Debug)]
pub enum DigestError {
    UnsupportedAlgorithm(String),
    Io(std::io::Error),
}

impl Display for DigestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(name) => write!(f, "unsupported digest algorithm {name}"),
            Self::Io(e) => write!(f, "digest read failed: {e}"),
        }
    }
}

impl std::error::Error for DigestError {}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex digest of everything `reader` yields, using the algorithm named by
/// `algorithm` (`sha1`, `sha256`, `sha512`, `md5`; case and dashes ignored).
pub fn hex_digest<R: Read>(algorithm: &str, reader: R) -> Result<String, DigestError> {
    match normalize(algorithm).as_str() {
        "sha1" => stream::<Sha1, R>(reader),
        "sha256" => stream::<Sha256, R>(reader),
        "sha512" => stream::<Sha512, R>(reader),
        "md5" => stream::<Md5, R>(reader),
        _ => Err(DigestError::UnsupportedAlgorithm(algorithm.to_string())),
    }
}

#[must_use]
pub fn is_supported_algorithm(algorithm: &str) -> bool {
    matches!(
        normalize(algorithm).as_str(),
        "sha1" | "sha256" | "sha512" | "md5"
    )
}

fn normalize(algorithm: &str) -> String {
    algorithm.trim().to_ascii_lowercase().replace(['-', '_'], "")
}

fn stream<D: Digest, R: Read>(mut reader: R) -> Result<String, DigestError> {
    let mut hasher = D::new();
    let mut buf = vec![0_u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(DigestError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{hex_digest, is_supported_algorithm, sha256_hex, DigestError};

    #[test]
    fn streaming_sha256_matches_slice_digest() {
        let data = b"date;dep;hosp\n2021-04-08;75;120\n".repeat(5000);
        let streamed = hex_digest("SHA-256", data.as_slice()).expect("digest");
        assert_eq!(streamed, sha256_hex(&data));
    }

    #[test]
    fn known_sha1_and_md5_vectors() {
        assert_eq!(
            hex_digest("sha1", &b"abc"[..]).expect("sha1"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex_digest("md5", &b"abc"[..]).expect("md5"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn unknown_algorithm_is_reported() {
        assert!(!is_supported_algorithm("crc32"));
        assert!(matches!(
            hex_digest("crc32", &b"abc"[..]),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
    }
}
