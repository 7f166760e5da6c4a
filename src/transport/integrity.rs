//! Subresource-integrity verification.
//!
//! Metadata is a whitespace-separated list of `<alg>-<base64 digest>` tokens,
//! optionally followed by `?options`. Only the strongest algorithm present is
//! consulted; the body matches if any token for that algorithm matches.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegrityAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl IntegrityAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn digest(&self, body: &[u8]) -> String {
        match self {
            Self::Sha256 => STANDARD.encode(Sha256::digest(body)),
            Self::Sha384 => STANDARD.encode(Sha384::digest(body)),
            Self::Sha512 => STANDARD.encode(Sha512::digest(body)),
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

fn parse_metadata(metadata: &str) -> Vec<(IntegrityAlgorithm, &str)> {
    metadata
        .split_whitespace()
        .filter_map(|token| {
            let token = token.split('?').next().unwrap_or(token);
            let (alg, digest) = token.split_once('-')?;
            Some((IntegrityAlgorithm::parse(alg)?, digest))
        })
        .collect()
}

/// `true` when `body` satisfies `metadata`. Metadata without any recognised
/// algorithm imposes no constraint.
pub fn verify(metadata: &str, body: &[u8]) -> bool {
    let tokens = parse_metadata(metadata);
    let Some(strongest) = tokens.iter().map(|(alg, _)| *alg).max() else {
        return true;
    };
    let actual = strongest.digest(body);
    tokens
        .iter()
        .filter(|(alg, _)| *alg == strongest)
        .any(|(_, expected)| *expected == actual)
}

/// Integrity metadata string for `body`.
pub fn compute(algorithm: IntegrityAlgorithm, body: &[u8]) -> String {
    format!("{}-{}", algorithm.prefix(), algorithm.digest(body))
}
