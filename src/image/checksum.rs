use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    Sha256,
    Sha512,
}

impl ChecksumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest for this algorithm.
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumKind::Sha256 => 64,
            ChecksumKind::Sha512 => 128,
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(ChecksumKind::Sha256),
            "sha512" => Ok(ChecksumKind::Sha512),
            other => Err(Error::Configuration(format!(
                "unsupported checksum extension {other:?}"
            ))),
        }
    }
}

/// Couples a hex digest with its algorithm.
#[derive(Debug, Clone, Serialize)]
pub struct ChecksumRecord {
    kind: ChecksumKind,
    value: String,
}

impl ChecksumRecord {
    pub fn new(kind: ChecksumKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Digest comparison is case-insensitive; upstream artifacts mix cases.
    pub fn matches(&self, digest: &str) -> bool {
        self.value.eq_ignore_ascii_case(digest)
    }

    /// Extract the digest from a checksum artifact body.
    ///
    /// The build service serves inline-signed text, so the digest is not on
    /// a fixed line. Take the first whitespace-separated token of the
    /// expected length made entirely of hex digits.
    pub fn from_artifact(kind: ChecksumKind, body: &str) -> Option<Self> {
        body.split_whitespace()
            .find(|token| {
                token.len() == kind.digest_len() && token.chars().all(|c| c.is_ascii_hexdigit())
            })
            .map(|token| Self::new(kind, token.to_ascii_lowercase()))
    }
}
