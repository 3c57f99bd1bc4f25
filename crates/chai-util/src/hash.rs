//! Integrity digests in Subresource Integrity form.
//!
//! Registries publish artifact digests either as SRI strings
//! (`sha512-<base64>`) or as bare hex (PyPI's `sha256`). Both parse into an
//! [`Integrity`], which always renders back as SRI.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithms accepted for artifact verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// The SRI prefix for this algorithm.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    fn from_sri_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// A parsed integrity digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity {
    algorithm: Algorithm,
    digest: Vec<u8>,
}

/// Why an integrity string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityParseError {
    Empty,
    /// Algorithm is recognisable but not verifiable here (e.g. legacy `sha1`).
    Unsupported(String),
    Malformed(String),
}

impl fmt::Display for IntegrityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty integrity string"),
            Self::Unsupported(alg) => write!(f, "unsupported integrity algorithm '{alg}'"),
            Self::Malformed(s) => write!(f, "malformed integrity string '{s}'"),
        }
    }
}

impl std::error::Error for IntegrityParseError {}

impl Integrity {
    /// Build an integrity value from a raw digest.
    #[must_use]
    pub fn from_digest(algorithm: Algorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }

    /// Parse an SRI string or a bare hex digest.
    ///
    /// SRI strings may list several space-separated hashes; the strongest
    /// supported one wins. Hex digests are classified by length.
    ///
    /// # Errors
    /// Returns an error for empty, malformed, or unsupported input.
    pub fn parse(input: &str) -> Result<Self, IntegrityParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IntegrityParseError::Empty);
        }

        if input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::parse_hex(input);
        }

        let mut best: Option<Self> = None;
        let mut unsupported: Option<String> = None;

        for token in input.split_whitespace() {
            // Options after '?' are part of the SRI grammar but carry no digest.
            let token = token.split('?').next().unwrap_or(token);
            let Some((prefix, encoded)) = token.split_once('-') else {
                return Err(IntegrityParseError::Malformed(token.to_string()));
            };

            let Some(algorithm) = Algorithm::from_sri_prefix(prefix) else {
                unsupported.get_or_insert_with(|| prefix.to_string());
                continue;
            };

            let digest = STANDARD
                .decode(encoded)
                .map_err(|_| IntegrityParseError::Malformed(token.to_string()))?;
            if digest.len() != algorithm.digest_len() {
                return Err(IntegrityParseError::Malformed(token.to_string()));
            }

            let stronger = best.as_ref().map_or(true, |current| algorithm > current.algorithm);
            if stronger {
                best = Some(Self { algorithm, digest });
            }
        }

        best.ok_or_else(|| IntegrityParseError::Unsupported(unsupported.unwrap_or_default()))
    }

    fn parse_hex(input: &str) -> Result<Self, IntegrityParseError> {
        let algorithm = match input.len() {
            64 => Algorithm::Sha256,
            96 => Algorithm::Sha384,
            128 => Algorithm::Sha512,
            40 => return Err(IntegrityParseError::Unsupported("sha1".to_string())),
            _ => return Err(IntegrityParseError::Malformed(input.to_string())),
        };
        let digest =
            hex::decode(input).map_err(|_| IntegrityParseError::Malformed(input.to_string()))?;
        Ok(Self { algorithm, digest })
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Render as `<alg>-<base64>`.
    #[must_use]
    pub fn to_sri(&self) -> String {
        format!("{}-{}", self.algorithm.as_str(), STANDARD.encode(&self.digest))
    }

    /// Lower-case hex digest, as PyPI publishes it.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sri())
    }
}

impl FromStr for Integrity {
    type Err = IntegrityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

enum AnyHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl AnyHasher {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => Self::Sha256(Sha256::new()),
            Algorithm::Sha384 => Self::Sha384(Sha384::new()),
            Algorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finish(self) -> Integrity {
        match self {
            Self::Sha256(h) => Integrity::from_digest(Algorithm::Sha256, h.finalize().to_vec()),
            Self::Sha384(h) => Integrity::from_digest(Algorithm::Sha384, h.finalize().to_vec()),
            Self::Sha512(h) => Integrity::from_digest(Algorithm::Sha512, h.finalize().to_vec()),
        }
    }
}

/// Incremental hasher that always computes SHA-512 and, when asked, one
/// additional algorithm so a non-SHA-512 expected digest can be checked in
/// the same pass.
pub struct IntegrityHasher {
    sha512: Sha512,
    extra: Option<AnyHasher>,
}

/// Digests produced by [`IntegrityHasher::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    /// Canonical SHA-512 digest of the stream.
    pub sha512: Integrity,
    /// Digest in the requested extra algorithm, if one was requested.
    pub extra: Option<Integrity>,
}

impl Digests {
    /// The digest computed with `algorithm`, if it was computed.
    #[must_use]
    pub fn get(&self, algorithm: Algorithm) -> Option<&Integrity> {
        if algorithm == Algorithm::Sha512 {
            return Some(&self.sha512);
        }
        self.extra.as_ref().filter(|i| i.algorithm == algorithm)
    }
}

impl IntegrityHasher {
    /// Create a hasher; `also` adds a second algorithm unless it is SHA-512.
    #[must_use]
    pub fn new(also: Option<Algorithm>) -> Self {
        Self {
            sha512: Sha512::new(),
            extra: also
                .filter(|a| *a != Algorithm::Sha512)
                .map(AnyHasher::new),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha512.update(data);
        if let Some(extra) = &mut self.extra {
            extra.update(data);
        }
    }

    #[must_use]
    pub fn finish(self) -> Digests {
        Digests {
            sha512: Integrity::from_digest(Algorithm::Sha512, self.sha512.finalize().to_vec()),
            extra: self.extra.map(AnyHasher::finish),
        }
    }
}

/// SHA-512 SRI digest of a byte slice.
#[must_use]
pub fn sha512_integrity(data: &[u8]) -> Integrity {
    let mut hasher = IntegrityHasher::new(None);
    hasher.update(data);
    hasher.finish().sha512
}

/// Digests of a file, streamed once in fixed-size chunks.
///
/// SHA-512 is always computed; `also` adds one more algorithm as in
/// [`IntegrityHasher::new`].
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn digests_file(path: &Path, also: Option<Algorithm>) -> io::Result<Digests> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = IntegrityHasher::new(also);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish())
}
