//! Content digests and streamed file hashing
//!
//! Manifests publish one hash per item as a hex string. Local files are hashed
//! with a fixed algorithm (SHA-1 by default, MD5 as an alternative) and compared
//! on the lowercase hex representation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::constants::files::HASH_CHUNK_SIZE;
use crate::errors::{HashError, HashResult};

/// Digest algorithm used for local content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1, the algorithm the catalog publisher uses
    #[default]
    Sha1,
    /// MD5
    Md5,
}

impl HashAlgorithm {
    /// Length of the hex representation
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Md5 => 32,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(HashAlgorithm::Sha1),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(format!("unsupported hash algorithm: {}", other)),
        }
    }
}

/// Hash string as published in a manifest
///
/// Treated as opaque: it is trimmed and lowercased but never validated as hex,
/// so a manifest written with a different algorithm simply never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestHash(String);

impl ManifestHash {
    /// Normalize a manifest hash
    pub fn new(raw: &str) -> Self {
        ManifestHash(raw.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ManifestHash {
    fn from(raw: &str) -> Self {
        ManifestHash::new(raw)
    }
}

/// Fixed-length digest of local content
///
/// Stored as raw bytes; displayed and serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentDigest {
    Sha1([u8; 20]),
    Md5([u8; 16]),
}

impl ContentDigest {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ContentDigest::Sha1(bytes) => bytes,
            ContentDigest::Md5(bytes) => bytes,
        }
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        let bytes = self.as_bytes();
        bytes
            .iter()
            .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
                let _ = write!(&mut acc, "{:02x}", b);
                acc
            })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            ContentDigest::Sha1(_) => HashAlgorithm::Sha1,
            ContentDigest::Md5(_) => HashAlgorithm::Md5,
        }
    }

    /// Compare against a manifest hash (case-insensitive)
    pub fn matches(&self, expected: &ManifestHash) -> bool {
        self.to_hex() == expected.as_str()
    }

    /// Digest an in-memory buffer
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = StreamHasher::new(algorithm);
        hasher.update(data);
        hasher.finish()
    }

    /// Parse a hex digest; the algorithm is inferred from the length
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let bytes: Vec<u8> = (0..hex.len())
            .step_by(2)
            .map(|i| hex.get(i..i + 2).and_then(|p| u8::from_str_radix(p, 16).ok()))
            .collect::<Option<Vec<u8>>>()?;

        match bytes.len() {
            20 if hex.len() == 40 => {
                let mut out = [0u8; 20];
                out.copy_from_slice(&bytes);
                Some(ContentDigest::Sha1(out))
            }
            16 if hex.len() == 32 => {
                let mut out = [0u8; 16];
                out.copy_from_slice(&bytes);
                Some(ContentDigest::Md5(out))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid digest: {}", hex_string)))
    }
}

/// Incremental hasher over either algorithm
enum StreamHasher {
    Sha1(Sha1),
    Md5(md5::Context),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => StreamHasher::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => StreamHasher::Md5(md5::Context::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha1(h) => h.update(data),
            StreamHasher::Md5(ctx) => ctx.consume(data),
        }
    }

    fn finish(self) -> ContentDigest {
        match self {
            StreamHasher::Sha1(h) => {
                let mut out = [0u8; 20];
                out.copy_from_slice(&h.finalize());
                ContentDigest::Sha1(out)
            }
            StreamHasher::Md5(ctx) => ContentDigest::Md5(ctx.compute().0),
        }
    }
}

/// Computes and checks digests of files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct HashVerifier {
    algorithm: HashAlgorithm,
}

impl HashVerifier {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash a file in streamed chunks
    ///
    /// An empty file is valid and yields the digest of zero bytes.
    pub async fn calculate_file_hash(&self, path: &Path) -> HashResult<ContentDigest> {
        let mut file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HashError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => HashError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let mut hasher = StreamHasher::new(self.algorithm);
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| HashError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finish())
    }

    /// Check that a file matches its manifest hash
    pub async fn verify_file_hash(&self, path: &Path, expected: &ManifestHash) -> HashResult<bool> {
        let actual = self.calculate_file_hash(path).await?;
        Ok(actual.matches(expected))
    }
}
