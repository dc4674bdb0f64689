use std::fmt;
use std::str::FromStr;

use cid::multihash::Multihash;
use cid::Cid;
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::TypeError;

/// Largest digest a [`ContentIdentifier`] can carry.
pub const MAX_DIGEST_LEN: usize = 64;

/// The encoding used to interpret an object's raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    /// Opaque bytes, no links.
    Raw,
    /// Protobuf merkle-dag node (UnixFS files and directories).
    DagPb,
    /// CBOR merkle-dag node.
    DagCbor,
    /// JSON merkle-dag node.
    DagJson,
}

impl Codec {
    /// Multicodec table code.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::DagPb => 0x70,
            Self::DagCbor => 0x71,
            Self::DagJson => 0x0129,
        }
    }

    /// Look up a recognized codec by multicodec code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(Self::Raw),
            0x70 => Some(Self::DagPb),
            0x71 => Some(Self::DagCbor),
            0x0129 => Some(Self::DagJson),
            _ => None,
        }
    }

    /// Multicodec table name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::DagPb => "dag-pb",
            Self::DagCbor => "dag-cbor",
            Self::DagJson => "dag-json",
        }
    }

    /// Returns `true` for codecs whose objects can link to other objects.
    pub const fn is_graph(&self) -> bool {
        !matches!(self, Self::Raw)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Raw, Self::DagPb, Self::DagCbor, Self::DagJson]
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| TypeError::malformed(s, "unrecognized codec name"))
    }
}

/// The hash function that produced an identifier's digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashFunction {
    /// The digest is the content itself.
    Identity,
    Sha2_256,
    Sha2_512,
    Blake3,
}

impl HashFunction {
    /// Multihash table code.
    pub const fn code(&self) -> u64 {
        match self {
            Self::Identity => 0x00,
            Self::Sha2_256 => 0x12,
            Self::Sha2_512 => 0x13,
            Self::Blake3 => 0x1e,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x00 => Some(Self::Identity),
            0x12 => Some(Self::Sha2_256),
            0x13 => Some(Self::Sha2_512),
            0x1e => Some(Self::Blake3),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sha2_256 => "sha2-256",
            Self::Sha2_512 => "sha2-512",
            Self::Blake3 => "blake3",
        }
    }

    /// Fixed digest length, or `None` when the length varies (identity).
    pub const fn digest_len(&self) -> Option<usize> {
        match self {
            Self::Identity => None,
            Self::Sha2_256 | Self::Blake3 => Some(32),
            Self::Sha2_512 => Some(64),
        }
    }

    /// Compute the digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Identity => data.to_vec(),
            Self::Sha2_256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha2_512 => sha2::Sha512::digest(data).to_vec(),
            Self::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }

    /// Check that `data` hashes to `expected`.
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> bool {
        self.digest(data) == expected
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Self-describing, content-addressed reference to an object.
///
/// Equality is defined by digest, hash function and codec. The textual form
/// is canonical: dag-pb objects hashed with sha2-256 render as CIDv0
/// (`Qm...`), everything else as base32 CIDv1 (`b...`). Both spellings of the
/// same dag-pb object parse to equal identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentifier {
    cid: Cid,
    codec: Codec,
    hash_function: HashFunction,
}

impl ContentIdentifier {
    /// Build an identifier from its parts, validating the digest length.
    pub fn from_parts(codec: Codec, hash_function: HashFunction, digest: &[u8]) -> Result<Self, TypeError> {
        let label = || format!("{}:{}:{}", codec, hash_function, hex::encode(digest));
        if let Some(expected) = hash_function.digest_len() {
            if digest.len() != expected {
                return Err(TypeError::malformed(
                    label(),
                    format!(
                        "{hash_function} digest must be {expected} bytes, got {}",
                        digest.len()
                    ),
                ));
            }
        }
        let hash = Multihash::<MAX_DIGEST_LEN>::wrap(hash_function.code(), digest)
            .map_err(|e| TypeError::malformed(label(), e.to_string()))?;
        Self::canonical(codec, hash_function, hash, label)
    }

    /// Identifier for a block of `data` encoded with `codec`.
    pub fn from_content(codec: Codec, hash_function: HashFunction, data: &[u8]) -> Result<Self, TypeError> {
        Self::from_parts(codec, hash_function, &hash_function.digest(data))
    }

    /// Parse the textual form of an identifier.
    ///
    /// The text must be exactly the identifier; surrounding whitespace is
    /// rejected rather than stripped.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        if text.is_empty() {
            return Err(TypeError::malformed(text, "empty identifier"));
        }
        if text.trim() != text {
            return Err(TypeError::malformed(text, "surrounding whitespace"));
        }
        let cid = Cid::try_from(text).map_err(|e| TypeError::malformed(text, e.to_string()))?;
        Self::from_cid(cid, text)
    }

    /// Decode the binary form of an identifier (as embedded in dag-pb links).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let cid = Cid::try_from(bytes)
            .map_err(|e| TypeError::malformed(hex::encode(bytes), e.to_string()))?;
        Self::from_cid(cid, &hex::encode(bytes))
    }

    fn from_cid(cid: Cid, input: &str) -> Result<Self, TypeError> {
        let codec = Codec::from_code(cid.codec()).ok_or_else(|| {
            TypeError::malformed(input, format!("unrecognized codec 0x{:x}", cid.codec()))
        })?;
        let hash = *cid.hash();
        let hash_function = HashFunction::from_code(hash.code()).ok_or_else(|| {
            TypeError::malformed(input, format!("unrecognized hash function 0x{:x}", hash.code()))
        })?;
        if let Some(expected) = hash_function.digest_len() {
            if hash.digest().len() != expected {
                return Err(TypeError::malformed(
                    input,
                    format!("{hash_function} digest must be {expected} bytes"),
                ));
            }
        }
        Self::canonical(codec, hash_function, hash, || input.to_string())
    }

    fn canonical(
        codec: Codec,
        hash_function: HashFunction,
        hash: Multihash<MAX_DIGEST_LEN>,
        label: impl Fn() -> String,
    ) -> Result<Self, TypeError> {
        let cid = if codec == Codec::DagPb && hash_function == HashFunction::Sha2_256 {
            Cid::new_v0(hash).map_err(|e| TypeError::malformed(label(), e.to_string()))?
        } else {
            Cid::new_v1(codec.code(), hash)
        };
        Ok(Self {
            cid,
            codec,
            hash_function,
        })
    }

    /// The encoding codec.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The hash function used for the digest.
    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        self.cid.hash().digest()
    }

    /// Canonical textual form.
    pub fn to_canonical(&self) -> String {
        self.cid.to_string()
    }

    /// Binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cid.to_bytes()
    }

    /// Short form for log lines (last 8 characters).
    pub fn short(&self) -> String {
        let text = self.to_canonical();
        let start = text.len().saturating_sub(8);
        text[start..].to_string()
    }
}

impl fmt::Debug for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentIdentifier({})", self.to_canonical())
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cid)
    }
}

impl FromStr for ContentIdentifier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentIdentifier {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentIdentifier> for String {
    fn from(id: ContentIdentifier) -> Self {
        id.to_canonical()
    }
}
