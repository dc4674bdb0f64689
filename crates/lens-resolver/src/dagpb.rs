//! dag-pb node and UnixFS payload codec.
//!
//! Wire layout (protobuf):
//!
//! ```text
//! PBNode { Links = 2 (repeated PBLink), Data = 1 (bytes) }
//! PBLink { Hash = 1 (bytes, binary CID), Name = 2 (string), Tsize = 3 (varint) }
//! UnixFS { Type = 1 (enum), Data = 2 (bytes), filesize = 3, blocksizes = 4 (repeated) }
//! ```
//!
//! Encoders emit links before data, matching the canonical dag-pb order.

use lens_types::ContentIdentifier;

use crate::error::CodecError;

const WIRE_VARINT: u8 = 0;
const WIRE_I64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_I32: u8 = 5;

// ---------------------------------------------------------------------------
// Protobuf primitives
// ---------------------------------------------------------------------------

struct PbReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PbReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos).ok_or(CodecError::Truncated(start))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::VarintOverflow(start))
    }

    fn key(&mut self) -> Result<(u64, u8), CodecError> {
        let key = self.varint()?;
        Ok((key >> 3, (key & 0x7) as u8))
    }

    fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let start = self.pos;
        let len = usize::try_from(self.varint()?).map_err(|_| CodecError::Truncated(start))?;
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated(start))?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated(start))?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, field: u64, wire_type: u8) -> Result<(), CodecError> {
        match wire_type {
            WIRE_VARINT => self.varint().map(|_| ()),
            WIRE_LEN => self.bytes().map(|_| ()),
            WIRE_I64 => self.advance(8),
            WIRE_I32 => self.advance(4),
            other => Err(CodecError::WireType {
                field,
                wire_type: other,
            }),
        }
    }

    fn advance(&mut self, n: usize) -> Result<(), CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Truncated(self.pos));
        }
        self.pos += n;
        Ok(())
    }

    fn expect(field: u64, actual: u8, wanted: u8) -> Result<(), CodecError> {
        if actual == wanted {
            Ok(())
        } else {
            Err(CodecError::WireType {
                field,
                wire_type: actual,
            })
        }
    }
}

#[derive(Default)]
struct PbWriter {
    buf: Vec<u8>,
}

impl PbWriter {
    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn key(&mut self, field: u64, wire_type: u8) {
        self.varint((field << 3) | u64::from(wire_type));
    }

    fn varint_field(&mut self, field: u64, value: u64) {
        self.key(field, WIRE_VARINT);
        self.varint(value);
    }

    fn bytes_field(&mut self, field: u64, data: &[u8]) {
        self.key(field, WIRE_LEN);
        self.varint(data.len() as u64);
        self.buf.extend_from_slice(data);
    }
}

// ---------------------------------------------------------------------------
// PBNode
// ---------------------------------------------------------------------------

/// A named, sized link inside a dag-pb node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbLink {
    pub hash: ContentIdentifier,
    pub name: Option<String>,
    /// Cumulative size of the linked subgraph.
    pub tsize: Option<u64>,
}

impl PbLink {
    pub fn new(hash: ContentIdentifier, name: Option<String>, tsize: Option<u64>) -> Self {
        Self { hash, name, tsize }
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PbReader::new(buf);
        let mut hash = None;
        let mut name = None;
        let mut tsize = None;
        while !reader.is_empty() {
            let (field, wire) = reader.key()?;
            match field {
                1 => {
                    PbReader::expect(field, wire, WIRE_LEN)?;
                    let raw = reader.bytes()?;
                    hash = Some(
                        ContentIdentifier::from_bytes(raw)
                            .map_err(|e| CodecError::InvalidLink(e.to_string()))?,
                    );
                }
                2 => {
                    PbReader::expect(field, wire, WIRE_LEN)?;
                    let raw = reader.bytes()?;
                    name = Some(
                        String::from_utf8(raw.to_vec())
                            .map_err(|_| CodecError::InvalidField("link name is not UTF-8".into()))?,
                    );
                }
                3 => {
                    PbReader::expect(field, wire, WIRE_VARINT)?;
                    tsize = Some(reader.varint()?);
                }
                _ => reader.skip(field, wire)?,
            }
        }
        let hash = hash.ok_or_else(|| CodecError::InvalidLink("link has no hash".into()))?;
        Ok(Self { hash, name, tsize })
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = PbWriter::default();
        w.bytes_field(1, &self.hash.to_bytes());
        if let Some(name) = &self.name {
            w.bytes_field(2, name.as_bytes());
        }
        if let Some(tsize) = self.tsize {
            w.varint_field(3, tsize);
        }
        w.buf
    }
}

/// A decoded dag-pb node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PbNode {
    pub links: Vec<PbLink>,
    pub data: Option<Vec<u8>>,
}

impl PbNode {
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PbReader::new(buf);
        let mut node = Self::default();
        while !reader.is_empty() {
            let (field, wire) = reader.key()?;
            match field {
                1 => {
                    PbReader::expect(field, wire, WIRE_LEN)?;
                    node.data = Some(reader.bytes()?.to_vec());
                }
                2 => {
                    PbReader::expect(field, wire, WIRE_LEN)?;
                    node.links.push(PbLink::decode(reader.bytes()?)?);
                }
                other => {
                    return Err(CodecError::InvalidField(format!(
                        "unexpected PBNode field {other}"
                    )))
                }
            }
        }
        Ok(node)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PbWriter::default();
        for link in &self.links {
            w.bytes_field(2, &link.encode());
        }
        if let Some(data) = &self.data {
            w.bytes_field(1, data);
        }
        w.buf
    }

    /// Decode the node's `Data` as UnixFS, if present and well-formed.
    pub fn unixfs(&self) -> Option<UnixFsData> {
        self.data.as_deref().and_then(|d| UnixFsData::decode(d).ok())
    }
}

// ---------------------------------------------------------------------------
// UnixFS
// ---------------------------------------------------------------------------

/// UnixFS node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnixFsType {
    Raw,
    Directory,
    File,
    Metadata,
    Symlink,
    HamtShard,
}

impl UnixFsType {
    fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::Directory),
            2 => Some(Self::File),
            3 => Some(Self::Metadata),
            4 => Some(Self::Symlink),
            5 => Some(Self::HamtShard),
            _ => None,
        }
    }

    fn tag(&self) -> u64 {
        match self {
            Self::Raw => 0,
            Self::Directory => 1,
            Self::File => 2,
            Self::Metadata => 3,
            Self::Symlink => 4,
            Self::HamtShard => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Metadata => "metadata",
            Self::Symlink => "symlink",
            Self::HamtShard => "hamt-shard",
        }
    }

    /// File-like nodes carry byte content in `data` and/or their links.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Raw | Self::File)
    }
}

/// The UnixFS message carried in a dag-pb node's `Data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixFsData {
    pub kind: UnixFsType,
    pub data: Option<Vec<u8>>,
    pub file_size: Option<u64>,
    pub block_sizes: Vec<u64>,
}

impl UnixFsData {
    pub fn file(data: Option<Vec<u8>>, file_size: u64, block_sizes: Vec<u64>) -> Self {
        Self {
            kind: UnixFsType::File,
            data,
            file_size: Some(file_size),
            block_sizes,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: UnixFsType::Directory,
            data: None,
            file_size: None,
            block_sizes: Vec::new(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PbReader::new(buf);
        let mut kind = None;
        let mut data = None;
        let mut file_size = None;
        let mut block_sizes = Vec::new();
        while !reader.is_empty() {
            let (field, wire) = reader.key()?;
            match (field, wire) {
                (1, WIRE_VARINT) => {
                    let tag = reader.varint()?;
                    kind = Some(UnixFsType::from_tag(tag).ok_or_else(|| {
                        CodecError::InvalidField(format!("unknown UnixFS type {tag}"))
                    })?);
                }
                (2, WIRE_LEN) => data = Some(reader.bytes()?.to_vec()),
                (3, WIRE_VARINT) => file_size = Some(reader.varint()?),
                (4, WIRE_VARINT) => block_sizes.push(reader.varint()?),
                (4, WIRE_LEN) => {
                    let mut packed = PbReader::new(reader.bytes()?);
                    while !packed.is_empty() {
                        block_sizes.push(packed.varint()?);
                    }
                }
                (1..=4, other) => return Err(CodecError::WireType { field, wire_type: other }),
                _ => reader.skip(field, wire)?,
            }
        }
        let kind = kind.ok_or_else(|| CodecError::InvalidField("UnixFS type missing".into()))?;
        Ok(Self {
            kind,
            data,
            file_size,
            block_sizes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PbWriter::default();
        w.varint_field(1, self.kind.tag());
        if let Some(data) = &self.data {
            w.bytes_field(2, data);
        }
        if let Some(size) = self.file_size {
            w.varint_field(3, size);
        }
        for size in &self.block_sizes {
            w.varint_field(4, *size);
        }
        w.buf
    }
}
