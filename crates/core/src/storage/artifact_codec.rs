//! Binary layout of the persisted identity set.
//!
//! All integers little-endian:
//!
//! ```text
//! magic        4 bytes   "RKM1"
//! version      u16
//! created_at   i64       Unix milliseconds
//! dimension    u32       0 for an empty set
//! count        u32       number of entries
//! labels       count x (u32 byte length, UTF-8 bytes)
//! embeddings   count x dimension x f32
//! ```
//!
//! The reader rejects truncated input and trailing bytes alike.
use thiserror::Error;

use crate::recognition::domain::face_embedding::FaceEmbedding;
use crate::recognition::domain::known_identity_set::{KnownIdentitySet, LabeledEmbedding};

pub const MAGIC: &[u8; 4] = b"RKM1";
pub const FORMAT_VERSION: u16 = 1;

// Guards against allocating from a corrupt length field.
const MAX_LABEL_BYTES: usize = 4096;
const MAX_DIMENSION: usize = 65_536;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("not a model artifact (bad magic)")]
    BadMagic,
    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u16),
    #[error("artifact truncated at byte {0}")]
    Truncated(usize),
    #[error("{0} trailing bytes after artifact body")]
    TrailingBytes(usize),
    #[error("label {0} is not valid UTF-8")]
    InvalidLabel(usize),
    #[error("implausible {field} value {value}")]
    Implausible { field: &'static str, value: u64 },
    #[error("inconsistent identity set: {0}")]
    Inconsistent(String),
}

pub fn encode(set: &KnownIdentitySet) -> Vec<u8> {
    let dimension = set.dimension().unwrap_or(0);
    let mut out = Vec::with_capacity(22 + set.embedding_count() * (dimension * 4 + 16));
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&set.created_at().timestamp_millis().to_le_bytes());
    out.extend_from_slice(&(dimension as u32).to_le_bytes());
    out.extend_from_slice(&(set.embedding_count() as u32).to_le_bytes());
    for entry in set.entries() {
        let bytes = entry.label.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    for entry in set.entries() {
        for v in entry.embedding.values() {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<KnownIdentitySet, CodecError> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let created_at_ms = r.i64()?;
    let dimension = r.u32()? as usize;
    let count = r.u32()? as usize;

    if dimension > MAX_DIMENSION {
        return Err(CodecError::Implausible {
            field: "dimension",
            value: dimension as u64,
        });
    }
    if count > 0 && dimension == 0 {
        return Err(CodecError::Inconsistent(format!(
            "{count} entries with zero dimension"
        )));
    }
    // Each entry needs at least a 4-byte label length and its embedding.
    let min_body = count.saturating_mul(4 + dimension * 4);
    if min_body > r.remaining() {
        return Err(CodecError::Truncated(bytes.len()));
    }

    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        let len = r.u32()? as usize;
        if len > MAX_LABEL_BYTES {
            return Err(CodecError::Implausible {
                field: "label length",
                value: len as u64,
            });
        }
        let raw = r.take(len)?;
        let label = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidLabel(i))?;
        labels.push(label.to_string());
    }

    let mut entries = Vec::with_capacity(count);
    for label in labels {
        let mut values = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            values.push(r.f32()?);
        }
        entries.push(LabeledEmbedding::new(FaceEmbedding::new(values), label));
    }

    if r.remaining() > 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }

    KnownIdentitySet::with_created_at_millis(entries, created_at_ms)
        .map_err(|e| CodecError::Inconsistent(e.to_string()))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}
