//! Dense numeric arrays and their storage codec
//!
//! Arrays are stored as zlib-compressed bytes:
//!
//! - Magic (4 bytes): `DSAR`
//! - Format version (u8)
//! - Element type (u8): BOOL / INT64 / FLOAT64
//! - Dimension count (u32 LE)
//! - One u64 LE per dimension
//! - Elements, row-major, little-endian
//!
//! Decoding always yields a dense [`NumericArray`] with the original shape and
//! element type.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::errors::{SchemaError, SchemaResult};

const MAGIC: &[u8; 4] = b"DSAR";
const FORMAT_VERSION: u8 = 1;

/// Element type of a numeric array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    Bool = 0,
    Int64 = 1,
    Float64 = 2,
}

impl ElementType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ElementType::Bool),
            1 => Some(ElementType::Int64),
            2 => Some(ElementType::Float64),
            _ => None,
        }
    }

    /// Encoded width of one element in bytes
    pub fn size(self) -> usize {
        match self {
            ElementType::Bool => 1,
            ElementType::Int64 | ElementType::Float64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::Int64 => "int64",
            ElementType::Float64 => "float64",
        }
    }
}

/// Flat element storage
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Bool(_) => ElementType::Bool,
            ArrayData::Int(_) => ElementType::Int64,
            ArrayData::Float(_) => ElementType::Float64,
        }
    }
}

/// A dense, row-major n-dimensional numeric array
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NumericArray {
    /// Creates an array, checking that the shape covers the data exactly
    pub fn new(shape: Vec<usize>, data: ArrayData) -> SchemaResult<Self> {
        let expected = element_count(&shape).ok_or_else(|| {
            SchemaError::validation(format!("Array shape {:?} overflows the element count", shape))
        })?;
        if expected != data.len() {
            return Err(SchemaError::validation(format!(
                "Array shape {:?} requires {} elements, found {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional float array
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Float(values),
        }
    }

    /// One-dimensional integer array
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Int(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Serializes to the compressed storage encoding
    pub fn to_bytes(&self) -> SchemaResult<Vec<u8>> {
        let mut raw = Vec::with_capacity(16 + self.shape.len() * 8 + self.data.len() * 8);
        raw.extend_from_slice(MAGIC);
        raw.push(FORMAT_VERSION);
        raw.push(self.element_type() as u8);
        raw.extend_from_slice(&(self.shape.len() as u32).to_le_bytes());
        for dim in &self.shape {
            raw.extend_from_slice(&(*dim as u64).to_le_bytes());
        }

        match &self.data {
            ArrayData::Bool(values) => raw.extend(values.iter().map(|b| *b as u8)),
            ArrayData::Int(values) => {
                for v in values {
                    raw.extend_from_slice(&v.to_le_bytes());
                }
            }
            ArrayData::Float(values) => {
                for v in values {
                    raw.extend_from_slice(&v.to_le_bytes());
                }
            }
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| SchemaError::Codec(format!("Failed to compress array: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| SchemaError::Codec(format!("Failed to compress array: {}", e)))
    }

    /// Decodes the compressed storage encoding
    pub fn from_bytes(bytes: &[u8]) -> SchemaResult<Self> {
        let mut raw = Vec::new();
        ZlibDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| SchemaError::Codec(format!("Failed to decompress array: {}", e)))?;

        let mut cursor = ByteCursor::new(&raw);
        if cursor.take(4)? != MAGIC {
            return Err(SchemaError::Codec("Array blob has bad magic".into()));
        }
        let version = cursor.take(1)?[0];
        if version != FORMAT_VERSION {
            return Err(SchemaError::Codec(format!(
                "Unsupported array format version {}",
                version
            )));
        }
        let tag = cursor.take(1)?[0];
        let element_type = ElementType::from_u8(tag)
            .ok_or_else(|| SchemaError::Codec(format!("Unknown array element type {}", tag)))?;

        let ndim = cursor.read_u32()? as usize;
        cursor.ensure(ndim, 8)?;
        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            let dim = usize::try_from(cursor.read_u64()?)
                .map_err(|_| SchemaError::Codec("Array dimension exceeds address space".into()))?;
            shape.push(dim);
        }
        let count = element_count(&shape)
            .ok_or_else(|| SchemaError::Codec(format!("Array shape {:?} overflows the element count", shape)))?;
        cursor.ensure(count, element_type.size())?;

        let data = match element_type {
            ElementType::Bool => ArrayData::Bool(cursor.take(count)?.iter().map(|b| *b != 0).collect()),
            ElementType::Int64 => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(cursor.read_u64()? as i64);
                }
                ArrayData::Int(values)
            }
            ElementType::Float64 => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(f64::from_bits(cursor.read_u64()?));
                }
                ArrayData::Float(values)
            }
        };

        if !cursor.is_exhausted() {
            return Err(SchemaError::Codec("Trailing bytes after array data".into()));
        }

        Self::new(shape, data)
    }
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
}

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> SchemaResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SchemaError::Codec("Array blob truncated".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> SchemaResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> SchemaResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Fails unless `count` items of `size` bytes remain
    fn ensure(&self, count: usize, size: usize) -> SchemaResult<()> {
        let remaining = self.data.len() - self.pos;
        match count.checked_mul(size) {
            Some(needed) if needed <= remaining => Ok(()),
            _ => Err(SchemaError::Codec("Array blob truncated".into())),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}
