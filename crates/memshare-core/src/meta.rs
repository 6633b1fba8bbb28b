//! Shape metadata and its binary record format
//!
//! A record is 24 bytes laid out like the C struct
//! `{ u32 tag; u32 pad; u64 a; u64 b; }` in native byte order:
//!
//! | tag        | a      | b         |
//! |------------|--------|-----------|
//! | 0 (matrix) | nrow   | ncol      |
//! | 1 (vector) | n      | unused    |
//! | 2 (list)   | n      | total     |
//!
//! A list stores `n + 1` consecutive records: its own header followed by one
//! vector or matrix record per element. The format is only meant to be read
//! by the same build that wrote it.

use crate::page::WORD;
use crate::value::Shape;
use crate::{Error, Result};

/// Size of one metadata record in bytes
pub const RECORD_SIZE: usize = 24;

const TAG_MATRIX: u32 = 0;
const TAG_VECTOR: u32 = 1;
const TAG_LIST: u32 = 2;

/// Logical shape of a shared region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metadata {
    Vector { n: usize },
    /// Column-major
    Matrix { nrow: usize, ncol: usize },
    /// `total` is the number of doubles across all elements
    List { n: usize, total: usize },
}

impl Metadata {
    /// Shape record of an `n` element vector
    pub fn vector(n: usize) -> Self {
        Metadata::Vector { n }
    }

    /// Shape record of a column-major `nrow x ncol` matrix
    pub fn matrix(nrow: usize, ncol: usize) -> Self {
        Metadata::Matrix { nrow, ncol }
    }

    /// Number of elements a container over this shape reports
    pub fn len(&self) -> Result<usize> {
        match *self {
            Metadata::Vector { n } => Ok(n),
            Metadata::Matrix { nrow, ncol } => {
                nrow.checked_mul(ncol).ok_or_else(|| too_large(self))
            }
            Metadata::List { n, .. } => Ok(n),
        }
    }

    /// Whether the record is a list header
    pub fn is_list(&self) -> bool {
        matches!(self, Metadata::List { .. })
    }

    /// Number of doubles in the flattened payload
    pub fn payload_len(&self) -> Result<usize> {
        match *self {
            Metadata::List { total, .. } => Ok(total),
            _ => self.len(),
        }
    }

    /// Exact size of the data region described by this record
    pub fn data_bytes(&self) -> Result<usize> {
        let words = match *self {
            Metadata::List { n, total } => n.checked_add(total),
            _ => Some(self.payload_len()?),
        };
        words
            .and_then(|words| words.checked_mul(WORD))
            .ok_or_else(|| too_large(self))
    }

    /// Size of the metadata region describing this shape
    pub fn meta_bytes(&self) -> Result<usize> {
        match *self {
            Metadata::List { n, .. } => n
                .checked_add(1)
                .and_then(|records| records.checked_mul(RECORD_SIZE))
                .ok_or_else(|| too_large(self)),
            _ => Ok(RECORD_SIZE),
        }
    }

    /// Human readable shape name
    pub fn kind(&self) -> &'static str {
        match self {
            Metadata::Vector { .. } => "vector",
            Metadata::Matrix { .. } => "matrix",
            Metadata::List { .. } => "list",
        }
    }

    /// Encode as a single 24-byte record.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let (tag, a, b) = match *self {
            Metadata::Matrix { nrow, ncol } => (TAG_MATRIX, nrow, ncol),
            Metadata::Vector { n } => (TAG_VECTOR, n, 0),
            Metadata::List { n, total } => (TAG_LIST, n, total),
        };
        let mut record = [0u8; RECORD_SIZE];
        record[0..4].copy_from_slice(&tag.to_ne_bytes());
        record[8..16].copy_from_slice(&(a as u64).to_ne_bytes());
        record[16..24].copy_from_slice(&(b as u64).to_ne_bytes());
        record
    }

    /// Decode the record at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_SIZE {
            return Err(Error::InvalidMetadata(format!(
                "record needs {} bytes, got {}",
                RECORD_SIZE,
                bytes.len()
            )));
        }
        let tag = u32::from_ne_bytes(word(&bytes[0..4]));
        let a = u64::from_ne_bytes(word(&bytes[8..16])) as usize;
        let b = u64::from_ne_bytes(word(&bytes[16..24])) as usize;

        match tag {
            TAG_MATRIX => Ok(Metadata::Matrix { nrow: a, ncol: b }),
            TAG_VECTOR => Ok(Metadata::Vector { n: a }),
            TAG_LIST => Ok(Metadata::List { n: a, total: b }),
            other => Err(Error::InvalidMetadata(format!("unknown shape tag {}", other))),
        }
    }

    /// Decode record `index` of a record array.
    pub fn decode_at(bytes: &[u8], index: usize) -> Result<Self> {
        let outside =
            || Error::InvalidMetadata(format!("record {} lies outside the metadata region", index));
        let start = index.checked_mul(RECORD_SIZE).ok_or_else(outside)?;
        let end = start.checked_add(RECORD_SIZE).ok_or_else(outside)?;
        let record = bytes.get(start..end).ok_or_else(outside)?;
        Self::decode(record)
    }
}

fn too_large(metadata: &Metadata) -> Error {
    Error::InvalidMetadata(format!("{:?} does not fit in the address space", metadata))
}

fn word<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Header plus per-element records of a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMetadata {
    elements: Vec<Metadata>,
    total: usize,
}

impl ListMetadata {
    /// Describe a list of vectors and matrices.
    ///
    /// Offsets inside the data region are not known yet; they are laid out
    /// when the region is filled.
    pub fn build(elements: &[Shape<'_>]) -> Result<Self> {
        let elements = elements
            .iter()
            .enumerate()
            .map(|(i, element)| match element {
                Shape::Vector(values) => Ok(Metadata::vector(values.len())),
                Shape::Matrix { nrow, ncol, data } => {
                    check_matrix(*nrow, *ncol, data.len())?;
                    Ok(Metadata::matrix(*nrow, *ncol))
                }
                Shape::List(_) => Err(Error::UnsupportedType(format!(
                    "list element {} is a list; nested lists are not supported",
                    i
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_elements(elements)
    }

    fn from_elements(elements: Vec<Metadata>) -> Result<Self> {
        let mut total = 0usize;
        for element in &elements {
            total = total.checked_add(element.payload_len()?).ok_or_else(|| {
                Error::InvalidMetadata("list payload does not fit in the address space".to_string())
            })?;
        }
        Ok(Self { elements, total })
    }

    /// The list-level record
    pub fn header(&self) -> Metadata {
        Metadata::List {
            n: self.elements.len(),
            total: self.total,
        }
    }

    /// Per-element records, in list order
    pub fn elements(&self) -> &[Metadata] {
        &self.elements
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Encode the header followed by every element record.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.elements.len() + 1) * RECORD_SIZE);
        bytes.extend_from_slice(&self.header().encode());
        for element in &self.elements {
            bytes.extend_from_slice(&element.encode());
        }
        bytes
    }

    /// Decode and validate a full `n + 1` record array.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (n, total) = match Metadata::decode(bytes)? {
            Metadata::List { n, total } => (n, total),
            other => {
                return Err(Error::InvalidMetadata(format!(
                    "expected a list header, found a {}",
                    other.kind()
                )))
            }
        };

        let elements = (1..=n)
            .map(|i| match Metadata::decode_at(bytes, i)? {
                Metadata::List { .. } => Err(Error::InvalidMetadata(format!(
                    "list element {} is itself a list",
                    i - 1
                ))),
                flat => Ok(flat),
            })
            .collect::<Result<Vec<_>>>()?;

        let list = Self::from_elements(elements)?;
        if list.total != total {
            return Err(Error::InvalidMetadata(format!(
                "list header claims {} doubles, elements hold {}",
                total, list.total
            )));
        }
        Ok(list)
    }
}

pub(crate) fn check_matrix(nrow: usize, ncol: usize, len: usize) -> Result<()> {
    if nrow.checked_mul(ncol) != Some(len) {
        return Err(Error::InvalidShape(format!(
            "{}x{} matrix backed by {} values",
            nrow, ncol, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        // Must match the C layout {u32, pad, u64, u64}
        assert_eq!(Metadata::vector(1).encode().len(), 24);
        assert_eq!(RECORD_SIZE, 3 * WORD);
    }

    #[test]
    fn test_record_layout() {
        let record = Metadata::matrix(3, 2).encode();
        assert_eq!(u32::from_ne_bytes(word(&record[0..4])), TAG_MATRIX);
        assert_eq!(&record[4..8], &[0, 0, 0, 0]);
        assert_eq!(u64::from_ne_bytes(word(&record[8..16])), 3);
        assert_eq!(u64::from_ne_bytes(word(&record[16..24])), 2);

        let record = Metadata::vector(7).encode();
        assert_eq!(u32::from_ne_bytes(word(&record[0..4])), TAG_VECTOR);
        assert_eq!(Metadata::decode(&record).unwrap(), Metadata::Vector { n: 7 });
    }

    #[test]
    fn test_sizes() {
        let m = Metadata::matrix(3, 2);
        assert_eq!(m.len().unwrap(), 6);
        assert_eq!(m.data_bytes().unwrap(), 48);
        assert_eq!(m.meta_bytes().unwrap(), RECORD_SIZE);

        let l = Metadata::List { n: 2, total: 6 };
        assert_eq!(l.len().unwrap(), 2);
        assert_eq!(l.data_bytes().unwrap(), 8 * 8);
        assert_eq!(l.meta_bytes().unwrap(), 3 * RECORD_SIZE);
    }

    #[test]
    fn test_oversized_shapes() {
        let m = Metadata::matrix(usize::MAX, 2);
        assert!(matches!(m.len(), Err(Error::InvalidMetadata(_))));
        assert!(matches!(m.data_bytes(), Err(Error::InvalidMetadata(_))));

        let l = Metadata::List {
            n: usize::MAX / 2,
            total: usize::MAX / 2,
        };
        assert!(matches!(l.data_bytes(), Err(Error::InvalidMetadata(_))));
        assert!(matches!(l.meta_bytes(), Err(Error::InvalidMetadata(_))));

        let v = Metadata::vector(usize::MAX / 4);
        assert!(matches!(v.data_bytes(), Err(Error::InvalidMetadata(_))));
        assert!(Metadata::decode_at(&[], usize::MAX).is_err());
    }

    #[test]
    fn test_unknown_tag() {
        let mut record = Metadata::vector(1).encode();
        record[0..4].copy_from_slice(&9u32.to_ne_bytes());
        assert!(matches!(
            Metadata::decode(&record),
            Err(Error::InvalidMetadata(_))
        ));
        assert!(Metadata::decode(&record[..10]).is_err());
    }

    #[test]
    fn test_list_metadata() {
        let v = [1.0, 2.0];
        let m = [1.0, 2.0, 3.0, 4.0];
        let shapes = [
            Shape::Vector(&v),
            Shape::Matrix {
                nrow: 2,
                ncol: 2,
                data: &m,
            },
        ];
        let list = ListMetadata::build(&shapes).unwrap();
        assert_eq!(list.header(), Metadata::List { n: 2, total: 6 });
        assert_eq!(
            list.elements(),
            &[Metadata::vector(2), Metadata::matrix(2, 2)]
        );

        let bytes = list.encode();
        assert_eq!(bytes.len(), 3 * RECORD_SIZE);
        assert_eq!(ListMetadata::decode(&bytes).unwrap(), list);
        assert_eq!(Metadata::decode_at(&bytes, 2).unwrap(), Metadata::matrix(2, 2));
    }

    #[test]
    fn test_nested_list_rejected() {
        let v = [1.0];
        let shapes = [Shape::Vector(&v), Shape::List(vec![Shape::Vector(&v)])];
        assert!(matches!(
            ListMetadata::build(&shapes),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_decode_rejects_nested_record() {
        let mut bytes = Metadata::List { n: 1, total: 0 }.encode().to_vec();
        bytes.extend_from_slice(&Metadata::List { n: 0, total: 0 }.encode());
        assert!(matches!(
            ListMetadata::decode(&bytes),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_total() {
        let mut bytes = Metadata::List { n: 1, total: 5 }.encode().to_vec();
        bytes.extend_from_slice(&Metadata::vector(2).encode());
        assert!(ListMetadata::decode(&bytes).is_err());
    }

    #[test]
    fn test_bad_matrix_shape() {
        let data = [1.0, 2.0, 3.0];
        let shapes = [Shape::Matrix {
            nrow: 2,
            ncol: 2,
            data: &data,
        }];
        assert!(matches!(
            ListMetadata::build(&shapes),
            Err(Error::InvalidShape(_))
        ));
    }
}
