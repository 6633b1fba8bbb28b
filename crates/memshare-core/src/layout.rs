//! Typed access to mapped data regions
//!
//! A vector or matrix region is a plain run of doubles. A list region of `n`
//! elements is an offset table of `n` u64 start indices followed by the
//! payload doubles of every element back to back; entry `i` counts the
//! payload doubles that precede element `i`.

use crate::page::WORD;
use crate::{Error, Result};
use std::ops::Range;

/// Reinterpret a mapped byte region as doubles.
pub(crate) fn reals(bytes: &[u8]) -> &[f64] {
    debug_assert_eq!(bytes.as_ptr().align_offset(WORD), 0);
    unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<f64>(), bytes.len() / WORD) }
}

pub(crate) fn reals_mut(bytes: &mut [u8]) -> &mut [f64] {
    debug_assert_eq!(bytes.as_ptr().align_offset(WORD), 0);
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast::<f64>(), bytes.len() / WORD)
    }
}

fn starts(bytes: &[u8]) -> &[u64] {
    debug_assert_eq!(bytes.as_ptr().align_offset(WORD), 0);
    unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<u64>(), bytes.len() / WORD) }
}

fn starts_mut(bytes: &mut [u8]) -> &mut [u64] {
    debug_assert_eq!(bytes.as_ptr().align_offset(WORD), 0);
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast::<u64>(), bytes.len() / WORD)
    }
}

fn split_checked(len: usize, n: usize, total: usize) -> Result<(usize, usize)> {
    let (table, needed) = n
        .checked_mul(WORD)
        .zip(n.checked_add(total).and_then(|words| words.checked_mul(WORD)))
        .ok_or_else(|| {
            Error::InvalidMetadata(format!(
                "list of {} elements and {} doubles does not fit in the address space",
                n, total
            ))
        })?;
    if len < needed {
        return Err(Error::InvalidMetadata(format!(
            "list of {} elements and {} doubles needs {} bytes, region has {}",
            n, total, needed, len
        )));
    }
    Ok((table, needed))
}

/// Read side of a list region
pub struct ListLayout<'a> {
    starts: &'a [u64],
    payload: &'a [f64],
}

impl<'a> ListLayout<'a> {
    /// View `bytes` as a list of `n` elements holding `total` doubles.
    pub fn new(bytes: &'a [u8], n: usize, total: usize) -> Result<Self> {
        let (table, end) = split_checked(bytes.len(), n, total)?;
        Ok(Self {
            starts: starts(&bytes[..table]),
            payload: reals(&bytes[table..end]),
        })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the list has no elements
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Start index of element `i` inside the payload
    pub fn start(&self, i: usize) -> Option<usize> {
        self.starts.get(i).map(|&start| start as usize)
    }

    /// Payload index range of element `i`, given its length.
    pub fn element_range(&self, i: usize, len: usize) -> Result<Range<usize>> {
        let start = self.start(i).ok_or(Error::IndexOutOfRange {
            index: i,
            len: self.len(),
        })?;
        match start.checked_add(len) {
            Some(end) if end <= self.payload.len() => Ok(start..end),
            _ => Err(Error::InvalidMetadata(format!(
                "element {} of {} doubles starts at {}, payload holds {}",
                i,
                len,
                start,
                self.payload.len()
            ))),
        }
    }

    /// Word offset of the payload from the start of the region
    pub fn payload_offset(&self) -> usize {
        self.starts.len()
    }

    /// Every element's doubles back to back
    pub fn payload(&self) -> &'a [f64] {
        self.payload
    }
}

/// Write side of a list region, used once by the owner
pub struct ListLayoutMut<'a> {
    starts: &'a mut [u64],
    payload: &'a mut [f64],
}

impl<'a> ListLayoutMut<'a> {
    /// Writable view of `bytes` as a list of `n` elements holding `total` doubles.
    pub fn new(bytes: &'a mut [u8], n: usize, total: usize) -> Result<Self> {
        let (table, end) = split_checked(bytes.len(), n, total)?;
        let (head, tail) = bytes[..end].split_at_mut(table);
        Ok(Self {
            starts: starts_mut(head),
            payload: reals_mut(tail),
        })
    }

    /// Write the offset table and copy each element's payload in order.
    pub fn fill<'e, I>(&mut self, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = &'e [f64]>,
    {
        let n = self.starts.len();
        let mut cursor = 0usize;
        let mut count = 0usize;
        for (i, values) in elements.into_iter().enumerate() {
            let slot = self
                .starts
                .get_mut(i)
                .ok_or(Error::IndexOutOfRange { index: i, len: n })?;
            *slot = cursor as u64;

            let end = cursor + values.len();
            let dest = self.payload.get_mut(cursor..end).ok_or_else(|| {
                Error::InvalidShape(format!("element {} overruns the list payload", i))
            })?;
            dest.copy_from_slice(values);
            cursor = end;
            count += 1;
        }

        if count != n || cursor != self.payload.len() {
            return Err(Error::InvalidShape(format!(
                "filled {} elements and {} doubles into a list laid out for {} and {}",
                count,
                cursor,
                n,
                self.payload.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // u64 storage keeps the test buffer word aligned.
    fn buffer(words: usize) -> Vec<u64> {
        vec![0u64; words]
    }

    fn as_bytes_mut(words: &mut [u64]) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), words.len() * WORD) }
    }

    #[test]
    fn test_fill_and_read() {
        let mut words = buffer(2 + 6);
        let bytes = as_bytes_mut(&mut words);
        let a = [1.0, 2.0];
        let b = [3.0, 4.0, 5.0, 6.0];

        ListLayoutMut::new(bytes, 2, 6)
            .unwrap()
            .fill([&a[..], &b[..]])
            .unwrap();

        let layout = ListLayout::new(bytes, 2, 6).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.start(0), Some(0));
        assert_eq!(layout.start(1), Some(2));
        assert_eq!(layout.payload_offset(), 2);
        assert_eq!(layout.element_range(1, 4).unwrap(), 2..6);
        assert_eq!(&layout.payload()[2..6], &b);
    }

    #[test]
    fn test_offset_table_is_raw_u64() {
        let mut words = buffer(3 + 3);
        let bytes = as_bytes_mut(&mut words);
        let parts: [&[f64]; 3] = [&[1.0], &[], &[2.0, 3.0]];
        ListLayoutMut::new(bytes, 3, 3).unwrap().fill(parts).unwrap();
        assert_eq!(&words[..3], &[0, 1, 1]);
        assert_eq!(f64::from_bits(words[5]), 3.0);
    }

    #[test]
    fn test_region_too_small() {
        let mut words = buffer(3);
        let bytes = as_bytes_mut(&mut words);
        assert!(ListLayout::new(bytes, 2, 4).is_err());
    }

    #[test]
    fn test_fill_mismatch() {
        let mut words = buffer(4);
        let bytes = as_bytes_mut(&mut words);
        let parts: [&[f64]; 1] = [&[1.0, 2.0]];
        assert!(ListLayoutMut::new(bytes, 2, 2).unwrap().fill(parts).is_err());
    }

    #[test]
    fn test_oversized_counts() {
        let mut words = buffer(2);
        let bytes = as_bytes_mut(&mut words);
        assert!(matches!(
            ListLayout::new(bytes, usize::MAX / 2, usize::MAX / 2),
            Err(Error::InvalidMetadata(_))
        ));
        assert!(matches!(
            ListLayoutMut::new(bytes, usize::MAX, 0),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_corrupt_offset_entry() {
        let mut words = buffer(1 + 2);
        words[0] = u64::MAX;
        let bytes = as_bytes_mut(&mut words);
        let layout = ListLayout::new(bytes, 1, 2).unwrap();
        assert!(matches!(
            layout.element_range(0, 2),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_element_out_of_range() {
        let mut words = buffer(2);
        let bytes = as_bytes_mut(&mut words);
        let layout = ListLayout::new(bytes, 1, 1).unwrap();
        assert!(matches!(
            layout.element_range(1, 1),
            Err(Error::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(matches!(
            layout.element_range(0, 2),
            Err(Error::InvalidMetadata(_))
        ));
    }
}
