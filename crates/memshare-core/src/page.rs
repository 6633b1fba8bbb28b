//! Named OS shared memory page

use crate::platform;
use crate::{Error, Result};
use log::debug;
use shared_memory::{Shmem, ShmemConf};

/// Every payload item (double or offset) is one 8-byte word.
pub const WORD: usize = 8;

/// One named shared memory region, held either as owner or as viewer.
///
/// Dropping the page always unmaps it. An owner additionally removes the
/// OS object so the name can be allocated again.
pub struct MemoryPage {
    inner: Shmem,
    name: String,
    byte_size: usize,
}

impl MemoryPage {
    /// Create a new region of `byte_size` bytes and map it read/write.
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken.
    pub fn alloc(name: &str, byte_size: usize) -> Result<Self> {
        platform::check_name(name, platform::MAX_NAME_LEN)?;

        // The OS refuses empty mappings; empty values still get one word.
        let shmem = ShmemConf::new()
            .size(byte_size.max(WORD))
            .os_id(name)
            .create()
            .map_err(|e| platform::create_error(name, e))?;

        debug!("allocated page {} ({} bytes)", name, byte_size);

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            byte_size,
        })
    }

    /// Attach to an existing region, expecting at least `byte_size` bytes.
    ///
    /// Fails with [`Error::NotFound`] if nobody created the region.
    pub fn view(name: &str, byte_size: usize) -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(name)
            .open()
            .map_err(|e| platform::open_error(name, e))?;

        if shmem.len() < byte_size {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                expected: byte_size,
                actual: shmem.len(),
            });
        }

        debug!("attached to page {} ({} bytes)", name, byte_size);

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            byte_size,
        })
    }

    /// OS name of the region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical size in bytes
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Logical size in 8-byte words
    pub fn size(&self) -> usize {
        self.byte_size / WORD
    }

    /// Whether dropping this page removes the OS object
    pub fn is_owner(&self) -> bool {
        self.inner.is_owner()
    }

    /// Raw pointer to the start of the mapping
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// The first `byte_size` bytes of the mapping
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.byte_size) }
    }

    /// Writable bytes; only the owner fills a page.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        if !self.is_owner() {
            return Err(Error::ReadOnly);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.inner.as_ptr(), self.byte_size) })
    }
}

impl Drop for MemoryPage {
    fn drop(&mut self) {
        debug!(
            "unmapping page {}{}",
            self.name,
            if self.is_owner() { " and removing it" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unique_name() -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "{}mp{}_{}",
            platform::SCOPE_PREFIX,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        )
    }

    #[test]
    fn test_alloc_then_view() {
        let name = unique_name();
        let mut owner = MemoryPage::alloc(&name, 32).unwrap();
        assert!(owner.is_owner());
        assert_eq!(owner.size(), 4);
        owner.as_bytes_mut().unwrap()[..4].copy_from_slice(b"page");

        let viewer = MemoryPage::view(&name, 32).unwrap();
        assert!(!viewer.is_owner());
        assert_eq!(&viewer.as_bytes()[..4], b"page");
    }

    #[test]
    fn test_alloc_twice_fails() {
        let name = unique_name();
        let _owner = MemoryPage::alloc(&name, 8).unwrap();
        assert!(matches!(
            MemoryPage::alloc(&name, 8),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_view_missing() {
        let name = unique_name();
        assert!(matches!(MemoryPage::view(&name, 8), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_owner_drop_frees_name() {
        let name = unique_name();
        drop(MemoryPage::alloc(&name, 8).unwrap());
        assert!(matches!(MemoryPage::view(&name, 8), Err(Error::NotFound(_))));
        assert!(MemoryPage::alloc(&name, 8).is_ok());
    }

    #[test]
    fn test_viewer_is_read_only() {
        let name = unique_name();
        let _owner = MemoryPage::alloc(&name, 8).unwrap();
        let mut viewer = MemoryPage::view(&name, 8).unwrap();
        assert!(matches!(viewer.as_bytes_mut(), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_view_larger_than_region() {
        let name = unique_name();
        let _owner = MemoryPage::alloc(&name, 8).unwrap();
        assert!(matches!(
            MemoryPage::view(&name, 1 << 20),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_page() {
        let name = unique_name();
        let owner = MemoryPage::alloc(&name, 0).unwrap();
        assert_eq!(owner.size(), 0);
        assert!(owner.as_bytes().is_empty());
        let viewer = MemoryPage::view(&name, 0).unwrap();
        assert_eq!(viewer.byte_size(), 0);
    }
}
