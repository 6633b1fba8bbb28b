//! A data page paired with its metadata page

use crate::layout::{reals_mut, ListLayout, ListLayoutMut};
use crate::meta::{check_matrix, ListMetadata, Metadata, RECORD_SIZE};
use crate::page::MemoryPage;
use crate::value::{Shape, Shareable};
use crate::{Error, Result};
use log::{debug, warn};
use std::cell::RefCell;

/// Both pages of one shared variable
pub(crate) struct Pages {
    pub(crate) data: MemoryPage,
    pub(crate) meta: MemoryPage,
}

/// One shared variable: its payload region plus the metadata describing it.
///
/// Either both pages were created here (owner) or both were attached to
/// (viewer). All sizes come from the metadata, never from the caller.
pub struct SharedObject {
    data_name: String,
    meta_name: String,
    metadata: Metadata,
    owner: bool,
    pages: RefCell<Option<Pages>>,
}

impl SharedObject {
    /// Create both regions for `value` and copy its payload in.
    ///
    /// The metadata region is created first. If the data region then fails,
    /// the metadata region is removed again before the error is returned.
    pub fn alloc<V>(data_name: &str, meta_name: &str, value: &V) -> Result<Self>
    where
        V: Shareable + ?Sized,
    {
        let shape = value.shape()?;

        let (metadata, pages) = match &shape {
            Shape::Vector(values) => {
                let metadata = Metadata::vector(values.len());
                let mut pages = create_pages(data_name, meta_name, &metadata.encode(), &metadata)?;
                reals_mut(pages.data.as_bytes_mut()?).copy_from_slice(values);
                (metadata, pages)
            }
            Shape::Matrix { nrow, ncol, data } => {
                check_matrix(*nrow, *ncol, data.len())?;
                let metadata = Metadata::matrix(*nrow, *ncol);
                let mut pages = create_pages(data_name, meta_name, &metadata.encode(), &metadata)?;
                reals_mut(pages.data.as_bytes_mut()?).copy_from_slice(data);
                (metadata, pages)
            }
            Shape::List(elements) => {
                let list = ListMetadata::build(elements)?;
                let metadata = list.header();
                let mut pages = create_pages(data_name, meta_name, &list.encode(), &metadata)?;
                ListLayoutMut::new(pages.data.as_bytes_mut()?, elements.len(), list.total())?
                    .fill(elements.iter().filter_map(Shape::flat))?;
                (metadata, pages)
            }
        };

        debug!("allocated shared {} {}", metadata.kind(), data_name);

        Ok(Self {
            data_name: data_name.to_string(),
            meta_name: meta_name.to_string(),
            metadata,
            owner: true,
            pages: RefCell::new(Some(pages)),
        })
    }

    /// Attach to regions created by another registry or process.
    ///
    /// Fails with [`Error::NotRegistered`] if either region is missing.
    pub fn view(data_name: &str, meta_name: &str) -> Result<Self> {
        let not_registered = |e: Error| match e {
            Error::NotFound(_) => Error::NotRegistered(data_name.to_string()),
            other => other,
        };

        // The header record tells how large the metadata really is.
        let header_page = MemoryPage::view(meta_name, RECORD_SIZE).map_err(not_registered)?;
        let metadata = Metadata::decode(header_page.as_bytes())?;

        let meta = match metadata {
            Metadata::List { .. } => {
                drop(header_page);
                let meta =
                    MemoryPage::view(meta_name, metadata.meta_bytes()?).map_err(not_registered)?;
                ListMetadata::decode(meta.as_bytes())?;
                meta
            }
            _ => header_page,
        };

        let data =
            MemoryPage::view(data_name, metadata.data_bytes()?).map_err(not_registered)?;
        if let Metadata::List { n, total } = metadata {
            ListLayout::new(data.as_bytes(), n, total)?;
        }

        debug!("viewing shared {} {}", metadata.kind(), data_name);

        Ok(Self {
            data_name: data_name.to_string(),
            meta_name: meta_name.to_string(),
            metadata,
            owner: false,
            pages: RefCell::new(Some(Pages { data, meta })),
        })
    }

    /// Release both pages. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.pages.borrow_mut().take().is_some() {
            debug!(
                "disposed {} {} ({})",
                if self.owner { "owned" } else { "viewed" },
                self.data_name,
                self.meta_name
            );
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.pages.borrow().is_none()
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.data_name
    }

    pub fn meta_name(&self) -> &str {
        &self.meta_name
    }

    /// Top-level shape record
    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    /// Start of the data region, `None` once disposed
    pub fn data_ptr(&self) -> Option<*const u8> {
        self.pages.borrow().as_ref().map(|pages| pages.data.as_ptr())
    }

    /// Run `f` against the live pages.
    pub(crate) fn with_pages<R>(&self, f: impl FnOnce(&Pages) -> R) -> Result<R> {
        let pages = self.pages.borrow();
        pages.as_ref().map(f).ok_or(Error::Disposed)
    }
}

fn create_pages(
    data_name: &str,
    meta_name: &str,
    records: &[u8],
    metadata: &Metadata,
) -> Result<Pages> {
    let mut meta = MemoryPage::alloc(meta_name, records.len())?;
    meta.as_bytes_mut()?.copy_from_slice(records);

    let data = MemoryPage::alloc(data_name, metadata.data_bytes()?).map_err(|e| {
        warn!(
            "creating {} failed after {} was created; removing {}: {}",
            data_name, meta_name, meta_name, e
        );
        e
    })?;

    Ok(Pages { data, meta })
}
