//! Lazy, zero-copy containers over shared objects
//!
//! A container never owns the memory it reads. It keeps a weak reference to
//! its [`SharedObject`] and looks values up in the mapped region on every
//! access, so it stays valid exactly as long as the object has not been
//! disposed. Afterwards every accessor reports [`Error::Disposed`].

use crate::layout::{reals, ListLayout};
use crate::meta::Metadata;
use crate::object::SharedObject;
use crate::page::WORD;
use crate::{Error, Result};
use log::debug;
use std::ops::Range;
use std::rc::{Rc, Weak};

/// Capabilities a binding layer maps onto its host object model
pub trait Container {
    /// Vector: n, matrix: nrow * ncol, list: number of elements
    fn length(&self) -> usize;

    /// A double for vectors and matrices, a sub-container for lists.
    fn element_at(&self, index: usize) -> Result<Element>;

    /// Start of the backing payload, `None` once the object is disposed.
    ///
    /// The pointer does not keep the mapping alive.
    fn raw_buffer(&self) -> Option<*const f64>;

    fn metadata(&self) -> Metadata;

    /// Call `visitor` for every index in `range` when `show_data` is set.
    fn inspect(&self, range: Range<usize>, show_data: bool, visitor: &mut dyn FnMut(usize)) {
        debug!(
            "inspecting shared {} container of length {}",
            self.metadata().kind(),
            self.length()
        );
        if show_data {
            range.for_each(|i| visitor(i));
        }
    }
}

/// What [`Container::element_at`] yields
#[derive(Debug, Clone)]
pub enum Element {
    Real(f64),
    Container(LazyContainer),
}

impl Element {
    /// The value, if this element is a double
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Element::Real(value) => Some(*value),
            Element::Container(_) => None,
        }
    }

    /// The nested container, if this element is one
    pub fn into_container(self) -> Option<LazyContainer> {
        match self {
            Element::Real(_) => None,
            Element::Container(container) => Some(container),
        }
    }
}

/// A run of doubles inside a data region
#[derive(Debug, Clone)]
struct Region {
    backing: Weak<SharedObject>,
    ptr: *const f64,
    offset: usize,
    len: usize,
}

impl Region {
    fn new(object: &Rc<SharedObject>, offset: usize, len: usize) -> Result<Self> {
        let ptr = object.with_pages(|pages| {
            if offset.checked_add(len).map_or(true, |end| end > pages.data.size()) {
                return Err(Error::InvalidShape(format!(
                    "{} values at offset {} exceed {} ({} words)",
                    len,
                    offset,
                    object.name(),
                    pages.data.size()
                )));
            }
            Ok(pages.data.as_ptr().wrapping_add(offset * WORD).cast::<f64>())
        })??;

        Ok(Self {
            backing: Rc::downgrade(object),
            ptr,
            offset,
            len,
        })
    }

    fn is_valid(&self) -> bool {
        self.backing
            .upgrade()
            .map_or(false, |object| !object.is_disposed())
    }

    fn with_values<R>(&self, f: impl FnOnce(&[f64]) -> R) -> Result<R> {
        let object = self.backing.upgrade().ok_or(Error::Disposed)?;
        let range = self.offset..self.offset + self.len;
        object
            .with_pages(|pages| reals(pages.data.as_bytes()).get(range).map(f))?
            .ok_or_else(|| Error::InvalidMetadata(format!("{} shrank", object.name())))
    }

    fn get(&self, index: usize) -> Result<f64> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        self.with_values(|values| values[index])
    }

    fn raw(&self) -> Option<*const f64> {
        self.is_valid().then_some(self.ptr)
    }
}

/// Flat vector of doubles
#[derive(Debug, Clone)]
pub struct VectorContainer {
    region: Region,
}

impl VectorContainer {
    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// Whether the backing object is still mapped
    pub fn is_valid(&self) -> bool {
        self.region.is_valid()
    }

    /// Bounds-checked read of value `index`
    pub fn get(&self, index: usize) -> Result<f64> {
        self.region.get(index)
    }

    /// Read a value straight from the mapping.
    ///
    /// # Safety
    ///
    /// The backing object must not be disposed and `index` must be below
    /// [`len`](Self::len).
    pub unsafe fn get_unchecked(&self, index: usize) -> f64 {
        *self.region.ptr.add(index)
    }

    /// Borrow the mapped values for the duration of `f`.
    ///
    /// Disposing the backing object from inside `f` panics.
    pub fn with_values<R>(&self, f: impl FnOnce(&[f64]) -> R) -> Result<R> {
        self.region.with_values(f)
    }
}

impl Container for VectorContainer {
    fn length(&self) -> usize {
        self.len()
    }

    fn element_at(&self, index: usize) -> Result<Element> {
        self.get(index).map(Element::Real)
    }

    fn raw_buffer(&self) -> Option<*const f64> {
        self.region.raw()
    }

    fn metadata(&self) -> Metadata {
        Metadata::vector(self.region.len)
    }
}

/// Column-major matrix of doubles
#[derive(Debug, Clone)]
pub struct MatrixContainer {
    region: Region,
    nrow: usize,
    ncol: usize,
}

impl MatrixContainer {
    /// Number of rows
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    /// Number of columns
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    pub fn is_valid(&self) -> bool {
        self.region.is_valid()
    }

    /// Value at column-major position `index`
    pub fn get(&self, index: usize) -> Result<f64> {
        self.region.get(index)
    }

    /// Value at (`row`, `col`)
    pub fn at(&self, row: usize, col: usize) -> Result<f64> {
        if row >= self.nrow || col >= self.ncol {
            return Err(Error::IndexOutOfRange {
                index: col.saturating_mul(self.nrow).saturating_add(row),
                len: self.len(),
            });
        }
        self.region.get(row + col * self.nrow)
    }

    /// # Safety
    ///
    /// Same contract as [`VectorContainer::get_unchecked`].
    pub unsafe fn get_unchecked(&self, index: usize) -> f64 {
        *self.region.ptr.add(index)
    }

    pub fn with_values<R>(&self, f: impl FnOnce(&[f64]) -> R) -> Result<R> {
        self.region.with_values(f)
    }
}

impl Container for MatrixContainer {
    fn length(&self) -> usize {
        self.len()
    }

    fn element_at(&self, index: usize) -> Result<Element> {
        self.get(index).map(Element::Real)
    }

    fn raw_buffer(&self) -> Option<*const f64> {
        self.region.raw()
    }

    fn metadata(&self) -> Metadata {
        Metadata::matrix(self.nrow, self.ncol)
    }
}

/// List of vectors and matrices, resolved through the offset table
#[derive(Debug, Clone)]
pub struct ListContainer {
    backing: Weak<SharedObject>,
    ptr: *const f64,
    n: usize,
    total: usize,
}

impl ListContainer {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn is_valid(&self) -> bool {
        self.backing
            .upgrade()
            .map_or(false, |object| !object.is_disposed())
    }

    /// Container over element `index`, built on demand.
    pub fn get(&self, index: usize) -> Result<LazyContainer> {
        if index >= self.n {
            return Err(Error::IndexOutOfRange { index, len: self.n });
        }
        let object = self.backing.upgrade().ok_or(Error::Disposed)?;

        let (metadata, offset) = object.with_pages(|pages| -> Result<_> {
            let metadata = Metadata::decode_at(pages.meta.as_bytes(), index + 1)?;
            let layout = ListLayout::new(pages.data.as_bytes(), self.n, self.total)?;
            let range = layout.element_range(index, metadata.payload_len()?)?;
            Ok((metadata, layout.payload_offset() + range.start))
        })??;

        match metadata {
            Metadata::Vector { n } => create_vector_container(&object, offset, n).map(LazyContainer::Vector),
            Metadata::Matrix { nrow, ncol } => {
                create_matrix_container(&object, offset, nrow, ncol).map(LazyContainer::Matrix)
            }
            Metadata::List { .. } => Err(Error::InvalidMetadata(format!(
                "element {} of {} is a nested list",
                index,
                object.name()
            ))),
        }
    }
}

impl Container for ListContainer {
    fn length(&self) -> usize {
        self.n
    }

    fn element_at(&self, index: usize) -> Result<Element> {
        self.get(index).map(Element::Container)
    }

    fn raw_buffer(&self) -> Option<*const f64> {
        self.is_valid().then_some(self.ptr)
    }

    fn metadata(&self) -> Metadata {
        Metadata::List {
            n: self.n,
            total: self.total,
        }
    }
}

/// One of the three container shapes, picked from the metadata tag
#[derive(Debug, Clone)]
pub enum LazyContainer {
    Vector(VectorContainer),
    Matrix(MatrixContainer),
    List(ListContainer),
}

impl LazyContainer {
    /// Container over a whole object, shaped by its metadata.
    pub fn for_object(object: &Rc<SharedObject>) -> Result<Self> {
        match object.metadata() {
            Metadata::Vector { n } => create_vector_container(object, 0, n).map(LazyContainer::Vector),
            Metadata::Matrix { nrow, ncol } => {
                create_matrix_container(object, 0, nrow, ncol).map(LazyContainer::Matrix)
            }
            Metadata::List { .. } => create_list_container(object).map(LazyContainer::List),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            LazyContainer::Vector(c) => c.is_valid(),
            LazyContainer::Matrix(c) => c.is_valid(),
            LazyContainer::List(c) => c.is_valid(),
        }
    }

    fn as_dyn(&self) -> &dyn Container {
        match self {
            LazyContainer::Vector(c) => c,
            LazyContainer::Matrix(c) => c,
            LazyContainer::List(c) => c,
        }
    }
}

impl Container for LazyContainer {
    fn length(&self) -> usize {
        self.as_dyn().length()
    }

    fn element_at(&self, index: usize) -> Result<Element> {
        self.as_dyn().element_at(index)
    }

    fn raw_buffer(&self) -> Option<*const f64> {
        self.as_dyn().raw_buffer()
    }

    fn metadata(&self) -> Metadata {
        self.as_dyn().metadata()
    }

    fn inspect(&self, range: Range<usize>, show_data: bool, visitor: &mut dyn FnMut(usize)) {
        self.as_dyn().inspect(range, show_data, visitor)
    }
}

/// Vector of `n` doubles starting `offset` words into `object`'s data.
pub fn create_vector_container(
    object: &Rc<SharedObject>,
    offset: usize,
    n: usize,
) -> Result<VectorContainer> {
    Ok(VectorContainer {
        region: Region::new(object, offset, n)?,
    })
}

/// Column-major `nrow x ncol` matrix starting `offset` words into the data.
pub fn create_matrix_container(
    object: &Rc<SharedObject>,
    offset: usize,
    nrow: usize,
    ncol: usize,
) -> Result<MatrixContainer> {
    let len = nrow.checked_mul(ncol).ok_or_else(|| {
        Error::InvalidShape(format!("{}x{} matrix is too large", nrow, ncol))
    })?;
    Ok(MatrixContainer {
        region: Region::new(object, offset, len)?,
        nrow,
        ncol,
    })
}

/// List over an object whose metadata is a list.
pub fn create_list_container(object: &Rc<SharedObject>) -> Result<ListContainer> {
    let (n, total) = match object.metadata() {
        Metadata::List { n, total } => (n, total),
        other => {
            return Err(Error::UnsupportedType(format!(
                "{} is a {}, not a list",
                object.name(),
                other.kind()
            )))
        }
    };
    let ptr = object.with_pages(|pages| pages.data.as_ptr().cast::<f64>())?;

    Ok(ListContainer {
        backing: Rc::downgrade(object),
        ptr,
        n,
        total,
    })
}
