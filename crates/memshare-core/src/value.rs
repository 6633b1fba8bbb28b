//! Values that can be placed in shared memory
//!
//! A binding layer describes its host values through [`Shareable`], which
//! borrows the value's contiguous doubles as a [`Shape`]. [`Value`] is the
//! owned form used by Rust callers and tests.

use crate::meta::check_matrix;
use crate::{Error, Result};

/// Borrowed view of a value's shape and contiguous payload
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<'a> {
    Vector(&'a [f64]),
    /// `data` is column-major and holds `nrow * ncol` values
    Matrix {
        nrow: usize,
        ncol: usize,
        data: &'a [f64],
    },
    List(Vec<Shape<'a>>),
}

impl<'a> Shape<'a> {
    /// Payload of a vector or matrix, `None` for lists
    pub fn flat(&self) -> Option<&'a [f64]> {
        match *self {
            Shape::Vector(values) => Some(values),
            Shape::Matrix { data, .. } => Some(data),
            Shape::List(_) => None,
        }
    }
}

/// Implemented by anything that can be registered.
pub trait Shareable {
    fn shape(&self) -> Result<Shape<'_>>;
}

impl Shareable for [f64] {
    fn shape(&self) -> Result<Shape<'_>> {
        Ok(Shape::Vector(self))
    }
}

impl Shareable for Vec<f64> {
    fn shape(&self) -> Result<Shape<'_>> {
        Ok(Shape::Vector(self))
    }
}

/// Column-major matrix of doubles
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    nrow: usize,
    ncol: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Wrap column-major `data`; its length must be `nrow * ncol`.
    pub fn new(nrow: usize, ncol: usize, data: Vec<f64>) -> Result<Self> {
        check_matrix(nrow, ncol, data.len())?;
        Ok(Self { nrow, ncol, data })
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl Shareable for Matrix {
    fn shape(&self) -> Result<Shape<'_>> {
        Ok(Shape::Matrix {
            nrow: self.nrow,
            ncol: self.ncol,
            data: &self.data,
        })
    }
}

/// Owned host value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Vector(Vec<f64>),
    Matrix(Matrix),
    List(Vec<Value>),
}

impl Shareable for Value {
    fn shape(&self) -> Result<Shape<'_>> {
        match self {
            Value::Vector(values) => values.shape(),
            Value::Matrix(matrix) => matrix.shape(),
            Value::List(elements) => elements
                .iter()
                .map(Shareable::shape)
                .collect::<Result<Vec<_>>>()
                .map(Shape::List),
        }
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::Vector(values)
    }
}

impl From<Matrix> for Value {
    fn from(matrix: Matrix) -> Self {
        Value::Matrix(matrix)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::List(elements)
    }
}

/// Error for host values with no shared representation
pub fn unsupported(type_name: &str) -> Error {
    Error::UnsupportedType(format!(
        "{} cannot be shared; expected a double vector, a double matrix or a list of these",
        type_name
    ))
}
