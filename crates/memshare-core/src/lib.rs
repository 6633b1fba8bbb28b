//! memshare - zero-copy numeric sharing between processes
//!
//! A producer registers vectors, column-major matrices and flat lists of
//! these in named OS shared memory; consumers view them through lazy
//! containers that read straight from the mapping.

pub mod container;
pub mod error;
pub mod layout;
pub mod meta;
pub mod object;
pub mod page;
pub mod platform;
pub mod registry;
pub mod value;

pub use container::{
    create_list_container, create_matrix_container, create_vector_container, Container, Element,
    LazyContainer, ListContainer, MatrixContainer, VectorContainer,
};
pub use error::{Error, Result};
pub use meta::{ListMetadata, Metadata, RECORD_SIZE};
pub use object::SharedObject;
pub use page::MemoryPage;
pub use registry::{QualifiedName, Registry};
pub use value::{Matrix, Shape, Shareable, Value};
