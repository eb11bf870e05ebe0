//! Metamodel: entity descriptors, attribute paths and value types.
//!
//! Descriptors are loaded once (see [`Metamodel::from_toml`]) and are
//! read-only afterwards. Queries address them through [`EntityPath`] and
//! [`AttrPath`] handles.

pub mod entity;
pub mod metamodel;
pub mod path;
pub mod types;

pub use entity::{AttributeDescriptor, AttributeKind, Discriminator, EntityDescriptor};
pub use metamodel::{Metamodel, MetamodelError};
pub use path::{AttrPath, EntityPath, Hop};
pub use types::{Value, ValueType};
