//! Entity and attribute descriptors.
//!
//! Descriptors are plain, immutable data produced by the [`Metamodel`]
//! loader. Relation attributes already carry their target's key type, so a
//! descriptor can answer type questions without going back to the registry.
//!
//! [`Metamodel`]: super::metamodel::Metamodel

use super::types::ValueType;

/// Static description of one modeled table (or one subtype stored in a
/// parent's table).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Entity name, unique within a metamodel.
    pub name: String,
    /// Optional schema qualifier for the table.
    pub schema: Option<String>,
    /// Backing table name.
    pub table: String,
    /// Attributes in declaration order, inherited ones first.
    pub attributes: Vec<AttributeDescriptor>,
    /// Discriminator for single-table inheritance, if any.
    pub discriminator: Option<Discriminator>,
    /// Parent entity for subtypes.
    pub parent: Option<String>,
}

impl EntityDescriptor {
    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The identity attribute, if declared.
    pub fn identity(&self) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.identity)
    }

    /// Restriction applied to every scan of this entity, if any.
    ///
    /// Entities at the root of a hierarchy without their own discriminator
    /// value see every row of the table.
    pub fn discriminator_filter(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref().filter(|d| !d.values.is_empty())
    }
}

/// One attribute of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub column: String,
    pub kind: AttributeKind,
    pub nullable: bool,
    pub identity: bool,
}

impl AttributeDescriptor {
    /// Static type of the attribute's column.
    ///
    /// For a relation this is the target's identity type (the foreign key).
    pub fn value_type(&self) -> ValueType {
        match &self.kind {
            AttributeKind::Scalar(ty) => *ty,
            AttributeKind::Relation { key_type, .. } => *key_type,
        }
    }

    /// Target entity name when this attribute is a relation.
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Relation { target, .. } => Some(target),
            AttributeKind::Scalar(_) => None,
        }
    }
}

/// Scalar value or many-to-one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Scalar(ValueType),
    Relation {
        /// Target entity name.
        target: String,
        /// Type of the target's identity.
        key_type: ValueType,
    },
}

/// Single-table inheritance discriminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    /// Column holding the concrete type name.
    pub column: String,
    /// Values that select this entity: its own value and its descendants'.
    /// Empty for a hierarchy root without its own value.
    pub values: Vec<String>,
}
