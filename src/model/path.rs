//! Typed handles to entities and attributes bound to a query alias.

use std::fmt;
use std::sync::Arc;

use super::entity::{AttributeDescriptor, EntityDescriptor};
use super::metamodel::Metamodel;
use super::types::ValueType;
use crate::error::{QueryError, QueryResult};
use crate::query::expression::Expression;

/// An entity bound to a query alias.
///
/// Two handles are equal when they name the same entity under the same alias.
#[derive(Clone)]
pub struct EntityPath {
    model: Metamodel,
    descriptor: Arc<EntityDescriptor>,
    alias: String,
}

impl EntityPath {
    pub(crate) fn new(model: Metamodel, descriptor: Arc<EntityDescriptor>, alias: &str) -> Self {
        Self {
            model,
            descriptor,
            alias: alias.to_string(),
        }
    }

    /// The same entity under another alias, for self-joins and subqueries.
    pub fn alias(&self, alias: &str) -> EntityPath {
        EntityPath::new(self.model.clone(), self.descriptor.clone(), alias)
    }

    pub fn alias_name(&self) -> &str {
        &self.alias
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn model(&self) -> &Metamodel {
        &self.model
    }

    /// Resolve a dot-path such as `username` or `team.name`.
    ///
    /// Every segment but the last must be a relation; each one becomes an
    /// implicit inner join when the path is used in a query.
    pub fn path(&self, dotted: &str) -> QueryResult<AttrPath> {
        let segments: Vec<&str> = dotted.split('.').collect();
        let (last, relations) = segments
            .split_last()
            .ok_or_else(|| QueryError::InvalidState("empty attribute path".into()))?;

        let mut owner = self.descriptor.clone();
        let mut hops = Vec::with_capacity(relations.len());
        for segment in relations {
            let attribute = lookup(&owner, segment)?;
            let target_name = attribute.relation_target().ok_or_else(|| {
                QueryError::InvalidState(format!(
                    "'{}.{}' is not a relation and cannot be traversed",
                    owner.name, segment
                ))
            })?;
            let target = self
                .model
                .descriptor(target_name)
                .cloned()
                .ok_or_else(|| QueryError::UnknownEntity(target_name.to_string()))?;
            hops.push(Hop {
                attribute: attribute.name.clone(),
                fk_column: attribute.column.clone(),
                target: target.clone(),
            });
            owner = target;
        }

        let attribute = lookup(&owner, last)?.clone();
        Ok(AttrPath {
            root: self.alias.clone(),
            hops,
            owner,
            attribute,
        })
    }

    /// Typed expression over the attribute at `dotted`.
    pub fn attr(&self, dotted: &str) -> QueryResult<Expression> {
        Ok(Expression::path(self.path(dotted)?))
    }

    /// Path to the identity attribute.
    pub fn id(&self) -> QueryResult<AttrPath> {
        let identity = self.descriptor.identity().ok_or_else(|| {
            QueryError::InvalidState(format!("entity '{}' has no identity", self.name()))
        })?;
        self.path(&identity.name)
    }

    /// `count` over the identity, or `COUNT(*)` for entities without one.
    pub fn count(&self) -> QueryResult<Expression> {
        match self.descriptor.identity() {
            Some(_) => Expression::path(self.id()?).count(),
            None => Ok(Expression::count_all()),
        }
    }
}

fn lookup<'a>(owner: &'a EntityDescriptor, name: &str) -> QueryResult<&'a AttributeDescriptor> {
    owner
        .attribute(name)
        .ok_or_else(|| QueryError::UnknownAttribute {
            entity: owner.name.clone(),
            attribute: name.to_string(),
        })
}

impl PartialEq for EntityPath {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && self.descriptor.name == other.descriptor.name
    }
}

impl fmt::Debug for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityPath")
            .field("entity", &self.descriptor.name)
            .field("alias", &self.alias)
            .finish()
    }
}

/// One relation traversed by an attribute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    /// Relation attribute name.
    pub attribute: String,
    /// Foreign key column on the source side.
    pub fk_column: String,
    /// Entity the relation points at.
    pub target: Arc<EntityDescriptor>,
}

/// A typed attribute reachable from an aliased entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrPath {
    root: String,
    hops: Vec<Hop>,
    owner: Arc<EntityDescriptor>,
    attribute: AttributeDescriptor,
}

impl AttrPath {
    /// Alias of the entity the path starts from.
    pub fn root_alias(&self) -> &str {
        &self.root
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Entity that declares the final attribute.
    pub fn owner(&self) -> &Arc<EntityDescriptor> {
        &self.owner
    }

    pub fn attribute(&self) -> &AttributeDescriptor {
        &self.attribute
    }

    pub fn column(&self) -> &str {
        &self.attribute.column
    }

    pub fn value_type(&self) -> ValueType {
        self.attribute.value_type()
    }

    pub fn nullable(&self) -> bool {
        self.attribute.nullable
    }

    pub fn is_identity(&self) -> bool {
        self.attribute.identity
    }

    /// Table alias the final column is read from.
    ///
    /// The root alias for a direct attribute, otherwise the alias of the
    /// last implicit join: `member_team` for `member.team.name`.
    pub fn table_alias(&self) -> String {
        implicit_alias(&self.root, self.hops.iter().map(|h| h.attribute.as_str()))
    }

    /// Dotted form rooted at the alias, e.g. `m.team.name`.
    pub fn dotted(&self) -> String {
        let mut out = self.root.clone();
        for hop in &self.hops {
            out.push('.');
            out.push_str(&hop.attribute);
        }
        out.push('.');
        out.push_str(&self.attribute.name);
        out
    }
}

/// Alias for the implicit join reached by following `relations` from `root`.
pub(crate) fn implicit_alias<'a>(root: &str, relations: impl Iterator<Item = &'a str>) -> String {
    let mut alias = root.to_string();
    for rel in relations {
        alias.push('_');
        alias.push_str(rel);
    }
    alias
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}
