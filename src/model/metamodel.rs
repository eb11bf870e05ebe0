//! Read-only registry of entity descriptors, loaded from a TOML schema.
//!
//! Example schema:
//! ```toml
//! [[entity]]
//! name = "team"
//!
//! [[entity.attribute]]
//! name = "id"
//! column = "team_id"
//! type = "long"
//! identity = true
//!
//! [[entity]]
//! name = "item"
//! discriminator_column = "dtype"
//!
//! [[entity]]
//! name = "book"
//! extends = "item"
//! discriminator = "Book"
//! ```
//!
//! A subtype (`extends`) shares its parent's table, inherits its attributes
//! and is told apart by the parent's discriminator column.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use super::entity::{AttributeDescriptor, AttributeKind, Discriminator, EntityDescriptor};
use super::path::EntityPath;
use super::types::ValueType;
use crate::error::{QueryError, QueryResult};

/// Error raised while loading or validating a schema.
#[derive(Debug, thiserror::Error)]
pub enum MetamodelError {
    #[error("Schema file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read schema file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Entity '{0}' is declared more than once")]
    DuplicateEntity(String),

    #[error("Attribute '{attribute}' is declared more than once on '{entity}'")]
    DuplicateAttribute { entity: String, attribute: String },

    #[error("Entity '{0}' declares more than one identity attribute")]
    MultipleIdentities(String),

    #[error("Entity '{entity}' extends unknown entity '{parent}'")]
    UnknownParent { entity: String, parent: String },

    #[error("Inheritance cycle through entity '{0}'")]
    InheritanceCycle(String),

    #[error("Relation '{entity}.{attribute}' targets unknown entity '{target}'")]
    UnknownRelationTarget {
        entity: String,
        attribute: String,
        target: String,
    },

    #[error("Unknown type '{ty}' on '{entity}.{attribute}'")]
    UnknownType {
        entity: String,
        attribute: String,
        ty: String,
    },

    #[error("Invalid schema: {0}")]
    Invalid(String),
}

// =============================================================================
// Schema file format
// =============================================================================

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    entity: Vec<EntityDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct EntityDef {
    name: String,
    table: Option<String>,
    schema: Option<String>,
    extends: Option<String>,
    discriminator_column: Option<String>,
    discriminator: Option<String>,
    #[serde(default)]
    attribute: Vec<AttributeDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct AttributeDef {
    name: String,
    column: Option<String>,
    #[serde(rename = "type")]
    ty: Option<String>,
    relation: Option<String>,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    identity: bool,
}

/// An entity after inheritance is applied, before attribute resolution.
struct Flattened {
    def: EntityDef,
    table: String,
    schema: Option<String>,
    discriminator_column: Option<String>,
    attributes: Vec<AttributeDef>,
}

// =============================================================================
// Metamodel
// =============================================================================

/// Immutable registry of entity descriptors.
///
/// Cloning is cheap; clones share the same descriptors.
#[derive(Debug, Clone, Default)]
pub struct Metamodel {
    entities: Arc<BTreeMap<String, Arc<EntityDescriptor>>>,
}

impl Metamodel {
    /// Load a metamodel from a TOML schema file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetamodelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MetamodelError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML schema.
    pub fn from_toml(source: &str) -> Result<Self, MetamodelError> {
        let file: SchemaFile = toml::from_str(source)?;
        let model = build(file.entity)?;
        tracing::debug!(entities = model.entities.len(), "loaded metamodel");
        Ok(model)
    }

    /// Descriptor for `name`, if declared.
    pub fn descriptor(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    /// Query handle for `name`, bound to an alias equal to the entity name.
    pub fn entity(&self, name: &str) -> QueryResult<EntityPath> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))?;
        Ok(EntityPath::new(self.clone(), descriptor.clone(), name))
    }

    /// Declared entity names, sorted.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Whether `entity` is `ancestor` or inherits from it.
    pub fn is_subtype_of(&self, entity: &str, ancestor: &str) -> bool {
        let mut current = Some(entity);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.descriptor(name).and_then(|d| d.parent.as_deref());
        }
        false
    }
}

fn build(defs: Vec<EntityDef>) -> Result<Metamodel, MetamodelError> {
    let mut by_name: HashMap<String, EntityDef> = HashMap::new();
    for def in defs {
        if by_name.contains_key(&def.name) {
            return Err(MetamodelError::DuplicateEntity(def.name));
        }
        by_name.insert(def.name.clone(), def);
    }

    let mut flat: BTreeMap<String, Flattened> = BTreeMap::new();
    let names: Vec<String> = by_name.keys().cloned().collect();
    for name in &names {
        flatten(name, &by_name, &mut flat, &mut HashSet::new())?;
    }

    // Identity types, needed to type foreign keys.
    let mut key_types: HashMap<&str, ValueType> = HashMap::new();
    for (name, entity) in &flat {
        let identities: Vec<&AttributeDef> =
            entity.attributes.iter().filter(|a| a.identity).collect();
        match identities.as_slice() {
            [] => {}
            [id] => {
                let ty = id.ty.as_deref().ok_or_else(|| {
                    MetamodelError::Invalid(format!(
                        "identity '{}.{}' must be a scalar",
                        name, id.name
                    ))
                })?;
                key_types.insert(name.as_str(), scalar_type(name, &id.name, ty)?);
            }
            _ => return Err(MetamodelError::MultipleIdentities(name.clone())),
        }
    }

    let mut entities = BTreeMap::new();
    for (name, entity) in &flat {
        let mut attributes = Vec::with_capacity(entity.attributes.len());
        for def in &entity.attributes {
            let kind = match (&def.ty, &def.relation) {
                (Some(ty), None) => AttributeKind::Scalar(scalar_type(name, &def.name, ty)?),
                (None, Some(target)) => {
                    if !flat.contains_key(target) {
                        return Err(MetamodelError::UnknownRelationTarget {
                            entity: name.clone(),
                            attribute: def.name.clone(),
                            target: target.clone(),
                        });
                    }
                    let key_type = key_types.get(target.as_str()).copied().ok_or_else(|| {
                        MetamodelError::Invalid(format!(
                            "relation '{}.{}' targets '{}', which has no identity",
                            name, def.name, target
                        ))
                    })?;
                    AttributeKind::Relation {
                        target: target.clone(),
                        key_type,
                    }
                }
                _ => {
                    return Err(MetamodelError::Invalid(format!(
                        "attribute '{}.{}' needs exactly one of 'type' or 'relation'",
                        name, def.name
                    )))
                }
            };
            attributes.push(AttributeDescriptor {
                name: def.name.clone(),
                column: def.column.clone().unwrap_or_else(|| def.name.clone()),
                kind,
                nullable: def.nullable,
                identity: def.identity,
            });
        }

        let discriminator = entity.discriminator_column.as_ref().map(|column| Discriminator {
            column: column.clone(),
            values: discriminator_values(name, &flat),
        });

        entities.insert(
            name.clone(),
            Arc::new(EntityDescriptor {
                name: name.clone(),
                schema: entity.schema.clone(),
                table: entity.table.clone(),
                attributes,
                discriminator,
                parent: entity.def.extends.clone(),
            }),
        );
    }

    Ok(Metamodel {
        entities: Arc::new(entities),
    })
}

/// Apply inheritance to `name`, parents first.
fn flatten(
    name: &str,
    defs: &HashMap<String, EntityDef>,
    flat: &mut BTreeMap<String, Flattened>,
    visiting: &mut HashSet<String>,
) -> Result<(), MetamodelError> {
    if flat.contains_key(name) {
        return Ok(());
    }
    if !visiting.insert(name.to_string()) {
        return Err(MetamodelError::InheritanceCycle(name.to_string()));
    }
    let def = &defs[name];

    let mut entity = match &def.extends {
        None => Flattened {
            def: def.clone(),
            table: def.table.clone().unwrap_or_else(|| def.name.clone()),
            schema: def.schema.clone(),
            discriminator_column: def.discriminator_column.clone(),
            attributes: Vec::new(),
        },
        Some(parent) => {
            if !defs.contains_key(parent) {
                return Err(MetamodelError::UnknownParent {
                    entity: name.to_string(),
                    parent: parent.clone(),
                });
            }
            flatten(parent, defs, flat, visiting)?;
            let base = &flat[parent];
            if base.discriminator_column.is_none() {
                return Err(MetamodelError::Invalid(format!(
                    "'{}' extends '{}', which declares no discriminator_column",
                    name, parent
                )));
            }
            if def.discriminator.is_none() {
                return Err(MetamodelError::Invalid(format!(
                    "subtype '{}' needs a discriminator value",
                    name
                )));
            }
            Flattened {
                def: def.clone(),
                table: base.table.clone(),
                schema: base.schema.clone(),
                discriminator_column: base.discriminator_column.clone(),
                attributes: base.attributes.clone(),
            }
        }
    };

    for attr in &def.attribute {
        if entity.attributes.iter().any(|a| a.name == attr.name) {
            return Err(MetamodelError::DuplicateAttribute {
                entity: name.to_string(),
                attribute: attr.name.clone(),
            });
        }
        entity.attributes.push(attr.clone());
    }

    visiting.remove(name);
    flat.insert(name.to_string(), entity);
    Ok(())
}

fn scalar_type(entity: &str, attribute: &str, ty: &str) -> Result<ValueType, MetamodelError> {
    ValueType::parse(ty).ok_or_else(|| MetamodelError::UnknownType {
        entity: entity.to_string(),
        attribute: attribute.to_string(),
        ty: ty.to_string(),
    })
}

/// Discriminator values selecting `name`: its own plus every descendant's.
fn discriminator_values(name: &str, flat: &BTreeMap<String, Flattened>) -> Vec<String> {
    let Some(own) = flat[name].def.discriminator.clone() else {
        return Vec::new();
    };
    let mut values = vec![own];
    for (other, entity) in flat {
        if other == name {
            continue;
        }
        let mut ancestor = entity.def.extends.as_deref();
        while let Some(a) = ancestor {
            if a == name {
                if let Some(v) = &entity.def.discriminator {
                    values.push(v.clone());
                }
                break;
            }
            ancestor = flat.get(a).and_then(|e| e.def.extends.as_deref());
        }
    }
    values
}
