//! Result projection.
//!
//! A query with one projection yields [`Row::Single`]; a query with several
//! yields [`Row::Tuple`], whose cells are looked up by the projection that
//! produced them. Lookups compare projections structurally, so an
//! expression rebuilt the same way finds the same cell.

use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::source::{RawRow, SourceError, SourceResult};
use crate::model::path::EntityPath;
use crate::model::types::{Value, ValueType};
use crate::query::compile::RowLayout;
use crate::query::expression::Expression;
use crate::query::spec::Projection;

/// One projected value: a scalar or a whole entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Value(Value),
    Record(Record),
}

impl Cell {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(v),
            Cell::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Cell::Record(r) => Some(r),
            Cell::Value(_) => None,
        }
    }
}

/// Attribute values of one entity, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// True when every attribute is `NULL`: the unmatched side of a left join.
    pub fn is_absent(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_null())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_absent() {
            return serializer.serialize_none();
        }
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Cells of a multi-projection row, keyed by projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    layout: Arc<RowLayout>,
    cells: Vec<Cell>,
}

impl Tuple {
    /// Cell produced by `projection`.
    pub fn get(&self, projection: &Projection) -> Option<&Cell> {
        self.layout
            .position(projection)
            .and_then(|i| self.cells.get(i))
    }

    /// Scalar produced by `expr`.
    pub fn value(&self, expr: &Expression) -> Option<&Value> {
        self.get(&Projection::Expr(expr.clone()))
            .and_then(Cell::as_value)
    }

    /// Record produced by `entity`.
    pub fn record(&self, entity: &EntityPath) -> Option<&Record> {
        self.get(&Projection::Entity(entity.clone()))
            .and_then(Cell::as_record)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Tuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (slot, cell) in self.layout.slots().iter().zip(&self.cells) {
            let key = match &slot.projection {
                Projection::Entity(entity) => entity.alias_name().to_string(),
                Projection::Expr(_) => slot
                    .columns
                    .first()
                    .map(|c| c.label.clone())
                    .unwrap_or_default(),
            };
            map.serialize_entry(&key, cell)?;
        }
        map.end()
    }
}

/// A decoded result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Single(Cell),
    Tuple(Tuple),
}

impl Row {
    /// The scalar of a single-projection row.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Row::Single(cell) => cell.as_value(),
            Row::Tuple(_) => None,
        }
    }

    /// The record of a single entity projection.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Row::Single(cell) => cell.as_record(),
            Row::Tuple(_) => None,
        }
    }

    pub fn tuple(&self) -> Option<&Tuple> {
        match self {
            Row::Tuple(t) => Some(t),
            Row::Single(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Decode raw rows according to `layout`, coercing each value to the type
/// its projection declares.
pub fn decode_rows(layout: &Arc<RowLayout>, raw: Vec<RawRow>) -> SourceResult<Vec<Row>> {
    raw.into_iter().map(|r| decode_row(layout, r)).collect()
}

fn decode_row(layout: &Arc<RowLayout>, raw: RawRow) -> SourceResult<Row> {
    if raw.len() != layout.width() {
        return Err(SourceError::Decode {
            index: raw.len().min(layout.width()),
            message: format!("expected {} columns, got {}", layout.width(), raw.len()),
        });
    }

    let mut values = raw.into_iter();
    let mut cells = Vec::with_capacity(layout.slots().len());
    for slot in layout.slots() {
        let cell = match &slot.projection {
            Projection::Expr(_) => {
                let value = values.next().unwrap_or_default();
                Cell::Value(coerce(value, slot.columns.first().and_then(|c| c.ty)))
            }
            Projection::Entity(entity) => {
                let attributes = &entity.descriptor().attributes;
                let fields = attributes
                    .iter()
                    .zip(values.by_ref())
                    .map(|(attr, value)| (attr.name.clone(), value.coerce(attr.value_type())))
                    .collect();
                Cell::Record(Record {
                    entity: entity.name().to_string(),
                    fields,
                })
            }
        };
        cells.push(cell);
    }

    Ok(match cells.len() {
        1 => Row::Single(cells.remove(0)),
        _ => Row::Tuple(Tuple {
            layout: layout.clone(),
            cells,
        }),
    })
}

fn coerce(value: Value, ty: Option<ValueType>) -> Value {
    match ty {
        Some(ty) => value.coerce(ty),
        None => value,
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub offset: u64,
    pub limit: Option<u64>,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.total
    }
}
