//! The shop domain: members in teams, and items with book, album and movie
//! subtypes stored in one table.
//!
//! Used by the tests and as a worked example of a declared metamodel.

use std::sync::LazyLock;

use crate::exec::{SourceResult, SqliteSource};
use crate::model::Metamodel;

/// Metamodel declaration.
pub const SCHEMA_TOML: &str = include_str!("../schema/shop.toml");

/// SQLite DDL for the tables [`SCHEMA_TOML`] maps.
pub const SCHEMA_SQL: &str = include_str!("../schema/shop.sql");

static MODEL: LazyLock<Metamodel> = LazyLock::new(|| {
    Metamodel::from_toml(SCHEMA_TOML).expect("schema/shop.toml is a valid metamodel")
});

/// The shop metamodel.
pub fn model() -> &'static Metamodel {
    &MODEL
}

/// Fresh in-memory database with the shop tables created and empty.
pub fn in_memory_source() -> SourceResult<SqliteSource> {
    let source = SqliteSource::in_memory()?;
    source.execute_batch(SCHEMA_SQL)?;
    Ok(source)
}
