//! SQLite dialect.
//!
//! SQLite differences from ANSI:
//! - No native boolean (stored as 0/1)
//! - Numbered placeholders (`?1`)
//! - OFFSET requires a LIMIT (`LIMIT -1` means unbounded)
//! - NULLS FIRST/LAST since 3.30

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite dialect. The embedded engine used by `SqliteSource`.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_required_limit(limit, offset, "-1")
    }
}
