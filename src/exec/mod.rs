//! Query execution.
//!
//! - [`source`] - the [`DataSource`] boundary
//! - [`sqlite`] - embedded SQLite source
//! - [`session`] - fetch operations with timeout and cancellation
//! - [`row`] - decoded rows and pages

pub mod row;
pub mod session;
pub mod source;
pub mod sqlite;

pub use row::{decode_rows, Cell, Page, Record, Row, Tuple};
pub use session::{ExecOptions, Session};
pub use source::{DataSource, RawRow, SourceError, SourceResult};
pub use sqlite::SqliteSource;
