//! Shared fixtures for the execution tests.
//!
//! Seed data:
//! - teams: teamA (1), teamB (2)
//! - members: member1..member4, ages 10..40; 1 and 2 in teamA, 3 and 4 in teamB
//! - items: two books, one album, one movie

#![allow(dead_code)]

use quarry::exec::{Row, Session, SqliteSource};
use quarry::model::{EntityPath, Value};
use quarry::shop;

pub const SEED_SQL: &str = r#"
INSERT INTO team (team_id, name) VALUES (1, 'teamA'), (2, 'teamB');

INSERT INTO member (member_id, username, age, team_id) VALUES
    (1, 'member1', 10, 1),
    (2, 'member2', 20, 1),
    (3, 'member3', 30, 2),
    (4, 'member4', 40, 2);

INSERT INTO item (item_id, dtype, name, price, stock_quantity, author, isbn) VALUES
    (1, 'Book', 'JPA', 10000, 10, 'kim', '111'),
    (2, 'Book', 'Rust', 20000, 5, 'lee', NULL);
INSERT INTO item (item_id, dtype, name, price, stock_quantity, artist, etc) VALUES
    (3, 'Album', 'Abbey Road', 15000, 3, 'The Beatles', NULL);
INSERT INTO item (item_id, dtype, name, price, stock_quantity, director, actor) VALUES
    (4, 'Movie', 'Heat', 12000, 7, 'Mann', 'Pacino');
"#;

/// Members without a team, and one without a username.
pub const EXTRA_MEMBERS_SQL: &str = r#"
INSERT INTO member (member_id, username, age, team_id) VALUES
    (5, NULL, 100, NULL),
    (6, 'member6', 100, NULL);
"#;

/// Shop tables with the seed rows.
pub fn seeded_source() -> SqliteSource {
    let source = shop::in_memory_source().unwrap();
    source.execute_batch(SEED_SQL).unwrap();
    source
}

pub fn session() -> Session<SqliteSource> {
    Session::new(seeded_source())
}

/// Session whose database also holds [`EXTRA_MEMBERS_SQL`].
pub fn session_with_extras() -> Session<SqliteSource> {
    let source = seeded_source();
    source.execute_batch(EXTRA_MEMBERS_SQL).unwrap();
    Session::new(source)
}

pub fn entity(name: &str) -> EntityPath {
    shop::model().entity(name).unwrap()
}

/// Scalar of a single-projection row as text, `None` for NULL.
pub fn text(row: &Row) -> Option<String> {
    match row.value() {
        Some(Value::Text(s)) => Some(s.clone()),
        Some(Value::Null) => None,
        other => panic!("expected text, found {:?}", other),
    }
}

pub fn int(row: &Row) -> i64 {
    row.value()
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("expected int, found {:?}", row.value()))
}
