//! Single-table inheritance: subtypes share the `item` table and are told
//! apart by the `dtype` column.

#[path = "../common/mod.rs"]
mod common;

use common::{entity, session, text};
use quarry::model::Value;
use quarry::query::{select, select_from};

#[tokio::test]
async fn test_root_entity_sees_every_subtype() {
    let session = session();
    let item = entity("item");
    assert_eq!(
        session
            .fetch_count(&select_from(&item).build().unwrap())
            .await
            .unwrap(),
        4
    );
}

#[tokio::test]
async fn test_subtype_query_is_restricted() {
    let session = session();
    let book = entity("book");
    let spec = select([book.attr("name").unwrap()])
        .from(&book)
        .order_by([book.attr("price").unwrap().asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["JPA", "Rust"]);
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 2);
}

#[tokio::test]
async fn test_subtype_record_has_inherited_and_own_fields() {
    let session = session();
    let movie = entity("movie");
    let row = session
        .fetch_one(&select_from(&movie).build().unwrap())
        .await
        .unwrap()
        .unwrap();

    let record = row.record().unwrap();
    assert_eq!(record.entity(), "movie");
    assert_eq!(record.get("name"), Some(&Value::Text("Heat".into())));
    assert_eq!(record.get("price"), Some(&Value::Int(12000)));
    assert_eq!(record.get("director"), Some(&Value::Text("Mann".into())));
    assert!(record.get("author").is_none());
}

#[tokio::test]
async fn test_subtype_filter_combines_with_user_filter() {
    let session = session();
    let album = entity("album");
    let spec = select([album.attr("artist").unwrap()])
        .from(&album)
        .filter(album.attr("price").unwrap().gt(10000).unwrap())
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0]).as_deref(), Some("The Beatles"));
}

#[tokio::test]
async fn test_aggregate_over_subtype() {
    let session = session();
    let book = entity("book");
    let item = entity("item");

    let book_total = select([book.attr("price").unwrap().sum().unwrap()])
        .from(&book)
        .build()
        .unwrap();
    let all_total = select([item.attr("price").unwrap().sum().unwrap()])
        .from(&item)
        .build()
        .unwrap();

    let book_row = session.fetch_one(&book_total).await.unwrap().unwrap();
    let all_row = session.fetch_one(&all_total).await.unwrap().unwrap();
    assert_eq!(book_row.value(), Some(&Value::Int(30000)));
    assert_eq!(all_row.value(), Some(&Value::Int(57000)));
}

#[tokio::test]
async fn test_self_join_of_subtypes_keeps_both_restrictions() {
    let session = session();
    let book = entity("book").alias("b");
    let movie = entity("movie").alias("mv");
    // cheaper book and movie pairs, through the source list
    let spec = select([book.attr("name").unwrap(), movie.attr("name").unwrap()])
        .from(&book)
        .from(&movie)
        .filter(book.attr("price").unwrap().lt(movie.attr("price").unwrap()).unwrap())
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 1);
    let tuple = rows[0].tuple().unwrap();
    assert_eq!(
        tuple.value(&book.attr("name").unwrap()),
        Some(&Value::Text("JPA".into()))
    );
}
