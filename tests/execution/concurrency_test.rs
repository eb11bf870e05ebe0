//! Finalized specs are shared freely between concurrent callers.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{entity, seeded_source, session, text};
use futures::future::join_all;
use quarry::exec::Session;
use quarry::model::Value;
use quarry::query::{select, QuerySpec};

fn usernames_by_age() -> QuerySpec {
    let m = entity("member");
    select([m.attr("username").unwrap()])
        .from(&m)
        .filter(m.attr("age").unwrap().goe(20).unwrap())
        .order_by([m.attr("age").unwrap().asc()])
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_spec_many_tasks() {
    let session = Arc::new(session());
    let spec = Arc::new(usernames_by_age());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let session = session.clone();
            let spec = spec.clone();
            tokio::spawn(async move { session.fetch_list(&spec).await })
        })
        .collect();

    for handle in handles {
        let rows = handle.await.unwrap().unwrap();
        let names: Vec<_> = rows.iter().filter_map(text).collect();
        assert_eq!(names, vec!["member2", "member3", "member4"]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_connections() {
    let spec = usernames_by_age();
    let sessions: Vec<_> = (0..4).map(|_| Session::new(seeded_source())).collect();

    // one session gets an extra matching member; the others are unaffected
    sessions[0]
        .source()
        .execute_batch("INSERT INTO member (member_id, username, age) VALUES (9, 'late', 99);")
        .unwrap();

    let counts = join_all(sessions.iter().map(|s| s.fetch_count(&spec))).await;
    let counts: Vec<u64> = counts.into_iter().map(Result::unwrap).collect();
    assert_eq!(counts, vec![4, 3, 3, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_operations_in_parallel() {
    let session = session();
    let spec = usernames_by_age();

    let paged_spec = spec.with_page(Some(1), Some(1));
    let (list, count, first, page) = tokio::join!(
        session.fetch_list(&spec),
        session.fetch_count(&spec),
        session.fetch_first(&spec),
        session.fetch_page(&paged_spec),
    );

    assert_eq!(list.unwrap().len(), 3);
    assert_eq!(count.unwrap(), 3);
    assert_eq!(
        first.unwrap().unwrap().value(),
        Some(&Value::Text("member2".into()))
    );
    let page = page.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items[0].value(), Some(&Value::Text("member3".into())));
}

#[test]
fn test_spec_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<QuerySpec>();
    assert_send_sync::<Session<quarry::SqliteSource>>();
}
