//! Ordering, paging and counting.

#[path = "../common/mod.rs"]
mod common;

use common::{entity, int, seeded_source, session, session_with_extras, text, EXTRA_MEMBERS_SQL};
use proptest::prelude::*;
use quarry::exec::{ExecOptions, Session};
use quarry::model::Value;
use quarry::query::{select, QuerySpec};
use quarry::Dialect;

fn ages_from(min_age: i64, offset: Option<u64>, limit: Option<u64>) -> QuerySpec {
    let m = entity("member");
    let mut builder = select([m.attr("age").unwrap()])
        .from(&m)
        .filter(m.attr("age").unwrap().goe(min_age).unwrap())
        .order_by([m.attr("age").unwrap().asc()]);
    if let Some(offset) = offset {
        builder = builder.offset(offset);
    }
    if let Some(limit) = limit {
        builder = builder.limit(limit);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_offset_and_limit() {
    let session = session();
    let rows = session
        .fetch_list(&ages_from(0, Some(1), Some(2)))
        .await
        .unwrap();
    let ages: Vec<i64> = rows.iter().map(int).collect();
    assert_eq!(ages, vec![20, 30]);
}

#[tokio::test]
async fn test_offset_without_limit() {
    let session = session();
    let rows = session.fetch_list(&ages_from(0, Some(3), None)).await.unwrap();
    let ages: Vec<i64> = rows.iter().map(int).collect();
    assert_eq!(ages, vec![40]);
}

#[tokio::test]
async fn test_count_ignores_paging() {
    let session = session();
    let spec = ages_from(20, Some(1), Some(1));
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 3);
    assert_eq!(session.fetch_list(&spec).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetch_page() {
    let session = session();
    let page = session
        .fetch_page(&ages_from(0, Some(2), Some(1)))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.offset, 2);
    assert_eq!(page.limit, Some(1));
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].value(), Some(&Value::Int(30)));
    assert!(page.has_next());

    let last = session
        .fetch_page(&ages_from(0, Some(3), Some(2)))
        .await
        .unwrap();
    assert!(!last.has_next());
}

#[tokio::test]
async fn test_degraded_count_matches_native() {
    let native = session();
    let degraded = Session::new(seeded_source().without_native_count());
    let no_native_option = Session::with_options(
        seeded_source(),
        ExecOptions {
            native_count: false,
            ..ExecOptions::default()
        },
    );

    let m = entity("member");
    let team_name = m.attr("team.name").unwrap();
    let grouped = select([team_name.clone(), m.attr("age").unwrap().sum().unwrap()])
        .from(&m)
        .group_by([team_name])
        .limit(1)
        .build()
        .unwrap();
    let plain = ages_from(15, Some(1), Some(1));

    for spec in [&grouped, &plain] {
        let expected = native.fetch_count(spec).await.unwrap();
        assert_eq!(degraded.fetch_count(spec).await.unwrap(), expected);
        assert_eq!(no_native_option.fetch_count(spec).await.unwrap(), expected);
    }
    assert_eq!(native.fetch_count(&grouped).await.unwrap(), 2);
}

#[tokio::test]
async fn test_paged_query_without_order_is_stable() {
    let session = session();
    let m = entity("member");
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .offset(1)
        .limit(2)
        .build()
        .unwrap();

    let first = session.fetch_list(&spec).await.unwrap();
    let second = session.fetch_list(&spec).await.unwrap();
    assert_eq!(first, second);
    // falls back to identity order
    let names: Vec<_> = first.iter().filter_map(text).collect();
    assert_eq!(names, vec!["member2", "member3"]);
}

async fn usernames_nulls_last(session: &Session<quarry::SqliteSource>) -> Vec<Option<String>> {
    let m = entity("member");
    let username = m.attr("username").unwrap();
    let spec = select([username.clone()])
        .from(&m)
        .order_by([username.asc_nulls_last(), m.attr("id").unwrap().asc()])
        .build()
        .unwrap();
    session
        .fetch_list(&spec)
        .await
        .unwrap()
        .iter()
        .map(text)
        .collect()
}

fn nulls_trail(names: &[Option<String>]) -> bool {
    let first_null = names.iter().position(Option::is_none).unwrap_or(names.len());
    names[first_null..].iter().all(Option::is_none)
}

#[tokio::test]
async fn test_nulls_last_native() {
    let names = usernames_nulls_last(&session_with_extras()).await;
    assert_eq!(names.len(), 6);
    assert_eq!(names.last(), Some(&None));
    assert!(nulls_trail(&names));
}

#[tokio::test]
async fn test_nulls_last_emulated() {
    // MySQL rendering has no NULLS LAST, so the placement is emulated
    let source = seeded_source().with_dialect(Dialect::MySql);
    source.execute_batch(EXTRA_MEMBERS_SQL).unwrap();
    let names = usernames_nulls_last(&Session::new(source)).await;
    assert_eq!(names.len(), 6);
    assert!(nulls_trail(&names));
    assert_eq!(names[0].as_deref(), Some("member1"));
}

#[tokio::test]
async fn test_nulls_first_descending() {
    let session = session_with_extras();
    let m = entity("member");
    let username = m.attr("username").unwrap();
    let spec = select([username.clone()])
        .from(&m)
        .order_by([username.desc().nulls_first()])
        .build()
        .unwrap();
    let names: Vec<_> = session
        .fetch_list(&spec)
        .await
        .unwrap()
        .iter()
        .map(text)
        .collect();
    assert_eq!(names[0], None);
    assert_eq!(names[1].as_deref(), Some("member6"));
}

#[tokio::test]
async fn test_multi_key_ordering() {
    let session = session_with_extras();
    let m = entity("member");
    let spec = select([m.attr("id").unwrap()])
        .from(&m)
        .order_by([m.attr("age").unwrap().desc(), m.attr("id").unwrap().desc()])
        .build()
        .unwrap();
    let ids: Vec<i64> = session.fetch_list(&spec).await.unwrap().iter().map(int).collect();
    assert_eq!(ids, vec![6, 5, 4, 3, 2, 1]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_count_equals_unpaged_list_length(
        min_age in 0i64..50,
        offset in proptest::option::of(0u64..6),
        limit in proptest::option::of(0u64..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let session = session();
            let spec = ages_from(min_age, offset, limit);

            let count = session.fetch_count(&spec).await.unwrap();
            let unpaged = session.fetch_list(&spec.without_paging()).await.unwrap();
            prop_assert_eq!(count, unpaged.len() as u64);

            let page = session.fetch_list(&spec).await.unwrap();
            let skipped = count.saturating_sub(offset.unwrap_or(0));
            let expected = limit.map_or(skipped, |l| l.min(skipped));
            prop_assert_eq!(page.len() as u64, expected);

            let ages: Vec<i64> = page.iter().map(int).collect();
            let mut sorted = ages.clone();
            sorted.sort();
            prop_assert_eq!(ages, sorted);
            Ok(())
        })?;
    }
}
