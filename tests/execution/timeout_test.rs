//! Deadlines and cancellation abort the running statement.

#[path = "../common/mod.rs"]
mod common;

use std::time::{Duration, Instant};

use common::{entity, seeded_source};
use quarry::config::ExecutionSettings;
use quarry::exec::{ExecOptions, Session, SqliteSource};
use quarry::query::{select, select_from, QuerySpec};
use quarry::QueryError;
use tokio_util::sync::CancellationToken;

const BULK_MEMBERS_SQL: &str = r#"
INSERT INTO member (member_id, username, age, team_id)
WITH RECURSIVE n(x) AS (SELECT 100 UNION ALL SELECT x + 1 FROM n WHERE x < 3100)
SELECT x, 'bulk' || x, x % 90, NULL FROM n;
"#;

fn bulk_source() -> SqliteSource {
    let source = seeded_source();
    source.execute_batch(BULK_MEMBERS_SQL).unwrap();
    source
}

/// Three-way cartesian product of ~3000 members.
fn cross_product() -> QuerySpec {
    let (a, b, c) = (
        entity("member").alias("a"),
        entity("member").alias("b"),
        entity("member").alias("c"),
    );
    select_from(&a).from(&b).from(&c).build().unwrap()
}

fn cross_product_never_matching() -> QuerySpec {
    let (a, b, c) = (
        entity("member").alias("a"),
        entity("member").alias("b"),
        entity("member").alias("c"),
    );
    let total = a
        .attr("age")
        .unwrap()
        .add(b.attr("age").unwrap())
        .unwrap()
        .add(c.attr("age").unwrap())
        .unwrap();
    select([a.attr("id").unwrap()])
        .from(&a)
        .from(&b)
        .from(&c)
        .filter(total.lt(0).unwrap())
        .build()
        .unwrap()
}

fn with_timeout(source: SqliteSource, timeout: Duration) -> Session<SqliteSource> {
    Session::with_options(source, ExecOptions::default().with_timeout(timeout))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_count_times_out() {
    let session = with_timeout(bulk_source(), Duration::from_millis(100));
    let started = Instant::now();

    let result = session.fetch_count(&cross_product()).await;

    assert!(matches!(result, Err(QueryError::Timeout(d)) if d == Duration::from_millis(100)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_times_out() {
    let session = with_timeout(bulk_source(), Duration::from_millis(100));
    let result = session.fetch_list(&cross_product_never_matching()).await;
    assert!(matches!(result, Err(QueryError::Timeout(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_leaves_session_usable() {
    let session = with_timeout(bulk_source(), Duration::from_millis(100));
    assert!(session.fetch_count(&cross_product()).await.is_err());
    // the interrupted statement released the connection
    assert!(!session.options().cancel.is_cancelled());

    let m = entity("member");
    let spec = select_from(&m)
        .filter(m.attr("username").unwrap().eq("member1").unwrap())
        .build()
        .unwrap();
    assert!(session.fetch_one(&spec).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_caller_cancellation() {
    let cancel = CancellationToken::new();
    let session = Session::with_options(
        bulk_source(),
        ExecOptions::default().with_cancel(cancel.clone()),
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = session.fetch_count(&cross_product()).await;
    assert!(matches!(result, Err(QueryError::Cancelled)));
}

#[tokio::test]
async fn test_fast_query_within_deadline() {
    let session = with_timeout(seeded_source(), Duration::from_secs(30));
    let m = entity("member");
    assert_eq!(
        session
            .fetch_count(&select_from(&m).build().unwrap())
            .await
            .unwrap(),
        4
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_from_settings() {
    let settings: ExecutionSettings = toml::from_str("timeout_ms = 100").unwrap();
    let session = Session::with_options(bulk_source(), ExecOptions::from(&settings));
    assert!(matches!(
        session.fetch_count(&cross_product()).await,
        Err(QueryError::Timeout(_))
    ));
}
