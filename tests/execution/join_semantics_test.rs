//! Inner and left join behavior, and the difference between restricting a
//! left join in `on()` and in `filter()`.

#[path = "../common/mod.rs"]
mod common;

use common::{entity, session, session_with_extras};
use quarry::exec::Row;
use quarry::model::{EntityPath, Value};
use quarry::query::{select, Expression, Projection, QuerySpec};

fn member_and_team() -> (EntityPath, EntityPath) {
    (entity("member").alias("m"), entity("team").alias("t"))
}

fn pair(m: &EntityPath, t: &EntityPath) -> [Projection; 2] {
    [Projection::from(m), Projection::from(t)]
}

fn team_names(rows: &[Row], t: &EntityPath) -> Vec<Option<String>> {
    rows.iter()
        .map(|row| {
            let record = row.tuple().unwrap().record(t).unwrap();
            match record.get("name") {
                Some(Value::Text(name)) => Some(name.clone()),
                _ => None,
            }
        })
        .collect()
}

fn order_by_member_id(m: &EntityPath) -> [quarry::query::OrderKey; 1] {
    [m.attr("id").unwrap().asc()]
}

#[tokio::test]
async fn test_inner_join_drops_members_without_team() {
    let session = session_with_extras();
    let (m, t) = member_and_team();
    let spec = select(pair(&m, &t))
        .from(&m)
        .join(m.path("team").unwrap(), &t)
        .order_by(order_by_member_id(&m))
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(team_names(&rows, &t).iter().all(Option::is_some));
}

#[tokio::test]
async fn test_left_join_keeps_every_member() {
    let session = session_with_extras();
    let (m, t) = member_and_team();
    let spec = select(pair(&m, &t))
        .from(&m)
        .left_join(m.path("team").unwrap(), &t)
        .order_by(order_by_member_id(&m))
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 6);
    let last = rows[5].tuple().unwrap();
    assert!(last.record(&t).unwrap().is_absent());
    assert!(!last.record(&m).unwrap().is_absent());
    assert_eq!(rows[5].to_json()["t"], serde_json::Value::Null);
}

fn left_join_on(m: &EntityPath, t: &EntityPath) -> QuerySpec {
    select(pair(m, t))
        .from(m)
        .left_join(m.path("team").unwrap(), t)
        .on(t.attr("name").unwrap().eq("teamA").unwrap())
        .order_by(order_by_member_id(m))
        .build()
        .unwrap()
}

fn left_join_filtered(m: &EntityPath, t: &EntityPath) -> QuerySpec {
    select(pair(m, t))
        .from(m)
        .left_join(m.path("team").unwrap(), t)
        .filter(t.attr("name").unwrap().eq("teamA").unwrap())
        .order_by(order_by_member_id(m))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_on_condition_restricts_matches_not_members() {
    let session = session();
    let (m, t) = member_and_team();

    let rows = session.fetch_list(&left_join_on(&m, &t)).await.unwrap();
    assert_eq!(
        team_names(&rows, &t),
        vec![Some("teamA".to_string()), Some("teamA".to_string()), None, None]
    );
}

#[tokio::test]
async fn test_same_condition_in_filter_drops_members() {
    let session = session();
    let (m, t) = member_and_team();

    let on_rows = session.fetch_list(&left_join_on(&m, &t)).await.unwrap();
    let filtered_rows = session.fetch_list(&left_join_filtered(&m, &t)).await.unwrap();

    assert_eq!(filtered_rows.len(), 2);
    assert!(on_rows.len() > filtered_rows.len());
    assert_eq!(
        session.fetch_count(&left_join_on(&m, &t)).await.unwrap(),
        on_rows.len() as u64
    );
}

#[tokio::test]
async fn test_on_and_filter_agree_when_every_member_matches() {
    let session = session();
    let (m, t) = member_and_team();
    let any_team = |spec: quarry::query::QueryBuilder| {
        spec.order_by(order_by_member_id(&m)).build().unwrap()
    };

    let on = any_team(
        select(pair(&m, &t))
            .from(&m)
            .left_join(m.path("team").unwrap(), &t)
            .on(t.attr("name").unwrap().in_list(["teamA", "teamB"]).unwrap()),
    );
    let filtered = any_team(
        select(pair(&m, &t))
            .from(&m)
            .left_join(m.path("team").unwrap(), &t)
            .filter(t.attr("name").unwrap().in_list(["teamA", "teamB"]).unwrap()),
    );

    assert_eq!(
        session.fetch_list(&on).await.unwrap(),
        session.fetch_list(&filtered).await.unwrap()
    );
}

#[tokio::test]
async fn test_left_join_unrelated_entity_with_on() {
    let session = session();
    session
        .source()
        .execute_batch(
            "INSERT INTO member (member_id, username, age, team_id) VALUES \
             (7, 'teamA', 0, NULL), (8, 'teamB', 0, NULL);",
        )
        .unwrap();
    let (m, t) = member_and_team();
    let spec = select(pair(&m, &t))
        .from(&m)
        .left_join_entity(&t)
        .on(m.attr("username").unwrap().eq(t.attr("name").unwrap()).unwrap())
        .order_by(order_by_member_id(&m))
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(
        team_names(&rows, &t),
        vec![
            None,
            None,
            None,
            None,
            Some("teamA".to_string()),
            Some("teamB".to_string())
        ]
    );
}

#[tokio::test]
async fn test_relation_path_is_an_inner_join() {
    let session = session_with_extras();
    let m = entity("member");
    let spec = select([m.attr("team.name").unwrap()])
        .from(&m)
        .build()
        .unwrap();

    // members 5 and 6 have no team
    assert_eq!(session.fetch_list(&spec).await.unwrap().len(), 4);
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 4);
}

#[tokio::test]
async fn test_relation_path_in_left_join_on_keeps_every_member() {
    let session = session_with_extras();
    let m = entity("member").alias("m");
    let t2 = entity("team").alias("t2");
    let spec = select(pair(&m, &t2))
        .from(&m)
        .left_join_entity(&t2)
        .on(t2.attr("name").unwrap().eq(m.attr("team.name").unwrap()).unwrap())
        .order_by(order_by_member_id(&m))
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(
        team_names(&rows, &t2),
        vec![
            Some("teamA".to_string()),
            Some("teamA".to_string()),
            Some("teamB".to_string()),
            Some("teamB".to_string()),
            None,
            None
        ]
    );
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 6);
}

#[tokio::test]
async fn test_relation_path_through_join_target_in_on() {
    let session = session_with_extras();
    session
        .source()
        .execute_batch("INSERT INTO team (team_id, name) VALUES (3, 'teamC');")
        .unwrap();
    let (m, t) = member_and_team();
    // members found by their team's name rather than the relation column
    let spec = select(pair(&m, &t))
        .from(&t)
        .left_join_entity(&m)
        .on(m.attr("team.name").unwrap().eq(t.attr("name").unwrap()).unwrap())
        .order_by([t.attr("id").unwrap().asc(), m.attr("id").unwrap().asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 5);
    let usernames: Vec<_> = rows
        .iter()
        .map(|row| {
            row.tuple()
                .unwrap()
                .record(&m)
                .unwrap()
                .get("username")
                .cloned()
        })
        .collect();
    assert_eq!(
        usernames,
        vec![
            Some(Value::from("member1")),
            Some(Value::from("member2")),
            Some(Value::from("member3")),
            Some(Value::from("member4")),
            Some(Value::Null)
        ]
    );
    assert!(rows[4].tuple().unwrap().record(&m).unwrap().is_absent());
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 5);
}

#[tokio::test]
async fn test_path_read_outside_on_still_drops_members_without_team() {
    let session = session_with_extras();
    let m = entity("member").alias("m");
    let t2 = entity("team").alias("t2");
    let team_name = m.attr("team.name").unwrap();
    let spec = select([Projection::from(team_name.clone()), Projection::from(&t2)])
        .from(&m)
        .left_join_entity(&t2)
        .on(t2.attr("name").unwrap().eq(team_name).unwrap())
        .build()
        .unwrap();

    assert_eq!(session.fetch_list(&spec).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_correlated_subquery_over_outer_relation_path() {
    let session = session_with_extras();
    let m = entity("member").alias("m");
    let t2 = entity("team").alias("t2");
    let teams_named_like_mine = select([t2.count().unwrap()])
        .from(&t2)
        .filter(t2.attr("name").unwrap().eq(m.attr("team.name").unwrap()).unwrap())
        .build()
        .unwrap();
    assert!(teams_named_like_mine.is_correlated());

    let spec = select([
        m.attr("id").unwrap(),
        Expression::subquery(teams_named_like_mine).unwrap(),
    ])
    .from(&m)
    .order_by(order_by_member_id(&m))
    .build()
    .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let counts: Vec<_> = rows
        .iter()
        .map(|row| row.tuple().unwrap().cells()[1].as_value().cloned())
        .collect();
    // members 5 and 6 have no team but stay, matching no team
    assert_eq!(
        counts,
        vec![1, 1, 1, 1, 0, 0]
            .into_iter()
            .map(|n| Some(Value::Int(n)))
            .collect::<Vec<_>>()
    );
}
