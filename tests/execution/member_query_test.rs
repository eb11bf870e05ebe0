//! End-to-end queries over the member/team fixture.

#[path = "../common/mod.rs"]
mod common;

use common::{entity, int, session, text};
use quarry::model::Value;
use quarry::query::{select, select_from, Case, Expression, Projection};
use quarry::QueryError;

#[tokio::test]
async fn test_filter_and_order() {
    let session = session();
    let m = entity("member");
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .filter(m.attr("age").unwrap().goe(20).unwrap())
        .order_by([m.attr("age").unwrap().desc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["member4", "member3", "member2"]);
}

#[tokio::test]
async fn test_no_match_is_empty_list() {
    let session = session();
    let m = entity("member");
    let spec = select_from(&m)
        .filter(m.attr("age").unwrap().gt(1000).unwrap())
        .build()
        .unwrap();
    assert!(session.fetch_list(&spec).await.unwrap().is_empty());
    assert!(session.fetch_one(&spec).await.unwrap().is_none());
    assert!(session.fetch_first(&spec).await.unwrap().is_none());
}

#[tokio::test]
async fn test_average_age_by_team() {
    let session = session();
    let m = entity("member");
    let team_name = m.attr("team.name").unwrap();
    let avg_age = m.attr("age").unwrap().avg().unwrap();
    let spec = select([team_name.clone(), avg_age.clone()])
        .from(&m)
        .group_by([team_name.clone()])
        .order_by([team_name.asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 2);

    let team_a = rows[0].tuple().unwrap();
    assert_eq!(team_a.value(&team_name), Some(&Value::Text("teamA".into())));
    assert_eq!(team_a.value(&avg_age), Some(&Value::Float(15.0)));

    let team_b = rows[1].tuple().unwrap();
    assert_eq!(team_b.value(&team_name), Some(&Value::Text("teamB".into())));
    assert_eq!(team_b.value(&avg_age), Some(&Value::Float(35.0)));
}

#[tokio::test]
async fn test_average_keeps_fraction() {
    let session = session();
    session
        .source()
        .execute_batch("INSERT INTO member (member_id, username, age, team_id) VALUES (9, 'odd', 25, NULL);")
        .unwrap();
    let m = entity("member");
    let spec = select([m.attr("age").unwrap().avg().unwrap()])
        .from(&m)
        .filter(m.attr("age").unwrap().in_list([10, 25]).unwrap())
        .build()
        .unwrap();

    let row = session.fetch_one(&spec).await.unwrap().unwrap();
    assert_eq!(row.value(), Some(&Value::Float(17.5)));
}

#[tokio::test]
async fn test_equal_to_max_age_subquery() {
    let session = session();
    let m = entity("member");
    let sub = m.alias("sub");
    let max_age = select([sub.attr("age").unwrap().max().unwrap()])
        .from(&sub)
        .build()
        .unwrap();
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .filter(
            m.attr("age")
                .unwrap()
                .eq(Expression::subquery(max_age).unwrap())
                .unwrap(),
        )
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0]).as_deref(), Some("member4"));
}

#[tokio::test]
async fn test_correlated_subquery_per_team() {
    let session = session();
    let m = entity("member");
    let sub = m.alias("sub");
    // oldest member of each team
    let team_max = select([sub.attr("age").unwrap().max().unwrap()])
        .from(&sub)
        .filter(sub.attr("team").unwrap().eq(m.attr("team").unwrap()).unwrap())
        .build()
        .unwrap();
    assert!(team_max.is_correlated());

    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .filter(
            m.attr("age")
                .unwrap()
                .eq(Expression::subquery(team_max).unwrap())
                .unwrap(),
        )
        .order_by([m.attr("age").unwrap().asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["member2", "member4"]);
}

#[tokio::test]
async fn test_fetch_one_strict_and_fetch_first_lenient() {
    let session = session();
    let m = entity("member");
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .filter(m.attr("age").unwrap().goe(20).unwrap())
        .order_by([m.attr("age").unwrap().asc()])
        .build()
        .unwrap();

    assert!(matches!(
        session.fetch_one(&spec).await,
        Err(QueryError::MultipleResults { found: 2 })
    ));

    for _ in 0..3 {
        let first = session.fetch_first(&spec).await.unwrap().unwrap();
        assert_eq!(text(&first).as_deref(), Some("member2"));
    }
}

#[tokio::test]
async fn test_fetch_one_single_match() {
    let session = session();
    let m = entity("member");
    let spec = select_from(&m)
        .filter(m.attr("username").unwrap().eq("member3").unwrap())
        .build()
        .unwrap();

    let row = session.fetch_one(&spec).await.unwrap().unwrap();
    let record = row.record().unwrap();
    assert_eq!(record.entity(), "member");
    assert_eq!(record.get("age"), Some(&Value::Int(30)));
    assert_eq!(record.get("team"), Some(&Value::Int(2)));
    assert_eq!(
        row.to_json(),
        serde_json::json!({"id": 3, "username": "member3", "age": 30, "team": 2})
    );
}

#[tokio::test]
async fn test_tuple_of_entities_and_values() {
    let session = session();
    let m = entity("member");
    let t = entity("team");
    let age = m.attr("age").unwrap();
    let spec = select([Projection::from(&m), Projection::from(&t), Projection::from(&age)])
        .from(&m)
        .join(m.path("team").unwrap(), &t)
        .order_by([age.asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 4);
    let first = rows[0].tuple().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(
        first.record(&m).unwrap().get("username"),
        Some(&Value::Text("member1".into()))
    );
    assert_eq!(
        first.record(&t).unwrap().get("name"),
        Some(&Value::Text("teamA".into()))
    );
    // rebuilt expression finds the same cell
    assert_eq!(
        first.value(&entity("member").attr("age").unwrap()),
        Some(&Value::Int(10))
    );
}

#[tokio::test]
async fn test_case_projections() {
    let session = session();
    let m = entity("member");
    let age = m.attr("age").unwrap();

    let simple = age
        .when(10)
        .then("ten")
        .unwrap()
        .when(20)
        .then("twenty")
        .unwrap()
        .otherwise("other")
        .unwrap();
    let searched = Case::when(age.between(0, 20).unwrap())
        .then("0~20")
        .unwrap()
        .when(age.between(21, 30).unwrap())
        .then("21~30")
        .unwrap()
        .otherwise("etc")
        .unwrap();

    let spec = select([simple.clone(), searched.clone()])
        .from(&m)
        .order_by([age.asc()])
        .build()
        .unwrap();
    let rows = session.fetch_list(&spec).await.unwrap();

    let pairs: Vec<(Value, Value)> = rows
        .iter()
        .map(|row| {
            let t = row.tuple().unwrap();
            (
                t.value(&simple).cloned().unwrap(),
                t.value(&searched).cloned().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            (Value::from("ten"), Value::from("0~20")),
            (Value::from("twenty"), Value::from("0~20")),
            (Value::from("other"), Value::from("21~30")),
            (Value::from("other"), Value::from("etc")),
        ]
    );
}

#[tokio::test]
async fn test_case_as_sort_key() {
    let session = session();
    let m = entity("member");
    let age = m.attr("age").unwrap();
    // 30-year-olds first, then the rest by descending age
    let rank = Case::when(age.eq(30).unwrap())
        .then(0)
        .unwrap()
        .otherwise(1)
        .unwrap();
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .order_by([rank.asc(), age.desc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["member3", "member4", "member2", "member1"]);
}

#[tokio::test]
async fn test_arithmetic_projection() {
    let session = session();
    let m = entity("member");
    let next_year = m.attr("age").unwrap().add(1).unwrap();
    let spec = select([next_year.clone()])
        .from(&m)
        .order_by([next_year.desc()])
        .limit(1)
        .build()
        .unwrap();

    let row = session.fetch_first(&spec).await.unwrap().unwrap();
    assert_eq!(int(&row), 41);
}

#[tokio::test]
async fn test_theta_join_through_source_list() {
    let session = session();
    session
        .source()
        .execute_batch(
            "INSERT INTO member (member_id, username, age, team_id) VALUES \
             (7, 'teamA', 0, NULL), (8, 'teamB', 0, NULL);",
        )
        .unwrap();
    let m = entity("member");
    let t = entity("team");
    let spec = select([m.attr("username").unwrap()])
        .from(&m)
        .from(&t)
        .filter(m.attr("username").unwrap().eq(t.attr("name").unwrap()).unwrap())
        .order_by([m.attr("username").unwrap().asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["teamA", "teamB"]);
}

#[tokio::test]
async fn test_distinct_projection() {
    let session = session();
    let m = entity("member");
    let spec = select([m.attr("team.name").unwrap()])
        .distinct()
        .from(&m)
        .order_by([m.attr("team.name").unwrap().asc()])
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(text).collect();
    assert_eq!(names, vec!["teamA", "teamB"]);
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 2);
}

#[tokio::test]
async fn test_having_restricts_groups() {
    let session = session();
    let m = entity("member");
    let team_name = m.attr("team.name").unwrap();
    let avg_age = m.attr("age").unwrap().avg().unwrap();
    let spec = select([team_name.clone()])
        .from(&m)
        .group_by([team_name])
        .having(avg_age.gt(20).unwrap())
        .build()
        .unwrap();

    let rows = session.fetch_list(&spec).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0]).as_deref(), Some("teamB"));
}

#[tokio::test]
async fn test_spec_reexecutes_identically() {
    let session = session();
    let m = entity("member");
    let spec = select([m.attr("username").unwrap(), m.attr("age").unwrap()])
        .from(&m)
        .filter(m.attr("username").unwrap().contains("member").unwrap())
        .order_by([m.attr("age").unwrap().desc()])
        .build()
        .unwrap();

    let first = session.fetch_list(&spec).await.unwrap();
    let second = session.fetch_list(&spec).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_in_list_matches_nothing() {
    let session = session();
    let m = entity("member");
    let spec = select_from(&m)
        .filter(m.attr("age").unwrap().in_list(Vec::<i64>::new()).unwrap())
        .build()
        .unwrap();
    assert_eq!(session.fetch_count(&spec).await.unwrap(), 0);
    assert!(session.fetch_list(&spec).await.unwrap().is_empty());
}
