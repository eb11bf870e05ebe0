//! Integration tests for metamodel loading and attribute paths.

use quarry::model::{AttributeKind, Metamodel, MetamodelError, ValueType};
use quarry::shop;
use quarry::QueryError;

#[test]
fn test_load_shop_schema_from_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/schema/shop.toml");
    let model = Metamodel::from_file(path).unwrap();

    let member = model.descriptor("member").unwrap();
    assert_eq!(member.table, "member");
    assert_eq!(member.identity().unwrap().column, "member_id");

    let team = member.attribute("team").unwrap();
    assert_eq!(
        team.kind,
        AttributeKind::Relation {
            target: "team".into(),
            key_type: ValueType::Int,
        }
    );
    assert!(team.nullable);
}

#[test]
fn test_missing_schema_file() {
    let result = Metamodel::from_file("/definitely/not/here.toml");
    assert!(matches!(result, Err(MetamodelError::FileNotFound(_))));
}

#[test]
fn test_subtype_inherits_parent_table_and_attributes() {
    let book = shop::model().descriptor("book").unwrap();
    assert_eq!(book.table, "item");
    assert_eq!(book.parent.as_deref(), Some("item"));

    let names: Vec<&str> = book.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(&names[..4], &["id", "name", "price", "stock_quantity"]);
    assert!(names.contains(&"author"));
    assert!(!names.contains(&"artist"));

    let filter = book.discriminator_filter().unwrap();
    assert_eq!(filter.column, "dtype");
    assert_eq!(filter.values, vec!["Book".to_string()]);
}

#[test]
fn test_hierarchy_root_sees_every_row() {
    let item = shop::model().descriptor("item").unwrap();
    assert!(item.discriminator.is_some());
    assert!(item.discriminator_filter().is_none());
    assert!(shop::model().is_subtype_of("movie", "item"));
    assert!(!shop::model().is_subtype_of("item", "movie"));
}

#[test]
fn test_duplicate_entity_rejected() {
    let schema = r#"
[[entity]]
name = "team"

[[entity]]
name = "team"
"#;
    assert!(matches!(
        Metamodel::from_toml(schema),
        Err(MetamodelError::DuplicateEntity(name)) if name == "team"
    ));
}

#[test]
fn test_multiple_identities_rejected() {
    let schema = r#"
[[entity]]
name = "team"

[[entity.attribute]]
name = "id"
type = "long"
identity = true

[[entity.attribute]]
name = "code"
type = "string"
identity = true
"#;
    assert!(matches!(
        Metamodel::from_toml(schema),
        Err(MetamodelError::MultipleIdentities(_))
    ));
}

#[test]
fn test_unknown_relation_target_rejected() {
    let schema = r#"
[[entity]]
name = "member"

[[entity.attribute]]
name = "team"
relation = "squad"
"#;
    assert!(matches!(
        Metamodel::from_toml(schema),
        Err(MetamodelError::UnknownRelationTarget { target, .. }) if target == "squad"
    ));
}

#[test]
fn test_unknown_parent_rejected() {
    let schema = r#"
[[entity]]
name = "book"
extends = "item"
discriminator = "Book"
"#;
    assert!(matches!(
        Metamodel::from_toml(schema),
        Err(MetamodelError::UnknownParent { .. })
    ));
}

#[test]
fn test_unknown_type_rejected() {
    let schema = r#"
[[entity]]
name = "team"

[[entity.attribute]]
name = "founded"
type = "timestamp"
"#;
    assert!(matches!(
        Metamodel::from_toml(schema),
        Err(MetamodelError::UnknownType { ty, .. }) if ty == "timestamp"
    ));
}

#[test]
fn test_relation_path_resolution() {
    let m = shop::model().entity("member").unwrap().alias("m");
    let path = m.path("team.name").unwrap();

    assert_eq!(path.root_alias(), "m");
    assert_eq!(path.hops().len(), 1);
    assert_eq!(path.hops()[0].fk_column, "team_id");
    assert_eq!(path.owner().name, "team");
    assert_eq!(path.value_type(), ValueType::Text);
    assert_eq!(path.to_string(), "m.team.name");
}

#[test]
fn test_path_errors() {
    let member = shop::model().entity("member").unwrap();
    assert!(matches!(
        member.path("nickname"),
        Err(QueryError::UnknownAttribute { attribute, .. }) if attribute == "nickname"
    ));
    assert!(matches!(
        member.path("age.value"),
        Err(QueryError::InvalidState(_))
    ));
    assert!(matches!(
        shop::model().entity("customer"),
        Err(QueryError::UnknownEntity(_))
    ));
}

#[test]
fn test_entity_handles_compare_by_alias() {
    let model = shop::model();
    let a = model.entity("member").unwrap();
    let b = model.entity("member").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, a.alias("m"));
    assert_eq!(a.attr("age").unwrap(), b.attr("age").unwrap());
}
