//! End-to-end scenarios: schema files on disk, documents converted through
//! the full pipeline, tables and rows checked field by field.

use std::path::PathBuf;

use gmlas::config::Config;
use gmlas::model::{BackLink, Field, SqlType, Value};
use gmlas::{sql, BuildOptions, Converter, Model};
use pretty_assertions::assert_eq;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn converter(schema: &str, options: BuildOptions) -> Converter {
    let config = Config {
        schemas: vec![fixture(schema).display().to_string()],
        allow_remote: false,
        build: options,
        ..Config::default()
    };
    Converter::from_config(&config).unwrap()
}

fn convert(schema: &str, xml: &str, options: BuildOptions) -> Model {
    let mut converter = converter(schema, options);
    converter.convert_str(xml).unwrap();
    converter.into_model()
}

fn columns(model: &Model, table: &str) -> Vec<String> {
    model.table(table).unwrap().column_names()
}

fn text(value: &str) -> Option<Value> {
    Some(Value::Text(value.to_string()))
}

const SCENARIO: &str = r#"<a><b>txt</b><c id="5"><d>x</d></c></a>"#;

#[test]
fn test_child_with_id_gets_its_own_table() {
    let model = convert("scenario.xsd", SCENARIO, BuildOptions::new().with_merge_max_depth(6));

    assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(columns(&model, "a"), vec!["id", "b", "c_id"]);
    assert_eq!(columns(&model, "c"), vec!["@id", "d"]);

    let a = model.table("a").unwrap();
    assert!(!a.has_natural_id());
    match a.field("c") {
        Some(Field::Link(link)) => {
            assert_eq!(link.table, "c");
            assert!(!link.optional);
            assert!(!link.is_many());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(model.table("c").unwrap().has_natural_id());

    let a_rows = model.rows("a");
    let c_rows = model.rows("c");
    assert_eq!(a_rows.len(), 1);
    assert_eq!(c_rows.len(), 1);
    assert_eq!(a_rows[0].get("b").cloned(), text("txt"));
    assert_eq!(a_rows[0].get("c_id").cloned(), text("5"));
    assert_eq!(c_rows[0].get("@id").cloned(), text("5"));
    assert_eq!(c_rows[0].get("d").cloned(), text("x"));

    let script = sql::to_sql(&model);
    assert!(script.contains(r#"FOREIGN KEY ("c_id") REFERENCES "c" ("@id")"#), "{}", script);
    assert!(script.contains(r#"INSERT INTO "a" ("id", "b", "c_id") VALUES (1, 'txt', '5');"#), "{}", script);
}

#[test]
fn test_id_child_is_never_inlined() {
    let model = convert("scenario.xsd", SCENARIO, BuildOptions::new().with_merge_max_depth(0));
    assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(columns(&model, "a"), vec!["id", "b", "c_id"]);
    assert_eq!(model.row_count(), 2);
}

#[test]
fn test_repeated_simple_child() {
    let model = convert("tags.xsd", "<a><tag>x</tag><tag>y</tag></a>", BuildOptions::default());

    assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["a", "a_tag"]);
    assert_eq!(columns(&model, "a"), vec!["id"]);
    assert!(model.table("a").unwrap().field("tag/text()").is_none());
    assert!(matches!(model.table("a").unwrap().field("tag"), Some(Field::Link(l)) if l.is_many()));

    let tags = model.rows("a_tag");
    assert_eq!(
        tags.iter().map(|r| r.get("v").cloned()).collect::<Vec<_>>(),
        vec![text("x"), text("y")]
    );
    assert!(tags.iter().all(|r| r.get("a_id") == Some(&Value::Int(1))));
    match model.table("a_tag").unwrap().field(&BackLink::key_for("a")) {
        Some(Field::BackLink(back)) => {
            assert_eq!(back.table, "a");
            assert_eq!(back.sql_type, SqlType::Int);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_nested_rows_of_one_table_link_to_their_parent() {
    let model = convert(
        "tree.xsd",
        r#"<node id="r"><name>root</name><node id="k"><name>leaf</name></node></node>"#,
        BuildOptions::default(),
    );

    assert_eq!(model.tables.keys().collect::<Vec<_>>(), vec!["node"]);
    assert_eq!(columns(&model, "node"), vec!["@id", "name", "node_id"]);
    let rows = model.rows("node");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("@id").cloned(), text("r"));
    assert_eq!(rows[0].get("node_id"), None);
    assert_eq!(rows[1].get("@id").cloned(), text("k"));
    assert_eq!(rows[1].get("node_id").cloned(), text("r"));

    let script = sql::to_sql(&model);
    assert!(
        script.contains(r#"FOREIGN KEY ("node_id") REFERENCES "node" ("@id") DEFERRABLE INITIALLY DEFERRED"#),
        "{}",
        script
    );
    let parent = script.find(r#"VALUES ('r', 'root');"#).unwrap();
    let child = script.find(r#"VALUES ('k', 'leaf', 'r');"#).unwrap();
    assert!(parent < child, "{}", script);
}

#[test]
fn test_clashing_columns_are_renamed() {
    let model = convert("columns.xsd", "<a><id>77</id><b>x</b></a>", BuildOptions::default());

    assert_eq!(columns(&model, "a"), vec!["id", "id_2", "b"]);
    let rows = model.rows("a");
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("id_2"), Some(&Value::Int(77)));

    let script = sql::to_sql(&model);
    assert!(script.contains(r#""id_2" INTEGER NOT NULL"#), "{}", script);
    assert!(script.contains(r#"INSERT INTO "a" ("id", "id_2", "b") VALUES (1, 77, 'x');"#), "{}", script);
}

fn sites() -> String {
    std::fs::read_to_string(fixture("sites.xml")).unwrap()
}

#[test]
fn test_table_shape_is_deterministic() {
    let first = convert("sites.xsd", &sites(), BuildOptions::default());
    let second = convert("sites.xsd", &sites(), BuildOptions::default());
    assert_eq!(
        serde_json::to_string(&first.tables).unwrap(),
        serde_json::to_string(&second.tables).unwrap()
    );
    assert_eq!(first, second);
}

#[test]
fn test_zero_merge_depth_flattens_nothing_complex() {
    let model = convert("sites.xsd", &sites(), BuildOptions::new().with_merge_max_depth(0));
    assert!(model.table("Site_location").is_some());
    for table in model.tables.values() {
        for key in table.fields.keys() {
            let steps: Vec<&str> = key.split('/').collect();
            let flat = match steps.as_slice() {
                [_] => true,
                [_, last] => *last == "text()" || last.starts_with('@'),
                _ => false,
            };
            assert!(flat, "{} has flattened key {}", table.name, key);
        }
    }

    let inlined = convert("sites.xsd", &sites(), BuildOptions::default());
    assert!(inlined.table("Site_location").is_none());
    assert!(inlined.table("Site").unwrap().field("location/geometry()").is_some());
}
