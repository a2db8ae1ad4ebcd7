//! Feature documents with GML geometries, substitution groups, shared
//! tables, batches and the model cache.

use std::fs;
use std::path::PathBuf;

use gmlas::cache::ModelCache;
use gmlas::config::Config;
use gmlas::model::{Field, Value};
use gmlas::{sql, BuildOptions, Converter, Error, Model};
use pretty_assertions::assert_eq;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn converter() -> Converter {
    let config = Config {
        schemas: vec![fixture("sites.xsd").display().to_string()],
        allow_remote: false,
        ..Config::default()
    };
    Converter::from_config(&config).unwrap()
}

fn sites() -> Model {
    let mut converter = converter();
    converter.convert_file(fixture("sites.xml")).unwrap();
    converter.into_model()
}

fn text(value: &str) -> Option<Value> {
    Some(Value::Text(value.to_string()))
}

#[test]
fn test_feature_tables() {
    let model = sites();
    assert_eq!(
        model.tables.keys().collect::<Vec<_>>(),
        vec!["Sites", "Site", "Site_Pin", "Site_note", "Site_Flag"]
    );
    assert_eq!(model.root_table.as_deref(), Some("Sites"));
    assert_eq!(
        model.table("Site").unwrap().column_names(),
        vec!["@id", "name", "location", "Pin_id", "Flag_id", "Sites_id"]
    );

    let site = model.rows("Site");
    assert_eq!(
        site.iter().map(|r| r.get("@id").cloned()).collect::<Vec<_>>(),
        vec![text("s1"), text("s2"), text("s3")]
    );
    assert!(site.iter().all(|r| r.get("Sites_id") == Some(&Value::Int(1))));
    assert_eq!(site[0].get("name").cloned(), text("North"));
    assert_eq!(site[1].get("name"), None);
}

#[test]
fn test_geometries_decode_or_stay_null() {
    let model = sites();
    let site = model.rows("Site");
    assert_eq!(
        site[0].get("location"),
        Some(&Value::Geometry {
            wkt: "POINT (500000 5700000)".to_string(),
            srid: 25832,
        })
    );
    // absent in s2, undecodable in s3
    assert_eq!(site[1].get("location"), None);
    assert_eq!(site[2].get("location"), None);

    match model.table("Site").unwrap().field("location/geometry()") {
        Some(Field::Geometry(g)) => {
            assert_eq!(g.geometry_type, "POINT");
            assert!(g.optional);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(sql::to_sql(&model).contains("GeomFromText('POINT (500000 5700000)', 25832)"));
}

#[test]
fn test_substitution_alternatives_are_exclusive() {
    let model = sites();
    for row in model.rows("Site") {
        let set = ["Pin_id", "Flag_id"].iter().filter(|c| row.get(c).is_some()).count();
        assert_eq!(set, 1, "{:?}", row);
    }

    let site = model.table("Site").unwrap();
    for key in ["Pin", "Flag"] {
        match site.field(key) {
            Some(Field::Link(link)) => {
                assert_eq!(link.substitution_group.as_deref(), Some("Marker"));
                assert!(link.optional);
                assert_eq!(link.min_occurs, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    let ddl = sql::create_table(&model, site);
    assert!(
        ddl.contains(r#"CONSTRAINT "Site_Marker_xor" CHECK (("Pin_id" IS NOT NULL) + ("Flag_id" IS NOT NULL) = 1)"#),
        "{}",
        ddl
    );
}

#[test]
fn test_each_alternative_in_turn() {
    let wrap = |marker: &str| {
        format!(
            r#"<app:Sites xmlns:app="urn:example:sites" xmlns:gml="http://www.opengis.net/gml/3.2"><app:Site gml:id="x">{}</app:Site></app:Sites>"#,
            marker
        )
    };
    for (marker, column) in [
        ("<app:Pin><app:label>p</app:label></app:Pin>", "Pin_id"),
        ("<app:Flag><app:label>f</app:label><app:colour>blue</app:colour></app:Flag>", "Flag_id"),
    ] {
        let mut converter = converter();
        converter.convert_str(&wrap(marker)).unwrap();
        let rows = converter.model().rows("Site");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(column), Some(&Value::Int(1)));
    }
}

#[test]
fn test_repeated_notes_link_back_to_shared_site() {
    let model = sites();
    let notes = model.rows("Site_note");
    assert_eq!(
        notes.iter().map(|r| r.get("v").cloned()).collect::<Vec<_>>(),
        vec![text("first"), text("second")]
    );
    assert!(notes.iter().all(|r| r.get("Site_id").cloned() == text("s1")));
}

#[test]
fn test_shared_ids_across_documents() {
    let mut converter = converter();
    converter.convert_file(fixture("sites.xml")).unwrap();
    converter.convert_file(fixture("sites.xml")).unwrap();
    let model = converter.model();

    // Site rows are keyed by gml:id and emitted once
    assert_eq!(model.rows("Site").len(), 3);
    // the root table has a synthetic id and grows
    assert_eq!(model.rows("Sites").len(), 2);
    assert_eq!(model.table("Sites").unwrap().last_id, 2);
}

#[test]
fn test_batch_with_failing_document() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.xml");
    // the Flag lacks its required colour
    fs::write(
        &broken,
        r#"<app:Sites xmlns:app="urn:example:sites" xmlns:gml="http://www.opengis.net/gml/3.2"><app:Site gml:id="z"><app:Flag><app:label>f</app:label></app:Flag></app:Site></app:Sites>"#,
    )
    .unwrap();

    let mut converter = converter();
    converter.convert_file(fixture("sites.xml")).unwrap();
    let before = converter.model().clone();

    let report = converter.convert_files(&[broken.clone()]).unwrap();
    assert!(report.converted.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, Error::Cardinality(_)));
    assert_eq!(converter.model(), &before);
}

#[test]
fn test_cache_is_used_and_rebuilt_when_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ModelCache::new(dir.path());

    let mut first = converter().with_cache(cache.clone());
    first.convert_file(fixture("sites.xml")).unwrap();
    let built = first.into_model();
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

    let mut second = converter().with_cache(cache.clone());
    second.convert_file(fixture("sites.xml")).unwrap();
    assert_eq!(second.model(), &built);

    let key = fixture("sites.xml").canonicalize().unwrap().display().to_string();
    let path = cache.path_for(&key);
    let stale = fs::read_to_string(&path).unwrap().replacen("GMLAS-MODEL\n1\n", "GMLAS-MODEL\n99\n", 1);
    fs::write(&path, stale).unwrap();

    let mut third = converter().with_cache(cache);
    third.convert_file(fixture("sites.xml")).unwrap();
    assert_eq!(third.model(), &built);
}

#[test]
fn test_merge_depth_is_configurable_per_converter() {
    let config = Config {
        schemas: vec![fixture("sites.xsd").display().to_string()],
        allow_remote: false,
        build: BuildOptions::new().with_merge_max_depth(0),
        ..Config::default()
    };
    let mut converter = Converter::from_config(&config).unwrap();
    converter.convert_file(fixture("sites.xml")).unwrap();
    let location = converter.model().rows("Site_location");
    assert_eq!(location.len(), 2);
    assert!(location[0].get("geometry").is_some());
    assert!(location[1].get("geometry").is_none());
}
