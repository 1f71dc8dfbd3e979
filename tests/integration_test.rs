// Integration tests for artmatch
use artmatch::config::{ConditionConfig, RenderConfig, StoreSource};
use artmatch::{
    load_store, ConditionalKnn, Estimator, LabelCondition, MatchIndex, MissingEmbeddingPolicy, Model,
    QueryOrchestrator, RunConfig, Session, SessionConfig, StoreSchema,
};
use image::{Rgb, RgbImage};
use std::io::Write;
use std::path::Path;

const MEDIUMS: [&str; 3] = ["paintings", "glass", "ceramics"];

/// Six artworks, two per medium, each with a local thumbnail
fn write_catalog(dir: &Path) -> std::path::PathBuf {
    let rows = [
        ("p1", [1.0, 0.0, 0.0], "paintings"),
        ("p2", [0.9, 0.1, 0.0], "paintings"),
        ("g1", [0.0, 1.0, 0.0], "glass"),
        ("g2", [0.1, 0.9, 0.0], "glass"),
        ("c1", [0.0, 0.0, 1.0], "ceramics"),
        ("c2", [0.0, 0.1, 0.9], "ceramics"),
    ];

    let path = dir.join("catalog.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for (i, (id, features, medium)) in rows.iter().enumerate() {
        let thumb = dir.join(format!("{id}.png"));
        RgbImage::from_pixel(8, 8, Rgb([i as u8 * 40, 0, 0])).save(&thumb).unwrap();
        let record = serde_json::json!({
            "id": id,
            "features": features,
            "medium": medium,
            "thumb": thumb.to_str().unwrap(),
        });
        writeln!(file, "{record}").unwrap();
    }
    path
}

fn schema() -> StoreSchema {
    StoreSchema {
        embedding_field: "features".to_string(),
        label_fields: vec!["medium".to_string()],
        aux_fields: vec!["thumb".to_string()],
        ..StoreSchema::default()
    }
}

#[test]
fn test_six_entity_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = load_store(write_catalog(dir.path()), &schema()).unwrap();
    assert_eq!(store.len(), 6);

    let index = ConditionalKnn::new("medium")
        .with_values_field("thumb")
        .fit(store.entities())
        .unwrap();
    assert_eq!(index.conditions(), ["ceramics", "glass", "paintings"]);

    let table = QueryOrchestrator::new(&index, LabelCondition::for_values("medium", MEDIUMS))
        .transform(store.select(&["p1", "g2"]).unwrap())
        .unwrap();

    assert_eq!(table.num_rows(), 2);
    assert_eq!(table.num_columns(), 3);
    for column in table.columns() {
        assert_eq!(column.results.len(), 2);
        assert!(column.results.iter().all(|r| r.len() <= 1));
    }
    assert_eq!(table.cell(0, "glass").unwrap().best().unwrap().entity_id, "g2");
    assert_eq!(table.cell(1, "glass").unwrap().best().unwrap().entity_id, "g2");
    assert_eq!(table.cell(1, "paintings").unwrap().best().unwrap().entity_id, "p2");
}

#[test]
fn test_results_sorted_and_bounded_by_k() {
    let dir = tempfile::tempdir().unwrap();
    let store = load_store(write_catalog(dir.path()), &schema()).unwrap();
    let session = Session::new(
        store,
        SessionConfig {
            k: 5,
            ..SessionConfig::default()
        },
    );

    let table = session.match_conditions(&["p1", "c2"], "medium", &[]).unwrap();
    assert_eq!(table.num_columns(), 3);
    for column in table.columns() {
        for result in &column.results {
            assert!(result.len() <= 5);
            assert!(result.as_slice().windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    let again = session.match_conditions(&["p1", "c2"], "medium", &[]).unwrap();
    assert_eq!(table, again);
    assert_eq!(session.index_count(), 1);
    session.close();
}

#[test]
fn test_missing_query_embedding_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "a", "features": [0.0, 1.0], "medium": "glass"},
            {"id": "b", "features": [1.0, 0.0], "medium": "ceramics"},
            {"id": "broken", "features": "n/a"}
        ]"#,
    )
    .unwrap();
    let store = load_store(&path, &schema()).unwrap();
    let rows = store.select(&["a", "broken"]).unwrap().rows().to_vec();
    // the index only covers entities that can be indexed
    let indexable: Vec<_> = store.entities().iter().filter(|e| e.embedding.is_some()).cloned().collect();
    let index = ConditionalKnn::new("medium").fit(&indexable).unwrap();

    let table = QueryOrchestrator::new(&index, LabelCondition::for_values("medium", ["glass", "ceramics"]))
        .transform(artmatch::ResultTable::new(rows.clone()))
        .unwrap();
    assert!(table.columns().iter().all(|c| c.results[1].is_empty()));
    assert!(table.columns().iter().all(|c| c.results[0].len() == 1));

    let failed = QueryOrchestrator::new(&index, LabelCondition::for_values("medium", ["glass"]))
        .with_missing_embedding(MissingEmbeddingPolicy::Fail)
        .transform(artmatch::ResultTable::new(rows));
    assert!(matches!(failed, Err(artmatch::Error::MissingEmbedding(id)) if id == "broken"));

    // building over the full store is a data error
    assert!(ConditionalKnn::new("medium").fit(store.entities()).is_err());

    // a session under the default policy leaves the broken record out of its index
    let session = Session::new(store, SessionConfig::default());
    let table = session.match_conditions(&["a", "broken"], "medium", &[]).unwrap();
    assert_eq!(table.num_columns(), 2);
    assert!(table.columns().iter().all(|c| c.results[1].is_empty()));
    assert_eq!(table.cell(0, "glass").unwrap().best().unwrap().entity_id, "a");
    session.close();
}

#[tokio::test]
async fn test_full_run_exports_and_renders() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path());
    let output = dir.path().join("grid.png");
    let export = dir.path().join("matches.jsonl");

    let mut config = RunConfig {
        store: StoreSource {
            path: Some(catalog),
            schema: schema(),
            ..StoreSource::default()
        },
        queries: vec!["p1".to_string(), "c1".to_string()],
        condition: ConditionConfig {
            field: "medium".to_string(),
            values: vec!["glass".to_string(), "stone".to_string()],
        },
        matching: SessionConfig {
            values_field: Some("thumb".to_string()),
            ..SessionConfig::default()
        },
        render: RenderConfig {
            output: output.clone(),
            ..RenderConfig::default()
        },
        export: Some(export.clone()),
    };
    config.render.presenter.cell_size = 16;

    let summary = artmatch::run(&config).await.unwrap();
    assert_eq!(summary.table.num_rows(), 2);
    assert_eq!(summary.table.num_columns(), 2);
    // "stone" matches nothing: empty, not an error
    assert!(summary.table.column("stone").unwrap().results.iter().all(|r| r.is_empty()));

    let lines = std::fs::read_to_string(&export).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let report = summary.render.unwrap();
    // 2 originals + 2 glass matches render; the stone row is placeholders
    assert_eq!((report.ok, report.empty, report.failed), (4, 2, 0));
    let img = image::open(&output).unwrap();
    assert_eq!(img.width(), 2 * (16 + 8) + 8);
    assert_eq!(img.height(), 3 * (16 + 8) + 8);
    assert!(report.manifest.exists());
}
