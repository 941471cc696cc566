//! Label to department resolution.

mod common;

use std::sync::Arc;

use civicroute::{
    ClassificationOutcome, Classifier, DepartmentResolver, Detector, LabelTaxonomy, PhotoSource,
};
use common::*;

#[tokio::test]
async fn test_resolve_label_to_department() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let departments = add_departments(&db, &["Traffic", "Animal"]).await;
    let resolver = DepartmentResolver::new(db.clone(), Arc::new(LabelTaxonomy::standard()));

    assert_eq!(resolver.resolve("manholes").await, Some(departments[0].clone()));
    assert_eq!(resolver.resolve("Cattles").await, Some(departments[1].clone()));
    Ok(())
}

#[tokio::test]
async fn test_resolve_unknown_label() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    add_departments(&db, &["Traffic"]).await;
    let resolver = DepartmentResolver::new(db.clone(), Arc::new(LabelTaxonomy::standard()));

    assert_eq!(resolver.resolve("bicycle").await, None);
    Ok(())
}

#[tokio::test]
async fn test_resolve_category_without_department_row() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    add_departments(&db, &["Traffic"]).await;
    let resolver = DepartmentResolver::new(db.clone(), Arc::new(LabelTaxonomy::standard()));

    assert_eq!(resolver.resolve("garbage").await, None);
    Ok(())
}

#[tokio::test]
async fn test_lookup_failure_resolves_to_nothing() -> anyhow::Result<()> {
    let resolver = DepartmentResolver::new(UnreachableDirectory, Arc::new(LabelTaxonomy::standard()));

    assert_eq!(resolver.resolve("crack").await, None);
    Ok(())
}

#[tokio::test]
async fn test_lookup_failure_leaves_match_unrouted() -> anyhow::Result<()> {
    let loader = ScriptedLoader::new(Arc::new(ScriptedModel::returning(vec![make_detection(
        "crack",
        0.6,
        (10.0, 10.0, 40.0, 40.0),
    )])));
    let classifier = Classifier::new(
        Arc::new(Detector::new(loader)),
        Arc::new(LabelTaxonomy::standard()),
        UnreachableDirectory,
    );

    let outcome = classifier
        .classify(&PhotoSource::Bytes {
            name: "IMG_0042.png".to_string(),
            bytes: test_image_bytes(),
        })
        .await?;

    match &outcome {
        ClassificationOutcome::Unrouted { matched } => {
            assert_eq!(matched.label, "crack");
            assert_eq!(matched.category, "Traffic");
        }
        other => panic!("expected Unrouted, got {:?}", other),
    }
    Ok(())
}
