//! Label taxonomy construction and lookups.

use civicroute::{LabelTaxonomy, TaxonomyError};

#[test]
fn test_standard_table_lookups() {
    let taxonomy = LabelTaxonomy::standard();

    assert_eq!(taxonomy.category_of("crack"), Some("Traffic"));
    assert_eq!(taxonomy.category_of("pothholes"), Some("Traffic"));
    assert_eq!(taxonomy.category_of("pothhole"), Some("Traffic"));
    assert_eq!(taxonomy.category_of("cattles"), Some("Animal"));
    assert_eq!(taxonomy.category_of("trashcan"), Some("Sanitation"));
    assert_eq!(taxonomy.category_of("bicycle"), None);
    assert!(!taxonomy.is_recognized("person"));

    let categories: Vec<&str> = taxonomy.categories().map(|(name, _)| name).collect();
    assert_eq!(categories, vec!["Traffic", "Animal", "Sanitation"]);
    assert_eq!(taxonomy.recognized_labels().count(), 8);
}

#[test]
fn test_lookup_ignores_case_and_whitespace() {
    let taxonomy = LabelTaxonomy::standard();

    assert_eq!(taxonomy.category_of("Garbage"), Some("Sanitation"));
    assert_eq!(taxonomy.category_of(" MANHOLES "), Some("Traffic"));
}

#[test]
fn test_overlapping_labels_are_rejected() {
    let result = LabelTaxonomy::new([
        ("Traffic", vec!["crack", "manholes"]),
        ("Roads", vec!["Crack"]),
    ]);

    match result {
        Err(TaxonomyError::DuplicateLabel { label, first, second }) => {
            assert_eq!(label, "crack");
            assert_eq!(first, "Traffic");
            assert_eq!(second, "Roads");
        }
        other => panic!("expected DuplicateLabel, got {:?}", other),
    }
}

#[test]
fn test_empty_and_repeated_categories_are_rejected() {
    let empty = LabelTaxonomy::new([("Traffic", vec!["crack"]), ("Parks", vec!["  "])]);
    assert!(matches!(empty, Err(TaxonomyError::EmptyCategory(name)) if name == "Parks"));

    let repeated = LabelTaxonomy::new([("Traffic", vec!["crack"]), ("Traffic", vec!["manholes"])]);
    assert!(matches!(repeated, Err(TaxonomyError::DuplicateCategory(name)) if name == "Traffic"));
}

#[test]
fn test_repeated_label_within_category_is_merged() -> anyhow::Result<()> {
    let taxonomy = LabelTaxonomy::new([("Sanitation", vec!["garbage", "Garbage", "trashcan"])])?;
    assert_eq!(
        taxonomy.labels_of("Sanitation"),
        Some(&["garbage".to_string(), "trashcan".to_string()][..])
    );
    Ok(())
}

#[test]
fn test_load_from_json_file() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("taxonomy.json");
    std::fs::write(
        &path,
        r#"[
            {"category": "Traffic", "labels": ["crack", "pothholes"]},
            {"category": "Parks", "labels": ["fallen_tree"]}
        ]"#,
    )?;

    let taxonomy = LabelTaxonomy::from_json_file(&path)?;
    assert_eq!(taxonomy.category_of("fallen_tree"), Some("Parks"));
    assert_eq!(taxonomy.category_of("garbage"), None);
    Ok(())
}

#[test]
fn test_load_from_bad_json_file() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("taxonomy.json");
    std::fs::write(&path, r#"{"Traffic": ["crack"]}"#)?;

    assert!(matches!(
        LabelTaxonomy::from_json_file(&path),
        Err(TaxonomyError::Parse { .. })
    ));
    assert!(matches!(
        LabelTaxonomy::from_json_file(dir.path().join("missing.json")),
        Err(TaxonomyError::Io { .. })
    ));
    Ok(())
}
