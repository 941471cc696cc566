//! Department categories and the raw detector labels filed under them.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::TaxonomyError;

/// Table shipped with the deployed detector. The model emits `pothholes`;
/// `pothhole` is accepted as well.
const STANDARD_TABLE: &[(&str, &[&str])] = &[
    ("Traffic", &["encroachment", "manholes", "pothholes", "pothhole", "crack"]),
    ("Animal", &["cattles"]),
    ("Sanitation", &["garbage", "trashcan"]),
];

/// On-disk form of one category, as an element of a JSON array:
/// `[{"category": "Traffic", "labels": ["crack", "manholes"]}, ...]`
#[derive(Debug, Clone, Deserialize)]
struct TaxonomyEntry {
    category: String,
    labels: Vec<String>,
}

/// Static category → label mapping with pairwise disjoint label sets.
///
/// Lookups are case-insensitive on the label side. Category names are kept
/// verbatim because they double as department names.
#[derive(Debug, Clone)]
pub struct LabelTaxonomy {
    categories: Vec<(String, Vec<String>)>,
    // lower-cased label -> index into `categories`
    index: HashMap<String, usize>,
}

impl LabelTaxonomy {
    /// Build and validate a taxonomy. Fails if a label shows up under two
    /// categories, if a category repeats, or if a category is empty.
    pub fn new<C, L, S>(entries: impl IntoIterator<Item = (C, L)>) -> Result<Self, TaxonomyError>
    where
        C: Into<String>,
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut categories: Vec<(String, Vec<String>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (category, labels) in entries {
            let category = category.into();
            if categories.iter().any(|(name, _)| *name == category) {
                return Err(TaxonomyError::DuplicateCategory(category));
            }
            let position = categories.len();

            let mut normalized: Vec<String> = Vec::new();
            for label in labels {
                let label = label.as_ref().trim().to_lowercase();
                if label.is_empty() || normalized.contains(&label) {
                    continue;
                }
                if let Some(&other) = index.get(&label) {
                    return Err(TaxonomyError::DuplicateLabel {
                        label,
                        first: categories[other].0.clone(),
                        second: category,
                    });
                }
                index.insert(label.clone(), position);
                normalized.push(label);
            }

            if normalized.is_empty() {
                return Err(TaxonomyError::EmptyCategory(category));
            }
            categories.push((category, normalized));
        }

        Ok(Self { categories, index })
    }

    /// The table the municipal detector was trained for
    pub fn standard() -> Self {
        Self::new(STANDARD_TABLE.iter().map(|(category, labels)| (*category, labels.iter())))
            .expect("built-in taxonomy has disjoint, non-empty categories")
    }

    /// Load a taxonomy from a JSON array of `{category, labels}` objects
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TaxonomyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<TaxonomyEntry> =
            serde_json::from_str(&raw).map_err(|source| TaxonomyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(entries.into_iter().map(|e| (e.category, e.labels)))
    }

    /// Category owning `label`, or `None` if the label is not recognised
    pub fn category_of(&self, label: &str) -> Option<&str> {
        self.index
            .get(&label.trim().to_lowercase())
            .map(|&i| self.categories[i].0.as_str())
    }

    pub fn is_recognized(&self, label: &str) -> bool {
        self.category_of(label).is_some()
    }

    /// Every recognised label, category by category in table order
    pub fn recognized_labels(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|(_, labels)| labels.iter().map(String::as_str))
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(name, labels)| (name.as_str(), labels.as_slice()))
    }

    pub fn labels_of(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, labels)| labels.as_slice())
    }
}

impl Default for LabelTaxonomy {
    fn default() -> Self {
        Self::standard()
    }
}
