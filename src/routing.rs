use std::sync::Arc;

use crate::core::db::{Department, DepartmentRepository};
use crate::taxonomy::LabelTaxonomy;

/// Maps a recognised label to the department owning its category
#[derive(Debug, Clone)]
pub struct DepartmentResolver<D> {
    directory: D,
    taxonomy: Arc<LabelTaxonomy>,
}

impl<D: DepartmentRepository> DepartmentResolver<D> {
    pub fn new(directory: D, taxonomy: Arc<LabelTaxonomy>) -> Self {
        Self { directory, taxonomy }
    }

    pub fn taxonomy(&self) -> &LabelTaxonomy {
        &self.taxonomy
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Department for `label`, or `None` when the label is unknown, its
    /// category has no department row, or the lookup itself fails.
    pub async fn resolve(&self, label: &str) -> Option<Department> {
        let Some(category) = self.taxonomy.category_of(label) else {
            tracing::debug!("Label {:?} is not in the taxonomy", label);
            return None;
        };
        self.resolve_category(category, label).await
    }

    async fn resolve_category(&self, category: &str, label: &str) -> Option<Department> {
        match self.directory.find_department_by_name(category).await {
            Ok(Some(department)) => {
                tracing::info!(
                    "Automatically assigned department: {} for detected class: {}",
                    department.name,
                    label
                );
                Some(department)
            }
            Ok(None) => {
                tracing::warn!("Department {} not found in database.", category);
                None
            }
            Err(e) => {
                tracing::warn!("Department lookup for {} failed: {:#}", category, e);
                None
            }
        }
    }
}
