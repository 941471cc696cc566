use anyhow::Context;

use crate::core::db::{CivicDb, NewReport, Report, ReportRepository, ReportUpdate};
use crate::models::ClassificationOutcome;
use crate::pipeline::{Classifier, PhotoSource};

/// A saved report together with what the classifier made of its photo
#[derive(Debug, Clone)]
pub struct Submission {
    pub report: Report,
    pub outcome: ClassificationOutcome,
    /// `false` when a matched outcome could not be written to the report.
    /// `report` then still holds its crop and department from before
    /// classification.
    pub stored: bool,
}

/// Report create/update flow: save the record, classify the photo, store
/// the outcome.
///
/// Soft classification failures never fail the call. When the model cannot
/// be loaded the record has already been saved, and the returned error
/// wraps a [`crate::error::ClassifyError`].
#[derive(Debug)]
pub struct ReportIntake {
    db: CivicDb,
    classifier: Classifier<CivicDb>,
}

impl ReportIntake {
    pub fn new(db: CivicDb, classifier: Classifier<CivicDb>) -> Self {
        Self { db, classifier }
    }

    pub fn db(&self) -> &CivicDb {
        &self.db
    }

    pub fn classifier(&self) -> &Classifier<CivicDb> {
        &self.classifier
    }

    pub async fn submit(&self, report: &NewReport) -> anyhow::Result<Submission> {
        let report = self.db.add_report(report).await?;
        tracing::info!("Report {} saved", report.id);
        self.classify_and_apply(report).await
    }

    pub async fn update(&self, id: i64, update: &ReportUpdate) -> anyhow::Result<Submission> {
        let report = self.fetch(id).await?;
        let report = self.db.update_report(&report, update).await?;
        tracing::info!("Report {} updated", report.id);
        self.classify_and_apply(report).await
    }

    /// Run the pipeline again on a stored report's photo
    pub async fn reclassify(&self, id: i64) -> anyhow::Result<Submission> {
        let report = self.fetch(id).await?;
        self.classify_and_apply(report).await
    }

    async fn fetch(&self, id: i64) -> anyhow::Result<Report> {
        self.db
            .get_report(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Report {} does not exist", id))
    }

    async fn classify_and_apply(&self, report: Report) -> anyhow::Result<Submission> {
        let photo = PhotoSource::Path(self.db.photo_path(&report));
        let outcome = self
            .classifier
            .classify(&photo)
            .await
            .with_context(|| format!("Report {} was saved but could not be classified", report.id))?;

        match &outcome {
            ClassificationOutcome::Routed { matched, department } => tracing::info!(
                "Report {}: detected {} ({:.2}), routed to {}",
                report.id,
                matched.label,
                matched.confidence,
                department.name
            ),
            ClassificationOutcome::Unrouted { matched } => tracing::info!(
                "Report {}: detected {} ({:.2}) but no {} department exists",
                report.id,
                matched.label,
                matched.confidence,
                matched.category
            ),
            ClassificationOutcome::Unmatched => {
                tracing::info!("No valid detection found; department not updated.")
            }
        }

        match self.db.apply_classification(&report, &outcome).await {
            Ok(report) => Ok(Submission {
                report,
                outcome,
                stored: true,
            }),
            Err(e) => {
                tracing::warn!("Failed to store classification for report {}: {:#}", report.id, e);
                Ok(Submission {
                    report,
                    outcome,
                    stored: false,
                })
            }
        }
    }
}
