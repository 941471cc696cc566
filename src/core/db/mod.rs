mod department;
mod report;
mod state;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use sqlx::{Row, sqlite::SqliteRow};
use state::DbState;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub use department::{Department, DepartmentRepository, NewDepartment};
pub use report::{NewReport, Report, ReportRepository, ReportStatus, ReportUpdate, Zone};
pub use state::{CROP_DIR_NAME, PHOTO_DIR_NAME};

use crate::models::ClassificationOutcome;

const REPORT_COLUMNS: &str = "id, photo_fname, latitude, longitude, department_id, status, \
    reported_on, crop_fname, reason, completed_time, remark, zone, ward";

/// SQLite-backed store for departments and reports, plus the media
/// directories holding photos and crops.
#[derive(Debug, Clone)]
pub struct CivicDb {
    state: Arc<DbState>,
}

impl CivicDb {
    /// Open (or create) the store rooted at `data_dir` and apply migrations.
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::new(data_dir).await?),
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.state.data_dir()
    }

    /// Flush the write-ahead log and release the database file.
    /// The store is unusable afterwards.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

fn format_time(time: &OffsetDateTime) -> anyhow::Result<String> {
    Ok(time.format(&Rfc3339)?)
}

fn parse_time(raw: &str) -> anyhow::Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).with_context(|| format!("Invalid timestamp {:?}", raw))
}

fn report_from_row(row: &SqliteRow) -> anyhow::Result<Report> {
    let zone: Option<String> = row.try_get("zone")?;
    let completed_time: Option<String> = row.try_get("completed_time")?;
    let reported_on: String = row.try_get("reported_on")?;

    Ok(Report {
        id: row.try_get("id")?,
        photo: row.try_get("photo_fname")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        status: ReportStatus::try_from(row.try_get::<i64, _>("status")?)?,
        department_id: row.try_get("department_id")?,
        crop: row.try_get("crop_fname")?,
        reason: row.try_get("reason")?,
        remark: row.try_get("remark")?,
        zone: zone.as_deref().map(str::parse::<Zone>).transpose()?,
        ward: row.try_get("ward")?,
        reported_on: parse_time(&reported_on)?,
        completed_time: completed_time.as_deref().map(parse_time).transpose()?,
        _guard: (),
    })
}

impl DepartmentRepository for CivicDb {
    async fn add_department(&self, department: &NewDepartment) -> anyhow::Result<Department> {
        let mut conn = self.state.conn().await?;
        let name = department.name.trim();
        if name.is_empty() {
            anyhow::bail!("Department name must not be empty");
        }
        let id: i64 = sqlx::query("INSERT INTO department (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to add department {:?}", name))?
            .try_get("id")?;
        Ok(Department {
            id,
            name: name.to_string(),
        })
    }

    async fn get_departments(&self) -> anyhow::Result<Vec<Department>> {
        let mut conn = self.state.conn().await?;
        sqlx::query("SELECT id, name FROM department ORDER BY id ASC")
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| {
                Ok(Department {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn get_department_by_id(&self, id: i64) -> anyhow::Result<Option<Department>> {
        let mut conn = self.state.conn().await?;
        let row = sqlx::query("SELECT id, name FROM department WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|row| {
            Ok(Department {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn find_department_by_name(&self, name: &str) -> anyhow::Result<Option<Department>> {
        let mut conn = self.state.conn().await?;
        let row = sqlx::query("SELECT id, name FROM department WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|row| {
            Ok(Department {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn delete_department(&self, department: Department) -> anyhow::Result<()> {
        // Reports cascade with the department; their media goes with them
        let reports = self.get_reports_by_department(&department).await?;

        let mut conn = self.state.conn().await?;
        let result = sqlx::query("DELETE FROM department WHERE id = $1")
            .bind(department.id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Department {} does not exist", department.id);
        }

        for report in reports {
            self.remove_report_media(&report).await;
        }
        Ok(())
    }
}

impl CivicDb {
    async fn remove_report_media(&self, report: &Report) {
        if let Err(e) = self.state.delete_media(PHOTO_DIR_NAME, &report.photo).await {
            tracing::warn!("{:#}", e);
        }
        if let Some(crop) = &report.crop {
            if let Err(e) = self.state.delete_media(CROP_DIR_NAME, crop).await {
                tracing::warn!("{:#}", e);
            }
        }
    }

    async fn fetch_report(&self, id: i64) -> anyhow::Result<Report> {
        self.get_report(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Report {} does not exist", id))
    }
}

impl ReportRepository for CivicDb {
    async fn add_report(&self, report: &NewReport) -> anyhow::Result<Report> {
        let photo_fname = self.state.store_photo(&report.photo_path).await?;
        let reported_on = format_time(&OffsetDateTime::now_utc())?;
        let status = i64::from(ReportStatus::Reported);

        let mut conn = self.state.conn().await?;
        let sql = format!(
            "INSERT INTO report (photo_fname, latitude, longitude, department_id, status, reported_on, reason, remark, zone, ward) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            REPORT_COLUMNS
        );
        let inserted = sqlx::query(&sql)
            .bind(&photo_fname)
            .bind(report.latitude)
            .bind(report.longitude)
            .bind(report.department_id)
            .bind(status)
            .bind(&reported_on)
            .bind(&report.reason)
            .bind(&report.remark)
            .bind(report.zone.map(|z| z.as_str()))
            .bind(&report.ward)
            .fetch_one(&mut *conn)
            .await;

        match inserted {
            Ok(row) => report_from_row(&row),
            Err(e) => {
                // Don't leave an orphaned photo behind
                if let Err(cleanup) = self.state.delete_media(PHOTO_DIR_NAME, &photo_fname).await {
                    tracing::warn!("{:#}", cleanup);
                }
                Err(anyhow::Error::new(e).context("Failed to insert report"))
            }
        }
    }

    async fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("SELECT {} FROM report WHERE id = $1", REPORT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn get_reports(&self) -> anyhow::Result<Vec<Report>> {
        let mut conn = self.state.conn().await?;
        let sql = format!("SELECT {} FROM report ORDER BY id ASC", REPORT_COLUMNS);
        sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn get_reports_by_department(&self, department: &Department) -> anyhow::Result<Vec<Report>> {
        let mut conn = self.state.conn().await?;
        let sql = format!(
            "SELECT {} FROM report WHERE department_id = $1 ORDER BY id ASC",
            REPORT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(department.id)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn update_report(&self, report: &Report, update: &ReportUpdate) -> anyhow::Result<Report> {
        let current = self.fetch_report(report.id).await?;

        let new_photo = match &update.photo_path {
            Some(path) => Some(self.state.store_photo(path).await?),
            None => None,
        };
        let status = update.status.unwrap_or(current.status);
        let mut completed_time = update.completed_time.unwrap_or(current.completed_time);
        if status == ReportStatus::Completed
            && current.status != ReportStatus::Completed
            && completed_time.is_none()
        {
            completed_time = Some(OffsetDateTime::now_utc());
        }
        let completed_time = completed_time.as_ref().map(format_time).transpose()?;
        let zone = update.zone.unwrap_or(current.zone);

        let mut conn = self.state.conn().await?;
        let sql = format!(
            "UPDATE report SET photo_fname = $1, latitude = $2, longitude = $3, department_id = $4, \
             status = $5, reason = $6, remark = $7, zone = $8, ward = $9, completed_time = $10 \
             WHERE id = $11 RETURNING {}",
            REPORT_COLUMNS
        );
        let updated = sqlx::query(&sql)
            .bind(new_photo.as_deref().unwrap_or(&current.photo))
            .bind(update.latitude.unwrap_or(current.latitude))
            .bind(update.longitude.unwrap_or(current.longitude))
            .bind(update.department_id.unwrap_or(current.department_id))
            .bind(i64::from(status))
            .bind(update.reason.as_deref().unwrap_or(&current.reason))
            .bind(update.remark.as_deref().unwrap_or(&current.remark))
            .bind(zone.map(|z| z.as_str()))
            .bind(update.ward.as_deref().unwrap_or(&current.ward))
            .bind(completed_time)
            .bind(current.id)
            .fetch_one(&mut *conn)
            .await;

        let updated = match updated {
            Ok(row) => report_from_row(&row)?,
            Err(e) => {
                if let Some(fname) = &new_photo {
                    if let Err(cleanup) = self.state.delete_media(PHOTO_DIR_NAME, fname).await {
                        tracing::warn!("{:#}", cleanup);
                    }
                }
                return Err(anyhow::Error::new(e).context(format!("Failed to update report {}", current.id)));
            }
        };

        if new_photo.is_some() {
            self.state.delete_media(PHOTO_DIR_NAME, &current.photo).await?;
        }
        Ok(updated)
    }

    async fn apply_classification(
        &self,
        report: &Report,
        outcome: &ClassificationOutcome,
    ) -> anyhow::Result<Report> {
        let current = self.fetch_report(report.id).await?;
        let Some(matched) = outcome.matched() else {
            return Ok(current);
        };

        self.state.store_crop(&matched.crop).await?;
        let department_id = outcome.department().map(|d| d.id).or(current.department_id);

        let mut conn = self.state.conn().await?;
        let sql = format!(
            "UPDATE report SET crop_fname = $1, department_id = $2 WHERE id = $3 RETURNING {}",
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&matched.crop.file_name)
            .bind(department_id)
            .bind(current.id)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to store classification for report {}", current.id))?;
        let updated = report_from_row(&row)?;

        if let Some(old_crop) = current.crop.filter(|old| *old != matched.crop.file_name) {
            if let Err(e) = self.state.delete_media(CROP_DIR_NAME, &old_crop).await {
                tracing::warn!("{:#}", e);
            }
        }
        Ok(updated)
    }

    async fn delete_report(&self, report: Report) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query("DELETE FROM report WHERE id = $1")
            .bind(report.id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Report {} does not exist", report.id);
        }
        self.remove_report_media(&report).await;
        Ok(())
    }

    fn photo_path(&self, report: &Report) -> PathBuf {
        self.state.media_path(PHOTO_DIR_NAME, &report.photo)
    }

    fn crop_path(&self, report: &Report) -> Option<PathBuf> {
        report
            .crop
            .as_ref()
            .map(|crop| self.state.media_path(CROP_DIR_NAME, crop))
    }
}
