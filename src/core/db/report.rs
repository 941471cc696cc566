use std::{fmt, future::Future, path::PathBuf, str::FromStr};

use time::OffsetDateTime;

use crate::core::db::department::Department;
use crate::models::ClassificationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportStatus {
    #[default]
    Reported,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    North,
    South,
    East,
    West,
    Central,
}

/// A citizen report. `crop` and the classifier's choice of `department_id`
/// can only be written through [`ReportRepository::apply_classification`].
#[derive(Debug, Clone)]
pub struct Report {
    pub id: i64,
    /// File name under the photo directory of the media store
    pub photo: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: ReportStatus,
    pub department_id: Option<i64>,
    /// File name under the crop directory of the media store
    pub crop: Option<String>,
    pub reason: String,
    pub remark: String,
    pub zone: Option<Zone>,
    pub ward: String,
    pub reported_on: OffsetDateTime,
    pub completed_time: Option<OffsetDateTime>,
    pub(super) _guard: (),
}

impl Report {
    pub fn location_link(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub photo_path: PathBuf,
    pub latitude: f64,
    pub longitude: f64,
    /// Caller's choice; a successful classification replaces it
    pub department_id: Option<i64>,
    pub reason: String,
    pub remark: String,
    pub zone: Option<Zone>,
    pub ward: String,
}

impl NewReport {
    pub fn new(photo_path: impl Into<PathBuf>, latitude: f64, longitude: f64) -> Self {
        Self {
            photo_path: photo_path.into(),
            latitude,
            longitude,
            department_id: None,
            reason: String::new(),
            remark: String::new(),
            zone: None,
            ward: String::new(),
        }
    }
}

/// Caller-editable fields. The crop is not settable here.
#[derive(Debug, Clone, Default)]
pub struct ReportUpdate {
    pub photo_path: Option<PathBuf>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<ReportStatus>,
    pub department_id: Option<Option<i64>>,
    pub reason: Option<String>,
    pub remark: Option<String>,
    pub zone: Option<Option<Zone>>,
    pub ward: Option<String>,
    pub completed_time: Option<Option<OffsetDateTime>>,
}

pub trait ReportRepository {
    /// Copy the photo into the media store and insert the record
    fn add_report(&self, report: &NewReport) -> impl Future<Output = anyhow::Result<Report>>;
    fn get_report(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<Report>>>;
    fn get_reports(&self) -> impl Future<Output = anyhow::Result<Vec<Report>>>;
    fn get_reports_by_department(&self, department: &Department) -> impl Future<Output = anyhow::Result<Vec<Report>>>;
    fn update_report(&self, report: &Report, update: &ReportUpdate) -> impl Future<Output = anyhow::Result<Report>>;
    /// Write a classification onto a report. `Unmatched` changes nothing;
    /// a match stores the crop and, when routed, overwrites the department.
    fn apply_classification(&self, report: &Report, outcome: &ClassificationOutcome) -> impl Future<Output = anyhow::Result<Report>>;
    fn delete_report(&self, report: Report) -> impl Future<Output = anyhow::Result<()>>;
    fn photo_path(&self, report: &Report) -> PathBuf;
    fn crop_path(&self, report: &Report) -> Option<PathBuf>;
}

impl TryFrom<i64> for ReportStatus {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReportStatus::Reported),
            1 => Ok(ReportStatus::InProgress),
            2 => Ok(ReportStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid ReportStatus value: {}", value)),
        }
    }
}

impl From<ReportStatus> for i64 {
    fn from(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Reported => 0,
            ReportStatus::InProgress => 1,
            ReportStatus::Completed => 2,
        }
    }
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Reported => "reported",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reported" => Ok(ReportStatus::Reported),
            "in_progress" => Ok(ReportStatus::InProgress),
            "completed" => Ok(ReportStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid report status: {:?}", s)),
        }
    }
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::North => "north",
            Zone::South => "south",
            Zone::East => "east",
            Zone::West => "west",
            Zone::Central => "central",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "north" => Ok(Zone::North),
            "south" => Ok(Zone::South),
            "east" => Ok(Zone::East),
            "west" => Ok(Zone::West),
            "central" => Ok(Zone::Central),
            _ => Err(anyhow::anyhow!("Invalid zone: {:?}", s)),
        }
    }
}
