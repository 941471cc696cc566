//! Integration tests for department and report persistence.
//!
//! Tests cover:
//! - Department creation, lookup and name constraints
//! - Report creation with photo copying
//! - Status transitions and completion time
//! - Cascading deletes and media cleanup

mod common;

use civicroute::core::db::{
    CivicDb, DepartmentRepository, NewDepartment, NewReport, ReportRepository, ReportStatus,
    ReportUpdate, Zone,
};
use common::*;

#[tokio::test]
async fn test_empty_store() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.get_departments().await?.is_empty());
    assert!(db.get_reports().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_department_lookup() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let departments = add_departments(&db, &["Traffic", "Sanitation"]).await;

    assert_eq!(db.get_departments().await?, departments);
    assert_eq!(
        db.find_department_by_name("Sanitation").await?,
        Some(departments[1].clone())
    );
    // Names match exactly
    assert_eq!(db.find_department_by_name("sanitation").await?, None);
    assert_eq!(
        db.get_department_by_id(departments[0].id).await?,
        Some(departments[0].clone())
    );
    Ok(())
}

#[tokio::test]
async fn test_department_name_constraints() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    add_departments(&db, &["Traffic"]).await;

    let duplicate = db
        .add_department(&NewDepartment {
            name: "Traffic".to_string(),
        })
        .await;
    assert!(duplicate.is_err());

    let blank = db
        .add_department(&NewDepartment {
            name: "   ".to_string(),
        })
        .await;
    assert!(blank.is_err());

    let too_long = db
        .add_department(&NewDepartment {
            name: "x".repeat(101),
        })
        .await;
    assert!(too_long.is_err());
    Ok(())
}

#[tokio::test]
async fn test_add_report_copies_photo() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let photo = create_test_image();

    let mut new_report = NewReport::new(photo.path(), 12.5, -7.25);
    new_report.zone = Some(Zone::Central);
    let report = db.add_report(&new_report).await?;

    assert!(report.id > 0);
    assert_eq!(report.status, ReportStatus::Reported);
    assert!(report.photo.ends_with(".png"));
    assert!(db.photo_path(&report).is_file());
    assert!(report.completed_time.is_none());
    assert_eq!(report.zone, Some(Zone::Central));
    assert_eq!(
        report.location_link(),
        "https://www.google.com/maps?q=12.5,-7.25"
    );
    Ok(())
}

#[tokio::test]
async fn test_add_report_with_missing_photo_fails() -> anyhow::Result<()> {
    let (db, temp_dir) = create_test_db().await;

    let result = db
        .add_report(&NewReport::new(temp_dir.path().join("missing.jpg"), 0.0, 0.0))
        .await;
    assert!(result.is_err());
    assert!(db.get_reports().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_completing_report_sets_completion_time() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let photo = create_test_image();
    let report = db.add_report(&NewReport::new(photo.path(), 1.0, 2.0)).await?;

    let in_progress = db
        .update_report(
            &report,
            &ReportUpdate {
                status: Some(ReportStatus::InProgress),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(in_progress.status, ReportStatus::InProgress);
    assert!(in_progress.completed_time.is_none());

    let completed = db
        .update_report(
            &in_progress,
            &ReportUpdate {
                status: Some(ReportStatus::Completed),
                remark: Some("Filled".to_string()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(completed.status, ReportStatus::Completed);
    assert_eq!(completed.remark, "Filled");
    let completed_time = completed.completed_time.expect("completion time set");
    assert!(completed_time >= completed.reported_on);
    Ok(())
}

#[tokio::test]
async fn test_update_replaces_photo() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let photo = create_test_image();
    let report = db.add_report(&NewReport::new(photo.path(), 1.0, 2.0)).await?;
    let old_photo = db.photo_path(&report);

    let replacement = create_test_image();
    let updated = db
        .update_report(
            &report,
            &ReportUpdate {
                photo_path: Some(replacement.path().to_path_buf()),
                zone: Some(Some(Zone::North)),
                ..Default::default()
            },
        )
        .await?;

    assert_ne!(updated.photo, report.photo);
    assert!(db.photo_path(&updated).is_file());
    assert!(!old_photo.exists());
    assert_eq!(updated.zone, Some(Zone::North));
    Ok(())
}

#[tokio::test]
async fn test_ward_length_constraint() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let photo = create_test_image();
    let report = db.add_report(&NewReport::new(photo.path(), 1.0, 2.0)).await?;

    let result = db
        .update_report(
            &report,
            &ReportUpdate {
                ward: Some("w".repeat(51)),
                ..Default::default()
            },
        )
        .await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_delete_department_cascades_to_reports() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let departments = add_departments(&db, &["Traffic", "Animal"]).await;
    let photo = create_test_image();

    let mut routed = NewReport::new(photo.path(), 1.0, 2.0);
    routed.department_id = Some(departments[0].id);
    let routed = db.add_report(&routed).await?;
    let mut other = NewReport::new(photo.path(), 3.0, 4.0);
    other.department_id = Some(departments[1].id);
    let other = db.add_report(&other).await?;

    let routed_photo = db.photo_path(&routed);
    db.delete_department(departments[0].clone()).await?;

    let remaining = db.get_reports().await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other.id);
    assert!(!routed_photo.exists());
    assert_eq!(db.get_reports_by_department(&departments[1]).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_report_removes_media() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let photo = create_test_image();
    let report = db.add_report(&NewReport::new(photo.path(), 1.0, 2.0)).await?;
    let photo_path = db.photo_path(&report);

    db.delete_report(report.clone()).await?;

    assert!(!photo_path.exists());
    assert!(db.get_report(report.id).await?.is_none());
    assert!(db.delete_report(report).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_store_reopens_with_data() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    {
        let db = CivicDb::open(dir.path()).await?;
        add_departments(&db, &["Traffic"]).await;
        db.close().await?;
    }

    let db = CivicDb::open(dir.path()).await?;
    let departments = db.get_departments().await?;
    assert_eq!(departments.len(), 1);
    assert_eq!(departments[0].name, "Traffic");
    Ok(())
}
