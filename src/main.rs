use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use civicroute::core::db::{
    CivicDb, DepartmentRepository, NewDepartment, NewReport, Report, ReportRepository, ReportStatus,
    ReportUpdate, Zone,
};
use civicroute::detection::annotate;
use civicroute::{
    ClassificationOutcome, Classifier, Config, PhotoSource, ReportIntake, SelectionPolicy, Submission,
};

#[derive(Parser)]
#[command(name = "civicroute")]
#[command(about = "Detect municipal issues in report photos and route them to departments")]
struct Cli {
    /// Directory holding the database and media (overrides CIVIC_DATA_DIR)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// rten model weights (overrides CIVIC_MODEL_PATH)
    #[arg(long, value_name = "FILE", global = true)]
    model: Option<PathBuf>,

    /// Class names, one per line (overrides CIVIC_LABELS_PATH)
    #[arg(long, value_name = "FILE", global = true)]
    labels: Option<PathBuf>,

    /// Minimum detection confidence (overrides CIVIC_CONFIDENCE_THRESHOLD)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a photo without saving anything
    Classify {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Save annotated detections and the crop to this directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Crop the highest-confidence recognised object instead of the first one
        #[arg(long)]
        best_match: bool,
    },
    /// Manage departments
    #[command(subcommand)]
    Department(DepartmentCommand),
    /// Submit and manage reports
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Subcommand)]
enum DepartmentCommand {
    Add { name: String },
    List,
    Remove { name: String },
}

#[derive(Subcommand)]
enum ReportCommand {
    /// Save a new report and classify its photo
    Submit {
        #[arg(value_name = "PHOTO")]
        photo: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long, default_value = "")]
        remark: String,
        /// north, south, east, west or central
        #[arg(long)]
        zone: Option<String>,
        #[arg(long, default_value = "")]
        ward: String,
        /// Department name; replaced when the photo is classified
        #[arg(long)]
        department: Option<String>,
    },
    List,
    Show { id: i64 },
    /// Change caller-owned fields and classify again
    Update {
        id: i64,
        #[arg(long)]
        photo: Option<PathBuf>,
        /// reported, in_progress or completed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        remark: Option<String>,
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        ward: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Run the classifier again on a stored report
    Reclassify { id: i64 },
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(model) = args.model {
        config.classifier.labels_path = model.with_extension("labels");
        config.classifier.model_path = model;
    }
    if let Some(labels) = args.labels {
        config.classifier.labels_path = labels;
    }
    if let Some(threshold) = args.threshold {
        config.classifier.confidence_threshold = threshold;
    }
    config.classifier.validate().map_err(|e| anyhow::anyhow!(e))?;

    let db = CivicDb::open(&config.data_dir).await?;
    let result = run(args.command, &config, &db).await;
    db.close().await?;
    result
}

async fn run(command: Command, config: &Config, db: &CivicDb) -> anyhow::Result<()> {
    match command {
        Command::Classify {
            image_path,
            debug_out,
            best_match,
        } => {
            let mut classifier = Classifier::from_config(&config.classifier, db.clone())?;
            if best_match {
                classifier = classifier.with_policy(SelectionPolicy::HighestConfidence);
            }
            classify_photo(&classifier, image_path, debug_out).await
        }
        Command::Department(command) => run_department(command, db).await,
        Command::Report(command) => {
            let classifier = Classifier::from_config(&config.classifier, db.clone())?;
            let intake = ReportIntake::new(db.clone(), classifier);
            run_report(command, &intake).await
        }
    }
}

async fn classify_photo(
    classifier: &Classifier<CivicDb>,
    image_path: PathBuf,
    debug_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(dir) = &debug_out {
        prepare_debug_dir(dir)?;
    }

    let trace = classifier.classify_traced(&PhotoSource::Path(image_path)).await?;

    println!("\n=== Detections ===");
    if trace.detections.is_empty() {
        println!("No objects detected above {:.2}.", classifier.confidence_threshold());
    }
    for (i, detection) in trace.detections.iter().enumerate() {
        let marker = if trace.selected == Some(i) { "*" } else { " " };
        let category = classifier
            .taxonomy()
            .category_of(&detection.label)
            .unwrap_or("unrecognized");
        println!(
            "{} {} [{}] confidence {:.2} at ({:.0}, {:.0}, {:.0}, {:.0})",
            marker,
            detection.label,
            category,
            detection.confidence,
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2
        );
    }

    println!("\n=== Outcome ===");
    print_outcome(&trace.outcome);

    if let (Some(dir), Some(image)) = (debug_out, trace.image.as_ref()) {
        let annotated = annotate::draw_detections(image, &trace.detections, trace.selected);
        annotated
            .save(dir.join("detections.png"))
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
        if let Some(crop) = trace.outcome.crop() {
            std::fs::write(dir.join(&crop.file_name), &crop.bytes)
                .with_context(|| format!("Failed to save crop to {:?}", dir))?;
        }
        println!("\nDebug output written to {}", dir.display());
    }
    Ok(())
}

/// The directory must be empty or non-existent
fn prepare_debug_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.exists() {
        if std::fs::read_dir(dir)?.next().is_some() {
            anyhow::bail!("Debug directory is not empty: {}", dir.display());
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn print_outcome(outcome: &ClassificationOutcome) {
    match outcome {
        ClassificationOutcome::Routed { matched, department } => {
            println!("Object:     {} ({})", matched.label, matched.category);
            println!("Crop:       {}", matched.crop.file_name);
            println!("Department: {}", department.name);
        }
        ClassificationOutcome::Unrouted { matched } => {
            println!("Object:     {} ({})", matched.label, matched.category);
            println!("Crop:       {}", matched.crop.file_name);
            println!("Department: none (no \"{}\" department)", matched.category);
        }
        ClassificationOutcome::Unmatched => println!("No recognised object; nothing to route."),
    }
}

async fn run_department(command: DepartmentCommand, db: &CivicDb) -> anyhow::Result<()> {
    match command {
        DepartmentCommand::Add { name } => {
            let department = db.add_department(&NewDepartment { name }).await?;
            println!("Added department {} ({})", department.name, department.id);
        }
        DepartmentCommand::List => {
            let departments = db.get_departments().await?;
            if departments.is_empty() {
                println!("No departments.");
            }
            for department in departments {
                println!("{:>4}  {}", department.id, department.name);
            }
        }
        DepartmentCommand::Remove { name } => {
            let department = db
                .find_department_by_name(&name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No department named {:?}", name))?;
            db.delete_department(department).await?;
            println!("Removed department {}", name);
        }
    }
    Ok(())
}

async fn run_report(command: ReportCommand, intake: &ReportIntake) -> anyhow::Result<()> {
    let db = intake.db();
    match command {
        ReportCommand::Submit {
            photo,
            lat,
            lon,
            reason,
            remark,
            zone,
            ward,
            department,
        } => {
            let department_id = match department {
                Some(name) => Some(
                    db.find_department_by_name(&name)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("No department named {:?}", name))?
                        .id,
                ),
                None => None,
            };
            let mut new_report = NewReport::new(photo, lat, lon);
            new_report.department_id = department_id;
            new_report.reason = reason;
            new_report.remark = remark;
            new_report.zone = zone.as_deref().map(str::parse::<Zone>).transpose()?;
            new_report.ward = ward;

            let submission = intake.submit(&new_report).await?;
            print_submission(db, &submission).await?;
        }
        ReportCommand::List => {
            let reports = db.get_reports().await?;
            if reports.is_empty() {
                println!("No reports.");
            }
            for report in reports {
                let department = department_name(db, &report).await?;
                println!(
                    "{:>4}  {:<11}  {:<12}  {}",
                    report.id,
                    report.status,
                    department.unwrap_or_else(|| "-".to_string()),
                    report.location_link()
                );
            }
        }
        ReportCommand::Show { id } => {
            let report = db
                .get_report(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Report {} does not exist", id))?;
            print_report(db, &report).await?;
        }
        ReportCommand::Update {
            id,
            photo,
            status,
            reason,
            remark,
            zone,
            ward,
            lat,
            lon,
        } => {
            let update = ReportUpdate {
                photo_path: photo,
                latitude: lat,
                longitude: lon,
                status: status.as_deref().map(str::parse::<ReportStatus>).transpose()?,
                reason,
                remark,
                zone: zone
                    .as_deref()
                    .map(|z| z.parse::<Zone>().map(Some))
                    .transpose()?,
                ward,
                ..Default::default()
            };
            let submission = intake.update(id, &update).await?;
            print_submission(db, &submission).await?;
        }
        ReportCommand::Reclassify { id } => {
            let submission = intake.reclassify(id).await?;
            print_submission(db, &submission).await?;
        }
        ReportCommand::Delete { id } => {
            let report = db
                .get_report(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Report {} does not exist", id))?;
            db.delete_report(report).await?;
            println!("Deleted report {}", id);
        }
    }
    Ok(())
}

async fn print_submission(db: &CivicDb, submission: &Submission) -> anyhow::Result<()> {
    print_report(db, &submission.report).await?;
    println!("\n=== Classification ===");
    print_outcome(&submission.outcome);
    if !submission.stored {
        println!("Warning: the classification could not be saved on the report.");
    }
    Ok(())
}

async fn print_report(db: &CivicDb, report: &Report) -> anyhow::Result<()> {
    println!("Report {}", report.id);
    println!("  status:      {}", report.status);
    println!("  reported on: {}", report.reported_on);
    if let Some(completed) = report.completed_time {
        println!("  completed:   {}", completed);
    }
    println!("  location:    {}", report.location_link());
    println!(
        "  department:  {}",
        department_name(db, report).await?.unwrap_or_else(|| "-".to_string())
    );
    println!("  photo:       {}", db.photo_path(report).display());
    if let Some(crop) = db.crop_path(report) {
        println!("  crop:        {}", crop.display());
    }
    if let Some(zone) = report.zone {
        println!("  zone:        {}", zone);
    }
    if !report.ward.is_empty() {
        println!("  ward:        {}", report.ward);
    }
    if !report.reason.is_empty() {
        println!("  reason:      {}", report.reason);
    }
    if !report.remark.is_empty() {
        println!("  remark:      {}", report.remark);
    }
    Ok(())
}

async fn department_name(db: &CivicDb, report: &Report) -> anyhow::Result<Option<String>> {
    Ok(match report.department_id {
        Some(id) => db.get_department_by_id(id).await?.map(|d| d.name),
        None => None,
    })
}
