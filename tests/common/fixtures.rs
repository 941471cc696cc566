use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use civicroute::core::db::{CivicDb, Department, DepartmentRepository, NewDepartment};
use civicroute::{
    BoundingBox, Classifier, ClassifyError, Detection, DetectionModel, Detector, LabelTaxonomy,
    ModelLoader,
};
use image::{DynamicImage, ImageBuffer, Rgb};
use tempfile::NamedTempFile;

pub const TEST_IMAGE_SIZE: u32 = 100;

/// Creates a 100x100 test image with a gradient, so crops of different
/// regions differ. The file is removed when dropped.
pub fn create_test_image() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .prefix("IMG_0042.")
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    test_image()
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

pub fn test_image() -> DynamicImage {
    let img = ImageBuffer::from_fn(TEST_IMAGE_SIZE, TEST_IMAGE_SIZE, |x, y| {
        Rgb([(x * 2) as u8, (y * 2) as u8, 128u8])
    });
    DynamicImage::ImageRgb8(img)
}

/// PNG bytes of [`test_image`]
pub fn test_image_bytes() -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    test_image()
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

/// Creates a CivicDb in a temporary directory.
/// Returns both the store and the temp directory (which must be kept alive).
pub async fn create_test_db() -> (CivicDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = CivicDb::open(dir.path())
        .await
        .expect("Failed to create test database");
    (db, dir)
}

pub async fn add_departments(db: &CivicDb, names: &[&str]) -> Vec<Department> {
    let mut departments = Vec::new();
    for name in names {
        departments.push(
            db.add_department(&NewDepartment {
                name: name.to_string(),
            })
            .await
            .expect("Failed to add department"),
        );
    }
    departments
}

pub fn make_detection(label: &str, confidence: f32, bbox: (f32, f32, f32, f32)) -> Detection {
    Detection {
        label: label.to_string(),
        class_id: 0,
        confidence,
        bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
    }
}

/// Detection model returning a fixed list of detections
#[derive(Debug, Default)]
pub struct ScriptedModel {
    detections: Vec<Detection>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn returning(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Default::default()
        }
    }

    /// Every inference fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Inference blocks for `delay` before answering
    pub fn slow(detections: Vec<Detection>, delay: Duration) -> Self {
        Self {
            detections,
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionModel for ScriptedModel {
    fn infer(&self, _image: &DynamicImage, _threshold: f32) -> anyhow::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            anyhow::bail!("scripted inference failure");
        }
        Ok(self.detections.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Clone)]
enum LoadBehaviour {
    Model(Arc<ScriptedModel>),
    MissingWeights,
    Panic,
}

/// Loader handing out a [`ScriptedModel`] and counting how often it ran
#[derive(Clone)]
pub struct ScriptedLoader {
    behaviour: LoadBehaviour,
    loads: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(model: Arc<ScriptedModel>) -> Self {
        Self::with_behaviour(LoadBehaviour::Model(model))
    }

    /// Every load fails as if the weights were missing
    pub fn broken() -> Self {
        Self::with_behaviour(LoadBehaviour::MissingWeights)
    }

    /// Every load panics, like a parser choking on corrupt weights
    pub fn panicking() -> Self {
        Self::with_behaviour(LoadBehaviour::Panic)
    }

    fn with_behaviour(behaviour: LoadBehaviour) -> Self {
        Self {
            behaviour,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self) -> Result<Arc<dyn DetectionModel>, ClassifyError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Slow enough that concurrent first callers overlap
        std::thread::sleep(Duration::from_millis(20));
        match &self.behaviour {
            LoadBehaviour::Model(model) => Ok(Arc::clone(model) as Arc<dyn DetectionModel>),
            LoadBehaviour::MissingWeights => Err(ClassifyError::ModelLoad {
                path: "missing.rten".into(),
                reason: "model weights not found".to_string(),
            }),
            LoadBehaviour::Panic => panic!("corrupt weights"),
        }
    }
}

/// Classifier over the standard taxonomy with a scripted model.
/// Returns the loader too, for load counting.
pub fn scripted_classifier(db: &CivicDb, detections: Vec<Detection>) -> (Classifier<CivicDb>, ScriptedLoader) {
    let loader = ScriptedLoader::new(Arc::new(ScriptedModel::returning(detections)));
    let classifier = classifier_with_loader(db, loader.clone());
    (classifier, loader)
}

pub fn classifier_with_loader(db: &CivicDb, loader: ScriptedLoader) -> Classifier<CivicDb> {
    Classifier::new(
        Arc::new(Detector::new(loader)),
        Arc::new(LabelTaxonomy::standard()),
        db.clone(),
    )
}

/// Department directory whose storage is down
#[derive(Debug, Clone, Default)]
pub struct UnreachableDirectory;

impl DepartmentRepository for UnreachableDirectory {
    async fn add_department(&self, _department: &NewDepartment) -> anyhow::Result<Department> {
        anyhow::bail!("department store unreachable")
    }

    async fn get_departments(&self) -> anyhow::Result<Vec<Department>> {
        anyhow::bail!("department store unreachable")
    }

    async fn get_department_by_id(&self, _id: i64) -> anyhow::Result<Option<Department>> {
        anyhow::bail!("department store unreachable")
    }

    async fn find_department_by_name(&self, _name: &str) -> anyhow::Result<Option<Department>> {
        anyhow::bail!("department store unreachable")
    }

    async fn delete_department(&self, _department: Department) -> anyhow::Result<()> {
        anyhow::bail!("department store unreachable")
    }
}
