use crate::core::db::Department;

/// Axis-aligned box in source-image pixel coordinates.
/// `(x1, y1)` is the top-left corner, `(x2, y2)` the bottom-right one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from the centre format used by YOLO heads
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Integer pixel rectangle `(x, y, width, height)` clamped to an image of
    /// the given size. Coordinates are truncated like `int()` would.
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn to_pixel_rect(&self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        // `as u32` saturates: negatives and NaN become 0
        let x1 = (self.x1 as u32).min(img_width);
        let y1 = (self.y1 as u32).min(img_height);
        let x2 = (self.x2 as u32).min(img_width);
        let y2 = (self.y2 as u32).min(img_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// A single inference result
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Raw class name as reported by the model, lower-cased
    pub label: String,
    pub class_id: u32,
    /// Score in `0.0..=1.0`
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Encoded image cut out of a report photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropBlob {
    /// Generated unique name, e.g. `IMG_0042_3f9a1c07.jpg`
    pub file_name: String,
    /// JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The object the pipeline settled on for a photo.
/// Only the classifier can build one, so crop data on a report always comes
/// from a real classification.
#[derive(Debug, Clone)]
pub struct MatchedObject {
    pub crop: CropBlob,
    pub label: String,
    pub category: String,
    pub confidence: f32,
    pub(crate) _guard: (),
}

#[derive(Debug, Clone)]
pub enum ClassificationOutcome {
    /// Recognised object and a department owning its category
    Routed {
        matched: MatchedObject,
        department: Department,
    },
    /// Recognised object, but no department row carries the category name
    Unrouted { matched: MatchedObject },
    /// No usable photo, no detection, or nothing the taxonomy recognises
    Unmatched,
}

impl ClassificationOutcome {
    pub fn matched(&self) -> Option<&MatchedObject> {
        match self {
            ClassificationOutcome::Routed { matched, .. } => Some(matched),
            ClassificationOutcome::Unrouted { matched } => Some(matched),
            ClassificationOutcome::Unmatched => None,
        }
    }

    pub fn crop(&self) -> Option<&CropBlob> {
        self.matched().map(|m| &m.crop)
    }

    pub fn label(&self) -> Option<&str> {
        self.matched().map(|m| m.label.as_str())
    }

    pub fn department(&self) -> Option<&Department> {
        match self {
            ClassificationOutcome::Routed { department, .. } => Some(department),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched().is_some()
    }
}
