//! Picking the reportable object among the detections and cutting it out.

use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

use crate::models::{CropBlob, Detection};
use crate::taxonomy::LabelTaxonomy;

/// Rule for choosing which recognised detection becomes the crop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// First recognised detection in detector output order. Later matches
    /// are ignored even when they score higher.
    #[default]
    FirstRecognized,
    /// Recognised detection with the highest confidence; earlier wins ties
    HighestConfidence,
}

impl SelectionPolicy {
    /// Index of the chosen detection
    pub fn select(&self, detections: &[Detection], taxonomy: &LabelTaxonomy) -> Option<usize> {
        let mut recognized = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| taxonomy.is_recognized(&d.label));

        match self {
            SelectionPolicy::FirstRecognized => recognized.next().map(|(i, _)| i),
            SelectionPolicy::HighestConfidence => recognized
                .fold(None::<(usize, f32)>, |best, (i, d)| match best {
                    Some((_, score)) if score >= d.confidence => best,
                    _ => Some((i, d.confidence)),
                })
                .map(|(i, _)| i),
        }
    }
}

/// Crop cut from a photo, with the detection it came from
#[derive(Debug, Clone)]
pub struct ExtractedCrop {
    pub blob: CropBlob,
    pub detection: Detection,
    /// Position of `detection` in the detector output
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CropExtractor {
    policy: SelectionPolicy,
}

impl CropExtractor {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select a detection and cut it out of `image`.
    ///
    /// The box is clamped to the photo. A box with nothing left after
    /// clamping, or a crop that fails to encode, yields `None`; no other
    /// detection is tried in that case.
    pub fn extract(
        &self,
        image: &DynamicImage,
        source_name: &str,
        detections: &[Detection],
        taxonomy: &LabelTaxonomy,
    ) -> Option<ExtractedCrop> {
        let Some(index) = self.policy.select(detections, taxonomy) else {
            tracing::info!("No matching detection found.");
            return None;
        };
        let detection = &detections[index];
        self.crop(image, source_name, detection).map(|blob| ExtractedCrop {
            blob,
            detection: detection.clone(),
            index,
        })
    }

    /// Cut one already-selected detection out of `image`
    pub fn crop(&self, image: &DynamicImage, source_name: &str, detection: &Detection) -> Option<CropBlob> {
        let Some((x, y, width, height)) = detection.bbox.to_pixel_rect(image.width(), image.height())
        else {
            tracing::warn!(
                label = %detection.label,
                bbox = ?detection.bbox,
                "Selected box lies outside the photo; no crop produced"
            );
            return None;
        };
        tracing::debug!("Cropping box coordinates: {:?}", (x, y, x + width, y + height));

        let cropped = image.crop_imm(x, y, width, height);
        match encode_jpeg(&cropped) {
            Ok(bytes) => Some(CropBlob {
                file_name: crop_file_name(source_name),
                bytes,
                width,
                height,
            }),
            Err(e) => {
                tracing::warn!("Failed to encode crop: {:#}", e);
                None
            }
        }
    }
}

/// `<stem>_<8 hex chars>.jpg`, where the stem is the photo's file name up to
/// its first dot
pub fn crop_file_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("photo");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}.jpg", stem, &suffix[..8])
}

fn encode_jpeg(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .context("JPEG encoding failed")?;
    Ok(buffer.into_inner())
}
