use std::collections::BTreeMap;

use anyhow::Result;

use crate::detection::preprocessing::Letterbox;
use crate::models::{BoundingBox, Detection};

/// Decode a YOLOv8-style head.
///
/// `data` holds a `[1, 4 + classes, boxes]` tensor in row-major order; the
/// transposed `[1, boxes, 4 + classes]` export is accepted too. Each box
/// keeps its best-scoring class if that score reaches `confidence_threshold`.
/// Boxes come back in source-photo coordinates, not yet deduplicated.
pub fn decode_predictions(
    data: &[f32],
    shape: [usize; 3],
    labels: &[String],
    confidence_threshold: f32,
    geometry: &Letterbox,
) -> Result<Vec<Detection>> {
    let [batch, dim_a, dim_b] = shape;
    if batch != 1 {
        anyhow::bail!("Expected a batch of 1, got {}", batch);
    }
    if data.len() != dim_a * dim_b {
        anyhow::bail!(
            "Output holds {} values but shape is {:?}",
            data.len(),
            shape
        );
    }

    let attrs = 4 + labels.len();
    let (num_boxes, transposed) = if dim_a == attrs {
        (dim_b, false)
    } else if dim_b == attrs {
        (dim_a, true)
    } else {
        anyhow::bail!(
            "Output shape {:?} does not fit {} classes (expected {} attributes per box)",
            shape,
            labels.len(),
            attrs
        );
    };

    let value = |attr: usize, i: usize| -> f32 {
        if transposed {
            data[i * attrs + attr]
        } else {
            data[attr * num_boxes + i]
        }
    };

    let mut detections = Vec::new();
    for i in 0..num_boxes {
        let mut best_score = f32::MIN;
        let mut best_class = 0usize;
        for class_idx in 0..labels.len() {
            let score = value(4 + class_idx, i);
            if score > best_score {
                best_score = score;
                best_class = class_idx;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let model_box = BoundingBox::from_center(value(0, i), value(1, i), value(2, i), value(3, i));
        detections.push(Detection {
            label: labels[best_class].to_lowercase(),
            class_id: best_class as u32,
            confidence: best_score,
            bbox: geometry.to_source(model_box),
        });
    }

    Ok(detections)
}

/// Per-class non-maximum suppression. The result is ordered by confidence,
/// highest first; ties keep their decode order so output is reproducible.
pub fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut class_groups: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        class_groups
            .entry(detection.class_id)
            .or_default()
            .push(detection);
    }

    let mut kept = Vec::new();
    for (_, mut group) in class_groups {
        group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..group.len() {
                if !suppressed[j] && group[i].bbox.iou(&group[j].bbox) > iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(group[i].clone());
        }
    }

    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["garbage".to_string(), "crack".to_string()]
    }

    fn identity() -> Letterbox {
        Letterbox::fit(64, 64, 64)
    }

    #[test]
    fn decodes_channel_major_output() {
        // two boxes, six attributes: cx, cy, w, h, garbage, crack
        let data = vec![
            10.0, 40.0, // cx
            10.0, 40.0, // cy
            4.0, 8.0, // w
            4.0, 8.0, // h
            0.9, 0.05, // garbage
            0.1, 0.15, // crack
        ];
        let detections = decode_predictions(&data, [1, 6, 2], &labels(), 0.2, &identity()).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "garbage");
        assert_eq!(detections[0].bbox, BoundingBox::new(8.0, 8.0, 12.0, 12.0));
    }

    #[test]
    fn decodes_transposed_output() {
        let data = vec![
            10.0, 10.0, 4.0, 4.0, 0.1, 0.7, //
            40.0, 40.0, 8.0, 8.0, 0.3, 0.0,
        ];
        let detections = decode_predictions(&data, [1, 2, 6], &labels(), 0.2, &identity()).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "crack");
        assert_eq!(detections[1].label, "garbage");
    }

    #[test]
    fn rejects_shape_that_does_not_match_labels() {
        let data = vec![0.0; 14];
        assert!(decode_predictions(&data, [1, 7, 2], &labels(), 0.2, &identity()).is_err());
    }

    #[test]
    fn nms_keeps_strongest_overlapping_box_per_class() {
        let make = |class_id: u32, confidence: f32, x: f32| Detection {
            label: format!("class_{class_id}"),
            class_id,
            confidence,
            bbox: BoundingBox::new(x, 0.0, x + 10.0, 10.0),
        };
        let kept = nms(
            vec![make(0, 0.5, 0.0), make(0, 0.8, 1.0), make(1, 0.6, 0.0), make(0, 0.3, 50.0)],
            0.45,
        );

        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.8, 0.6, 0.3]);
    }
}
