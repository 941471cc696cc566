use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::models::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const SELECTED_COLOR: Rgb<u8> = Rgb([0, 220, 60]);

/// Draw every detection on a copy of the photo; `selected` is highlighted
/// with a thicker box in a different colour.
pub fn draw_detections(
    image: &DynamicImage,
    detections: &[Detection],
    selected: Option<usize>,
) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for (idx, detection) in detections.iter().enumerate() {
        let Some((x, y, w, h)) = detection.bbox.to_pixel_rect(width, height) else {
            continue;
        };
        let is_selected = selected == Some(idx);
        let (color, thickness) = if is_selected {
            (SELECTED_COLOR, 3)
        } else {
            (BOX_COLOR, 1)
        };

        for t in 0..thickness {
            if w <= 2 * t || h <= 2 * t {
                break;
            }
            let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(w - 2 * t, h - 2 * t);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}
