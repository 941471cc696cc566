use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rten_tensor::NdTensor;

use crate::models::BoundingBox;

/// Grey used by YOLO letterboxing
const PAD_VALUE: u8 = 114;

/// Scale and padding applied when fitting a photo into the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl Letterbox {
    pub fn fit(src_width: u32, src_height: u32, target_size: u32) -> Self {
        let scale = (target_size as f32 / src_width.max(1) as f32)
            .min(target_size as f32 / src_height.max(1) as f32);
        let resized_width = ((src_width as f32 * scale).round() as u32).clamp(1, target_size);
        let resized_height = ((src_height as f32 * scale).round() as u32).clamp(1, target_size);

        Self {
            scale,
            pad_x: (target_size - resized_width) / 2,
            pad_y: (target_size - resized_height) / 2,
            resized_width,
            resized_height,
        }
    }

    /// Map a box from model-input space back to the source photo
    pub fn to_source(&self, bbox: BoundingBox) -> BoundingBox {
        let px = self.pad_x as f32;
        let py = self.pad_y as f32;
        BoundingBox {
            x1: (bbox.x1 - px) / self.scale,
            y1: (bbox.y1 - py) / self.scale,
            x2: (bbox.x2 - px) / self.scale,
            y2: (bbox.y2 - py) / self.scale,
        }
    }
}

/// Resize keeping aspect ratio and pad to a `target_size` square
pub fn letterbox(img: &DynamicImage, target_size: u32) -> (RgbImage, Letterbox) {
    let rgb = img.to_rgb8();
    let geometry = Letterbox::fit(rgb.width(), rgb.height(), target_size);

    let resized = imageops::resize(
        &rgb,
        geometry.resized_width,
        geometry.resized_height,
        FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, geometry.pad_x.into(), geometry.pad_y.into());

    (canvas, geometry)
}

/// NCHW float tensor with values in `[0, 1]`
pub fn to_input_tensor(img: &RgbImage) -> NdTensor<f32, 4> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }

    NdTensor::from_data([1, 3, height as usize, width as usize], data)
}
