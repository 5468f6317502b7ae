use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

/// Fills the frame with no bars. The image is scaled to frame height; a wider result
/// is center-cropped, a narrower one is stretched horizontally to frame width.
pub fn cover_fit(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = (image.width().max(1), image.height().max(1));
    let scaled_w = ((src_w as f64 * height as f64 / src_h as f64).round() as u32).max(1);
    let scaled = imageops::resize(&image.to_rgba8(), scaled_w, height, FilterType::Lanczos3);

    if scaled_w > width {
        let x = (scaled_w - width) / 2;
        imageops::crop_imm(&scaled, x, 0, width, height).to_image()
    } else if scaled_w < width {
        imageops::resize(&scaled, width, height, FilterType::Lanczos3)
    } else {
        scaled
    }
}
