use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

/// Longest side of a stored preview, in pixels.
pub const MAX_SIDE: u32 = 800;
pub const JPEG_QUALITY: u8 = 70;

/// Downscales `data` to fit [`MAX_SIDE`] and re-encodes it as a base64 JPEG.
/// Smaller images keep their size.
pub fn encode_thumbnail(data: &[u8]) -> Result<String, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();

    let img = if width > MAX_SIDE || height > MAX_SIDE {
        img.thumbnail(MAX_SIDE, MAX_SIDE)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut output = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY))?;

    Ok(STANDARD.encode(output))
}
