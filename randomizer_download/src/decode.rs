use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageFormat, RgbImage};

use std::io::Cursor;

use crate::error::Result;
use crate::FetchedImage;

/// Decode image bytes. The format is guessed from the mime type, then the URL's filename,
/// then the content itself.
pub fn open_image_bytes(bytes: &[u8], url: &str, mime_type: Option<&str>) -> Result<DynamicImage> {
    let filename = urlencoding::decode(url)
        .ok()
        .and_then(|url| randomizer_util::parse_filename(&url).ok());
    let format = mime_type
        .and_then(ImageFormat::from_mime_type)
        .or(filename.and_then(|name| ImageFormat::from_path(name).ok()));

    // 1. Decode image based on the determined format
    if let Some(format) = format {
        if let Ok(img) = ImageReader::with_format(Cursor::new(bytes), format).decode() {
            return Ok(img);
        }
    }
    // 2. If failed, decode image directly
    let img = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?.decode()?;
    Ok(img)
}

/// Decode a fetched image fully and convert it to 8-bit RGB.
pub fn decode_rgb(image: &FetchedImage) -> Result<RgbImage> {
    let img = open_image_bytes(&image.bytes, &image.url, image.mime_type.as_deref())?;
    Ok(img.to_rgb8())
}
