// Image format and dimension probe for the raster formats on the upload
// allow-list. Header decoding goes through the image crate; pixel content
// is never decoded here, extraction is delegated to the vision model.

use std::io::Cursor;

use image::ImageReader;

use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
        }
    }
}

pub fn probe(bytes: &[u8]) -> AppResult<(ImageFormat, ImageDimensions)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Processing(format!("Failed to read image: {}", e)))?;

    // Only the formats on the upload allow-list are accepted, even when
    // the sniffer recognizes something else
    let format = match reader.format() {
        Some(image::ImageFormat::Png) => ImageFormat::Png,
        Some(image::ImageFormat::Jpeg) => ImageFormat::Jpeg,
        _ => {
            return Err(AppError::Processing(
                "Unrecognized image format".to_string(),
            ))
        }
    };

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| AppError::Processing(format!("Failed to read image dimensions: {}", e)))?;

    Ok((format, ImageDimensions { width, height }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(
                &vec![0u8; (width * height * 3) as usize],
                width,
                height,
                ExtendedColorType::Rgb8,
            )
            .unwrap();
        out
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .write_image(
                &vec![0u8; (width * height * 3) as usize],
                width,
                height,
                ExtendedColorType::Rgb8,
            )
            .unwrap();
        out
    }

    #[test]
    fn test_png_probe() {
        let (format, dims) = probe(&png_bytes(640, 480)).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(dims, ImageDimensions { width: 640, height: 480 });
    }

    #[test]
    fn test_jpeg_probe() {
        let (format, dims) = probe(&jpeg_bytes(64, 48)).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!(dims, ImageDimensions { width: 64, height: 48 });
    }

    #[test]
    fn test_jpeg_fill_byte_before_frame_header() {
        // JPEG permits any number of 0xFF fill bytes ahead of a marker;
        // such files must still report their dimensions
        let mut bytes = jpeg_bytes(48, 64);
        let sof = bytes
            .windows(2)
            .position(|pair| pair == [0xFF, 0xC0])
            .expect("encoder output has a baseline frame header");
        bytes.insert(sof, 0xFF);

        let (format, dims) = probe(&bytes).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!(dims, ImageDimensions { width: 48, height: 64 });
    }

    #[test]
    fn test_disallowed_formats_rejected() {
        // GIF sniffs as a known format but is not on the allow-list
        assert!(probe(b"GIF89a......").is_err());
        assert!(probe(&[]).is_err());
        assert!(probe(b"not an image at all").is_err());
    }
}
