//! Multipart upload extraction

use super::error::{ApiError, ApiResult};
use crate::error::{BgRemovalError, Result};
use axum::body::Bytes;
use axum::extract::Multipart;
use image::DynamicImage;

/// Multipart field carrying the image file
pub const IMAGE_FIELD: &str = "image";

/// Uploaded image file, valid for one request
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    /// Read the first `image` file part from the form
    ///
    /// Parts named `image` without a filename are plain form values and are
    /// skipped like any other field.
    ///
    /// # Errors
    /// - `NoImageProvided` when no `image` file part exists
    /// - `NoFileSelected` when the file part has an empty filename
    /// - Multipart stream failures
    pub async fn from_multipart(mut multipart: Multipart) -> ApiResult<Self> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(ApiError::from_multipart)?
        {
            if field.name() != Some(IMAGE_FIELD) {
                continue;
            }
            let Some(filename) = field.file_name().map(str::to_owned) else {
                continue;
            };
            if filename.is_empty() {
                return Err(ApiError::NoFileSelected);
            }

            let content_type = field.content_type().map(str::to_owned);
            let data = field.bytes().await.map_err(ApiError::from_multipart)?;
            return Ok(Self {
                filename,
                content_type,
                data,
            });
        }

        Err(ApiError::NoImageProvided)
    }

    /// Decode the payload as a raster image
    ///
    /// # Errors
    /// - Payload is not a decodable image
    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.data).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode image from bytes: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(data: Vec<u8>) -> ImageUpload {
        ImageUpload {
            filename: "input.png".to_string(),
            content_type: Some("image/png".to_string()),
            data: Bytes::from(data),
        }
    }

    #[test]
    fn test_decode_png() {
        let mut png = Vec::new();
        image::RgbImage::new(3, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = upload(png).decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = upload(b"GIF89a but not really".to_vec()).decode().unwrap_err();
        assert!(err.to_string().contains("Failed to decode image from bytes"));
    }
}
