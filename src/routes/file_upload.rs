use data_encoding::BASE64;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::guards::AuthUser;
use crate::utils::{ApiError, ApiResponse};

pub const UPLOAD_DIR: &str = "uploads/images";
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct Base64UploadRequest {
    pub filename: String,
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UploadedImage {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

fn image_extension_from_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "webp" => Some("webp"),
        _ => None,
    }
}

fn image_extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn unique_name(extension: &str) -> String {
    format!("{}_{}.{}", Uuid::new_v4(), chrono::Utc::now().timestamp(), extension)
}

fn check_size(size: u64) -> Result<(), ApiError> {
    if size == 0 {
        return Err(ApiError::bad_request("No file uploaded"));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(ApiError::bad_request("File size exceeds 10MB limit"));
    }
    Ok(())
}

async fn ensure_dir() -> Result<(), ApiError> {
    fs::create_dir_all(UPLOAD_DIR).await.map_err(|e| {
        log::error!("Failed to create upload directory: {}", e);
        ApiError::internal_error("Failed to store file")
    })
}

/// Accepts a raw image body; the type comes from the content type or file name.
#[openapi(tag = "File Upload")]
#[post("/upload/image", data = "<file>")]
pub async fn upload_image(
    user: AuthUser,
    mut file: TempFile<'_>,
) -> Result<Json<ApiResponse<UploadedImage>>, ApiError> {
    let extension = file
        .content_type()
        .and_then(|ct| image_extension_from_mime(&ct.media_type().to_string()))
        .or_else(|| file.name().and_then(image_extension_from_name))
        .ok_or_else(|| ApiError::bad_request("Only image files (JPEG, PNG, WebP) are allowed"))?;

    let size = file.len();
    check_size(size)?;
    ensure_dir().await?;

    let filename = unique_name(extension);
    let path = format!("{}/{}", UPLOAD_DIR, filename);
    file.persist_to(&path).await.map_err(|e| {
        log::error!("Failed to persist upload {}: {}", path, e);
        ApiError::internal_error("Failed to store file")
    })?;
    log::info!("Image uploaded by {}: {} ({} bytes)", user.id, path, size);

    Ok(Json(ApiResponse::success_with_message(
        "Image uploaded successfully",
        UploadedImage {
            url: format!("/{}", path),
            filename,
            size,
        },
    )))
}

#[openapi(tag = "File Upload")]
#[post("/upload/image-base64", data = "<request>")]
pub async fn upload_image_base64(
    user: AuthUser,
    request: Json<Base64UploadRequest>,
) -> Result<Json<ApiResponse<UploadedImage>>, ApiError> {
    let extension = image_extension_from_mime(&request.mime_type).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Invalid MIME type: {}. Allowed: image/jpeg, image/png, image/webp",
            request.mime_type
        ))
    })?;

    // Data URLs carry a "data:image/png;base64," prefix.
    let encoded = request
        .data
        .split_once(',')
        .map_or(request.data.as_str(), |(_, data)| data)
        .trim();
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| ApiError::bad_request("Invalid base64 data"))?;

    let size = bytes.len() as u64;
    check_size(size)?;
    ensure_dir().await?;

    let filename = unique_name(extension);
    let path = format!("{}/{}", UPLOAD_DIR, filename);
    fs::write(&path, &bytes).await.map_err(|e| {
        log::error!("Failed to write upload {}: {}", path, e);
        ApiError::internal_error("Failed to store file")
    })?;
    log::info!("Image uploaded by {} ({}): {} ({} bytes)", user.id, request.filename, path, size);

    Ok(Json(ApiResponse::success_with_message(
        "Image uploaded successfully",
        UploadedImage {
            url: format!("/{}", path),
            filename,
            size,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_jpeg_png_and_webp_are_accepted() {
        assert_eq!(image_extension_from_name("photo.JPEG"), Some("jpg"));
        assert_eq!(image_extension_from_name("after.webp"), Some("webp"));
        assert_eq!(image_extension_from_name("scan.pdf"), None);
        assert_eq!(image_extension_from_name("noext"), None);

        assert_eq!(image_extension_from_mime("image/png"), Some("png"));
        assert_eq!(image_extension_from_mime("image/gif"), None);
    }

    #[test]
    fn size_is_capped_at_ten_megabytes() {
        assert!(check_size(MAX_IMAGE_BYTES).is_ok());
        assert_eq!(
            check_size(MAX_IMAGE_BYTES + 1).unwrap_err().message,
            "File size exceeds 10MB limit"
        );
        assert!(check_size(0).is_err());
    }

    #[test]
    fn generated_names_keep_the_extension() {
        let a = unique_name("png");
        let b = unique_name("png");
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
    }

    #[test]
    fn json_limit_fits_a_full_size_base64_image() {
        let limits: rocket::data::Limits = rocket::Config::figment().extract_inner("limits").unwrap();
        let json = limits.get("json").unwrap().as_u64();
        // Base64 grows the payload by 4/3, plus room for the other fields.
        let encoded = MAX_IMAGE_BYTES.div_ceil(3) * 4;
        assert!(json > encoded, "json limit {} < {}", json, encoded);
    }
}
