use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use std::path::Path;

use super::{ApiPath, ApiQuery};
use crate::{
    AppState,
    auth::{AuthUser, authorize_owner},
    error::{ApiError, ApiResult, Envelope},
    models::{PageFilter, PageRequest, Pagination, PhotoPage, UploadResponse},
    storage::sanitize_key,
};

/// Largest accepted image, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const UPLOAD_FIELD: &str = "image";
const UPLOAD_PREFIX: &str = "items";

/// Builds a collision-free stored name that keeps a sane extension.
fn stored_filename(original_name: &str, content_type: &str) -> String {
    let from_name = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let from_type = content_type
        .strip_prefix("image/")
        .map(|subtype| match subtype {
            "jpeg" => "jpg".to_string(),
            other => other.to_ascii_lowercase(),
        });

    let extension = from_name
        .into_iter()
        .chain(from_type)
        .find(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "img".to_string());

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "image-{}-{}.{extension}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..12]
    )
}

/// upload_photo
///
/// [Public Route] Accepts one multipart field named `image` (image/* only, at most
/// 5 MiB) and returns the URL to reference from an item.
#[utoipa::path(
    post,
    path = "/api/photos/upload",
    request_body(content_type = "multipart/form-data", description = "Field `image`: the file"),
    responses(
        (status = 200, description = "Stored", body = UploadResponse),
        (status = 400, description = "Missing field, wrong type or too large")
    )
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Envelope<UploadResponse>>> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::BadRequest("only image files can be uploaded".to_string()));
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();

        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::BadRequest("image must not exceed 5 MiB".to_string()));
        }

        let filename = stored_filename(&original_name, &content_type);
        let size = data.len();
        let url = state
            .storage
            .store(&format!("{UPLOAD_PREFIX}/{filename}"), &content_type, data)
            .await?;

        tracing::info!(%url, size, "image uploaded");
        return Ok(Json(
            Envelope::ok(UploadResponse {
                url,
                filename,
                original_name,
                size,
            })
            .with_message("image uploaded"),
        ));
    }

    Err(ApiError::BadRequest(format!(
        "multipart field `{UPLOAD_FIELD}` is required"
    )))
}

/// delete_photo
///
/// [Authenticated Route] Removes a stored image and every photo row pointing at it.
/// When the image is attached to items, the caller must own all of them (or be an
/// administrator). An image not yet attached to any item has no owner to protect.
#[utoipa::path(
    delete,
    path = "/api/photos/{filename}",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Attached to someone else's item"),
        (status = 404, description = "No such image")
    )
)]
pub async fn delete_photo(
    user: AuthUser,
    State(state): State<AppState>,
    ApiPath(filename): ApiPath<String>,
) -> ApiResult<Json<Envelope<()>>> {
    if filename.contains('/') || sanitize_key(&filename) != filename {
        return Err(ApiError::BadRequest("invalid file name".to_string()));
    }

    let key = format!("{UPLOAD_PREFIX}/{filename}");
    let url = state.storage.url_for(&key);

    let attached = state.repo.get_photos_by_url(&url).await?;
    for photo in &attached {
        authorize_owner(&user, photo)?;
    }

    let file_removed = state.storage.delete(&key).await?;
    let rows_removed = state.repo.delete_photos_by_url(&url).await?;
    if !file_removed && rows_removed == 0 {
        return Err(ApiError::NotFound("photo"));
    }

    tracing::info!(%url, rows_removed, file_removed, actor = user.id, "photo deleted");
    Ok(Json(Envelope::done("photo deleted")))
}

/// list_photos
///
/// [Admin Route] Every stored photo row with its item's title, newest first.
#[utoipa::path(
    get,
    path = "/api/photos",
    params(PageFilter),
    responses(
        (status = 200, description = "One page of photos", body = PhotoPage),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn list_photos(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PageFilter>,
) -> ApiResult<Json<Envelope<PhotoPage>>> {
    let page = PageRequest::new(filter.page, filter.limit, 20);
    let (photos, total) = state.repo.list_photos(page).await?;
    Ok(Json(Envelope::ok(PhotoPage {
        photos,
        pagination: Pagination::new(page, total),
    })))
}
