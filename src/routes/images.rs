use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::entities::image_file;
use crate::error::{AppError, AppResult};
use crate::models::EntityType;
use crate::services::derivatives::UploadResult;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteByUrl {
    /// Public URL of any file of the upload.
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ImageFileResponse {
    pub id: Uuid,
    pub size_template: String,
    pub upload_id: String,
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub size: i64,
    pub generated_at: chrono::NaiveDateTime,
}

fn is_valid_entity_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_entity_id(id: &str) -> AppResult<()> {
    if is_valid_entity_id(id) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid entity id '{}'", id)))
    }
}

/// Removes the staged upload however the handler exits.
struct StagedUpload(PathBuf);

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "failed to remove staged upload");
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/images/{entity_type}/{entity_id}",
    tag = "Images",
    params(
        ("entity_type" = EntityType, Path, description = "Owning entity type"),
        ("entity_id" = String, Path, description = "Owning entity id")
    ),
    request_body(content = Vec<u8>, content_type = "multipart/form-data",
        description = "`file` part with the image, optional `entity_name` text part"),
    responses(
        (status = 201, description = "Original stored and derivatives generated", body = UploadResult),
        (status = 400, description = "Missing or unreadable image"),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResult>)> {
    check_entity_id(&entity_id)?;

    let mut upload: Option<(String, axum::body::Bytes)> = None;
    let mut entity_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart data: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
                upload = Some((filename, data));
            }
            Some("entity_name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid entity_name: {}", e)))?;
                entity_name = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("No file field found".to_string()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    let staging = state.derivatives.storage().root().join(".incoming");
    tokio::fs::create_dir_all(&staging).await?;
    let staged = StagedUpload(staging.join(Uuid::new_v4().to_string()));
    tokio::fs::write(&staged.0, &data).await?;

    let result = state
        .derivatives
        .generate_all_sizes(
            &staged.0,
            entity_type,
            &entity_id,
            entity_name.as_deref(),
            &filename,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/images/{entity_type}/{entity_id}",
    tag = "Images",
    params(
        ("entity_type" = EntityType, Path, description = "Owning entity type"),
        ("entity_id" = String, Path, description = "Owning entity id")
    ),
    responses(
        (status = 200, description = "Original and derivatives of the entity", body = Vec<ImageFileResponse>)
    )
)]
pub async fn list_entity_images(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> AppResult<Json<Vec<ImageFileResponse>>> {
    check_entity_id(&entity_id)?;
    let storage = state.derivatives.storage();

    let files = state
        .derivatives
        .files_for_entity(entity_type, &entity_id)
        .await?
        .into_iter()
        .map(|row: image_file::Model| {
            let url = storage
                .key_from_path(std::path::Path::new(&row.generated_path))
                .map(|key| storage.url_for(&key))
                .unwrap_or_else(|| row.generated_path.clone());
            ImageFileResponse {
                id: row.id,
                size_template: row.size_template,
                upload_id: row.upload_id,
                url,
                width: row.generated_width,
                height: row.generated_height,
                size: row.generated_size,
                generated_at: row.generated_at,
            }
        })
        .collect();

    Ok(Json(files))
}

#[utoipa::path(
    delete,
    path = "/images",
    tag = "Images",
    params(DeleteByUrl),
    responses(
        (status = 200, description = "Rows removed (0 for unknown URLs)", body = DeleteResponse)
    )
)]
pub async fn delete_image_by_url(
    State(state): State<AppState>,
    Query(query): Query<DeleteByUrl>,
) -> AppResult<Json<DeleteResponse>> {
    let deleted = state.derivatives.delete_image_by_url(&query.url).await?;
    Ok(Json(DeleteResponse { deleted }))
}

#[utoipa::path(
    delete,
    path = "/images/{entity_type}/{entity_id}",
    tag = "Images",
    params(
        ("entity_type" = EntityType, Path, description = "Owning entity type"),
        ("entity_id" = String, Path, description = "Owning entity id")
    ),
    responses(
        (status = 200, description = "Rows removed", body = DeleteResponse)
    )
)]
pub async fn delete_entity_images(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> AppResult<Json<DeleteResponse>> {
    check_entity_id(&entity_id)?;
    let deleted = state
        .derivatives
        .delete_entity_images(entity_type, &entity_id)
        .await?;
    Ok(Json(DeleteResponse { deleted }))
}
