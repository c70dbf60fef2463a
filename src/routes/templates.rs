use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::jobs::JobResponse;
use super::AppState;
use crate::entities::size_template;
use crate::error::{AppError, AppResult};
use crate::models::{EntityType, FitMode, OutputFormat};
use crate::pagination::PaginatedResponse;
use crate::services::templates::{CreateTemplate, TemplateFilter, UpdateTemplate};

#[derive(Serialize, ToSchema)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub entity_type: EntityType,
    pub width: i32,
    pub height: i32,
    pub fit_mode: FitMode,
    pub quality: i32,
    pub format: OutputFormat,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<size_template::Model> for TemplateResponse {
    fn from(model: size_template::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            display_name: model.display_name,
            entity_type: model.entity_type,
            width: model.width,
            height: model.height,
            fit_mode: model.fit_mode,
            quality: model.quality,
            format: model.format,
            is_active: model.is_active,
            sort_order: model.sort_order,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Optional body of a regeneration request; without ids every entity with a
/// stored original is regenerated.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/templates",
    tag = "Templates",
    params(TemplateFilter),
    responses(
        (status = 200, description = "Paginated size templates", body = PaginatedResponse<TemplateResponse>),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(filter): Query<TemplateFilter>,
) -> AppResult<Json<PaginatedResponse<TemplateResponse>>> {
    let (items, total) = state.templates.list(&filter).await?;
    let data = items.into_iter().map(TemplateResponse::from).collect();

    Ok(Json(PaginatedResponse::new(
        data,
        total,
        filter.page(),
        filter.limit(),
    )))
}

#[utoipa::path(
    post,
    path = "/templates",
    tag = "Templates",
    request_body = CreateTemplate,
    responses(
        (status = 201, description = "Template created", body = TemplateResponse),
        (status = 400, description = "Invalid template"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplate>,
) -> AppResult<(StatusCode, Json<TemplateResponse>)> {
    let created = state.templates.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template", body = TemplateResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TemplateResponse>> {
    Ok(Json(state.templates.get_by_id(id).await?.into()))
}

#[utoipa::path(
    patch,
    path = "/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template id")),
    request_body = UpdateTemplate,
    responses(
        (status = 200, description = "Template updated", body = TemplateResponse),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTemplate>,
) -> AppResult<Json<TemplateResponse>> {
    Ok(Json(state.templates.update(id, payload).await?.into()))
}

#[utoipa::path(
    delete,
    path = "/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.templates.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/templates/{id}/toggle",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template with flipped is_active", body = TemplateResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn toggle_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TemplateResponse>> {
    Ok(Json(state.templates.toggle_active(id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/templates/{id}/regenerate",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template id")),
    request_body(content = RegenerateRequest, content_type = "application/json",
        description = "Optional; an empty body regenerates every entity with an original"),
    responses(
        (status = 202, description = "Regeneration job queued", body = JobResponse),
        (status = 400, description = "Malformed body"),
        (status = 404, description = "Not found")
    )
)]
pub async fn regenerate_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let request: RegenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RegenerateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let job = if request.entity_ids.is_empty() {
        state.worker.enqueue(id).await?
    } else {
        let template = state.templates.get_by_id(id).await?;
        state
            .worker
            .enqueue_for_entities(&template.name, request.entity_ids)
            .await?
    };

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}
