use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::entities::regeneration_job::{self, JobStatus};
use crate::error::AppResult;
use crate::models::EntityType;
use crate::pagination::{page_and_limit, PaginatedResponse};
use crate::services::worker::WorkerStatus;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    #[param(default = 1, minimum = 1)]
    pub page: Option<u64>,
    #[param(default = 20, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

#[derive(Serialize, ToSchema, Clone)]
pub struct JobResponse {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub size_template: String,
    pub entity_ids: Vec<String>,
    pub status: JobStatus,
    pub total_count: i32,
    pub processed_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<chrono::NaiveDateTime>,
    pub completed_at: Option<chrono::NaiveDateTime>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<regeneration_job::Model> for JobResponse {
    fn from(model: regeneration_job::Model) -> Self {
        Self {
            entity_ids: model.explicit_entity_ids(),
            id: model.id,
            entity_type: model.entity_type,
            size_template: model.size_template,
            status: model.status,
            total_count: model.total_count,
            processed_count: model.processed_count,
            failed_count: model.failed_count,
            error_message: model.error_message,
            started_at: model.started_at,
            completed_at: model.completed_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    params(JobFilter),
    responses(
        (status = 200, description = "Regeneration jobs, newest first", body = PaginatedResponse<JobResponse>),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> AppResult<Json<PaginatedResponse<JobResponse>>> {
    let (page, limit) = page_and_limit(filter.page, filter.limit);
    let (jobs, total) = state.worker.list_jobs(filter.status, page, limit).await?;
    let data = jobs.into_iter().map(JobResponse::from).collect();

    Ok(Json(PaginatedResponse::new(data, total, page, limit)))
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "Jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job with progress counters", body = JobResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JobResponse>> {
    Ok(Json(state.worker.get_job(id).await?.into()))
}

#[utoipa::path(
    get,
    path = "/worker/status",
    tag = "Jobs",
    responses(
        (status = 200, description = "Scheduler state and the job in flight", body = WorkerStatus)
    )
)]
pub async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatus> {
    Json(state.worker.status())
}
