mod home;
pub mod images;
pub mod jobs;
pub mod templates;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::services::derivatives::DerivativeService;
use crate::services::templates::TemplateService;
use crate::services::worker::Worker;

#[derive(Clone)]
pub struct AppState {
    pub templates: TemplateService,
    pub derivatives: DerivativeService,
    pub worker: Worker,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        home::root,
        templates::list_templates,
        templates::create_template,
        templates::get_template,
        templates::update_template,
        templates::delete_template,
        templates::toggle_template,
        templates::regenerate_template,
        jobs::list_jobs,
        jobs::get_job,
        jobs::worker_status,
        images::upload_image,
        images::list_entity_images,
        images::delete_image_by_url,
        images::delete_entity_images,
    ),
    components(
        schemas(
            crate::models::EntityType,
            crate::models::FitMode,
            crate::models::OutputFormat,
            crate::entities::regeneration_job::JobStatus,
            crate::services::templates::CreateTemplate,
            crate::services::templates::UpdateTemplate,
            crate::services::derivatives::GeneratedImage,
            crate::services::derivatives::UploadResult,
            crate::services::worker::WorkerStatus,
            templates::TemplateResponse,
            templates::RegenerateRequest,
            jobs::JobResponse,
            images::ImageFileResponse,
            images::DeleteResponse,
        )
    ),
    tags(
        (name = "General", description = "Service information"),
        (name = "Templates", description = "Size template registry"),
        (name = "Jobs", description = "Background regeneration jobs"),
        (name = "Images", description = "Uploading and deleting entity images")
    ),
    info(
        title = "Catalog Image Kit API",
        version = "0.1.0",
        description = "Image derivatives for catalog entities: size templates, uploads and background regeneration",
    )
)]
struct ApiDoc;

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let storage = state.derivatives.storage().clone();

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route(
            "/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/templates/{id}",
            get(templates::get_template)
                .patch(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/templates/{id}/toggle", post(templates::toggle_template))
        .route(
            "/templates/{id}/regenerate",
            post(templates::regenerate_template),
        )
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/worker/status", get(jobs::worker_status))
        .route("/images", axum::routing::delete(images::delete_image_by_url))
        .route(
            "/images/{entity_type}/{entity_id}",
            post(images::upload_image)
                .get(images::list_entity_images)
                .delete(images::delete_entity_images)
                .layer(DefaultBodyLimit::max(images::MAX_UPLOAD_BYTES)),
        )
        .with_state(state);

    let mut router = Router::new().merge(swagger_router).merge(app_routes);

    // Only a local prefix can be served from here; an absolute prefix points
    // at a CDN or another host.
    let prefix = storage.public_prefix();
    if prefix.starts_with('/') && prefix != "/" {
        router = router.nest_service(prefix, ServeDir::new(storage.root()));
    }

    router.layer(TraceLayer::new_for_http())
}
