use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::size_template::{self, Entity as SizeTemplate};
use crate::error::{AppError, AppResult};
use crate::models::{EntityType, FitMode, OutputFormat};
use crate::pagination::page_and_limit;
use crate::utils::naming;

fn validate_template_name(name: &str) -> Result<(), ValidationError> {
    if naming::is_path_safe_template_name(name) {
        Ok(())
    } else {
        let mut err = ValidationError::new("path_safe");
        err.message = Some(
            "must be ASCII letters, digits, '-' or '_', start with a letter or digit and not be 'originals'"
                .into(),
        );
        Err(err)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTemplate {
    #[validate(custom(function = "validate_template_name"))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    pub entity_type: EntityType,
    #[validate(range(min = 1, max = 10000))]
    pub width: i32,
    #[validate(range(min = 1, max = 10000))]
    pub height: i32,
    pub fit_mode: FitMode,
    #[validate(range(min = 1, max = 100))]
    pub quality: i32,
    pub format: OutputFormat,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    pub entity_type: Option<EntityType>,
    #[validate(range(min = 1, max = 10000))]
    pub width: Option<i32>,
    #[validate(range(min = 1, max = 10000))]
    pub height: Option<i32>,
    pub fit_mode: Option<FitMode>,
    #[validate(range(min = 1, max = 100))]
    pub quality: Option<i32>,
    pub format: Option<OutputFormat>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TemplateFilter {
    /// Case-insensitive substring of the name or display name.
    pub search: Option<String>,
    pub entity_type: Option<EntityType>,
    pub is_active: Option<bool>,
    #[param(default = 1, minimum = 1)]
    pub page: Option<u64>,
    #[param(default = 20, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

impl TemplateFilter {
    pub fn page(&self) -> u64 {
        page_and_limit(self.page, self.limit).0
    }

    pub fn limit(&self) -> u64 {
        page_and_limit(self.page, self.limit).1
    }
}

/// Registry of named size templates.
#[derive(Clone)]
pub struct TemplateService {
    db: DatabaseConnection,
}

impl TemplateService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: &TemplateFilter) -> AppResult<(Vec<size_template::Model>, u64)> {
        let mut query = SizeTemplate::find();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(size_template::Column::Name))).like(pattern.clone()))
                    .add(Expr::expr(Func::lower(Expr::col(size_template::Column::DisplayName))).like(pattern)),
            );
        }
        if let Some(entity_type) = filter.entity_type {
            query = query.filter(size_template::Column::EntityType.eq(entity_type));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(size_template::Column::IsActive.eq(is_active));
        }

        let paginator = query
            .order_by_asc(size_template::Column::EntityType)
            .order_by_asc(size_template::Column::SortOrder)
            .order_by_asc(size_template::Column::Name)
            .paginate(&self.db, filter.limit());

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(filter.page() - 1).await?;

        Ok((items, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<size_template::Model> {
        SizeTemplate::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Size template {} not found", id)))
    }

    pub async fn get_by_name(&self, name: &str) -> AppResult<Option<size_template::Model>> {
        Ok(SizeTemplate::find()
            .filter(size_template::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    pub async fn create(&self, data: CreateTemplate) -> AppResult<size_template::Model> {
        data.validate()?;

        if self.get_by_name(&data.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Size template '{}' already exists",
                data.name
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let template = size_template::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(data.name),
            display_name: Set(data.display_name),
            entity_type: Set(data.entity_type),
            width: Set(data.width),
            height: Set(data.height),
            fit_mode: Set(data.fit_mode),
            quality: Set(data.quality),
            format: Set(data.format),
            is_active: Set(data.is_active),
            sort_order: Set(data.sort_order),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = template.insert(&self.db).await?;
        tracing::info!(template = %created.name, entity_type = %created.entity_type, "size template created");
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, data: UpdateTemplate) -> AppResult<size_template::Model> {
        data.validate()?;
        let existing = self.get_by_id(id).await?;

        if let Some(name) = data.name.as_deref() {
            validate_template_name(name).map_err(|_| {
                AppError::BadRequest(format!("Template name '{}' is not path-safe", name))
            })?;

            if name != existing.name {
                let taken = SizeTemplate::find()
                    .filter(size_template::Column::Name.eq(name))
                    .filter(size_template::Column::Id.ne(id))
                    .one(&self.db)
                    .await?
                    .is_some();
                if taken {
                    return Err(AppError::Conflict(format!(
                        "Size template '{}' already exists",
                        name
                    )));
                }
            }
        }

        let mut active = existing.into_active_model();
        if let Some(name) = data.name {
            active.name = Set(name);
        }
        if let Some(display_name) = data.display_name {
            active.display_name = Set(display_name);
        }
        if let Some(entity_type) = data.entity_type {
            active.entity_type = Set(entity_type);
        }
        if let Some(width) = data.width {
            active.width = Set(width);
        }
        if let Some(height) = data.height {
            active.height = Set(height);
        }
        if let Some(fit_mode) = data.fit_mode {
            active.fit_mode = Set(fit_mode);
        }
        if let Some(quality) = data.quality {
            active.quality = Set(quality);
        }
        if let Some(format) = data.format {
            active.format = Set(format);
        }
        if let Some(is_active) = data.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(sort_order) = data.sort_order {
            active.sort_order = Set(sort_order);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        Ok(active.update(&self.db).await?)
    }

    /// Removes the template only; derivatives already generated for it stay
    /// on disk and in `image_files`.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = SizeTemplate::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Size template {} not found", id)));
        }
        tracing::info!(%id, "size template deleted");
        Ok(())
    }

    pub async fn toggle_active(&self, id: Uuid) -> AppResult<size_template::Model> {
        let existing = self.get_by_id(id).await?;
        let is_active = !existing.is_active;

        let mut active = existing.into_active_model();
        active.is_active = Set(is_active);
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        Ok(active.update(&self.db).await?)
    }

    pub async fn active_by_entity_type(
        &self,
        entity_type: EntityType,
    ) -> AppResult<Vec<size_template::Model>> {
        Ok(SizeTemplate::find()
            .filter(size_template::Column::EntityType.eq(entity_type))
            .filter(size_template::Column::IsActive.eq(true))
            .order_by_asc(size_template::Column::SortOrder)
            .order_by_asc(size_template::Column::Name)
            .all(&self.db)
            .await?)
    }
}
