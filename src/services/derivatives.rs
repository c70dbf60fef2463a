use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::image_file::{self, Entity as ImageFile, ORIGINALS};
use crate::entities::size_template;
use crate::error::{AppError, AppResult};
use crate::models::{EntityType, ResizeSpec};
use crate::services::entity_names::EntityNameResolver;
use crate::services::storage::LocalStorage;
use crate::services::templates::TemplateService;
use crate::utils::image_processor::{self, ImageProbe};
use crate::utils::{format_size, naming};

/// One file written by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeneratedImage {
    pub path: String,
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResult {
    pub upload_id: String,
    pub original: GeneratedImage,
    /// Keyed by template name; templates that failed are absent.
    pub derivatives: BTreeMap<String, GeneratedImage>,
}

/// Metadata of the stored original, copied onto every row of an upload.
#[derive(Debug, Clone)]
struct OriginalInfo {
    filename: String,
    path: String,
    probe: ImageProbe,
}

impl From<&image_file::Model> for OriginalInfo {
    fn from(row: &image_file::Model) -> Self {
        Self {
            filename: row.original_filename.clone(),
            path: row.original_path.clone(),
            probe: ImageProbe {
                width: row.original_width.max(0) as u32,
                height: row.original_height.max(0) as u32,
                size: row.original_size.max(0) as u64,
                mime_type: row.original_mime_type.clone(),
            },
        }
    }
}

struct SlotWrite<'a> {
    entity_type: EntityType,
    entity_id: &'a str,
    slot: &'a str,
    upload_id: &'a str,
    original: &'a OriginalInfo,
    generated_path: &'a str,
    generated: &'a ImageProbe,
}

fn is_upload_id(token: &str) -> bool {
    token.len() == 12 && token.chars().all(|c| c.is_ascii_hexdigit())
}

async fn probe_file(path: &Path) -> AppResult<ImageProbe> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || image_processor::probe(&path)).await?
}

/// Turns originals into derivative files and keeps `image_files` in step.
#[derive(Clone)]
pub struct DerivativeService {
    db: DatabaseConnection,
    storage: LocalStorage,
    templates: TemplateService,
}

impl DerivativeService {
    pub fn new(db: DatabaseConnection, storage: LocalStorage, templates: TemplateService) -> Self {
        Self {
            db,
            storage,
            templates,
        }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Writes one derivative of `source` for `template_name`. Touches the
    /// filesystem only; recording it is up to the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_image_size(
        &self,
        source: &Path,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: Option<&str>,
        template_name: &str,
        spec: &ResizeSpec,
        upload_id: &str,
    ) -> AppResult<GeneratedImage> {
        let filename = naming::derivative_filename(
            entity_id,
            entity_name,
            template_name,
            upload_id,
            spec.format.extension(),
        );
        let key = self
            .storage
            .key_for(entity_type, template_name, entity_id, &filename);
        let path = self.storage.path_for(&key);
        self.storage.ensure_parent(&path).await?;

        let data = tokio::fs::read(source).await?;
        let source_size = data.len() as u64;
        let spec = *spec;
        let started = Instant::now();

        let processed =
            tokio::task::spawn_blocking(move || image_processor::process_image(&data, &spec))
                .await??;

        tokio::fs::write(&path, &processed.data).await?;

        tracing::debug!(
            template = template_name,
            %entity_id,
            width = processed.width,
            height = processed.height,
            "generated {} in {:.2?} | {} -> {}",
            filename,
            started.elapsed(),
            format_size(source_size),
            format_size(processed.data.len() as u64),
        );

        Ok(GeneratedImage {
            path: path.display().to_string(),
            url: self.storage.url_for(&key),
            filename,
        })
    }

    /// Stores a fresh upload: the original under `originals` plus one
    /// derivative per active template of the entity type. A failing template
    /// is logged and skipped.
    pub async fn generate_all_sizes(
        &self,
        source: &Path,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: Option<&str>,
        original_filename: &str,
    ) -> AppResult<UploadResult> {
        let upload_id = naming::new_upload_id();

        let data = tokio::fs::read(source).await?;
        // The stored extension decides how the file is served; trust the bytes.
        let ext = image_processor::sniff_extension(&data)
            .map(str::to_string)
            .or_else(|| {
                Path::new(original_filename)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)
                    .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            })
            .ok_or_else(|| AppError::BadRequest("Unsupported image format".to_string()))?;

        let filename =
            naming::derivative_filename(entity_id, entity_name, ORIGINALS, &upload_id, &ext);
        let key = self.storage.key_for(entity_type, ORIGINALS, entity_id, &filename);
        let path = self.storage.path_for(&key);
        self.storage.ensure_parent(&path).await?;
        tokio::fs::write(&path, &data).await?;

        let probe = match probe_file(&path).await {
            Ok(probe) => probe,
            Err(e) => {
                self.storage.remove_file(&path).await;
                return Err(AppError::BadRequest(format!("Unreadable image: {}", e)));
            }
        };

        let original = GeneratedImage {
            path: path.display().to_string(),
            url: self.storage.url_for(&key),
            filename,
        };
        let original_info = OriginalInfo {
            filename: original_filename.to_string(),
            path: original.path.clone(),
            probe,
        };

        self.upsert_slot(SlotWrite {
            entity_type,
            entity_id,
            slot: ORIGINALS,
            upload_id: &upload_id,
            original: &original_info,
            generated_path: &original.path,
            generated: &original_info.probe,
        })
        .await?;

        let mut derivatives = BTreeMap::new();
        for template in self.templates.active_by_entity_type(entity_type).await? {
            match self
                .generate_and_record(
                    &path,
                    entity_type,
                    entity_id,
                    entity_name,
                    &template,
                    &upload_id,
                    &original_info,
                )
                .await
            {
                Ok(generated) => {
                    derivatives.insert(template.name.clone(), generated);
                }
                Err(e) => {
                    tracing::warn!(
                        template = %template.name,
                        %entity_type,
                        %entity_id,
                        error = %e,
                        "failed to generate derivative"
                    );
                }
            }
        }

        tracing::info!(
            %entity_type,
            %entity_id,
            %upload_id,
            derivatives = derivatives.len(),
            "upload stored"
        );

        Ok(UploadResult {
            upload_id,
            original,
            derivatives,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_and_record(
        &self,
        source: &Path,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: Option<&str>,
        template: &size_template::Model,
        upload_id: &str,
        original: &OriginalInfo,
    ) -> AppResult<GeneratedImage> {
        let generated = self
            .generate_image_size(
                source,
                entity_type,
                entity_id,
                entity_name,
                &template.name,
                &ResizeSpec::from(template),
                upload_id,
            )
            .await?;
        let probe = probe_file(Path::new(&generated.path)).await?;

        self.upsert_slot(SlotWrite {
            entity_type,
            entity_id,
            slot: &template.name,
            upload_id,
            original,
            generated_path: &generated.path,
            generated: &probe,
        })
        .await?;

        Ok(generated)
    }

    /// Rebuilds one template slot of an entity from its stored original,
    /// keeping the original's upload id.
    pub async fn regenerate_entity_image(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        template: &size_template::Model,
        names: &dyn EntityNameResolver,
    ) -> AppResult<GeneratedImage> {
        let entity_name = match names.entity_name(entity_type, entity_id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(%entity_type, %entity_id, error = %e, "could not resolve entity name");
                None
            }
        };

        let original_row = self
            .find_slot(entity_type, entity_id, ORIGINALS)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No original image for {} {}", entity_type, entity_id))
            })?;
        let original_path = PathBuf::from(&original_row.original_path);
        if !self.storage.exists(&original_path).await {
            return Err(AppError::NotFound(format!(
                "Original file missing: {}",
                original_row.original_path
            )));
        }

        if let Some(existing) = self.find_slot(entity_type, entity_id, &template.name).await? {
            let old = Path::new(&existing.generated_path);
            if self.storage.exists(old).await {
                self.storage.remove_file(old).await;
            }
        }

        let original = OriginalInfo::from(&original_row);
        self.generate_and_record(
            &original_path,
            entity_type,
            entity_id,
            entity_name.as_deref(),
            template,
            &original_row.upload_id,
            &original,
        )
        .await
    }

    /// Removes every file and row of the upload a URL belongs to.
    /// Returns the number of rows removed; unknown URLs are a no-op.
    pub async fn delete_image_by_url(&self, url: &str) -> AppResult<usize> {
        let key = self
            .storage
            .key_from_url(url)
            .unwrap_or_else(|| url.to_string());
        let filename = key.rsplit('/').next().unwrap_or(&key);

        let Some(upload_id) = naming::upload_id_from_filename(filename).filter(|t| is_upload_id(t))
        else {
            tracing::debug!(%url, "no upload id in url");
            return Ok(0);
        };

        // The upload id column is authoritative; the path match covers rows
        // written before the column existed.
        let rows = ImageFile::find()
            .filter(
                Condition::any()
                    .add(image_file::Column::UploadId.eq(upload_id))
                    .add(image_file::Column::GeneratedPath.contains(upload_id)),
            )
            .all(&self.db)
            .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let mut removed: HashSet<&str> = HashSet::new();
        for row in &rows {
            for path in [row.generated_path.as_str(), row.original_path.as_str()] {
                if removed.insert(path) {
                    self.storage.remove_file(Path::new(path)).await;
                }
            }
        }

        let count = self.delete_rows(&rows).await?;
        tracing::info!(%upload_id, rows = count, "deleted upload");
        Ok(count)
    }

    /// Removes all images of one entity.
    pub async fn delete_entity_images(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<usize> {
        let rows = ImageFile::find()
            .filter(image_file::Column::EntityType.eq(entity_type))
            .filter(image_file::Column::EntityId.eq(entity_id))
            .all(&self.db)
            .await?;

        let mut removed: HashSet<&str> = HashSet::new();
        for row in &rows {
            if removed.insert(row.generated_path.as_str()) {
                self.storage.remove_file(Path::new(&row.generated_path)).await;
            }
            if row.is_original() && removed.insert(row.original_path.as_str()) {
                self.storage.remove_file(Path::new(&row.original_path)).await;
            }
        }

        let count = self.delete_rows(&rows).await?;
        tracing::info!(%entity_type, %entity_id, rows = count, "deleted entity images");
        Ok(count)
    }

    pub async fn find_slot(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        slot: &str,
    ) -> AppResult<Option<image_file::Model>> {
        Ok(ImageFile::find()
            .filter(image_file::Column::EntityType.eq(entity_type))
            .filter(image_file::Column::EntityId.eq(entity_id))
            .filter(image_file::Column::SizeTemplate.eq(slot))
            .one(&self.db)
            .await?)
    }

    pub async fn files_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Vec<image_file::Model>> {
        Ok(ImageFile::find()
            .filter(image_file::Column::EntityType.eq(entity_type))
            .filter(image_file::Column::EntityId.eq(entity_id))
            .order_by_asc(image_file::Column::SizeTemplate)
            .all(&self.db)
            .await?)
    }

    /// Entities of a type that have a stored original, in id order.
    pub async fn entity_ids_with_originals(&self, entity_type: EntityType) -> AppResult<Vec<String>> {
        Ok(ImageFile::find()
            .select_only()
            .column(image_file::Column::EntityId)
            .filter(image_file::Column::EntityType.eq(entity_type))
            .filter(image_file::Column::SizeTemplate.eq(ORIGINALS))
            .distinct()
            .order_by_asc(image_file::Column::EntityId)
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }

    async fn delete_rows(&self, rows: &[image_file::Model]) -> AppResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let result = ImageFile::delete_many()
            .filter(image_file::Column::Id.is_in(ids))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected as usize)
    }

    /// Inserts or refreshes the single row of a slot. When the previous row
    /// pointed at another file, that file is removed.
    async fn upsert_slot(&self, write: SlotWrite<'_>) -> AppResult<image_file::Model> {
        let now = chrono::Utc::now().naive_utc();
        let existing = self
            .find_slot(write.entity_type, write.entity_id, write.slot)
            .await?;

        let (mut active, is_new) = match existing {
            Some(existing) => {
                if existing.generated_path != write.generated_path {
                    self.storage
                        .remove_file(Path::new(&existing.generated_path))
                        .await;
                }
                (existing.into_active_model(), false)
            }
            None => (
                image_file::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    entity_type: Set(write.entity_type),
                    entity_id: Set(write.entity_id.to_string()),
                    size_template: Set(write.slot.to_string()),
                    created_at: Set(now),
                    ..Default::default()
                },
                true,
            ),
        };

        active.upload_id = Set(write.upload_id.to_string());
        active.original_filename = Set(write.original.filename.clone());
        active.original_path = Set(write.original.path.clone());
        active.original_mime_type = Set(write.original.probe.mime_type.clone());
        active.original_size = Set(write.original.probe.size as i64);
        active.original_width = Set(write.original.probe.width as i32);
        active.original_height = Set(write.original.probe.height as i32);
        active.generated_path = Set(write.generated_path.to_string());
        active.generated_size = Set(write.generated.size as i64);
        active.generated_width = Set(write.generated.width as i32);
        active.generated_height = Set(write.generated.height as i32);
        active.generated_at = Set(now);
        active.updated_at = Set(now);

        let model = if is_new {
            active.insert(&self.db).await?
        } else {
            active.update(&self.db).await?
        };
        Ok(model)
    }
}
