#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog_image_kit::entities::size_template;
use catalog_image_kit::models::{EntityType, FitMode, OutputFormat};
use catalog_image_kit::services::derivatives::DerivativeService;
use catalog_image_kit::services::entity_names::NoEntityNames;
use catalog_image_kit::services::storage::LocalStorage;
use catalog_image_kit::services::templates::{CreateTemplate, TemplateService};
use catalog_image_kit::services::worker::Worker;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tempfile::TempDir;

pub struct TestApp {
    pub db: DatabaseConnection,
    pub dir: TempDir,
    pub templates: TemplateService,
    pub derivatives: DerivativeService,
    pub worker: Worker,
}

impl TestApp {
    pub fn storage(&self) -> &LocalStorage {
        self.derivatives.storage()
    }

    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// Writes a PNG outside the uploads root to use as an upload source.
    pub fn source_png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, png_bytes(width, height)).unwrap();
        path
    }

    pub async fn add_template(
        &self,
        name: &str,
        entity_type: EntityType,
        width: i32,
        height: i32,
        format: OutputFormat,
    ) -> size_template::Model {
        self.templates
            .create(template(name, entity_type, width, height, format))
            .await
            .unwrap()
    }
}

pub async fn setup() -> TestApp {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(dir.path().join("uploads"), "/uploads");
    let templates = TemplateService::new(db.clone());
    let derivatives = DerivativeService::new(db.clone(), storage, templates.clone());
    let worker = Worker::new(
        db.clone(),
        derivatives.clone(),
        templates.clone(),
        Arc::new(NoEntityNames),
    );

    TestApp {
        db,
        dir,
        templates,
        derivatives,
        worker,
    }
}

pub fn template(
    name: &str,
    entity_type: EntityType,
    width: i32,
    height: i32,
    format: OutputFormat,
) -> CreateTemplate {
    CreateTemplate {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        entity_type,
        width,
        height,
        fit_mode: FitMode::Inside,
        quality: 80,
        format,
        is_active: true,
        sort_order: 0,
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    }));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}
