use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::EntityType;

/// Pseudo-template name of the row that tracks the stored original.
pub const ORIGINALS: &str = "originals";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "image_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub size_template: String,
    pub upload_id: String,
    pub original_filename: String,
    pub original_path: String,
    pub original_mime_type: String,
    pub original_size: i64,
    pub original_width: i32,
    pub original_height: i32,
    pub generated_path: String,
    pub generated_size: i64,
    pub generated_width: i32,
    pub generated_height: i32,
    pub generated_at: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn is_original(&self) -> bool {
        self.size_template == ORIGINALS
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
