use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EntityType, FitMode, OutputFormat};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "size_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Also the directory segment derivatives are stored under.
    #[sea_orm(unique)]
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
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
