use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Catalog object kind an image belongs to.
#[derive(
    EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "category")]
    Category,
    #[sea_orm(string_value = "brand")]
    Brand,
    #[sea_orm(string_value = "blog-post")]
    BlogPost,
}

impl EntityType {
    /// Directory under the uploads root holding this kind's images.
    pub fn folder(self) -> &'static str {
        match self {
            EntityType::Product => "products",
            EntityType::Category => "categories",
            EntityType::Brand => "brands",
            _ => "blog",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Category => "category",
            EntityType::Brand => "brand",
            EntityType::BlogPost => "blog-post",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Keep aspect ratio, fit within the box.
    #[sea_orm(string_value = "inside")]
    Inside,
    /// Fill the box, cropping the overflow.
    #[sea_orm(string_value = "cover")]
    Cover,
    /// Stretch to the box, ignoring aspect ratio.
    #[sea_orm(string_value = "fill")]
    Fill,
    /// Fit within the box and pad the rest.
    #[sea_orm(string_value = "contain")]
    Contain,
}

#[derive(
    EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[sea_orm(string_value = "webp")]
    Webp,
    #[sea_orm(string_value = "jpeg")]
    Jpeg,
    #[sea_orm(string_value = "png")]
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Everything the image processor needs to produce one derivative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
    pub fit: FitMode,
    pub quality: u8,
    pub format: OutputFormat,
}

impl From<&crate::entities::size_template::Model> for ResizeSpec {
    fn from(template: &crate::entities::size_template::Model) -> Self {
        Self {
            width: template.width.max(1) as u32,
            height: template.height.max(1) as u32,
            fit: template.fit_mode,
            quality: template.quality.clamp(1, 100) as u8,
            format: template.format,
        }
    }
}
