use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection};

use crate::error::AppResult;
use crate::models::EntityType;

/// Looks up the human readable name used to slug derivative filenames.
///
/// The catalog tables belong to the CRUD side of the shop; the pipeline only
/// ever reads a display name from them.
#[async_trait]
pub trait EntityNameResolver: Send + Sync {
    async fn entity_name(&self, entity_type: EntityType, entity_id: &str)
        -> AppResult<Option<String>>;
}

/// Resolver that never knows a name; filenames fall back to the entity id.
pub struct NoEntityNames;

#[async_trait]
impl EntityNameResolver for NoEntityNames {
    async fn entity_name(&self, _: EntityType, _: &str) -> AppResult<Option<String>> {
        Ok(None)
    }
}

/// Reads names straight from the catalog tables.
pub struct CatalogEntityNames {
    db: DatabaseConnection,
    /// entity type -> (table, name column)
    sources: HashMap<EntityType, (String, String)>,
}

impl CatalogEntityNames {
    pub fn new(db: DatabaseConnection) -> Self {
        let sources = [
            (EntityType::Product, ("products", "name")),
            (EntityType::Category, ("categories", "name")),
            (EntityType::Brand, ("brands", "name")),
            (EntityType::BlogPost, ("blog_posts", "title")),
        ]
        .into_iter()
        .map(|(entity_type, (table, column))| (entity_type, (table.to_string(), column.to_string())))
        .collect();

        Self { db, sources }
    }

    pub fn with_source(mut self, entity_type: EntityType, table: &str, column: &str) -> Self {
        self.sources
            .insert(entity_type, (table.to_string(), column.to_string()));
        self
    }
}

#[async_trait]
impl EntityNameResolver for CatalogEntityNames {
    async fn entity_name(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Option<String>> {
        let Some((table, column)) = self.sources.get(&entity_type) else {
            return Ok(None);
        };

        let select = Query::select()
            .column(Alias::new(column.as_str()))
            .from(Alias::new(table.as_str()))
            .and_where(
                Expr::expr(Expr::col(Alias::new("id")).cast_as(Alias::new("text"))).eq(entity_id),
            )
            .limit(1)
            .to_owned();

        let backend = self.db.get_database_backend();
        let row = self.db.query_one(backend.build(&select)).await?;

        Ok(match row {
            Some(row) => row.try_get::<Option<String>>("", column)?,
            None => None,
        })
    }
}
