//! Generated wallpapers and the catalog that records them
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveValue::Set, FromJsonQueryResult, entity::prelude::*};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::Catalog;
use crate::error::WallpaperError;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "wallpapers")]
/// A wallpaper whose full size blob and CDN copy both exist
pub struct Model {
    #[sea_orm(primary_key)]
    /// db id
    pub id: i32,
    /// collection the wallpaper was filed under, managed outside the pipeline
    pub collection_id: Option<String>,
    /// key of the full resolution blob in object storage
    pub object_key: String,
    /// id of the ingested copy on the image CDN
    pub image_key: String,
    #[sea_orm(column_type = "Json")]
    /// how the wallpaper was generated
    pub input: WallpaperInput,
    /// insert time
    pub created_at: DateTime,
    /// last update time
    pub updated_at: DateTime,
}

/// Provenance for a generated wallpaper
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct WallpaperInput {
    /// generator label, eg `dall-e`
    pub engine: String,
    /// the generator's revised prompt
    pub prompt: String,
    /// art styles suggested with the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Vec<String>>,
    /// tags suggested with the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// dominant colours suggested with the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
}

/// relations for wallpapers
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Everything needed to insert a wallpaper row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewWallpaper {
    /// key of the stored blob
    pub object_key: String,
    /// id of the CDN copy
    pub image_key: String,
    /// provenance block
    pub input: WallpaperInput,
}

/// [`Catalog`] backed by the wallpapers table
#[derive(Clone, Debug)]
pub struct SeaOrmCatalog {
    db: DatabaseConnection,
}

impl SeaOrmCatalog {
    /// Wraps an open connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for SeaOrmCatalog {
    async fn insert(&self, wallpaper: NewWallpaper) -> Result<Model, WallpaperError> {
        let now = Utc::now().naive_utc();
        let active = ActiveModel {
            collection_id: Set(None),
            object_key: Set(wallpaper.object_key),
            image_key: Set(wallpaper.image_key),
            input: Set(wallpaper.input),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(&self.db).await?;
        debug!(id = model.id, "wallpaper row inserted");
        Ok(model)
    }
}
