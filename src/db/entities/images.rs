//! Images that have been activated: measured, upscaled if small and synced
use chrono::Utc;
use sea_orm::{ActiveValue::Set, entity::prelude::*};
use serde::Serialize;

use crate::activation::Dimensions;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "images")]
/// An image blob plus what we know about its CDN copy and size
pub struct Model {
    #[sea_orm(primary_key)]
    /// db id
    pub id: i32,
    /// key of the blob in object storage
    pub object_key: String,
    /// CDN id
    pub image_key: String,
    /// pixel width of the stored blob
    pub width: i32,
    /// pixel height of the stored blob
    pub height: i32,
    /// insert time
    pub created_at: DateTime,
    /// last update time
    pub updated_at: DateTime,
}

/// relations for images
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Records an activated image with its measured size and CDN id
pub async fn insert_activated(
    db: &DatabaseConnection,
    object_key: &str,
    image_key: String,
    dimensions: Dimensions,
) -> Result<Model, DbErr> {
    let now = Utc::now().naive_utc();
    ActiveModel {
        object_key: Set(object_key.to_string()),
        image_key: Set(image_key),
        width: Set(i32::try_from(dimensions.width).unwrap_or(i32::MAX)),
        height: Set(i32::try_from(dimensions.height).unwrap_or(i32::MAX)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}
