//! Catalog entities
pub mod images;
pub mod wallpapers;
