pub mod admins;
pub mod blog_categories;
pub mod blogs;
pub mod categories;
pub mod contact_info;
pub mod custom_orders;
pub mod faqs;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod users;

use futures::TryStreamExt;
use mongodb::{bson::oid::ObjectId, Cursor};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

pub(crate) fn parse_object_id(id: &str, entity: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| {
        debug!("Invalid {} ID format: {}", entity, id);
        ApiError::BadRequest("Invalid ID format".to_string())
    })
}

pub(crate) async fn collect_all<T>(mut cursor: Cursor<T>) -> Result<Vec<T>, ApiError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut items = Vec::new();
    while let Some(item) = cursor.try_next().await? {
        items.push(item);
    }
    Ok(items)
}
