use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    config::MongoConfig,
    error::ApiError,
    models::{
        admin::Permission,
        blog::{Blog, BlogCategory, BlogCategoryRequest, BlogCategoryWithCount, BLOGS, BLOG_CATEGORIES},
    },
};

use super::{collect_all, parse_object_id};

fn blog_categories(db: &MongoConfig) -> Collection<BlogCategory> {
    db.database.collection(BLOG_CATEGORIES)
}

/// Matches the blog listing's category filter, published posts only.
fn published_in(name: &str) -> Document {
    doc! { "category": name, "published": true }
}

pub async fn list_blog_categories(db: web::Data<MongoConfig>) -> Result<HttpResponse, ApiError> {
    let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
    let cursor = blog_categories(&db).find(None, options).await?;
    let blog_collection = db.database.collection::<Blog>(BLOGS);

    let mut items = Vec::new();
    for category in collect_all(cursor).await? {
        let blog_count = blog_collection
            .count_documents(published_in(&category.name), None)
            .await?;
        items.push(BlogCategoryWithCount { category, blog_count });
    }

    Ok(HttpResponse::Ok().json(items))
}

pub async fn create_blog_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<BlogCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let collection = blog_categories(&db);
    let name = body.name.trim().to_string();
    if collection.find_one(doc! { "name": &name }, None).await?.is_some() {
        return Err(ApiError::BadRequest("Blog category already exists".to_string()));
    }

    let mut category = BlogCategory {
        id: None,
        name,
        created_at: Utc::now(),
    };
    let result = collection.insert_one(&category, None).await?;
    category.id = result.inserted_id.as_object_id();

    info!("Blog category created: {}", category.name);
    Ok(HttpResponse::Created().json(json!({
        "message": "Blog category created successfully",
        "category": category,
    })))
}

pub async fn update_blog_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<BlogCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "blog category")?;
    body.validate()?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let category = blog_categories(&db)
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": { "name": body.name.trim() } },
            options,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Blog category"))?;

    info!("Blog category updated: {}", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Blog category updated successfully",
        "category": category,
    })))
}

pub async fn delete_blog_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "blog category")?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let result = blog_categories(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Blog category"));
    }

    info!("Blog category deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Blog category deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_counts_skip_drafts() {
        let filter = published_in("Guides");
        assert_eq!(filter.get_str("category").unwrap(), "Guides");
        assert!(filter.get_bool("published").unwrap());
    }
}
