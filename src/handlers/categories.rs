use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    catalog::category_count_filter,
    config::MongoConfig,
    error::ApiError,
    models::{
        admin::Permission,
        category::{Category, CategoryWithCount, CreateCategoryRequest, UpdateCategoryRequest, CATEGORIES},
        product::{Product, PRODUCTS},
    },
};

use super::{collect_all, parse_object_id};

fn categories(db: &MongoConfig) -> Collection<Category> {
    db.database.collection(CATEGORIES)
}

async fn with_count(db: &MongoConfig, category: Category) -> Result<CategoryWithCount, ApiError> {
    let product_count = db
        .database
        .collection::<Product>(PRODUCTS)
        .count_documents(category_count_filter(&category.name), None)
        .await?;
    Ok(CategoryWithCount { category, product_count })
}

pub async fn list_categories(db: web::Data<MongoConfig>) -> Result<HttpResponse, ApiError> {
    debug!("Fetching categories");

    let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
    let cursor = categories(&db).find(None, options).await?;

    let mut items = Vec::new();
    for category in collect_all(cursor).await? {
        items.push(with_count(&db, category).await?);
    }

    info!("Retrieved {} categories", items.len());
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_category(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "category")?;

    let category = categories(&db)
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;

    Ok(HttpResponse::Ok().json(with_count(&db, category).await?))
}

pub async fn create_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::Categories).await?;

    let collection = categories(&db);
    let name = body.name.trim().to_string();

    if collection.find_one(doc! { "name": &name }, None).await?.is_some() {
        return Err(ApiError::BadRequest("Category already exists".to_string()));
    }

    let mut category = Category {
        id: None,
        name,
        sub_categories: body.sub_categories.clone(),
        image: body.image.clone(),
        created_at: Utc::now(),
    };

    let result = collection.insert_one(&category, None).await?;
    category.id = result.inserted_id.as_object_id();

    info!("Category created: {}", category.name);
    Ok(HttpResponse::Created().json(json!({
        "message": "Category created successfully",
        "category": category,
    })))
}

pub async fn update_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "category")?;
    body.validate()?;
    require_permission(&db, &claims, Permission::Categories).await?;

    let mut update_doc = doc! {};
    if let Some(name) = &body.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(sub_categories) = &body.sub_categories {
        update_doc.insert("subCategories", to_bson(sub_categories)?);
    }
    if let Some(image) = &body.image {
        update_doc.insert("image", image);
    }
    if update_doc.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let category = categories(&db)
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;

    info!("Category updated: {}", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Category updated successfully",
        "category": category,
    })))
}

pub async fn delete_category(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "category")?;
    require_permission(&db, &claims, Permission::Categories).await?;

    let result = categories(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Category"));
    }

    info!("Category deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Category deleted successfully" })))
}
