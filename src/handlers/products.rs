use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson, Bson},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    catalog::{build_filter, related_filter, sort_document, ProductQuery, RELATED_LIMIT},
    config::MongoConfig,
    error::ApiError,
    models::{
        admin::Permission,
        product::{CreateProductRequest, Product, Review, ReviewRequest, UpdateProductRequest, PRODUCTS},
        user::{User, USERS},
    },
};

use super::{collect_all, parse_object_id};

fn products(db: &MongoConfig) -> Collection<Product> {
    db.database.collection(PRODUCTS)
}

pub async fn list_products(
    db: web::Data<MongoConfig>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, ApiError> {
    query.check()?;

    let filter = build_filter(&query);
    let pagination = query.pagination();
    debug!("Listing products with filter {:?}", filter);

    let collection = products(&db);
    let total = collection.count_documents(filter.clone(), None).await?;
    let cursor = collection
        .find(filter, pagination.find_options(sort_document(query.sort)))
        .await?;
    let items = collect_all(cursor).await?;

    info!("Retrieved {} of {} products", items.len(), total);
    Ok(HttpResponse::Ok().json(pagination.page_of(items, total)))
}

pub async fn get_product(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "product")?;

    debug!("Fetching product with ID: {}", id);
    let product = products(&db)
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    Ok(HttpResponse::Ok().json(product))
}

pub async fn related_products(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "product")?;
    let collection = products(&db);

    let product = collection
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .limit(RELATED_LIMIT)
        .build();
    let cursor = collection
        .find(related_filter(object_id, &product.category), options)
        .await?;
    let related = collect_all(cursor).await?;

    Ok(HttpResponse::Ok().json(related))
}

fn distinct_strings(values: Vec<Bson>) -> Vec<String> {
    let mut strings: Vec<String> = values
        .into_iter()
        .filter_map(|value| match value {
            Bson::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();
    strings.sort();
    strings
}

/// Distinct values the storefront offers as filter options.
pub async fn product_facets(db: web::Data<MongoConfig>) -> Result<HttpResponse, ApiError> {
    let collection = products(&db);

    let categories = collection.distinct("category", None, None).await?;
    let colors = collection.distinct("variants.color", None, None).await?;
    let sizes = collection.distinct("variants.sizes", None, None).await?;

    Ok(HttpResponse::Ok().json(json!({
        "categories": distinct_strings(categories),
        "colors": distinct_strings(colors),
        "sizes": distinct_strings(sizes),
    })))
}

pub async fn create_product(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::Products).await?;

    debug!("Creating new product: {:?}", body);
    let mut product = body.into_inner().into_product();

    let result = products(&db).insert_one(&product, None).await?;
    product.id = result.inserted_id.as_object_id();

    info!("Product created successfully with ID: {}", result.inserted_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "Product created successfully",
        "product": product,
    })))
}

pub async fn update_product(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "product")?;
    body.validate()?;
    require_permission(&db, &claims, Permission::Products).await?;

    debug!("Updating product {}: {:?}", id, body);
    let collection = products(&db);
    let filter = doc! { "_id": object_id };

    // finalPrice depends on both fields, so read whichever one is not changing.
    let stored = if body.touches_pricing() {
        let current = collection
            .find_one(filter.clone(), None)
            .await?
            .ok_or_else(|| ApiError::not_found("Product"))?;
        Some((current.price, current.discount))
    } else {
        None
    };

    let update_doc = doc! { "$set": body.to_set_document(stored)? };
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let product = collection
        .find_one_and_update(filter, update_doc, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    info!("Product updated successfully: {}", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Product updated successfully",
        "product": product,
    })))
}

pub async fn delete_product(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "product")?;
    require_permission(&db, &claims, Permission::Products).await?;

    debug!("Deleting product: {}", id);
    let result = products(&db).delete_one(doc! { "_id": object_id }, None).await?;

    if result.deleted_count == 0 {
        debug!("Product not found for deletion: {}", id);
        return Err(ApiError::not_found("Product"));
    }

    info!("Product deleted successfully: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Product deleted successfully" })))
}

pub async fn add_review(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "product")?;
    let user_id = claims.require_user()?;
    body.validate()?;

    let user = db
        .database
        .collection::<User>(USERS)
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    let review = Review {
        user_id,
        name: user.name,
        rating: body.rating,
        comment: body.comment.trim().to_string(),
        created_at: Utc::now(),
    };

    let result = products(&db)
        .update_one(
            doc! { "_id": object_id },
            doc! { "$push": { "reviews": to_bson(&review)? } },
            None,
        )
        .await?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("Product"));
    }

    info!("Review added to product {} by user {}", id, user_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "Review added successfully",
        "review": review,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facets_keep_non_empty_strings_sorted() {
        let values = vec![
            Bson::String("Red".into()),
            Bson::Null,
            Bson::String(String::new()),
            Bson::String("Blue".into()),
        ];
        assert_eq!(distinct_strings(values), vec!["Blue".to_string(), "Red".to_string()]);
    }
}
