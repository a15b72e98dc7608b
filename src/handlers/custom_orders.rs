use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    config::MongoConfig,
    error::ApiError,
    generation::{content_type_of, GenerationClient},
    models::{
        admin::Permission,
        custom_order::{
            CreateCustomOrderRequest, CustomOrder, GenerateModelRequest, ModelProxyQuery,
            UpdateCustomOrderRequest, CUSTOM_ORDERS,
        },
        order::{check_payment, generate_order_number, OrderQuery, OrderStatus},
        timestamp,
    },
    pagination::Pagination,
};

use super::{collect_all, orders::parse_status, parse_object_id};

fn custom_orders(db: &MongoConfig) -> Collection<CustomOrder> {
    db.database.collection(CUSTOM_ORDERS)
}

pub async fn generate_model(
    generator: web::Data<GenerationClient>,
    claims: Claims,
    body: web::Json<GenerateModelRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;

    let prompt = body.prompt.trim();
    debug!("Account {} requested a model for prompt {:?}", claims.sub, prompt);
    let task_id = generator.create_task(prompt).await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Model generation started",
        "taskId": task_id,
    })))
}

pub async fn generation_status(
    generator: web::Data<GenerationClient>,
    _claims: Claims,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let snapshot = generator.task(&task_id).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Long poll: answers once the task is terminal or the poll policy runs out.
/// A client disconnect drops this future, which stops polling.
pub async fn wait_for_generation(
    generator: web::Data<GenerationClient>,
    _claims: Claims,
    task_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let snapshot = generator
        .wait_for_model(&task_id, generator.policy(), futures::future::pending())
        .await?;

    info!("Generation task {} finished as {:?}", task_id, snapshot.status);
    Ok(HttpResponse::Ok().json(snapshot))
}

/// Same-origin download of a generated model so the storefront viewer can
/// load it without cross-origin restrictions.
pub async fn proxy_model(
    generator: web::Data<GenerationClient>,
    query: web::Query<ModelProxyQuery>,
) -> Result<HttpResponse, ApiError> {
    let url = generator.check_asset_url(&query.url)?;

    debug!("Proxying model asset {}", url);
    let upstream = generator.fetch_asset(url).await?;
    let content_type = content_type_of(&upstream);

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .streaming(upstream.bytes_stream()))
}

pub async fn create_custom_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateCustomOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = claims.require_user()?;
    body.validate()?;
    check_payment(body.payment_method, body.payment_receipt.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let body = body.into_inner();
    let now = Utc::now();
    let mut order = CustomOrder {
        id: None,
        order_number: generate_order_number("CUS"),
        user: user_id,
        prompt: body.prompt.trim().to_string(),
        model_url: body.model_url,
        task_id: body.task_id,
        quantity: body.quantity,
        color: body.color,
        size: body.size,
        notes: body.notes,
        shipping_address: body.shipping_address,
        payment_method: body.payment_method,
        payment_receipt: body.payment_receipt,
        price: None,
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let result = custom_orders(&db).insert_one(&order, None).await?;
    order.id = result.inserted_id.as_object_id();

    info!("Custom order {} placed by {}", order.order_number, user_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "Custom order placed successfully",
        "order": order,
    })))
}

pub async fn my_custom_orders(
    db: web::Data<MongoConfig>,
    claims: Claims,
) -> Result<HttpResponse, ApiError> {
    let user_id = claims.require_user()?;

    let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
    let cursor = custom_orders(&db).find(doc! { "user": user_id }, options).await?;

    Ok(HttpResponse::Ok().json(collect_all(cursor).await?))
}

pub async fn list_custom_orders(
    db: web::Data<MongoConfig>,
    claims: Claims,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut filter = Document::new();
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        filter.insert("status", parse_status(status)?.as_str());
    }
    require_permission(&db, &claims, Permission::CustomOrders).await?;

    let pagination = Pagination::new(query.page, query.limit);
    let collection = custom_orders(&db);
    let total = collection.count_documents(filter.clone(), None).await?;
    let cursor = collection
        .find(filter, pagination.find_options(doc! { "createdAt": -1 }))
        .await?;

    Ok(HttpResponse::Ok().json(pagination.page_of(collect_all(cursor).await?, total)))
}

pub async fn get_custom_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "custom order")?;

    let filter = if claims.is_admin() {
        require_permission(&db, &claims, Permission::CustomOrders).await?;
        doc! { "_id": object_id }
    } else {
        doc! { "_id": object_id, "user": claims.subject_id()? }
    };

    let order = custom_orders(&db)
        .find_one(filter, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Custom order"))?;

    Ok(HttpResponse::Ok().json(order))
}

/// Admin review: move the status and/or quote a price.
pub async fn update_custom_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateCustomOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "custom order")?;
    body.validate()?;

    let mut update_doc = doc! {};
    if let Some(status) = &body.status {
        update_doc.insert("status", parse_status(status)?.as_str());
    }
    if let Some(price) = body.price {
        update_doc.insert("price", price);
    }
    if update_doc.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }
    require_permission(&db, &claims, Permission::CustomOrders).await?;

    update_doc.insert("updatedAt", timestamp::now());
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let order = custom_orders(&db)
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Custom order"))?;

    info!("Custom order {} updated", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Custom order updated successfully",
        "order": order,
    })))
}

pub async fn delete_custom_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "custom order")?;
    require_permission(&db, &claims, Permission::CustomOrders).await?;

    let result = custom_orders(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Custom order"));
    }

    info!("Custom order deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Custom order deleted successfully" })))
}
