use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    config::MongoConfig,
    error::ApiError,
    models::{
        admin::Permission,
        order::{
            check_payment, generate_order_number, order_total, CreateOrderRequest, Order,
            OrderItem, OrderLineRequest, OrderQuery, OrderStatus, UpdateStatusRequest, ORDERS,
        },
        product::{Product, PRODUCTS},
        timestamp,
    },
    pagination::Pagination,
};

use super::{collect_all, parse_object_id};

fn orders(db: &MongoConfig) -> Collection<Order> {
    db.database.collection(ORDERS)
}

pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.trim()
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Whether `product` offers the requested color and size. A product without
/// variants accepts any selection.
fn variant_available(product: &Product, color: Option<&str>, size: Option<&str>) -> bool {
    if product.variants.is_empty() {
        return true;
    }
    product.variants.iter().any(|variant| {
        color.map_or(true, |c| variant.color.eq_ignore_ascii_case(c))
            && size.map_or(true, |s| variant.sizes.iter().any(|vs| vs.eq_ignore_ascii_case(s)))
    })
}

/// Snapshot of the catalog entry for one requested line.
fn price_line(line: &OrderLineRequest, product: &Product) -> Result<OrderItem, ApiError> {
    if !product.in_stock {
        return Err(ApiError::BadRequest(format!("{} is out of stock", product.name)));
    }
    if !variant_available(product, line.color.as_deref(), line.size.as_deref()) {
        return Err(ApiError::BadRequest(format!(
            "{} is not available in the selected color/size",
            product.name
        )));
    }

    Ok(OrderItem {
        product_id: line.product_id.clone(),
        name: product.name.clone(),
        image: product.images.first().cloned(),
        price: product.final_price,
        quantity: line.quantity,
        size: line.size.clone(),
        color: line.color.clone(),
    })
}

pub async fn create_order(
    db: web::Data<MongoConfig>,
    claims: Option<Claims>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    for line in &body.items {
        line.validate()?;
    }
    check_payment(body.payment_method, body.payment_receipt.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let user = match &claims {
        Some(claims) if !claims.is_admin() => Some(claims.subject_id()?),
        _ => None,
    };

    let ids = body
        .items
        .iter()
        .map(|line| parse_object_id(&line.product_id, "product"))
        .collect::<Result<Vec<ObjectId>, ApiError>>()?;

    let cursor = db
        .database
        .collection::<Product>(PRODUCTS)
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?;
    let catalog: HashMap<String, Product> = collect_all(cursor)
        .await?
        .into_iter()
        .filter_map(|product| product.id.map(|id| (id.to_hex(), product)))
        .collect();

    let mut items = Vec::with_capacity(body.items.len());
    for line in &body.items {
        let product = catalog.get(&line.product_id).ok_or_else(|| {
            ApiError::BadRequest(format!("Product {} not found", line.product_id))
        })?;
        items.push(price_line(line, product)?);
    }

    let now = Utc::now();
    let body = body.into_inner();
    let mut order = Order {
        id: None,
        order_number: generate_order_number("ORD"),
        user,
        total_amount: order_total(&items),
        items,
        shipping_address: body.shipping_address,
        payment_method: body.payment_method,
        payment_receipt: body.payment_receipt,
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let result = orders(&db).insert_one(&order, None).await?;
    order.id = result.inserted_id.as_object_id();

    info!("Order {} placed, total {}", order.order_number, order.total_amount);
    Ok(HttpResponse::Created().json(json!({
        "message": "Order placed successfully",
        "order": order,
    })))
}

pub async fn my_orders(
    db: web::Data<MongoConfig>,
    claims: Claims,
) -> Result<HttpResponse, ApiError> {
    let user_id = claims.require_user()?;

    let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
    let cursor = orders(&db).find(doc! { "user": user_id }, options).await?;

    Ok(HttpResponse::Ok().json(collect_all(cursor).await?))
}

pub async fn list_orders(
    db: web::Data<MongoConfig>,
    claims: Claims,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut filter = Document::new();
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        filter.insert("status", parse_status(status)?.as_str());
    }
    require_permission(&db, &claims, Permission::Orders).await?;

    let pagination = Pagination::new(query.page, query.limit);
    let collection = orders(&db);
    let total = collection.count_documents(filter.clone(), None).await?;
    let cursor = collection
        .find(filter, pagination.find_options(doc! { "createdAt": -1 }))
        .await?;

    Ok(HttpResponse::Ok().json(pagination.page_of(collect_all(cursor).await?, total)))
}

pub async fn get_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "order")?;

    let filter = if claims.is_admin() {
        require_permission(&db, &claims, Permission::Orders).await?;
        doc! { "_id": object_id }
    } else {
        doc! { "_id": object_id, "user": claims.subject_id()? }
    };

    let order = orders(&db)
        .find_one(filter, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    Ok(HttpResponse::Ok().json(order))
}

pub async fn update_order_status(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "order")?;
    let status = parse_status(&body.status)?;
    require_permission(&db, &claims, Permission::Orders).await?;

    debug!("Setting order {} status to {}", id, status);
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let order = orders(&db)
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": { "status": status.as_str(), "updatedAt": timestamp::now() } },
            options,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    info!("Order {} status updated to {}", id, status);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Order status updated successfully",
        "order": order,
    })))
}

/// Customers may withdraw an order until it starts processing.
pub async fn cancel_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "order")?;
    let user_id = claims.require_user()?;
    let collection = orders(&db);

    let result = collection
        .update_one(
            doc! { "_id": object_id, "user": user_id, "status": OrderStatus::Pending.as_str() },
            doc! { "$set": {
                "status": OrderStatus::Cancelled.as_str(),
                "updatedAt": timestamp::now(),
            } },
            None,
        )
        .await?;

    if result.matched_count == 0 {
        let exists = collection
            .find_one(doc! { "_id": object_id, "user": user_id }, None)
            .await?;
        return match exists {
            Some(order) => {
                warn!("Refused to cancel order {} in status {}", id, order.status);
                Err(ApiError::Conflict(format!(
                    "Only pending orders can be cancelled, this order is {}",
                    order.status
                )))
            }
            None => Err(ApiError::not_found("Order")),
        };
    }

    info!("Order {} cancelled by customer", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Order cancelled successfully" })))
}

pub async fn delete_order(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "order")?;
    require_permission(&db, &claims, Permission::Orders).await?;

    let result = orders(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Order"));
    }

    info!("Order deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Order deleted successfully" })))
}
