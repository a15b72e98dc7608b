use actix_web::{http::header, web, HttpResponse};
use mongodb::{
    bson::doc,
    options::{FindOptions, UpdateOptions},
    Collection,
};
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    auth::{require_permission, Claims},
    config::MongoConfig,
    error::ApiError,
    models::{
        admin::Permission,
        newsletter::{SubscribeRequest, Subscriber, NEWSLETTER},
        timestamp,
    },
    pagination::Pagination,
};

use super::{collect_all, parse_object_id};

fn subscribers(db: &MongoConfig) -> Collection<Subscriber> {
    db.database.collection(NEWSLETTER)
}

pub async fn subscribe(
    db: web::Data<MongoConfig>,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let email = body.normalized_email();

    let options = UpdateOptions::builder().upsert(true).build();
    let result = subscribers(&db)
        .update_one(
            doc! { "email": &email },
            doc! { "$setOnInsert": { "email": &email, "subscribedAt": timestamp::now() } },
            options,
        )
        .await?;

    if result.upserted_id.is_none() {
        debug!("Newsletter email already subscribed: {}", email);
        return Ok(HttpResponse::Ok().json(json!({ "message": "Already subscribed" })));
    }

    info!("New newsletter subscriber");
    Ok(HttpResponse::Created().json(json!({ "message": "Subscribed successfully" })))
}

pub async fn unsubscribe(
    db: web::Data<MongoConfig>,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;

    let result = subscribers(&db)
        .delete_one(doc! { "email": body.normalized_email() }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Subscriber"));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Unsubscribed successfully" })))
}

#[derive(Debug, serde::Deserialize)]
pub struct SubscriberQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_subscribers(
    db: web::Data<MongoConfig>,
    claims: Claims,
    query: web::Query<SubscriberQuery>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&db, &claims, Permission::Newsletter).await?;

    let pagination = Pagination::new(query.page, query.limit);
    let collection = subscribers(&db);
    let total = collection.count_documents(None, None).await?;
    let cursor = collection
        .find(None, pagination.find_options(doc! { "subscribedAt": -1 }))
        .await?;

    Ok(HttpResponse::Ok().json(pagination.page_of(collect_all(cursor).await?, total)))
}

pub async fn delete_subscriber(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "subscriber")?;
    require_permission(&db, &claims, Permission::Newsletter).await?;

    let result = subscribers(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Subscriber"));
    }

    info!("Subscriber deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Subscriber deleted successfully" })))
}

fn subscribers_csv(subscribers: &[Subscriber]) -> Result<Vec<u8>, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {}", e));

    writer.write_record(["email", "subscribedAt"]).map_err(csv_error)?;
    for subscriber in subscribers {
        let subscribed_at = timestamp::format(&subscriber.subscribed_at);
        writer
            .write_record([subscriber.email.as_str(), subscribed_at.as_str()])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))
}

pub async fn export_subscribers(
    db: web::Data<MongoConfig>,
    claims: Claims,
) -> Result<HttpResponse, ApiError> {
    require_permission(&db, &claims, Permission::Newsletter).await?;

    let options = FindOptions::builder().sort(doc! { "subscribedAt": 1 }).build();
    let cursor = subscribers(&db).find(None, options).await?;
    let all = collect_all(cursor).await?;

    info!("Exporting {} newsletter subscribers", all.len());
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"newsletter-subscribers.csv\"",
        ))
        .body(subscribers_csv(&all)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn csv_has_header_and_rows() {
        let subscribed_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rows = vec![Subscriber {
            id: None,
            email: "ada@shop.test".to_string(),
            subscribed_at,
        }];

        let csv = String::from_utf8(subscribers_csv(&rows).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("email,subscribedAt"));
        assert_eq!(lines.next(), Some("ada@shop.test,2026-03-01T12:00:00.000Z"));
        assert_eq!(lines.next(), None);
    }
}
