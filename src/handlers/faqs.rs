use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::doc,
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
        faq::{CreateFaqRequest, Faq, UpdateFaqRequest, FAQS},
    },
};

use super::{collect_all, parse_object_id};

fn faqs(db: &MongoConfig) -> Collection<Faq> {
    db.database.collection(FAQS)
}

pub async fn list_faqs(db: web::Data<MongoConfig>) -> Result<HttpResponse, ApiError> {
    let options = FindOptions::builder()
        .sort(doc! { "position": 1, "createdAt": 1 })
        .build();
    let cursor = faqs(&db).find(None, options).await?;
    Ok(HttpResponse::Ok().json(collect_all(cursor).await?))
}

pub async fn get_faq(
    db: web::Data<MongoConfig>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "faq")?;
    let faq = faqs(&db)
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("FAQ"))?;
    Ok(HttpResponse::Ok().json(faq))
}

pub async fn create_faq(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateFaqRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::Faqs).await?;

    let mut faq = Faq {
        id: None,
        question: body.question.trim().to_string(),
        answer: body.answer.trim().to_string(),
        position: body.position,
        created_at: Utc::now(),
    };
    let result = faqs(&db).insert_one(&faq, None).await?;
    faq.id = result.inserted_id.as_object_id();

    info!("FAQ created with ID: {}", result.inserted_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "FAQ created successfully",
        "faq": faq,
    })))
}

pub async fn update_faq(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateFaqRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "faq")?;
    body.validate()?;
    require_permission(&db, &claims, Permission::Faqs).await?;

    let mut update_doc = doc! {};
    if let Some(question) = &body.question {
        update_doc.insert("question", question.trim());
    }
    if let Some(answer) = &body.answer {
        update_doc.insert("answer", answer.trim());
    }
    if let Some(position) = body.position {
        update_doc.insert("position", position);
    }
    if update_doc.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let faq = faqs(&db)
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("FAQ"))?;

    info!("FAQ updated: {}", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "FAQ updated successfully",
        "faq": faq,
    })))
}

pub async fn delete_faq(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "faq")?;
    require_permission(&db, &claims, Permission::Faqs).await?;

    let result = faqs(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("FAQ"));
    }

    info!("FAQ deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "FAQ deleted successfully" })))
}
