use actix_web::{web, HttpResponse};
use mongodb::{
    bson::{doc, to_document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
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
        contact_info::{ContactInfo, ContactInfoRequest, CONTACT_INFO},
    },
};

fn contact_info(db: &MongoConfig) -> Collection<ContactInfo> {
    db.database.collection(CONTACT_INFO)
}

/// Nothing is served until an admin has saved the singleton once.
fn stored_info(info: Option<ContactInfo>) -> Result<HttpResponse, ApiError> {
    let info = info.ok_or_else(|| ApiError::not_found("Contact info"))?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn get_contact_info(db: web::Data<MongoConfig>) -> Result<HttpResponse, ApiError> {
    stored_info(contact_info(&db).find_one(None, None).await?)
}

/// Creates the singleton on first write, replaces its fields afterwards.
pub async fn upsert_contact_info(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<ContactInfoRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::ContactInfo).await?;

    let fields = to_document(&body.into_inner().into_contact_info())?;
    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::After)
        .build();

    let info = contact_info(&db)
        .find_one_and_update(doc! {}, doc! { "$set": fields }, options)
        .await?
        .ok_or_else(|| ApiError::Internal("Contact info upsert returned nothing".to_string()))?;

    info!("Contact info updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Contact info saved successfully",
        "contactInfo": info,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, ResponseError};

    #[test]
    fn unset_contact_info_is_not_found() {
        let err = stored_info(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Contact info not found");
    }
}
