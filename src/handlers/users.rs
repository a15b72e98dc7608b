use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, Claims, Role, TokenKeys},
    config::MongoConfig,
    error::ApiError,
    models::user::{
        LoginRequest, RegisterRequest, StoreKind, SyncedItems, UpdateProfileRequest, User,
        UserResponse, USERS,
    },
};

fn users(db: &MongoConfig) -> Collection<User> {
    db.database.collection(USERS)
}

async fn load_user(db: &MongoConfig, user_id: ObjectId) -> Result<User, ApiError> {
    users(db)
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

pub async fn register(
    db: web::Data<MongoConfig>,
    keys: web::Data<TokenKeys>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;

    let collection = users(&db);
    let email = body.email.trim().to_lowercase();

    if collection.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::BadRequest("Email already registered".to_string()));
    }

    let mut user = User {
        id: None,
        name: body.name.trim().to_string(),
        email,
        password_hash: hash_password(&body.password)?,
        cart: Vec::new(),
        wishlist: Vec::new(),
        cart_version: 0,
        wishlist_version: 0,
        created_at: Utc::now(),
    };

    let result = collection.insert_one(&user, None).await?;
    let user_id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::Internal("Inserted user has no ObjectId".to_string()))?;
    user.id = Some(user_id);

    let pair = keys.issue_pair(&user_id, Role::User)?;

    info!("Created new user with ID: {}", user_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "token": pair.token,
        "refreshToken": pair.refresh_token,
        "user": UserResponse::from(&user),
    })))
}

pub async fn login(
    db: web::Data<MongoConfig>,
    keys: web::Data<TokenKeys>,
    credentials: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = credentials.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = users(&db)
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&credentials.password, &user.password_hash)? {
        debug!("Failed login for {}", email);
        return Err(invalid());
    }

    let user_id = user.id.ok_or_else(invalid)?;
    let pair = keys.issue_pair(&user_id, Role::User)?;

    Ok(HttpResponse::Ok().json(json!({
        "token": pair.token,
        "refreshToken": pair.refresh_token,
        "user": UserResponse::from(&user),
    })))
}

pub async fn me(db: web::Data<MongoConfig>, claims: Claims) -> Result<HttpResponse, ApiError> {
    let user = load_user(&db, claims.require_user()?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

pub async fn update_me(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = claims.require_user()?;
    body.validate()?;

    let mut update_doc = doc! {};
    if let Some(name) = &body.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(password) = &body.password {
        update_doc.insert("passwordHash", hash_password(password)?);
    }
    if update_doc.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let user = users(&db)
        .find_one_and_update(doc! { "_id": user_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!("User {} updated their profile", user_id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "user": UserResponse::from(&user),
    })))
}

/// Matches the user only while the stored version equals `version`.
/// Accounts created before versioning have no field, which counts as 0.
fn version_filter(user_id: ObjectId, kind: StoreKind, version: i64) -> Document {
    let field = kind.version_field();
    if version == 0 {
        doc! {
            "_id": user_id,
            "$or": [ { field: 0_i64 }, { field: { "$exists": false } } ],
        }
    } else {
        doc! { "_id": user_id, field: version }
    }
}

fn check_items(synced: &SyncedItems) -> Result<(), ApiError> {
    if synced.version < 0 {
        return Err(ApiError::BadRequest("Version must not be negative".to_string()));
    }
    for item in &synced.items {
        if item.quantity == 0 {
            return Err(ApiError::BadRequest("Quantity must be at least 1".to_string()));
        }
        if item.final_price < 0.0 || !item.final_price.is_finite() {
            return Err(ApiError::BadRequest("Price must not be negative".to_string()));
        }
        if item.product_id.trim().is_empty() {
            return Err(ApiError::BadRequest("Product id is required".to_string()));
        }
    }
    Ok(())
}

async fn read_store(
    db: &MongoConfig,
    claims: &Claims,
    kind: StoreKind,
) -> Result<HttpResponse, ApiError> {
    let user = load_user(db, claims.require_user()?).await?;
    Ok(HttpResponse::Ok().json(user.store(kind)))
}

/// Replaces the whole array when the caller's version is current and bumps
/// the version; a stale version gets 409 and leaves the record untouched.
async fn write_store(
    db: &MongoConfig,
    claims: &Claims,
    kind: StoreKind,
    synced: SyncedItems,
) -> Result<HttpResponse, ApiError> {
    let user_id = claims.require_user()?;
    check_items(&synced)?;

    let items = to_bson(&synced.items)?;
    let update = doc! {
        "$set": { kind.items_field(): items },
        "$inc": { kind.version_field(): 1_i64 },
    };
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = users(db)
        .find_one_and_update(version_filter(user_id, kind, synced.version), update, options)
        .await?;

    match updated {
        Some(user) => {
            let stored = user.store(kind);
            debug!("User {} {} synced to version {}", user_id, kind.items_field(), stored.version);
            Ok(HttpResponse::Ok().json(stored))
        }
        None => {
            let current = load_user(db, user_id).await?.store(kind);
            warn!(
                "Stale {} write from user {}: sent version {}, stored {}",
                kind.items_field(),
                user_id,
                synced.version,
                current.version
            );
            Err(ApiError::Conflict(format!(
                "{} was changed elsewhere, current version is {}",
                kind.items_field(),
                current.version
            )))
        }
    }
}

pub async fn get_cart(db: web::Data<MongoConfig>, claims: Claims) -> Result<HttpResponse, ApiError> {
    read_store(&db, &claims, StoreKind::Cart).await
}

pub async fn put_cart(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<SyncedItems>,
) -> Result<HttpResponse, ApiError> {
    write_store(&db, &claims, StoreKind::Cart, body.into_inner()).await
}

pub async fn get_wishlist(
    db: web::Data<MongoConfig>,
    claims: Claims,
) -> Result<HttpResponse, ApiError> {
    read_store(&db, &claims, StoreKind::Wishlist).await
}

pub async fn put_wishlist(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<SyncedItems>,
) -> Result<HttpResponse, ApiError> {
    write_store(&db, &claims, StoreKind::Wishlist, body.into_inner()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::LineItem;

    fn item(quantity: u32, final_price: f64) -> LineItem {
        LineItem {
            product_id: "p1".to_string(),
            name: "Mug".to_string(),
            image: None,
            final_price,
            quantity,
            size: None,
            color: None,
        }
    }

    #[test]
    fn version_zero_matches_legacy_records() {
        let id = ObjectId::new();
        let filter = version_filter(id, StoreKind::Cart, 0);
        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);

        let filter = version_filter(id, StoreKind::Wishlist, 4);
        assert_eq!(filter.get_i64("wishlistVersion").unwrap(), 4);
        assert!(!filter.contains_key("$or"));
    }

    #[test]
    fn rejects_bad_lines() {
        let ok = SyncedItems { items: vec![item(2, 10.0)], version: 1 };
        assert!(check_items(&ok).is_ok());

        let zero = SyncedItems { items: vec![item(0, 10.0)], version: 1 };
        assert!(check_items(&zero).is_err());

        let negative = SyncedItems { items: vec![item(1, -5.0)], version: 1 };
        assert!(check_items(&negative).is_err());

        let stale = SyncedItems { items: vec![], version: -1 };
        assert!(check_items(&stale).is_err());
    }
}
