use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use serde_json::json;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    auth::{hash_password, require_permission, verify_password, Claims, Role, TokenKeys},
    config::{MongoConfig, SeedAdmin},
    error::ApiError,
    models::{
        admin::{
            Admin, AdminResponse, AdminRole, CreateAdminRequest, Permission, Permissions,
            UpdateAdminRequest, ADMINS,
        },
        user::LoginRequest,
    },
};

use super::{collect_all, parse_object_id};

fn admins(db: &MongoConfig) -> Collection<Admin> {
    db.database.collection(ADMINS)
}

/// Only a super admin may grant or hold the super admin role.
fn check_role_grant(caller: &Admin, requested: AdminRole) -> Result<(), ApiError> {
    if requested == AdminRole::SuperAdmin && caller.role != AdminRole::SuperAdmin {
        return Err(ApiError::Forbidden(
            "Only a super admin can grant the super admin role".to_string(),
        ));
    }
    Ok(())
}

/// Creates the first super admin when the collection is empty.
pub async fn seed_super_admin(db: &MongoConfig, seed: &SeedAdmin) -> Result<(), ApiError> {
    let collection = admins(db);
    if collection.count_documents(doc! {}, None).await? > 0 {
        debug!("Admin accounts exist, skipping seed");
        return Ok(());
    }

    let admin = Admin {
        id: None,
        name: "Super Admin".to_string(),
        email: seed.email.trim().to_lowercase(),
        password_hash: hash_password(&seed.password)?,
        role: AdminRole::SuperAdmin,
        permissions: Permissions::all(),
        created_at: Utc::now(),
    };
    collection.insert_one(&admin, None).await?;

    info!("Seeded super admin {}", admin.email);
    Ok(())
}

pub async fn login(
    db: web::Data<MongoConfig>,
    keys: web::Data<TokenKeys>,
    credentials: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = credentials.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let admin = admins(&db)
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&credentials.password, &admin.password_hash)? {
        warn!("Failed admin login for {}", email);
        return Err(invalid());
    }

    let admin_id = admin.id.ok_or_else(invalid)?;
    let pair = keys.issue_pair(&admin_id, Role::Admin)?;

    info!("Admin {} logged in", admin_id);
    Ok(HttpResponse::Ok().json(json!({
        "token": pair.token,
        "refreshToken": pair.refresh_token,
        "admin": AdminResponse::from(&admin),
    })))
}

pub async fn me(db: web::Data<MongoConfig>, claims: Claims) -> Result<HttpResponse, ApiError> {
    let admin_id = claims.require_admin()?;
    let admin = admins(&db)
        .find_one(doc! { "_id": admin_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))?;

    Ok(HttpResponse::Ok().json(AdminResponse::from(&admin)))
}

pub async fn list_admins(
    db: web::Data<MongoConfig>,
    claims: Claims,
) -> Result<HttpResponse, ApiError> {
    require_permission(&db, &claims, Permission::Admins).await?;

    let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
    let cursor = admins(&db).find(doc! {}, options).await?;
    let list: Vec<AdminResponse> = collect_all(cursor)
        .await?
        .iter()
        .map(AdminResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(list))
}

pub async fn get_admin(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "admin")?;
    require_permission(&db, &claims, Permission::Admins).await?;

    let admin = admins(&db)
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))?;

    Ok(HttpResponse::Ok().json(AdminResponse::from(&admin)))
}

pub async fn create_admin(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let caller = require_permission(&db, &claims, Permission::Admins).await?;

    let role = body.role.unwrap_or(AdminRole::Admin);
    check_role_grant(&caller, role)?;

    let collection = admins(&db);
    let email = body.email.trim().to_lowercase();
    if collection.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(ApiError::BadRequest("Email already in use".to_string()));
    }

    let mut admin = Admin {
        id: None,
        name: body.name.trim().to_string(),
        email,
        password_hash: hash_password(&body.password)?,
        role,
        permissions: body.permissions,
        created_at: Utc::now(),
    };
    let result = collection.insert_one(&admin, None).await?;
    admin.id = result.inserted_id.as_object_id();

    info!("Admin {} created by {}", admin.email, claims.sub);
    Ok(HttpResponse::Created().json(json!({
        "message": "Admin created successfully",
        "admin": AdminResponse::from(&admin),
    })))
}

pub async fn update_admin(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "admin")?;
    body.validate()?;
    let caller = require_permission(&db, &claims, Permission::Admins).await?;

    let mut update_doc = doc! {};
    if let Some(name) = &body.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(password) = &body.password {
        update_doc.insert("passwordHash", hash_password(password)?);
    }
    if let Some(role) = body.role {
        check_role_grant(&caller, role)?;
        update_doc.insert("role", to_bson(&role)?);
    }
    if let Some(permissions) = &body.permissions {
        update_doc.insert("permissions", to_bson(permissions)?);
    }
    if update_doc.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let collection = admins(&db);
    // Editing a super admin is itself a super admin privilege.
    if caller.role != AdminRole::SuperAdmin {
        let target = collection
            .find_one(doc! { "_id": object_id }, None)
            .await?
            .ok_or_else(|| ApiError::not_found("Admin"))?;
        check_role_grant(&caller, target.role)?;
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let admin = collection
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))?;

    info!("Admin {} updated by {}", id, claims.sub);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Admin updated successfully",
        "admin": AdminResponse::from(&admin),
    })))
}

pub async fn delete_admin(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "admin")?;
    let caller = require_permission(&db, &claims, Permission::Admins).await?;

    if caller.id == Some(object_id) {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    let collection = admins(&db);
    let target = collection
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))?;
    check_role_grant(&caller, target.role)?;

    collection.delete_one(doc! { "_id": object_id }, None).await?;

    info!("Admin {} deleted by {}", id, claims.sub);
    Ok(HttpResponse::Ok().json(json!({ "message": "Admin deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn admin(role: AdminRole) -> Admin {
        Admin {
            id: Some(ObjectId::new()),
            name: "Ops".to_string(),
            email: "ops@shop.test".to_string(),
            password_hash: String::new(),
            role,
            permissions: Permissions { admins: true, ..Permissions::default() },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_super_admin_grants_super_admin() {
        let root = admin(AdminRole::SuperAdmin);
        let ops = admin(AdminRole::Admin);

        assert!(check_role_grant(&root, AdminRole::SuperAdmin).is_ok());
        assert!(check_role_grant(&ops, AdminRole::Admin).is_ok());
        assert!(matches!(
            check_role_grant(&ops, AdminRole::SuperAdmin),
            Err(ApiError::Forbidden(_))
        ));
    }
}
