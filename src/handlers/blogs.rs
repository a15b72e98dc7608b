use actix_web::{web, HttpResponse};
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
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
        blog::{slugify, Blog, BlogQuery, CreateBlogRequest, UpdateBlogRequest, BLOGS},
        timestamp,
    },
    pagination::Pagination,
};

use super::{collect_all, parse_object_id};

fn blogs(db: &MongoConfig) -> Collection<Blog> {
    db.database.collection(BLOGS)
}

fn blog_filter(query: &BlogQuery, include_drafts: bool) -> Document {
    let mut filter = doc! {};
    if !include_drafts {
        filter.insert("published", true);
    }
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        filter.insert("category", category);
    }
    if let Some(text) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = doc! { "$regex": regex::escape(text), "$options": "i" };
        filter.insert(
            "$or",
            vec![
                Bson::Document(doc! { "title": pattern.clone() }),
                Bson::Document(doc! { "excerpt": pattern.clone() }),
                Bson::Document(doc! { "tags": pattern }),
            ],
        );
    }
    filter
}

/// A path segment is either an ObjectId or a slug.
fn lookup_filter(id_or_slug: &str) -> Document {
    match ObjectId::parse_str(id_or_slug) {
        Ok(object_id) => doc! { "_id": object_id },
        Err(_) => doc! { "slug": id_or_slug },
    }
}

pub async fn list_blogs(
    db: web::Data<MongoConfig>,
    claims: Option<Claims>,
    query: web::Query<BlogQuery>,
) -> Result<HttpResponse, ApiError> {
    let include_drafts = query.all && claims.as_ref().is_some_and(Claims::is_admin);
    let filter = blog_filter(&query, include_drafts);
    let pagination = Pagination::new(query.page, query.limit);

    debug!("Listing blogs with filter {:?}", filter);
    let collection = blogs(&db);
    let total = collection.count_documents(filter.clone(), None).await?;
    let cursor = collection
        .find(filter, pagination.find_options(doc! { "createdAt": -1 }))
        .await?;
    let items = collect_all(cursor).await?;

    Ok(HttpResponse::Ok().json(pagination.page_of(items, total)))
}

pub async fn get_blog(
    db: web::Data<MongoConfig>,
    claims: Option<Claims>,
    id_or_slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let blog = blogs(&db)
        .find_one(lookup_filter(&id_or_slug), None)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog"))?;

    if !blog.published && !claims.as_ref().is_some_and(Claims::is_admin) {
        return Err(ApiError::not_found("Blog"));
    }

    Ok(HttpResponse::Ok().json(blog))
}

pub async fn create_blog(
    db: web::Data<MongoConfig>,
    claims: Claims,
    body: web::Json<CreateBlogRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let collection = blogs(&db);
    let mut blog = body.into_inner().into_blog();
    if blog.slug.is_empty() {
        return Err(ApiError::BadRequest("Title must contain letters or digits".to_string()));
    }
    if collection.find_one(doc! { "slug": &blog.slug }, None).await?.is_some() {
        return Err(ApiError::Conflict(format!("Slug '{}' is already in use", blog.slug)));
    }

    let result = collection.insert_one(&blog, None).await?;
    blog.id = result.inserted_id.as_object_id();

    info!("Blog created: {}", blog.slug);
    Ok(HttpResponse::Created().json(json!({
        "message": "Blog created successfully",
        "blog": blog,
    })))
}

pub async fn update_blog(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
    body: web::Json<UpdateBlogRequest>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "blog")?;
    body.validate()?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let collection = blogs(&db);
    let mut update_doc = doc! { "updatedAt": timestamp::now() };

    if let Some(title) = &body.title {
        update_doc.insert("title", title);
    }
    if let Some(slug) = &body.slug {
        let slug = slugify(slug);
        if slug.is_empty() {
            return Err(ApiError::BadRequest("Slug must contain letters or digits".to_string()));
        }
        let taken = collection
            .find_one(doc! { "slug": &slug, "_id": { "$ne": object_id } }, None)
            .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(format!("Slug '{}' is already in use", slug)));
        }
        update_doc.insert("slug", slug);
    }
    if let Some(excerpt) = &body.excerpt {
        update_doc.insert("excerpt", excerpt);
    }
    if let Some(content) = &body.content {
        update_doc.insert("content", content);
    }
    if let Some(image) = &body.image {
        update_doc.insert("image", image);
    }
    if let Some(category) = &body.category {
        update_doc.insert("category", category);
    }
    if let Some(author) = &body.author {
        update_doc.insert("author", author);
    }
    if let Some(tags) = &body.tags {
        update_doc.insert("tags", tags.clone());
    }
    if let Some(published) = body.published {
        update_doc.insert("published", published);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let blog = collection
        .find_one_and_update(doc! { "_id": object_id }, doc! { "$set": update_doc }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog"))?;

    info!("Blog updated: {}", id);
    Ok(HttpResponse::Ok().json(json!({
        "message": "Blog updated successfully",
        "blog": blog,
    })))
}

pub async fn delete_blog(
    db: web::Data<MongoConfig>,
    claims: Claims,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id = parse_object_id(&id, "blog")?;
    require_permission(&db, &claims, Permission::Blogs).await?;

    let result = blogs(&db).delete_one(doc! { "_id": object_id }, None).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("Blog"));
    }

    info!("Blog deleted: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Blog deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> BlogQuery {
        web::Query::<BlogQuery>::from_query(raw).unwrap().into_inner()
    }

    #[test]
    fn public_filter_hides_drafts() {
        let filter = blog_filter(&query("category=News"), false);
        assert!(filter.get_bool("published").unwrap());
        assert_eq!(filter.get_str("category").unwrap(), "News");

        let filter = blog_filter(&query("all=true"), true);
        assert!(!filter.contains_key("published"));
    }

    #[test]
    fn lookup_by_id_or_slug() {
        let id = ObjectId::new();
        assert_eq!(lookup_filter(&id.to_hex()), doc! { "_id": id });
        assert_eq!(lookup_filter("spring-launch"), doc! { "slug": "spring-launch" });
    }
}
