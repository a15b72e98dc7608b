//! Catalog search: turns storefront query parameters into one MongoDB filter
//! and sort for the product collection.

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use serde::Deserialize;

use crate::{error::ApiError, pagination::Pagination};

pub const RELATED_LIMIT: i64 = 4;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    NameAsc,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductQuery {
    pub fn check(&self) -> Result<(), ApiError> {
        if self.min.is_some_and(|min| min < 0.0) || self.max.is_some_and(|max| max < 0.0) {
            return Err(ApiError::BadRequest("Price bounds must not be negative".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ApiError::BadRequest(
                    "Minimum price must not exceed maximum price".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Case-insensitive whole-value match.
fn exact_ci(value: &str) -> Document {
    doc! { "$regex": format!("^{}$", regex::escape(value)), "$options": "i" }
}

fn contains_ci(value: &str) -> Document {
    doc! { "$regex": regex::escape(value), "$options": "i" }
}

pub fn build_filter(query: &ProductQuery) -> Document {
    let mut filter = doc! {};

    if let Some(text) = non_empty(&query.q) {
        let pattern = contains_ci(text);
        filter.insert(
            "$or",
            vec![
                Bson::Document(doc! { "name": pattern.clone() }),
                Bson::Document(doc! { "description": pattern.clone() }),
                Bson::Document(doc! { "tags": pattern }),
            ],
        );
    }

    if let Some(category) = non_empty(&query.category) {
        filter.insert("category", exact_ci(category));
    }
    if let Some(sub_category) = non_empty(&query.sub_category) {
        filter.insert("subCategory", exact_ci(sub_category));
    }

    // Color and size together must be carried by the same variant.
    match (non_empty(&query.color), non_empty(&query.size)) {
        (Some(color), Some(size)) => {
            filter.insert(
                "variants",
                doc! { "$elemMatch": { "color": exact_ci(color), "sizes": exact_ci(size) } },
            );
        }
        (Some(color), None) => {
            filter.insert("variants.color", exact_ci(color));
        }
        (None, Some(size)) => {
            filter.insert("variants.sizes", exact_ci(size));
        }
        (None, None) => {}
    }

    let mut price = doc! {};
    if let Some(min) = query.min {
        price.insert("$gte", min);
    }
    if let Some(max) = query.max {
        price.insert("$lte", max);
    }
    if !price.is_empty() {
        filter.insert("finalPrice", price);
    }

    if let Some(in_stock) = query.in_stock {
        filter.insert("inStock", in_stock);
    }

    filter
}

pub fn sort_document(sort: SortOrder) -> Document {
    match sort {
        SortOrder::Newest => doc! { "createdAt": -1, "_id": -1 },
        SortOrder::PriceAsc => doc! { "finalPrice": 1, "_id": 1 },
        SortOrder::PriceDesc => doc! { "finalPrice": -1, "_id": -1 },
        SortOrder::NameAsc => doc! { "name": 1, "_id": 1 },
    }
}

/// Products sharing `category`, excluding the product itself.
pub fn related_filter(product_id: ObjectId, category: &str) -> Document {
    doc! { "category": exact_ci(category), "_id": { "$ne": product_id } }
}

/// Products counted under a category, matched the way listing filters match.
pub fn category_count_filter(name: &str) -> Document {
    doc! { "category": exact_ci(name) }
}
