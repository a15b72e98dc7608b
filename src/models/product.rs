use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, to_bson, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::timestamp;

pub const PRODUCTS: &str = "products";

/// Price after a percentage discount.
pub fn final_price(price: f64, discount: f64) -> f64 {
    price - price * discount / 100.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub color: String,
    #[serde(default)]
    pub sizes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user_id: ObjectId,
    pub name: String,
    pub rating: i32,
    pub comment: String,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub discount: f64,
    pub final_price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0.0, message = "Price must not be negative"))]
    pub price: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0, message = "Discount must be between 0 and 100"))]
    pub discount: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    pub sub_category: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
}

impl CreateProductRequest {
    pub fn into_product(self) -> Product {
        let now = Utc::now();
        Product {
            id: None,
            final_price: final_price(self.price, self.discount),
            name: self.name,
            description: self.description,
            price: self.price,
            discount: self.discount,
            images: self.images,
            variants: self.variants,
            tags: self.tags,
            category: self.category,
            sub_category: self.sub_category,
            in_stock: self.in_stock,
            reviews: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price must not be negative"))]
    pub price: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "Discount must be between 0 and 100"))]
    pub discount: Option<f64>,
    pub images: Option<Vec<String>>,
    pub variants: Option<Vec<Variant>>,
    pub tags: Option<Vec<String>>,
    #[validate(length(min = 1, message = "Category must not be empty"))]
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub in_stock: Option<bool>,
}

impl UpdateProductRequest {
    pub fn touches_pricing(&self) -> bool {
        self.price.is_some() || self.discount.is_some()
    }

    /// Builds the `$set` body. `stored` holds the current (price, discount)
    /// and is required whenever the update touches pricing.
    pub fn to_set_document(&self, stored: Option<(f64, f64)>) -> Result<Document, mongodb::bson::ser::Error> {
        let mut update_doc = doc! { "updatedAt": timestamp::now() };

        if let Some(name) = &self.name {
            update_doc.insert("name", name);
        }
        if let Some(description) = &self.description {
            update_doc.insert("description", description);
        }
        if let Some(images) = &self.images {
            update_doc.insert("images", images.clone());
        }
        if let Some(variants) = &self.variants {
            update_doc.insert("variants", to_bson(variants)?);
        }
        if let Some(tags) = &self.tags {
            update_doc.insert("tags", tags.clone());
        }
        if let Some(category) = &self.category {
            update_doc.insert("category", category);
        }
        if let Some(sub_category) = &self.sub_category {
            update_doc.insert("subCategory", sub_category);
        }
        if let Some(in_stock) = self.in_stock {
            update_doc.insert("inStock", in_stock);
        }

        if let Some((stored_price, stored_discount)) = stored {
            let price = self.price.unwrap_or(stored_price);
            let discount = self.discount.unwrap_or(stored_discount);
            update_doc.insert("price", price);
            update_doc.insert("discount", discount);
            update_doc.insert("finalPrice", final_price(price, discount));
        }

        Ok(update_doc)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(price: f64, discount: f64) -> CreateProductRequest {
        CreateProductRequest {
            name: "Desk lamp".to_string(),
            description: String::new(),
            price,
            discount,
            images: vec![],
            variants: vec![Variant { color: "Red".to_string(), sizes: vec!["M".to_string()] }],
            tags: vec![],
            category: "Lighting".to_string(),
            sub_category: None,
            in_stock: true,
        }
    }

    #[test]
    fn final_price_edges() {
        assert_eq!(final_price(2500.0, 0.0), 2500.0);
        assert_eq!(final_price(2500.0, 100.0), 0.0);
        assert_eq!(final_price(2500.0, 20.0), 2000.0);
        assert_eq!(final_price(0.0, 50.0), 0.0);
    }

    #[test]
    fn create_computes_final_price() {
        let product = create_request(1200.0, 25.0).into_product();
        assert_eq!(product.final_price, 900.0);
        assert!(product.reviews.is_empty());
    }

    #[test]
    fn create_rejects_out_of_range_discount() {
        assert!(create_request(100.0, 101.0).validate().is_err());
        assert!(create_request(-1.0, 0.0).validate().is_err());
        assert!(create_request(100.0, 100.0).validate().is_ok());
    }

    #[test]
    fn update_recomputes_with_stored_values() {
        let update = UpdateProductRequest {
            name: None,
            description: None,
            price: None,
            discount: Some(10.0),
            images: None,
            variants: None,
            tags: None,
            category: None,
            sub_category: None,
            in_stock: None,
        };
        assert!(update.touches_pricing());

        let set = update.to_set_document(Some((400.0, 0.0))).unwrap();
        assert_eq!(set.get_f64("price").unwrap(), 400.0);
        assert_eq!(set.get_f64("discount").unwrap(), 10.0);
        assert_eq!(set.get_f64("finalPrice").unwrap(), 360.0);
    }

    #[test]
    fn update_without_pricing_leaves_prices_alone() {
        let update: UpdateProductRequest =
            serde_json::from_str(r#"{"name":"Floor lamp","inStock":false}"#).unwrap();
        assert!(!update.touches_pricing());

        let set = update.to_set_document(None).unwrap();
        assert_eq!(set.get_str("name").unwrap(), "Floor lamp");
        assert!(!set.get_bool("inStock").unwrap());
        assert!(!set.contains_key("finalPrice"));
    }
}
