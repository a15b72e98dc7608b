use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const USERS: &str = "users";

/// Identity of a cart or wishlist line: product id + size + color.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub product_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl CompositeKey {
    pub fn new(product_id: impl Into<String>, size: Option<&str>, color: Option<&str>) -> Self {
        CompositeKey {
            product_id: product_id.into(),
            size: size.map(String::from),
            color: color.map(String::from),
        }
    }
}

/// A cart or wishlist line as stored on the user record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub final_price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl LineItem {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.product_id, self.size.as_deref(), self.color.as_deref())
    }

    pub fn matches(&self, key: &CompositeKey) -> bool {
        self.product_id == key.product_id && self.size == key.size && self.color == key.color
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Cart,
    Wishlist,
}

impl StoreKind {
    pub fn items_field(&self) -> &'static str {
        match self {
            StoreKind::Cart => "cart",
            StoreKind::Wishlist => "wishlist",
        }
    }

    pub fn version_field(&self) -> &'static str {
        match self {
            StoreKind::Cart => "cartVersion",
            StoreKind::Wishlist => "wishlistVersion",
        }
    }

    /// Route under `/user` that reads and writes this store.
    pub fn path(&self) -> &'static str {
        match self {
            StoreKind::Cart => "/user/cart",
            StoreKind::Wishlist => "/user/wishlist",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub cart: Vec<LineItem>,
    #[serde(default)]
    pub wishlist: Vec<LineItem>,
    #[serde(default)]
    pub cart_version: i64,
    #[serde(default)]
    pub wishlist_version: i64,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn store(&self, kind: StoreKind) -> SyncedItems {
        match kind {
            StoreKind::Cart => SyncedItems {
                items: self.cart.clone(),
                version: self.cart_version,
            },
            StoreKind::Wishlist => SyncedItems {
                items: self.wishlist.clone(),
                version: self.wishlist_version,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Whole-array write of a cart or wishlist, guarded by the version the
/// client last saw.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SyncedItems {
    pub items: Vec<LineItem>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_variants() {
        let item = LineItem {
            product_id: "p1".to_string(),
            name: "Mug".to_string(),
            image: None,
            final_price: 10.0,
            quantity: 1,
            size: Some("L".to_string()),
            color: Some("Blue".to_string()),
        };
        assert!(item.matches(&CompositeKey::new("p1", Some("L"), Some("Blue"))));
        assert!(!item.matches(&CompositeKey::new("p1", Some("M"), Some("Blue"))));
        assert!(!item.matches(&CompositeKey::new("p1", Some("L"), None)));
    }

    #[test]
    fn store_fields() {
        assert_eq!(StoreKind::Cart.version_field(), "cartVersion");
        assert_eq!(StoreKind::Wishlist.items_field(), "wishlist");
        assert_eq!(StoreKind::Wishlist.path(), "/user/wishlist");
    }
}
