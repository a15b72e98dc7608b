use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const ADMINS: &str = "admins";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
}

/// Per-screen access flags. A `super_admin` ignores them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub products: bool,
    pub categories: bool,
    pub orders: bool,
    pub custom_orders: bool,
    pub blogs: bool,
    pub faqs: bool,
    pub contact_info: bool,
    pub newsletter: bool,
    pub admins: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Permissions {
            products: true,
            categories: true,
            orders: true,
            custom_orders: true,
            blogs: true,
            faqs: true,
            contact_info: true,
            newsletter: true,
            admins: true,
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Products => self.products,
            Permission::Categories => self.categories,
            Permission::Orders => self.orders,
            Permission::CustomOrders => self.custom_orders,
            Permission::Blogs => self.blogs,
            Permission::Faqs => self.faqs,
            Permission::ContactInfo => self.contact_info,
            Permission::Newsletter => self.newsletter,
            Permission::Admins => self.admins,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Products,
    Categories,
    Orders,
    CustomOrders,
    Blogs,
    Faqs,
    ContactInfo,
    Newsletter,
    Admins,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Products => "products",
            Permission::Categories => "categories",
            Permission::Orders => "orders",
            Permission::CustomOrders => "customOrders",
            Permission::Blogs => "blogs",
            Permission::Faqs => "faqs",
            Permission::ContactInfo => "contactInfo",
            Permission::Newsletter => "newsletter",
            Permission::Admins => "admins",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
}

impl Admin {
    pub fn can(&self, permission: Permission) -> bool {
        self.role == AdminRole::SuperAdmin || self.permissions.allows(permission)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Option<AdminRole>,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAdminRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Option<AdminRole>,
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: AdminRole,
    pub permissions: Permissions,
    #[serde(rename = "createdAt")]
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
}

impl From<&Admin> for AdminResponse {
    fn from(admin: &Admin) -> Self {
        AdminResponse {
            id: admin.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: admin.name.clone(),
            email: admin.email.clone(),
            role: admin.role,
            permissions: admin.permissions,
            created_at: admin.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(role: AdminRole, permissions: Permissions) -> Admin {
        Admin {
            id: Some(ObjectId::new()),
            name: "Ops".to_string(),
            email: "ops@shop.test".to_string(),
            password_hash: String::new(),
            role,
            permissions,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn super_admin_ignores_flags() {
        let root = admin(AdminRole::SuperAdmin, Permissions::default());
        assert!(root.can(Permission::Admins));
        assert!(root.can(Permission::Orders));
    }

    #[test]
    fn admin_needs_flag() {
        let editor = admin(
            AdminRole::Admin,
            Permissions { blogs: true, ..Permissions::default() },
        );
        assert!(editor.can(Permission::Blogs));
        assert!(!editor.can(Permission::Products));
    }

    #[test]
    fn missing_permission_fields_default_to_false() {
        let permissions: Permissions = serde_json::from_str(r#"{"orders":true}"#).unwrap();
        assert!(permissions.orders);
        assert!(!permissions.custom_orders);
    }
}
