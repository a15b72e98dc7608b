use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

use super::order::{OrderStatus, PaymentMethod, ShippingAddress};

pub const CUSTOM_ORDERS: &str = "custom_orders";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrder {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_number: String,
    pub user: ObjectId,
    pub prompt: String,
    pub model_url: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_receipt: Option<String>,
    /// Quoted by an admin once the model has been reviewed.
    #[serde(default)]
    pub price: Option<f64>,
    pub status: OrderStatus,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomOrderRequest {
    #[validate(custom = "trimmed_prompt")]
    pub prompt: String,
    #[validate(url(message = "Model URL must be a valid URL"))]
    pub model_url: String,
    pub task_id: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub color: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_receipt: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCustomOrderRequest {
    pub status: Option<String>,
    #[validate(range(min = 0.0, message = "Price must not be negative"))]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateModelRequest {
    #[validate(custom = "trimmed_prompt")]
    pub prompt: String,
}

/// Prompts are stored trimmed, so the length bound applies after trimming.
fn trimmed_prompt(prompt: &str) -> Result<(), ValidationError> {
    let length = prompt.trim().chars().count();
    if (3..=600).contains(&length) {
        return Ok(());
    }
    let mut err = ValidationError::new("length");
    err.message = Some(Cow::from("Prompt must be between 3 and 600 characters"));
    Err(err)
}

#[derive(Debug, Deserialize)]
pub struct ModelProxyQuery {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(text: &str) -> GenerateModelRequest {
        GenerateModelRequest { prompt: text.to_string() }
    }

    #[test]
    fn prompt_length_counts_trimmed_characters() {
        assert!(prompt("a vase").validate().is_ok());
        assert!(prompt("   ab   ").validate().is_err());
        assert!(prompt(&format!("  {}  ", "x".repeat(600))).validate().is_ok());
        assert!(prompt(&"x".repeat(601)).validate().is_err());
    }
}
