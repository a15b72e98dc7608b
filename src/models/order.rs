use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use validator::Validate;

pub const ORDERS: &str = "orders";

/// Shared by orders and custom orders.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}', expected one of: pending, processing, completed, cancelled",
            self.0
        )
    }
}

impl FromStr for OrderStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    BankTransfer,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 5, message = "Phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

/// Snapshot of a product at the time of ordering.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_number: String,
    #[serde(default)]
    pub user: Option<ObjectId>,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_receipt: Option<String>,
    pub total_amount: f64,
    pub status: OrderStatus,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub updated_at: DateTime<Utc>,
}

/// Requested line; name, image and price are taken from the catalog.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    #[validate(length(min = 1, message = "Product id is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderLineRequest>,
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_receipt: Option<String>,
}

/// Bank transfers are only accepted with an uploaded receipt URL.
pub fn check_payment(method: PaymentMethod, receipt: Option<&str>) -> Result<(), &'static str> {
    match (method, receipt.map(str::trim)) {
        (PaymentMethod::BankTransfer, None) | (PaymentMethod::BankTransfer, Some("")) => {
            Err("A payment receipt is required for bank transfers")
        }
        _ => Ok(()),
    }
}

pub fn order_total(items: &[OrderItem]) -> f64 {
    items.iter().map(OrderItem::line_total).sum()
}

pub fn generate_order_number(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix.to_uppercase())
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: f64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: ObjectId::new().to_hex(),
            name: "Vase".to_string(),
            image: None,
            price,
            quantity,
            size: None,
            color: None,
        }
    }

    #[test]
    fn status_accepts_only_enumerated_values() {
        for status in ["pending", "processing", "completed", "cancelled"] {
            assert_eq!(status.parse::<OrderStatus>().unwrap().as_str(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert!("Pending".parse::<OrderStatus>().is_err());
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OrderStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert!(serde_json::from_str::<OrderStatus>("\"refunded\"").is_err());
    }

    #[test]
    fn bank_transfer_needs_receipt() {
        assert!(check_payment(PaymentMethod::BankTransfer, None).is_err());
        assert!(check_payment(PaymentMethod::BankTransfer, Some("  ")).is_err());
        assert!(check_payment(PaymentMethod::BankTransfer, Some("https://cdn.test/r.png")).is_ok());
        assert!(check_payment(PaymentMethod::CashOnDelivery, None).is_ok());
    }

    #[test]
    fn total_sums_lines() {
        assert_eq!(order_total(&[item(250.0, 2), item(99.5, 1)]), 599.5);
        assert_eq!(order_total(&[]), 0.0);
    }

    #[test]
    fn order_number_shape() {
        let number = generate_order_number("ORD");
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn empty_order_fails_validation() {
        let request: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "items": [],
            "shippingAddress": {
                "fullName": "Ada", "phone": "0123456", "street": "1 Main",
                "city": "Lagos", "country": "NG"
            },
            "paymentMethod": "cash_on_delivery"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
