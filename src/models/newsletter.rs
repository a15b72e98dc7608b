use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{validate_email, Validate, ValidationError};

pub const NEWSLETTER: &str = "newsletter";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(custom = "trimmed_email")]
    pub email: String,
}

/// Addresses are stored trimmed, so they are checked that way too.
fn trimmed_email(email: &str) -> Result<(), ValidationError> {
    if validate_email(email.trim()) {
        return Ok(());
    }
    let mut err = ValidationError::new("email");
    err.message = Some(Cow::from("Invalid email address"));
    Err(err)
}

impl SubscribeRequest {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str) -> SubscribeRequest {
        SubscribeRequest { email: email.to_string() }
    }

    #[test]
    fn padded_addresses_validate_and_normalize() {
        let padded = request("  Reader@Shop.Test \n");
        assert!(padded.validate().is_ok());
        assert_eq!(padded.normalized_email(), "reader@shop.test");

        assert!(request("   ").validate().is_err());
        assert!(request(" not-an-email ").validate().is_err());
    }
}
