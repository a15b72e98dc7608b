use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

pub const CONTACT_INFO: &str = "contact_info";

/// Singleton document; there is at most one in the collection.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub working_hours: Option<String>,
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
    #[serde(serialize_with = "super::timestamp::serialize")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfoRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub working_hours: Option<String>,
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
}

impl ContactInfoRequest {
    pub fn into_contact_info(self) -> ContactInfo {
        ContactInfo {
            id: None,
            email: self.email,
            phone: self.phone,
            address: self.address,
            working_hours: self.working_hours,
            socials: self.socials,
            updated_at: Utc::now(),
        }
    }
}
