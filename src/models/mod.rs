pub mod admin;
pub mod blog;
pub mod category;
pub mod contact_info;
pub mod custom_order;
pub mod faq;
pub mod newsletter;
pub mod order;
pub mod product;
pub mod timestamp;
pub mod user;
