pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod store;
