use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client, Database, IndexModel,
};
use std::{env, str::FromStr, time::Duration};
use dotenv::dotenv;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{
    admin::ADMINS,
    blog::{BLOGS, BLOG_CATEGORIES},
    category::CATEGORIES,
    newsletter::NEWSLETTER,
    user::USERS,
};

/// (collection, field) pairs that must stay unique.
const UNIQUE_FIELDS: [(&str, &str); 6] = [
    (USERS, "email"),
    (ADMINS, "email"),
    (NEWSLETTER, "email"),
    (BLOGS, "slug"),
    (CATEGORIES, "name"),
    (BLOG_CATEGORIES, "name"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_hours: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Hosts the model proxy is allowed to fetch from.
    pub asset_hosts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt: JwtConfig,
    pub generation: GenerationConfig,
    pub cors_origins: Vec<String>,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let generation_url = env::var("GENERATION_API_URL")
            .unwrap_or_else(|_| "https://api.meshy.ai/openapi".to_string());
        let mut asset_hosts = list_var("GENERATION_ASSET_HOSTS");
        if asset_hosts.is_empty() {
            asset_hosts.push("assets.meshy.ai".to_string());
        }

        let seed_admin = match (env::var("SEED_ADMIN_EMAIL"), env::var("SEED_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(SeedAdmin { email, password }),
            _ => None,
        };

        Ok(AppConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            mongo_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "storefront".to_string()),
            jwt: JwtConfig {
                access_secret: required("JWT_SECRET")?,
                refresh_secret: required("JWT_REFRESH_SECRET")?,
                access_ttl_hours: parsed("ACCESS_TOKEN_HOURS", 2)?,
                refresh_ttl_days: parsed("REFRESH_TOKEN_DAYS", 7)?,
            },
            generation: GenerationConfig {
                api_url: generation_url,
                api_key: env::var("GENERATION_API_KEY").unwrap_or_default(),
                poll_interval: Duration::from_millis(parsed("GENERATION_POLL_INTERVAL_MS", 1000)?),
                poll_timeout: Duration::from_secs(parsed("GENERATION_POLL_TIMEOUT_SECS", 600)?),
                asset_hosts,
            },
            cors_origins: list_var("CORS_ORIGINS"),
            seed_admin,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|value| split_list(&value))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub struct MongoConfig {
    pub database: Database,
}

impl MongoConfig {
    pub async fn init(config: &AppConfig) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let database = client.database(&config.database_name);

        Ok(MongoConfig { database })
    }

    /// Backs the handlers' duplicate checks with unique indexes, so racing
    /// inserts fail with a duplicate key error instead of both landing.
    /// Existing duplicates only produce a warning; the server still starts.
    pub async fn ensure_indexes(&self) {
        for (collection, field) in UNIQUE_FIELDS {
            let index = IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();

            match self
                .database
                .collection::<Document>(collection)
                .create_index(index, None)
                .await
            {
                Ok(_) => info!("Unique index on {}.{} ready", collection, field),
                Err(e) => warn!("Could not create unique index on {}.{}: {}", collection, field, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" http://a.test, ,http://b.test "),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn identity_fields_are_unique() {
        for expected in [(USERS, "email"), (ADMINS, "email"), (BLOGS, "slug"), (CATEGORIES, "name")] {
            assert!(UNIQUE_FIELDS.contains(&expected), "{:?}", expected);
        }
    }
}
