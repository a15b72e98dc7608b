use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::Error as JwtError, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use futures_util::future::{ok, ready, Ready};
use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use crate::{
    config::{JwtConfig, MongoConfig},
    error::ApiError,
    models::{
        admin::{Admin, Permission, ADMINS},
        user::USERS,
    },
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,     // Account ID
    pub role: Role,
    pub exp: i64,        // Expiration time
    pub iat: i64,        // Issued at
}

impl Claims {
    pub fn subject_id(&self) -> Result<ObjectId, ApiError> {
        ObjectId::parse_str(&self.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_user(&self) -> Result<ObjectId, ApiError> {
        if self.role != Role::User {
            return Err(ApiError::Forbidden("Customer account required".to_string()));
        }
        self.subject_id()
    }

    pub fn require_admin(&self) -> Result<ObjectId, ApiError> {
        if !self.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        self.subject_id()
    }
}

/// Claims are placed in request extensions by [`AuthMiddleware`].
impl FromRequest for Claims {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Claims>()
                .cloned()
                .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string())),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(config: &JwtConfig) -> Self {
        TokenKeys {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: Duration::hours(config.access_ttl_hours),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        }
    }

    pub fn issue_pair(&self, subject: &ObjectId, role: Role) -> Result<TokenPair, ApiError> {
        let now = Utc::now();

        let access_claims = Claims {
            sub: subject.to_hex(),
            role,
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
        };

        let refresh_claims = Claims {
            sub: subject.to_hex(),
            role,
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::default(), &access_claims, &self.access_encoding).map_err(|e| {
            error!("Token generation error: {}", e);
            ApiError::Internal("Token generation failed".to_string())
        })?;

        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)
            .map_err(|e| {
                error!("Refresh token generation error: {}", e);
                ApiError::Internal("Refresh token generation failed".to_string())
            })?;

        Ok(TokenPair { token, refresh_token })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.access_decoding, &Validation::default())?;
        Ok(token_data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.refresh_decoding, &Validation::default())?;
        Ok(token_data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    hash(password.as_bytes(), DEFAULT_COST).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::from(e)
    })
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, ApiError> {
    verify(password, password_hash).map_err(|e| {
        error!("Password verification error: {}", e);
        ApiError::from(e)
    })
}

/// Issues a fresh pair for the account named by a valid refresh token.
fn account_collection(role: Role) -> &'static str {
    match role {
        Role::User => USERS,
        Role::Admin => ADMINS,
    }
}

pub async fn refresh_token(
    db: web::Data<MongoConfig>,
    keys: web::Data<TokenKeys>,
    req: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let claims = keys.verify_refresh(&req.refresh_token).map_err(|e| {
        debug!("Refresh token verification error: {}", e);
        ApiError::Unauthorized("Invalid refresh token".to_string())
    })?;

    let subject = claims.subject_id()?;
    // Deleted accounts must not be able to mint new tokens.
    let exists = db
        .database
        .collection::<Document>(account_collection(claims.role))
        .count_documents(doc! { "_id": subject }, None)
        .await?
        > 0;
    if !exists {
        warn!("Refresh attempted for missing account {}", subject);
        return Err(ApiError::Unauthorized("Account no longer exists".to_string()));
    }

    let pair = keys.issue_pair(&subject, claims.role)?;

    Ok(HttpResponse::Ok().json(pair))
}

/// Loads the calling admin and checks it holds `permission`.
pub async fn require_permission(
    db: &MongoConfig,
    claims: &Claims,
    permission: Permission,
) -> Result<Admin, ApiError> {
    let admin_id = claims.require_admin()?;

    let admin = db
        .database
        .collection::<Admin>(ADMINS)
        .find_one(doc! { "_id": admin_id }, None)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Admin account no longer exists".to_string()))?;

    if !admin.can(permission) {
        warn!("Admin {} lacks permission {:?}", admin_id, permission);
        return Err(ApiError::Forbidden(format!(
            "Missing permission: {}",
            permission.as_str()
        )));
    }

    Ok(admin)
}

// Auth middleware: requests without a bearer token pass through anonymous,
// handlers that need an account extract `Claims` and fail with 401.
pub struct AuthMiddleware {
    keys: Arc<TokenKeys>,
}

impl AuthMiddleware {
    pub fn new(keys: Arc<TokenKeys>) -> Self {
        AuthMiddleware { keys }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
            keys: self.keys.clone(),
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: Rc<S>,
    keys: Arc<TokenKeys>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match bearer_token(&req) {
            Ok(Some(token)) => token,
            Ok(None) => return self.forward(req),
            Err(e) => return Box::pin(ready(Ok(reject(req, e)))),
        };

        match self.keys.verify_access(&token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                self.forward(req)
            }
            Err(e) => {
                debug!("Rejected access token: {}", e);
                let err = ApiError::Unauthorized("Invalid token".to_string());
                Box::pin(ready(Ok(reject(req, err))))
            }
        }
    }
}

impl<S, B> AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    fn forward(
        &self,
        req: ServiceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ServiceResponse<EitherBody<B>>, Error>>>> {
        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

/// Rejections are rendered as responses so outer middleware (CORS) still
/// decorates them.
fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B>> {
    req.into_response(err.error_response()).map_into_right_body()
}

fn bearer_token(req: &ServiceRequest) -> Result<Option<String>, ApiError> {
    let auth_header = match req.headers().get("Authorization") {
        Some(header) => header,
        None => return Ok(None),
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid authorization header".to_string()))?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(ApiError::Unauthorized(
            "Invalid authorization header format".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test as actix_test, App};

    pub(crate) fn test_keys() -> TokenKeys {
        TokenKeys::new(&JwtConfig {
            access_secret: "test-access".to_string(),
            refresh_secret: "test-refresh".to_string(),
            access_ttl_hours: 2,
            refresh_ttl_days: 7,
        })
    }

    async fn whoami(claims: Claims) -> HttpResponse {
        HttpResponse::Ok().body(claims.sub)
    }

    #[test]
    fn access_and_refresh_tokens_use_separate_secrets() {
        let keys = test_keys();
        let id = ObjectId::new();
        let pair = keys.issue_pair(&id, Role::Admin).unwrap();

        let claims = keys.verify_access(&pair.token).unwrap();
        assert_eq!(claims.sub, id.to_hex());
        assert_eq!(claims.role, Role::Admin);

        assert!(keys.verify_access(&pair.refresh_token).is_err());
        assert!(keys.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn role_guards() {
        let claims = Claims {
            sub: ObjectId::new().to_hex(),
            role: Role::User,
            exp: 0,
            iat: 0,
        };
        assert!(claims.require_user().is_ok());
        assert!(matches!(claims.require_admin(), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn password_hash_round_trip() {
        let hashed = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[actix_web::test]
    async fn middleware_passes_claims_and_rejects_bad_tokens() {
        let keys = Arc::new(test_keys());
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(keys.clone()))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/whoami").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let id = ObjectId::new();
        let pair = keys.issue_pair(&id, Role::User).unwrap();
        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", pair.token)))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, id.to_hex().as_bytes());

        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid token");
    }

    #[actix_web::test]
    async fn rejected_tokens_keep_cors_headers() {
        let keys = Arc::new(test_keys());
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(keys))
                .wrap(actix_cors::Cors::default().allowed_origin("http://shop.test"))
                .route("/whoami", web::get().to(whoami)),
        )
        .await;

        for header in ["Bearer not-a-jwt", "Basic abc"] {
            let req = actix_test::TestRequest::get()
                .uri("/whoami")
                .insert_header(("Origin", "http://shop.test"))
                .insert_header(("Authorization", header))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", header);
            assert_eq!(
                resp.headers().get("access-control-allow-origin").unwrap(),
                "http://shop.test"
            );
        }
    }

    #[test]
    fn refresh_looks_up_the_matching_collection() {
        assert_eq!(account_collection(Role::User), USERS);
        assert_eq!(account_collection(Role::Admin), ADMINS);
    }
}
