use actix_web::web;

use crate::{
    auth,
    error::{json_error_handler, query_error_handler},
    handlers::{
        admins, blog_categories, blogs, categories, contact_info, custom_orders, faqs,
        newsletter, orders, products, users,
    },
};

/// Mounts every resource. Fixed segments are registered ahead of `/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(
            web::scope("/product")
                .route("", web::get().to(products::list_products))
                .route("", web::post().to(products::create_product))
                .route("/facets", web::get().to(products::product_facets))
                .route("/{id}", web::get().to(products::get_product))
                .route("/{id}", web::put().to(products::update_product))
                .route("/{id}", web::delete().to(products::delete_product))
                .route("/{id}/related", web::get().to(products::related_products))
                .route("/{id}/review", web::post().to(products::add_review)),
        )
        .service(
            web::scope("/category")
                .route("", web::get().to(categories::list_categories))
                .route("", web::post().to(categories::create_category))
                .route("/{id}", web::get().to(categories::get_category))
                .route("/{id}", web::put().to(categories::update_category))
                .route("/{id}", web::delete().to(categories::delete_category)),
        )
        .service(
            web::scope("/blog-category")
                .route("", web::get().to(blog_categories::list_blog_categories))
                .route("", web::post().to(blog_categories::create_blog_category))
                .route("/{id}", web::put().to(blog_categories::update_blog_category))
                .route("/{id}", web::delete().to(blog_categories::delete_blog_category)),
        )
        .service(
            web::scope("/blog")
                .route("", web::get().to(blogs::list_blogs))
                .route("", web::post().to(blogs::create_blog))
                .route("/{id}", web::get().to(blogs::get_blog))
                .route("/{id}", web::put().to(blogs::update_blog))
                .route("/{id}", web::delete().to(blogs::delete_blog)),
        )
        .service(
            web::scope("/faq")
                .route("", web::get().to(faqs::list_faqs))
                .route("", web::post().to(faqs::create_faq))
                .route("/{id}", web::get().to(faqs::get_faq))
                .route("/{id}", web::put().to(faqs::update_faq))
                .route("/{id}", web::delete().to(faqs::delete_faq)),
        )
        .service(
            web::resource("/contactInfo")
                .route(web::get().to(contact_info::get_contact_info))
                .route(web::put().to(contact_info::upsert_contact_info)),
        )
        .service(
            web::scope("/order")
                .route("", web::post().to(orders::create_order))
                .route("", web::get().to(orders::list_orders))
                .route("/my", web::get().to(orders::my_orders))
                .route("/{id}", web::get().to(orders::get_order))
                .route("/{id}", web::delete().to(orders::delete_order))
                .route("/{id}/status", web::patch().to(orders::update_order_status))
                .route("/{id}/cancel", web::patch().to(orders::cancel_order)),
        )
        .service(
            web::scope("/custom-order")
                .route("/generate", web::post().to(custom_orders::generate_model))
                .route("/generate/{task_id}", web::get().to(custom_orders::generation_status))
                .route(
                    "/generate/{task_id}/wait",
                    web::get().to(custom_orders::wait_for_generation),
                )
                .route("/model", web::get().to(custom_orders::proxy_model))
                .route("", web::post().to(custom_orders::create_custom_order))
                .route("", web::get().to(custom_orders::list_custom_orders))
                .route("/my", web::get().to(custom_orders::my_custom_orders))
                .route("/{id}", web::get().to(custom_orders::get_custom_order))
                .route("/{id}", web::patch().to(custom_orders::update_custom_order))
                .route("/{id}", web::delete().to(custom_orders::delete_custom_order)),
        )
        .service(
            web::scope("/newsletter")
                .route("/subscribe", web::post().to(newsletter::subscribe))
                .route("/unsubscribe", web::post().to(newsletter::unsubscribe))
                .route("/export", web::get().to(newsletter::export_subscribers))
                .route("", web::get().to(newsletter::list_subscribers))
                .route("/{id}", web::delete().to(newsletter::delete_subscriber)),
        )
        .service(
            web::scope("/user")
                .route("/register", web::post().to(users::register))
                .route("/login", web::post().to(users::login))
                .route("/refresh", web::post().to(auth::refresh_token))
                .route("/me", web::get().to(users::me))
                .route("/me", web::put().to(users::update_me))
                .route("/cart", web::get().to(users::get_cart))
                .route("/cart", web::put().to(users::put_cart))
                .route("/wishlist", web::get().to(users::get_wishlist))
                .route("/wishlist", web::put().to(users::put_wishlist)),
        )
        .service(
            web::scope("/admin")
                .route("/login", web::post().to(admins::login))
                .route("/refresh", web::post().to(auth::refresh_token))
                .route("/me", web::get().to(admins::me))
                .route("", web::get().to(admins::list_admins))
                .route("", web::post().to(admins::create_admin))
                .route("/{id}", web::get().to(admins::get_admin))
                .route("/{id}", web::put().to(admins::update_admin))
                .route("/{id}", web::delete().to(admins::delete_admin)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{tests::test_keys, AuthMiddleware, Role, TokenKeys},
        config::{GenerationConfig, MongoConfig},
        generation::GenerationClient,
    };
    use actix_web::{dev::ServiceResponse, http::StatusCode, test, App};
    use mongodb::{bson::oid::ObjectId, Client};
    use reqwest::Url;
    use serde_json::{json, Value};
    use std::{sync::Arc, time::Duration};

    // Every request below is rejected before the handler touches the
    // database, so the client never has to reach a server.
    macro_rules! test_app {
        ($keys:expr) => {{
            let client = Client::with_uri_str("mongodb://localhost:27017").await.unwrap();
            let db = web::Data::new(MongoConfig { database: client.database("storefront_test") });
            let generator = GenerationClient::new(&GenerationConfig {
                api_url: "http://localhost:9".to_string(),
                api_key: String::new(),
                poll_interval: Duration::from_millis(10),
                poll_timeout: Duration::from_secs(1),
                asset_hosts: vec!["assets.example.com".to_string()],
            })
            .unwrap();

            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new($keys))
                    .app_data(db)
                    .app_data(web::Data::new(test_keys()))
                    .app_data(web::Data::new(generator))
                    .configure(configure),
            )
            .await
        }};
    }

    fn bearer(keys: &TokenKeys, role: Role) -> (&'static str, String) {
        let pair = keys.issue_pair(&ObjectId::new(), role).unwrap();
        ("Authorization", format!("Bearer {}", pair.token))
    }

    async fn message<B: actix_web::body::MessageBody>(resp: ServiceResponse<B>) -> String {
        let body: Value = test::read_body_json(resp).await;
        body["message"].as_str().unwrap_or_default().to_string()
    }

    #[actix_web::test]
    async fn account_routes_need_a_token() {
        let app = test_app!(Arc::new(test_keys()));

        for uri in ["/user/me", "/user/cart", "/order/my", "/admin/me"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn customer_token_cannot_reach_admin_routes() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::get()
            .uri("/order")
            .insert_header(bearer(&keys, Role::User))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/product/{}", ObjectId::new().to_hex()))
            .insert_header(bearer(&keys, Role::User))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn admin_token_cannot_use_customer_cart() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::put()
            .uri("/user/cart")
            .insert_header(bearer(&keys, Role::Admin))
            .set_json(json!({ "items": [], "version": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn order_status_outside_the_four_values_is_rejected() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::patch()
            .uri(&format!("/order/{}/status", ObjectId::new().to_hex()))
            .insert_header(bearer(&keys, Role::Admin))
            .set_json(json!({ "status": "shipped" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(message(resp).await.contains("shipped"));
    }

    #[actix_web::test]
    async fn malformed_ids_are_bad_requests() {
        let app = test_app!(Arc::new(test_keys()));

        let req = test::TestRequest::get().uri("/product/not-an-id").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Invalid ID format");
    }

    #[actix_web::test]
    async fn bad_catalog_queries_are_bad_requests() {
        let app = test_app!(Arc::new(test_keys()));

        for uri in ["/product?min=cheap", "/product?min=5000&max=1000", "/product?sort=random"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn malformed_json_uses_message_shape() {
        let app = test_app!(Arc::new(test_keys()));

        let req = test::TestRequest::post()
            .uri("/user/login")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{ not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(message(resp).await.starts_with("Invalid request body"));
    }

    #[actix_web::test]
    async fn refresh_rejects_access_tokens() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());
        let pair = keys.issue_pair(&ObjectId::new(), Role::User).unwrap();

        let req = test::TestRequest::post()
            .uri("/user/refresh")
            .set_json(json!({ "refreshToken": pair.token }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(resp).await, "Invalid refresh token");
    }

    fn custom_order_body(payment: &str) -> Value {
        json!({
            "prompt": "A low vase with a wave pattern",
            "modelUrl": "https://assets.example.com/models/vase.glb",
            "quantity": 1,
            "shippingAddress": {
                "fullName": "Dana Reyes",
                "phone": "+15550100",
                "street": "1 Main St",
                "city": "Springfield",
                "country": "US"
            },
            "paymentMethod": payment
        })
    }

    #[actix_web::test]
    async fn custom_orders_need_a_customer_token() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::post()
            .uri("/custom-order")
            .set_json(custom_order_body("cash_on_delivery"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/custom-order")
            .insert_header(bearer(&keys, Role::Admin))
            .set_json(custom_order_body("cash_on_delivery"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn bank_transfer_custom_order_needs_a_receipt() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::post()
            .uri("/custom-order")
            .insert_header(bearer(&keys, Role::User))
            .set_json(custom_order_body("bank_transfer"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(message(resp).await.contains("receipt"));
    }

    #[actix_web::test]
    async fn model_proxy_refuses_other_hosts() {
        let app = test_app!(Arc::new(test_keys()));

        for url in ["https://evil.test/model.glb", "file:///etc/passwd", "not a url"] {
            let target =
                Url::parse_with_params("http://shop.test/custom-order/model", &[("url", url)])
                    .unwrap();
            let req = test::TestRequest::get()
                .uri(&format!("{}?{}", target.path(), target.query().unwrap()))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", url);
        }
    }

    #[actix_web::test]
    async fn custom_order_status_outside_the_four_values_is_rejected() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::patch()
            .uri(&format!("/custom-order/{}", ObjectId::new().to_hex()))
            .insert_header(bearer(&keys, Role::Admin))
            .set_json(json!({ "status": "shipped" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(message(resp).await.contains("shipped"));
    }

    #[actix_web::test]
    async fn padded_short_prompts_are_rejected() {
        let keys = Arc::new(test_keys());
        let app = test_app!(keys.clone());

        let req = test::TestRequest::post()
            .uri("/custom-order/generate")
            .insert_header(bearer(&keys, Role::User))
            .set_json(json!({ "prompt": "  ab    " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
