//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    cancel_subscription, checkout_success, create_checkout_session, create_email_checkout_session,
    health_check, list_plans, membership_status, verify_session,
};
use crate::state::AppState;

/// API routes with CORS and tracing
pub fn api_router(state: AppState) -> Router {
    // Any origin may call every endpoint
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/plans", get(list_plans))
        .route("/api/create-checkout-session", post(create_checkout_session))
        .route("/api/checkout/session", post(create_email_checkout_session))
        .route("/api/checkout-success", get(checkout_success))
        .route("/api/verify-session", post(verify_session))
        .route("/api/cancel-subscription", post(cancel_subscription))
        .route("/api/membership/{uid}", get(membership_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API routes plus the static site as fallback
pub fn app(state: AppState, static_dir: &str) -> Router {
    api_router(state).fallback_service(ServeDir::new(static_dir))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use clinic_billing::{
        CheckoutRoutes, ClientReferenceCodec, MemoryUserStore, MockPaymentProvider, PlanCatalog,
        Subscription, SubscriptionStatus, UserRecord, UserRecordStore,
    };

    use super::*;
    use crate::state::Billing;

    const SITE: &str = "https://clinics.example.org";

    struct Harness {
        provider: Arc<MockPaymentProvider>,
        store: Arc<MemoryUserStore>,
        router: Router,
    }

    fn harness() -> Harness {
        let provider = Arc::new(MockPaymentProvider::new());
        let store = Arc::new(MemoryUserStore::new());
        let catalog = Arc::new(PlanCatalog::standard());
        let routes = CheckoutRoutes::from_site_url(SITE);

        let billing = Billing::new(
            provider.clone(),
            store.clone(),
            catalog.clone(),
            ClientReferenceCodec::unsigned(),
            routes.clone(),
        );

        let state = AppState {
            catalog,
            records: store.clone(),
            routes,
            billing: Some(Arc::new(billing)),
        };

        Harness {
            provider,
            store,
            router: api_router(state),
        }
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &axum::response::Response) -> String {
        response.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let response = h.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["paymentsConfigured"], true);
        assert_eq!(body["recordStore"], "memory");
    }

    #[tokio::test]
    async fn test_plans_listed() {
        let h = harness();
        let response = h.router.oneshot(get("/api/plans")).await.unwrap();
        let body = json_body(response).await;

        let plans = body.as_array().unwrap();
        assert_eq!(plans.len(), 12);
        let affiliate_card = plans
            .iter()
            .find(|p| {
                p["membershipTier"] == "affiliate" && p["interval"] == "monthly" && p["paymentMethod"] == "card"
            })
            .unwrap();
        assert_eq!(affiliate_card["displayAmount"], "31.05");
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_json(
                "/api/create-checkout-session",
                &json!({"priceId": "price_clinic_monthly_card", "userId": "user_42"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["id"].as_str().unwrap().starts_with("cs_"));
        assert!(!body["url"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_checkout_missing_user_is_400() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_json("/api/create-checkout-session", &json!({"priceId": "price_x"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("userId"));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_500() {
        let h = harness();
        h.provider.fail_on("create_checkout_session", "No such price: 'price_x'");

        let response = h
            .router
            .oneshot(post_json(
                "/api/create-checkout-session",
                &json!({"priceId": "price_x", "userId": "user_1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("No such price"));
    }

    #[tokio::test]
    async fn test_email_variant_returns_session_id() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_json(
                "/api/checkout/session",
                &json!({
                    "priceId": "price_solo_annual_ach",
                    "email": "dr.lee@example.org",
                    "metadata": {"clinicName": "Lee Chiropractic", "seats": 2}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let session_id = body["sessionId"].as_str().unwrap();

        let session = h.provider.session(session_id).unwrap();
        assert_eq!(session.metadata["seats"], "2");
    }

    #[tokio::test]
    async fn test_checkout_success_redirects_to_confirmation() {
        let h = harness();
        let created = h
            .router
            .clone()
            .oneshot(post_json(
                "/api/create-checkout-session",
                &json!({"priceId": "price_clinic_annual_ach", "userId": "42"}),
            ))
            .await
            .unwrap();
        let session_id = json_body(created).await["id"].as_str().unwrap().to_string();
        let sub_id = h.provider.complete_session(&session_id, 365).unwrap();

        let response = h
            .router
            .oneshot(get(&format!("/api/checkout-success?session_id={session_id}")))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        let target = location(&response);
        assert!(target.starts_with("https://clinics.example.org/membership/confirmation?paid=active"));
        assert!(target.contains("uid=42"));
        assert!(target.contains(&format!("session={session_id}")));
        assert!(target.contains(&format!("subscription={sub_id}")));
        assert!(target.contains("end_date="));
    }

    #[tokio::test]
    async fn test_checkout_success_failure_redirects_to_cancel() {
        let h = harness();
        let response = h
            .router
            .oneshot(get("/api/checkout-success?session_id=cs_unknown"))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "https://clinics.example.org/membership?checkout=canceled");
    }

    #[tokio::test]
    async fn test_checkout_success_bad_query_redirects_to_cancel() {
        let h = harness();
        let response = h
            .router
            .oneshot(get("/api/checkout-success?session_id=a&session_id=b"))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "https://clinics.example.org/membership?checkout=canceled");
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_content_type_is_400_json() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/api/create-checkout-session")
            .body(Body::from(r#"{"priceId":"price_x","userId":"u"}"#))
            .unwrap();

        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("Content-Type"));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mistyped_field_is_400_json() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_json("/api/cancel-subscription", &json!({"uid": 5})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_verify_session() {
        let h = harness();
        let created = h
            .router
            .clone()
            .oneshot(post_json(
                "/api/checkout/session",
                &json!({"priceId": "price_solo_monthly_card", "email": "a@b.test"}),
            ))
            .await
            .unwrap();
        let session_id = json_body(created).await["sessionId"].as_str().unwrap().to_string();

        let unpaid = h
            .router
            .clone()
            .oneshot(post_json("/api/verify-session", &json!({"sessionId": session_id})))
            .await
            .unwrap();
        assert_eq!(unpaid.status(), StatusCode::BAD_REQUEST);

        h.provider.complete_session(&session_id, 30).unwrap();
        let paid = h
            .router
            .oneshot(post_json("/api/verify-session", &json!({"sessionId": session_id})))
            .await
            .unwrap();
        assert_eq!(paid.status(), StatusCode::OK);

        let body = json_body(paid).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["subscription"]["status"], "active");
        assert_eq!(h.store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_subscription() {
        let h = harness();
        h.provider.insert_subscription(Subscription {
            id: "sub_9".into(),
            status: SubscriptionStatus::Active,
            current_period_end: 1_700_000_000,
            cancel_at_period_end: false,
        });
        h.store.insert(UserRecord::new("user_9")).await;

        let response = h
            .router
            .clone()
            .oneshot(post_json(
                "/api/cancel-subscription",
                &json!({"uid": "user_9", "subscriptionId": "sub_9"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["subscriptionId"], "sub_9");
        assert_eq!(body["cancelAt"], "2023-11-14T22:13:20.000Z");
        assert!(body["message"].is_string());

        let record = h.store.get("user_9").await.unwrap().unwrap();
        assert_eq!(record.subscription_status, Some(SubscriptionStatus::Canceled));

        let status = h.router.oneshot(get("/api/membership/user_9")).await.unwrap();
        let body = json_body(status).await;
        assert_eq!(body["subscriptionStatus"], "canceled");
        assert_eq!(body["canceledAt"], "2023-11-14T22:13:20.000Z");
        assert_eq!(body["hasAccess"], false);
    }

    #[tokio::test]
    async fn test_cancel_unknown_subscription_is_404() {
        let h = harness();
        let response = h
            .router
            .oneshot(post_json("/api/cancel-subscription", &json!({"subscriptionId": "sub_nope"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_member_is_404() {
        let h = harness();
        let response = h.router.oneshot(get("/api/membership/nobody")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_payments_disabled() {
        let store = Arc::new(MemoryUserStore::new());
        let state = AppState {
            catalog: Arc::new(PlanCatalog::standard()),
            records: store,
            routes: CheckoutRoutes::from_site_url(SITE),
            billing: None,
        };
        let router = api_router(state);

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/create-checkout-session",
                &json!({"priceId": "price_x", "userId": "u"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = router
            .oneshot(get("/api/checkout-success?session_id=cs_1"))
            .await
            .unwrap();
        assert!(response.status().is_redirection());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let h = harness();
        let request = Request::builder()
            .uri("/api/plans")
            .header(header::ORIGIN, "https://partner.example.com")
            .body(Body::empty())
            .unwrap();

        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
