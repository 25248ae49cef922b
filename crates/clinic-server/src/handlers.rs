//! HTTP Handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use clinic_billing::{
    BillingError, Cancellation, ErrorBody, Plan, StartedCheckout, SubscriptionStatus, Verification,
};

use crate::state::{AppState, Billing};

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
    pub payment_provider: Option<String>,
    pub record_store: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailSessionRequest {
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub auth_id: String,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub canceled_at: Option<String>,
    pub has_access: bool,
}

type ApiResult<T> = Result<Json<T>, Response>;

fn billing(state: &AppState) -> Result<Arc<Billing>, Response> {
    state.billing.clone().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "Payments not configured".into(),
                code: "PAYMENTS_DISABLED",
            }),
        )
            .into_response()
    })
}

/// Unreadable bodies answer 400 with the usual error shape
fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| BillingError::Validation(rejection.body_text()).into_response())
}

/// Stripe metadata values are strings
fn stringify_metadata(metadata: HashMap<String, serde_json::Value>) -> HashMap<String, String> {
    metadata
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.billing.is_some(),
        payment_provider: state.billing.as_ref().map(|b| b.provider_name.clone()),
        record_store: state.records.name().to_string(),
    })
}

/// Plan catalog for the plan selector
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<Plan>> {
    Json(state.catalog.plans().to_vec())
}

/// Create a Stripe checkout session for a signed-in member
pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<StartedCheckout> {
    let billing = billing(&state)?;
    let payload = json_payload(payload)?;

    let started = billing
        .initiator
        .start(payload.price_id.as_deref(), payload.user_id.as_deref())
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(started))
}

/// Create a Stripe checkout session keyed by email
pub async fn create_email_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateEmailSessionRequest>, JsonRejection>,
) -> ApiResult<EmailSessionResponse> {
    let billing = billing(&state)?;
    let payload = json_payload(payload)?;

    let started = billing
        .initiator
        .start_for_email(
            payload.price_id.as_deref(),
            payload.email.as_deref(),
            stringify_metadata(payload.metadata),
        )
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(EmailSessionResponse {
        session_id: started.id,
    }))
}

/// Stripe success redirect target. Always answers with a browser redirect.
pub async fn checkout_success(
    State(state): State<AppState>,
    query: Result<Query<SuccessQuery>, QueryRejection>,
) -> Redirect {
    let Some(billing) = state.billing.as_ref() else {
        tracing::warn!("Checkout callback received while payments are disabled");
        return Redirect::to(&state.routes.cancel_url);
    };

    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::error!(error = %rejection.body_text(), "Unreadable checkout callback query");
            return Redirect::to(&state.routes.cancel_url);
        }
    };

    let target = billing.success.redirect_target(query.session_id.as_deref()).await;
    Redirect::to(&target)
}

/// Confirm that a session was paid
pub async fn verify_session(
    State(state): State<AppState>,
    payload: Result<Json<VerifySessionRequest>, JsonRejection>,
) -> ApiResult<Verification> {
    let billing = billing(&state)?;
    let payload = json_payload(payload)?;

    let verification = billing
        .verifier
        .verify(payload.session_id.as_deref())
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(verification))
}

/// Cancel a membership at the end of the billing period
pub async fn cancel_subscription(
    State(state): State<AppState>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> ApiResult<Cancellation> {
    let billing = billing(&state)?;
    let payload = json_payload(payload)?;

    let cancellation = billing
        .canceler
        .cancel(payload.uid.as_deref(), payload.subscription_id.as_deref())
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(cancellation))
}

/// Subscription mirror and submission access for one member
pub async fn membership_status(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<MembershipResponse> {
    let record = state
        .records
        .get(&uid)
        .await
        .and_then(|r| r.ok_or_else(|| BillingError::NotFound(format!("user {uid}"))))
        .map_err(IntoResponse::into_response)?;

    Ok(Json(MembershipResponse {
        has_access: record.has_access(),
        canceled_at: record.canceled_at_iso(),
        auth_id: record.auth_id,
        subscription_id: record.subscription_id,
        subscription_status: record.subscription_status,
    }))
}
