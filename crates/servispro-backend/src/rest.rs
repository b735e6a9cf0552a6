use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use servispro_gateway_mock::GatewayError;
use servispro_types::{
    ErrorBody, InitiatePaymentRequest, OtpCode, OtpDispatch, OtpVerdict, PaymentAck, PaymentId,
    PaymentView, RefundAck, RefundRequest, VerifyOtpRequest,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::state::{now_millis, BackendState};

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/payments/initiate", post(initiate_payment))
        .route("/api/payments/{payment_id}", get(get_payment))
        .route("/api/payments/{payment_id}/confirm", post(confirm_payment))
        .route("/api/payments/{payment_id}/otp", post(request_otp))
        .route("/api/payments/{payment_id}/otp/verify", post(verify_otp))
        .route("/api/payments/{payment_id}/refund", post(refund_payment))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn initiate_payment(
    State(state): State<Arc<BackendState>>,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> ApiResult<PaymentAck> {
    let req = decode(body)?;
    info!(provider_id = %req.provider_id, job_id = %req.job_id, "initiate requested");
    let now = now_millis();
    state
        .with_gateway(|gateway| gateway.initiate_payment(req, now))
        .map(Json)
        .map_err(reject)
}

async fn confirm_payment(
    State(state): State<Arc<BackendState>>,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentAck> {
    let payment_id = parse_payment_id(payment_id)?;
    let now = now_millis();
    state
        .with_gateway(|gateway| gateway.confirm_payment(&payment_id, now))
        .map(Json)
        .map_err(reject)
}

async fn request_otp(
    State(state): State<Arc<BackendState>>,
    Path(payment_id): Path<String>,
) -> ApiResult<OtpDispatch> {
    let payment_id = parse_payment_id(payment_id)?;
    let now = now_millis();
    state
        .with_gateway(|gateway| gateway.issue_otp(&payment_id, now))
        .map(Json)
        .map_err(reject)
}

async fn verify_otp(
    State(state): State<Arc<BackendState>>,
    Path(payment_id): Path<String>,
    body: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> ApiResult<OtpVerdict> {
    let payment_id = parse_payment_id(payment_id)?;
    let req = decode(body)?;
    let code = OtpCode::parse(&req.code).map_err(|err| reject(err.into()))?;
    let now = now_millis();
    state
        .with_gateway(|gateway| gateway.verify_otp(&payment_id, &code, now))
        .map(Json)
        .map_err(reject)
}

async fn get_payment(
    State(state): State<Arc<BackendState>>,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentView> {
    let payment_id = parse_payment_id(payment_id)?;
    state
        .with_gateway(|gateway| gateway.get_payment(&payment_id))
        .map(Json)
        .map_err(reject)
}

async fn refund_payment(
    State(state): State<Arc<BackendState>>,
    Path(payment_id): Path<String>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> ApiResult<RefundAck> {
    let payment_id = parse_payment_id(payment_id)?;
    let req = decode(body)?;
    state
        .with_gateway(|gateway| gateway.refund_payment(&payment_id, req.reason))
        .map(Json)
        .map_err(reject)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_payment_id(raw: String) -> Result<PaymentId, ApiError> {
    PaymentId::new(raw).map_err(|err| reject(err.into()))
}

/// Malformed bodies, including invalid ids, answer 400 with a `detail`.
fn decode<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!(error = %rejection, "malformed payment request body");
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    detail: rejection.body_text(),
                }),
            ))
        }
    }
}

fn reject(err: GatewayError) -> ApiError {
    let status = StatusCode::from_u16(err.kind().http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!(status = status.as_u16(), error = %err, "payment request rejected");
    (
        status,
        Json(ErrorBody {
            detail: err.to_string(),
        }),
    )
}
