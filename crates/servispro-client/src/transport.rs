use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use servispro_gateway_mock::{GatewayError, MockGateway};
use servispro_types::{
    ErrorBody, InitiatePaymentRequest, OtpCode, OtpDispatch, OtpVerdict, PaymentAck, PaymentId,
    PaymentView, RefundAck, RefundReason, RefundRequest, VerifyOtpRequest,
};
use thiserror::Error;
use tracing::debug;

/// Backend endpoint configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub bearer_token: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 10_000,
            bearer_token: None,
        }
    }
}

/// Error model for transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: status={status}, detail={detail}")]
    Rejected { status: u16, detail: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("internal transport error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Server-provided explanation, suitable for showing to the user.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected { detail, .. } if !detail.is_empty() => Some(detail),
            _ => None,
        }
    }
}

impl From<GatewayError> for TransportError {
    fn from(err: GatewayError) -> Self {
        Self::Rejected {
            status: err.kind().http_status(),
            detail: err.to_string(),
        }
    }
}

/// Payment backend interface. Implementations may call the in-process gateway
/// or the REST backend.
#[async_trait(?Send)]
pub trait PaymentTransport {
    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentAck, TransportError>;

    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<PaymentAck, TransportError>;

    async fn request_otp(&self, payment_id: &PaymentId) -> Result<OtpDispatch, TransportError>;

    async fn verify_otp(
        &self,
        payment_id: &PaymentId,
        code: &OtpCode,
    ) -> Result<OtpVerdict, TransportError>;

    async fn get_payment(&self, payment_id: &PaymentId) -> Result<PaymentView, TransportError>;

    async fn refund_payment(
        &self,
        payment_id: &PaymentId,
        reason: RefundReason,
    ) -> Result<RefundAck, TransportError>;
}

/// Number of calls a [`MockTransport`] has served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub initiate: usize,
    pub confirm: usize,
    pub request_otp: usize,
    pub verify_otp: usize,
}

/// In-memory transport backed by `MockGateway`, used by the demo and tests.
#[derive(Clone)]
pub struct MockTransport {
    gateway: Arc<Mutex<MockGateway>>,
    calls: Arc<Mutex<CallCounts>>,
    origin_millis: u64,
    origin: tokio::time::Instant,
}

impl MockTransport {
    pub fn new(gateway: MockGateway) -> Self {
        Self {
            gateway: Arc::new(Mutex::new(gateway)),
            calls: Arc::new(Mutex::new(CallCounts::default())),
            origin_millis: crate::unix_millis_now(),
            origin: tokio::time::Instant::now(),
        }
    }

    /// Runs `f` against the shared gateway, e.g. to inject faults or read the SMS outbox.
    pub fn with_gateway<R>(
        &self,
        f: impl FnOnce(&mut MockGateway) -> R,
    ) -> Result<R, TransportError> {
        let mut lock = self
            .gateway
            .lock()
            .map_err(|_| TransportError::Unavailable("mutex poisoned".to_string()))?;
        Ok(f(&mut lock))
    }

    pub fn call_counts(&self) -> CallCounts {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    /// Gateway clock. Follows tokio time so paused-clock tests stay consistent.
    fn now_millis(&self) -> u64 {
        self.origin_millis + self.origin.elapsed().as_millis() as u64
    }

    fn record(&self, f: impl FnOnce(&mut CallCounts)) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }
}

#[async_trait(?Send)]
impl PaymentTransport for MockTransport {
    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentAck, TransportError> {
        self.record(|calls| calls.initiate += 1);
        let now = self.now_millis();
        Ok(self.with_gateway(|gateway| gateway.initiate_payment(request, now))??)
    }

    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<PaymentAck, TransportError> {
        self.record(|calls| calls.confirm += 1);
        let now = self.now_millis();
        Ok(self.with_gateway(|gateway| gateway.confirm_payment(payment_id, now))??)
    }

    async fn request_otp(&self, payment_id: &PaymentId) -> Result<OtpDispatch, TransportError> {
        self.record(|calls| calls.request_otp += 1);
        let now = self.now_millis();
        Ok(self.with_gateway(|gateway| gateway.issue_otp(payment_id, now))??)
    }

    async fn verify_otp(
        &self,
        payment_id: &PaymentId,
        code: &OtpCode,
    ) -> Result<OtpVerdict, TransportError> {
        self.record(|calls| calls.verify_otp += 1);
        let now = self.now_millis();
        Ok(self.with_gateway(|gateway| gateway.verify_otp(payment_id, code, now))??)
    }

    async fn get_payment(&self, payment_id: &PaymentId) -> Result<PaymentView, TransportError> {
        Ok(self.with_gateway(|gateway| gateway.get_payment(payment_id))??)
    }

    async fn refund_payment(
        &self,
        payment_id: &PaymentId,
        reason: RefundReason,
    ) -> Result<RefundAck, TransportError> {
        Ok(self.with_gateway(|gateway| gateway.refund_payment(payment_id, reason))??)
    }
}

/// REST transport against the payment backend (`/api/payments/...`).
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| TransportError::Internal(err.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/payments{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let request = match self.config.bearer_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "payment backend responded");
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| TransportError::Decode(err.to_string()));
        }
        let detail = match response.json::<ErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
        };
        Err(TransportError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait(?Send)]
impl PaymentTransport for HttpTransport {
    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentAck, TransportError> {
        self.send(self.client.post(self.url("/initiate")).json(&request))
            .await
    }

    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<PaymentAck, TransportError> {
        self.send(self.client.post(self.url(&format!("/{payment_id}/confirm"))))
            .await
    }

    async fn request_otp(&self, payment_id: &PaymentId) -> Result<OtpDispatch, TransportError> {
        self.send(self.client.post(self.url(&format!("/{payment_id}/otp"))))
            .await
    }

    async fn verify_otp(
        &self,
        payment_id: &PaymentId,
        code: &OtpCode,
    ) -> Result<OtpVerdict, TransportError> {
        let body = VerifyOtpRequest {
            code: code.as_str().to_string(),
        };
        self.send(
            self.client
                .post(self.url(&format!("/{payment_id}/otp/verify")))
                .json(&body),
        )
        .await
    }

    async fn get_payment(&self, payment_id: &PaymentId) -> Result<PaymentView, TransportError> {
        self.send(self.client.get(self.url(&format!("/{payment_id}"))))
            .await
    }

    async fn refund_payment(
        &self,
        payment_id: &PaymentId,
        reason: RefundReason,
    ) -> Result<RefundAck, TransportError> {
        self.send(
            self.client
                .post(self.url(&format!("/{payment_id}/refund")))
                .json(&RefundRequest { reason }),
        )
        .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Unavailable(err.to_string())
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use servispro_gateway_mock::DemoScenario;
    use servispro_types::{PaymentStatus, RefundReason};

    use super::{HttpTransport, MockTransport, PaymentTransport, TransportConfig, TransportError};

    #[tokio::test]
    async fn mock_transport_initiates_and_confirms() {
        let scenario = DemoScenario::new();
        let request = scenario.initiate_request(1);
        let transport = MockTransport::new(scenario.gateway);
        let ack = transport.initiate_payment(request).await.expect("initiate");
        assert_eq!(ack.status, PaymentStatus::Pending);
        let confirmed = transport
            .confirm_payment(&ack.payment_id)
            .await
            .expect("confirm");
        assert_eq!(confirmed.status, PaymentStatus::Completed);
        let counts = transport.call_counts();
        assert_eq!((counts.initiate, counts.confirm), (1, 1));
    }

    #[tokio::test]
    async fn gateway_errors_map_to_http_like_rejections() {
        let scenario = DemoScenario::new();
        let request = scenario.initiate_request(1);
        let transport = MockTransport::new(scenario.gateway);
        transport
            .with_gateway(|gateway| gateway.faults.fail_initiate = true)
            .unwrap();
        let err = transport.initiate_payment(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 503, .. }));
        assert_eq!(err.detail(), Some("Service de paiement indisponible"));
    }

    #[tokio::test]
    async fn refund_goes_through_the_gateway() {
        let scenario = DemoScenario::new();
        let request = scenario.initiate_request(1);
        let transport = MockTransport::new(scenario.gateway);
        let id = transport.initiate_payment(request).await.unwrap().payment_id;
        transport.confirm_payment(&id).await.unwrap();
        let ack = transport
            .refund_payment(&id, RefundReason::ProviderNoShow)
            .await
            .unwrap();
        assert_eq!(ack.status, PaymentStatus::Refunded);
        assert_eq!(
            transport.get_payment(&id).await.unwrap().status,
            PaymentStatus::Refunded
        );
    }

    #[tokio::test]
    async fn http_transport_reports_unreachable_backend() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 2_000,
            bearer_token: None,
        })
        .unwrap();
        let id = servispro_types::PaymentId::new("missing").unwrap();
        let err = transport.get_payment(&id).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unavailable(_) | TransportError::Timeout | TransportError::Internal(_)
        ));
    }

    #[test]
    fn http_transport_builds_payment_urls() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..TransportConfig::default()
        })
        .unwrap();
        assert_eq!(
            transport.url("/initiate"),
            "http://localhost:8000/api/payments/initiate"
        );
    }
}
